use std::time::Duration;

use base64::{Engine, prelude::BASE64_STANDARD};
use cache::AdapterError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// On-disk shape of one entry.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Record {
    pub key: String,

    /// Unix time in milliseconds.
    pub expires_at: Option<i64>,

    /// Base64 encoded.
    pub payload: String,
}

impl Record {
    pub fn new(key: &str, payload: &[u8], ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .and_then(|ttl| time::Duration::try_from(ttl).ok())
            .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
            .map(unix_millis);

        Self {
            key: key.to_owned(),
            expires_at,
            payload: BASE64_STANDARD.encode(payload),
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at
            .is_some_and(|expires_at| unix_millis(now) >= expires_at)
    }

    pub fn payload(&self) -> Result<Vec<u8>, AdapterError> {
        BASE64_STANDARD
            .decode(&self.payload)
            .map_err(|e| {
                AdapterError::Corrupt(format!(
                    "cannot base64 decode `{}` :: {}",
                    self.key, e
                ))
            })
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
