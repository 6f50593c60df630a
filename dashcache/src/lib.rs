use std::time::{Duration, Instant};

use cache::{Adapter, AdapterError};
use dashmap::DashMap;

/// In-memory [`Adapter`] on a [`DashMap`].
///
/// Expired entries are dropped lazily, when they are next read.
pub struct DashCache {
    entries: DashMap<String, Slot>,
}

struct Slot {
    payload: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl DashCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of entries held, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DashCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for DashCache {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", fields(?key), skip_all)
    )]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AdapterError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(slot) if !slot.is_expired(now) => return Ok(Some(slot.payload.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            #[cfg(feature = "tracing")]
            tracing::trace!("expired");

            self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        }

        Ok(None)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", fields(?key, ?ttl), skip_all)
    )]
    fn set(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<(), AdapterError> {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(
            key.to_owned(),
            Slot {
                payload: payload.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, AdapterError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    fn purge(&self) -> Result<(), AdapterError> {
        self.entries.clear();
        Ok(())
    }
}
