mod record;

use std::{
    ffi::OsStr,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use cache::{Adapter, AdapterError};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::record::Record;

const EXTENSION: &str = "entry";

/// Filesystem [`Adapter`]: one JSON file per key inside a directory.
///
/// File names are derived from a SHA-256 of the key, so any key maps to a
/// valid name. Writes go to a temporary file first and are renamed into
/// place. Expired entries are removed when they are next read.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Creates `dir` if it does not exist yet.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", BASE64_URL_SAFE_NO_PAD.encode(digest), EXTENSION))
    }

    fn read(&self, key: &str) -> Result<Option<Record>, AdapterError> {
        let path = self.path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record = serde_json::from_slice::<Record>(&bytes)?;
        if record.key != key {
            #[cfg(feature = "tracing")]
            tracing::warn!("digest collision between `{}` and `{}`", key, record.key);

            return Ok(None);
        }

        if record.is_expired(OffsetDateTime::now_utc()) {
            #[cfg(feature = "tracing")]
            tracing::trace!("`{}` expired", key);

            remove(&path)?;
            return Ok(None);
        }

        Ok(Some(record))
    }
}

impl Adapter for FileCache {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", fields(?key), skip_all)
    )]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AdapterError> {
        self.read(key)?.map(|record| record.payload()).transpose()
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", fields(?key, ?ttl), skip_all)
    )]
    fn set(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<(), AdapterError> {
        let path = self.path(key);
        let tmp = path.with_extension(format!("{}.tmp", std::process::id()));

        let record = serde_json::to_vec(&Record::new(key, payload, ttl))?;
        fs::write(&tmp, record)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, AdapterError> {
        Ok(remove(&self.path(key))?)
    }

    fn exists(&self, key: &str) -> Result<bool, AdapterError> {
        Ok(self.read(key)?.is_some())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(dir = ?self.dir), skip_all)
    )]
    fn purge(&self) -> Result<(), AdapterError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension() == Some(OsStr::new(EXTENSION)) {
                remove(&path)?;
            }
        }
        Ok(())
    }
}

/// Returns `true` if there was a file to remove.
fn remove(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
