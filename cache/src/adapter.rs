use std::{collections::BTreeMap, sync::Arc, time::Duration};

use crate::{AdapterError, BatchFailure};

/// A single write handed to [`Adapter::set_multiple`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub payload: Vec<u8>,
    /// `None` stores the entry without expiry.
    pub ttl: Option<Duration>,
}

/// Backing store the pool and the tag index read from and write to.
///
/// Keys reach the adapter already validated and payloads already serialized.
/// Expiry and eviction are the adapter's business: an expired entry must read
/// back as absent.
pub trait Adapter {
    /// Returns `Ok(None)` if the key does not exist or has expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AdapterError>;

    fn set(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<(), AdapterError>;

    /// Returns `true` if the key existed.
    fn delete(&self, key: &str) -> Result<bool, AdapterError>;

    fn exists(&self, key: &str) -> Result<bool, AdapterError> {
        Ok(self.get(key)?.is_some())
    }

    /// Drops every entry the adapter holds.
    fn purge(&self) -> Result<(), AdapterError>;

    /// Default implementation calls `get()` for each key. A key that could not
    /// be read is reported as absent.
    fn get_multiple(&self, keys: &[String]) -> BTreeMap<String, Option<Vec<u8>>> {
        keys.iter()
            .map(|key| {
                let payload = self.get(key).unwrap_or_else(|_err| {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("unable to read `{}` :: {:?}", key, _err);

                    None
                });
                (key.clone(), payload)
            })
            .collect()
    }

    /// Default implementation calls `set()` for each entry. Backends may
    /// override it with a real batch write.
    fn set_multiple(&self, entries: &[Entry]) -> Result<(), BatchFailure> {
        collect_failures(
            entries
                .iter()
                .map(|entry| (&entry.key, self.set(&entry.key, &entry.payload, entry.ttl))),
        )
    }

    /// Default implementation calls `delete()` for each key. A key that did not
    /// exist is not a failure.
    fn delete_multiple(&self, keys: &[String]) -> Result<(), BatchFailure> {
        collect_failures(keys.iter().map(|key| (key, self.delete(key).map(|_| ()))))
    }
}

fn collect_failures<'a>(
    results: impl Iterator<Item = (&'a String, Result<(), AdapterError>)>,
) -> Result<(), BatchFailure> {
    let failed = results
        .filter_map(|(key, result)| match result {
            Ok(()) => None,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("batch operation failed for `{}` :: {:?}", key, _err);

                Some(key.clone())
            }
        })
        .collect::<Vec<_>>();

    match failed.is_empty() {
        true => Ok(()),
        false => Err(BatchFailure { failed }),
    }
}

macro_rules! forward_adapter {
    ( $( $ty:ty ),* ) => {
        $(
            impl<A: Adapter + ?Sized> Adapter for $ty {
                fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AdapterError> {
                    (**self).get(key)
                }

                fn set(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<(), AdapterError> {
                    (**self).set(key, payload, ttl)
                }

                fn delete(&self, key: &str) -> Result<bool, AdapterError> {
                    (**self).delete(key)
                }

                fn exists(&self, key: &str) -> Result<bool, AdapterError> {
                    (**self).exists(key)
                }

                fn purge(&self) -> Result<(), AdapterError> {
                    (**self).purge()
                }

                fn get_multiple(&self, keys: &[String]) -> BTreeMap<String, Option<Vec<u8>>> {
                    (**self).get_multiple(keys)
                }

                fn set_multiple(&self, entries: &[Entry]) -> Result<(), BatchFailure> {
                    (**self).set_multiple(entries)
                }

                fn delete_multiple(&self, keys: &[String]) -> Result<(), BatchFailure> {
                    (**self).delete_multiple(keys)
                }
            }
        )*
    };
}

forward_adapter!(&A, Box<A>, Arc<A>);
