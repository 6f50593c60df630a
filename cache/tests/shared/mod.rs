#![allow(dead_code)]

pub mod macros;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use cache::{Adapter, AdapterError, BatchFailure, Entry, GcChance, Pool, TagMap, Tags};
use rand::{SeedableRng, rngs::StdRng};

pub const NAMESPACE: &str = "test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Set(String),
    Delete(String),
    Purge,
    GetMultiple(Vec<String>),
    SetMultiple(Vec<String>),
    DeleteMultiple(Vec<String>),
}

/// In-memory adapter that records every call and fails on demand.
#[derive(Default)]
pub struct Recorder {
    entries: Mutex<BTreeMap<String, (Vec<u8>, Option<Duration>)>>,
    failing_writes: Mutex<BTreeSet<String>>,
    failing_reads: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    /// Makes writes and deletes of `key` fail.
    pub fn fail_writes(&self, key: &str) {
        self.failing_writes.lock().unwrap().insert(key.to_owned());
    }

    pub fn fail_reads(&self, key: &str) {
        self.failing_reads.lock().unwrap().insert(key.to_owned());
    }

    pub fn recover(&self, key: &str) {
        self.failing_writes.lock().unwrap().remove(key);
        self.failing_reads.lock().unwrap().remove(key);
    }

    pub fn insert_raw(&self, key: &str, payload: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (payload.to_vec(), None));
    }

    pub fn payload(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(payload, _)| payload.clone())
    }

    /// `None` if the key is absent, `Some(None)` if stored without expiry.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn write_fails(&self, key: &str) -> bool {
        self.failing_writes.lock().unwrap().contains(key)
    }

    fn read_fails(&self, key: &str) -> bool {
        self.failing_reads.lock().unwrap().contains(key)
    }

    fn store(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<(), AdapterError> {
        if self.write_fails(key) {
            return Err(injected(key));
        }
        self.insert(key, payload, ttl);
        Ok(())
    }

    fn insert(&self, key: &str, payload: &[u8], ttl: Option<Duration>) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (payload.to_vec(), ttl));
    }

    fn remove(&self, key: &str) -> Result<bool, AdapterError> {
        if self.write_fails(key) {
            return Err(injected(key));
        }
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }
}

impl Adapter for Recorder {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AdapterError> {
        self.record(Call::Get(key.to_owned()));
        if self.read_fails(key) {
            return Err(injected(key));
        }
        Ok(self.payload(key))
    }

    fn set(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<(), AdapterError> {
        self.record(Call::Set(key.to_owned()));
        self.store(key, payload, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool, AdapterError> {
        self.record(Call::Delete(key.to_owned()));
        self.remove(key)
    }

    fn purge(&self) -> Result<(), AdapterError> {
        self.record(Call::Purge);
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    fn get_multiple(&self, keys: &[String]) -> BTreeMap<String, Option<Vec<u8>>> {
        self.record(Call::GetMultiple(keys.to_vec()));
        keys.iter()
            .map(|key| (key.clone(), self.payload(key)))
            .collect()
    }

    fn set_multiple(&self, entries: &[Entry]) -> Result<(), BatchFailure> {
        self.record(Call::SetMultiple(
            entries.iter().map(|entry| entry.key.clone()).collect(),
        ));
        let failed = entries
            .iter()
            .filter(|entry| self.store(&entry.key, &entry.payload, entry.ttl).is_err())
            .map(|entry| entry.key.clone())
            .collect::<Vec<_>>();
        failures(failed)
    }

    fn delete_multiple(&self, keys: &[String]) -> Result<(), BatchFailure> {
        self.record(Call::DeleteMultiple(keys.to_vec()));
        let failed = keys
            .iter()
            .filter(|key| self.remove(key).is_err())
            .cloned()
            .collect::<Vec<_>>();
        failures(failed)
    }
}

fn injected(key: &str) -> AdapterError {
    AdapterError::Io(std::io::Error::other(format!("injected failure for `{}`", key)))
}

fn failures(failed: Vec<String>) -> Result<(), BatchFailure> {
    match failed.is_empty() {
        true => Ok(()),
        false => Err(BatchFailure { failed }),
    }
}

pub fn tags(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|tag| tag.to_string()).collect()
}

pub fn index(entries: &[(&str, &[&str])]) -> Tags {
    entries
        .iter()
        .map(|(tag, keys)| {
            (
                tag.to_string(),
                keys.iter().map(|key| key.to_string()).collect(),
            )
        })
        .collect()
}

pub fn record_key() -> String {
    TagMap::new(NAMESPACE).record_key()
}

/// The persisted tag index, without going through the recorder's call log.
pub fn record(adapter: &Recorder) -> Option<Tags> {
    adapter
        .payload(&record_key())
        .map(|record| serde_json::from_slice(&record).expect("tag index is not valid json"))
}

pub fn seed_index(adapter: &Recorder, tags: &Tags) {
    let record = serde_json::to_vec(tags).expect("unable to encode tag index");
    adapter.insert_raw(&record_key(), &record);
}

pub fn tag_map() -> TagMap {
    TagMap::with_rng(NAMESPACE, StdRng::seed_from_u64(7))
}

pub fn pool(adapter: &Arc<Recorder>, gc_chance: GcChance) -> Pool<Arc<Recorder>> {
    Pool::builder(Arc::clone(adapter))
        .namespace(NAMESPACE)
        .gc_chance(gc_chance)
        .rng(StdRng::seed_from_u64(7))
        .build()
}

#[cfg(feature = "tracing")]
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
