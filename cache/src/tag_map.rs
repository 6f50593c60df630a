use std::collections::{BTreeSet, VecDeque};

use rand::{RngCore, SeedableRng, rngs::StdRng};

use crate::{
    Adapter, AdapterError, GcChance,
    action::{self, Action, Tags},
};

const RECORD_PREFIX: &str = "tag-map:";

/// Secondary index from tag to member keys, persisted through the adapter as
/// a single JSON record.
///
/// Mutations are queued and only applied by [`TagMap::update`]. The record is
/// fetched lazily and forgotten again after every successful persist, so each
/// update works against a fresh copy. Two pools persisting the same namespace
/// concurrently can still overwrite each other's changes.
pub struct TagMap {
    namespace: String,
    tags: Option<Tags>,
    immediate: VecDeque<Action>,
    delayed: VecDeque<Action>,
    dirty: bool,
    rng: Box<dyn RngCore + Send>,
}

impl TagMap {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_rng(namespace, StdRng::from_rng(&mut rand::rng()))
    }

    /// Uses `rng` to decide when an invalidation sweeps the other tags.
    pub fn with_rng(namespace: impl Into<String>, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            namespace: namespace.into(),
            tags: None,
            immediate: VecDeque::new(),
            delayed: VecDeque::new(),
            dirty: false,
            rng: Box::new(rng),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Adapter key the index is persisted under.
    pub fn record_key(&self) -> String {
        format!("{}{}", RECORD_PREFIX, self.namespace)
    }

    /// The in-memory copy, if one is loaded.
    pub fn loaded(&self) -> Option<&Tags> {
        self.tags.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_pending(&self) -> bool {
        !self.immediate.is_empty() || !self.delayed.is_empty()
    }

    /// Queues adding `key` to each of `tags`. Delayed additions wait for a
    /// committing update.
    pub fn save(&mut self, key: impl Into<String>, tags: BTreeSet<String>, delayed: bool) {
        let action = Action::Tag {
            key: key.into(),
            tags,
        };
        match delayed {
            true => self.delayed.push_back(action),
            false => self.immediate.push_back(action),
        }
    }

    /// Drops delayed tag additions queued for `key`.
    pub fn forget_delayed(&mut self, key: &str) {
        self.delayed.retain(|action| match action {
            Action::Tag { key: queued, .. } => queued != key,
            Action::Invalidate { .. } => true,
        });
    }

    /// Queues deleting every item tagged `tag` and forgetting the tag.
    pub fn delete(&mut self, tag: impl Into<String>, gc_chance: GcChance) {
        self.immediate.push_back(Action::Invalidate {
            tag: tag.into(),
            gc_chance,
        });
    }

    /// Applies the queued actions and persists the index if it changed.
    ///
    /// Immediate actions always run; delayed ones only when `commit` is set.
    /// Returns `false` if the index could not be read or written back. Actions
    /// stay queued when the read fails; a failed write keeps the changes in
    /// memory for the next attempt. Otherwise the copy is dropped, so the next
    /// update fetches the record again.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            fields(namespace = %self.namespace, commit = commit),
            skip_all,
            ret
        )
    )]
    pub fn update<A>(&mut self, adapter: &A, commit: bool) -> bool
    where
        A: Adapter + ?Sized,
    {
        let runnable = !self.immediate.is_empty() || (commit && !self.delayed.is_empty());
        if runnable {
            let record_key = self.record_key();
            let tags = match load(&mut self.tags, &record_key, adapter) {
                Ok(tags) => tags,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("unable to load tag index `{}` :: {:?}", record_key, _err);

                    return false;
                }
            };

            while let Some(action) = self.immediate.pop_front() {
                self.dirty |= action::apply(action, tags, adapter, &mut *self.rng);
            }

            if commit {
                while let Some(action) = self.delayed.pop_front() {
                    self.dirty |= action::apply(action, tags, adapter, &mut *self.rng);
                }
            }
        }

        if !self.dirty {
            self.tags = None;
            return true;
        }

        self.persist(adapter)
    }

    /// Deletes the persisted index and drops any queued action. Tagged items
    /// are left in place.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(namespace = %self.namespace), skip_all, ret)
    )]
    pub fn clear<A>(&mut self, adapter: &A) -> bool
    where
        A: Adapter + ?Sized,
    {
        self.tags = None;
        self.dirty = false;
        self.immediate.clear();
        self.delayed.clear();

        adapter
            .delete(&self.record_key())
            .inspect_err(|_err| {
                #[cfg(feature = "tracing")]
                tracing::warn!("unable to delete tag index :: {:?}", _err);
            })
            .is_ok()
    }

    /// Tags currently listing `key`. Queued actions are not applied.
    pub fn tags_for<A>(&self, adapter: &A, key: &str) -> BTreeSet<String>
    where
        A: Adapter + ?Sized,
    {
        self.read(adapter)
            .map(|tags| {
                tags.into_iter()
                    .filter(|(_, members)| members.iter().any(|member| member == key))
                    .map(|(tag, _)| tag)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys currently listed under `tag`. Queued actions are not applied.
    pub fn members<A>(&self, adapter: &A, tag: &str) -> Vec<String>
    where
        A: Adapter + ?Sized,
    {
        self.read(adapter)
            .and_then(|mut tags| tags.remove(tag))
            .unwrap_or_default()
    }

    /// The unsaved copy if a persist failed, the stored record otherwise.
    /// Nothing is kept in memory.
    fn read<A>(&self, adapter: &A) -> Option<Tags>
    where
        A: Adapter + ?Sized,
    {
        if let Some(tags) = &self.tags {
            return Some(tags.clone());
        }

        let record_key = self.record_key();
        fetch(&record_key, adapter)
            .inspect_err(|_err| {
                #[cfg(feature = "tracing")]
                tracing::warn!("unable to load tag index `{}` :: {:?}", record_key, _err);
            })
            .ok()
    }

    fn persist<A>(&mut self, adapter: &A) -> bool
    where
        A: Adapter + ?Sized,
    {
        let Some(tags) = &self.tags else {
            return true;
        };

        let record_key = self.record_key();
        let written = serde_json::to_vec(tags)
            .map_err(AdapterError::from)
            .and_then(|record| adapter.set(&record_key, &record, None));

        match written {
            Ok(()) => {
                self.dirty = false;
                self.tags = None;
                true
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("unable to persist tag index `{}` :: {:?}", record_key, _err);

                false
            }
        }
    }
}

/// Fetches the record into `slot` unless a copy is already loaded.
fn load<'a, A>(
    slot: &'a mut Option<Tags>,
    record_key: &str,
    adapter: &A,
) -> Result<&'a mut Tags, AdapterError>
where
    A: Adapter + ?Sized,
{
    if slot.is_none() {
        *slot = Some(fetch(record_key, adapter)?);
    }

    Ok(slot.get_or_insert_with(Tags::new))
}

/// A missing or undecodable record reads as an empty index.
fn fetch<A>(record_key: &str, adapter: &A) -> Result<Tags, AdapterError>
where
    A: Adapter + ?Sized,
{
    let tags = match adapter.get(record_key)? {
        Some(record) => serde_json::from_slice(&record).unwrap_or_else(|_err| {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "tag index `{}` is corrupt, starting over :: {:?}",
                record_key,
                _err
            );

            Tags::new()
        }),
        None => Tags::new(),
    };

    Ok(tags)
}
