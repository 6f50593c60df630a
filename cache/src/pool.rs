use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use rand::RngCore;

use crate::{
    Adapter, BatchFailure, CacheItem, CfgDebug, Entry, GcChance, Item, PoolConfig, Tag, TagMap,
    TaggableItem,
};

/// Cache pool over an [`Adapter`], with tag-based invalidation.
///
/// Items are written either right away ([`Pool::save`]) or queued and written
/// in one batch on [`Pool::commit`]. Tag bookkeeping follows the same split:
/// tags of a deferred item only reach the index when it is committed.
///
/// Dropping a pool with queued work commits it one last time.
pub struct Pool<A: Adapter> {
    adapter: A,
    config: PoolConfig,
    tag_map: TagMap,
    deferred: BTreeMap<String, Item>,
}

impl<A: Adapter> Pool<A> {
    pub fn new(adapter: A, config: PoolConfig) -> Self {
        let tag_map = TagMap::new(config.namespace.clone());
        Self {
            adapter,
            config,
            tag_map,
            deferred: BTreeMap::new(),
        }
    }

    pub fn builder(adapter: A) -> PoolBuilder<A> {
        PoolBuilder {
            adapter,
            config: PoolConfig::default(),
            rng: None,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn tag_map(&self) -> &TagMap {
        &self.tag_map
    }

    /// Items queued by [`Pool::save_deferred`] and not yet committed.
    pub fn deferred(&self) -> impl Iterator<Item = &Item> {
        self.deferred.values()
    }

    /// A queued item is returned as is. A missing key, or one the adapter
    /// could not read, comes back as a miss with an empty payload.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(?key), skip_all)
    )]
    pub fn get_item(&self, key: &str) -> Item {
        if let Some(item) = self.deferred.get(key) {
            return item.clone().into_hit();
        }

        match self.adapter.get(key) {
            Ok(Some(payload)) => Item::hit(key, payload),
            Ok(None) => Item::new(key),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("unable to read `{}` :: {:?}", key, _err);

                Item::new(key)
            }
        }
    }

    /// Items in the order of `keys`; only keys that are not queued reach the
    /// adapter, in a single batch read.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(?keys), skip_all)
    )]
    pub fn get_items<K>(&self, keys: &[K]) -> Vec<Item>
    where
        K: AsRef<str> + CfgDebug,
    {
        let missing = keys
            .iter()
            .map(AsRef::as_ref)
            .filter(|key| !self.deferred.contains_key(*key))
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let fetched = match missing.is_empty() {
            true => BTreeMap::new(),
            false => self.adapter.get_multiple(&missing),
        };

        keys.iter()
            .map(AsRef::as_ref)
            .map(|key| match self.deferred.get(key) {
                Some(item) => item.clone().into_hit(),
                None => match fetched.get(key).cloned().flatten() {
                    Some(payload) => Item::hit(key, payload),
                    None => Item::new(key),
                },
            })
            .collect()
    }

    /// Like [`Pool::get_item`], with the tags the index currently lists the
    /// key under as previous tags.
    pub fn get_taggable_item(&self, key: &str) -> TaggableItem {
        let item = self.get_item(key);
        let previous_tags = self.tag_map.tags_for(&self.adapter, key);
        TaggableItem::loaded(item, previous_tags)
    }

    pub fn has_item(&self, key: &str) -> bool {
        self.deferred.contains_key(key)
            || self
                .adapter
                .exists(key)
                .inspect_err(|_err| {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("unable to check `{}` :: {:?}", key, _err);
                })
                .unwrap_or(false)
    }

    /// Writes `item` right away. Tagged items have their tags indexed before
    /// returning; the result is `true` only if both the write and the index
    /// update went through.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(key = item.item().key()), skip_all, ret)
    )]
    pub fn save(&mut self, item: impl CacheItem) -> bool {
        let tags = effective_tags(&item);
        let item = item.into_item();

        // a direct save supersedes whatever was queued for the same key
        self.forget_deferred(item.key());

        let written = self.write(&item);

        let Some(tags) = tags else {
            return written;
        };

        self.tag_map.save(item.key(), tags, false);
        let indexed = self.tag_map.update(&self.adapter, false);

        written && indexed
    }

    /// Queues `item` for the next [`Pool::commit`], replacing any item queued
    /// under the same key.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(key = item.item().key()), skip_all, ret)
    )]
    pub fn save_deferred(&mut self, item: impl CacheItem) -> bool {
        let tags = effective_tags(&item);
        let item = item.into_item();

        self.tag_map.forget_delayed(item.key());
        if let Some(tags) = tags {
            self.tag_map.save(item.key(), tags, true);
        }

        self.deferred.insert(item.key().to_owned(), item);
        true
    }

    /// Writes every queued item in one batch and applies their tags.
    ///
    /// Items the adapter fails to write stay queued for the next commit. The
    /// result is `true` once nothing is left queued and the index is up to
    /// date. With nothing queued the delayed tags are still flushed, and the
    /// commit succeeds regardless.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(deferred = self.deferred.len()), skip_all, ret)
    )]
    pub fn commit(&mut self) -> bool {
        if self.deferred.is_empty() {
            let _indexed = self.tag_map.update(&self.adapter, true);

            #[cfg(feature = "tracing")]
            if !_indexed {
                tracing::warn!("tag index left unsaved for the next commit");
            }

            return true;
        }

        let failed = self.flush_deferred();
        self.deferred.retain(|key, _| failed.contains(key));

        #[cfg(feature = "tracing")]
        if !failed.is_empty() {
            tracing::warn!("{} deferred item(s) left for the next commit", failed.len());
        }

        let indexed = self.tag_map.update(&self.adapter, true);

        self.deferred.is_empty() && indexed
    }

    /// Deletes every item tagged `tag`.
    pub fn invalidate_tag(&mut self, tag: impl Tag) -> bool {
        self.invalidate_tags([tag])
    }

    /// Deletes every item tagged with any of `tags`, persisting the index once.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, ret)
    )]
    pub fn invalidate_tags<T: Tag>(&mut self, tags: impl IntoIterator<Item = T>) -> bool {
        for tag in tags {
            #[cfg(feature = "tracing")]
            tracing::debug!(?tag, "invalidating");

            self.tag_map.delete(tag.id(), self.config.gc_chance);
        }

        self.tag_map.update(&self.adapter, false)
    }

    /// A key that did not exist still counts as deleted. Tag memberships are
    /// left for the index to sweep.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(?key), skip_all, ret)
    )]
    pub fn delete_item(&mut self, key: &str) -> bool {
        self.forget_deferred(key);

        self.adapter
            .delete(key)
            .inspect_err(|_err| {
                #[cfg(feature = "tracing")]
                tracing::warn!("unable to delete `{}` :: {:?}", key, _err);
            })
            .is_ok()
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", fields(?keys), skip_all, ret)
    )]
    pub fn delete_items<K>(&mut self, keys: &[K]) -> bool
    where
        K: AsRef<str> + CfgDebug,
    {
        let keys = keys
            .iter()
            .map(|key| key.as_ref().to_owned())
            .collect::<Vec<_>>();

        for key in &keys {
            self.forget_deferred(key);
        }

        self.adapter
            .delete_multiple(&keys)
            .inspect_err(|_failure| {
                #[cfg(feature = "tracing")]
                tracing::warn!("{}", _failure);
            })
            .is_ok()
    }

    /// Drops queued items, purges the adapter and forgets the tag index.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, ret)
    )]
    pub fn clear(&mut self) -> bool {
        self.deferred.clear();

        let purged = self
            .adapter
            .purge()
            .inspect_err(|_err| {
                #[cfg(feature = "tracing")]
                tracing::warn!("unable to purge :: {:?}", _err);
            })
            .is_ok();
        let forgotten = self.tag_map.clear(&self.adapter);

        purged && forgotten
    }

    /// Drops the item queued under `key` along with its delayed tags.
    fn forget_deferred(&mut self, key: &str) {
        if self.deferred.remove(key).is_some() {
            self.tag_map.forget_delayed(key);
        }
    }

    fn resolve_ttl(&self, item: &Item) -> Option<Duration> {
        item.ttl().resolve(self.config.default_ttl)
    }

    fn write(&self, item: &Item) -> bool {
        let written = match self.resolve_ttl(item) {
            Some(ttl) if ttl.is_zero() => self.adapter.delete(item.key()).map(|_| ()),
            ttl => self.adapter.set(item.key(), item.payload(), ttl),
        };

        written
            .inspect_err(|_err| {
                #[cfg(feature = "tracing")]
                tracing::warn!("unable to write `{}` :: {:?}", item.key(), _err);
            })
            .is_ok()
    }

    /// Returns the keys that did not make it to the adapter.
    fn flush_deferred(&self) -> BTreeSet<String> {
        let mut entries = Vec::new();
        let mut expired = Vec::new();

        for item in self.deferred.values() {
            match self.resolve_ttl(item) {
                Some(ttl) if ttl.is_zero() => expired.push(item.key().to_owned()),
                ttl => entries.push(Entry {
                    key: item.key().to_owned(),
                    payload: item.payload().to_vec(),
                    ttl,
                }),
            }
        }

        let mut failed = BTreeSet::new();

        if !entries.is_empty() {
            if let Err(BatchFailure { failed: keys }) = self.adapter.set_multiple(&entries) {
                failed.extend(keys);
            }
        }

        if !expired.is_empty() {
            if let Err(BatchFailure { failed: keys }) = self.adapter.delete_multiple(&expired) {
                failed.extend(keys);
            }
        }

        failed
    }
}

impl<A: Adapter> Drop for Pool<A> {
    fn drop(&mut self) {
        if self.deferred.is_empty() && !self.tag_map.has_pending() && !self.tag_map.is_dirty() {
            return;
        }

        let _committed = self.commit();

        #[cfg(feature = "tracing")]
        if !_committed {
            tracing::warn!(
                "pool dropped with {} uncommitted item(s)",
                self.deferred.len()
            );
        }
    }
}

pub struct PoolBuilder<A> {
    adapter: A,
    config: PoolConfig,
    rng: Option<Box<dyn RngCore + Send>>,
}

impl<A: Adapter> PoolBuilder<A> {
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    pub fn gc_chance(mut self, gc_chance: GcChance) -> Self {
        self.config.gc_chance = gc_chance;
        self
    }

    /// Random source deciding when invalidations sweep the tag index.
    pub fn rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn build(self) -> Pool<A> {
        let tag_map = match self.rng {
            Some(rng) => TagMap::with_rng(self.config.namespace.clone(), rng),
            None => TagMap::new(self.config.namespace.clone()),
        };

        Pool {
            adapter: self.adapter,
            config: self.config,
            tag_map,
            deferred: BTreeMap::new(),
        }
    }
}

/// Tags an item should be indexed under, if any.
fn effective_tags(item: &impl CacheItem) -> Option<BTreeSet<String>> {
    item.tags().filter(|tags| !tags.is_empty()).cloned()
}
