use std::{
    collections::BTreeSet,
    ops::{Deref, DerefMut},
    time::Duration,
};

use time::OffsetDateTime;

use crate::Tag;

/// Expiry requested for an item.
///
/// `Default` and `Never` are both "no explicit duration" but mean different
/// things: the first defers to the pool, the second opts out of expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    #[default]
    Default,
    Never,
    After(Duration),
}

impl Ttl {
    /// Resolves against the pool-wide default. `None` means no expiry.
    pub fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        match self {
            Ttl::Default => default,
            Ttl::Never => None,
            Ttl::After(ttl) => Some(ttl),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    key: String,
    payload: Vec<u8>,
    ttl: Ttl,
    hit: bool,
}

impl Item {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: Vec::new(),
            ttl: Ttl::Default,
            hit: false,
        }
    }

    pub(crate) fn hit(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
            ttl: Ttl::Default,
            hit: true,
        }
    }

    pub(crate) fn into_hit(mut self) -> Self {
        self.hit = true;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// `true` only for items read back from the pool.
    pub fn is_hit(&self) -> bool {
        self.hit
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn set(&mut self, payload: impl Into<Vec<u8>>) -> &mut Self {
        self.payload = payload.into();
        self
    }

    /// `None` falls back to the pool-wide default.
    pub fn expires_after(&mut self, ttl: Option<Duration>) -> &mut Self {
        self.ttl = ttl.map_or(Ttl::Default, Ttl::After);
        self
    }

    /// An instant in the past yields a zero ttl, which the pool treats as
    /// already expired.
    pub fn expires_at(&mut self, at: OffsetDateTime) -> &mut Self {
        let remaining = at - OffsetDateTime::now_utc();
        self.ttl = Ttl::After(Duration::try_from(remaining).unwrap_or(Duration::ZERO));
        self
    }

    pub fn never_expires(&mut self) -> &mut Self {
        self.ttl = Ttl::Never;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.set(payload);
        self
    }

    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }
}

/// An [`Item`] that can be attached to tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggableItem {
    item: Item,
    current_tags: Option<BTreeSet<String>>,
    previous_tags: BTreeSet<String>,
}

impl TaggableItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self::from(Item::new(key))
    }

    pub(crate) fn loaded(item: Item, previous_tags: BTreeSet<String>) -> Self {
        Self {
            item,
            current_tags: None,
            previous_tags,
        }
    }

    /// Tags used for indexing: the ones set on this item, or the ones it was
    /// loaded with if none were set.
    pub fn tags(&self) -> &BTreeSet<String> {
        self.current_tags.as_ref().unwrap_or(&self.previous_tags)
    }

    pub fn previous_tags(&self) -> &BTreeSet<String> {
        &self.previous_tags
    }

    /// Replaces the tag set.
    pub fn set_tags<T: Tag>(&mut self, tags: impl IntoIterator<Item = T>) -> &mut Self {
        self.current_tags = Some(tags.into_iter().map(|tag| tag.id().to_owned()).collect());
        self
    }

    /// Adds to the effective tag set.
    pub fn add_tag(&mut self, tag: impl Tag) -> &mut Self {
        self.current_tags
            .get_or_insert_with(|| self.previous_tags.clone())
            .insert(tag.id().to_owned());
        self
    }

    pub fn with_tags<T: Tag>(mut self, tags: impl IntoIterator<Item = T>) -> Self {
        self.set_tags(tags);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.item.set(payload);
        self
    }

    pub fn into_item(self) -> Item {
        self.item
    }
}

impl From<Item> for TaggableItem {
    fn from(item: Item) -> Self {
        Self::loaded(item, BTreeSet::new())
    }
}

impl Deref for TaggableItem {
    type Target = Item;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

impl DerefMut for TaggableItem {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.item
    }
}

/// Anything the pool can save: a plain [`Item`] or a [`TaggableItem`].
pub trait CacheItem {
    fn item(&self) -> &Item;

    /// Effective tags, or `None` for items that do not take part in tagging.
    fn tags(&self) -> Option<&BTreeSet<String>> {
        None
    }

    fn into_item(self) -> Item;
}

impl CacheItem for Item {
    fn item(&self) -> &Item {
        self
    }

    fn into_item(self) -> Item {
        self
    }
}

impl CacheItem for TaggableItem {
    fn item(&self) -> &Item {
        &self.item
    }

    fn tags(&self) -> Option<&BTreeSet<String>> {
        Some(TaggableItem::tags(self))
    }

    fn into_item(self) -> Item {
        self.item
    }
}
