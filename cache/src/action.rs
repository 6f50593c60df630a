use std::collections::{BTreeMap, BTreeSet, HashSet};

use rand::RngCore;

use crate::{Adapter, BatchFailure, GcChance};

/// Tag name to member keys, in the order they were tagged.
pub type Tags = BTreeMap<String, Vec<String>>;

/// A tag index mutation captured when it is requested and applied on the next
/// [`TagMap::update`](crate::TagMap::update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Tag {
        key: String,
        tags: BTreeSet<String>,
    },
    Invalidate {
        tag: String,
        gc_chance: GcChance,
    },
}

/// Returns `true` if the map changed.
pub(crate) fn apply<A>(
    action: Action,
    map: &mut Tags,
    adapter: &A,
    rng: &mut dyn RngCore,
) -> bool
where
    A: Adapter + ?Sized,
{
    match action {
        Action::Tag { key, tags } => tag(map, key, tags),
        Action::Invalidate { tag, gc_chance } => invalidate(map, tag, gc_chance, adapter, rng),
    }
}

fn tag(map: &mut Tags, key: String, tags: BTreeSet<String>) -> bool {
    let mut changed = false;
    for tag in tags {
        let members = map.entry(tag).or_default();
        if !members.contains(&key) {
            members.push(key.clone());
            changed = true;
        }
    }
    changed
}

fn invalidate<A>(
    map: &mut Tags,
    tag: String,
    gc_chance: GcChance,
    adapter: &A,
    rng: &mut dyn RngCore,
) -> bool
where
    A: Adapter + ?Sized,
{
    let Some(members) = map.remove(&tag) else {
        #[cfg(feature = "tracing")]
        tracing::debug!("tag `{}` not found", tag);

        return false;
    };

    let deleted = match adapter.delete_multiple(&members) {
        Ok(()) => members,
        Err(BatchFailure { failed }) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "{} member(s) of tag `{}` could not be deleted, keeping them",
                failed.len(),
                tag
            );

            let (remaining, deleted) = members
                .into_iter()
                .partition::<Vec<_>, _>(|key| failed.contains(key));
            if !remaining.is_empty() {
                map.insert(tag, remaining);
            }
            deleted
        }
    };

    if gc_chance.roll(rng) {
        sweep(map, &deleted);
    }

    true
}

/// Drops `deleted` from every tag, and every tag left without members.
fn sweep(map: &mut Tags, deleted: &[String]) {
    let deleted = deleted.iter().map(String::as_str).collect::<HashSet<_>>();
    map.retain(|_tag, members| {
        members.retain(|key| !deleted.contains(key.as_str()));
        !members.is_empty()
    });
}
