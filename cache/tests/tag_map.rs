mod shared;

use cache::{GcChance, Tags};
use shared::{Call, Recorder, index, record, record_key, seed_index, tag_map, tags};

#[test]
fn repeated_save_lists_key_once() {
    #[cfg(feature = "tracing")]
    shared::tracing_init();

    let adapter = Recorder::default();
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), false);
    tag_map.save("k", tags(&["t"]), false);
    assert!(tag_map.update(&adapter, false));

    assert_eq!(record(&adapter), Some(index(&[("t", &["k"])])));
}

#[test]
fn unchanged_index_is_not_written_again() {
    let adapter = Recorder::default();
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), false);
    assert!(tag_map.update(&adapter, false));
    tag_map.save("k", tags(&["t"]), false);
    assert!(tag_map.update(&adapter, false));

    let writes = adapter
        .calls()
        .into_iter()
        .filter(|call| *call == Call::Set(record_key()))
        .count();
    assert_eq!(writes, 1);
}

#[test]
fn delayed_tags_wait_for_commit() {
    let adapter = Recorder::default();
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), true);

    assert!(tag_map.update(&adapter, false));
    assert_eq!(record(&adapter), None);
    assert!(tag_map.has_pending());

    assert!(tag_map.update(&adapter, true));
    assert_eq!(record(&adapter), Some(index(&[("t", &["k"])])));
    assert!(!tag_map.has_pending());
}

#[test]
fn invalidation_deletes_every_member() {
    let adapter = Recorder::default();
    seed_index(&adapter, &index(&[("t", &["a", "b", "c"])]));
    for key in ["a", "b", "c"] {
        adapter.insert_raw(key, b"v");
    }
    let mut tag_map = tag_map();

    tag_map.delete("t", GcChance::NEVER);
    assert!(tag_map.update(&adapter, false));

    assert!(
        adapter
            .calls()
            .contains(&Call::DeleteMultiple(vec!["a".into(), "b".into(), "c".into()]))
    );
    assert_eq!(record(&adapter), Some(Tags::new()));
    assert_eq!(adapter.keys(), vec![record_key()]);
}

#[test]
fn unknown_tag_is_a_noop() {
    let adapter = Recorder::default();
    seed_index(&adapter, &index(&[("t", &["a"])]));
    let mut tag_map = tag_map();

    tag_map.delete("unknown", GcChance::ALWAYS);
    assert!(tag_map.update(&adapter, false));

    assert_eq!(adapter.calls(), vec![Call::Get(record_key())]);
    assert_eq!(record(&adapter), Some(index(&[("t", &["a"])])));
}

#[test]
fn persisted_index_loads_back() {
    let adapter = Recorder::default();
    let mut tag_map = tag_map();

    tag_map.save("k1", tags(&["a", "b"]), false);
    tag_map.save("k2", tags(&["b"]), false);
    assert!(tag_map.update(&adapter, false));
    assert!(tag_map.loaded().is_none());

    let reloaded = shared::tag_map();
    assert_eq!(reloaded.tags_for(&adapter, "k1"), tags(&["a", "b"]));
    assert_eq!(reloaded.members(&adapter, "b"), vec!["k1", "k2"]);
    assert!(reloaded.loaded().is_none());
}

#[test]
fn every_update_reads_the_current_record() {
    let adapter = Recorder::default();
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), false);
    assert!(tag_map.update(&adapter, false));
    tag_map.delete("unknown", GcChance::NEVER);
    assert!(tag_map.update(&adapter, false));
    assert!(tag_map.loaded().is_none());

    // another writer adds to the index in between
    seed_index(&adapter, &index(&[("t", &["k"]), ("other", &["o"])]));

    tag_map.save("k2", tags(&["t"]), false);
    assert!(tag_map.update(&adapter, false));

    assert_eq!(
        record(&adapter),
        Some(index(&[("other", &["o"]), ("t", &["k", "k2"])]))
    );
}

#[test]
fn forgotten_delayed_tags_never_reach_the_index() {
    let adapter = Recorder::default();
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["old"]), true);
    tag_map.save("other", tags(&["old"]), true);
    tag_map.forget_delayed("k");
    assert!(tag_map.update(&adapter, true));

    assert_eq!(record(&adapter), Some(index(&[("old", &["other"])])));
}

#[test]
fn gc_sweeps_deleted_keys_from_other_tags() {
    let adapter = Recorder::default();
    seed_index(&adapter, &index(&[("t1", &["a"]), ("t2", &["a", "b"])]));
    let mut tag_map = tag_map();

    tag_map.delete("t1", GcChance::ALWAYS);
    assert!(tag_map.update(&adapter, false));

    assert_eq!(record(&adapter), Some(index(&[("t2", &["b"])])));
}

#[test]
fn without_gc_other_tags_keep_dangling_keys() {
    let adapter = Recorder::default();
    seed_index(&adapter, &index(&[("t1", &["a"]), ("t2", &["a", "b"])]));
    let mut tag_map = tag_map();

    tag_map.delete("t1", GcChance::NEVER);
    assert!(tag_map.update(&adapter, false));

    assert_eq!(record(&adapter), Some(index(&[("t2", &["a", "b"])])));
}

#[test]
fn gc_drops_tags_left_empty() {
    let adapter = Recorder::default();
    seed_index(&adapter, &index(&[("red", &["k1", "k2"]), ("blue", &["k2"])]));
    let mut tag_map = tag_map();

    tag_map.delete("red", GcChance::ALWAYS);
    assert!(tag_map.update(&adapter, false));

    assert!(
        adapter
            .calls()
            .contains(&Call::DeleteMultiple(vec!["k1".into(), "k2".into()]))
    );
    assert_eq!(record(&adapter), Some(Tags::new()));
}

#[test]
fn corrupt_index_starts_over() {
    let adapter = Recorder::default();
    adapter.insert_raw(&record_key(), b"{ not json");
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), false);
    assert!(tag_map.update(&adapter, false));

    assert_eq!(record(&adapter), Some(index(&[("t", &["k"])])));
}

#[test]
fn failed_persist_is_retried_from_memory() {
    let adapter = Recorder::default();
    adapter.fail_writes(&record_key());
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), false);
    assert!(!tag_map.update(&adapter, false));
    assert!(tag_map.is_dirty());
    assert_eq!(tag_map.loaded(), Some(&index(&[("t", &["k"])])));

    adapter.recover(&record_key());
    adapter.take_calls();
    assert!(tag_map.update(&adapter, false));

    assert_eq!(adapter.calls(), vec![Call::Set(record_key())]);
    assert_eq!(record(&adapter), Some(index(&[("t", &["k"])])));
    assert!(!tag_map.is_dirty());
    assert!(tag_map.loaded().is_none());
}

#[test]
fn unreadable_index_keeps_actions_queued() {
    let adapter = Recorder::default();
    adapter.fail_reads(&record_key());
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), false);
    assert!(!tag_map.update(&adapter, false));
    assert!(tag_map.has_pending());
    assert!(tag_map.loaded().is_none());

    adapter.recover(&record_key());
    assert!(tag_map.update(&adapter, false));
    assert_eq!(record(&adapter), Some(index(&[("t", &["k"])])));
}

#[test]
fn members_that_fail_to_delete_stay_tagged() {
    let adapter = Recorder::default();
    seed_index(&adapter, &index(&[("t", &["a", "b", "c"])]));
    adapter.fail_writes("b");
    let mut tag_map = tag_map();

    tag_map.delete("t", GcChance::NEVER);
    assert!(tag_map.update(&adapter, false));
    assert_eq!(record(&adapter), Some(index(&[("t", &["b"])])));

    adapter.recover("b");
    tag_map.delete("t", GcChance::NEVER);
    assert!(tag_map.update(&adapter, false));
    assert_eq!(record(&adapter), Some(Tags::new()));
}

#[test]
fn clear_forgets_the_index() {
    let adapter = Recorder::default();
    let mut tag_map = tag_map();

    tag_map.save("k", tags(&["t"]), false);
    assert!(tag_map.update(&adapter, false));
    tag_map.save("other", tags(&["t"]), true);

    assert!(tag_map.clear(&adapter));

    assert_eq!(record(&adapter), None);
    assert!(!tag_map.has_pending());
    assert!(tag_map.tags_for(&adapter, "k").is_empty());
}
