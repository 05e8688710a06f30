use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use switchboard_core::{Ability, Channel, GatewayError, IndexSnapshot, normalize_model, select_one};
use switchboard_types::ChannelStatus;

fn ch(id: i64, priority: i64, weight: i64, tag: Option<&str>) -> Channel {
    Channel {
        id,
        name: format!("channel-{id}"),
        upstream: "openai".to_string(),
        status: ChannelStatus::Enabled,
        key: format!("k{id}"),
        models: "gpt-4,gpt-4-gizmo-*".to_string(),
        groups: "default".to_string(),
        priority,
        weight,
        tag: tag.map(str::to_string),
        settings: None,
    }
}

fn snapshot_of(channels: Vec<Channel>) -> IndexSnapshot {
    let mut abilities = Vec::new();
    for c in &channels {
        for g in c.group_list() {
            for m in c.model_list() {
                abilities.push(Ability {
                    group: g.to_string(),
                    model: m.to_string(),
                    channel_id: c.id,
                });
            }
        }
    }
    IndexSnapshot::build(channels, &abilities)
}

/// Rng that fails the test if the selector consults it.
struct PanicRng;

impl RngCore for PanicRng {
    fn next_u32(&mut self) -> u32 {
        panic!("selector drew randomness on a deterministic path")
    }
    fn next_u64(&mut self) -> u64 {
        panic!("selector drew randomness on a deterministic path")
    }
    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        panic!("selector drew randomness on a deterministic path")
    }
}

#[test]
fn retry_steps_down_the_priority_tiers() {
    let snapshot = snapshot_of(vec![
        ch(1, 10, 1, None),
        ch(2, 10, 1, None),
        ch(3, 5, 1, None),
        ch(4, 1, 1, None),
    ]);
    let mut rng = SmallRng::seed_from_u64(5);

    for _ in 0..200 {
        let first = select_one(&snapshot, &mut rng, "default", "gpt-4", 0, None, 10).unwrap();
        assert_eq!(first.priority, 10);
        let second = select_one(&snapshot, &mut rng, "default", "gpt-4", 1, None, 10).unwrap();
        assert_eq!(second.id, 3);
        let third = select_one(&snapshot, &mut rng, "default", "gpt-4", 2, None, 10).unwrap();
        assert_eq!(third.id, 4);
    }
}

#[test]
fn retry_clamps_to_the_last_tier() {
    let snapshot = snapshot_of(vec![ch(1, 10, 1, None), ch(2, 5, 1, None)]);
    let mut rng = SmallRng::seed_from_u64(5);

    let selected = select_one(&snapshot, &mut rng, "default", "gpt-4", 99, None, 10).unwrap();
    assert_eq!(selected.id, 2);
}

#[test]
fn single_candidate_short_circuits_without_randomness() {
    let snapshot = snapshot_of(vec![ch(1, 10, 1, None)]);
    let selected = select_one(&snapshot, &mut PanicRng, "default", "gpt-4", 0, None, 10).unwrap();
    assert_eq!(selected.id, 1);
}

#[test]
fn single_candidate_within_tier_short_circuits_without_randomness() {
    let snapshot = snapshot_of(vec![ch(1, 10, 1, None), ch(2, 5, 1, None)]);
    let selected = select_one(&snapshot, &mut PanicRng, "default", "gpt-4", 1, None, 10).unwrap();
    assert_eq!(selected.id, 2);
}

#[test]
fn empty_bucket_misses() {
    let snapshot = snapshot_of(vec![ch(1, 10, 1, None)]);
    let mut rng = SmallRng::seed_from_u64(5);

    let err = select_one(&snapshot, &mut rng, "x", "y", 0, None, 10).unwrap_err();
    assert!(matches!(err, GatewayError::NoChannel { .. }));
}

#[test]
fn tag_filter_restricts_and_misses_with_its_own_error() {
    let snapshot = snapshot_of(vec![
        ch(1, 10, 1, Some("eu")),
        ch(2, 10, 1, Some("us")),
        ch(3, 10, 1, None),
    ]);
    let mut rng = SmallRng::seed_from_u64(5);

    for _ in 0..100 {
        let selected =
            select_one(&snapshot, &mut rng, "default", "gpt-4", 0, Some("eu"), 10).unwrap();
        assert_eq!(selected.id, 1);
    }

    let err = select_one(&snapshot, &mut rng, "default", "gpt-4", 0, Some("apac"), 10).unwrap_err();
    match err {
        GatewayError::NoChannelForTag { tag } => assert_eq!(tag, "apac"),
        other => panic!("expected NoChannelForTag, got {other}"),
    }

    // An empty tag means unpinned.
    let selected = select_one(&snapshot, &mut rng, "default", "gpt-4", 0, Some(""), 10).unwrap();
    assert!(snapshot.channel(selected.id).is_some());
}

#[test]
fn gizmo_variants_collapse_onto_the_shared_bucket() {
    assert_eq!(normalize_model("gpt-4-gizmo-g-abc123"), "gpt-4-gizmo-*");
    assert_eq!(normalize_model("gpt-4o-gizmo-g-abc123"), "gpt-4o-gizmo-*");
    assert_eq!(normalize_model("gpt-4"), "gpt-4");

    let snapshot = snapshot_of(vec![ch(1, 10, 1, None)]);
    let selected = select_one(
        &snapshot,
        &mut PanicRng,
        "default",
        "gpt-4-gizmo-g-xyz",
        0,
        None,
        10,
    )
    .unwrap();
    assert_eq!(selected.id, 1);
}

#[test]
fn dangling_bucket_id_reports_inconsistency() {
    let channel = ch(1, 10, 1, None);
    let mut by_id = HashMap::new();
    by_id.insert(1, Arc::new(channel));
    let mut buckets = HashMap::new();
    buckets.insert(
        ("default".to_string(), "gpt-4".to_string()),
        vec![1, 99],
    );
    let snapshot = IndexSnapshot::from_parts(by_id, buckets);

    let mut rng = SmallRng::seed_from_u64(5);
    let err = select_one(&snapshot, &mut rng, "default", "gpt-4", 0, None, 10).unwrap_err();
    match err {
        GatewayError::Inconsistency { channel_id } => assert_eq!(channel_id, 99),
        other => panic!("expected Inconsistency, got {other}"),
    }
}
