use rand::SeedableRng;
use rand::rngs::SmallRng;
use switchboard_core::{Ability, Channel, IndexSnapshot, select_one};
use switchboard_types::ChannelStatus;

fn ch(id: i64, priority: i64, weight: i64) -> Channel {
    Channel {
        id,
        name: format!("channel-{id}"),
        upstream: "openai".to_string(),
        status: ChannelStatus::Enabled,
        key: format!("k{id}"),
        models: "gpt-4".to_string(),
        groups: "default".to_string(),
        priority,
        weight,
        tag: None,
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

#[test]
fn weighted_draw_approaches_smoothed_shares() {
    // A has weight 1, B has weight 9; with smoothing 10 the shares are
    // (1+10)/30 and (9+10)/30.
    let snapshot = snapshot_of(vec![ch(1, 10, 1), ch(2, 10, 9)]);
    let mut rng = SmallRng::seed_from_u64(42);

    let trials = 10_000;
    let mut picked_b = 0i64;
    for _ in 0..trials {
        let selected = select_one(&snapshot, &mut rng, "default", "gpt-4", 0, None, 10).unwrap();
        if selected.id == 2 {
            picked_b += 1;
        }
    }

    let expected_b = trials * 19 / 30;
    assert!(
        (picked_b - expected_b).abs() <= 250,
        "B picked {picked_b} times, expected about {expected_b}"
    );
}

#[test]
fn retry_one_lands_on_the_lower_tier_every_time() {
    let snapshot = snapshot_of(vec![ch(1, 10, 1), ch(2, 10, 9), ch(3, 5, 0)]);
    let mut rng = SmallRng::seed_from_u64(7);

    for _ in 0..1_000 {
        let selected = select_one(&snapshot, &mut rng, "default", "gpt-4", 1, None, 10).unwrap();
        assert_eq!(selected.id, 3);
    }
}

#[test]
fn zero_total_weight_falls_back_to_uniform() {
    // Smoothing 0 with all-zero weights exercises the defensive branch.
    let snapshot = snapshot_of(vec![ch(1, 10, 0), ch(2, 10, 0)]);
    let mut rng = SmallRng::seed_from_u64(11);

    let mut seen = [0u32; 2];
    for _ in 0..1_000 {
        let selected = select_one(&snapshot, &mut rng, "default", "gpt-4", 0, None, 0).unwrap();
        seen[(selected.id - 1) as usize] += 1;
    }
    assert!(seen[0] > 300 && seen[1] > 300, "uniform fallback skewed: {seen:?}");
}

#[test]
fn smoothing_keeps_zero_weight_channels_alive() {
    let snapshot = snapshot_of(vec![ch(1, 10, 0), ch(2, 10, 90)]);
    let mut rng = SmallRng::seed_from_u64(3);

    let mut picked_zero = 0u32;
    for _ in 0..10_000 {
        let selected = select_one(&snapshot, &mut rng, "default", "gpt-4", 0, None, 10).unwrap();
        if selected.id == 1 {
            picked_zero += 1;
        }
    }
    // Share (0+10)/110 of 10k trials, with generous slack.
    assert!(
        picked_zero > 500 && picked_zero < 1_400,
        "zero-weight channel picked {picked_zero} times"
    );
}
