//! Periodic snapshot retention selection.

use std::time::Duration;

use chrono::{DateTime, Duration as Age, TimeZone, Utc};

use bedrock_warden::backup::select_for_pruning;
use bedrock_warden::vcs::SnapshotReference;

const HOUR: Duration = Duration::from_secs(3600);

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 4, 12, 0, 0).unwrap()
}

fn aged(name: &str, age: Age) -> SnapshotReference {
    SnapshotReference {
        created_at: now() - age,
        ..SnapshotReference::named(name)
    }
}

fn names(refs: &[SnapshotReference]) -> Vec<&str> {
    refs.iter().map(|r| r.name.as_str()).collect()
}

#[test]
fn mixed_ages_select_two_candidates() {
    let mut refs = vec![
        aged("1d", Age::days(1)),
        aged("1d1h", Age::days(1) + Age::hours(1)),
        aged("2d", Age::days(2)),
    ];
    for h in 1..=9 {
        let mut r = aged(&format!("{h}h"), Age::hours(h));
        r.is_active = h == 5;
        refs.push(r);
    }

    let candidates = select_for_pruning(&refs, now(), 12 * HOUR, 12 * HOUR).unwrap();

    assert_eq!(names(&candidates), vec!["2d", "1d"]);
}

#[test]
fn everything_inside_the_window_is_kept() {
    let refs: Vec<_> = (1..=6).map(|h| aged(&format!("{h}h"), Age::hours(h))).collect();

    let candidates = select_for_pruning(&refs, now(), 12 * HOUR, HOUR).unwrap();

    assert!(candidates.is_empty());
}

#[test]
fn old_snapshots_are_thinned_to_the_retain_interval() {
    // Hourly snapshots from 48h to 25h old, all outside a 24h window.
    let refs: Vec<_> = (25..=48)
        .map(|h| aged(&format!("{h}h"), Age::hours(h)))
        .collect();

    let candidates = select_for_pruning(&refs, now(), 24 * HOUR, 6 * HOUR).unwrap();
    let kept: Vec<&str> = refs
        .iter()
        .filter(|r| !candidates.contains(r))
        .map(|r| r.name.as_str())
        .collect();

    // Oldest is the seed and goes; then every 7th hour clears the 6h spacing.
    assert_eq!(kept, vec!["27h", "34h", "41h"]);
    assert_eq!(candidates.len(), refs.len() - 3);
}

#[test]
fn lone_old_snapshot_is_a_candidate() {
    let refs = vec![aged("old", Age::days(10))];

    let candidates = select_for_pruning(&refs, now(), 24 * HOUR, HOUR).unwrap();

    assert_eq!(names(&candidates), vec!["old"]);
}

#[test]
fn empty_input_selects_nothing() {
    assert!(select_for_pruning(&[], now(), HOUR, HOUR).unwrap().is_empty());
}

#[test]
fn input_order_does_not_matter() {
    let forward = vec![
        aged("3d", Age::days(3)),
        aged("2d", Age::days(2)),
        aged("1h", Age::hours(1)),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();

    assert_eq!(
        select_for_pruning(&forward, now(), 12 * HOUR, 12 * HOUR).unwrap(),
        select_for_pruning(&reversed, now(), 12 * HOUR, 12 * HOUR).unwrap()
    );
}
