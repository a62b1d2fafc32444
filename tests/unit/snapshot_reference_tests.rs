//! Snapshot naming, kinds, listing parse and the deletion guard.

use chrono::{Local, TimeZone, Utc};

use bedrock_warden::vcs::git::parse_branch_listing;
use bedrock_warden::vcs::{deletable_references, SnapshotKind, SnapshotReference};
use bedrock_warden::AppError;

fn active(name: &str) -> SnapshotReference {
    SnapshotReference {
        is_active: true,
        ..SnapshotReference::named(name)
    }
}

#[test]
fn names_follow_the_kind_and_local_timestamp() {
    let at = Utc.with_ymd_and_hms(2021, 1, 2, 1, 0, 0).unwrap();
    let stamp = at.with_timezone(&Local).format("%Y%m%d-%H%M%S").to_string();

    assert_eq!(
        SnapshotKind::Periodic.reference_name(at),
        format!("saves/periodic/{stamp}")
    );
    assert_eq!(SnapshotKind::Manual.prefix(), "saves/manual/");
    assert_eq!(SnapshotKind::Temp.filter(), "saves/temp/*");
}

#[test]
fn kind_is_recovered_from_the_name() {
    assert_eq!(
        SnapshotReference::named("saves/periodic/20210102-010000").kind(),
        Some(SnapshotKind::Periodic)
    );
    assert_eq!(SnapshotReference::named("main").kind(), None);
    assert_eq!(SnapshotReference::named("saves/other/x").kind(), None);
    assert!(matches!(
        "weekly".parse::<SnapshotKind>(),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn display_marks_the_active_reference() {
    let r = SnapshotReference {
        content_id: "abc1234".into(),
        subject: "Built a farm".into(),
        created_at_relative: "2 days ago".into(),
        ..active("saves/manual/20210102-010000")
    };

    assert_eq!(
        r.to_string(),
        "* saves/manual/20210102-010000 abc1234 Built a farm (2 days ago)"
    );
    assert!(SnapshotReference::named("x").to_string().starts_with("  x"));
}

#[test]
fn deleting_nothing_is_invalid() {
    assert!(matches!(
        deletable_references(&[]),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn deleting_only_the_active_reference_is_protected() {
    assert!(matches!(
        deletable_references(&[active("saves/manual/a")]),
        Err(AppError::ProtectedResource(_))
    ));
}

#[test]
fn active_reference_is_skipped_in_a_batch() {
    let refs = [active("saves/manual/a"), SnapshotReference::named("saves/manual/b")];

    let (deletable, skipped) = deletable_references(&refs).unwrap();

    assert_eq!(deletable.len(), 1);
    assert_eq!(deletable[0].name, "saves/manual/b");
    assert_eq!(skipped, vec!["saves/manual/a"]);
}

#[test]
fn branch_listing_parses_fields_and_head_marker() {
    let out = "saves/periodic/20210102-010000\u{1f}1a2b3c4\u{1f}Automatic periodic backup\u{1f}2021-01-02T01:00:00Z\u{1f}2 days ago\u{1f} \n\
               saves/manual/20210103-090000\u{1f}5d6e7f8\u{1f}Before the raid\u{1f}2021-01-03T09:00:00-05:00\u{1f}1 day ago\u{1f}*\n";

    let refs = parse_branch_listing(out).unwrap();

    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].kind(), Some(SnapshotKind::Periodic));
    assert!(!refs[0].is_active);
    assert_eq!(refs[1].subject, "Before the raid");
    assert_eq!(refs[1].content_id, "5d6e7f8");
    assert_eq!(refs[1].created_at_relative, "1 day ago");
    assert!(refs[1].is_active);
    assert_eq!(
        refs[1].created_at,
        Utc.with_ymd_and_hms(2021, 1, 3, 14, 0, 0).unwrap()
    );
}

#[test]
fn branch_listing_rejects_bad_dates() {
    let out = "a\u{1f}b\u{1f}c\u{1f}yesterday\u{1f}1 day ago\u{1f} \n";
    assert!(matches!(
        parse_branch_listing(out),
        Err(AppError::ExternalCommand(_))
    ));
}
