//! Last-writer-wins resolution, including a property test of the LWW law.

use chrono::{DateTime, Duration, TimeZone, Utc};
use examsync_sync::{ConflictResolver, Resolution};
use examsync_types::Student;
use proptest::prelude::*;
use serde_json::json;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn make_student(name: &str, created: Option<DateTime<Utc>>, updated: Option<DateTime<Utc>>) -> Student {
    Student {
        id: "s1".to_string(),
        owner_id: "T1".to_string(),
        period_id: "P1".to_string(),
        full_name: name.to_string(),
        created_at: created,
        updated_at: updated,
        ..Student::default()
    }
}

/// Applies a resolution the way import does: the incoming record replaces
/// the stored one wholesale when applied.
fn merge(existing: Option<Student>, incoming: Student) -> Student {
    match ConflictResolver::upsert(existing.as_ref(), &incoming) {
        Resolution::Apply => incoming,
        Resolution::Skip => existing.unwrap(),
    }
}

#[test]
fn absent_existing_applies() {
    let incoming = make_student("Ana", None, None);
    assert_eq!(ConflictResolver::upsert(None, &incoming), Resolution::Apply);
}

#[test]
fn newer_incoming_applies() {
    let local = make_student("Ana", None, Some(base()));
    let remote = make_student("Ana Lima", None, Some(base() + Duration::seconds(1)));
    assert_eq!(ConflictResolver::upsert(Some(&local), &remote), Resolution::Apply);
}

#[test]
fn tie_keeps_local() {
    let local = make_student("Ana", None, Some(base()));
    let remote = make_student("Ana Lima", None, Some(base()));
    assert_eq!(ConflictResolver::upsert(Some(&local), &remote), Resolution::Skip);
}

#[test]
fn older_incoming_skips() {
    let local = make_student("Ana", None, Some(base()));
    let remote = make_student("Ana Lima", None, Some(base() - Duration::days(3)));
    assert_eq!(ConflictResolver::upsert(Some(&local), &remote), Resolution::Skip);
}

#[test]
fn created_at_stands_in_for_missing_updated_at() {
    let local = make_student("Ana", Some(base()), None);
    let remote = make_student("Ana Lima", Some(base() - Duration::days(1)), Some(base() + Duration::hours(1)));
    assert_eq!(ConflictResolver::upsert(Some(&local), &remote), Resolution::Apply);

    let remote_old = make_student("Ana Lima", Some(base() - Duration::days(1)), None);
    assert_eq!(ConflictResolver::upsert(Some(&local), &remote_old), Resolution::Skip);
}

#[test]
fn unstamped_records_never_replace_existing_ones() {
    let local = make_student("Ana", None, None);
    let remote = make_student("Ana Lima", None, None);
    assert_eq!(ConflictResolver::upsert(Some(&local), &remote), Resolution::Skip);
}

#[test]
fn stamped_incoming_replaces_unstamped_local() {
    let local = make_student("Ana", None, None);
    let remote = make_student("Ana Lima", None, Some(base()));
    assert_eq!(ConflictResolver::upsert(Some(&local), &remote), Resolution::Apply);
}

#[test]
fn document_stamp_reads_raw_fields() {
    let doc = json!({ "id": "x", "createdAt": "2026-01-01T00:00:00Z" });
    assert_eq!(ConflictResolver::document_stamp(&doc), Some(base()));

    let doc = json!({ "updatedAt": "2026-01-02T00:00:00+00:00", "createdAt": "2026-01-01T00:00:00Z" });
    assert_eq!(
        ConflictResolver::document_stamp(&doc),
        Some(base() + Duration::days(1))
    );

    let doc = json!({ "updatedAt": "garbage" });
    assert_eq!(ConflictResolver::document_stamp(&doc), None);
}

// =============================================================================
// LWW LAW
// =============================================================================

fn offset_strategy() -> impl Strategy<Value = i64> {
    -10_000i64..10_000
}

proptest! {
    /// The stored record ends up as the incoming one iff T2 > T1.
    #[test]
    fn final_state_is_incoming_iff_strictly_newer(
        t1 in offset_strategy(),
        t2 in offset_strategy(),
    ) {
        let existing = make_student("local", None, Some(base() + Duration::seconds(t1)));
        let incoming = make_student("remote", None, Some(base() + Duration::seconds(t2)));

        let stored = merge(Some(existing.clone()), incoming.clone());

        if t2 > t1 {
            prop_assert_eq!(stored, incoming);
        } else {
            prop_assert_eq!(stored, existing);
        }
    }

    /// Re-applying the winner is always a no-op.
    #[test]
    fn merge_is_idempotent(t1 in offset_strategy(), t2 in offset_strategy()) {
        let existing = make_student("local", None, Some(base() + Duration::seconds(t1)));
        let incoming = make_student("remote", None, Some(base() + Duration::seconds(t2)));

        let once = merge(Some(existing), incoming.clone());
        let twice = merge(Some(once.clone()), incoming);
        prop_assert_eq!(once, twice);
    }
}
