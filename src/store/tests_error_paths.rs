use std::error::Error;
use std::time::Duration;

use rusqlite::params;
use time::macros::datetime;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::db;
use crate::domain::state::{RejectReason, ThoughtState, Transition};
use crate::timestamp::testing::FixedTimeSource;

fn unique_db_path() -> String {
    std::env::temp_dir()
        .join(format!("peony-store-errors-{}.sqlite", Uuid::now_v7()))
        .display()
        .to_string()
}

fn cleanup_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}

fn open_store(path: &str, settle: Duration) -> Store {
    let clock = FixedTimeSource::at(datetime!(2026-04-01 09:00 UTC));
    Store::open_with_time_source(path, settle, Box::new(clock)).expect("store should open")
}

#[test]
fn validation_errors_cover_ids_content_and_pages() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);

    assert!(matches!(
        store.create("   "),
        Err(StoreError::InvalidArgument { .. })
    ));
    assert!(matches!(store.get(0), Err(StoreError::InvalidArgument { .. })));
    assert!(matches!(
        store.get_tend_eligible(-3),
        Err(StoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.list(0, 0),
        Err(StoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.list_tend_eligible(10, -1),
        Err(StoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.list_by_state(-1, 0, ThoughtState::Evolved),
        Err(StoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.mark_tended(0, None),
        Err(StoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.append_event(1, " ", None, None, None),
        Err(StoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.set_annotations(1, None, None),
        Err(StoreError::InvalidArgument { .. })
    ));

    let id = store.create("valid").expect("create should succeed");
    let err = store.update_content(id, "\n\t").unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(err.to_string(), "update thought content: content is empty");

    cleanup_db_files(&path);
}

#[test]
fn missing_thoughts_report_not_found() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);

    assert!(matches!(
        store.get(42),
        Err(StoreError::NotFound { id: 42, .. })
    ));
    assert!(matches!(
        store.mark_tended(42, None),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.resolve(42, ThoughtState::Resting, None),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(store.evolve(42), Err(StoreError::NotFound { .. })));
    assert!(matches!(
        store.update_content(42, "x"),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.append_event(42, "note", None, None, None),
        Err(StoreError::NotFound { .. })
    ));
    let err = store.delete(42).unwrap_err();
    assert_eq!(err.to_string(), "delete thought: thought #42 not found");
    assert!(matches!(store.release(42), Err(StoreError::NotFound { .. })));

    cleanup_db_files(&path);
}

#[test]
fn guard_rejections_leave_snapshot_and_log_untouched() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);
    let evolved = store.create("evolved").unwrap();
    let captured = store.create("captured").unwrap();
    store.evolve(evolved).unwrap();
    let before = store.get(evolved).unwrap();

    let err = store.mark_tended(evolved, Some("too late")).unwrap_err();
    match &err {
        StoreError::InvalidTransition { id, source, .. } => {
            assert_eq!(*id, evolved);
            assert_eq!(source.from, ThoughtState::Evolved);
            assert_eq!(source.transition, Transition::MarkTended);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert!(err.source().is_some());
    assert_eq!(store.get(evolved).unwrap(), before);

    let err = store
        .resolve(captured, ThoughtState::Archived, None)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition { ref source, .. } if source.from == ThoughtState::Captured
    ));
    assert!(err.to_string().contains("state captured"));
    let (thought, events) = store.get(captured).unwrap();
    assert_eq!(thought.current_state, ThoughtState::Captured);
    assert_eq!(events.len(), 1);

    assert!(matches!(
        store.evolve(evolved),
        Err(StoreError::InvalidTransition { .. })
    ));

    cleanup_db_files(&path);
}

#[test]
fn resolve_rejects_non_resolution_targets_as_invalid_arguments() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);
    let id = store.create("x").unwrap();
    store.mark_tended(id, None).unwrap();

    for target in [ThoughtState::Captured, ThoughtState::Tended] {
        assert!(matches!(
            store.resolve(id, target, None),
            Err(StoreError::InvalidArgument { .. })
        ));
    }
    let (thought, _) = store.get(id).unwrap();
    assert_eq!(thought.current_state, ThoughtState::Tended);

    cleanup_db_files(&path);
}

#[test]
fn mark_tended_before_eligibility_is_an_invalid_transition() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::from_secs(3600));
    let id = store.create("not yet").unwrap();

    let err = store.mark_tended(id, None).unwrap_err();
    match err {
        StoreError::InvalidTransition { source, .. } => {
            assert_eq!(source.from, ThoughtState::Captured);
            assert!(matches!(source.reason, RejectReason::NotYetEligible { .. }));
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    let (thought, events) = store.get(id).unwrap();
    assert_eq!(thought.tend_counter, 0);
    assert!(thought.last_tended_at.is_none());
    assert_eq!(events.len(), 1);

    cleanup_db_files(&path);
}

#[test]
fn failed_event_insert_rolls_back_the_snapshot() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);
    let id = store.create("atomic").unwrap();

    store
        .conn
        .execute_batch(
            r#"
CREATE TRIGGER reject_state_change
BEFORE INSERT ON events
WHEN NEW.kind = 'state_change'
BEGIN
    SELECT RAISE(ABORT, 'event log is read-only');
END;
"#,
        )
        .expect("trigger should be creatable");

    let err = store.mark_tended(id, None).unwrap_err();
    assert!(matches!(err, StoreError::Db { .. }));

    let (thought, events) = store.get(id).unwrap();
    assert_eq!(thought.current_state, ThoughtState::Captured);
    assert_eq!(thought.tend_counter, 0);
    assert_eq!(events.len(), 1);

    cleanup_db_files(&path);
}

fn insert_orphan_event(store: &Store, thought_id: i64) {
    store
        .conn
        .pragma_update(None, "foreign_keys", "OFF")
        .expect("foreign keys should toggle");
    db::insert_event(
        &store.conn,
        &db::NewEvent {
            thought_id,
            kind: "orphan",
            at: "2026-04-01T09:00:00.000000000Z",
            previous_state: None,
            next_state: None,
            note: None,
        },
    )
    .expect("orphan insert should succeed with foreign keys off");
    store
        .conn
        .pragma_update(None, "foreign_keys", "ON")
        .expect("foreign keys should toggle");
}

fn event_kinds(store: &mut Store, id: i64) -> Vec<String> {
    let (_, events) = store.get(id).unwrap();
    events.into_iter().map(|event| event.kind).collect()
}

#[test]
fn reindex_aborts_on_orphaned_events() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);
    store.create("a").unwrap();
    store.create("b").unwrap();
    store.delete(1).unwrap();

    // Thought 2 would move to id 1, so an orphan on id 1 must not be adopted.
    insert_orphan_event(&store, 1);
    insert_orphan_event(&store, 99);

    let err = store.reindex().unwrap_err();
    match &err {
        StoreError::Integrity { violations, .. } => {
            assert_eq!(violations.len(), 2);
            assert!(violations.iter().all(|v| v.table == "events"));
            assert!(violations.iter().all(|v| v.parent == "thoughts"));
        }
        other => panic!("expected integrity error, got {other:?}"),
    }
    assert!(err.to_string().contains("foreign key check failed"));

    let remaining: Vec<i64> = store.list(10, 0).unwrap().iter().map(|t| t.id).collect();
    assert_eq!(remaining, vec![2]);
    assert_eq!(event_kinds(&mut store, 2), vec!["captured"]);
    let orphaned: i64 = store
        .conn
        .query_row(
            "SELECT COUNT(*) FROM events WHERE thought_id IN (1, 99)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphaned, 2);

    cleanup_db_files(&path);
}

#[test]
fn failed_release_keeps_the_thought() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);
    for content in ["a", "b", "c"] {
        store.create(content).unwrap();
    }
    insert_orphan_event(&store, 99);

    let err = store.release(2).unwrap_err();
    assert!(matches!(err, StoreError::Integrity { op: "release thought", .. }));

    let remaining: Vec<i64> = store.list(10, 0).unwrap().iter().map(|t| t.id).collect();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.contains(&2));
    assert_eq!(event_kinds(&mut store, 2), vec!["captured"]);

    cleanup_db_files(&path);
}

#[test]
fn settle_past_the_calendar_is_rejected_not_panicking() {
    let path = unique_db_path();
    let huge = Duration::from_secs(100_000_000 * 3600);
    let mut store = open_store(&path, huge);

    let err = store.create("too patient").unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(
        err.to_string(),
        "create thought: settle duration is out of range"
    );
    assert!(store.list(10, 0).unwrap().is_empty());

    cleanup_db_files(&path);
}

#[test]
fn resting_near_the_end_of_time_rolls_back() {
    let path = unique_db_path();
    let clock = FixedTimeSource::at(datetime!(2026-04-01 09:00 UTC));
    let mut store =
        Store::open_with_time_source(&path, Duration::from_secs(2 * 3600), Box::new(clock.clone()))
            .expect("store should open");
    let id = store.create("late").unwrap();

    clock.set(datetime!(9999-12-31 23:00 UTC));
    store.mark_tended(id, None).unwrap();
    let err = store.resolve(id, ThoughtState::Resting, None).unwrap_err();
    assert!(err.is_invalid_argument());

    let (thought, events) = store.get(id).unwrap();
    assert_eq!(thought.current_state, ThoughtState::Tended);
    assert_eq!(events.len(), 2);

    cleanup_db_files(&path);
}

#[test]
fn corrupt_stored_state_surfaces_as_db_error() {
    let path = unique_db_path();
    let mut store = open_store(&path, Duration::ZERO);
    let id = store.create("x").unwrap();
    store
        .conn
        .execute(
            "UPDATE thoughts SET current_state = 'composting' WHERE id = ?1",
            params![id],
        )
        .unwrap();

    let err = store.get(id).unwrap_err();
    assert!(matches!(err, StoreError::Db { .. }));
    assert!(err.to_string().contains("current_state"));

    cleanup_db_files(&path);
}
