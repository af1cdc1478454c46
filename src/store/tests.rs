use std::time::Duration;

use time::macros::datetime;
use uuid::Uuid;

use super::Store;
use crate::domain::state::ThoughtState;
use crate::domain::thought::EventKind;
use crate::timestamp::testing::FixedTimeSource;

const HOUR: Duration = Duration::from_secs(60 * 60);

struct Harness {
    store: Store,
    clock: FixedTimeSource,
    path: String,
}

impl Harness {
    fn open(settle: Duration) -> Self {
        let path = std::env::temp_dir()
            .join(format!("peony-store-test-{}.sqlite", Uuid::now_v7()))
            .display()
            .to_string();
        let clock = FixedTimeSource::at(datetime!(2026-04-01 09:00 UTC));
        let store = Store::open_with_time_source(&path, settle, Box::new(clock.clone()))
            .expect("store should open");
        Self { store, clock, path }
    }

    fn reopen(&self, settle: Duration) -> Store {
        Store::open_with_time_source(&self.path, settle, Box::new(self.clock.clone()))
            .expect("store should reopen")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path));
        }
    }
}

fn state_change_count(store: &mut Store, id: i64) -> usize {
    let (_, events) = store.get(id).expect("thought should load");
    events
        .iter()
        .filter(|event| event.kind == EventKind::StateChange.as_str())
        .count()
}

#[test]
fn create_then_get_round_trips_a_captured_thought() {
    let mut h = Harness::open(18 * HOUR);

    let id = h.store.create("I want to build a log cabin").expect("create should succeed");
    assert_eq!(id, 1);

    let (thought, events) = h.store.get(id).expect("get should succeed");
    assert_eq!(thought.content, "I want to build a log cabin");
    assert_eq!(thought.current_state, ThoughtState::Captured);
    assert_eq!(thought.tend_counter, 0);
    assert_eq!(thought.created_at, thought.updated_at);
    assert_eq!(thought.eligibility_at, thought.created_at + 18 * HOUR);
    assert!(thought.last_tended_at.is_none());
    assert!(thought.valence.is_none() && thought.energy.is_none());

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "captured");
    assert_eq!(events[0].previous_state, None);
    assert_eq!(events[0].next_state, Some(ThoughtState::Captured));
    assert_eq!(events[0].at, thought.created_at);
}

#[test]
fn buy_milk_scenario_tends_and_rests() {
    let mut h = Harness::open(Duration::ZERO);
    let id = h.store.create("buy milk").expect("create should succeed");

    let eligible = h.store.list_tend_eligible(10, 0).expect("list should succeed");
    assert_eq!(eligible.iter().map(|t| t.id).collect::<Vec<_>>(), vec![id]);

    h.clock.advance(Duration::from_secs(30));
    h.store
        .mark_tended(id, Some("checked the fridge"))
        .expect("mark tended should succeed");
    let (tended, events) = h.store.get(id).expect("get should succeed");
    assert_eq!(tended.current_state, ThoughtState::Tended);
    assert_eq!(tended.tend_counter, 1);
    assert_eq!(tended.last_tended_at, Some(h.clock_now()));
    let last = events.last().expect("tend event should exist");
    assert_eq!(last.kind, "state_change");
    assert_eq!(last.previous_state, Some(ThoughtState::Captured));
    assert_eq!(last.next_state, Some(ThoughtState::Tended));
    assert_eq!(last.note.as_deref(), Some("checked the fridge"));

    h.clock.advance(Duration::from_secs(5));
    h.store
        .resolve(id, ThoughtState::Resting, None)
        .expect("resolve should succeed");
    let (rested, _) = h.store.get(id).expect("get should succeed");
    assert_eq!(rested.current_state, ThoughtState::Resting);
    assert_eq!(rested.eligibility_at, h.clock_now());
    assert_eq!(rested.tend_counter, 1);
    assert_eq!(rested.last_tended_at, tended.last_tended_at);
}

impl Harness {
    fn clock_now(&self) -> time::OffsetDateTime {
        use crate::timestamp::TimeSource;
        self.clock.now()
    }
}

#[test]
fn resting_recomputes_eligibility_from_the_resolution_time() {
    let mut h = Harness::open(2 * HOUR);
    let id = h.store.create("learn the cello").expect("create should succeed");
    h.clock.advance(3 * HOUR);
    h.store.mark_tended(id, None).expect("mark tended should succeed");
    h.clock.advance(HOUR);
    h.store
        .resolve(id, ThoughtState::Resting, Some("not yet"))
        .expect("resolve should succeed");

    let (thought, _) = h.store.get(id).expect("get should succeed");
    assert_eq!(thought.eligibility_at, h.clock_now() + 2 * HOUR);
    assert!(h.store.get_tend_eligible(id).is_err());

    h.clock.advance(2 * HOUR);
    h.store
        .mark_tended(id, None)
        .expect("second tend should succeed once eligible");
    let (thought, _) = h.store.get(id).expect("get should succeed");
    assert_eq!(thought.tend_counter, 2);
}

#[test]
fn eligibility_boundary_is_inclusive() {
    let mut h = Harness::open(HOUR);
    let id = h.store.create("call grandma").expect("create should succeed");

    h.clock.advance(HOUR - Duration::from_nanos(1));
    assert!(h.store.list_tend_eligible(10, 0).unwrap().is_empty());
    assert!(h.store.get_tend_eligible(id).is_err());
    assert_eq!(h.store.count_tend_eligible().unwrap(), 0);

    h.clock.advance(Duration::from_nanos(1));
    assert_eq!(h.store.list_tend_eligible(10, 0).unwrap().len(), 1);
    let (thought, events) = h.store.get_tend_eligible(id).expect("should be eligible");
    assert_eq!(thought.id, id);
    assert_eq!(events.len(), 1);
    assert_eq!(h.store.count_tend_eligible().unwrap(), 1);
}

#[test]
fn tended_and_terminal_thoughts_are_not_tend_eligible() {
    let mut h = Harness::open(Duration::ZERO);
    let tended = h.store.create("tended").unwrap();
    let evolved = h.store.create("evolved").unwrap();
    let waiting = h.store.create("waiting").unwrap();
    h.store.mark_tended(tended, None).unwrap();
    h.store.evolve(evolved).unwrap();

    let ids: Vec<i64> = h
        .store
        .list_tend_eligible(10, 0)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![waiting]);
    assert_eq!(h.store.count_tend_eligible().unwrap(), 1);
}

#[test]
fn listings_paginate_in_deterministic_order() {
    let mut h = Harness::open(HOUR);
    let mut ids = Vec::new();
    for content in ["one", "two", "three", "four", "five"] {
        ids.push(h.store.create(content).unwrap());
        h.clock.advance(Duration::from_secs(1));
    }
    h.store.update_content(ids[0], "one, revised").unwrap();

    let first_page: Vec<i64> = h.store.list(2, 0).unwrap().iter().map(|t| t.id).collect();
    let second_page: Vec<i64> = h.store.list(2, 2).unwrap().iter().map(|t| t.id).collect();
    let third_page: Vec<i64> = h.store.list(2, 4).unwrap().iter().map(|t| t.id).collect();
    assert_eq!(first_page, vec![ids[1], ids[2]]);
    assert_eq!(second_page, vec![ids[3], ids[4]]);
    assert_eq!(third_page, vec![ids[0]]);
    assert!(h.store.list(2, 6).unwrap().is_empty());

    h.clock.advance(2 * HOUR);
    let eligible: Vec<i64> = h
        .store
        .list_tend_eligible(10, 0)
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(eligible, ids);
}

#[test]
fn list_hides_archived_but_state_filter_finds_them() {
    let mut h = Harness::open(Duration::ZERO);
    let kept = h.store.create("keep").unwrap();
    let archived = h.store.create("archive me").unwrap();
    h.store.mark_tended(archived, None).unwrap();
    h.store
        .resolve(archived, ThoughtState::Archived, Some("done with it"))
        .unwrap();

    let listed: Vec<i64> = h.store.list(10, 0).unwrap().iter().map(|t| t.id).collect();
    assert_eq!(listed, vec![kept]);

    let by_state = h
        .store
        .list_by_state(10, 0, ThoughtState::Archived)
        .unwrap();
    assert_eq!(by_state.len(), 1);
    assert_eq!(by_state[0].id, archived);
    assert!(h
        .store
        .list_by_state(10, 0, ThoughtState::Resting)
        .unwrap()
        .is_empty());
}

#[test]
fn update_content_appends_an_event_and_keeps_state() {
    let mut h = Harness::open(HOUR);
    let id = h.store.create("draft").unwrap();
    h.clock.advance(Duration::from_secs(10));
    h.store.update_content(id, "final").unwrap();

    let (thought, events) = h.store.get(id).unwrap();
    assert_eq!(thought.content, "final");
    assert_eq!(thought.current_state, ThoughtState::Captured);
    assert_eq!(thought.updated_at, h.clock_now());
    assert_eq!(thought.eligibility_at, thought.created_at + HOUR);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].kind, "content_updated");
    assert_eq!(events[1].previous_state, None);
    assert_eq!(events[1].next_state, None);
}

#[test]
fn updated_at_never_moves_backwards() {
    let mut h = Harness::open(HOUR);
    let id = h.store.create("clock skew").unwrap();
    let (created, _) = h.store.get(id).unwrap();

    h.clock.set(datetime!(2026-03-01 00:00 UTC));
    h.store.update_content(id, "after skew").unwrap();
    let (updated, _) = h.store.get(id).unwrap();
    assert_eq!(updated.updated_at, created.updated_at);
}

#[test]
fn evolve_skips_tending_from_any_open_state() {
    let mut h = Harness::open(Duration::ZERO);
    let captured = h.store.create("captured").unwrap();
    let tended = h.store.create("tended").unwrap();
    let resting = h.store.create("resting").unwrap();
    h.store.mark_tended(tended, None).unwrap();
    h.store.mark_tended(resting, None).unwrap();
    h.store.resolve(resting, ThoughtState::Resting, None).unwrap();

    for id in [captured, tended, resting] {
        let before = state_change_count(&mut h.store, id);
        h.store.evolve(id).expect("evolve should succeed");
        let (thought, events) = h.store.get(id).unwrap();
        assert_eq!(thought.current_state, ThoughtState::Evolved);
        assert_eq!(state_change_count(&mut h.store, id), before + 1);
        assert_eq!(events.last().unwrap().next_state, Some(ThoughtState::Evolved));
    }

    let evolved = h.store.list_by_state(10, 0, ThoughtState::Evolved).unwrap();
    assert_eq!(evolved.len(), 3);
}

#[test]
fn state_change_events_match_successful_transitions() {
    let mut h = Harness::open(Duration::ZERO);
    let id = h.store.create("count my steps").unwrap();

    let mut successes = 0;
    for _ in 0..3 {
        h.store.mark_tended(id, None).unwrap();
        successes += 1;
        h.store.resolve(id, ThoughtState::Resting, None).unwrap();
        successes += 1;
    }
    assert!(h.store.resolve(id, ThoughtState::Archived, None).is_err());
    h.store.mark_tended(id, None).unwrap();
    successes += 1;
    assert!(h.store.mark_tended(id, None).is_err());
    h.store.resolve(id, ThoughtState::Released, None).unwrap();
    successes += 1;
    assert!(h.store.evolve(id).is_err());

    assert_eq!(state_change_count(&mut h.store, id), successes);
    let (thought, _) = h.store.get(id).unwrap();
    assert_eq!(thought.tend_counter, 4);
    assert_eq!(thought.current_state, ThoughtState::Released);
}

#[test]
fn resolving_to_released_keeps_the_row() {
    let mut h = Harness::open(Duration::ZERO);
    let id = h.store.create("soft release").unwrap();
    h.store.mark_tended(id, None).unwrap();
    h.store.resolve(id, ThoughtState::Released, None).unwrap();

    let (thought, events) = h.store.get(id).unwrap();
    assert_eq!(thought.current_state, ThoughtState::Released);
    assert_eq!(events.len(), 3);
}

#[test]
fn append_event_records_free_form_history() {
    let mut h = Harness::open(HOUR);
    let id = h.store.create("journal").unwrap();
    h.store
        .append_event(id, "reflected", None, None, Some("  "))
        .unwrap();
    h.store
        .append_event(
            id,
            "imported",
            Some(ThoughtState::Captured),
            None,
            Some("from paper notebook"),
        )
        .unwrap();

    let (thought, events) = h.store.get(id).unwrap();
    assert_eq!(thought.current_state, ThoughtState::Captured);
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].kind, "reflected");
    assert_eq!(events[1].note, None);
    assert_eq!(events[2].previous_state, Some(ThoughtState::Captured));
    assert_eq!(events[2].next_state, None);
    assert_eq!(events[2].note.as_deref(), Some("from paper notebook"));
}

#[test]
fn annotations_are_optional_and_sticky() {
    let mut h = Harness::open(HOUR);
    let id = h.store.create("mood").unwrap();
    h.store.set_annotations(id, Some(-2), None).unwrap();
    h.store.set_annotations(id, None, Some(3)).unwrap();

    let (thought, events) = h.store.get(id).unwrap();
    assert_eq!(thought.valence, Some(-2));
    assert_eq!(thought.energy, Some(3));
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].kind, "annotated");
    assert_eq!(events[1].note.as_deref(), Some("valence=-2"));
}

#[test]
fn delete_then_reindex_compacts_ids_and_remaps_events() {
    let mut h = Harness::open(Duration::ZERO);
    let ids: Vec<i64> = ["a", "b", "c", "d"]
        .iter()
        .map(|content| h.store.create(content).unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    h.store.mark_tended(4, Some("fourth")).unwrap();

    h.store.delete(3).unwrap();
    let summary = h.store.reindex().unwrap();
    assert_eq!(summary.thoughts, 3);
    assert_eq!(summary.moved, 1);

    let contents: Vec<(i64, String)> = h
        .store
        .list(10, 0)
        .unwrap()
        .into_iter()
        .map(|t| (t.id, t.content))
        .collect();
    let mut sorted = contents.clone();
    sorted.sort();
    assert_eq!(
        sorted,
        vec![
            (1, "a".to_string()),
            (2, "b".to_string()),
            (3, "d".to_string())
        ]
    );

    let (moved, events) = h.store.get(3).unwrap();
    assert_eq!(moved.content, "d");
    assert_eq!(moved.current_state, ThoughtState::Tended);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.thought_id == 3));
    assert_eq!(events[1].note.as_deref(), Some("fourth"));
    assert!(h.store.get(4).is_err());
    assert!(h.store.foreign_key_violations().unwrap().is_empty());

    let next = h.store.create("e").unwrap();
    assert_eq!(next, 4);
}

#[test]
fn release_deletes_and_reindexes_regardless_of_state() {
    let mut h = Harness::open(Duration::ZERO);
    let first = h.store.create("first").unwrap();
    let second = h.store.create("second").unwrap();
    h.store.evolve(first).unwrap();

    h.store.release(first).expect("release should succeed");
    let (survivor, events) = h.store.get(1).unwrap();
    assert_eq!(survivor.content, "second");
    assert_eq!(events[0].thought_id, 1);
    assert!(h.store.get(second).is_err());
}

#[test]
fn reindex_on_dense_or_empty_tables_is_a_no_op() {
    let mut h = Harness::open(Duration::ZERO);
    assert_eq!(h.store.reindex().unwrap().thoughts, 0);

    h.store.create("x").unwrap();
    h.store.create("y").unwrap();
    let summary = h.store.reindex().unwrap();
    assert_eq!(summary.thoughts, 2);
    assert_eq!(summary.moved, 0);

    h.store.release(2).unwrap();
    assert_eq!(h.store.create("z").unwrap(), 2);
}

#[test]
fn reindex_never_touches_state() {
    let mut h = Harness::open(Duration::ZERO);
    for content in ["a", "b", "c"] {
        h.store.create(content).unwrap();
    }
    h.store.mark_tended(3, None).unwrap();
    h.store.resolve(3, ThoughtState::Archived, None).unwrap();
    h.store.delete(1).unwrap();
    h.store.reindex().unwrap();

    let (first, _) = h.store.get(1).unwrap();
    let (second, _) = h.store.get(2).unwrap();
    assert_eq!(first.current_state, ThoughtState::Captured);
    assert_eq!(second.current_state, ThoughtState::Archived);
    assert_eq!(second.tend_counter, 1);
}

#[test]
fn did_count_change_tracks_the_last_value() {
    let mut h = Harness::open(HOUR);
    assert!(h.store.did_count_change(5).unwrap());
    assert!(!h.store.did_count_change(5).unwrap());
    assert!(h.store.did_count_change(7).unwrap());
    assert!(h.store.did_count_change(5).unwrap());

    let mut reopened = h.reopen(HOUR);
    assert!(!reopened.did_count_change(5).unwrap());
    assert!(reopened.did_count_change(0).unwrap());
}

#[test]
fn settle_duration_is_per_store_instance() {
    let mut h = Harness::open(HOUR);
    let slow = h.store.create("slow").unwrap();

    let mut fast = h.reopen(Duration::ZERO);
    let quick = fast.create("quick").unwrap();
    assert_eq!(fast.settle_duration(), Duration::ZERO);

    let eligible: Vec<i64> = fast
        .list_tend_eligible(10, 0)
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(eligible, vec![quick]);
    assert!(h.store.get_tend_eligible(slow).is_err());
}
