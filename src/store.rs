use std::error::Error;
use std::fmt;
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use time::OffsetDateTime;

use crate::db::{self, NewEvent, NewThought, UpdateThoughtState};
use crate::domain::state::{InvalidStateTransition, ThoughtState, Transition};
use crate::domain::thought::{Event, EventKind, Thought};
use crate::readiness;
use crate::reindex::{self, ForeignKeyViolation, ReindexError, ReindexSummary};
use crate::timestamp::{self, SystemTimeSource, TimeSource};

/// Transactional, event-sourced store for thoughts.
///
/// Every mutation reads the current snapshot, checks the lifecycle guard,
/// writes the new snapshot and appends exactly one event inside a single
/// SQLite transaction. Dropping a transaction without committing rolls it
/// back, so an early `?` return never leaves a half-applied change behind.
pub struct Store {
    conn: Connection,
    settle: Duration,
    clock: Box<dyn TimeSource>,
}

impl Store {
    pub fn open(db_path: &str, settle: Duration) -> Result<Self, StoreError> {
        Self::open_with_time_source(db_path, settle, Box::new(SystemTimeSource))
    }

    pub fn open_with_time_source(
        db_path: &str,
        settle: Duration,
        clock: Box<dyn TimeSource>,
    ) -> Result<Self, StoreError> {
        ensure_parent_dir(db_path)?;
        let conn = db::open_connection(db_path).map_err(db_error("open"))?;
        Ok(Self {
            conn,
            settle,
            clock,
        })
    }

    pub fn settle_duration(&self) -> Duration {
        self.settle
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn create(&mut self, content: &str) -> Result<i64, StoreError> {
        const OP: &str = "create thought";
        require_content(OP, content)?;

        let now = self.now();
        let at = timestamp::encode(now);
        let eligibility_at = timestamp::encode(settle_deadline(OP, now, self.settle)?);

        let tx = self.conn.transaction().map_err(db_error(OP))?;
        let id = db::insert_thought(
            &tx,
            &NewThought {
                content,
                state: ThoughtState::INITIAL,
                created_at: &at,
                eligibility_at: &eligibility_at,
            },
        )
        .map_err(db_error(OP))?;
        db::insert_event(
            &tx,
            &NewEvent {
                thought_id: id,
                kind: EventKind::Captured.as_str(),
                at: &at,
                previous_state: None,
                next_state: Some(ThoughtState::INITIAL),
                note: None,
            },
        )
        .map_err(db_error(OP))?;
        tx.commit().map_err(db_error(OP))?;
        Ok(id)
    }

    pub fn append_event(
        &mut self,
        thought_id: i64,
        kind: &str,
        previous_state: Option<ThoughtState>,
        next_state: Option<ThoughtState>,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        const OP: &str = "append event";
        require_id(OP, thought_id)?;
        if kind.trim().is_empty() {
            return Err(StoreError::invalid(OP, "event kind cannot be empty"));
        }

        let at = timestamp::encode(self.now());
        let tx = self.conn.transaction().map_err(db_error(OP))?;
        load_thought(&tx, OP, thought_id)?;
        db::insert_event(
            &tx,
            &NewEvent {
                thought_id,
                kind: kind.trim(),
                at: &at,
                previous_state,
                next_state,
                note: normalize_note(note),
            },
        )
        .map_err(db_error(OP))?;
        tx.commit().map_err(db_error(OP))
    }

    /// Loads a thought and its history, oldest event first.
    pub fn get(&mut self, id: i64) -> Result<(Thought, Vec<Event>), StoreError> {
        const OP: &str = "get thought";
        require_id(OP, id)?;

        let tx = self.conn.transaction().map_err(db_error(OP))?;
        let thought = load_thought(&tx, OP, id)?;
        let events = db::list_events(&tx, id).map_err(db_error(OP))?;
        tx.commit().map_err(db_error(OP))?;
        Ok((thought, events))
    }

    /// Like [`Store::get`], but only for thoughts that are due for tending.
    pub fn get_tend_eligible(&mut self, id: i64) -> Result<(Thought, Vec<Event>), StoreError> {
        const OP: &str = "get tend thought";
        require_id(OP, id)?;

        let now = timestamp::encode(self.now());
        let tx = self.conn.transaction().map_err(db_error(OP))?;
        let thought = db::get_tend_eligible_thought(&tx, id, &now)
            .map_err(db_error(OP))?
            .ok_or(StoreError::NotFound { op: OP, id })?;
        let events = db::list_events(&tx, id).map_err(db_error(OP))?;
        tx.commit().map_err(db_error(OP))?;
        Ok((thought, events))
    }

    /// Non-archived thoughts ordered by last update, then id.
    pub fn list(&self, limit: i64, offset: i64) -> Result<Vec<Thought>, StoreError> {
        const OP: &str = "list thoughts";
        require_page(OP, limit, offset)?;
        db::list_thoughts(&self.conn, limit, offset).map_err(db_error(OP))
    }

    /// Tend-eligible thoughts ordered by eligibility time, then id.
    pub fn list_tend_eligible(&self, limit: i64, offset: i64) -> Result<Vec<Thought>, StoreError> {
        const OP: &str = "list tend thoughts";
        require_page(OP, limit, offset)?;
        let now = timestamp::encode(self.now());
        db::list_tend_eligible(&self.conn, &now, limit, offset).map_err(db_error(OP))
    }

    pub fn list_by_state(
        &self,
        limit: i64,
        offset: i64,
        state: ThoughtState,
    ) -> Result<Vec<Thought>, StoreError> {
        const OP: &str = "list thoughts by state";
        require_page(OP, limit, offset)?;
        db::list_thoughts_by_state(&self.conn, state, limit, offset).map_err(db_error(OP))
    }

    pub fn update_content(&mut self, id: i64, content: &str) -> Result<(), StoreError> {
        const OP: &str = "update thought content";
        require_id(OP, id)?;
        require_content(OP, content)?;

        let now = self.now();
        let tx = self.conn.transaction().map_err(db_error(OP))?;
        let current = load_thought(&tx, OP, id)?;
        let at = timestamp::encode(now.max(current.updated_at));
        db::update_thought_content(&tx, id, content, &at).map_err(db_error(OP))?;
        db::insert_event(
            &tx,
            &NewEvent {
                thought_id: id,
                kind: EventKind::ContentUpdated.as_str(),
                at: &at,
                previous_state: None,
                next_state: None,
                note: None,
            },
        )
        .map_err(db_error(OP))?;
        tx.commit().map_err(db_error(OP))
    }

    /// Stores the free-form valence/energy annotation. `None` leaves a value
    /// as it was.
    pub fn set_annotations(
        &mut self,
        id: i64,
        valence: Option<i64>,
        energy: Option<i64>,
    ) -> Result<(), StoreError> {
        const OP: &str = "annotate thought";
        require_id(OP, id)?;
        if valence.is_none() && energy.is_none() {
            return Err(StoreError::invalid(OP, "nothing to annotate"));
        }

        let now = self.now();
        let tx = self.conn.transaction().map_err(db_error(OP))?;
        let current = load_thought(&tx, OP, id)?;
        let at = timestamp::encode(now.max(current.updated_at));
        db::update_thought_annotations(&tx, id, valence, energy, &at).map_err(db_error(OP))?;
        let note = annotation_note(valence, energy);
        db::insert_event(
            &tx,
            &NewEvent {
                thought_id: id,
                kind: EventKind::Annotated.as_str(),
                at: &at,
                previous_state: None,
                next_state: None,
                note: Some(&note),
            },
        )
        .map_err(db_error(OP))?;
        tx.commit().map_err(db_error(OP))
    }

    pub fn mark_tended(&mut self, id: i64, note: Option<&str>) -> Result<(), StoreError> {
        self.transition("mark thought tended", id, Transition::MarkTended, note)
    }

    /// Resolves a tended thought into `resting` or one of the terminal states.
    pub fn resolve(
        &mut self,
        id: i64,
        next: ThoughtState,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        const OP: &str = "post-tend transition";
        if !next.is_resolution() {
            return Err(StoreError::invalid(
                OP,
                format!("invalid next state {next}: expected resting, evolved, released or archived"),
            ));
        }
        self.transition(OP, id, Transition::Resolve(next), note)
    }

    /// Moves any non-terminal thought straight to `evolved` without tending.
    pub fn evolve(&mut self, id: i64) -> Result<(), StoreError> {
        self.transition("evolve thought", id, Transition::Evolve, None)
    }

    fn transition(
        &mut self,
        op: &'static str,
        id: i64,
        transition: Transition,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        require_id(op, id)?;

        let now = self.now();
        let settle = self.settle;
        let tx = self.conn.transaction().map_err(db_error(op))?;
        let current = load_thought(&tx, op, id)?;
        let from = current.current_state;
        let next = match transition {
            Transition::MarkTended => from.mark_tended(current.eligibility_at, now),
            other => from.apply(other),
        }
        .map_err(|source| StoreError::InvalidTransition { op, id, source })?;

        let at = now.max(current.updated_at);
        let at_text = timestamp::encode(at);
        let eligibility_at = if next == ThoughtState::Resting {
            Some(timestamp::encode(settle_deadline(op, at, settle)?))
        } else {
            None
        };
        let tended_at = (transition == Transition::MarkTended).then_some(at_text.as_str());

        db::update_thought_state(
            &tx,
            &UpdateThoughtState {
                id,
                state: next,
                updated_at: &at_text,
                eligibility_at: eligibility_at.as_deref(),
                tended_at,
            },
        )
        .map_err(db_error(op))?;
        db::insert_event(
            &tx,
            &NewEvent {
                thought_id: id,
                kind: EventKind::StateChange.as_str(),
                at: &at_text,
                previous_state: Some(from),
                next_state: Some(next),
                note: normalize_note(note),
            },
        )
        .map_err(db_error(op))?;
        tx.commit().map_err(db_error(op))
    }

    /// Permanently removes a thought and its events. Ids are left sparse; see
    /// [`Store::reindex`].
    pub fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        const OP: &str = "delete thought";
        require_id(OP, id)?;

        let tx = self.conn.transaction().map_err(db_error(OP))?;
        let deleted = db::delete_thought(&tx, id).map_err(db_error(OP))?;
        if deleted == 0 {
            return Err(StoreError::NotFound { op: OP, id });
        }
        tx.commit().map_err(db_error(OP))
    }

    pub fn reindex(&mut self) -> Result<ReindexSummary, StoreError> {
        const OP: &str = "reindex thought ids";
        reindex::reindex_thought_ids(&mut self.conn).map_err(reindex_error(OP))
    }

    /// The `release` command: hard delete followed by id compaction, in one
    /// transaction. A failed compaction keeps the thought.
    ///
    /// Distinct from resolving a tended thought to `released`, which keeps
    /// the row as a terminal state.
    pub fn release(&mut self, id: i64) -> Result<ReindexSummary, StoreError> {
        const OP: &str = "release thought";
        require_id(OP, id)?;

        let tx = self.conn.transaction().map_err(db_error(OP))?;
        let deleted = db::delete_thought(&tx, id).map_err(db_error(OP))?;
        if deleted == 0 {
            return Err(StoreError::NotFound { op: OP, id });
        }
        let summary = reindex::compact_thought_ids(&tx).map_err(reindex_error(OP))?;
        tx.commit().map_err(db_error(OP))?;
        Ok(summary)
    }

    pub fn count_tend_eligible(&self) -> Result<i64, StoreError> {
        let now = timestamp::encode(self.now());
        db::count_tend_eligible(&self.conn, &now).map_err(db_error("count tend ready"))
    }

    /// Persists `count` and reports whether it differs from the value seen by
    /// the previous call, including calls from earlier processes.
    pub fn did_count_change(&mut self, count: i64) -> Result<bool, StoreError> {
        let at = timestamp::encode(self.now());
        readiness::did_count_change(&mut self.conn, count, &at)
            .map_err(db_error("did tend count change"))
    }

    pub fn foreign_key_violations(&self) -> Result<Vec<ForeignKeyViolation>, StoreError> {
        reindex::foreign_key_violations(&self.conn).map_err(db_error("foreign key check"))
    }
}

fn load_thought(tx: &Transaction<'_>, op: &'static str, id: i64) -> Result<Thought, StoreError> {
    db::get_thought(tx, id)
        .map_err(db_error(op))?
        .ok_or(StoreError::NotFound { op, id })
}

fn require_id(op: &'static str, id: i64) -> Result<(), StoreError> {
    if id <= 0 {
        return Err(StoreError::invalid(
            op,
            format!("invalid thought id {id}: must be positive"),
        ));
    }
    Ok(())
}

fn require_content(op: &'static str, content: &str) -> Result<(), StoreError> {
    if content.trim().is_empty() {
        return Err(StoreError::invalid(op, "content is empty"));
    }
    Ok(())
}

fn require_page(op: &'static str, limit: i64, offset: i64) -> Result<(), StoreError> {
    if limit <= 0 {
        return Err(StoreError::invalid(op, "limit must be > 0"));
    }
    if offset < 0 {
        return Err(StoreError::invalid(op, "offset must be >= 0"));
    }
    Ok(())
}

/// `from + settle`, rejected when it falls outside the representable range.
fn settle_deadline(
    op: &'static str,
    from: OffsetDateTime,
    settle: Duration,
) -> Result<OffsetDateTime, StoreError> {
    time::Duration::try_from(settle)
        .ok()
        .and_then(|settle| from.checked_add(settle))
        .ok_or_else(|| StoreError::invalid(op, "settle duration is out of range"))
}

fn normalize_note(note: Option<&str>) -> Option<&str> {
    note.filter(|note| !note.trim().is_empty())
}

fn annotation_note(valence: Option<i64>, energy: Option<i64>) -> String {
    let mut parts = Vec::new();
    if let Some(valence) = valence {
        parts.push(format!("valence={valence}"));
    }
    if let Some(energy) = energy {
        parts.push(format!("energy={energy}"));
    }
    parts.join(" ")
}

fn ensure_parent_dir(path: &str) -> Result<(), StoreError> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io { op: "open", source })?;
    }
    Ok(())
}

fn db_error(op: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |source| StoreError::Db { op, source }
}

fn reindex_error(op: &'static str) -> impl Fn(ReindexError) -> StoreError {
    move |err| match err {
        ReindexError::Db(source) => StoreError::Db { op, source },
        ReindexError::Integrity(violations) => StoreError::Integrity { op, violations },
    }
}

#[derive(Debug)]
pub enum StoreError {
    InvalidArgument {
        op: &'static str,
        message: String,
    },
    NotFound {
        op: &'static str,
        id: i64,
    },
    InvalidTransition {
        op: &'static str,
        id: i64,
        source: InvalidStateTransition,
    },
    Db {
        op: &'static str,
        source: rusqlite::Error,
    },
    Io {
        op: &'static str,
        source: std::io::Error,
    },
    Integrity {
        op: &'static str,
        violations: Vec<ForeignKeyViolation>,
    },
}

impl StoreError {
    fn invalid(op: &'static str, message: impl Into<String>) -> Self {
        StoreError::InvalidArgument {
            op,
            message: message.into(),
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, StoreError::InvalidArgument { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidArgument { op, message } => write!(f, "{op}: {message}"),
            StoreError::NotFound { op, id } => write!(f, "{op}: thought #{id} not found"),
            StoreError::InvalidTransition { op, id, source } => {
                write!(f, "{op}: thought #{id}: {source}")
            }
            StoreError::Db { op, source } => write!(f, "{op}: database error: {source}"),
            StoreError::Io { op, source } => write!(f, "{op}: I/O error: {source}"),
            StoreError::Integrity { op, violations } => write!(
                f,
                "{op}: {}",
                ReindexError::Integrity(violations.clone())
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::InvalidTransition { source, .. } => Some(source),
            StoreError::Db { source, .. } => Some(source),
            StoreError::Io { source, .. } => Some(source),
            StoreError::InvalidArgument { .. }
            | StoreError::NotFound { .. }
            | StoreError::Integrity { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests;
#[cfg(test)]
mod tests_error_paths;
