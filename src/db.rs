use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result, Row};
use time::OffsetDateTime;

use crate::domain::state::ThoughtState;
use crate::domain::thought::{Event, Thought};
use crate::timestamp;

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "thoughts_and_events_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS thoughts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    current_state TEXT NOT NULL,
    tend_counter INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_tended_at TEXT NULL,
    eligibility_at TEXT NOT NULL,
    valence INTEGER NULL,
    energy INTEGER NULL
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thought_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    at TEXT NOT NULL,
    previous_state TEXT NULL,
    next_state TEXT NULL,
    note TEXT NULL,
    FOREIGN KEY (thought_id) REFERENCES thoughts(id)
);
"#,
    },
    Migration {
        version: 2,
        name: "app_state_and_indexes_v2",
        sql: r#"
CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_thoughts_state_eligibility
    ON thoughts(current_state, eligibility_at);
CREATE INDEX IF NOT EXISTS idx_thoughts_updated_at ON thoughts(updated_at);
CREATE INDEX IF NOT EXISTS idx_events_thought_id_at ON events(thought_id, at);
"#,
    },
];

pub fn open_connection(path: &str) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_speed(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

/// Brings the schema up to [`CURRENT_SCHEMA_VERSION`]. Safe to call on every
/// open: an up-to-date database is left untouched.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    applied_at TEXT NOT NULL DEFAULT ''
);
"#,
    )?;

    if schema_version(conn)? >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let current = schema_version(&tx)?;
    let applied_at = timestamp::encode(OffsetDateTime::now_utc());
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, applied_at],
        )?;
    }
    tx.commit()
}

pub fn schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}

const THOUGHT_COLUMNS: &str = "id, content, current_state, tend_counter, created_at, \
     updated_at, last_tended_at, eligibility_at, valence, energy";

/// A stored column whose text could not be decoded.
#[derive(Debug)]
pub struct InvalidColumn {
    pub column: &'static str,
    pub source: Box<dyn Error + Send + Sync>,
}

impl fmt::Display for InvalidColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column '{}': {}", self.column, self.source)
    }
}

impl Error for InvalidColumn {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

fn invalid_column(
    idx: usize,
    column: &'static str,
    source: impl Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(InvalidColumn {
            column,
            source: Box::new(source),
        }),
    )
}

fn timestamp_column(row: &Row<'_>, idx: usize, column: &'static str) -> Result<OffsetDateTime> {
    let raw: String = row.get(idx)?;
    timestamp::decode(&raw).map_err(|err| invalid_column(idx, column, err))
}

fn optional_timestamp_column(
    row: &Row<'_>,
    idx: usize,
    column: &'static str,
) -> Result<Option<OffsetDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| timestamp::decode(&raw).map_err(|err| invalid_column(idx, column, err)))
        .transpose()
}

fn state_column(
    row: &Row<'_>,
    idx: usize,
    column: &'static str,
) -> Result<Option<ThoughtState>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| ThoughtState::from_str(&raw).map_err(|err| invalid_column(idx, column, err)))
        .transpose()
}

fn thought_from_row(row: &Row<'_>) -> Result<Thought> {
    let current_state = state_column(row, 2, "current_state")?.ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, "current_state".to_string(), Type::Null)
    })?;
    Ok(Thought {
        id: row.get(0)?,
        content: row.get(1)?,
        current_state,
        tend_counter: row.get(3)?,
        created_at: timestamp_column(row, 4, "created_at")?,
        updated_at: timestamp_column(row, 5, "updated_at")?,
        last_tended_at: optional_timestamp_column(row, 6, "last_tended_at")?,
        eligibility_at: timestamp_column(row, 7, "eligibility_at")?,
        valence: row.get(8)?,
        energy: row.get(9)?,
    })
}

fn event_from_row(row: &Row<'_>) -> Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        thought_id: row.get(1)?,
        kind: row.get(2)?,
        at: timestamp_column(row, 3, "at")?,
        previous_state: state_column(row, 4, "previous_state")?,
        next_state: state_column(row, 5, "next_state")?,
        note: row.get(6)?,
    })
}

fn collect_thoughts(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Thought>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(thought_from_row(row)?);
    }
    Ok(result)
}

pub struct NewThought<'a> {
    pub content: &'a str,
    pub state: ThoughtState,
    pub created_at: &'a str,
    pub eligibility_at: &'a str,
}

pub fn insert_thought(conn: &Connection, args: &NewThought<'_>) -> Result<i64> {
    conn.execute(
        r#"
INSERT INTO thoughts (
    content, current_state, tend_counter, created_at, updated_at,
    last_tended_at, eligibility_at, valence, energy
)
VALUES (?1, ?2, 0, ?3, ?3, NULL, ?4, NULL, NULL)
"#,
        params![
            args.content,
            args.state.as_str(),
            args.created_at,
            args.eligibility_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_thought(conn: &Connection, id: i64) -> Result<Option<Thought>> {
    conn.query_row(
        &format!("SELECT {THOUGHT_COLUMNS} FROM thoughts WHERE id = ?1"),
        params![id],
        thought_from_row,
    )
    .optional()
}

pub fn get_tend_eligible_thought(
    conn: &Connection,
    id: i64,
    now: &str,
) -> Result<Option<Thought>> {
    conn.query_row(
        &format!(
            r#"
SELECT {THOUGHT_COLUMNS}
FROM thoughts
WHERE id = ?1 AND current_state IN (?2, ?3) AND eligibility_at <= ?4
"#
        ),
        params![
            id,
            ThoughtState::Captured.as_str(),
            ThoughtState::Resting.as_str(),
            now
        ],
        thought_from_row,
    )
    .optional()
}

/// Every thought except archived ones, oldest update first.
pub fn list_thoughts(conn: &Connection, limit: i64, offset: i64) -> Result<Vec<Thought>> {
    collect_thoughts(
        conn,
        &format!(
            r#"
SELECT {THOUGHT_COLUMNS}
FROM thoughts
WHERE current_state != ?1
ORDER BY updated_at ASC, id ASC
LIMIT ?2 OFFSET ?3
"#
        ),
        params![ThoughtState::Archived.as_str(), limit, offset],
    )
}

pub fn list_tend_eligible(
    conn: &Connection,
    now: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Thought>> {
    collect_thoughts(
        conn,
        &format!(
            r#"
SELECT {THOUGHT_COLUMNS}
FROM thoughts
WHERE current_state IN (?1, ?2) AND eligibility_at <= ?3
ORDER BY eligibility_at ASC, id ASC
LIMIT ?4 OFFSET ?5
"#
        ),
        params![
            ThoughtState::Captured.as_str(),
            ThoughtState::Resting.as_str(),
            now,
            limit,
            offset
        ],
    )
}

pub fn list_thoughts_by_state(
    conn: &Connection,
    state: ThoughtState,
    limit: i64,
    offset: i64,
) -> Result<Vec<Thought>> {
    collect_thoughts(
        conn,
        &format!(
            r#"
SELECT {THOUGHT_COLUMNS}
FROM thoughts
WHERE current_state = ?1
ORDER BY updated_at ASC, id ASC
LIMIT ?2 OFFSET ?3
"#
        ),
        params![state.as_str(), limit, offset],
    )
}

pub fn count_tend_eligible(conn: &Connection, now: &str) -> Result<i64> {
    conn.query_row(
        r#"
SELECT COUNT(*)
FROM thoughts
WHERE current_state IN (?1, ?2) AND eligibility_at <= ?3
"#,
        params![
            ThoughtState::Captured.as_str(),
            ThoughtState::Resting.as_str(),
            now
        ],
        |row| row.get(0),
    )
}

pub struct UpdateThoughtState<'a> {
    pub id: i64,
    pub state: ThoughtState,
    pub updated_at: &'a str,
    /// Set only when entering `resting`.
    pub eligibility_at: Option<&'a str>,
    /// Set only when marking tended; also bumps `tend_counter`.
    pub tended_at: Option<&'a str>,
}

pub fn update_thought_state(conn: &Connection, args: &UpdateThoughtState<'_>) -> Result<usize> {
    conn.execute(
        r#"
UPDATE thoughts
SET current_state = ?2,
    updated_at = ?3,
    eligibility_at = COALESCE(?4, eligibility_at),
    last_tended_at = COALESCE(?5, last_tended_at),
    tend_counter = tend_counter + CASE WHEN ?5 IS NULL THEN 0 ELSE 1 END
WHERE id = ?1
"#,
        params![
            args.id,
            args.state.as_str(),
            args.updated_at,
            args.eligibility_at,
            args.tended_at
        ],
    )
}

pub fn update_thought_content(
    conn: &Connection,
    id: i64,
    content: &str,
    updated_at: &str,
) -> Result<usize> {
    conn.execute(
        "UPDATE thoughts SET content = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, content, updated_at],
    )
}

pub fn update_thought_annotations(
    conn: &Connection,
    id: i64,
    valence: Option<i64>,
    energy: Option<i64>,
    updated_at: &str,
) -> Result<usize> {
    conn.execute(
        r#"
UPDATE thoughts
SET valence = COALESCE(?2, valence),
    energy = COALESCE(?3, energy),
    updated_at = ?4
WHERE id = ?1
"#,
        params![id, valence, energy, updated_at],
    )
}

/// Removes a thought and its whole event history. Returns the number of
/// thought rows deleted.
pub fn delete_thought(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute("DELETE FROM events WHERE thought_id = ?1", params![id])?;
    conn.execute("DELETE FROM thoughts WHERE id = ?1", params![id])
}

pub struct NewEvent<'a> {
    pub thought_id: i64,
    pub kind: &'a str,
    pub at: &'a str,
    pub previous_state: Option<ThoughtState>,
    pub next_state: Option<ThoughtState>,
    pub note: Option<&'a str>,
}

pub fn insert_event(conn: &Connection, args: &NewEvent<'_>) -> Result<i64> {
    conn.execute(
        r#"
INSERT INTO events (thought_id, kind, at, previous_state, next_state, note)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
        params![
            args.thought_id,
            args.kind,
            args.at,
            args.previous_state.map(ThoughtState::as_str),
            args.next_state.map(ThoughtState::as_str),
            args.note
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_events(conn: &Connection, thought_id: i64) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        r#"
SELECT id, thought_id, kind, at, previous_state, next_state, note
FROM events
WHERE thought_id = ?1
ORDER BY at ASC, id ASC
"#,
    )?;

    let mut rows = stmt.query(params![thought_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(event_from_row(row)?);
    }
    Ok(result)
}

pub fn get_app_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM app_state WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_app_state(conn: &Connection, key: &str, value: &str, updated_at: &str) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO app_state (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
    value = excluded.value,
    updated_at = excluded.updated_at
"#,
        params![key, value, updated_at],
    )?;
    Ok(())
}
