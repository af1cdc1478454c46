use std::error::Error;
use std::fmt;

use rusqlite::{params, Connection, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReindexSummary {
    pub thoughts: usize,
    pub moved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
}

impl fmt::Display for ForeignKeyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rowid {
            Some(rowid) => write!(f, "{} row {} -> {}", self.table, rowid, self.parent),
            None => write!(f, "{} -> {}", self.table, self.parent),
        }
    }
}

#[derive(Debug)]
pub enum ReindexError {
    Db(rusqlite::Error),
    Integrity(Vec<ForeignKeyViolation>),
}

impl fmt::Display for ReindexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReindexError::Db(err) => write!(f, "database error: {}", err),
            ReindexError::Integrity(violations) => write!(
                f,
                "foreign key check failed with {} violation(s): {}",
                violations.len(),
                violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl Error for ReindexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReindexError::Db(err) => Some(err),
            ReindexError::Integrity(_) => None,
        }
    }
}

impl From<rusqlite::Error> for ReindexError {
    fn from(value: rusqlite::Error) -> Self {
        ReindexError::Db(value)
    }
}

/// Renumbers thought ids to a dense `1..=N` run in their existing order and
/// rewrites every event's `thought_id` to match, in its own transaction.
pub fn reindex_thought_ids(conn: &mut Connection) -> Result<ReindexSummary, ReindexError> {
    let tx = conn.transaction()?;
    let summary = compact_thought_ids(&tx)?;
    tx.commit()?;
    Ok(summary)
}

/// Renumbering step that runs inside the caller's transaction.
///
/// Any event already pointing at a missing thought aborts before anything
/// moves, since the remap could otherwise land it on a live id. Rows that
/// must move are parked on negative ids so no intermediate update can
/// collide with a live id. Foreign keys are deferred to commit, and the
/// check runs again after the remap.
pub fn compact_thought_ids(tx: &Transaction<'_>) -> Result<ReindexSummary, ReindexError> {
    let orphaned = foreign_key_violations(tx)?;
    if !orphaned.is_empty() {
        return Err(ReindexError::Integrity(orphaned));
    }
    tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;

    let ids = thought_ids(tx)?;
    let moves: Vec<(i64, i64)> = ids
        .iter()
        .zip(1i64..)
        .filter(|(old, new)| **old != *new)
        .map(|(old, new)| (*old, new))
        .collect();

    for (old, new) in &moves {
        tx.execute(
            "UPDATE thoughts SET id = ?1 WHERE id = ?2",
            params![-new, old],
        )?;
        tx.execute(
            "UPDATE events SET thought_id = ?1 WHERE thought_id = ?2",
            params![-new, old],
        )?;
    }
    tx.execute("UPDATE thoughts SET id = -id WHERE id < 0", [])?;
    tx.execute(
        "UPDATE events SET thought_id = -thought_id WHERE thought_id < 0",
        [],
    )?;

    reset_thought_sequence(tx)?;

    let violations = foreign_key_violations(tx)?;
    if !violations.is_empty() {
        return Err(ReindexError::Integrity(violations));
    }

    Ok(ReindexSummary {
        thoughts: ids.len(),
        moved: moves.len(),
    })
}

fn thought_ids(tx: &Transaction<'_>) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = tx.prepare("SELECT id FROM thoughts ORDER BY id ASC")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Points the AUTOINCREMENT counter at the current max id so the next
/// thought continues the dense run.
fn reset_thought_sequence(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let updated = tx.execute(
        r#"
UPDATE sqlite_sequence
SET seq = (SELECT COALESCE(MAX(id), 0) FROM thoughts)
WHERE name = 'thoughts'
"#,
        [],
    )?;
    if updated == 0 {
        tx.execute(
            r#"
INSERT INTO sqlite_sequence (name, seq)
SELECT 'thoughts', COALESCE(MAX(id), 0) FROM thoughts
"#,
            [],
        )?;
    }
    Ok(())
}

pub fn foreign_key_violations(conn: &Connection) -> rusqlite::Result<Vec<ForeignKeyViolation>> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let violations = stmt
        .query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(violations)
}
