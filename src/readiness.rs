use rusqlite::Connection;

use crate::db;

pub const TEND_READY_COUNT_KEY: &str = "tend_ready_count";

/// Records `count` as the last observed tend-ready count and reports whether
/// it differs from the previously recorded one. A missing or unreadable
/// previous value counts as a change.
pub fn did_count_change(conn: &mut Connection, count: i64, at: &str) -> rusqlite::Result<bool> {
    let tx = conn.transaction()?;
    let previous = db::get_app_state(&tx, TEND_READY_COUNT_KEY)?
        .and_then(|raw| raw.trim().parse::<i64>().ok());
    db::set_app_state(&tx, TEND_READY_COUNT_KEY, &count.to_string(), at)?;
    tx.commit()?;
    Ok(previous != Some(count))
}
