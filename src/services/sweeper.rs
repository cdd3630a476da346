use anyhow::Context;
use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;

/// Flips every PENDING reservation whose deadline has passed to CANCELLED
/// and returns the number of rows affected. Idempotent and re-runnable; a
/// failure after partial progress leaves only rows a later run picks up.
pub fn expire_pending_reservations(conn: &Connection, now: NaiveDateTime) -> anyhow::Result<usize> {
    let count = queries::expire_pending_before(conn, now)
        .context("failed to expire pending reservations")?;

    if count > 0 {
        tracing::info!("expired {count} pending reservations");
    }

    Ok(count)
}
