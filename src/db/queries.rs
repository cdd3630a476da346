use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Reservation, ReservationStatus, Room, TimeRange};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ── Rooms ──

pub fn create_room(conn: &Connection, name: &str, max_capacity: i64) -> anyhow::Result<Room> {
    conn.execute(
        "INSERT INTO rooms (name, max_capacity) VALUES (?1, ?2)",
        params![name, max_capacity],
    )?;
    Ok(Room {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        max_capacity,
    })
}

pub fn get_room(conn: &Connection, id: i64) -> anyhow::Result<Option<Room>> {
    let result = conn.query_row(
        "SELECT id, name, max_capacity FROM rooms WHERE id = ?1",
        params![id],
        |row| {
            Ok(Room {
                id: row.get(0)?,
                name: row.get(1)?,
                max_capacity: row.get(2)?,
            })
        },
    );

    match result {
        Ok(room) => Ok(Some(room)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_rooms(conn: &Connection) -> anyhow::Result<Vec<Room>> {
    let mut stmt = conn.prepare("SELECT id, name, max_capacity FROM rooms ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Room {
            id: row.get(0)?,
            name: row.get(1)?,
            max_capacity: row.get(2)?,
        })
    })?;

    let mut rooms = vec![];
    for row in rows {
        rooms.push(row?);
    }
    Ok(rooms)
}

// ── Reservations ──

/// Returns the raw rusqlite error so callers can distinguish the unique
/// constraint violation on idempotency_key from other failures.
pub fn insert_reservation(conn: &Connection, r: &Reservation) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO reservations
            (id, room_id, date, start_time, end_time, status, user_id, idempotency_key, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            r.id,
            r.room_id,
            r.date.format(DATE_FMT).to_string(),
            r.start_time.format(TIME_FMT).to_string(),
            r.end_time.format(TIME_FMT).to_string(),
            r.status.as_str(),
            r.user_id,
            r.idempotency_key,
            r.created_at.format(TIMESTAMP_FMT).to_string(),
            r.expires_at.map(|t| t.format(TIMESTAMP_FMT).to_string()),
        ],
    )?;
    Ok(())
}

const RESERVATION_COLUMNS: &str =
    "id, room_id, date, start_time, end_time, status, user_id, idempotency_key, created_at, expires_at";

pub fn get_reservation(conn: &Connection, id: &str) -> anyhow::Result<Option<Reservation>> {
    let result = conn.query_row(
        &format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?1"),
        params![id],
        |row| Ok(parse_reservation_row(row)),
    );

    match result {
        Ok(reservation) => Ok(Some(reservation?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_reservation_by_idempotency_key(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<Reservation>> {
    let result = conn.query_row(
        &format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE idempotency_key = ?1"),
        params![key],
        |row| Ok(parse_reservation_row(row)),
    );

    match result {
        Ok(reservation) => Ok(Some(reservation?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Active reservations for a room and date, ordered by start time.
/// Active means CONFIRMED, or PENDING whose expiry deadline has not passed.
pub fn get_active_reservations(
    conn: &Connection,
    room_id: i64,
    date: NaiveDate,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<Reservation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations
         WHERE room_id = ?1 AND date = ?2
           AND (status = 'CONFIRMED' OR (status = 'PENDING' AND expires_at > ?3))
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            room_id,
            date.format(DATE_FMT).to_string(),
            now.format(TIMESTAMP_FMT).to_string(),
        ],
        |row| Ok(parse_reservation_row(row)),
    )?;

    let mut reservations = vec![];
    for row in rows {
        reservations.push(row??);
    }
    Ok(reservations)
}

/// Whether any active reservation for the room and date overlaps the
/// candidate half-open interval. Overlap is strict: rows that merely touch
/// the candidate at a boundary do not count.
pub fn overlapping_exists(
    conn: &Connection,
    room_id: i64,
    date: NaiveDate,
    candidate: TimeRange,
    now: NaiveDateTime,
    exclude_id: Option<&str>,
) -> anyhow::Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM reservations
            WHERE room_id = ?1 AND date = ?2
              AND (status = 'CONFIRMED' OR (status = 'PENDING' AND expires_at > ?3))
              AND start_time < ?4 AND end_time > ?5
              AND (?6 IS NULL OR id != ?6)
         )",
        params![
            room_id,
            date.format(DATE_FMT).to_string(),
            now.format(TIMESTAMP_FMT).to_string(),
            candidate.end.format(TIME_FMT).to_string(),
            candidate.start.format(TIME_FMT).to_string(),
            exclude_id,
        ],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// All of a user's reservations joined with the room name, ordered by
/// (date, start_time).
pub fn get_reservations_for_user(
    conn: &Connection,
    user_id: &str,
) -> anyhow::Result<Vec<(Reservation, String)>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.room_id, r.date, r.start_time, r.end_time, r.status,
                r.user_id, r.idempotency_key, r.created_at, r.expires_at, rm.name
         FROM reservations r
         INNER JOIN rooms rm ON rm.id = r.room_id
         WHERE r.user_id = ?1
         ORDER BY r.date ASC, r.start_time ASC",
    )?;

    let rows = stmt.query_map(params![user_id], |row| {
        let room_name: String = row.get(10)?;
        Ok((parse_reservation_row(row), room_name))
    })?;

    let mut reservations = vec![];
    for row in rows {
        let (reservation, room_name) = row?;
        reservations.push((reservation?, room_name));
    }
    Ok(reservations)
}

pub fn mark_confirmed(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE reservations SET status = 'CONFIRMED', expires_at = NULL
         WHERE id = ?1 AND status = 'PENDING'",
        params![id],
    )?;
    Ok(count > 0)
}

pub fn mark_cancelled(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE reservations SET status = 'CANCELLED', expires_at = NULL
         WHERE id = ?1 AND status != 'CANCELLED'",
        params![id],
    )?;
    Ok(count > 0)
}

/// Bulk conditional expiry: flips every stale PENDING row to CANCELLED in a
/// single statement, so a reservation confirmed between the sweeper's read
/// and write is never clobbered.
pub fn expire_pending_before(conn: &Connection, now: NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE reservations SET status = 'CANCELLED', expires_at = NULL
         WHERE status = 'PENDING' AND expires_at <= ?1",
        params![now.format(TIMESTAMP_FMT).to_string()],
    )?;
    Ok(count)
}

/// Confirmed reservations for a room across an inclusive date range.
pub fn get_confirmed_in_date_range(
    conn: &Connection,
    room_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<Reservation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations
         WHERE room_id = ?1 AND date >= ?2 AND date <= ?3 AND status = 'CONFIRMED'
         ORDER BY date ASC, start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            room_id,
            start.format(DATE_FMT).to_string(),
            end.format(DATE_FMT).to_string(),
        ],
        |row| Ok(parse_reservation_row(row)),
    )?;

    let mut reservations = vec![];
    for row in rows {
        reservations.push(row??);
    }
    Ok(reservations)
}

fn parse_reservation_row(row: &rusqlite::Row) -> anyhow::Result<Reservation> {
    let id: String = row.get(0)?;
    let room_id: i64 = row.get(1)?;
    let date_str: String = row.get(2)?;
    let start_str: String = row.get(3)?;
    let end_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let user_id: Option<String> = row.get(6)?;
    let idempotency_key: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let expires_at_str: Option<String> = row.get(9)?;

    let date = NaiveDate::parse_from_str(&date_str, DATE_FMT)
        .unwrap_or_else(|_| Utc::now().date_naive());
    let start_time =
        NaiveTime::parse_from_str(&start_str, TIME_FMT).unwrap_or_else(|_| NaiveTime::MIN);
    let end_time =
        NaiveTime::parse_from_str(&end_str, TIME_FMT).unwrap_or_else(|_| NaiveTime::MIN);
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, TIMESTAMP_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let expires_at = expires_at_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FMT).ok());

    Ok(Reservation {
        id,
        room_id,
        date,
        start_time,
        end_time,
        status: ReservationStatus::parse(&status_str),
        user_id,
        idempotency_key,
        created_at,
        expires_at,
    })
}
