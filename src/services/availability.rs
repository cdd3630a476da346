use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::config::ReservationPolicy;
use crate::db::queries;
use crate::models::TimeRange;

/// Free time within business hours for a room on a date, as maximal ranges.
///
/// Sweeps a cursor from opening time over the active reservations in start
/// order, emitting the gap before each reservation and the tail before
/// closing. Abutting reservations produce no zero-length ranges.
pub fn free_ranges(
    conn: &Connection,
    policy: &ReservationPolicy,
    room_id: i64,
    date: NaiveDate,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<TimeRange>> {
    let reservations = queries::get_active_reservations(conn, room_id, date, now)?;

    let mut ranges = vec![];
    let mut cursor = policy.opening;

    for reservation in &reservations {
        if reservation.start_time > cursor {
            ranges.push(TimeRange::new(cursor, reservation.start_time));
        }
        cursor = cursor.max(reservation.end_time);
    }

    if cursor < policy.closing {
        ranges.push(TimeRange::new(cursor, policy.closing));
    }

    Ok(ranges)
}

/// Bookable slots: each free range subdivided into fixed-size granules.
pub fn free_slots(
    conn: &Connection,
    policy: &ReservationPolicy,
    room_id: i64,
    date: NaiveDate,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<TimeRange>> {
    let ranges = free_ranges(conn, policy, room_id, date, now)?;
    Ok(subdivide(&ranges, policy.slot_minutes, policy.minimum_minutes))
}

/// Walks each range in `slot_minutes` steps. A granule is emitted only while
/// the time remaining in the range is at least `minimum_minutes`; a trailing
/// remainder below the minimum is dropped even when one more granule would
/// still fit. Slot boundaries never cross the end of a range.
pub fn subdivide(ranges: &[TimeRange], slot_minutes: i64, minimum_minutes: i64) -> Vec<TimeRange> {
    let slot = Duration::minutes(slot_minutes);
    let mut slots = vec![];

    for range in ranges {
        let mut start = range.start;
        while start + slot <= range.end {
            let remaining = (range.end - start).num_minutes();
            if remaining >= minimum_minutes {
                slots.push(TimeRange::new(start, start + slot));
            }
            start = start + slot;
        }
    }

    slots
}
