use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::ReservationPolicy;
use crate::db::queries;

/// Fraction of the business window occupied by confirmed reservations on a
/// single date. 0.0 when the window is empty.
pub fn occupancy_rate(
    conn: &Connection,
    policy: &ReservationPolicy,
    room_id: i64,
    date: NaiveDate,
) -> anyhow::Result<f64> {
    let available = business_minutes(policy);
    if available == 0 {
        return Ok(0.0);
    }

    let occupied: i64 = queries::get_confirmed_in_date_range(conn, room_id, date, date)?
        .iter()
        .map(|r| r.time_range().duration_minutes())
        .sum();

    Ok(occupied as f64 / available as f64)
}

/// Monthly rate for one room. The denominator counts working days only
/// (Monday through Friday).
pub fn monthly_occupancy_rate(
    conn: &Connection,
    policy: &ReservationPolicy,
    room_id: i64,
    year: i32,
    month: u32,
) -> anyhow::Result<f64> {
    let (start, end) = month_bounds(year, month).context("invalid year/month")?;

    let mut working_days = 0i64;
    let mut current = start;
    while current <= end {
        if current.weekday().number_from_monday() <= 5 {
            working_days += 1;
        }
        current = current.succ_opt().context("date overflow")?;
    }

    let available = working_days * business_minutes(policy);
    if available == 0 {
        return Ok(0.0);
    }

    let occupied: i64 = queries::get_confirmed_in_date_range(conn, room_id, start, end)?
        .iter()
        .map(|r| r.time_range().duration_minutes())
        .sum();

    Ok(occupied as f64 / available as f64)
}

#[derive(Debug, Serialize)]
pub struct RoomOccupancy {
    pub room_id: i64,
    pub room: String,
    pub occupancy: f64,
}

/// All rooms ranked by monthly occupancy, busiest first. Unlike the
/// per-room monthly rate, the denominator here counts every day of the
/// month.
pub fn rooms_monthly_ranking(
    conn: &Connection,
    policy: &ReservationPolicy,
    year: i32,
    month: u32,
) -> anyhow::Result<Vec<RoomOccupancy>> {
    let (start, end) = month_bounds(year, month).context("invalid year/month")?;
    let total_days = (end - start).num_days() + 1;
    let available = total_days * business_minutes(policy);

    let mut ranking = vec![];
    for room in queries::list_rooms(conn)? {
        let occupied: i64 = queries::get_confirmed_in_date_range(conn, room.id, start, end)?
            .iter()
            .map(|r| r.time_range().duration_minutes())
            .sum();

        ranking.push(RoomOccupancy {
            room_id: room.id,
            room: room.name,
            occupancy: if available > 0 {
                occupied as f64 / available as f64
            } else {
                0.0
            },
        });
    }

    ranking.sort_by(|a, b| {
        b.occupancy
            .partial_cmp(&a.occupancy)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(ranking)
}

fn business_minutes(policy: &ReservationPolicy) -> i64 {
    (policy.closing - policy.opening).num_minutes()
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next_month.pred_opt()?))
}
