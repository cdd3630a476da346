use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::ReservationPolicy;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Reservation, ReservationStatus, TimeRange};

#[derive(Debug, Clone)]
pub struct CreateReservation {
    pub room_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub user_id: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Admits and persists a new PENDING reservation.
///
/// Validation runs before any read or write. A replay of a known idempotency
/// key returns the stored row untouched, so retrying a failed request with
/// the same key is always safe. The caller must hold the slot lock for
/// (room_id, date) so the overlap check and insert are serialized against
/// concurrent admissions for the same room and day.
pub fn create_reservation(
    conn: &Connection,
    policy: &ReservationPolicy,
    req: CreateReservation,
    now: NaiveDateTime,
) -> Result<Reservation, AppError> {
    if req.date < now.date() {
        return Err(AppError::InvalidRange("cannot reserve in the past".into()));
    }
    if req.start_time >= req.end_time {
        return Err(AppError::InvalidRange(
            "start time must be before end time".into(),
        ));
    }
    validate_duration(policy, req.start_time, req.end_time)?;

    if let Some(key) = &req.idempotency_key {
        if let Some(existing) = queries::get_reservation_by_idempotency_key(conn, key)? {
            return Ok(existing);
        }
    }

    let tx = conn.unchecked_transaction()?;

    let candidate = TimeRange::new(req.start_time, req.end_time);
    if queries::overlapping_exists(&tx, req.room_id, req.date, candidate, now, None)? {
        return Err(AppError::SlotUnavailable);
    }

    let reservation = Reservation {
        id: Uuid::new_v4().to_string(),
        room_id: req.room_id,
        date: req.date,
        start_time: req.start_time,
        end_time: req.end_time,
        status: ReservationStatus::Pending,
        user_id: req.user_id,
        idempotency_key: req.idempotency_key,
        created_at: now,
        expires_at: Some(now + policy.pending_ttl),
    };

    match queries::insert_reservation(&tx, &reservation) {
        Ok(()) => {
            tx.commit()?;
            Ok(reservation)
        }
        // A concurrent create with the same idempotency key won the insert;
        // return the winning row instead of surfacing the constraint error.
        Err(err) if is_unique_violation(&err) => {
            drop(tx);
            if let Some(key) = &reservation.idempotency_key {
                if let Some(existing) = queries::get_reservation_by_idempotency_key(conn, key)? {
                    return Ok(existing);
                }
            }
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

/// PENDING → CONFIRMED, clearing the expiry deadline.
///
/// Confirming an expired row persists CANCELLED and fails with `Expired`;
/// the read performs a write there, matching the lazy-expiry design.
pub fn confirm_reservation(
    conn: &Connection,
    id: &str,
    user_id: Option<&str>,
    now: NaiveDateTime,
) -> Result<Reservation, AppError> {
    let reservation = queries::get_reservation(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("reservation {id}")))?;

    if reservation.user_id.as_deref() != user_id {
        return Err(AppError::Forbidden);
    }
    if reservation.status != ReservationStatus::Pending {
        return Err(AppError::InvalidState);
    }
    if reservation.date < now.date() {
        return Err(AppError::PastDate);
    }
    if reservation.is_expired(now) {
        queries::mark_cancelled(conn, id)?;
        return Err(AppError::Expired);
    }

    // An unexpired PENDING row blocks competitors, so a conflict here means
    // something slipped in while this row was not counted as active.
    if queries::overlapping_exists(
        conn,
        reservation.room_id,
        reservation.date,
        reservation.time_range(),
        now,
        Some(id),
    )? {
        return Err(AppError::SlotUnavailable);
    }

    // Conditional update: if the sweeper cancelled the row since the read,
    // nothing matches and the row keeps its terminal state.
    if !queries::mark_confirmed(conn, id)? {
        return Err(AppError::InvalidState);
    }

    Ok(Reservation {
        status: ReservationStatus::Confirmed,
        expires_at: None,
        ..reservation
    })
}

/// Soft delete: the row is kept, status becomes CANCELLED.
pub fn cancel_reservation(
    conn: &Connection,
    id: &str,
    user_id: Option<&str>,
    now: NaiveDateTime,
) -> Result<Reservation, AppError> {
    let reservation = queries::get_reservation(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("reservation {id}")))?;

    if reservation.user_id.as_deref() != user_id {
        return Err(AppError::Forbidden);
    }
    if reservation.status == ReservationStatus::Cancelled {
        return Err(AppError::AlreadyCancelled);
    }
    if reservation.date < now.date() {
        return Err(AppError::PastDate);
    }

    queries::mark_cancelled(conn, id)?;

    Ok(Reservation {
        status: ReservationStatus::Cancelled,
        expires_at: None,
        ..reservation
    })
}

fn validate_duration(
    policy: &ReservationPolicy,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<(), AppError> {
    let minutes = (end - start).num_minutes();

    if minutes < policy.minimum_minutes {
        return Err(AppError::InvalidDuration(format!(
            "minimum reservation is {} minutes",
            policy.minimum_minutes
        )));
    }
    if minutes % policy.slot_minutes != 0 {
        return Err(AppError::InvalidDuration(format!(
            "reservation must be in {}-minute increments",
            policy.slot_minutes
        )));
    }

    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
