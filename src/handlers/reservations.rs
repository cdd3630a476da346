use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::{caller_identity, require_identity};
use crate::models::Reservation;
use crate::services::lifecycle::{self, CreateReservation};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateReservationBody {
    pub room_id: Option<i64>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Serialize)]
pub struct ReservationResponse {
    id: String,
    room_id: i64,
    date: String,
    start_time: String,
    end_time: String,
    status: String,
}

impl From<&Reservation> for ReservationResponse {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id.clone(),
            room_id: r.room_id,
            date: r.date.format("%Y-%m-%d").to_string(),
            start_time: r.start_time.format("%H:%M").to_string(),
            end_time: r.end_time.format("%H:%M").to_string(),
            status: r.status.as_str().to_string(),
        }
    }
}

// POST /reservations
pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReservationBody>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let user_id = caller_identity(&headers, &state.config)?;

    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AppError::InvalidParameter("Idempotency-Key header is required".into())
        })?;

    let (room_id, date, start_time, end_time) =
        match (body.room_id, body.date, body.start_time, body.end_time) {
            (Some(room_id), Some(date), Some(start), Some(end)) => (room_id, date, start, end),
            _ => {
                return Err(AppError::InvalidParameter(
                    "room_id, date, start_time and end_time are required".into(),
                ))
            }
        };

    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidParameter("invalid date format (YYYY-MM-DD)".into()))?;
    let start_time = parse_time(&start_time)?;
    let end_time = parse_time(&end_time)?;

    let now = Utc::now().naive_utc();

    // Admission for one room and day is serialized by its slot lock; other
    // rooms and dates are admitted in parallel.
    let lock = state.slot_locks.acquire(room_id, date);
    let _admission = lock.lock().unwrap();

    let reservation = {
        let db = state.db.lock().unwrap();
        queries::get_room(&db, room_id)?
            .ok_or_else(|| AppError::NotFound(format!("room {room_id}")))?;
        lifecycle::create_reservation(
            &db,
            &state.config.policy,
            CreateReservation {
                room_id,
                date,
                start_time,
                end_time,
                user_id,
                idempotency_key: Some(idempotency_key),
            },
            now,
        )?
    };

    Ok((StatusCode::CREATED, Json((&reservation).into())))
}

#[derive(Serialize)]
pub struct MyReservationEntry {
    id: String,
    room: String,
    room_id: i64,
    date: String,
    start_time: String,
    end_time: String,
    status: String,
}

#[derive(Serialize)]
pub struct MyReservationsResponse {
    reservations: Vec<MyReservationEntry>,
}

// GET /my-reservations
pub async fn my_reservations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MyReservationsResponse>, AppError> {
    let user_id = require_identity(&headers, &state.config)?;

    let reservations = {
        let db = state.db.lock().unwrap();
        queries::get_reservations_for_user(&db, &user_id)?
    };

    Ok(Json(MyReservationsResponse {
        reservations: reservations
            .into_iter()
            .map(|(r, room)| MyReservationEntry {
                id: r.id.clone(),
                room,
                room_id: r.room_id,
                date: r.date.format("%Y-%m-%d").to_string(),
                start_time: r.start_time.format("%H:%M").to_string(),
                end_time: r.end_time.format("%H:%M").to_string(),
                status: r.status.as_str().to_string(),
            })
            .collect(),
    }))
}

#[derive(Serialize)]
pub struct StatusResponse {
    id: String,
    status: String,
}

// DELETE /reservations/:id
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let user_id = caller_identity(&headers, &state.config)?;
    let now = Utc::now().naive_utc();

    let reservation = {
        let db = state.db.lock().unwrap();
        lifecycle::cancel_reservation(&db, &id, user_id.as_deref(), now)?
    };

    Ok(Json(StatusResponse {
        id: reservation.id,
        status: reservation.status.as_str().to_string(),
    }))
}

// POST /reservations/:id/confirm
pub async fn confirm_reservation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let user_id = caller_identity(&headers, &state.config)?;
    let now = Utc::now().naive_utc();

    let reservation = {
        let db = state.db.lock().unwrap();
        lifecycle::confirm_reservation(&db, &id, user_id.as_deref(), now)?
    };

    Ok(Json(StatusResponse {
        id: reservation.id,
        status: reservation.status.as_str().to_string(),
    }))
}

fn parse_time(s: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| AppError::InvalidParameter(format!("invalid time format (HH:MM): {s}")))
}
