use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::caller_identity;
use crate::services::availability;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub room_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct SlotResponse {
    start: String,
    end: String,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    room_id: i64,
    date: String,
    slots: Vec<SlotResponse>,
}

// GET /availability?room_id=<id>&date=<YYYY-MM-DD>
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    caller_identity(&headers, &state.config)?;

    let (room_id, date) = match (query.room_id, query.date) {
        (Some(room_id), Some(date)) => (room_id, date),
        _ => {
            return Err(AppError::InvalidParameter(
                "room_id and date are required".into(),
            ))
        }
    };

    let room_id: i64 = room_id
        .parse()
        .map_err(|_| AppError::InvalidParameter("invalid room_id".into()))?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidParameter("invalid date format (YYYY-MM-DD)".into()))?;

    let now = Utc::now().naive_utc();
    let slots = {
        let db = state.db.lock().unwrap();
        queries::get_room(&db, room_id)?
            .ok_or_else(|| AppError::NotFound(format!("room {room_id}")))?;
        availability::free_slots(&db, &state.config.policy, room_id, date, now)?
    };

    Ok(Json(AvailabilityResponse {
        room_id,
        date: date.format("%Y-%m-%d").to_string(),
        slots: slots
            .into_iter()
            .map(|slot| SlotResponse {
                start: slot.start.format("%H:%M").to_string(),
                end: slot.end.format("%H:%M").to_string(),
            })
            .collect(),
    }))
}
