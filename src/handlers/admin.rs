use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Room;
use crate::services::{occupancy, sweeper};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// ── Rooms ──

// GET /rooms
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Room>>, AppError> {
    let rooms = {
        let db = state.db.lock().unwrap();
        queries::list_rooms(&db)?
    };
    Ok(Json(rooms))
}

#[derive(Deserialize)]
pub struct CreateRoomBody {
    pub name: Option<String>,
    pub max_capacity: Option<i64>,
}

// POST /admin/rooms
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRoomBody>,
) -> Result<(StatusCode, Json<Room>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let name = body
        .name
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidParameter("name is required".into()))?;
    let max_capacity = body.max_capacity.unwrap_or(1);

    let room = {
        let db = state.db.lock().unwrap();
        queries::create_room(&db, &name, max_capacity)?
    };

    Ok((StatusCode::CREATED, Json(room)))
}

// ── Expiry ──

#[derive(Serialize)]
pub struct ExpireResponse {
    expired: usize,
}

// POST /admin/expire
pub async fn expire_reservations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ExpireResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    let expired = {
        let db = state.db.lock().unwrap();
        sweeper::expire_pending_reservations(&db, now)?
    };

    Ok(Json(ExpireResponse { expired }))
}

// ── Occupancy reports ──

#[derive(Deserialize)]
pub struct OccupancyQuery {
    pub room_id: Option<i64>,
    pub date: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Serialize)]
pub struct OccupancyResponse {
    room_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    month: Option<u32>,
    occupancy: f64,
}

// GET /admin/occupancy?room_id=<id>&date=<YYYY-MM-DD>
// GET /admin/occupancy?room_id=<id>&year=<YYYY>&month=<M>
pub async fn get_occupancy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<OccupancyQuery>,
) -> Result<Json<OccupancyResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let room_id = query
        .room_id
        .ok_or_else(|| AppError::InvalidParameter("room_id is required".into()))?;

    let db = state.db.lock().unwrap();
    queries::get_room(&db, room_id)?
        .ok_or_else(|| AppError::NotFound(format!("room {room_id}")))?;

    match (query.date, query.year, query.month) {
        (Some(date_str), None, None) => {
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|_| {
                AppError::InvalidParameter("invalid date format (YYYY-MM-DD)".into())
            })?;
            let rate = occupancy::occupancy_rate(&db, &state.config.policy, room_id, date)?;
            Ok(Json(OccupancyResponse {
                room_id,
                date: Some(date_str),
                year: None,
                month: None,
                occupancy: rate,
            }))
        }
        (None, Some(year), Some(month)) => {
            let rate =
                occupancy::monthly_occupancy_rate(&db, &state.config.policy, room_id, year, month)?;
            Ok(Json(OccupancyResponse {
                room_id,
                date: None,
                year: Some(year),
                month: Some(month),
                occupancy: rate,
            }))
        }
        _ => Err(AppError::InvalidParameter(
            "either date or year and month are required".into(),
        )),
    }
}

#[derive(Deserialize)]
pub struct RankingQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Serialize)]
pub struct RankingResponse {
    year: i32,
    month: u32,
    ranking: Vec<occupancy::RoomOccupancy>,
}

// GET /admin/ranking?year=<YYYY>&month=<M>
pub async fn get_ranking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RankingQuery>,
) -> Result<Json<RankingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let (year, month) = match (query.year, query.month) {
        (Some(year), Some(month)) => (year, month),
        _ => {
            return Err(AppError::InvalidParameter(
                "year and month are required".into(),
            ))
        }
    };

    let ranking = {
        let db = state.db.lock().unwrap();
        occupancy::rooms_monthly_ranking(&db, &state.config.policy, year, month)?
    };

    Ok(Json(RankingResponse {
        year,
        month,
        ranking,
    }))
}
