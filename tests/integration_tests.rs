use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use tower::ServiceExt;

use coworkd::config::AppConfig;
use coworkd::config::ReservationPolicy;
use coworkd::db;
use coworkd::db::queries;
use coworkd::handlers;
use coworkd::services::locks::SlotLocks;
use coworkd::state::AppState;

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        require_auth: false,
        sweep_interval_secs: 60,
        policy: ReservationPolicy::default(),
    }
}

fn test_state() -> Arc<AppState> {
    test_state_with_config(test_config())
}

fn test_state_with_config(config: AppConfig) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    queries::create_room(&conn, "Sala Pong", 10).unwrap();
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        slot_locks: SlotLocks::new(),
    })
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/availability",
            get(handlers::availability::get_availability),
        )
        .route(
            "/reservations",
            post(handlers::reservations::create_reservation),
        )
        .route(
            "/my-reservations",
            get(handlers::reservations::my_reservations),
        )
        .route(
            "/reservations/:id",
            delete(handlers::reservations::cancel_reservation),
        )
        .route(
            "/reservations/:id/confirm",
            post(handlers::reservations::confirm_reservation),
        )
        .route("/rooms", get(handlers::admin::list_rooms))
        .route("/admin/rooms", post(handlers::admin::create_room))
        .route("/admin/expire", post(handlers::admin::expire_reservations))
        .route("/admin/occupancy", get(handlers::admin::get_occupancy))
        .route("/admin/ranking", get(handlers::admin::get_ranking))
        .with_state(state)
}

fn tomorrow() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(1)
}

fn create_request(
    date: &str,
    start: &str,
    end: &str,
    user: &str,
    idempotency_key: Option<&str>,
) -> Request<Body> {
    let payload = serde_json::json!({
        "room_id": 1,
        "date": date,
        "start_time": start,
        "end_time": end,
    });

    let mut builder = Request::builder()
        .method("POST")
        .uri("/reservations")
        .header("Content-Type", "application/json")
        .header("X-User-Id", user);
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn create_reservation(app: &Router, start: &str, end: &str, user: &str) -> serde_json::Value {
    let date = tomorrow().format("%Y-%m-%d").to_string();
    let key = uuid_like(start, end, user);
    let res = app
        .clone()
        .oneshot(create_request(&date, start, end, user, Some(key.as_str())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    body_json(res).await
}

fn uuid_like(start: &str, end: &str, user: &str) -> String {
    format!("key-{start}-{end}-{user}")
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let app = test_app(test_state());
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ── Availability ──

#[tokio::test]
async fn test_availability_empty_day_spans_business_hours() {
    let app = test_app(test_state());
    let date = tomorrow().format("%Y-%m-%d").to_string();

    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/availability?room_id=1&date={date}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    assert_eq!(json["room_id"], 1);
    assert_eq!(json["date"], date);

    let slots = json["slots"].as_array().unwrap();
    // 08:00-18:00 in 30-minute granules, minus the trailing sub-minimum granule.
    assert_eq!(slots[0], serde_json::json!({"start": "08:00", "end": "08:30"}));
    assert_eq!(
        slots.last().unwrap(),
        &serde_json::json!({"start": "17:00", "end": "17:30"})
    );
    assert_eq!(slots.len(), 19);
}

#[tokio::test]
async fn test_availability_excludes_booked_interval() {
    let state = test_state();
    let app = test_app(Arc::clone(&state));
    create_reservation(&app, "10:00", "12:00", "user1").await;

    let date = tomorrow().format("%Y-%m-%d").to_string();
    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/availability?room_id=1&date={date}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = body_json(res).await;
    let slots = json["slots"].as_array().unwrap();
    assert!(!slots
        .iter()
        .any(|s| s["start"] == "10:00" || s["start"] == "11:30"));
    assert!(slots.iter().any(|s| s["start"] == "09:00"));
    assert!(slots.iter().any(|s| s["start"] == "12:00"));
}

#[tokio::test]
async fn test_availability_missing_params_is_400() {
    let app = test_app(test_state());
    let res = app
        .oneshot(
            Request::builder()
                .uri("/availability?room_id=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_availability_invalid_date_is_400() {
    let app = test_app(test_state());
    let res = app
        .oneshot(
            Request::builder()
                .uri("/availability?room_id=1&date=not-a-date")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_availability_unknown_room_is_404() {
    let app = test_app(test_state());
    let date = tomorrow().format("%Y-%m-%d").to_string();
    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/availability?room_id=99&date={date}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Creation ──

#[tokio::test]
async fn test_create_reservation_success() {
    let app = test_app(test_state());
    let json = create_reservation(&app, "09:00", "10:00", "user1").await;

    assert_eq!(json["room_id"], 1);
    assert_eq!(json["start_time"], "09:00");
    assert_eq!(json["end_time"], "10:00");
    assert_eq!(json["status"], "PENDING");
    assert!(json["id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_overlap_returns_409() {
    let app = test_app(test_state());
    create_reservation(&app, "09:00", "10:00", "user1").await;

    let date = tomorrow().format("%Y-%m-%d").to_string();
    let res = app
        .oneshot(create_request(&date, "09:30", "10:30", "user2", Some("other-key")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_touching_interval_succeeds() {
    let app = test_app(test_state());
    create_reservation(&app, "09:00", "10:00", "user1").await;
    create_reservation(&app, "10:00", "11:00", "user2").await;
}

#[tokio::test]
async fn test_create_missing_fields_returns_400() {
    let app = test_app(test_state());
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reservations")
                .header("Content-Type", "application/json")
                .header("Idempotency-Key", "k1")
                .body(Body::from(r#"{"room_id": 1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_missing_idempotency_key_returns_400() {
    let app = test_app(test_state());
    let date = tomorrow().format("%Y-%m-%d").to_string();
    let res = app
        .oneshot(create_request(&date, "09:00", "10:00", "user1", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_short_duration_returns_400() {
    let app = test_app(test_state());
    let date = tomorrow().format("%Y-%m-%d").to_string();
    let res = app
        .oneshot(create_request(&date, "09:00", "09:30", "user1", Some("k1")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_ninety_minutes_succeeds() {
    let app = test_app(test_state());
    create_reservation(&app, "09:00", "10:30", "user1").await;
}

#[tokio::test]
async fn test_create_unknown_room_returns_404() {
    let app = test_app(test_state());
    let date = tomorrow().format("%Y-%m-%d").to_string();
    let payload = serde_json::json!({
        "room_id": 99, "date": date, "start_time": "09:00", "end_time": "10:00",
    });
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reservations")
                .header("Content-Type", "application/json")
                .header("Idempotency-Key", "k1")
                .header("X-User-Id", "user1")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_is_idempotent_per_key() {
    let app = test_app(test_state());
    let date = tomorrow().format("%Y-%m-%d").to_string();

    let first = app
        .clone()
        .oneshot(create_request(&date, "09:00", "10:00", "user1", Some("retry")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;

    let second = app
        .oneshot(create_request(&date, "09:00", "10:00", "user1", Some("retry")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second = body_json(second).await;

    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn test_concurrent_creates_admit_exactly_one() {
    let state = test_state();
    let app = test_app(state);
    let date = tomorrow().format("%Y-%m-%d").to_string();

    let mut handles = vec![];
    for i in 0..5 {
        let app = app.clone();
        let date = date.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("racer-{i}");
            let res = app
                .oneshot(create_request(&date, "09:00", "10:00", "user1", Some(key.as_str())))
                .await
                .unwrap();
            res.status()
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status: {other}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 4);
}

// ── Listing ──

#[tokio::test]
async fn test_my_reservations_filters_and_orders() {
    let state = test_state();
    let app = test_app(Arc::clone(&state));
    create_reservation(&app, "13:00", "14:00", "user1").await;
    create_reservation(&app, "09:00", "10:00", "user1").await;
    create_reservation(&app, "11:00", "12:00", "user2").await;

    let res = app
        .oneshot(
            Request::builder()
                .uri("/my-reservations")
                .header("X-User-Id", "user1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    let reservations = json["reservations"].as_array().unwrap();
    assert_eq!(reservations.len(), 2);
    assert_eq!(reservations[0]["start_time"], "09:00");
    assert_eq!(reservations[1]["start_time"], "13:00");
    assert_eq!(reservations[0]["room"], "Sala Pong");
    assert_eq!(reservations[0]["room_id"], 1);
}

#[tokio::test]
async fn test_my_reservations_without_identity_is_401() {
    let app = test_app(test_state());
    let res = app
        .oneshot(
            Request::builder()
                .uri("/my-reservations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

// ── Cancellation ──

#[tokio::test]
async fn test_cancel_reservation() {
    let app = test_app(test_state());
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap();

    let res = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/reservations/{id}"))
                .header("X-User-Id", "user1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    assert_eq!(json["status"], "CANCELLED");
}

#[tokio::test]
async fn test_cancel_not_owner_is_403() {
    let app = test_app(test_state());
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap();

    let res = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/reservations/{id}"))
                .header("X-User-Id", "intruder")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cancel_twice_is_400() {
    let app = test_app(test_state());
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap();

    for expected in [StatusCode::OK, StatusCode::BAD_REQUEST] {
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/reservations/{id}"))
                    .header("X-User-Id", "user1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), expected);
    }
}

#[tokio::test]
async fn test_cancel_unknown_id_is_404() {
    let app = test_app(test_state());
    let res = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/reservations/missing")
                .header("X-User-Id", "user1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Confirmation ──

#[tokio::test]
async fn test_confirm_reservation() {
    let app = test_app(test_state());
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap();

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/reservations/{id}/confirm"))
                .header("X-User-Id", "user1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    assert_eq!(json["id"], id);
    assert_eq!(json["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_confirm_not_owner_is_403() {
    let app = test_app(test_state());
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap();

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/reservations/{id}/confirm"))
                .header("X-User-Id", "intruder")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_confirm_cancelled_is_400() {
    let state = test_state();
    let app = test_app(Arc::clone(&state));
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap().to_string();

    {
        let db = state.db.lock().unwrap();
        db.execute(
            "UPDATE reservations SET status = 'CANCELLED', expires_at = NULL WHERE id = ?1",
            [&id],
        )
        .unwrap();
    }

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/reservations/{id}/confirm"))
                .header("X-User-Id", "user1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_expired_is_400_and_cancels() {
    let state = test_state();
    let app = test_app(Arc::clone(&state));
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap().to_string();

    // Backdate the expiry deadline.
    {
        let db = state.db.lock().unwrap();
        db.execute(
            "UPDATE reservations SET expires_at = '2020-01-01 00:00:00' WHERE id = ?1",
            [&id],
        )
        .unwrap();
    }

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/reservations/{id}/confirm"))
                .header("X-User-Id", "user1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json = body_json(res).await;
    assert_eq!(json["error"], "reservation has expired");

    // The failed confirm flipped the row to CANCELLED and freed the slot.
    create_reservation(&app, "09:00", "10:00", "user2").await;
}

// ── Auth ──

#[tokio::test]
async fn test_create_requires_identity_when_auth_required() {
    let mut config = test_config();
    config.require_auth = true;
    let app = test_app(test_state_with_config(config));

    let date = tomorrow().format("%Y-%m-%d").to_string();
    let payload = serde_json::json!({
        "room_id": 1, "date": date, "start_time": "09:00", "end_time": "10:00",
    });
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reservations")
                .header("Content-Type", "application/json")
                .header("Idempotency-Key", "k1")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

// ── Admin ──

#[tokio::test]
async fn test_admin_expire_sweeps_stale_pending() {
    let state = test_state();
    let app = test_app(Arc::clone(&state));
    let created = create_reservation(&app, "09:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap().to_string();

    {
        let db = state.db.lock().unwrap();
        db.execute(
            "UPDATE reservations SET expires_at = '2020-01-01 00:00:00' WHERE id = ?1",
            [&id],
        )
        .unwrap();
    }

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/expire")
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["expired"], 1);

    // The swept slot is bookable again.
    create_reservation(&app, "09:00", "10:00", "user2").await;
}

#[tokio::test]
async fn test_admin_expire_requires_token() {
    let app = test_app(test_state());
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/expire")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_create_room_and_list() {
    let app = test_app(test_state());

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/rooms")
                .header("Authorization", "Bearer test-token")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"name": "Sala Sur", "max_capacity": 4}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app
        .oneshot(Request::builder().uri("/rooms").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(res).await;
    let rooms = json.as_array().unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[1]["name"], "Sala Sur");
}

#[tokio::test]
async fn test_admin_occupancy_report() {
    let state = test_state();
    let app = test_app(Arc::clone(&state));
    let created = create_reservation(&app, "08:00", "10:00", "user1").await;
    let id = created["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/reservations/{id}/confirm"))
                .header("X-User-Id", "user1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let date = tomorrow().format("%Y-%m-%d").to_string();
    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/admin/occupancy?room_id=1&date={date}"))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    // 2 of 10 business hours.
    assert!((json["occupancy"].as_f64().unwrap() - 0.2).abs() < 1e-9);
}
