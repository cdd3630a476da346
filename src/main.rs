use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use coworkd::config::AppConfig;
use coworkd::db;
use coworkd::handlers;
use coworkd::services::locks::SlotLocks;
use coworkd::services::sweeper;
use coworkd::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        slot_locks: SlotLocks::new(),
    });

    // Periodic expiry sweep, the always-on counterpart of POST /admin/expire.
    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(sweep_state.config.sweep_interval_secs));
        loop {
            interval.tick().await;
            let now = Utc::now().naive_utc();
            let result = {
                let db = sweep_state.db.lock().unwrap();
                sweeper::expire_pending_reservations(&db, now)
            };
            if let Err(e) = result {
                tracing::warn!("expiry sweep failed: {e:#}");
            }
        }
    });

    let app = Router::new()
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
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
