use std::env;

use chrono::{Duration, NaiveTime};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub require_auth: bool,
    pub sweep_interval_secs: u64,
    pub policy: ReservationPolicy,
}

/// Business rules for a deployment. Injected everywhere a service needs
/// opening hours or durations so tests and deployments can vary them.
#[derive(Clone, Copy, Debug)]
pub struct ReservationPolicy {
    pub opening: NaiveTime,
    pub closing: NaiveTime,
    pub slot_minutes: i64,
    pub minimum_minutes: i64,
    pub pending_ttl: Duration,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            opening: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            closing: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            slot_minutes: 30,
            minimum_minutes: 60,
            pending_ttl: Duration::minutes(10),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = ReservationPolicy::default();
        let opening_hour: u32 = env_parse("OPENING_HOUR", 8);
        let closing_hour: u32 = env_parse("CLOSING_HOUR", 18);

        Self {
            port: env_parse("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "coworkd.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            require_auth: env::var("REQUIRE_AUTH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60),
            policy: ReservationPolicy {
                opening: NaiveTime::from_hms_opt(opening_hour, 0, 0).unwrap_or(defaults.opening),
                closing: NaiveTime::from_hms_opt(closing_hour, 0, 0).unwrap_or(defaults.closing),
                slot_minutes: env_parse("SLOT_MINUTES", 30),
                minimum_minutes: env_parse("MINIMUM_MINUTES", 60),
                pending_ttl: Duration::minutes(env_parse("PENDING_TTL_MINUTES", 10)),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
