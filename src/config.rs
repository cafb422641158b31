use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::sample::GeoPoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub upstream_base_url: String,
    pub restaurant_lat: Option<f64>,
    pub restaurant_lng: Option<f64>,
    pub poll_interval: Duration,
    pub emit_throttle: Duration,
    pub one_shot_timeout: Duration,
    pub continuous_max_age: Duration,
    pub fallback_max_age: Duration,
    pub geocode_delay: Duration,
    pub event_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            upstream_base_url: env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            restaurant_lat: parse_optional("RESTAURANT_LAT")?,
            restaurant_lng: parse_optional("RESTAURANT_LNG")?,
            poll_interval: Duration::from_secs(parse_or_default("POLL_INTERVAL_SECS", 5)?),
            emit_throttle: Duration::from_secs(parse_or_default("EMIT_THROTTLE_SECS", 10)?),
            one_shot_timeout: Duration::from_secs(parse_or_default("ONE_SHOT_TIMEOUT_SECS", 30)?),
            continuous_max_age: Duration::from_secs(parse_or_default(
                "CONTINUOUS_MAX_AGE_SECS",
                30,
            )?),
            fallback_max_age: Duration::from_secs(parse_or_default("FALLBACK_MAX_AGE_SECS", 60)?),
            geocode_delay: Duration::from_millis(parse_or_default("GEOCODE_DELAY_MS", 1000)?),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        })
    }

    /// The restaurant pin is deployment configuration, not part of the
    /// delivery payload. Absent unless both coordinates are set.
    pub fn restaurant_location(&self) -> Option<GeoPoint> {
        match (self.restaurant_lat, self.restaurant_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
