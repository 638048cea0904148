use std::{env, net::SocketAddr};

use chrono::Duration;

use crate::error::AppError;

/// Where trips are persisted. Users and sessions always live in SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TripStore {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub session_ttl: Duration,
    pub trip_store: TripStore,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://mileage.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-mileage-tracker-cookie-secret".to_string());

        let session_ttl_hours: i64 = env::var("SESSION_TTL_HOURS")
            .unwrap_or_else(|_| "720".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid SESSION_TTL_HOURS: {err}")))?;
        let session_ttl = session_ttl_from_hours(session_ttl_hours)?;

        let trip_store = match env::var("TRIP_STORE").as_deref() {
            Err(_) | Ok("sqlite") => TripStore::Sqlite,
            Ok("memory") => TripStore::Memory,
            Ok(other) => {
                return Err(AppError::Config(format!(
                    "invalid TRIP_STORE {other:?}, expected sqlite or memory"
                )))
            }
        };

        Ok(Self {
            database_url,
            listen_addr,
            cookie_secret,
            session_ttl,
            trip_store,
        })
    }
}

fn session_ttl_from_hours(hours: i64) -> Result<Duration, AppError> {
    if hours <= 0 {
        return Err(AppError::Config(
            "SESSION_TTL_HOURS must be positive".to_string(),
        ));
    }
    Duration::try_hours(hours)
        .ok_or_else(|| AppError::Config(format!("SESSION_TTL_HOURS {hours} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ttl_must_be_positive_and_in_range() {
        assert_eq!(session_ttl_from_hours(720).unwrap(), Duration::days(30));
        assert!(matches!(session_ttl_from_hours(0), Err(AppError::Config(_))));
        assert!(matches!(session_ttl_from_hours(-3), Err(AppError::Config(_))));
        assert!(matches!(session_ttl_from_hours(i64::MAX), Err(AppError::Config(_))));
    }
}
