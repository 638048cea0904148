use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::{
    config::{AppConfig, TripStore},
    db::DbPool,
    services::{
        lifecycle::TripLifecycle, memory_store::InMemoryTripRepository,
        repository::TripRepository, sqlite_store::SqliteTripRepository,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub trips: TripLifecycle,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let repo: Arc<dyn TripRepository> = match config.trip_store {
            TripStore::Sqlite => Arc::new(SqliteTripRepository::new(db.clone())),
            TripStore::Memory => Arc::new(InMemoryTripRepository::new()),
        };
        Self::with_trips(config, db, TripLifecycle::new(repo))
    }

    pub fn with_trips(config: AppConfig, db: DbPool, trips: TripLifecycle) -> Self {
        let digest = Sha512::digest(config.cookie_secret.as_bytes());
        let cookie_key = Key::from(&digest[..]);
        Self {
            config,
            db,
            trips,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
