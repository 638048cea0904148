use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::trip::{NewTrip, Trip, TripStatus},
    services::repository::{require_user_id, single_in_progress, TripRepository},
};

/// Process-local trip store. Each operation runs under one lock, so the
/// in-progress check and the insert cannot interleave.
#[derive(Clone, Default)]
pub struct InMemoryTripRepository {
    trips: Arc<Mutex<Vec<Trip>>>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record verbatim, bypassing every check.
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, trip: Trip) {
        self.trips.lock().await.push(trip);
    }
}

#[async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn create_trip(&self, mut trip: NewTrip) -> Result<Trip, AppError> {
        trip.user_id = require_user_id(&trip.user_id)?.to_owned();
        let mut trips = self.trips.lock().await;
        if trip.status == TripStatus::InProgress
            && trips
                .iter()
                .any(|t| t.user_id == trip.user_id && t.is_in_progress())
        {
            return Err(AppError::TripAlreadyInProgress);
        }
        let stored = trip.into_trip(Uuid::new_v4().to_string(), Utc::now());
        trips.push(stored.clone());
        Ok(stored)
    }

    async fn list_trips_by_user(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        let user_id = require_user_id(user_id)?;
        let mut items: Vec<Trip> = self
            .trips
            .lock()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.trip_date
                .cmp(&a.trip_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(items)
    }

    async fn find_in_progress_trip(&self, user_id: &str) -> Result<Option<Trip>, AppError> {
        let user_id = require_user_id(user_id)?;
        let found = self
            .trips
            .lock()
            .await
            .iter()
            .filter(|t| t.user_id == user_id && t.is_in_progress())
            .cloned()
            .collect();
        single_in_progress(user_id, found)
    }

    async fn update_trip_to_completed(
        &self,
        id: &str,
        end_mileage: Decimal,
    ) -> Result<Trip, AppError> {
        let mut trips = self.trips.lock().await;
        let trip = trips
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(AppError::NotFound)?;
        if trip.is_completed() {
            return Err(AppError::InvalidTransition(format!(
                "trip {id} is already completed"
            )));
        }
        trip.end_mileage = Some(end_mileage);
        trip.status = TripStatus::Completed;
        Ok(trip.clone())
    }
}
