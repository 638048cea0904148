use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    error::AppError,
    models::trip::{NewTrip, Trip},
};

/// Persistence contract for trips.
///
/// Implementations own the stored records; every method hands back freshly
/// materialized copies.
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Stores a new trip with a fresh id and `created_at`.
    ///
    /// Inserting an in-progress trip is conditional: it fails with
    /// [`AppError::TripAlreadyInProgress`] when the user already has one.
    async fn create_trip(&self, trip: NewTrip) -> Result<Trip, AppError>;

    /// All trips of `user_id`, newest `trip_date` first.
    async fn list_trips_by_user(&self, user_id: &str) -> Result<Vec<Trip>, AppError>;

    /// The single in-progress trip of `user_id`, if any.
    ///
    /// More than one is reported as [`AppError::InconsistentState`].
    async fn find_in_progress_trip(&self, user_id: &str) -> Result<Option<Trip>, AppError>;

    /// Completes an in-progress trip in place.
    async fn update_trip_to_completed(&self, id: &str, end_mileage: Decimal)
        -> Result<Trip, AppError>;
}

pub(crate) fn require_user_id(user_id: &str) -> Result<&str, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        Err(AppError::NotAuthenticated)
    } else {
        Ok(user_id)
    }
}

pub(crate) fn single_in_progress(user_id: &str, mut found: Vec<Trip>) -> Result<Option<Trip>, AppError> {
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        n => Err(AppError::InconsistentState(format!(
            "user {user_id} has {n} trips in progress"
        ))),
    }
}
