//! Per-user trip state machine.
//!
//! A user is either without an active trip or has exactly one trip in
//! progress. `start_trip` moves to the latter, `end_trip` back to the former;
//! `record_completed_trip` writes a finished trip without touching either.
//! The repository's conditional insert is what makes `start_trip` safe under
//! concurrent requests; the read beforehand only produces the nicer error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::trip::{NewTrip, Trip, TripPurpose, TripStatus},
    services::{
        deduction::{compute_trip_details, TripDetails, MAX_MILEAGE},
        report,
        repository::TripRepository,
    },
};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Result of `end_trip`: the stored trip plus the figures for the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTrip {
    pub trip: Trip,
    #[serde(flatten)]
    pub details: TripDetails,
}

#[derive(Clone)]
pub struct TripLifecycle {
    repo: Arc<dyn TripRepository>,
    clock: Arc<dyn Clock>,
}

impl TripLifecycle {
    pub fn new(repo: Arc<dyn TripRepository>) -> Self {
        Self::with_clock(repo, Arc::new(SystemClock))
    }

    pub fn with_clock(repo: Arc<dyn TripRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn start_trip(
        &self,
        user_id: &str,
        start_mileage: Decimal,
        purpose: TripPurpose,
    ) -> Result<Trip, AppError> {
        check_start_mileage(start_mileage)?;
        if self.repo.find_in_progress_trip(user_id).await?.is_some() {
            return Err(AppError::TripAlreadyInProgress);
        }
        let trip = self
            .repo
            .create_trip(NewTrip::in_progress(
                user_id,
                start_mileage,
                purpose,
                self.clock.now(),
            ))
            .await?;
        info!(user_id, trip_id = %trip.id, %start_mileage, "trip started");
        Ok(trip)
    }

    pub async fn end_trip(
        &self,
        user_id: &str,
        end_mileage: Decimal,
    ) -> Result<CompletedTrip, AppError> {
        let current = self
            .repo
            .find_in_progress_trip(user_id)
            .await
            .map_err(|err| {
                if matches!(err, AppError::InconsistentState(_)) {
                    warn!(user_id, "refusing to guess which in-progress trip to end");
                }
                err
            })?
            .ok_or(AppError::NoActiveTrip)?;

        let details = completion_details(current.start_mileage, end_mileage)?;
        let trip = self
            .repo
            .update_trip_to_completed(&current.id, end_mileage)
            .await?;
        info!(
            user_id,
            trip_id = %trip.id,
            miles = %details.miles,
            deduction = %details.deduction,
            "trip completed"
        );
        Ok(CompletedTrip { trip, details })
    }

    /// Manual backfill: writes a finished trip in one step.
    pub async fn record_completed_trip(
        &self,
        user_id: &str,
        start_mileage: Decimal,
        end_mileage: Decimal,
        purpose: TripPurpose,
        trip_date: DateTime<Utc>,
    ) -> Result<Trip, AppError> {
        check_start_mileage(start_mileage)?;
        completion_details(start_mileage, end_mileage)?;
        let trip = self
            .repo
            .create_trip(NewTrip::completed(
                user_id,
                start_mileage,
                end_mileage,
                purpose,
                trip_date,
            ))
            .await?;
        info!(user_id, trip_id = %trip.id, "completed trip recorded");
        Ok(trip)
    }

    /// Stores an already-validated payload under the same rules as the
    /// dedicated operations.
    pub async fn create_trip(&self, trip: NewTrip) -> Result<Trip, AppError> {
        match (trip.status, trip.end_mileage) {
            (TripStatus::InProgress, None) => {
                check_start_mileage(trip.start_mileage)?;
                if self.repo.find_in_progress_trip(&trip.user_id).await?.is_some() {
                    return Err(AppError::TripAlreadyInProgress);
                }
                let stored = self.repo.create_trip(trip).await?;
                info!(user_id = %stored.user_id, trip_id = %stored.id, "trip started");
                Ok(stored)
            }
            (TripStatus::Completed, Some(end)) => {
                self.record_completed_trip(
                    &trip.user_id,
                    trip.start_mileage,
                    end,
                    trip.purpose,
                    trip.trip_date,
                )
                .await
            }
            (TripStatus::InProgress, Some(_)) => Err(AppError::validation(
                "endMileage",
                "must be empty while the trip is in progress",
            )),
            (TripStatus::Completed, None) => Err(AppError::validation(
                "endMileage",
                "is required for a completed trip",
            )),
        }
    }

    pub async fn trips_for(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        self.repo.list_trips_by_user(user_id).await
    }

    pub async fn current_trip(&self, user_id: &str) -> Result<Option<Trip>, AppError> {
        self.repo.find_in_progress_trip(user_id).await
    }

    /// Odometer reading to pre-fill when starting the next trip.
    pub async fn suggested_start_mileage(&self, user_id: &str) -> Result<Decimal, AppError> {
        let trips = self.repo.list_trips_by_user(user_id).await?;
        Ok(report::latest_end_mileage(&trips).unwrap_or(Decimal::ZERO))
    }
}

fn check_start_mileage(start_mileage: Decimal) -> Result<(), AppError> {
    if start_mileage < Decimal::ZERO {
        return Err(AppError::validation("startMileage", "must not be negative"));
    }
    if start_mileage > MAX_MILEAGE {
        return Err(AppError::validation(
            "startMileage",
            format!("must not exceed {MAX_MILEAGE}"),
        ));
    }
    Ok(())
}

fn completion_details(start: Decimal, end: Decimal) -> Result<TripDetails, AppError> {
    if end > MAX_MILEAGE {
        return Err(AppError::validation(
            "endMileage",
            format!("must not exceed {MAX_MILEAGE}"),
        ));
    }
    if end <= start {
        return Err(AppError::InvalidMileage { start, end });
    }
    compute_trip_details(start, end).ok_or(AppError::InvalidMileage { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::InMemoryTripRepository;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn d(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn noon() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-07-04T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn engine() -> (TripLifecycle, InMemoryTripRepository) {
        let repo = InMemoryTripRepository::new();
        let engine =
            TripLifecycle::with_clock(Arc::new(repo.clone()), Arc::new(FixedClock(noon())));
        (engine, repo)
    }

    #[tokio::test]
    async fn start_then_end_reports_miles_and_deduction() {
        let (engine, _) = engine();
        let started = engine
            .start_trip("u1", d("1000"), TripPurpose::Business)
            .await
            .unwrap();
        assert_eq!(started.status, TripStatus::InProgress);
        assert_eq!(started.start_mileage, d("1000"));
        assert_eq!(started.end_mileage, None);
        assert_eq!(started.trip_date, noon());

        let done = engine.end_trip("u1", d("1050")).await.unwrap();
        assert_eq!(done.details.miles, d("50"));
        assert_eq!(done.details.deduction, d("35.00"));
        assert_eq!(done.trip.id, started.id);
        assert_eq!(done.trip.status, TripStatus::Completed);
        assert_eq!(done.trip.end_mileage, Some(d("1050")));

        let stored = engine.trips_for("u1").await.unwrap();
        assert_eq!(stored, vec![done.trip]);
    }

    #[tokio::test]
    async fn second_start_is_refused() {
        let (engine, _) = engine();
        engine
            .start_trip("u1", d("10"), TripPurpose::Business)
            .await
            .unwrap();
        let err = engine
            .start_trip("u1", d("10"), TripPurpose::Personal)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TripAlreadyInProgress));
        assert_eq!(engine.trips_for("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ending_without_active_trip_fails() {
        let (engine, _) = engine();
        let err = engine.end_trip("u1", d("10")).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveTrip));
    }

    #[tokio::test]
    async fn bad_end_mileage_leaves_trip_in_progress() {
        let (engine, _) = engine();
        engine
            .start_trip("u1", d("1000"), TripPurpose::Business)
            .await
            .unwrap();
        for end in ["1000", "999.9"] {
            let err = engine.end_trip("u1", d(end)).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidMileage { .. }), "{end}");
        }
        let current = engine.current_trip("u1").await.unwrap().unwrap();
        assert_eq!(current.status, TripStatus::InProgress);
        assert_eq!(current.end_mileage, None);
    }

    #[tokio::test]
    async fn readings_above_the_ceiling_are_refused() {
        let (engine, _) = engine();
        let too_far = MAX_MILEAGE + Decimal::ONE;
        let err = engine
            .start_trip("u1", too_far, TripPurpose::Business)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "startMileage", .. }));

        let err = engine
            .record_completed_trip("u1", Decimal::ZERO, too_far, TripPurpose::Business, noon())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "endMileage", .. }));

        engine
            .start_trip("u1", d("10"), TripPurpose::Business)
            .await
            .unwrap();
        let err = engine.end_trip("u1", too_far).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "endMileage", .. }));
        assert!(engine.current_trip("u1").await.unwrap().is_some());
        assert_eq!(engine.trips_for("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_in_progress_trips_are_not_guessed() {
        let (engine, repo) = engine();
        for id in ["a", "b"] {
            repo.insert_raw(
                NewTrip::in_progress("u1", d("1"), TripPurpose::Business, noon())
                    .into_trip(id.into(), noon()),
            )
            .await;
        }
        let err = engine.end_trip("u1", d("20")).await.unwrap_err();
        assert!(matches!(err, AppError::InconsistentState(_)));
        let trips = engine.trips_for("u1").await.unwrap();
        assert!(trips.iter().all(Trip::is_in_progress));
    }

    #[tokio::test]
    async fn backfill_requires_increasing_mileage() {
        let (engine, _) = engine();
        let err = engine
            .record_completed_trip("u1", d("500"), d("480"), TripPurpose::Business, noon())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidMileage { .. }));
        assert!(engine.trips_for("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn backfill_does_not_touch_active_trip() {
        let (engine, _) = engine();
        let open = engine
            .start_trip("u1", d("2000"), TripPurpose::Personal)
            .await
            .unwrap();
        let backfilled = engine
            .record_completed_trip("u1", d("100"), d("130"), TripPurpose::Business, noon())
            .await
            .unwrap();
        assert_eq!(backfilled.status, TripStatus::Completed);
        assert_eq!(
            engine.current_trip("u1").await.unwrap().map(|t| t.id),
            Some(open.id)
        );
    }

    #[tokio::test]
    async fn generic_create_follows_lifecycle_rules() {
        let (engine, _) = engine();
        engine
            .create_trip(NewTrip::in_progress("u1", d("5"), TripPurpose::Business, noon()))
            .await
            .unwrap();
        let err = engine
            .create_trip(NewTrip::in_progress("u1", d("6"), TripPurpose::Business, noon()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TripAlreadyInProgress));

        let err = engine
            .create_trip(NewTrip::completed("u1", d("9"), d("9"), TripPurpose::Business, noon()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidMileage { .. }));
    }

    #[tokio::test]
    async fn suggests_last_end_mileage() {
        let (engine, _) = engine();
        assert_eq!(engine.suggested_start_mileage("u1").await.unwrap(), Decimal::ZERO);
        engine
            .record_completed_trip("u1", d("100"), d("150"), TripPurpose::Business, noon())
            .await
            .unwrap();
        engine
            .record_completed_trip(
                "u1",
                d("10"),
                d("20"),
                TripPurpose::Business,
                noon() - chrono::Duration::days(30),
            )
            .await
            .unwrap();
        assert_eq!(engine.suggested_start_mileage("u1").await.unwrap(), d("150"));
    }

    #[tokio::test]
    async fn missing_identity_is_not_authenticated() {
        let (engine, _) = engine();
        let err = engine
            .start_trip("", d("1"), TripPurpose::Business)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));
    }
}
