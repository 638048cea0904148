use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    auth::{AuthenticatedUser, CurrentUser},
    error::AppError,
    models::trip::{Trip, TripPurpose},
    services::{
        lifecycle::CompletedTrip,
        report::{self, TripSummary},
        validation::{parse_mileage, parse_trip_date, TripPayload},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/trips", get(trips_list).post(trip_create))
        .route("/trips/start", post(trip_start))
        .route("/trips/end", post(trip_end))
        .route("/trips/manual", post(trip_manual))
        .route("/trips/current", get(trip_current))
        .route("/trips/summary", get(trips_summary))
        .route("/trips/export", get(trips_export))
}

async fn me(current: CurrentUser) -> Result<Json<AuthenticatedUser>, AppError> {
    Ok(Json(current.require_user()?.clone()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TripsQuery {
    user_id: Option<String>,
}

async fn trips_list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<TripsQuery>,
) -> Result<Json<Vec<Trip>>, AppError> {
    let user = current.require_user()?;
    if let Some(requested) = query.user_id.as_deref() {
        ensure_own(user, requested)?;
    }
    Ok(Json(state.trips.trips_for(&user.uuid).await?))
}

async fn trip_create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<TripPayload>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let user = current.require_user()?;
    let new_trip = payload.validate()?;
    ensure_own(user, &new_trip.user_id)?;
    let trip = state.trips.create_trip(new_trip).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTripForm {
    start_mileage: Option<Value>,
    purpose: Option<String>,
}

/// Without a start mileage the last known odometer reading is used.
async fn trip_start(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<StartTripForm>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let user = current.require_user()?;
    let start_mileage = match form.start_mileage.as_ref() {
        Some(value) => parse_mileage("startMileage", value)?,
        None => None,
    };
    let start_mileage = match start_mileage {
        Some(mileage) => mileage,
        None => state.trips.suggested_start_mileage(&user.uuid).await?,
    };
    let purpose = match form.purpose.as_deref() {
        Some(raw) => raw.parse()?,
        None => TripPurpose::Business,
    };
    let trip = state
        .trips
        .start_trip(&user.uuid, start_mileage, purpose)
        .await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndTripForm {
    end_mileage: Option<Value>,
}

async fn trip_end(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<EndTripForm>,
) -> Result<Json<CompletedTrip>, AppError> {
    let user = current.require_user()?;
    let end_mileage = required_mileage("endMileage", form.end_mileage.as_ref())?;
    Ok(Json(state.trips.end_trip(&user.uuid, end_mileage).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManualTripForm {
    start_mileage: Option<Value>,
    end_mileage: Option<Value>,
    purpose: Option<String>,
    trip_date: Option<Value>,
}

async fn trip_manual(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<ManualTripForm>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let user = current.require_user()?;
    let start_mileage = required_mileage("startMileage", form.start_mileage.as_ref())?;
    let end_mileage = required_mileage("endMileage", form.end_mileage.as_ref())?;
    let purpose: TripPurpose = form
        .purpose
        .as_deref()
        .ok_or_else(|| AppError::validation("purpose", "is required"))?
        .parse()?;
    let trip_date = form
        .trip_date
        .as_ref()
        .ok_or_else(|| AppError::validation("tripDate", "is required"))
        .and_then(parse_trip_date)?;
    let trip = state
        .trips
        .record_completed_trip(&user.uuid, start_mileage, end_mileage, purpose, trip_date)
        .await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentTripView {
    trip: Option<Trip>,
    #[serde(with = "rust_decimal::serde::float")]
    suggested_start_mileage: Decimal,
}

async fn trip_current(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<CurrentTripView>, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.current_trip(&user.uuid).await?;
    let suggested_start_mileage = state.trips.suggested_start_mileage(&user.uuid).await?;
    Ok(Json(CurrentTripView {
        trip,
        suggested_start_mileage,
    }))
}

async fn trips_summary(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<TripSummary>, AppError> {
    let user = current.require_user()?;
    let trips = state.trips.trips_for(&user.uuid).await?;
    Ok(Json(report::summarize(&trips)))
}

async fn trips_export(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trips = state.trips.trips_for(&user.uuid).await?;
    let body = report::to_csv(&trips)?;
    let filename = report::export_filename(Local::now().date_naive());
    info!(user_id = %user.uuid, rows = trips.len(), "trips exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}

fn required_mileage(field: &'static str, value: Option<&Value>) -> Result<Decimal, AppError> {
    value
        .map(|value| parse_mileage(field, value))
        .transpose()?
        .flatten()
        .ok_or_else(|| AppError::validation(field, "is required"))
}

/// Trips are partitioned by owner; nobody reads or writes another user's.
fn ensure_own(user: &AuthenticatedUser, requested: &str) -> Result<(), AppError> {
    if requested.trim() == user.uuid {
        Ok(())
    } else {
        warn!(user_id = %user.uuid, requested, "cross-user trip access refused");
        Err(AppError::Forbidden)
    }
}
