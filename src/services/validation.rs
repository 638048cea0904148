//! Turns untrusted trip payloads into [`NewTrip`] values.
//!
//! Mileage may arrive as a JSON number or as decimal text; dates as RFC 3339,
//! a naive ISO timestamp, a plain `YYYY-MM-DD` date or epoch milliseconds.
//! Everything past this module works on `Decimal` and `DateTime<Utc>` only.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::AppError,
    models::trip::{NewTrip, TripPurpose, TripStatus},
    services::deduction::MAX_MILEAGE,
};

/// Request body for trip creation. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPayload {
    pub user_id: Option<String>,
    pub start_mileage: Option<Value>,
    pub end_mileage: Option<Value>,
    pub trip_date: Option<Value>,
    pub purpose: Option<String>,
    pub status: Option<String>,
}

impl TripPayload {
    pub fn validate(&self) -> Result<NewTrip, AppError> {
        let user_id = self
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::validation("userId", "is required"))?;

        let start_mileage = match &self.start_mileage {
            Some(value) => parse_mileage("startMileage", value)?,
            None => None,
        }
        .ok_or_else(|| AppError::validation("startMileage", "is required"))?;
        if start_mileage < Decimal::ZERO {
            return Err(AppError::validation("startMileage", "must not be negative"));
        }

        let end_mileage = match &self.end_mileage {
            Some(value) => parse_mileage("endMileage", value)?,
            None => None,
        };

        let trip_date = self
            .trip_date
            .as_ref()
            .ok_or_else(|| AppError::validation("tripDate", "is required"))
            .and_then(parse_trip_date)?;

        let purpose: TripPurpose = self
            .purpose
            .as_deref()
            .ok_or_else(|| AppError::validation("purpose", "is required"))?
            .parse()?;

        let status: TripStatus = self
            .status
            .as_deref()
            .ok_or_else(|| AppError::validation("status", "is required"))?
            .parse()?;

        match (status, end_mileage) {
            (TripStatus::InProgress, Some(_)) => Err(AppError::validation(
                "endMileage",
                "must be empty while the trip is in progress",
            )),
            (TripStatus::InProgress, None) => Ok(NewTrip::in_progress(
                user_id,
                start_mileage,
                purpose,
                trip_date,
            )),
            (TripStatus::Completed, None) => Err(AppError::validation(
                "endMileage",
                "is required for a completed trip",
            )),
            (TripStatus::Completed, Some(end)) if end <= start_mileage => Err(
                AppError::validation("endMileage", "must be greater than start mileage"),
            ),
            (TripStatus::Completed, Some(end)) => Ok(NewTrip::completed(
                user_id,
                start_mileage,
                end,
                purpose,
                trip_date,
            )),
        }
    }
}

/// `Ok(None)` means the field was explicitly left empty.
pub fn parse_mileage(field: &'static str, value: &Value) -> Result<Option<Decimal>, AppError> {
    let parsed = parse_mileage_value(field, value)?;
    if parsed.is_some_and(|mileage| mileage > MAX_MILEAGE) {
        return Err(AppError::validation(
            field,
            format!("must not exceed {MAX_MILEAGE}"),
        ));
    }
    Ok(parsed)
}

fn parse_mileage_value(field: &'static str, value: &Value) -> Result<Option<Decimal>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .or_else(|_| Decimal::from_scientific(&number.to_string()))
            .map(Some)
            .map_err(|_| AppError::validation(field, format!("{number} is not a usable number"))),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            Decimal::from_str(text)
                .map(Some)
                .map_err(|_| AppError::validation(field, format!("{text:?} is not a number")))
        }
        _ => Err(AppError::validation(field, "must be a number")),
    }
}

pub fn parse_trip_date(value: &Value) -> Result<DateTime<Utc>, AppError> {
    match value {
        Value::String(text) => parse_date_text(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| AppError::validation("tripDate", "timestamp is out of range")),
        _ => Err(AppError::validation("tripDate", "must be a date")),
    }
}

fn parse_date_text(text: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(AppError::validation(
        "tripDate",
        format!("{text:?} is not an ISO date"),
    ))
}
