use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TripPurpose {
    Business,
    Personal,
}

impl TripPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripPurpose::Business => "Business",
            TripPurpose::Personal => "Personal",
        }
    }
}

impl fmt::Display for TripPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripPurpose {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "Business" => Ok(TripPurpose::Business),
            "Personal" => Ok(TripPurpose::Personal),
            other => Err(AppError::validation(
                "purpose",
                format!("must be Business or Personal, got {other:?}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TripStatus {
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::InProgress => "in_progress",
            TripStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "in_progress" => Ok(TripStatus::InProgress),
            "completed" => Ok(TripStatus::Completed),
            other => Err(AppError::validation(
                "status",
                format!("must be in_progress or completed, got {other:?}"),
            )),
        }
    }
}

/// A stored trip, as materialized by a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub start_mileage: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub end_mileage: Option<Decimal>,
    pub trip_date: DateTime<Utc>,
    pub purpose: TripPurpose,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn is_in_progress(&self) -> bool {
        self.status == TripStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == TripStatus::Completed
    }

    /// Miles driven, for completed trips only.
    pub fn miles(&self) -> Option<Decimal> {
        match (self.status, self.end_mileage) {
            (TripStatus::Completed, Some(end)) => Some(end - self.start_mileage),
            _ => None,
        }
    }
}

/// A trip that passed validation but has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrip {
    pub user_id: String,
    pub start_mileage: Decimal,
    pub end_mileage: Option<Decimal>,
    pub trip_date: DateTime<Utc>,
    pub purpose: TripPurpose,
    pub status: TripStatus,
}

impl NewTrip {
    pub fn in_progress(
        user_id: impl Into<String>,
        start_mileage: Decimal,
        purpose: TripPurpose,
        trip_date: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            start_mileage,
            end_mileage: None,
            trip_date,
            purpose,
            status: TripStatus::InProgress,
        }
    }

    pub fn completed(
        user_id: impl Into<String>,
        start_mileage: Decimal,
        end_mileage: Decimal,
        purpose: TripPurpose,
        trip_date: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            start_mileage,
            end_mileage: Some(end_mileage),
            trip_date,
            purpose,
            status: TripStatus::Completed,
        }
    }

    /// Stamps repository-assigned fields onto the request.
    pub fn into_trip(self, id: String, created_at: DateTime<Utc>) -> Trip {
        Trip {
            id,
            user_id: self.user_id,
            start_mileage: self.start_mileage,
            end_mileage: self.end_mileage,
            trip_date: self.trip_date,
            purpose: self.purpose,
            status: self.status,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn serializes_with_wire_names() {
        let trip = NewTrip::completed(
            "u1",
            d("1000"),
            d("1050.5"),
            TripPurpose::Business,
            DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
        .into_trip("t1".into(), Utc::now());

        let value = serde_json::to_value(&trip).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["startMileage"], 1000.0);
        assert_eq!(value["endMileage"], 1050.5);
        assert_eq!(value["purpose"], "Business");
        assert_eq!(value["status"], "completed");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn miles_only_for_completed_trips() {
        let now = Utc::now();
        let open = NewTrip::in_progress("u1", d("10"), TripPurpose::Personal, now)
            .into_trip("a".into(), now);
        assert_eq!(open.miles(), None);

        let done = NewTrip::completed("u1", d("10"), d("42.5"), TripPurpose::Personal, now)
            .into_trip("b".into(), now);
        assert_eq!(done.miles(), Some(d("32.5")));
    }

    #[test]
    fn parses_exact_enum_spellings_only() {
        assert_eq!("Business".parse::<TripPurpose>().unwrap(), TripPurpose::Business);
        assert!("business".parse::<TripPurpose>().is_err());
        assert_eq!("in_progress".parse::<TripStatus>().unwrap(), TripStatus::InProgress);
        assert!("done".parse::<TripStatus>().is_err());
    }
}
