use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::trip::{NewTrip, Trip, TripStatus},
    services::repository::{require_user_id, single_in_progress, TripRepository},
};

const TRIP_COLUMNS: &str =
    "id, user_id, start_mileage, end_mileage, trip_date, purpose, status, created_at";

#[derive(Clone)]
pub struct SqliteTripRepository {
    db: DbPool,
}

impl SqliteTripRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn fetch_trip(&self, id: &str) -> Result<Option<Trip>, AppError> {
        let row = sqlx::query(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(trip_from_row).transpose()
    }
}

#[async_trait]
impl TripRepository for SqliteTripRepository {
    async fn create_trip(&self, mut trip: NewTrip) -> Result<Trip, AppError> {
        trip.user_id = require_user_id(&trip.user_id)?.to_owned();
        let mut stored = trip.into_trip(Uuid::new_v4().to_string(), Utc::now());
        // Match the column precision so the returned copy equals later reads.
        stored.trip_date = stored.trip_date.trunc_subsecs(6);
        stored.created_at = stored.created_at.trunc_subsecs(6);
        let result = sqlx::query(
            r#"INSERT INTO trips (id, user_id, start_mileage, end_mileage, trip_date, purpose, status, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(&stored.id)
        .bind(&stored.user_id)
        .bind(stored.start_mileage.to_string())
        .bind(stored.end_mileage.map(|end| end.to_string()))
        .bind(encode_timestamp(stored.trip_date))
        .bind(stored.purpose.as_str())
        .bind(stored.status.as_str())
        .bind(encode_timestamp(stored.created_at))
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {
                debug!(trip_id = %stored.id, user_id = %stored.user_id, "trip stored");
                Ok(stored)
            }
            // The partial unique index only covers in-progress rows.
            Err(sqlx::Error::Database(err))
                if err.is_unique_violation() && stored.status == TripStatus::InProgress =>
            {
                Err(AppError::TripAlreadyInProgress)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_trips_by_user(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        let user_id = require_user_id(user_id)?;
        let rows = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = ?1 ORDER BY trip_date DESC, created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(trip_from_row).collect()
    }

    async fn find_in_progress_trip(&self, user_id: &str) -> Result<Option<Trip>, AppError> {
        let user_id = require_user_id(user_id)?;
        let rows = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = ?1 AND status = 'in_progress'"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        let found = rows.iter().map(trip_from_row).collect::<Result<Vec<_>, _>>()?;
        single_in_progress(user_id, found)
    }

    async fn update_trip_to_completed(
        &self,
        id: &str,
        end_mileage: Decimal,
    ) -> Result<Trip, AppError> {
        let updated = sqlx::query(
            "UPDATE trips SET end_mileage = ?1, status = 'completed' WHERE id = ?2 AND status = 'in_progress'",
        )
        .bind(end_mileage.to_string())
        .bind(id)
        .execute(&self.db)
        .await?
        .rows_affected();

        let trip = self.fetch_trip(id).await?.ok_or(AppError::NotFound)?;
        if updated == 0 {
            return Err(AppError::InvalidTransition(format!(
                "trip {id} is already {}",
                trip.status
            )));
        }
        Ok(trip)
    }
}

/// Fixed-width UTC text, so `ORDER BY` on the column sorts chronologically.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("stored timestamp {raw:?} is not RFC 3339"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn decode_decimal(raw: &str) -> Result<Decimal, AppError> {
    let value = Decimal::from_str(raw)
        .with_context(|| format!("stored mileage {raw:?} is not a decimal"))?;
    Ok(value)
}

fn trip_from_row(row: &SqliteRow) -> Result<Trip, AppError> {
    let end_mileage = row
        .try_get::<Option<String>, _>("end_mileage")?
        .as_deref()
        .map(decode_decimal)
        .transpose()?;
    Ok(Trip {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        start_mileage: decode_decimal(&row.try_get::<String, _>("start_mileage")?)?,
        end_mileage,
        trip_date: decode_timestamp(&row.try_get::<String, _>("trip_date")?)?,
        purpose: row.try_get::<String, _>("purpose")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: decode_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}
