use std::fmt::Display;

use chrono::{Local, NaiveDate, TimeZone};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::{
    error::AppError,
    models::trip::{Trip, TripPurpose},
    services::deduction::{compute_trip_details, MILEAGE_RATE},
};

pub const CSV_HEADER: [&str; 6] = [
    "Date",
    "Start Mileage",
    "End Mileage",
    "Total Miles",
    "Purpose",
    "Tax Deduction",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_deduction: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_business_miles: Decimal,
}

/// Totals over completed business trips. Everything else is skipped.
pub fn summarize(trips: &[Trip]) -> TripSummary {
    let total_business_miles = trips
        .iter()
        .filter(|trip| trip.purpose == TripPurpose::Business)
        .filter_map(Trip::miles)
        .fold(Decimal::ZERO, Decimal::saturating_add);
    TripSummary {
        total_deduction: total_business_miles.saturating_mul(MILEAGE_RATE),
        total_business_miles,
    }
}

/// CSV export with dates in the server's local calendar.
pub fn to_csv(trips: &[Trip]) -> Result<String, AppError> {
    to_csv_in(trips, &Local)
}

/// One row per trip, in input order. Miles and deduction stay blank for
/// trips still in progress.
pub fn to_csv_in<Tz>(trips: &[Trip], tz: &Tz) -> Result<String, AppError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER)
        .map_err(|err| AppError::Other(err.into()))?;

    for trip in trips {
        let details = match (trip.miles(), trip.end_mileage) {
            (Some(_), Some(end)) => compute_trip_details(trip.start_mileage, end),
            _ => None,
        };
        let record = [
            trip.trip_date
                .with_timezone(tz)
                .format("%-m/%-d/%Y")
                .to_string(),
            trip.start_mileage.normalize().to_string(),
            trip.end_mileage
                .map(|end| end.normalize().to_string())
                .unwrap_or_default(),
            details
                .map(|d| d.miles.normalize().to_string())
                .unwrap_or_default(),
            trip.purpose.to_string(),
            details
                .map(|d| format_money(d.deduction))
                .unwrap_or_default(),
        ];
        writer
            .write_record(&record)
            .map_err(|err| AppError::Other(err.into()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| AppError::Other(anyhow::anyhow!("flushing csv export failed: {err}")))?;
    String::from_utf8(bytes).map_err(|err| AppError::Other(err.into()))
}

/// Cents, half away from zero. `{:.2}` alone truncates.
fn format_money(amount: Decimal) -> String {
    let cents = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{cents:.2}")
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("mileage_{}.csv", date.format("%Y-%m-%d"))
}

/// End mileage of the most recent completed trip by trip date.
pub fn latest_end_mileage(trips: &[Trip]) -> Option<Decimal> {
    trips
        .iter()
        .filter(|trip| trip.is_completed())
        .filter_map(|trip| trip.end_mileage.map(|end| (trip.trip_date, end)))
        .max_by_key(|(date, _)| *date)
        .map(|(_, end)| end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::NewTrip;
    use chrono::{DateTime, Utc};

    fn d(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn done(start: &str, end: &str, purpose: TripPurpose, date: &str) -> Trip {
        NewTrip::completed("u1", d(start), d(end), purpose, at(date))
            .into_trip(format!("{start}-{end}"), at(date))
    }

    fn open(start: &str, purpose: TripPurpose, date: &str) -> Trip {
        NewTrip::in_progress("u1", d(start), purpose, at(date)).into_trip(start.into(), at(date))
    }

    #[test]
    fn empty_summary_is_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_deduction, Decimal::ZERO);
        assert_eq!(summary.total_business_miles, Decimal::ZERO);
    }

    #[test]
    fn only_completed_business_trips_count() {
        let trips = vec![
            done("100", "150", TripPurpose::Business, "2024-01-02T09:00:00Z"),
            done("150", "180", TripPurpose::Personal, "2024-01-03T09:00:00Z"),
            open("180", TripPurpose::Business, "2024-01-04T09:00:00Z"),
        ];
        let summary = summarize(&trips);
        assert_eq!(summary.total_business_miles, d("50"));
        assert_eq!(summary.total_deduction, d("35.00"));
    }

    #[test]
    fn all_filtered_out_is_zero() {
        let trips = vec![
            done("1", "2", TripPurpose::Personal, "2024-01-02T09:00:00Z"),
            open("3", TripPurpose::Business, "2024-01-02T09:00:00Z"),
        ];
        assert_eq!(summarize(&trips), TripSummary::default());
    }

    #[test]
    fn csv_layout() {
        let trips = vec![
            done("1000", "1050", TripPurpose::Business, "2024-03-05T15:00:00Z"),
            open("1050.5", TripPurpose::Personal, "2024-03-06T08:00:00Z"),
        ];
        let csv = to_csv_in(&trips, &Utc).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), trips.len() + 1);
        assert_eq!(lines[0].split(',').count(), 6);
        assert_eq!(
            lines[0],
            "Date,Start Mileage,End Mileage,Total Miles,Purpose,Tax Deduction"
        );
        assert_eq!(lines[1], "3/5/2024,1000,1050,50,Business,35.00");
        assert_eq!(lines[2], "3/6/2024,1050.5,,,Personal,");
    }

    #[test]
    fn personal_completed_rows_still_show_deduction() {
        let trips = vec![done("10", "20.5", TripPurpose::Personal, "2024-12-31T23:00:00Z")];
        let csv = to_csv_in(&trips, &Utc).unwrap();
        assert_eq!(csv.lines().nth(1), Some("12/31/2024,10,20.5,10.5,Personal,7.35"));
    }

    #[test]
    fn half_cent_deductions_round_up() {
        let trips = vec![
            done("10", "10.05", TripPurpose::Business, "2024-04-01T09:00:00Z"),
            done("0", "10.25", TripPurpose::Business, "2024-04-02T09:00:00Z"),
        ];
        let csv = to_csv_in(&trips, &Utc).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[1], "4/1/2024,10,10.05,0.05,Business,0.04");
        assert_eq!(lines[2], "4/2/2024,0,10.25,10.25,Business,7.18");
    }

    #[test]
    fn summary_of_huge_trips_does_not_panic() {
        let huge = Decimal::MAX / Decimal::TWO + Decimal::ONE;
        let when = at("2024-01-01T00:00:00Z");
        let trip = NewTrip::completed("u1", Decimal::ZERO, huge, TripPurpose::Business, when)
            .into_trip("huge".into(), when);
        let summary = summarize(&[trip.clone(), trip]);
        assert_eq!(summary.total_business_miles, Decimal::MAX);
    }

    #[test]
    fn empty_export_is_just_the_header() {
        let csv = to_csv_in(&[], &Utc).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn csv_is_repeatable() {
        let trips = vec![
            done("5", "9", TripPurpose::Business, "2024-02-01T10:00:00Z"),
            done("1", "2", TripPurpose::Personal, "2024-01-01T10:00:00Z"),
        ];
        assert_eq!(to_csv(&trips).unwrap(), to_csv(&trips).unwrap());
    }

    #[test]
    fn filename_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_filename(date), "mileage_2024-03-09.csv");
    }

    #[test]
    fn latest_end_mileage_prefers_most_recent_trip() {
        let trips = vec![
            done("10", "20", TripPurpose::Business, "2024-01-01T10:00:00Z"),
            done("300", "400", TripPurpose::Personal, "2024-02-01T10:00:00Z"),
            open("400", TripPurpose::Business, "2024-03-01T10:00:00Z"),
        ];
        assert_eq!(latest_end_mileage(&trips), Some(d("400")));
        assert_eq!(latest_end_mileage(&trips[2..]), None);
    }
}
