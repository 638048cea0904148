use rust_decimal::Decimal;
use serde::Serialize;

/// Deduction per business mile, in currency units. Revised yearly.
pub const MILEAGE_RATE: Decimal = Decimal::from_parts(70, 0, 0, false, 2);

/// Largest odometer reading accepted anywhere (10^15). Keeps every sum over a
/// user's trips far below `Decimal::MAX`.
pub const MAX_MILEAGE: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TripDetails {
    #[serde(with = "rust_decimal::serde::float")]
    pub miles: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub deduction: Decimal,
}

/// Distance and deduction between two odometer readings at [`MILEAGE_RATE`].
///
/// Returns `None` when `end_mileage` is below `start_mileage`. Nothing is
/// rounded; formatting is left to the presentation layer.
pub fn compute_trip_details(start_mileage: Decimal, end_mileage: Decimal) -> Option<TripDetails> {
    compute_trip_details_at(start_mileage, end_mileage, MILEAGE_RATE)
}

pub fn compute_trip_details_at(
    start_mileage: Decimal,
    end_mileage: Decimal,
    rate: Decimal,
) -> Option<TripDetails> {
    if end_mileage < start_mileage {
        return None;
    }
    let miles = end_mileage - start_mileage;
    Some(TripDetails {
        miles,
        deduction: miles * rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn max_mileage_is_one_quadrillion() {
        assert_eq!(MAX_MILEAGE, d("1000000000000000"));
    }

    #[test]
    fn rate_is_seventy_cents() {
        assert_eq!(MILEAGE_RATE, d("0.70"));
    }

    #[test]
    fn fifty_miles_deduct_thirty_five() {
        let details = compute_trip_details(d("1000"), d("1050")).unwrap();
        assert_eq!(details.miles, d("50"));
        assert_eq!(details.deduction, d("35.00"));
    }

    #[test]
    fn fractional_readings_stay_exact() {
        let details = compute_trip_details(d("12.3"), d("45.6")).unwrap();
        assert_eq!(details.miles, d("33.3"));
        assert_eq!(details.deduction, d("23.31"));
    }

    #[test]
    fn equal_readings_are_zero() {
        let details = compute_trip_details(d("80"), d("80")).unwrap();
        assert_eq!(details.miles, Decimal::ZERO);
        assert_eq!(details.deduction, Decimal::ZERO);
    }

    #[test]
    fn reversed_readings_are_rejected() {
        assert_eq!(compute_trip_details(d("500"), d("480")), None);
    }

    #[test]
    fn custom_rate() {
        let details = compute_trip_details_at(d("0"), d("10"), d("0.655")).unwrap();
        assert_eq!(details.deduction, d("6.55"));
    }

    proptest! {
        #[test]
        fn miles_and_deduction_are_exact(
            start_tenths in 0i64..10_000_000,
            delta_tenths in 1i64..1_000_000,
        ) {
            let start = Decimal::new(start_tenths, 1);
            let end = Decimal::new(start_tenths + delta_tenths, 1);
            let details = compute_trip_details(start, end).unwrap();
            prop_assert_eq!(details.miles, end - start);
            prop_assert_eq!(details.miles, Decimal::new(delta_tenths, 1));
            prop_assert_eq!(details.deduction, details.miles * MILEAGE_RATE);
        }

        #[test]
        fn deterministic(start in 0i64..1_000_000, delta in 0i64..1_000_000) {
            let a = compute_trip_details(Decimal::from(start), Decimal::from(start + delta));
            let b = compute_trip_details(Decimal::from(start), Decimal::from(start + delta));
            prop_assert_eq!(a, b);
        }
    }
}
