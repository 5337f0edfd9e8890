//! Next delivery date from a subscription's frequency.

use chrono::{Days, Months, NaiveDate};
use storefront_core::subscription::DeliveryFrequency;
use tracing::warn;

/// Weekly +7 days, biweekly +14 days, monthly +1 calendar month clamped to
/// the last valid day (Jan 31 -> Feb 29 in a leap year). An unrecognized
/// frequency advances one week.
pub fn next_delivery_date(current: NaiveDate, frequency: DeliveryFrequency) -> NaiveDate {
    let next = match frequency {
        DeliveryFrequency::Weekly => current.checked_add_days(Days::new(7)),
        DeliveryFrequency::Biweekly => current.checked_add_days(Days::new(14)),
        DeliveryFrequency::Monthly => current.checked_add_months(Months::new(1)),
        DeliveryFrequency::Unrecognized => {
            warn!(current = %current, "Unrecognized delivery frequency, advancing one week");
            current.checked_add_days(Days::new(7))
        }
    };
    // Only overflows at NaiveDate::MAX.
    next.unwrap_or(current)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekly_and_biweekly() {
        assert_eq!(next_delivery_date(d(2024, 3, 1), DeliveryFrequency::Weekly), d(2024, 3, 8));
        assert_eq!(next_delivery_date(d(2024, 12, 25), DeliveryFrequency::Biweekly), d(2025, 1, 8));
    }

    #[test]
    fn test_weekly_applied_twice_is_fourteen_days() {
        let start = d(2024, 2, 20);
        let twice = next_delivery_date(
            next_delivery_date(start, DeliveryFrequency::Weekly),
            DeliveryFrequency::Weekly,
        );
        assert_eq!((twice - start).num_days(), 14);
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        assert_eq!(next_delivery_date(d(2024, 1, 31), DeliveryFrequency::Monthly), d(2024, 2, 29));
        assert_eq!(next_delivery_date(d(2023, 1, 31), DeliveryFrequency::Monthly), d(2023, 2, 28));
        assert_eq!(next_delivery_date(d(2024, 3, 31), DeliveryFrequency::Monthly), d(2024, 4, 30));
        assert_eq!(next_delivery_date(d(2024, 5, 15), DeliveryFrequency::Monthly), d(2024, 6, 15));
    }

    #[test]
    fn test_unrecognized_defaults_to_weekly() {
        assert_eq!(
            next_delivery_date(d(2024, 3, 1), DeliveryFrequency::Unrecognized),
            d(2024, 3, 8)
        );
    }
}
