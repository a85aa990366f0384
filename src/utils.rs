use crate::error::{InvoiceIntelError, Result};
use chrono::{Datelike, Days, NaiveDate};

pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

pub fn next_month_start(date: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        InvoiceIntelError::DateError(format!("No month follows {}", date.format("%Y-%m")))
    })
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        InvoiceIntelError::DateError(format!("Invalid month {:04}-{:02}", year, month))
    })?;

    next_month_start(first)?
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| InvoiceIntelError::DateError(format!("Invalid month {:04}-{:02}", year, month)))
}

/// The date a periodic return for the month containing `period` falls due:
/// `due_day` of the following month, pulled back to that month's last day
/// when the month is shorter.
pub fn return_due_date(period: NaiveDate, due_day: u32) -> Result<NaiveDate> {
    let next = next_month_start(period)?;
    let last = last_day_of_month(next.year(), next.month())?;
    let day = due_day.clamp(1, last.day());

    NaiveDate::from_ymd_opt(next.year(), next.month(), day).ok_or_else(|| {
        InvoiceIntelError::DateError(format!(
            "Invalid due day {} for {}",
            due_day,
            next.format("%Y-%m")
        ))
    })
}

pub fn period_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`, not `n - 1`).
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Clamps into `[0, 1]`; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 12).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
        assert!(last_day_of_month(2023, 13).is_err());
    }

    #[test]
    fn test_return_due_date() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            return_due_date(jan, 20).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 20).unwrap()
        );

        let dec = NaiveDate::from_ymd_opt(2023, 12, 3).unwrap();
        assert_eq!(
            return_due_date(dec, 20).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()
        );

        // Short month pulls the due day back
        assert_eq!(
            return_due_date(jan, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn test_statistics() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));

        let std = population_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - 2.0).abs() < 1e-12);

        assert_eq!(population_std_dev(&[5.0, 5.0]), Some(0.0));
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.4), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(0.35), 0.35);
    }
}
