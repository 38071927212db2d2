use crate::error::{Result, SalesDashboardError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Days between the spreadsheet serial-date epoch (1899-12-30) and 1970-01-01.
pub const SERIAL_DATE_UNIX_OFFSET: f64 = 25_569.0;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%Y年%m月%d日"];

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Epoch milliseconds of the civil date at midnight UTC.
pub fn epoch_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

pub fn date_from_epoch_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Decodes a legacy spreadsheet serial day number. Any fractional part is a
/// time of day and is discarded.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let millis = ((serial - SERIAL_DATE_UNIX_OFFSET) * MILLIS_PER_DAY as f64).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    date_from_epoch_millis(millis as i64)
}

/// Parses the date formats found in spreadsheet exports and form input.
/// Slash dates with the year last are read month-first.
pub fn parse_date_str(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|dt| dt.date())
}

pub fn parse_required_date(input: &str, field: &str) -> Result<NaiveDate> {
    parse_date_str(input).ok_or_else(|| {
        SalesDashboardError::validation(field, format!("'{}' is not a calendar date", input))
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn day_key(date: NaiveDate) -> String {
    format_date(date)
}

/// ISO-8601 week identifier, e.g. `2024-W01`. The year is the ISO week-year,
/// which differs from the calendar year around New Year.
pub fn iso_week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}

pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_epoch_millis() {
        assert_eq!(epoch_millis(ymd(1970, 1, 1)), 0);
        assert_eq!(epoch_millis(ymd(1970, 1, 2)), MILLIS_PER_DAY);
        assert_eq!(epoch_millis(ymd(2024, 1, 15)), 1_705_276_800_000);
        assert_eq!(
            date_from_epoch_millis(1_705_276_800_000),
            Some(ymd(2024, 1, 15))
        );
    }

    #[test]
    fn test_serial_to_date() {
        assert_eq!(serial_to_date(25_569.0), Some(ymd(1970, 1, 1)));
        assert_eq!(serial_to_date(45_306.0), Some(ymd(2024, 1, 15)));
        // Afternoon on the same day
        assert_eq!(serial_to_date(45_306.75), Some(ymd(2024, 1, 15)));
        assert_eq!(serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_parse_date_str_formats() {
        let expected = Some(ymd(2024, 1, 15));
        assert_eq!(parse_date_str("2024-01-15"), expected);
        assert_eq!(parse_date_str(" 2024/01/15 "), expected);
        assert_eq!(parse_date_str("2024.01.15"), expected);
        assert_eq!(parse_date_str("01/15/2024"), expected);
        assert_eq!(parse_date_str("2024年1月15日"), expected);
        assert_eq!(parse_date_str("2024-01-15T00:00:00.000Z"), expected);
        assert_eq!(parse_date_str("2024-01-15 13:45:00"), expected);

        assert_eq!(parse_date_str("not-a-date"), None);
        assert_eq!(parse_date_str(""), None);
        assert_eq!(parse_date_str("2023-02-30"), None);
    }

    #[test]
    fn test_iso_week_key() {
        // 2024-01-01 is a Monday
        assert_eq!(iso_week_key(ymd(2024, 1, 1)), "2024-W01");
        // Friday 2021-01-01 still belongs to the last ISO week of 2020
        assert_eq!(iso_week_key(ymd(2021, 1, 1)), "2020-W53");
        // Monday 2024-12-30 opens ISO week 1 of 2025
        assert_eq!(iso_week_key(ymd(2024, 12, 30)), "2025-W01");
    }

    #[test]
    fn test_bucket_keys() {
        assert_eq!(day_key(ymd(2024, 3, 9)), "2024-03-09");
        assert_eq!(month_key(ymd(2024, 3, 9)), "2024-03");
    }

    #[test]
    fn test_parse_required_date_reports_field() {
        let err = parse_required_date("yesterday", "date").unwrap_err();
        assert!(err.to_string().contains("date"));
        assert!(err.to_string().contains("yesterday"));
    }
}
