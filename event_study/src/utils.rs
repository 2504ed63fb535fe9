//! Utility functions for the event_study crate

/// Date parsing for the formats found in event files
pub mod date_parser {
    use crate::error::{EventStudyError, Result};
    use chrono::{NaiveDate, NaiveDateTime};

    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: [&str; 3] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    /// Parse a calendar date. Any time component is dropped.
    pub fn parse_date(input: &str) -> Result<NaiveDate> {
        let trimmed = input.trim();

        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Ok(date);
            }
        }
        for format in DATETIME_FORMATS {
            if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(datetime.date());
            }
        }

        Err(EventStudyError::InvalidDate(trimmed.to_string()))
    }
}

/// Render a fractional return as a percentage, e.g. `0.0234` as `2.34%`.
/// Missing values render as `n/a`.
pub fn format_pct(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}%", decimals, v * 100.0),
        None => "n/a".to_string(),
    }
}
