//! Event identity and the typed records keyed by it
//!
//! Every table in the study is joined on [`EventKey`], a `(ticker, date)`
//! pair. The legacy `"TICKER | YYYY-MM-DD"` label is only a rendering of the
//! key; it is parsed back from files that carry it but is never used for
//! lookups.

use crate::error::{EventStudyError, Result};
use crate::utils::date_parser::parse_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Separator used by the textual event label
pub const LABEL_SEPARATOR: &str = " | ";

/// Unique identifier of one earnings announcement
///
/// Ordered by ticker, then announcement date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    ticker: String,
    date: NaiveDate,
}

impl EventKey {
    /// Build the key for a ticker and announcement date.
    ///
    /// The ticker is trimmed; an empty ticker is rejected.
    pub fn resolve(ticker: &str, date: NaiveDate) -> Result<Self> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(EventStudyError::DataError(
                "Event ticker cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            ticker: ticker.to_string(),
            date,
        })
    }

    /// Build the key from raw ticker and date cells
    pub fn parse(ticker: &str, date: &str) -> Result<Self> {
        Self::resolve(ticker, parse_date(date)?)
    }

    /// Ticker symbol
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Announcement date
    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.ticker, LABEL_SEPARATOR, self.date.format("%Y-%m-%d"))
    }
}

impl FromStr for EventKey {
    type Err = EventStudyError;

    fn from_str(label: &str) -> Result<Self> {
        // the date never contains the separator, the ticker might
        let (ticker, date) = label
            .rsplit_once(LABEL_SEPARATOR.trim())
            .ok_or_else(|| EventStudyError::DataError(format!("Invalid event label '{}'", label)))?;

        Self::parse(ticker, date)
    }
}

/// Earnings-surprise metadata for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Event the surprise belongs to
    pub key: EventKey,
    /// EPS actual minus estimate; `None` when missing or not a finite number
    pub surprise: Option<f64>,
}

impl MetadataRecord {
    /// Create a record, turning non-finite surprises into missing ones
    pub fn new(key: EventKey, surprise: Option<f64>) -> Self {
        Self {
            key,
            surprise: surprise.and_then(car_math::stats::finite),
        }
    }
}

/// Abnormal returns of one event by relative trading day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArVector {
    values: BTreeMap<i32, f64>,
}

impl ArVector {
    /// Create an empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(offset, ar)` pairs; missing or non-finite returns are left out
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i32, Option<f64>)>,
    {
        let mut vector = Self::new();
        for (offset, value) in pairs {
            vector.set(offset, value);
        }
        vector
    }

    /// Build from returns for consecutive offsets starting at `first_offset`
    pub fn from_slice(first_offset: i32, values: &[f64]) -> Self {
        Self::from_pairs(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| (first_offset + i as i32, Some(v))),
        )
    }

    /// Set (or clear, with `None`) the return at an offset
    pub fn set(&mut self, offset: i32, value: Option<f64>) {
        match value.and_then(car_math::stats::finite) {
            Some(v) => {
                self.values.insert(offset, v);
            }
            None => {
                self.values.remove(&offset);
            }
        }
    }

    /// Return at an offset, `None` when absent
    pub fn get(&self, offset: i32) -> Option<f64> {
        self.values.get(&offset).copied()
    }

    /// Present offsets in ascending order
    pub fn offsets(&self) -> impl Iterator<Item = i32> + '_ {
        self.values.keys().copied()
    }

    /// Number of present offsets
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no offset is present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Forecast materialized outside the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedForecast {
    pub predicted_car: f64,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
}

/// An announcement that has not happened yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingEvent {
    pub key: EventKey,
    /// Expected surprise, used when the CAR model is fitted in-session
    pub surprise: Option<f64>,
    /// Materialized prediction, used in precomputed mode
    pub precomputed: Option<PrecomputedForecast>,
}

impl UpcomingEvent {
    /// Upcoming event carrying only an expected surprise
    pub fn with_surprise(key: EventKey, surprise: Option<f64>) -> Self {
        Self {
            key,
            surprise: surprise.and_then(car_math::stats::finite),
            precomputed: None,
        }
    }

    /// Upcoming event carrying a materialized prediction
    pub fn with_prediction(key: EventKey, forecast: PrecomputedForecast) -> Self {
        Self {
            key,
            surprise: None,
            precomputed: Some(forecast),
        }
    }
}

/// Row of the optional precomputed ranking table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub ticker: String,
    pub mean_car: Option<f64>,
}
