//! Joined per-event views
//!
//! A view is the inner join `Events ⋈ Metadata ⋈ CAR series` on
//! [`EventKey`]. Events without a metadata record or without an AR row are
//! left out of the rows but listed in the [`JoinReport`], so callers can
//! report how many events were dropped and why.

use crate::data::{ArTable, EventTables};
use crate::event::EventKey;
use crate::window::{CarSeries, CarWindow};
use car_math::stats::mean_present;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// One joined event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub key: EventKey,
    pub surprise: Option<f64>,
    /// One CAR per window of the view, in the view's window order
    pub cars: Vec<Option<f64>>,
    /// Position of the event in the Events table
    pub source_row: usize,
}

impl EventRow {
    /// Announcement date
    pub fn date(&self) -> NaiveDate {
        self.key.date()
    }

    /// Ticker symbol
    pub fn ticker(&self) -> &str {
        self.key.ticker()
    }

    /// CAR of the view's first (primary) window
    pub fn car(&self) -> Option<f64> {
        self.cars.first().copied().flatten()
    }
}

/// Which events a join dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    /// Events considered (after the ticker filter)
    pub events: usize,
    /// Events that made it into the view
    pub joined: usize,
    /// Events with no metadata record
    pub missing_metadata: Vec<EventKey>,
    /// Events with no AR row
    pub missing_ar: Vec<EventKey>,
    /// Metadata records whose key is not in the Events table
    pub orphan_metadata: Vec<EventKey>,
    /// AR rows whose key is not in the Events table
    pub orphan_ar: Vec<EventKey>,
}

impl JoinReport {
    /// Number of events left out of the view
    pub fn excluded(&self) -> usize {
        self.events - self.joined
    }

    /// Distinct keys present in Metadata or AR but absent from Events
    pub fn orphans(&self) -> usize {
        self.orphan_metadata
            .iter()
            .chain(&self.orphan_ar)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Rows of an inner join, ordered by ticker then announcement date
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    windows: Vec<String>,
    rows: Vec<EventRow>,
    report: JoinReport,
}

impl EventView {
    /// Window names, aligned with [`EventRow::cars`]
    pub fn windows(&self) -> &[String] {
        &self.windows
    }

    /// Rows in chronological order within each ticker
    pub fn rows(&self) -> &[EventRow] {
        &self.rows
    }

    /// Join bookkeeping
    pub fn report(&self) -> &JoinReport {
        &self.report
    }

    /// Number of joined rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no event was joined
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The `n` most recent events, newest first
    pub fn latest(&self, n: usize) -> Vec<&EventRow> {
        let mut rows: Vec<&EventRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.date().cmp(&a.date()).then(b.source_row.cmp(&a.source_row)));
        rows.truncate(n);
        rows
    }

    /// Event with the latest announcement date; among equal dates the one
    /// appearing last in the Events table
    pub fn last_event(&self) -> Option<&EventRow> {
        self.rows.iter().max_by_key(|row| (row.date(), row.source_row))
    }

    /// Mean of the primary CAR over the rows, missing values excluded
    pub fn average_car(&self) -> Option<f64> {
        mean_present(self.rows.iter().map(EventRow::car))
    }

    /// Surprise versus primary CAR for every row where both are present
    pub fn surprise_scatter(&self) -> Vec<ScatterPoint> {
        self.rows
            .iter()
            .filter_map(|row| {
                Some(ScatterPoint {
                    date: row.date(),
                    surprise: row.surprise?,
                    car: row.car()?,
                })
            })
            .collect()
    }

    /// Headline metrics for a single-ticker view
    pub fn summary(&self, ticker: &str, events_in_table: usize) -> TickerSummary {
        let last = self.last_event();
        TickerSummary {
            ticker: ticker.to_string(),
            window: self.windows.first().cloned().unwrap_or_default(),
            average_car: self.average_car(),
            last_event: last.map(|row| row.key.clone()),
            last_surprise: last.and_then(|row| row.surprise),
            last_car: last.and_then(EventRow::car),
            events: events_in_table,
            joined: self.rows.len(),
        }
    }
}

/// One point of the surprise-versus-CAR chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub date: NaiveDate,
    pub surprise: f64,
    pub car: f64,
}

/// Headline metrics for one ticker and window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSummary {
    pub ticker: String,
    pub window: String,
    pub average_car: Option<f64>,
    pub last_event: Option<EventKey>,
    pub last_surprise: Option<f64>,
    pub last_car: Option<f64>,
    /// Rows for the ticker in the Events table
    pub events: usize,
    /// Rows that survived the join
    pub joined: usize,
}

/// One point of the abnormal-return curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArPoint {
    pub day: i32,
    pub ar: Option<f64>,
}

/// Abnormal returns of one event over a window's days
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArCurve {
    pub event: EventKey,
    pub window: String,
    pub points: Vec<ArPoint>,
}

/// AR by day for `key` over `window`; `None` if the event has no AR row
pub fn ar_curve(ar: &ArTable, key: &EventKey, window: &CarWindow) -> Option<ArCurve> {
    let vector = ar.get(key)?;
    Some(ArCurve {
        event: key.clone(),
        window: window.name().to_string(),
        points: window
            .offsets()
            .iter()
            .map(|&day| ArPoint {
                day,
                ar: vector.get(day),
            })
            .collect(),
    })
}

/// Builds [`EventView`]s from the session tables
#[derive(Debug, Clone)]
pub struct EventViewBuilder<'a> {
    tables: &'a EventTables,
    series: &'a [CarSeries],
    ticker: Option<String>,
}

impl<'a> EventViewBuilder<'a> {
    /// Join against the given CAR series; the first one is the primary window
    pub fn new(tables: &'a EventTables, series: &'a [CarSeries]) -> Self {
        Self {
            tables,
            series,
            ticker: None,
        }
    }

    /// Restrict the view to one ticker
    pub fn ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.trim().to_string());
        self
    }

    /// Perform the join
    pub fn build(self) -> EventView {
        let mut report = JoinReport::default();
        let mut rows = Vec::new();

        for (source_row, key) in self.tables.events().iter().enumerate() {
            if let Some(ticker) = &self.ticker {
                if key.ticker() != ticker {
                    continue;
                }
            }
            report.events += 1;

            let metadata = self.tables.metadata(key);
            let cars: Option<Vec<Option<f64>>> = self.series.iter().map(|s| s.get(key)).collect();

            if metadata.is_none() {
                report.missing_metadata.push(key.clone());
            }
            if cars.is_none() {
                report.missing_ar.push(key.clone());
            }

            if let (Some(metadata), Some(cars)) = (metadata, cars) {
                rows.push(EventRow {
                    key: key.clone(),
                    surprise: metadata.surprise,
                    cars,
                    source_row,
                });
            }
        }

        rows.sort_by(|a, b| a.key.cmp(&b.key).then(a.source_row.cmp(&b.source_row)));
        report.joined = rows.len();

        // rows of the other tables that no event points at
        let known: BTreeSet<&EventKey> = self.tables.events().iter().collect();
        let in_scope = |key: &&EventKey| {
            !known.contains(key) && self.ticker.as_deref().map_or(true, |t| key.ticker() == t)
        };
        report.orphan_metadata = self.tables.metadata_keys().filter(in_scope).cloned().collect();
        report.orphan_metadata.sort();
        report.orphan_ar = self.tables.ar().iter().map(|(key, _)| key).filter(in_scope).cloned().collect();
        report.orphan_ar.sort();

        debug!(
            ticker = self.ticker.as_deref().unwrap_or("*"),
            events = report.events,
            joined = report.joined,
            "built event view"
        );

        EventView {
            windows: self.series.iter().map(|s| s.window().name().to_string()).collect(),
            rows,
            report,
        }
    }
}

/// One ticker's joined events, ascending by announcement date
pub fn ticker_history(tables: &EventTables, series: &[CarSeries], ticker: &str) -> EventView {
    EventViewBuilder::new(tables, series).ticker(ticker).build()
}

/// Every ticker's joined events, ordered by ticker then date
pub fn cross_section(tables: &EventTables, series: &[CarSeries]) -> EventView {
    EventViewBuilder::new(tables, series).build()
}
