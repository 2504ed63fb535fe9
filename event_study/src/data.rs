//! Loading and holding the input tables of the study
//!
//! Tables are read with polars and converted into typed records right away.
//! After loading, an [`EventTables`] value is immutable: every view and
//! model is derived from it on demand.

use crate::config::DashboardConfig;
use crate::error::{EventStudyError, Result};
use crate::event::{
    ArVector, EventKey, MetadataRecord, PrecomputedForecast, RankingRecord, UpcomingEvent,
};
use car_math::stats::finite;
use polars::prelude::*;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

const TICKER_COLUMNS: [&str; 2] = ["ticker", "symbol"];
const DATE_COLUMNS: [&str; 4] = ["ann date", "announcement date", "ann_date", "date"];
const SURPRISE_COLUMNS: [&str; 2] = ["surprise", "eps surprise"];
const EVENT_ID_COLUMNS: [&str; 3] = ["event id", "event_id", "event"];
const PREDICTED_COLUMNS: [&str; 2] = ["predicted car", "predicted_car"];
const CI_LOWER_COLUMNS: [&str; 2] = ["ci lower", "ci_lower"];
const CI_UPPER_COLUMNS: [&str; 2] = ["ci upper", "ci_upper"];

/// Per-table bookkeeping of everything that was dropped or coerced on load
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableReport {
    /// Data rows read from the source
    pub rows: usize,
    /// Rows whose key overwrote an earlier row with the same key
    pub duplicates: usize,
    /// Rows skipped because no valid key could be built
    pub skipped: usize,
    /// Surprise cells that were present but not a finite number
    pub coerced: usize,
}

/// What happened while loading the tables of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub events: TableReport,
    pub metadata: TableReport,
    pub ar: TableReport,
    pub upcoming: TableReport,
    /// Optional tables that were configured but not found
    pub missing_tables: Vec<String>,
}

/// Abnormal-return table: one [`ArVector`] per event
#[derive(Debug, Clone, Default)]
pub struct ArTable {
    rows: HashMap<EventKey, ArVector>,
}

impl ArTable {
    /// Build from rows; a repeated key overwrites the earlier row.
    /// Returns the table and the number of overwritten rows.
    pub fn from_rows<I>(rows: I) -> (Self, usize)
    where
        I: IntoIterator<Item = (EventKey, ArVector)>,
    {
        let mut table = HashMap::new();
        let mut duplicates = 0;
        for (key, vector) in rows {
            if table.insert(key, vector).is_some() {
                duplicates += 1;
            }
        }
        (Self { rows: table }, duplicates)
    }

    /// AR vector of an event
    pub fn get(&self, key: &EventKey) -> Option<&ArVector> {
        self.rows.get(key)
    }

    /// Whether the event has an AR row
    pub fn contains(&self, key: &EventKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Iterate over all rows (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, &ArVector)> {
        self.rows.iter()
    }

    /// Number of events with an AR row
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// All static tables of one session
#[derive(Debug, Clone, Default)]
pub struct EventTables {
    /// Events in source order, one entry per key
    events: Vec<EventKey>,
    metadata: HashMap<EventKey, MetadataRecord>,
    ar: ArTable,
    upcoming: Vec<UpcomingEvent>,
    ranking: Option<Vec<RankingRecord>>,
    report: LoadReport,
}

impl EventTables {
    /// Assemble tables from in-memory records.
    ///
    /// Repeated keys follow the same rule as file loading: the later row
    /// wins and the overwrite is counted in the [`LoadReport`].
    pub fn new(events: Vec<EventKey>, metadata: Vec<MetadataRecord>, ar: Vec<(EventKey, ArVector)>) -> Self {
        let mut report = LoadReport::default();

        report.events.rows = events.len();
        let mut seen = BTreeSet::new();
        let mut unique_events = Vec::with_capacity(events.len());
        for key in events {
            if seen.insert(key.clone()) {
                unique_events.push(key);
            } else {
                report.events.duplicates += 1;
            }
        }

        report.metadata.rows = metadata.len();
        let mut meta_index = HashMap::with_capacity(metadata.len());
        for record in metadata {
            if meta_index.insert(record.key.clone(), record).is_some() {
                report.metadata.duplicates += 1;
            }
        }

        report.ar.rows = ar.len();
        let (ar, ar_duplicates) = ArTable::from_rows(ar);
        report.ar.duplicates = ar_duplicates;

        Self {
            events: unique_events,
            metadata: meta_index,
            ar,
            upcoming: Vec::new(),
            ranking: None,
            report,
        }
    }

    /// Attach the upcoming-events table; a repeated key replaces the earlier entry
    pub fn with_upcoming(mut self, upcoming: Vec<UpcomingEvent>) -> Self {
        self.report.upcoming.rows = upcoming.len();
        let mut position: HashMap<EventKey, usize> = HashMap::new();
        let mut unique: Vec<UpcomingEvent> = Vec::with_capacity(upcoming.len());
        for event in upcoming {
            match position.entry(event.key.clone()) {
                Entry::Occupied(slot) => {
                    unique[*slot.get()] = event;
                    self.report.upcoming.duplicates += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(unique.len());
                    unique.push(event);
                }
            }
        }
        self.upcoming = unique;
        self
    }

    /// Attach the precomputed ranking table
    pub fn with_ranking(mut self, ranking: Vec<RankingRecord>) -> Self {
        self.ranking = Some(ranking);
        self
    }

    /// Replace the load report (used by file loading to carry skip/coercion counts)
    pub fn with_report(mut self, report: LoadReport) -> Self {
        self.report = report;
        self
    }

    /// Events in source order
    pub fn events(&self) -> &[EventKey] {
        &self.events
    }

    /// Surprise metadata of an event
    pub fn metadata(&self, key: &EventKey) -> Option<&MetadataRecord> {
        self.metadata.get(key)
    }

    /// Keys of every metadata record, in no particular order
    pub fn metadata_keys(&self) -> impl Iterator<Item = &EventKey> {
        self.metadata.keys()
    }

    /// Number of metadata records
    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }

    /// Abnormal-return table
    pub fn ar(&self) -> &ArTable {
        &self.ar
    }

    /// Upcoming events in source order
    pub fn upcoming(&self) -> &[UpcomingEvent] {
        &self.upcoming
    }

    /// Precomputed ranking table, if one was loaded
    pub fn ranking(&self) -> Option<&[RankingRecord]> {
        self.ranking.as_deref()
    }

    /// Load bookkeeping
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Distinct tickers of the Events table, sorted
    pub fn tickers(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|key| key.ticker().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of Events rows for a ticker
    pub fn event_count(&self, ticker: &str) -> usize {
        self.events.iter().filter(|key| key.ticker() == ticker).count()
    }
}

/// Data loader for the event-study tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Read a CSV file into a DataFrame
    pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Ok(df)
    }

    /// Load every table named by the configuration, relative to `data_dir`
    pub fn load<P: AsRef<Path>>(config: &DashboardConfig, data_dir: P) -> Result<EventTables> {
        let data_dir = data_dir.as_ref();
        let mut report = LoadReport::default();

        let (events, events_report) = Self::events_from_frame(&Self::read_frame(data_dir.join(&config.events_file))?)?;
        let (metadata, metadata_report) =
            Self::metadata_from_frame(&Self::read_frame(data_dir.join(&config.metadata_file))?)?;
        let (ar, ar_report) = Self::ar_from_frame(&Self::read_frame(data_dir.join(&config.ar_file))?)?;

        let mut tables = EventTables::new(events, metadata, ar);
        // keep the duplicate counts computed while indexing, add the parse counts
        let indexed = tables.report().clone();
        report.events = TableReport { duplicates: indexed.events.duplicates, ..events_report };
        report.metadata = TableReport { duplicates: indexed.metadata.duplicates, ..metadata_report };
        report.ar = TableReport { duplicates: indexed.ar.duplicates, ..ar_report };

        if let Some(file) = &config.upcoming_file {
            let path = data_dir.join(file);
            if path.exists() {
                let (upcoming, upcoming_report) = Self::upcoming_from_frame(&Self::read_frame(&path)?)?;
                tables = tables.with_upcoming(upcoming);
                report.upcoming = TableReport {
                    duplicates: tables.report().upcoming.duplicates,
                    ..upcoming_report
                };
            } else {
                warn!(path = %path.display(), "upcoming events table not found");
                report.missing_tables.push(file.display().to_string());
            }
        }

        if let Some(file) = &config.ranking_file {
            let path = data_dir.join(file);
            if path.exists() {
                tables = tables.with_ranking(Self::ranking_from_frame(&Self::read_frame(&path)?)?);
            } else {
                warn!(path = %path.display(), "precomputed ranking table not found");
                report.missing_tables.push(file.display().to_string());
            }
        }

        info!(
            events = tables.events().len(),
            metadata = tables.metadata_len(),
            ar_rows = tables.ar().len(),
            upcoming = tables.upcoming().len(),
            "loaded event-study tables"
        );

        Ok(tables.with_report(report))
    }

    /// Events table: ticker and announcement date
    pub fn events_from_frame(df: &DataFrame) -> Result<(Vec<EventKey>, TableReport)> {
        let keys = Self::keys_from_frame(df, "events")?;
        let mut report = TableReport {
            rows: keys.len(),
            ..Default::default()
        };

        let events: Vec<EventKey> = keys
            .into_iter()
            .filter_map(|key| {
                if key.is_none() {
                    report.skipped += 1;
                }
                key
            })
            .collect();

        Ok((events, report))
    }

    /// Metadata table: ticker, announcement date and surprise.
    ///
    /// Surprise cells that are not finite numbers become missing and are
    /// counted in `TableReport::coerced`.
    pub fn metadata_from_frame(df: &DataFrame) -> Result<(Vec<MetadataRecord>, TableReport)> {
        let keys = Self::keys_from_frame(df, "metadata")?;
        let surprise_column = Self::require_column(df, &SURPRISE_COLUMNS, "metadata surprise")?;
        let (surprises, coerced) = Self::float_column(df, &surprise_column)?;

        let mut report = TableReport {
            rows: keys.len(),
            coerced,
            ..Default::default()
        };

        let mut records = Vec::with_capacity(keys.len());
        for (key, surprise) in keys.into_iter().zip(surprises) {
            match key {
                Some(key) => records.push(MetadataRecord::new(key, surprise)),
                None => report.skipped += 1,
            }
        }

        if report.coerced > 0 {
            warn!(count = report.coerced, "non-numeric or non-finite surprises set to missing");
        }

        Ok((records, report))
    }

    /// AR table: event label (or ticker/date columns) plus one column per offset
    pub fn ar_from_frame(df: &DataFrame) -> Result<(Vec<(EventKey, ArVector)>, TableReport)> {
        let keys = if Self::detect_column(df, &TICKER_COLUMNS).is_some() {
            Self::keys_from_frame(df, "ar")?
        } else {
            let first = df
                .get_columns()
                .first()
                .ok_or_else(|| EventStudyError::DataError("AR table has no columns".to_string()))?;
            Self::string_column(first)?
                .into_iter()
                .map(|label| label.and_then(|l| l.parse::<EventKey>().ok()))
                .collect()
        };

        let mut offset_columns = Vec::new();
        for name in df.get_column_names() {
            if let Some(offset) = parse_offset(name) {
                let (values, _) = Self::float_column(df, name)?;
                offset_columns.push((offset, values));
            }
        }
        if offset_columns.is_empty() {
            return Err(EventStudyError::MissingColumn(
                "AR table has no relative-day offset columns".to_string(),
            ));
        }
        debug!(offsets = offset_columns.len(), "detected AR offset columns");

        let mut report = TableReport {
            rows: keys.len(),
            ..Default::default()
        };
        let mut rows = Vec::with_capacity(keys.len());
        for (i, key) in keys.into_iter().enumerate() {
            match key {
                Some(key) => {
                    let vector = ArVector::from_pairs(
                        offset_columns.iter().map(|(offset, values)| (*offset, values[i])),
                    );
                    rows.push((key, vector));
                }
                None => report.skipped += 1,
            }
        }

        Ok((rows, report))
    }

    /// Upcoming events: ticker/date or event label, plus a surprise and/or a
    /// precomputed prediction with confidence bounds
    pub fn upcoming_from_frame(df: &DataFrame) -> Result<(Vec<UpcomingEvent>, TableReport)> {
        let keys = if Self::detect_column(df, &TICKER_COLUMNS).is_some() {
            Self::keys_from_frame(df, "upcoming")?
        } else {
            let column = Self::require_column(df, &EVENT_ID_COLUMNS, "upcoming event id")?;
            Self::string_column(df.column(&column)?)?
                .into_iter()
                .map(|label| label.and_then(|l| l.parse::<EventKey>().ok()))
                .collect()
        };

        let n = keys.len();
        let mut report = TableReport {
            rows: n,
            ..Default::default()
        };

        let surprises = match Self::detect_column(df, &SURPRISE_COLUMNS) {
            Some(column) => {
                let (values, coerced) = Self::float_column(df, &column)?;
                report.coerced = coerced;
                values
            }
            None => vec![None; n],
        };
        let predicted = Self::optional_float_column(df, &PREDICTED_COLUMNS, n)?;
        let lower = Self::optional_float_column(df, &CI_LOWER_COLUMNS, n)?;
        let upper = Self::optional_float_column(df, &CI_UPPER_COLUMNS, n)?;

        let mut events = Vec::with_capacity(n);
        for (i, key) in keys.into_iter().enumerate() {
            let Some(key) = key else {
                report.skipped += 1;
                continue;
            };
            let precomputed = predicted[i].map(|predicted_car| PrecomputedForecast {
                predicted_car,
                ci_lower: lower[i],
                ci_upper: upper[i],
            });
            events.push(UpcomingEvent {
                key,
                surprise: surprises[i],
                precomputed,
            });
        }

        Ok((events, report))
    }

    /// Precomputed ranking: ticker plus the first other numeric column
    pub fn ranking_from_frame(df: &DataFrame) -> Result<Vec<RankingRecord>> {
        let ticker_column = Self::require_column(df, &TICKER_COLUMNS, "ranking ticker")?;
        let value_column = df
            .get_column_names()
            .into_iter()
            .find(|name| *name != ticker_column.as_str())
            .map(str::to_string)
            .ok_or_else(|| EventStudyError::MissingColumn("ranking mean CAR".to_string()))?;

        let tickers = Self::string_column(df.column(&ticker_column)?)?;
        let (values, _) = Self::float_column(df, &value_column)?;

        Ok(tickers
            .into_iter()
            .zip(values)
            .filter_map(|(ticker, mean_car)| {
                let ticker = ticker?.trim().to_string();
                (!ticker.is_empty()).then_some(RankingRecord { ticker, mean_car })
            })
            .collect())
    }

    /// Build one key per row from the ticker and date columns; `None` for
    /// rows that cannot form a key
    fn keys_from_frame(df: &DataFrame, table: &str) -> Result<Vec<Option<EventKey>>> {
        let ticker_column = Self::require_column(df, &TICKER_COLUMNS, &format!("{} ticker", table))?;
        let date_column = Self::require_column(df, &DATE_COLUMNS, &format!("{} announcement date", table))?;

        let tickers = Self::string_column(df.column(&ticker_column)?)?;
        let dates = Self::string_column(df.column(&date_column)?)?;

        Ok(tickers
            .into_iter()
            .zip(dates)
            .map(|(ticker, date)| match (ticker, date) {
                (Some(ticker), Some(date)) => EventKey::parse(&ticker, &date).ok(),
                _ => None,
            })
            .collect())
    }

    /// Find a column whose normalized name matches one of the candidates
    fn detect_column(df: &DataFrame, candidates: &[&str]) -> Option<String> {
        df.get_column_names()
            .into_iter()
            .find(|name| {
                let normalized = normalize_name(name);
                candidates.iter().any(|c| normalize_name(c) == normalized)
            })
            .map(str::to_string)
    }

    fn require_column(df: &DataFrame, candidates: &[&str], what: &str) -> Result<String> {
        Self::detect_column(df, candidates).ok_or_else(|| EventStudyError::MissingColumn(what.to_string()))
    }

    fn string_column(series: &Series) -> Result<Vec<Option<String>>> {
        let cast = series.cast(&DataType::Utf8)?;
        let values = cast.utf8()?;
        Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
    }

    /// Read a numeric column, coercing text and non-finite values to missing.
    /// Returns the values and the number of coerced cells.
    fn float_column(df: &DataFrame, name: &str) -> Result<(Vec<Option<f64>>, usize)> {
        let series = df.column(name)?;
        let mut coerced = 0;

        let values = if series.dtype() == &DataType::Utf8 {
            series
                .utf8()?
                .into_iter()
                .map(|cell| {
                    let text = cell?.trim();
                    if text.is_empty() {
                        return None;
                    }
                    let value = text.parse::<f64>().ok().and_then(finite);
                    if value.is_none() {
                        coerced += 1;
                    }
                    value
                })
                .collect()
        } else {
            let cast = series.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|cell| {
                    let value = cell?;
                    if !value.is_finite() {
                        coerced += 1;
                    }
                    finite(value)
                })
                .collect()
        };

        Ok((values, coerced))
    }

    fn optional_float_column(df: &DataFrame, candidates: &[&str], n: usize) -> Result<Vec<Option<f64>>> {
        match Self::detect_column(df, candidates) {
            Some(column) => Ok(Self::float_column(df, &column)?.0),
            None => Ok(vec![None; n]),
        }
    }
}

/// Lowercase, treat `_` and `-` as spaces, collapse whitespace
fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Column headers like `-5`, `0` or `+1` name relative-day offsets
fn parse_offset(name: &str) -> Option<i32> {
    let trimmed = name.trim();
    trimmed.strip_prefix('+').unwrap_or(trimmed).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(ticker: &str, y: i32, m: u32, d: u32) -> EventKey {
        EventKey::resolve(ticker, NaiveDate::from_ymd_opt(y, m, d).unwrap()).unwrap()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Ann Date"), "ann date");
        assert_eq!(normalize_name("ann_date"), "ann date");
        assert_eq!(normalize_name(" Predicted-CAR "), "predicted car");
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("-5"), Some(-5));
        assert_eq!(parse_offset("0"), Some(0));
        assert_eq!(parse_offset("+1"), Some(1));
        assert_eq!(parse_offset("event_id"), None);
        assert_eq!(parse_offset(""), None);
    }

    #[test]
    fn test_tables_overwrite_duplicates() {
        let a = key("AAA", 2023, 1, 2);
        let b = key("BBB", 2023, 1, 3);
        let tables = EventTables::new(
            vec![a.clone(), b.clone(), a.clone()],
            vec![
                MetadataRecord::new(a.clone(), Some(0.01)),
                MetadataRecord::new(a.clone(), Some(0.05)),
            ],
            vec![
                (a.clone(), ArVector::from_slice(0, &[0.01])),
                (a.clone(), ArVector::from_slice(0, &[0.02])),
            ],
        );

        assert_eq!(tables.events(), &[a.clone(), b]);
        assert_eq!(tables.metadata(&a).unwrap().surprise, Some(0.05));
        assert_eq!(tables.ar().get(&a).unwrap().get(0), Some(0.02));
        assert_eq!(tables.report().events.duplicates, 1);
        assert_eq!(tables.report().metadata.duplicates, 1);
        assert_eq!(tables.report().ar.duplicates, 1);
    }

    #[test]
    fn test_tickers_and_counts() {
        let tables = EventTables::new(
            vec![key("BBB", 2023, 1, 2), key("AAA", 2023, 1, 2), key("AAA", 2023, 4, 2)],
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(tables.tickers(), vec!["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(tables.event_count("AAA"), 2);
        assert_eq!(tables.event_count("ZZZ"), 0);
    }

    #[test]
    fn test_upcoming_keeps_first_position() {
        let a = key("AAA", 2024, 1, 2);
        let b = key("BBB", 2024, 1, 3);
        let tables = EventTables::default().with_upcoming(vec![
            UpcomingEvent::with_surprise(a.clone(), Some(0.01)),
            UpcomingEvent::with_surprise(b.clone(), Some(0.02)),
            UpcomingEvent::with_surprise(a.clone(), Some(0.03)),
        ]);

        assert_eq!(tables.upcoming().len(), 2);
        assert_eq!(tables.upcoming()[0].key, a);
        assert_eq!(tables.upcoming()[0].surprise, Some(0.03));
        assert_eq!(tables.report().upcoming.duplicates, 1);
    }

    #[test]
    fn test_metadata_from_frame_coerces_surprise() {
        let df = df!(
            "Ticker" => &["AAA", "AAA", "BBB", "BBB"],
            "Ann Date" => &["2023-01-02", "2023-04-02", "2023-01-03", "bad date"],
            "Surprise" => &["0.02", "n/a", "inf", "0.01"]
        )
        .unwrap();

        let (records, report) = DataLoader::metadata_from_frame(&df).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].surprise, Some(0.02));
        assert_eq!(records[1].surprise, None);
        assert_eq!(records[2].surprise, None);
        assert_eq!(report.rows, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.coerced, 2);
    }

    #[test]
    fn test_ar_from_frame_with_labels() {
        let df = df!(
            "event_id" => &["AAA | 2023-01-02", "garbage"],
            "-1" => &[Some(0.01), Some(0.0)],
            "0" => &[Some(0.02), None],
            "1" => &[Some(-0.01), Some(0.0)]
        )
        .unwrap();

        let (rows, report) = DataLoader::ar_from_frame(&df).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(report.skipped, 1);
        let (k, vector) = &rows[0];
        assert_eq!(k, &key("AAA", 2023, 1, 2));
        assert_eq!(vector.offsets().collect::<Vec<_>>(), vec![-1, 0, 1]);
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let df = df!("Name" => &["AAA"]).unwrap();
        assert!(matches!(
            DataLoader::events_from_frame(&df),
            Err(EventStudyError::MissingColumn(_))
        ));
    }
}
