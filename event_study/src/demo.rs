//! Synthetic event-study tables
//!
//! Generates a reproducible market where the announcement-day abnormal
//! return responds linearly to the earnings surprise. Used by the
//! `--demo` flag of the dashboard binary and by tests.

use crate::config::DashboardConfig;
use crate::data::EventTables;
use crate::error::{EventStudyError, Result};
use crate::event::{ArVector, EventKey, MetadataRecord, UpcomingEvent};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Parameters of the synthetic market
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMarket {
    pub tickers: Vec<String>,
    /// Quarterly announcements per ticker
    pub events_per_ticker: usize,
    /// Relative days covered by each AR row, `-span..=span`
    pub span: i32,
    /// Announcement-day response: `intercept + slope * surprise`
    pub intercept: f64,
    pub slope: f64,
    /// Standard deviation of surprises
    pub surprise_sd: f64,
    /// Standard deviation of daily abnormal-return noise
    pub noise_sd: f64,
    pub seed: u64,
}

impl Default for SyntheticMarket {
    fn default() -> Self {
        Self {
            tickers: ["AAPL", "MSFT", "NVDA", "AMZN", "GOOG", "META"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            events_per_ticker: 16,
            span: 5,
            intercept: 0.002,
            slope: 0.4,
            surprise_sd: 0.05,
            noise_sd: 0.01,
            seed: 42,
        }
    }
}

impl SyntheticMarket {
    /// Generate the tables: one upcoming event per ticker follows its last
    /// historical announcement
    pub fn generate(&self) -> Result<EventTables> {
        if self.tickers.is_empty() || self.events_per_ticker == 0 {
            return Err(EventStudyError::InvalidParameter(
                "Synthetic market needs at least one ticker and one event".to_string(),
            ));
        }
        if self.span < 0 {
            return Err(EventStudyError::InvalidParameter(format!(
                "AR span must be non-negative, got {}",
                self.span
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let surprise_dist = normal(self.surprise_sd)?;
        let noise_dist = normal(self.noise_sd)?;
        let first_date = NaiveDate::from_ymd_opt(2019, 1, 25)
            .ok_or_else(|| EventStudyError::DataError("invalid base date".to_string()))?;

        let mut events = Vec::new();
        let mut metadata = Vec::new();
        let mut ar = Vec::new();
        let mut upcoming = Vec::new();

        for (t, ticker) in self.tickers.iter().enumerate() {
            // stagger tickers so announcement dates differ
            let offset_days = t as i64 * 3;
            for quarter in 0..=self.events_per_ticker {
                let date = first_date + Duration::days(91 * quarter as i64 + offset_days);
                let key = EventKey::resolve(ticker, date)?;
                let surprise = surprise_dist.sample(&mut rng);

                if quarter == self.events_per_ticker {
                    upcoming.push(UpcomingEvent::with_surprise(key, Some(surprise)));
                    continue;
                }

                let vector = ArVector::from_pairs((-self.span..=self.span).map(|day| {
                    let mut value = noise_dist.sample(&mut rng);
                    if day == 0 {
                        value += self.intercept + self.slope * surprise;
                    }
                    (day, Some(value))
                }));

                events.push(key.clone());
                metadata.push(MetadataRecord::new(key.clone(), Some(surprise)));
                ar.push((key, vector));
            }
        }

        info!(
            tickers = self.tickers.len(),
            events = events.len(),
            seed = self.seed,
            "generated synthetic event tables"
        );

        Ok(EventTables::new(events, metadata, ar).with_upcoming(upcoming))
    }

    /// Generate the tables and write them as CSV files named by `config`
    pub fn write_csv<P: AsRef<Path>>(&self, config: &DashboardConfig, dir: P) -> Result<EventTables> {
        let dir = dir.as_ref();
        let tables = self.generate()?;

        let mut writer = csv::Writer::from_writer(File::create(dir.join(&config.events_file))?);
        writer.write_record(["Ticker", "Ann Date"])?;
        for key in tables.events() {
            writer.write_record([key.ticker().to_string(), key.date().to_string()])?;
        }
        writer.flush()?;

        let mut writer = csv::Writer::from_writer(File::create(dir.join(&config.metadata_file))?);
        writer.write_record(["Ticker", "Ann Date", "Surprise"])?;
        for key in tables.events() {
            let surprise = tables.metadata(key).and_then(|m| m.surprise);
            writer.write_record([
                key.ticker().to_string(),
                key.date().to_string(),
                surprise.map(|s| s.to_string()).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;

        let mut writer = csv::Writer::from_writer(File::create(dir.join(&config.ar_file))?);
        let mut header = vec!["event".to_string()];
        header.extend((-self.span..=self.span).map(|day| day.to_string()));
        writer.write_record(&header)?;
        for (key, vector) in tables.ar().iter() {
            let mut record = vec![key.to_string()];
            record.extend(
                (-self.span..=self.span).map(|day| vector.get(day).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;

        if let Some(file) = &config.upcoming_file {
            let mut writer = csv::Writer::from_writer(File::create(dir.join(file))?);
            writer.write_record(["Ticker", "Ann Date", "Surprise"])?;
            for event in tables.upcoming() {
                writer.write_record([
                    event.key.ticker().to_string(),
                    event.key.date().to_string(),
                    event.surprise.map(|s| s.to_string()).unwrap_or_default(),
                ])?;
            }
            writer.flush()?;
        }

        info!(dir = %dir.display(), "wrote synthetic tables");
        Ok(tables)
    }
}

fn normal(sd: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, sd).map_err(|e| EventStudyError::InvalidParameter(format!("standard deviation {}: {}", sd, e)))
}
