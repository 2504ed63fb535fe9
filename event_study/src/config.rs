//! Session configuration
//!
//! The dashboard variants (in-session regression versus precomputed
//! forecasts, ticker versus decile ranking, file names) are all settings of
//! one engine. Every field has a default, so a JSON file only needs the keys
//! it changes.

use crate::error::{EventStudyError, Result};
use crate::forecast::{ForecastMode, DEFAULT_CONFIDENCE_LEVEL};
use crate::ranking::RankingMode;
use crate::window::CarWindow;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Configuration of one dashboard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Events table (ticker, announcement date)
    pub events_file: PathBuf,
    /// Surprise metadata table
    pub metadata_file: PathBuf,
    /// Abnormal-return table
    pub ar_file: PathBuf,
    /// Upcoming events, optional
    pub upcoming_file: Option<PathBuf>,
    /// Precomputed ticker ranking, optional
    pub ranking_file: Option<PathBuf>,
    pub forecast_mode: ForecastMode,
    pub ranking_mode: RankingMode,
    /// Two-sided level of forecast intervals
    pub confidence_level: f64,
    /// Rows in the history panel; `None` shows every event
    pub latest_events: Option<usize>,
    /// Window selected when the caller names none
    pub default_window: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            events_file: PathBuf::from("events.csv"),
            metadata_file: PathBuf::from("meta.csv"),
            ar_file: PathBuf::from("ar.csv"),
            upcoming_file: Some(PathBuf::from("upcoming_surprises.csv")),
            ranking_file: None,
            forecast_mode: ForecastMode::Regression,
            ranking_mode: RankingMode::Ticker,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            latest_events: None,
            default_window: CarWindow::announcement_day().name().to_string(),
        }
    }
}

impl DashboardConfig {
    /// Read a JSON configuration file and validate it
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration string and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(EventStudyError::InvalidParameter(format!(
                "confidence_level must be between 0 and 1, got {}",
                self.confidence_level
            )));
        }
        if self.latest_events == Some(0) {
            return Err(EventStudyError::InvalidParameter(
                "latest_events must be positive".to_string(),
            ));
        }
        if self.ranking_mode == RankingMode::Precomputed && self.ranking_file.is_none() {
            return Err(EventStudyError::InvalidParameter(
                "precomputed ranking mode needs a ranking_file".to_string(),
            ));
        }
        if self.forecast_mode == ForecastMode::Precomputed && self.upcoming_file.is_none() {
            return Err(EventStudyError::InvalidParameter(
                "precomputed forecast mode needs an upcoming_file".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.events_file, PathBuf::from("events.csv"));
        assert_eq!(config.default_window, "CAR(0,0)");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = DashboardConfig::from_json_str(
            r#"{ "forecast_mode": "precomputed", "upcoming_file": "upcoming_forecasts.csv", "ranking_mode": "surprise_decile" }"#,
        )
        .unwrap();

        assert_eq!(config.forecast_mode, ForecastMode::Precomputed);
        assert_eq!(config.ranking_mode, RankingMode::SurpriseDecile);
        assert_eq!(config.upcoming_file, Some(PathBuf::from("upcoming_forecasts.csv")));
        assert_eq!(config.metadata_file, PathBuf::from("meta.csv"));
        assert_eq!(config.confidence_level, DEFAULT_CONFIDENCE_LEVEL);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(DashboardConfig::from_json_str(r#"{ "confidence_level": 1.5 }"#).is_err());
        assert!(DashboardConfig::from_json_str(r#"{ "latest_events": 0 }"#).is_err());
        assert!(DashboardConfig::from_json_str(r#"{ "ranking_mode": "precomputed" }"#).is_err());
        assert!(matches!(
            DashboardConfig::from_json_str("{ not json"),
            Err(EventStudyError::JsonError(_))
        ));
    }
}
