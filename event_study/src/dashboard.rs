//! Rendering every dashboard view from one selection
//!
//! [`EventStudy::render`] is a pure function of the loaded tables, the
//! configuration and a [`Selection`]. Each call recomputes every view from
//! scratch; nothing is cached between calls and nothing is mutated.

use crate::config::DashboardConfig;
use crate::data::{EventTables, LoadReport};
use crate::error::{EventStudyError, Result};
use crate::event::{EventKey, UpcomingEvent};
use crate::forecast::{build_forecaster, CarForecast, InsufficientRegressionData};
use crate::ranking::{rank_by_surprise_decile, rank_by_ticker, rank_precomputed, Ranking, RankingMode};
use crate::view::{
    ar_curve, cross_section, ticker_history, ArCurve, EventRow, EventView, JoinReport, ScatterPoint, TickerSummary,
};
use crate::window::{aggregate, aggregate_all, CarWindow};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// What the user picked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub ticker: String,
    /// Window name, e.g. `CAR(-1,+1)`
    pub window: String,
    /// Upcoming event label, `"TICKER | YYYY-MM-DD"`
    pub upcoming: Option<String>,
    /// Overrides the configured history length
    pub latest_n: Option<usize>,
}

impl Selection {
    /// Selection of a ticker and window with no upcoming event
    pub fn new(ticker: &str, window: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            window: window.to_string(),
            upcoming: None,
            latest_n: None,
        }
    }

    /// Also select an upcoming event
    pub fn with_upcoming(mut self, label: &str) -> Self {
        self.upcoming = Some(label.to_string());
        self
    }
}

/// A dashboard panel: either data or a message explaining why there is none
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "content", rename_all = "snake_case")]
pub enum Panel<T> {
    Ready(T),
    Empty { message: String },
}

impl<T> Panel<T> {
    /// Empty panel with a message
    pub fn empty(message: impl Into<String>) -> Self {
        Panel::Empty {
            message: message.into(),
        }
    }

    /// Turn an error into an empty state; unknown selections keep their
    /// message, other errors are logged
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Panel::Ready(value),
            Err(err @ EventStudyError::UnknownSelection { .. }) => Panel::empty(err.to_string()),
            Err(err) => {
                warn!(error = %err, "dashboard panel failed");
                Panel::empty(err.to_string())
            }
        }
    }

    /// The data, if ready
    pub fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(value) => Some(value),
            Panel::Empty { .. } => None,
        }
    }

    /// Whether the panel holds data
    pub fn is_ready(&self) -> bool {
        matches!(self, Panel::Ready(_))
    }
}

/// Signals raised while rendering that did not stop the render
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DashboardWarning {
    /// Keys dropped by the join because `table` lacks them
    MissingJoinKey { table: String, count: usize },
    /// Surprise cells coerced to missing on load
    InvalidSurprise { table: String, count: usize },
    /// The CAR model fell back to zero intercept and slope
    InsufficientRegressionData { window: String, detail: InsufficientRegressionData },
    /// Rows overwritten by a later row with the same key
    DuplicateEventKey { table: String, count: usize },
    /// Rows skipped because no key could be built
    UnparseableRows { table: String, count: usize },
    /// Configured optional table not found
    MissingTable { file: String },
}

impl fmt::Display for DashboardWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardWarning::MissingJoinKey { table, count } => {
                write!(f, "{} keys have no {} row and were left out", count, table)
            }
            DashboardWarning::InvalidSurprise { table, count } => {
                write!(f, "{} surprise values in {} were not numbers and are treated as missing", count, table)
            }
            DashboardWarning::InsufficientRegressionData { window, detail } => {
                write!(f, "{}: {}", window, detail)
            }
            DashboardWarning::DuplicateEventKey { table, count } => {
                write!(f, "{} rows in {} repeat an earlier event and replaced it", count, table)
            }
            DashboardWarning::UnparseableRows { table, count } => {
                write!(f, "{} rows in {} have no valid ticker/date and were skipped", count, table)
            }
            DashboardWarning::MissingTable { file } => write!(f, "optional table {} not found", file),
        }
    }
}

/// Event history table over the standard windows, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryTable {
    pub windows: Vec<String>,
    pub rows: Vec<EventRow>,
}

/// Everything the presentation layer draws for one selection
#[derive(Debug, Clone, Serialize)]
pub struct DashboardViews {
    pub selection: Selection,
    pub summary: Panel<TickerSummary>,
    pub ranking: Panel<Ranking>,
    pub history: Panel<HistoryTable>,
    pub ar_curve: Panel<ArCurve>,
    pub scatter: Panel<Vec<ScatterPoint>>,
    pub forecast: Panel<CarForecast>,
    /// Cross-sectional join bookkeeping ("N events, M joined")
    pub join_report: JoinReport,
    pub warnings: Vec<DashboardWarning>,
}

/// One session: immutable tables plus configuration
#[derive(Debug, Clone)]
pub struct EventStudy {
    tables: EventTables,
    config: DashboardConfig,
    windows: Vec<CarWindow>,
}

impl EventStudy {
    /// Start a session over loaded tables with the standard windows
    pub fn new(tables: EventTables, config: DashboardConfig) -> Result<Self> {
        Self::with_windows(tables, config, CarWindow::standard())
    }

    /// Start a session with a custom set of selectable windows
    pub fn with_windows(tables: EventTables, config: DashboardConfig, windows: Vec<CarWindow>) -> Result<Self> {
        config.validate()?;
        if windows.is_empty() {
            return Err(EventStudyError::InvalidParameter(
                "At least one CAR window is required".to_string(),
            ));
        }
        info!(
            events = tables.events().len(),
            windows = windows.len(),
            forecast_mode = %config.forecast_mode,
            ranking_mode = %config.ranking_mode,
            "event study session started"
        );
        Ok(Self { tables, config, windows })
    }

    /// Loaded tables
    pub fn tables(&self) -> &EventTables {
        &self.tables
    }

    /// Session configuration
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Tickers available for selection
    pub fn tickers(&self) -> Vec<String> {
        self.tables.tickers()
    }

    /// Windows available for selection
    pub fn windows(&self) -> &[CarWindow] {
        &self.windows
    }

    /// Labels of upcoming events available for selection
    pub fn upcoming_events(&self) -> Vec<String> {
        self.tables.upcoming().iter().map(|e| e.key.to_string()).collect()
    }

    /// Selection the UI starts with: first ticker, configured window,
    /// first upcoming event
    pub fn default_selection(&self) -> Selection {
        Selection {
            ticker: self.tickers().into_iter().next().unwrap_or_default(),
            window: self.config.default_window.clone(),
            upcoming: self.upcoming_events().into_iter().next(),
            latest_n: None,
        }
    }

    /// Compute every view for `selection`
    pub fn render(&self, selection: &Selection) -> DashboardViews {
        debug!(ticker = %selection.ticker, window = %selection.window, "rendering dashboard");
        let ticker = selection.ticker.trim();
        let mut warnings = load_warnings(self.tables.report());

        let window = CarWindow::find(&self.windows, &selection.window).cloned();
        let ticker_known = self.tables.event_count(ticker) > 0;

        // standard windows drive the history table regardless of the selection
        let history_series = aggregate_all(self.tables.ar(), &CarWindow::standard());
        let history = if ticker_known {
            let view = ticker_history(&self.tables, &history_series, ticker);
            let n = selection.latest_n.or(self.config.latest_events).unwrap_or(view.len());
            Panel::Ready(HistoryTable {
                windows: view.windows().to_vec(),
                rows: view.latest(n).into_iter().cloned().collect(),
            })
        } else {
            Panel::from_result(Err(EventStudyError::unknown("ticker", ticker)))
        };

        let Ok(window) = window else {
            let message = EventStudyError::unknown("CAR window", &selection.window).to_string();
            return DashboardViews {
                selection: selection.clone(),
                summary: Panel::empty(&message),
                ranking: Panel::empty(&message),
                history,
                ar_curve: Panel::empty(&message),
                scatter: Panel::empty(&message),
                forecast: Panel::empty(&message),
                join_report: JoinReport::default(),
                warnings,
            };
        };

        let series = [aggregate(self.tables.ar(), &window)];
        let universe = cross_section(&self.tables, &series);
        warnings.extend(join_warnings(universe.report()));

        let ticker_view = ticker_known.then(|| ticker_history(&self.tables, &series, ticker));

        let summary = match &ticker_view {
            None => Panel::from_result(Err(EventStudyError::unknown("ticker", ticker))),
            Some(view) if view.is_empty() => Panel::empty(format!(
                "{} has {} events but none could be joined with surprise and AR data",
                ticker,
                view.report().events
            )),
            Some(view) => Panel::Ready(view.summary(ticker, self.tables.event_count(ticker))),
        };

        let ar_curve_panel = match ticker_view.as_ref().and_then(EventView::last_event) {
            Some(last) => match ar_curve(self.tables.ar(), &last.key, &window) {
                Some(curve) => Panel::Ready(curve),
                None => Panel::empty(format!("No abnormal returns for {}", last.key)),
            },
            None => Panel::empty(format!("No joined events for {}", ticker)),
        };

        let scatter = match &ticker_view {
            Some(view) => Panel::Ready(view.surprise_scatter()),
            None => Panel::from_result(Err(EventStudyError::unknown("ticker", ticker))),
        };

        let ranking = Panel::from_result(self.ranking(&universe));

        let forecast = match self.forecast(&universe, selection) {
            Ok((panel, fit_warning)) => {
                if let Some(detail) = fit_warning {
                    warnings.push(DashboardWarning::InsufficientRegressionData {
                        window: window.name().to_string(),
                        detail,
                    });
                }
                panel
            }
            Err(err) => Panel::from_result(Err(err)),
        };

        for warning in &warnings {
            warn!(%warning, "dashboard warning");
        }

        DashboardViews {
            selection: selection.clone(),
            summary,
            ranking,
            history,
            ar_curve: ar_curve_panel,
            scatter,
            forecast,
            join_report: universe.report().clone(),
            warnings,
        }
    }

    fn ranking(&self, cross_section: &EventView) -> Result<Ranking> {
        match self.config.ranking_mode {
            RankingMode::Ticker => Ok(Ranking::Tickers(rank_by_ticker(cross_section))),
            RankingMode::SurpriseDecile => Ok(Ranking::Deciles(rank_by_surprise_decile(cross_section)?)),
            RankingMode::Precomputed => {
                let records = self.tables.ranking().ok_or_else(|| {
                    EventStudyError::DataError("No precomputed ranking table was loaded".to_string())
                })?;
                Ok(Ranking::Tickers(rank_precomputed(records)))
            }
        }
    }

    fn forecast(
        &self,
        training: &EventView,
        selection: &Selection,
    ) -> Result<(Panel<CarForecast>, Option<InsufficientRegressionData>)> {
        let (forecaster, fit_warning) =
            build_forecaster(self.config.forecast_mode, &self.tables, training, self.config.confidence_level)?;

        let Some(label) = &selection.upcoming else {
            return Ok((Panel::empty("No upcoming event selected"), fit_warning));
        };

        let panel = match self.find_upcoming(label) {
            Ok(event) => Panel::Ready(forecaster.predict(event)?),
            Err(err) => Panel::from_result(Err(err)),
        };
        Ok((panel, fit_warning))
    }

    fn find_upcoming(&self, label: &str) -> Result<&UpcomingEvent> {
        let key: EventKey = label
            .parse()
            .map_err(|_| EventStudyError::unknown("upcoming event", label))?;
        self.tables
            .upcoming()
            .iter()
            .find(|e| e.key == key)
            .ok_or_else(|| EventStudyError::unknown("upcoming event", label))
    }
}

fn load_warnings(report: &LoadReport) -> Vec<DashboardWarning> {
    let mut warnings = Vec::new();
    let tables = [
        ("events", &report.events),
        ("metadata", &report.metadata),
        ("ar", &report.ar),
        ("upcoming", &report.upcoming),
    ];
    for (table, counts) in tables {
        if counts.duplicates > 0 {
            warnings.push(DashboardWarning::DuplicateEventKey {
                table: table.to_string(),
                count: counts.duplicates,
            });
        }
        if counts.skipped > 0 {
            warnings.push(DashboardWarning::UnparseableRows {
                table: table.to_string(),
                count: counts.skipped,
            });
        }
        if counts.coerced > 0 {
            warnings.push(DashboardWarning::InvalidSurprise {
                table: table.to_string(),
                count: counts.coerced,
            });
        }
    }
    for file in &report.missing_tables {
        warnings.push(DashboardWarning::MissingTable { file: file.clone() });
    }
    warnings
}

fn join_warnings(report: &JoinReport) -> Vec<DashboardWarning> {
    let mut warnings = Vec::new();
    if !report.missing_metadata.is_empty() {
        warnings.push(DashboardWarning::MissingJoinKey {
            table: "metadata".to_string(),
            count: report.missing_metadata.len(),
        });
    }
    if !report.missing_ar.is_empty() {
        warnings.push(DashboardWarning::MissingJoinKey {
            table: "ar".to_string(),
            count: report.missing_ar.len(),
        });
    }
    let orphans = report.orphans();
    if orphans > 0 {
        warnings.push(DashboardWarning::MissingJoinKey {
            table: "events".to_string(),
            count: orphans,
        });
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ArVector, MetadataRecord};
    use chrono::NaiveDate;

    fn key(ticker: &str, month: u32) -> EventKey {
        EventKey::resolve(ticker, NaiveDate::from_ymd_opt(2023, month, 10).unwrap()).unwrap()
    }

    fn study() -> EventStudy {
        let events = vec![key("AAA", 1), key("AAA", 4), key("BBB", 2)];
        let metadata = vec![
            MetadataRecord::new(key("AAA", 1), Some(-0.02)),
            MetadataRecord::new(key("AAA", 4), Some(0.05)),
            MetadataRecord::new(key("BBB", 2), Some(0.0)),
        ];
        let ar = vec![
            (key("AAA", 1), ArVector::from_slice(-5, &[0.0, 0.0, 0.0, 0.0, -0.01, -0.01, 0.0, 0.0, 0.0, 0.0, 0.0])),
            (key("AAA", 4), ArVector::from_slice(-5, &[0.0, 0.0, 0.0, 0.0, 0.01, 0.02, 0.0, 0.0, 0.0, 0.0, 0.0])),
            (key("BBB", 2), ArVector::from_slice(-5, &[0.0; 11])),
        ];
        let upcoming = vec![UpcomingEvent::with_surprise(
            EventKey::resolve("AAA", NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()).unwrap(),
            Some(0.03),
        )];
        let tables = EventTables::new(events, metadata, ar).with_upcoming(upcoming);
        EventStudy::new(tables, DashboardConfig::default()).unwrap()
    }

    #[test]
    fn test_default_selection() {
        let study = study();
        let selection = study.default_selection();
        assert_eq!(selection.ticker, "AAA");
        assert_eq!(selection.window, "CAR(0,0)");
        assert_eq!(selection.upcoming.as_deref(), Some("AAA | 2024-01-10"));
    }

    #[test]
    fn test_render_known_selection() {
        let study = study();
        let views = study.render(&Selection::new("AAA", "CAR(-1,+1)").with_upcoming("AAA | 2024-01-10"));

        let summary = views.summary.ready().unwrap();
        assert_eq!(summary.last_event, Some(key("AAA", 4)));
        assert_eq!(summary.events, 2);
        assert!(views.ranking.is_ready());
        assert_eq!(views.history.ready().unwrap().rows.len(), 2);
        assert_eq!(views.ar_curve.ready().unwrap().points.len(), 3);
        assert_eq!(views.scatter.ready().unwrap().len(), 2);
        assert!(views.forecast.ready().unwrap().predicted_car.is_some());
        assert_eq!(views.join_report.joined, 3);
        assert!(views.warnings.is_empty());
    }

    #[test]
    fn test_unknown_selections_are_empty_states() {
        let study = study();

        let views = study.render(&Selection::new("ZZZ", "CAR(0,0)").with_upcoming("ZZZ | 2030-01-01"));
        assert!(!views.summary.is_ready());
        assert!(!views.history.is_ready());
        assert!(!views.forecast.is_ready());
        assert!(views.ranking.is_ready());

        let views = study.render(&Selection::new("AAA", "CAR(-9,+9)"));
        assert!(matches!(&views.summary, Panel::Empty { message } if message.contains("CAR(-9,+9)")));
        assert!(views.history.is_ready());
    }

    #[test]
    fn test_rows_without_event_are_warned() {
        let events = vec![key("AAA", 1)];
        let others = [key("AAA", 1), key("AAA", 2), key("ZZZ", 3)];
        let tables = EventTables::new(
            events,
            others.iter().map(|k| MetadataRecord::new(k.clone(), Some(0.01))).collect(),
            others.iter().map(|k| (k.clone(), ArVector::from_slice(0, &[0.01]))).collect(),
        );
        let study = EventStudy::new(tables, DashboardConfig::default()).unwrap();

        let views = study.render(&Selection::new("AAA", "CAR(0,0)"));

        assert_eq!(views.join_report.orphan_metadata.len(), 2);
        assert_eq!(views.join_report.orphan_ar.len(), 2);
        assert!(views.warnings.contains(&DashboardWarning::MissingJoinKey {
            table: "events".to_string(),
            count: 2,
        }));
    }

    #[test]
    fn test_selection_ticker_is_trimmed() {
        let study = study();
        let views = study.render(&Selection::new(" AAA ", "CAR(0,0)"));

        assert_eq!(views.summary.ready().unwrap().ticker, "AAA");
        assert!(views.history.is_ready());
        assert!(views.ar_curve.is_ready());
    }

    #[test]
    fn test_overflowing_car_is_left_out_of_the_fit() {
        let events = vec![key("AAA", 1), key("AAA", 4), key("BBB", 2)];
        let metadata = vec![
            MetadataRecord::new(key("AAA", 1), Some(0.1)),
            MetadataRecord::new(key("AAA", 4), Some(0.05)),
            MetadataRecord::new(key("BBB", 2), Some(0.0)),
        ];
        let ar = vec![
            (key("AAA", 1), ArVector::from_slice(-1, &[1e308, 1e308, 0.0])),
            (key("AAA", 4), ArVector::from_slice(-1, &[0.0, 0.03, 0.0])),
            (key("BBB", 2), ArVector::from_slice(-1, &[0.0, 0.0, 0.0])),
        ];
        let upcoming = vec![UpcomingEvent::with_surprise(key("AAA", 10), Some(0.02))];
        let tables = EventTables::new(events, metadata, ar).with_upcoming(upcoming);
        let study = EventStudy::new(tables, DashboardConfig::default()).unwrap();

        let views = study.render(&Selection::new("AAA", "CAR(-1,+1)").with_upcoming("AAA | 2023-10-10"));

        let forecast = views.forecast.ready().unwrap();
        assert!(forecast.predicted_car.unwrap().is_finite());
        assert!(views.ranking.is_ready());
    }
}
