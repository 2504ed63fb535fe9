//! # Event Study
//!
//! Earnings-announcement event study: cumulative abnormal returns (CAR)
//! around announcements, their relation to the earnings surprise, and a
//! forecast of the CAR of upcoming announcements.
//!
//! ## Features
//!
//! - Loading of the Events, Metadata, AR and optional upcoming/ranking tables
//! - CAR aggregation over fixed or custom relative-day windows
//! - Joined per-ticker and cross-sectional event views with join bookkeeping
//! - Rankings by ticker mean CAR or by surprise decile
//! - OLS forecast of CAR on surprise with a prediction interval, or
//!   precomputed forecasts
//! - A dashboard renderer that turns a selection into every view at once
//!
//! ## Quick Start
//!
//! ```rust
//! use event_study::demo::SyntheticMarket;
//! use event_study::{DashboardConfig, EventStudy, Selection};
//!
//! let tables = SyntheticMarket::default().generate()?;
//! let study = EventStudy::new(tables, DashboardConfig::default())?;
//!
//! let selection = Selection::new("AAPL", "CAR(-1,+1)").with_upcoming(&study.upcoming_events()[0]);
//! let views = study.render(&selection);
//!
//! assert!(views.summary.is_ready());
//! assert!(views.forecast.is_ready());
//! # Ok::<(), event_study::EventStudyError>(())
//! ```

pub mod config;
pub mod dashboard;
pub mod data;
pub mod demo;
pub mod error;
pub mod event;
pub mod forecast;
pub mod ranking;
pub mod report;
pub mod utils;
pub mod view;
pub mod window;

// Re-export commonly used types
pub use crate::config::DashboardConfig;
pub use crate::dashboard::{DashboardViews, DashboardWarning, EventStudy, Panel, Selection};
pub use crate::data::{DataLoader, EventTables};
pub use crate::error::{EventStudyError, Result};
pub use crate::event::{ArVector, EventKey, MetadataRecord, UpcomingEvent};
pub use crate::forecast::{CarForecast, CarForecaster, ForecastMode, OlsCarModel};
pub use crate::ranking::{Ranking, RankingMode};
pub use crate::view::{EventView, EventViewBuilder};
pub use crate::window::{CarSeries, CarWindow};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
