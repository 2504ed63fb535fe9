//! # Earnings Event Study
//!
//! `earnings_event_study` bundles the workspace crates:
//!
//! - [`car_math`]: missing-aware sums and means, equal-count quantile bins
//!   and the single-factor OLS fit
//! - [`event_study`]: event tables, CAR windows, joined views, rankings,
//!   forecasts and the dashboard renderer
//!
//! ## Example
//!
//! ```
//! use earnings_event_study::event_study::{DashboardConfig, EventStudy, Selection};
//! use earnings_event_study::event_study::demo::SyntheticMarket;
//!
//! let tables = SyntheticMarket::default().generate().unwrap();
//! let study = EventStudy::new(tables, DashboardConfig::default()).unwrap();
//!
//! let views = study.render(&Selection::new("MSFT", "CAR(0,0)"));
//! assert!(views.summary.is_ready());
//! assert_eq!(views.join_report.excluded(), 0);
//! ```

pub use car_math;
pub use event_study;

/// Mean CAR of every ticker for one window, highest first.
///
/// # Examples
///
/// ```
/// use earnings_event_study::mean_car_by_ticker;
/// use earnings_event_study::event_study::demo::SyntheticMarket;
/// use earnings_event_study::event_study::CarWindow;
///
/// let tables = SyntheticMarket::default().generate().unwrap();
/// let ranks = mean_car_by_ticker(&tables, &CarWindow::three_day());
/// assert_eq!(ranks.len(), 6);
/// assert!(ranks.windows(2).all(|w| w[0].1 >= w[1].1));
/// ```
pub fn mean_car_by_ticker(
    tables: &event_study::EventTables,
    window: &event_study::CarWindow,
) -> Vec<(String, f64)> {
    let series = [event_study::window::aggregate(tables.ar(), window)];
    let view = event_study::view::cross_section(tables, &series);
    event_study::ranking::rank_by_ticker(&view)
        .ranks
        .into_iter()
        .map(|rank| (rank.ticker, rank.mean_car))
        .collect()
}
