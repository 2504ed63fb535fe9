//! CAR windows and their aggregation from abnormal returns

use crate::data::ArTable;
use crate::error::{EventStudyError, Result};
use crate::event::EventKey;
use car_math::stats::sum_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

/// A named set of relative trading-day offsets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarWindow {
    name: String,
    offsets: Vec<i32>,
}

impl CarWindow {
    /// Window over an arbitrary set of offsets. Offsets are sorted and
    /// deduplicated; an empty set is rejected.
    pub fn custom<I>(name: &str, offsets: I) -> Result<Self>
    where
        I: IntoIterator<Item = i32>,
    {
        let offsets: Vec<i32> = offsets.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if offsets.is_empty() {
            return Err(EventStudyError::InvalidParameter(format!(
                "CAR window '{}' has no offsets",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            offsets,
        })
    }

    /// Contiguous window `[start, end]`, named like `CAR(-1,+1)`
    pub fn span(start: i32, end: i32) -> Result<Self> {
        if start > end {
            return Err(EventStudyError::InvalidParameter(format!(
                "CAR window start {} is after end {}",
                start, end
            )));
        }
        Self::custom(&span_name(start, end), start..=end)
    }

    /// `CAR(0,0)`: announcement day only
    pub fn announcement_day() -> Self {
        Self::fixed(0, 0)
    }

    /// `CAR(-1,+1)`: three days around the announcement
    pub fn three_day() -> Self {
        Self::fixed(-1, 1)
    }

    /// `CAR(-5,+5)`: eleven days around the announcement
    pub fn eleven_day() -> Self {
        Self::fixed(-5, 5)
    }

    /// The three standard windows in display order
    pub fn standard() -> Vec<Self> {
        vec![Self::announcement_day(), Self::three_day(), Self::eleven_day()]
    }

    /// Resolve a window by name among `windows`
    pub fn find<'a>(windows: &'a [CarWindow], name: &str) -> Result<&'a CarWindow> {
        let wanted = name.trim();
        windows
            .iter()
            .find(|w| w.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EventStudyError::unknown("CAR window", wanted))
    }

    fn fixed(start: i32, end: i32) -> Self {
        Self {
            name: span_name(start, end),
            offsets: (start..=end).collect(),
        }
    }

    /// Window name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offsets in ascending order
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    /// Number of offsets
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Always false: windows are never empty
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl fmt::Display for CarWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn span_name(start: i32, end: i32) -> String {
    let end = if end > 0 {
        format!("+{}", end)
    } else {
        end.to_string()
    };
    format!("CAR({},{})", start, end)
}

/// One CAR value per AR row for a single window
#[derive(Debug, Clone)]
pub struct CarSeries {
    window: CarWindow,
    values: HashMap<EventKey, Option<f64>>,
}

impl CarSeries {
    /// The window this series was computed for
    pub fn window(&self) -> &CarWindow {
        &self.window
    }

    /// `None` when the event has no AR row, `Some(None)` when the row lacks
    /// one of the window's offsets
    pub fn get(&self, key: &EventKey) -> Option<Option<f64>> {
        self.values.get(key).copied()
    }

    /// Number of events in the series
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no events
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(event, car)` pairs (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, Option<f64>)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }
}

/// Sum each event's abnormal returns over the window's offsets.
///
/// An event missing any of the offsets gets a missing CAR, never zero.
pub fn aggregate(ar: &ArTable, window: &CarWindow) -> CarSeries {
    let values: HashMap<EventKey, Option<f64>> = ar
        .iter()
        .map(|(key, vector)| {
            let car = sum_all(window.offsets().iter().map(|&offset| vector.get(offset)));
            (key.clone(), car)
        })
        .collect();

    let missing = values.values().filter(|v| v.is_none()).count();
    debug!(window = %window, events = values.len(), missing, "aggregated CAR series");

    CarSeries {
        window: window.clone(),
        values,
    }
}

/// One series per window, in the order given
pub fn aggregate_all(ar: &ArTable, windows: &[CarWindow]) -> Vec<CarSeries> {
    windows.iter().map(|window| aggregate(ar, window)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ArVector;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn key(ticker: &str, day: u32) -> EventKey {
        EventKey::resolve(ticker, NaiveDate::from_ymd_opt(2023, 1, day).unwrap()).unwrap()
    }

    #[rstest]
    #[case(0, 0, "CAR(0,0)")]
    #[case(-1, 1, "CAR(-1,+1)")]
    #[case(-5, 5, "CAR(-5,+5)")]
    #[case(-3, -1, "CAR(-3,-1)")]
    fn test_span_names(#[case] start: i32, #[case] end: i32, #[case] name: &str) {
        let window = CarWindow::span(start, end).unwrap();
        assert_eq!(window.name(), name);
        assert_eq!(window.len(), (end - start + 1) as usize);
    }

    #[test]
    fn test_standard_windows() {
        let names: Vec<String> = CarWindow::standard().iter().map(|w| w.name().to_string()).collect();
        assert_eq!(names, vec!["CAR(0,0)", "CAR(-1,+1)", "CAR(-5,+5)"]);
        assert_eq!(CarWindow::eleven_day().offsets(), &(-5..=5).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_invalid_windows() {
        assert!(CarWindow::span(2, 1).is_err());
        assert!(CarWindow::custom("empty", Vec::new()).is_err());
    }

    #[test]
    fn test_custom_window_sorted() {
        let window = CarWindow::custom("pre and post", vec![2, -2, 2, 0]).unwrap();
        assert_eq!(window.offsets(), &[-2, 0, 2]);
    }

    #[test]
    fn test_find_window() {
        let windows = CarWindow::standard();
        assert_eq!(CarWindow::find(&windows, "car(-1,+1)").unwrap(), &CarWindow::three_day());
        assert!(matches!(
            CarWindow::find(&windows, "CAR(-2,+2)"),
            Err(EventStudyError::UnknownSelection { .. })
        ));
    }

    #[test]
    fn test_aggregate_sums_window() {
        let ars: Vec<f64> = (-5..=5).map(|d| d as f64 * 0.001 + 0.002).collect();
        let (ar, _) = ArTable::from_rows(vec![(key("AAA", 2), ArVector::from_slice(-5, &ars))]);

        let day0 = aggregate(&ar, &CarWindow::announcement_day());
        let three = aggregate(&ar, &CarWindow::three_day());
        let eleven = aggregate(&ar, &CarWindow::eleven_day());

        assert_eq!(day0.get(&key("AAA", 2)), Some(Some(ars[5])));
        assert_relative_eq!(three.get(&key("AAA", 2)).unwrap().unwrap(), ars[4] + ars[5] + ars[6], epsilon = 1e-15);
        assert_relative_eq!(eleven.get(&key("AAA", 2)).unwrap().unwrap(), ars.iter().sum::<f64>(), epsilon = 1e-15);
    }

    #[test]
    fn test_aggregate_propagates_missing_offsets() {
        let partial = ArVector::from_pairs(vec![(-1, Some(0.01)), (0, Some(0.02)), (1, Some(0.03))]);
        let (ar, _) = ArTable::from_rows(vec![(key("AAA", 2), partial)]);

        let series = aggregate_all(&ar, &CarWindow::standard());

        assert_eq!(series[0].get(&key("AAA", 2)), Some(Some(0.02)));
        assert!(series[1].get(&key("AAA", 2)).unwrap().is_some());
        assert_eq!(series[2].get(&key("AAA", 2)), Some(None));
        assert_eq!(series[2].get(&key("BBB", 2)), None);
    }
}
