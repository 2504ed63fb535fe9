//! Terminal rendering and CSV export of dashboard views

use crate::dashboard::{DashboardViews, HistoryTable, Panel};
use crate::error::Result;
use crate::forecast::CarForecast;
use crate::ranking::Ranking;
use crate::utils::format_pct;
use crate::view::{ArCurve, TickerSummary};
use std::fmt;
use std::io::Write;

impl fmt::Display for TickerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} summary ({}):", self.ticker, self.window)?;
        writeln!(f, "  Average CAR:    {}", format_pct(self.average_car, 2))?;
        match &self.last_event {
            Some(key) => writeln!(f, "  Last event:     {}", key.date())?,
            None => writeln!(f, "  Last event:     n/a")?,
        }
        writeln!(f, "  Last surprise:  {}", format_pct(self.last_surprise, 2))?;
        writeln!(f, "  Last CAR:       {}", format_pct(self.last_car, 2))?;
        writeln!(f, "  Events:         {} ({} joined)", self.events, self.joined)?;
        Ok(())
    }
}

impl fmt::Display for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ranking::Tickers(ranking) => {
                writeln!(f, "Ticker ranking by mean CAR:")?;
                for (position, rank) in ranking.ranks.iter().enumerate() {
                    writeln!(
                        f,
                        "  {:>3}. {:<8} {:>9}  ({} events)",
                        position + 1,
                        rank.ticker,
                        format_pct(Some(rank.mean_car), 2),
                        rank.events
                    )?;
                }
                if !ranking.excluded.is_empty() {
                    writeln!(f, "  No CAR data: {}", ranking.excluded.join(", "))?;
                }
            }
            Ranking::Deciles(deciles) => {
                writeln!(f, "Mean CAR by surprise decile:")?;
                for decile in deciles {
                    writeln!(
                        f,
                        "  D{:<2} surprise {:>9}  CAR {:>9}  ({} events)",
                        decile.decile,
                        format_pct(Some(decile.mean_surprise), 2),
                        format_pct(decile.mean_car, 2),
                        decile.events
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for HistoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {:<12} {:>10}", "Date", "Surprise")?;
        for window in &self.windows {
            write!(f, " {:>12}", window)?;
        }
        writeln!(f)?;
        for row in &self.rows {
            write!(f, "  {:<12} {:>10}", row.date().to_string(), format_pct(row.surprise, 2))?;
            for car in &row.cars {
                write!(f, " {:>12}", format_pct(*car, 2))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for ArCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Abnormal returns for {} over {}:", self.event, self.window)?;
        for point in &self.points {
            writeln!(f, "  day {:>+3}: {:>9}", point.day, format_pct(point.ar, 2))?;
        }
        Ok(())
    }
}

impl fmt::Display for CarForecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forecast for {} ({}):", self.event, self.mode)?;
        writeln!(f, "  Surprise:       {}", format_pct(self.surprise, 2))?;
        writeln!(f, "  Predicted CAR:  {}", format_pct(self.predicted_car, 2))?;
        match &self.interval {
            Some(ci) => {
                let level = ci
                    .level
                    .map(|l| format!("{:.0}% ", l * 100.0))
                    .unwrap_or_default();
                writeln!(
                    f,
                    "  {}interval:  [{}, {}]",
                    level,
                    format_pct(Some(ci.lower), 2),
                    format_pct(Some(ci.upper), 2)
                )?;
            }
            None => writeln!(f, "  Interval:       n/a")?,
        }
        Ok(())
    }
}

impl<T: fmt::Display> fmt::Display for Panel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Panel::Ready(value) => write!(f, "{}", value),
            Panel::Empty { message } => writeln!(f, "  ({})", message),
        }
    }
}

impl fmt::Display for DashboardViews {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} / {} ==", self.selection.ticker, self.selection.window)?;
        write!(f, "{}", self.summary)?;
        writeln!(f)?;
        writeln!(f, "Latest events:")?;
        write!(f, "{}", self.history)?;
        writeln!(f)?;
        write!(f, "{}", self.ar_curve)?;
        writeln!(f)?;
        match &self.scatter {
            Panel::Ready(points) => writeln!(f, "Surprise vs CAR: {} points", points.len())?,
            Panel::Empty { message } => writeln!(f, "Surprise vs CAR: ({})", message)?,
        }
        writeln!(f)?;
        write!(f, "{}", self.ranking)?;
        writeln!(f)?;
        write!(f, "{}", self.forecast)?;
        writeln!(
            f,
            "\n{} events, {} joined",
            self.join_report.events, self.join_report.joined
        )?;
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  - {}", warning)?;
            }
        }
        Ok(())
    }
}

/// Write the history table as CSV: one row per event, CARs as fractions.
/// Missing values are written as empty cells.
pub fn write_history_csv<W: Write>(history: &HistoryTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["Ticker".to_string(), "Ann Date".to_string(), "Surprise".to_string()];
    header.extend(history.windows.iter().cloned());
    csv_writer.write_record(&header)?;

    for row in &history.rows {
        let mut record = vec![row.ticker().to_string(), row.date().to_string(), cell(row.surprise)];
        record.extend(row.cars.iter().map(|car| cell(*car)));
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKey;
    use crate::forecast::{ConfidenceInterval, ForecastMode};
    use crate::view::EventRow;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn key(ticker: &str, day: u32) -> EventKey {
        EventKey::resolve(ticker, NaiveDate::from_ymd_opt(2023, 5, day).unwrap()).unwrap()
    }

    fn history() -> HistoryTable {
        HistoryTable {
            windows: vec!["CAR(0,0)".to_string(), "CAR(-1,+1)".to_string()],
            rows: vec![
                EventRow {
                    key: key("AAA", 20),
                    surprise: Some(0.05),
                    cars: vec![Some(0.01), None],
                    source_row: 1,
                },
                EventRow {
                    key: key("AAA", 2),
                    surprise: None,
                    cars: vec![Some(-0.5), Some(0.25)],
                    source_row: 0,
                },
            ],
        }
    }

    #[test]
    fn test_write_history_csv() {
        let mut buffer = Vec::new();
        write_history_csv(&history(), &mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "Ticker,Ann Date,Surprise,\"CAR(0,0)\",\"CAR(-1,+1)\"\n\
             AAA,2023-05-20,0.05,0.01,\n\
             AAA,2023-05-02,,-0.5,0.25\n"
        );
    }

    #[test]
    fn test_history_display_has_one_line_per_row() {
        let rendered = history().to_string();
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("n/a"));
        assert!(rendered.contains("-50.00%"));
    }

    #[test]
    fn test_forecast_display() {
        let forecast = CarForecast {
            event: key("AAA", 20),
            surprise: Some(0.02),
            predicted_car: Some(0.011),
            interval: Some(ConfidenceInterval {
                lower: -0.01,
                upper: 0.032,
                level: Some(0.95),
            }),
            mode: ForecastMode::Regression,
        };

        let rendered = forecast.to_string();
        assert!(rendered.contains("AAA | 2023-05-20"));
        assert!(rendered.contains("1.10%"));
        assert!(rendered.contains("95% interval:  [-1.00%, 3.20%]"));
    }
}
