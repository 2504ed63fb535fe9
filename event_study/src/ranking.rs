//! Cross-sectional rankings of CAR

use crate::error::Result;
use crate::event::RankingRecord;
use crate::view::EventView;
use car_math::stats::{mean, mean_present, quantile_bins};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Number of surprise bins in decile mode
pub const DECILES: usize = 10;

/// How the ranking panel groups events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Mean CAR per ticker
    #[default]
    Ticker,
    /// Mean CAR per surprise decile
    SurpriseDecile,
    /// Ranking table loaded from disk
    Precomputed,
}

impl FromStr for RankingMode {
    type Err = crate::error::EventStudyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ticker" => Ok(Self::Ticker),
            "surprise_decile" | "decile" => Ok(Self::SurpriseDecile),
            "precomputed" => Ok(Self::Precomputed),
            other => Err(crate::error::EventStudyError::InvalidParameter(format!(
                "Unknown ranking mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingMode::Ticker => write!(f, "ticker"),
            RankingMode::SurpriseDecile => write!(f, "surprise_decile"),
            RankingMode::Precomputed => write!(f, "precomputed"),
        }
    }
}

/// Mean CAR of one ticker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerRank {
    pub ticker: String,
    pub mean_car: f64,
    /// Events that contributed a CAR
    pub events: usize,
}

/// Tickers sorted by mean CAR, highest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickerRanking {
    pub ranks: Vec<TickerRank>,
    /// Tickers with no non-missing CAR
    pub excluded: Vec<String>,
}

/// Mean CAR of one surprise decile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecileRank {
    /// 1 = lowest surprises, 10 = highest
    pub decile: usize,
    pub mean_surprise: f64,
    /// `None` when every CAR in the decile is missing
    pub mean_car: Option<f64>,
    pub events: usize,
}

/// Result of the ranking panel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "rows", rename_all = "snake_case")]
pub enum Ranking {
    Tickers(TickerRanking),
    Deciles(Vec<DecileRank>),
}

/// Group the view's rows by ticker and average the primary CAR.
///
/// Missing CARs are left out of the mean.
pub fn rank_by_ticker(view: &EventView) -> TickerRanking {
    let mut groups: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for row in view.rows() {
        groups.entry(row.ticker()).or_default().push(row.car());
    }

    let mut ranking = TickerRanking::default();
    for (ticker, cars) in groups {
        match mean_present(cars.iter().copied()) {
            Some(mean_car) => ranking.ranks.push(TickerRank {
                ticker: ticker.to_string(),
                mean_car,
                events: cars.iter().flatten().count(),
            }),
            None => ranking.excluded.push(ticker.to_string()),
        }
    }

    sort_descending(&mut ranking.ranks);
    debug!(tickers = ranking.ranks.len(), excluded = ranking.excluded.len(), "ranked tickers");
    ranking
}

/// Bin the view's events into equal-count surprise deciles and average the
/// primary CAR per decile.
///
/// Bins are recomputed from the surprises in `view` on every call; events
/// with a missing surprise take no part. Empty deciles (fewer than ten
/// events) are omitted. Output is ordered by decile.
pub fn rank_by_surprise_decile(view: &EventView) -> Result<Vec<DecileRank>> {
    let rows: Vec<(f64, Option<f64>)> = view
        .rows()
        .iter()
        .filter_map(|row| Some((row.surprise?, row.car())))
        .collect();

    let surprises: Vec<f64> = rows.iter().map(|(s, _)| *s).collect();
    let labels = quantile_bins(&surprises, DECILES)?;

    let mut groups: BTreeMap<usize, (Vec<f64>, Vec<Option<f64>>)> = BTreeMap::new();
    for ((surprise, car), decile) in rows.into_iter().zip(labels) {
        let group = groups.entry(decile).or_default();
        group.0.push(surprise);
        group.1.push(car);
    }

    Ok(groups
        .into_iter()
        .filter_map(|(decile, (surprises, cars))| {
            Some(DecileRank {
                decile,
                mean_surprise: mean(&surprises)?,
                mean_car: mean_present(cars.iter().copied()),
                events: surprises.len(),
            })
        })
        .collect())
}

/// Pass a precomputed ranking table through, re-sorted highest first
pub fn rank_precomputed(records: &[RankingRecord]) -> TickerRanking {
    let mut ranking = TickerRanking::default();
    for record in records {
        match record.mean_car {
            Some(mean_car) => ranking.ranks.push(TickerRank {
                ticker: record.ticker.clone(),
                mean_car,
                events: 0,
            }),
            None => ranking.excluded.push(record.ticker.clone()),
        }
    }
    sort_descending(&mut ranking.ranks);
    ranking
}

fn sort_descending(ranks: &mut [TickerRank]) {
    ranks.sort_by(|a, b| b.mean_car.total_cmp(&a.mean_car).then_with(|| a.ticker.cmp(&b.ticker)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EventTables;
    use crate::event::{ArVector, EventKey, MetadataRecord};
    use crate::view::EventViewBuilder;
    use crate::window::{aggregate_all, CarWindow};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn key(ticker: &str, day: u32) -> EventKey {
        EventKey::resolve(ticker, NaiveDate::from_ymd_opt(2023, 3, day).unwrap()).unwrap()
    }

    /// Events with (ticker, surprise, AR at day 0); `None` AR leaves the day out
    fn tables(rows: &[(&str, u32, Option<f64>, Option<f64>)]) -> EventTables {
        EventTables::new(
            rows.iter().map(|(t, d, _, _)| key(t, *d)).collect(),
            rows.iter().map(|(t, d, s, _)| MetadataRecord::new(key(t, *d), *s)).collect(),
            rows.iter()
                .map(|(t, d, _, ar)| (key(t, *d), ArVector::from_pairs(vec![(0, *ar)])))
                .collect(),
        )
    }

    #[test]
    fn test_rank_by_ticker() {
        let tables = tables(&[
            ("AAA", 1, Some(0.1), Some(0.01)),
            ("AAA", 2, Some(0.1), Some(-0.02)),
            ("AAA", 3, Some(0.1), Some(0.03)),
            ("BBB", 1, Some(0.1), Some(0.05)),
            ("CCC", 1, Some(0.1), Some(-0.01)),
            ("CCC", 2, Some(0.1), None),
            ("DDD", 1, Some(0.1), None),
        ]);
        let series = aggregate_all(tables.ar(), &[CarWindow::announcement_day()]);
        let view = EventViewBuilder::new(&tables, &series).build();

        let ranking = rank_by_ticker(&view);

        let order: Vec<&str> = ranking.ranks.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["BBB", "AAA", "CCC"]);
        // a single event ranks at exactly its own CAR
        assert_eq!(ranking.ranks[0].mean_car, 0.05);
        assert_relative_eq!(ranking.ranks[1].mean_car, 0.02 / 3.0, epsilon = 1e-5);
        // the missing CAR is excluded, not counted as zero
        assert_eq!(ranking.ranks[2].mean_car, -0.01);
        assert_eq!(ranking.ranks[2].events, 1);
        assert_eq!(ranking.excluded, vec!["DDD".to_string()]);
    }

    #[test]
    fn test_rank_by_surprise_decile() {
        let rows: Vec<(String, u32, Option<f64>, Option<f64>)> = (1..=25)
            .map(|d| {
                let surprise = ((d * 7) % 25) as f64 / 100.0 - 0.1;
                (format!("T{}", d), d, Some(surprise), Some(surprise / 2.0))
            })
            .collect();
        let borrowed: Vec<(&str, u32, Option<f64>, Option<f64>)> =
            rows.iter().map(|(t, d, s, a)| (t.as_str(), *d, *s, *a)).collect();
        let tables = tables(&borrowed);
        let series = aggregate_all(tables.ar(), &[CarWindow::announcement_day()]);
        let view = EventViewBuilder::new(&tables, &series).build();

        let deciles = rank_by_surprise_decile(&view).unwrap();

        assert_eq!(deciles.len(), 10);
        assert_eq!(deciles.iter().map(|d| d.events).sum::<usize>(), 25);
        assert!(deciles.iter().all(|d| d.events == 2 || d.events == 3));
        assert_eq!(deciles.first().unwrap().decile, 1);
        assert!(deciles[9].mean_surprise >= deciles[0].mean_surprise);
        assert!(deciles[9].mean_car.unwrap() > deciles[0].mean_car.unwrap());
    }

    #[test]
    fn test_decile_skips_missing_surprise() {
        let tables = tables(&[
            ("AAA", 1, None, Some(0.01)),
            ("AAA", 2, Some(0.02), Some(0.02)),
            ("AAA", 3, Some(-0.01), None),
        ]);
        let series = aggregate_all(tables.ar(), &[CarWindow::announcement_day()]);
        let view = EventViewBuilder::new(&tables, &series).build();

        let deciles = rank_by_surprise_decile(&view).unwrap();

        assert_eq!(deciles.len(), 2);
        assert_eq!(deciles[0].decile, 1);
        assert_eq!(deciles[0].mean_car, None);
        assert_eq!(deciles[1].decile, 6);
        assert_eq!(deciles[1].mean_car, Some(0.02));
    }

    #[test]
    fn test_rank_precomputed() {
        let ranking = rank_precomputed(&[
            RankingRecord { ticker: "AAA".to_string(), mean_car: Some(0.01) },
            RankingRecord { ticker: "BBB".to_string(), mean_car: Some(0.04) },
            RankingRecord { ticker: "CCC".to_string(), mean_car: None },
        ]);
        assert_eq!(ranking.ranks[0].ticker, "BBB");
        assert_eq!(ranking.excluded, vec!["CCC".to_string()]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("decile".parse::<RankingMode>().unwrap(), RankingMode::SurpriseDecile);
        assert_eq!("Surprise-Decile".parse::<RankingMode>().unwrap(), RankingMode::SurpriseDecile);
        assert!("sector".parse::<RankingMode>().is_err());
    }
}
