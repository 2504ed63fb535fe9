//! Forecasting the CAR of upcoming announcements
//!
//! Two interchangeable sources sit behind [`CarForecaster`]:
//!
//! - [`RegressionForecaster`] fits `CAR = γ0 + γ1 · surprise` by OLS on the
//!   historical events of the session and applies it to the upcoming
//!   event's expected surprise, with a Student-t prediction interval.
//! - [`PrecomputedForecaster`] serves predictions materialized elsewhere.

use crate::data::EventTables;
use crate::error::{EventStudyError, Result};
use crate::event::{EventKey, PrecomputedForecast, UpcomingEvent};
use crate::view::EventView;
use car_math::{MathError, OlsFit, SimpleRegression};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Default two-sided confidence level of prediction intervals
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Where CAR forecasts come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMode {
    /// Fit the surprise model in-session
    #[default]
    Regression,
    /// Use materialized predictions from the upcoming-events table
    Precomputed,
}

impl FromStr for ForecastMode {
    type Err = EventStudyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "regression" | "ols" => Ok(Self::Regression),
            "precomputed" => Ok(Self::Precomputed),
            other => Err(EventStudyError::InvalidParameter(format!(
                "Unknown forecast mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ForecastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastMode::Regression => write!(f, "regression"),
            ForecastMode::Precomputed => write!(f, "precomputed"),
        }
    }
}

/// Lower and upper bound around a predicted CAR
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Confidence level, when known
    pub level: Option<f64>,
}

/// Predicted CAR for one upcoming event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarForecast {
    pub event: EventKey,
    /// Surprise the prediction was made for (regression mode)
    pub surprise: Option<f64>,
    /// `None` when the event carries no usable input
    pub predicted_car: Option<f64>,
    pub interval: Option<ConfidenceInterval>,
    pub mode: ForecastMode,
}

/// Why the model fell back to the null model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsufficientRegressionData {
    pub observations: usize,
    pub reason: String,
}

impl fmt::Display for InsufficientRegressionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no valid CAR-on-surprise fit from {} observations ({}); using zero intercept and slope",
            self.observations, self.reason
        )
    }
}

/// Single-factor OLS model of CAR on surprise
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OlsCarModel {
    intercept: f64,
    slope: f64,
    observations: usize,
    confidence_level: f64,
    #[serde(skip)]
    fit: Option<OlsFit>,
}

/// A fitted model and, when the fit degenerated, the reason
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: OlsCarModel,
    pub warning: Option<InsufficientRegressionData>,
}

impl OlsCarModel {
    /// Model predicting zero CAR for every surprise
    pub fn null(confidence_level: f64) -> Self {
        Self {
            intercept: 0.0,
            slope: 0.0,
            observations: 0,
            confidence_level,
            fit: None,
        }
    }

    /// Fit over `(surprise, car)` pairs, skipping pairs with a missing side.
    ///
    /// An empty or zero-variance training set does not fail: the outcome
    /// holds the null model and a warning. Only an invalid confidence level
    /// is an error.
    pub fn fit<I>(pairs: I, confidence_level: f64) -> Result<FitOutcome>
    where
        I: IntoIterator<Item = (Option<f64>, Option<f64>)>,
    {
        validate_confidence_level(confidence_level)?;

        let mut regression = SimpleRegression::new();
        for (surprise, car) in pairs {
            if let (Some(x), Some(y)) = (surprise, car) {
                regression.push(x, y)?;
            }
        }
        let observations = regression.len();

        match regression.fit() {
            Ok(fit) => {
                debug!(
                    observations,
                    intercept = fit.intercept(),
                    slope = fit.slope(),
                    "fitted CAR-on-surprise model"
                );
                Ok(FitOutcome {
                    model: Self {
                        intercept: fit.intercept(),
                        slope: fit.slope(),
                        observations,
                        confidence_level,
                        fit: Some(fit),
                    },
                    warning: None,
                })
            }
            Err(MathError::InsufficientData(reason)) | Err(MathError::CalculationError(reason)) => {
                let warning = InsufficientRegressionData { observations, reason };
                warn!(%warning, "falling back to null CAR model");
                Ok(FitOutcome {
                    model: Self::null(confidence_level),
                    warning: Some(warning),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fit on the surprise and primary CAR of every row in `view`
    pub fn fit_view(view: &EventView, confidence_level: f64) -> Result<FitOutcome> {
        Self::fit(view.rows().iter().map(|row| (row.surprise, row.car())), confidence_level)
    }

    /// Intercept (γ0)
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Slope (γ1)
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Observations used by the fit
    pub fn observations(&self) -> usize {
        self.observations
    }

    /// Whether this is the fallback model
    pub fn is_null(&self) -> bool {
        self.fit.is_none()
    }

    /// Point prediction `γ0 + γ1 · surprise`
    pub fn predict(&self, surprise: f64) -> f64 {
        self.intercept + self.slope * surprise
    }

    /// Prediction interval at `surprise`; `None` for the null model or when
    /// fewer than three observations leave no residual degrees of freedom
    pub fn interval(&self, surprise: f64) -> Result<Option<ConfidenceInterval>> {
        let Some(fit) = &self.fit else {
            return Ok(None);
        };
        let std_error = match fit.prediction_std_error(surprise) {
            Ok(se) => se,
            Err(MathError::InsufficientData(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let t = t_critical(self.confidence_level, fit.degrees_of_freedom())?;
        let center = self.predict(surprise);
        Ok(Some(ConfidenceInterval {
            lower: center - t * std_error,
            upper: center + t * std_error,
            level: Some(self.confidence_level),
        }))
    }
}

fn validate_confidence_level(level: f64) -> Result<()> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(EventStudyError::InvalidParameter(format!(
            "Confidence level must be between 0 and 1, got {}",
            level
        )))
    }
}

/// Two-sided Student-t critical value
pub fn t_critical(confidence_level: f64, degrees_of_freedom: usize) -> Result<f64> {
    validate_confidence_level(confidence_level)?;
    let dist = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)
        .map_err(|e| EventStudyError::StatisticsError(e.to_string()))?;
    Ok(dist.inverse_cdf(0.5 + confidence_level / 2.0))
}

/// Predicts the CAR of a chosen upcoming event
pub trait CarForecaster: fmt::Debug {
    /// Name of the forecast source
    fn name(&self) -> &str;

    /// Mode this forecaster implements
    fn mode(&self) -> ForecastMode;

    /// Forecast for one upcoming event
    fn predict(&self, event: &UpcomingEvent) -> Result<CarForecast>;
}

/// Applies an in-session OLS fit
#[derive(Debug, Clone)]
pub struct RegressionForecaster {
    name: String,
    model: OlsCarModel,
}

impl RegressionForecaster {
    /// Wrap a fitted model
    pub fn new(model: OlsCarModel) -> Self {
        let name = if model.is_null() {
            "Null CAR model".to_string()
        } else {
            format!("OLS CAR on surprise (n={})", model.observations())
        };
        Self { name, model }
    }

    /// The underlying model
    pub fn model(&self) -> &OlsCarModel {
        &self.model
    }
}

impl CarForecaster for RegressionForecaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> ForecastMode {
        ForecastMode::Regression
    }

    fn predict(&self, event: &UpcomingEvent) -> Result<CarForecast> {
        let (predicted_car, interval) = match event.surprise {
            Some(surprise) => (Some(self.model.predict(surprise)), self.model.interval(surprise)?),
            None => (None, None),
        };

        Ok(CarForecast {
            event: event.key.clone(),
            surprise: event.surprise,
            predicted_car,
            interval,
            mode: ForecastMode::Regression,
        })
    }
}

/// Serves materialized predictions
#[derive(Debug, Clone, Default)]
pub struct PrecomputedForecaster {
    predictions: HashMap<EventKey, PrecomputedForecast>,
}

impl PrecomputedForecaster {
    /// Index the predictions carried by upcoming events
    pub fn from_upcoming(upcoming: &[UpcomingEvent]) -> Self {
        Self {
            predictions: upcoming
                .iter()
                .filter_map(|event| Some((event.key.clone(), event.precomputed?)))
                .collect(),
        }
    }

    /// Number of events with a prediction
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    /// Whether no prediction is available
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

impl CarForecaster for PrecomputedForecaster {
    fn name(&self) -> &str {
        "Precomputed forecasts"
    }

    fn mode(&self) -> ForecastMode {
        ForecastMode::Precomputed
    }

    fn predict(&self, event: &UpcomingEvent) -> Result<CarForecast> {
        let stored = self.predictions.get(&event.key);
        let interval = stored.and_then(|p| match (p.ci_lower, p.ci_upper) {
            (Some(lower), Some(upper)) => Some(ConfidenceInterval {
                lower,
                upper,
                level: None,
            }),
            _ => None,
        });

        Ok(CarForecast {
            event: event.key.clone(),
            surprise: event.surprise,
            predicted_car: stored.map(|p| p.predicted_car),
            interval,
            mode: ForecastMode::Precomputed,
        })
    }
}

/// Build the forecaster for `mode`.
///
/// In regression mode the model is fitted on `training`; the returned
/// warning is set when the fit fell back to the null model.
pub fn build_forecaster(
    mode: ForecastMode,
    tables: &EventTables,
    training: &EventView,
    confidence_level: f64,
) -> Result<(Box<dyn CarForecaster>, Option<InsufficientRegressionData>)> {
    match mode {
        ForecastMode::Regression => {
            let outcome = OlsCarModel::fit_view(training, confidence_level)?;
            Ok((Box::new(RegressionForecaster::new(outcome.model)), outcome.warning))
        }
        ForecastMode::Precomputed => Ok((
            Box::new(PrecomputedForecaster::from_upcoming(tables.upcoming())),
            None,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn upcoming(surprise: Option<f64>) -> UpcomingEvent {
        let key = EventKey::resolve("AAA", NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()).unwrap();
        UpcomingEvent::with_surprise(key, surprise)
    }

    #[test]
    fn test_fit_recovers_coefficients() {
        let pairs: Vec<(Option<f64>, Option<f64>)> = (0..30)
            .map(|i| {
                let x = -0.06 + i as f64 * 0.004;
                (Some(x), Some(0.01 + 0.5 * x))
            })
            .collect();

        let outcome = OlsCarModel::fit(pairs, 0.95).unwrap();

        assert!(outcome.warning.is_none());
        assert_relative_eq!(outcome.model.intercept(), 0.01, epsilon = 1e-12);
        assert_relative_eq!(outcome.model.slope(), 0.5, epsilon = 1e-12);
        assert_eq!(outcome.model.observations(), 30);
    }

    #[test]
    fn test_fit_skips_incomplete_pairs() {
        let outcome = OlsCarModel::fit(
            vec![
                (Some(-0.02), Some(-0.01)),
                (None, Some(0.5)),
                (Some(0.0), Some(0.0)),
                (Some(9.0), None),
                (Some(0.05), Some(0.03)),
            ],
            0.95,
        )
        .unwrap();

        assert_eq!(outcome.model.observations(), 3);
        assert!(outcome.model.slope() > 0.0);
        assert!(outcome.model.intercept().abs() < 0.002);
    }

    #[test]
    fn test_zero_variance_falls_back() {
        let outcome = OlsCarModel::fit(vec![(Some(0.01), Some(0.02)), (Some(0.01), Some(-0.03))], 0.95).unwrap();

        assert!(outcome.model.is_null());
        assert_eq!(outcome.model.intercept(), 0.0);
        assert_eq!(outcome.model.slope(), 0.0);
        let warning = outcome.warning.unwrap();
        assert_eq!(warning.observations, 2);
    }

    #[test]
    fn test_empty_training_falls_back() {
        let outcome = OlsCarModel::fit(Vec::new(), 0.95).unwrap();
        assert!(outcome.model.is_null());
        assert_eq!(outcome.warning.unwrap().observations, 0);
        assert_eq!(outcome.model.predict(0.3), 0.0);
    }

    #[test]
    fn test_invalid_confidence_level() {
        assert!(OlsCarModel::fit(Vec::new(), 1.0).is_err());
        assert!(OlsCarModel::fit(Vec::new(), 0.0).is_err());
    }

    #[test]
    fn test_t_critical() {
        assert_relative_eq!(t_critical(0.95, 10).unwrap(), 2.228, epsilon = 1e-2);
        assert_relative_eq!(t_critical(0.95, 1000).unwrap(), 1.96, epsilon = 1e-2);
    }

    #[test]
    fn test_regression_forecaster_interval() {
        let pairs = vec![
            (Some(-0.03), Some(-0.012)),
            (Some(-0.01), Some(0.001)),
            (Some(0.0), Some(-0.002)),
            (Some(0.02), Some(0.015)),
            (Some(0.04), Some(0.018)),
        ];
        let model = OlsCarModel::fit(pairs, 0.9).unwrap().model;
        let forecaster = RegressionForecaster::new(model.clone());

        let forecast = forecaster.predict(&upcoming(Some(0.01))).unwrap();

        let predicted = forecast.predicted_car.unwrap();
        assert_relative_eq!(predicted, model.predict(0.01), epsilon = 1e-15);
        let interval = forecast.interval.unwrap();
        assert!(interval.lower < predicted && predicted < interval.upper);
        assert_eq!(interval.level, Some(0.9));
        assert_eq!(forecast.mode, ForecastMode::Regression);
    }

    #[test]
    fn test_regression_forecaster_missing_surprise() {
        let forecaster = RegressionForecaster::new(OlsCarModel::null(0.95));
        let forecast = forecaster.predict(&upcoming(None)).unwrap();
        assert_eq!(forecast.predicted_car, None);
        assert_eq!(forecast.interval, None);
    }

    #[test]
    fn test_precomputed_forecaster() {
        let mut event = upcoming(None);
        event.precomputed = Some(PrecomputedForecast {
            predicted_car: 0.012,
            ci_lower: Some(-0.01),
            ci_upper: Some(0.034),
        });
        let forecaster = PrecomputedForecaster::from_upcoming(&[event.clone()]);

        let forecast = forecaster.predict(&event).unwrap();
        assert_eq!(forecast.predicted_car, Some(0.012));
        assert_eq!(
            forecast.interval,
            Some(ConfidenceInterval { lower: -0.01, upper: 0.034, level: None })
        );

        let other = EventKey::resolve("BBB", NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()).unwrap();
        let missing = forecaster
            .predict(&UpcomingEvent::with_surprise(other, Some(0.1)))
            .unwrap();
        assert_eq!(missing.predicted_car, None);
        assert_eq!(missing.interval, None);
    }
}
