//! Single-factor ordinary least squares
//!
//! Fits `y = intercept + slope * x` over paired observations:
//!
//! ```text
//! slope     = Σ(xi - x̄)(yi - ȳ) / Σ(xi - x̄)²
//! intercept = ȳ - slope * x̄
//! ```

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Single-factor OLS estimator
#[derive(Debug, Clone, Default)]
pub struct SimpleRegression {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

/// Coefficients and goodness-of-fit of a fitted regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    intercept: f64,
    slope: f64,
    n: usize,
    x_mean: f64,
    /// Σ(xi - x̄)²
    sxx: f64,
    /// Residual sum of squares
    ssr: f64,
    /// Total sum of squares of y
    sst: f64,
}

impl SimpleRegression {
    /// Create an empty estimator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation. Non-finite pairs are rejected.
    pub fn push(&mut self, x: f64, y: f64) -> Result<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Non-finite observation ({}, {})",
                x, y
            )));
        }
        self.xs.push(x);
        self.ys.push(y);
        Ok(())
    }

    /// Number of observations collected so far
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Whether no observations have been collected
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Fit over paired slices in one go
    pub fn fit_pairs(xs: &[f64], ys: &[f64]) -> Result<OlsFit> {
        if xs.len() != ys.len() {
            return Err(MathError::InvalidInput(format!(
                "x and y lengths differ ({} vs {})",
                xs.len(),
                ys.len()
            )));
        }

        let mut regression = Self::new();
        for (&x, &y) in xs.iter().zip(ys) {
            regression.push(x, y)?;
        }
        regression.fit()
    }

    /// Estimate the coefficients.
    ///
    /// Fails with `InsufficientData` when there are no observations and with
    /// `CalculationError` when every x is (numerically) the same.
    pub fn fit(&self) -> Result<OlsFit> {
        if self.xs.is_empty() {
            return Err(MathError::InsufficientData(
                "Regression needs at least one observation".to_string(),
            ));
        }

        let n = self.xs.len() as f64;
        let x_mean = self.xs.iter().sum::<f64>() / n;
        let y_mean = self.ys.iter().sum::<f64>() / n;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        let mut sum_sq_x = 0.0;
        for (&x, &y) in self.xs.iter().zip(&self.ys) {
            sxy += (x - x_mean) * (y - y_mean);
            sxx += (x - x_mean) * (x - x_mean);
            sum_sq_x += x * x;
        }

        // relative test: identical x values leave only rounding noise in sxx
        if !(sxx > f64::EPSILON * sum_sq_x) {
            return Err(MathError::CalculationError(
                "Cannot calculate slope: x values have zero variance".to_string(),
            ));
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        let mut ssr = 0.0;
        let mut sst = 0.0;
        for (&x, &y) in self.xs.iter().zip(&self.ys) {
            let fitted = intercept + slope * x;
            ssr += (y - fitted).powi(2);
            sst += (y - y_mean).powi(2);
        }

        Ok(OlsFit {
            intercept,
            slope,
            n: self.xs.len(),
            x_mean,
            sxx,
            ssr,
            sst,
        })
    }
}

impl OlsFit {
    /// Intercept (γ0)
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Slope (γ1)
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Number of observations the fit used
    pub fn observations(&self) -> usize {
        self.n
    }

    /// Point prediction at `x`
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Coefficient of determination
    pub fn r_squared(&self) -> Result<f64> {
        if self.sst.abs() < 1e-18 {
            return Err(MathError::CalculationError(
                "Cannot calculate R-squared: y has zero variance".to_string(),
            ));
        }
        Ok(1.0 - self.ssr / self.sst)
    }

    /// Unbiased residual variance `SSR / (n - 2)`
    pub fn residual_variance(&self) -> Result<f64> {
        if self.n < 3 {
            return Err(MathError::InsufficientData(format!(
                "Residual variance needs at least 3 observations, got {}",
                self.n
            )));
        }
        Ok(self.ssr / (self.n - 2) as f64)
    }

    /// Residual degrees of freedom
    pub fn degrees_of_freedom(&self) -> usize {
        self.n.saturating_sub(2)
    }

    /// Standard error of a new observation at `x`:
    /// `s * sqrt(1 + 1/n + (x - x̄)² / Sxx)`
    pub fn prediction_std_error(&self, x: f64) -> Result<f64> {
        let s2 = self.residual_variance()?;
        let n = self.n as f64;
        Ok((s2 * (1.0 + 1.0 / n + (x - self.x_mean).powi(2) / self.sxx)).sqrt())
    }
}
