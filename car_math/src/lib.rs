//! # CAR Math
//!
//! Numeric kernels used by the earnings event study.
//! This crate knows nothing about tickers or dates: it works on plain
//! slices of `f64` and `Option<f64>`, where `None` marks a missing value.
//!
//! - [`stats`]: missing-aware sums and means, equal-count quantile bins
//! - [`regression`]: single-factor ordinary least squares

use thiserror::Error;

pub mod regression;
pub mod stats;

pub use regression::{OlsFit, SimpleRegression};

/// Errors that can occur in event-study calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for event-study math operations
pub type Result<T> = std::result::Result<T, MathError>;
