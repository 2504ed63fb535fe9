//! Error types for the event_study crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the event_study crate
#[derive(Debug, Error)]
pub enum EventStudyError {
    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// A required column could not be found in an input table
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A date cell that matches none of the accepted formats
    #[error("Invalid date: '{0}'")]
    InvalidDate(String),

    /// A ticker, window or event that is not present in the loaded data
    #[error("Unknown {kind}: {value}")]
    UnknownSelection { kind: String, value: String },

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from the numeric kernels
    #[error("Math error: {0}")]
    MathError(#[from] car_math::MathError),

    /// Error from a statistical distribution
    #[error("Statistics error: {0}")]
    StatisticsError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error writing CSV output
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error reading configuration or writing JSON output
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl EventStudyError {
    /// Shorthand for an [`EventStudyError::UnknownSelection`]
    pub fn unknown(kind: &str, value: impl Into<String>) -> Self {
        EventStudyError::UnknownSelection {
            kind: kind.to_string(),
            value: value.into(),
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, EventStudyError>;

impl From<PolarsError> for EventStudyError {
    fn from(err: PolarsError) -> Self {
        EventStudyError::PolarsError(err.to_string())
    }
}
