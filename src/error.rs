//! Unified error hierarchy for vo2lab
//!
//! Every error aborts only the operation that raised it. A rejected phase
//! submission, metrics computation or export leaves the session as it was, so
//! the caller can correct the input and try again.

use thiserror::Error;

use crate::models::Phase;

/// Top-level error type for all vo2lab operations
#[derive(Debug, Error)]
pub enum Vo2LabError {
    /// Out-of-range or mismatched input at recording time
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Metrics or export requested on an empty record list
    #[error("Empty input: {operation} requires at least one stage record")]
    EmptyInput { operation: String },

    /// Parameter outside its allowed domain
    #[error("Invalid parameter: {parameter}={value}")]
    InvalidParameter { parameter: String, value: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON/TOML serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Chart rendering errors
    #[error("Chart error: {0}")]
    Chart(String),
}

/// Field-level validation failures raised while recording a phase
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Declared stage count outside the protocol bounds
    #[error("stage count {count} outside allowed range {min}-{max}")]
    StageCountOutOfRange { count: u32, min: u8, max: u8 },

    /// A field did not supply one value per declared stage
    #[error("{phase} field '{field}' has {actual} values, expected {expected}")]
    LengthMismatch {
        phase: Phase,
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A single value violated its declared range
    #[error("{field} at stage {stage} is {value}: {reason}")]
    OutOfRange {
        field: &'static str,
        stage: u8,
        value: String,
        reason: String,
    },

    /// Derived columns do not line up with the records they describe
    #[error("derived columns cover {derived} stages but {records} records were given")]
    DerivedLengthMismatch { records: usize, derived: usize },

    /// Malformed row in a previously exported table
    #[error("row {row}: cannot read column '{column}' from '{value}'")]
    MalformedRow {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// Result type alias for vo2lab operations
pub type Result<T> = std::result::Result<T, Vo2LabError>;

impl Vo2LabError {
    pub(crate) fn empty_input(operation: impl Into<String>) -> Self {
        Vo2LabError::EmptyInput {
            operation: operation.into(),
        }
    }

    pub(crate) fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Vo2LabError::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    /// Check if the operation can be retried with corrected input
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Vo2LabError::Validation(_)
                | Vo2LabError::EmptyInput { .. }
                | Vo2LabError::InvalidParameter { .. }
                | Vo2LabError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Vo2LabError::Validation(_) => ErrorSeverity::Warning,
            Vo2LabError::EmptyInput { .. } => ErrorSeverity::Warning,
            Vo2LabError::InvalidParameter { .. } => ErrorSeverity::Warning,
            Vo2LabError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Vo2LabError::Validation(ValidationError::StageCountOutOfRange { min, max, .. }) => {
                format!("Number of stages must be between {} and {}.", min, max)
            }
            Vo2LabError::Validation(ValidationError::LengthMismatch {
                field, expected, ..
            }) => {
                format!("Please enter exactly {} values for {}.", expected, field)
            }
            Vo2LabError::Validation(ValidationError::OutOfRange {
                field,
                stage,
                reason,
                ..
            }) => {
                format!("Check {} at stage {}: {}.", field, stage, reason)
            }
            Vo2LabError::EmptyInput { operation } => {
                format!("No stages recorded yet, cannot {}.", operation)
            }
            Vo2LabError::InvalidParameter { parameter, .. } if parameter == "predicted_hr_max" => {
                "Predicted maximum heart rate must be positive. Please check the participant's age."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents operation but the session can continue
    Error,
    /// Warning that only rejects the offending submission
    Warning,
}
