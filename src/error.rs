use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Timestamp column '{0}' not found in input table")]
    MissingTimestampColumn(String),

    #[error("Metric column '{0}' not found in input table")]
    MissingMetricColumn(String),

    #[error("Category column '{0}' not found in input table")]
    MissingCategoryColumn(String),

    #[error("No numeric metric columns available for analysis")]
    NoMetricColumns,

    #[error("Row {row}: unable to parse timestamp '{value}' ({details})")]
    InvalidTimestamp {
        row: usize,
        value: String,
        details: String,
    },

    #[error("Row {row} has {found} cells but the table declares {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Configuration errors abort the whole analysis; no partial result is returned.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, AnalysisError::SerializationError(_))
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
