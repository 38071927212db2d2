use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalesDashboardError {
    #[error("Invalid {field}: {details}")]
    Validation { field: String, details: String },

    #[error("Import is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Import contains no data rows")]
    EmptyImport,

    #[error("Import produced no valid rows ({dropped} dropped)")]
    NoValidRows { dropped: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[cfg(feature = "remote")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SalesDashboardError {
    pub(crate) fn validation(field: &str, details: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SalesDashboardError>;
