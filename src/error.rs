use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvoiceIntelError {
    #[error("Invalid configuration for {section}: {details}")]
    InvalidConfig { section: String, details: String },

    #[error("Category table error: {0}")]
    CategoryTable(String),

    #[error("Insufficient history for {check}: need at least {required} records, got {available}")]
    InsufficientHistory {
        check: String,
        required: usize,
        available: usize,
    },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Non-finite statistic while computing {0}")]
    NonFiniteStatistic(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InvoiceIntelError>;
