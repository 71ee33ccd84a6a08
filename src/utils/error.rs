use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Filter configuration error in {path}: {message}")]
    Filters { path: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Destination {destination_id} error: {message}")]
    Destination { destination_id: u64, message: String },

    #[error("Initialization failed: {0}")]
    FatalInit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Only initialization failures are allowed to stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::FatalInit(_) | AppError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
