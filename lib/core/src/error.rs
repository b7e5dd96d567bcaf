use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{component} used before fit")]
    NotFitted { component: String },

    #[error("Cannot encode field '{field}': {reason}")]
    Encoding { field: String, reason: String },

    #[error("Embedding store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Case already exists: {0}")]
    DuplicateCase(String),

    #[error("Fit failed: {0}")]
    Fit(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn not_fitted(component: impl Into<String>) -> Self {
        Error::NotFitted { component: component.into() }
    }

    pub fn encoding(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Encoding {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Only store outages are worth retrying without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
