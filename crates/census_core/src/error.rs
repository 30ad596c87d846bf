use thiserror::Error;

#[derive(Debug, Error)]
pub enum CensusError {
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("relation error: {message}")]
    Relation { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl CensusError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn relation(message: impl Into<String>) -> Self {
        Self::Relation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::Relation { message }
            | Self::NotFound { message }
            | Self::Storage { message } => message,
        }
    }

    /// Short machine-readable kind, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Relation { .. } => "relation",
            Self::NotFound { .. } => "not_found",
            Self::Storage { .. } => "storage",
        }
    }
}

pub type CensusResult<T> = Result<T, CensusError>;

impl From<sea_orm::DbErr> for CensusError {
    fn from(value: sea_orm::DbErr) -> Self {
        CensusError::storage(value.to_string())
    }
}

impl From<serde_json::Error> for CensusError {
    fn from(value: serde_json::Error) -> Self {
        CensusError::validation(value.to_string())
    }
}
