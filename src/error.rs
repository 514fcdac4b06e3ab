//! Error types for the Velt migration.
//!
//! Four failure classes exist. Configuration errors abort the whole run,
//! row validation errors abort one row, store rejections are caught at the
//! builder boundary and duplicate-data findings are only ever logged.
//! Only the first two (plus infrastructure failures of the staging
//! database) travel through [`MigrationError`].

use crate::config::ConfigurationError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// A mandatory reference lookup or setting is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A source row lacks a mandatory field.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// The relational staging database failed.
    #[error("Staging database error: {0}")]
    Staging(String),
    #[error("Invalid contact type: {0}")]
    InvalidContactType(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for errors that must stop the run instead of a single row
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Staging(_) | Self::InvalidContactType(_) | Self::Io(_)
        )
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Staging(err.to_string())
    }
}

impl From<ConfigurationError> for MigrationError {
    fn from(err: ConfigurationError) -> Self {
        MigrationError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
