use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid range for {context}: start {start} is after end {end}")]
    InvalidRange {
        context: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Ambiguous transition order for {issue_key}: multiple transitions at {at} without a sequence number")]
    UnorderedData { issue_key: String, at: DateTime<Utc> },

    #[error("Missing configuration: {0} is required for business-hours reports")]
    ConfigMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp: {0}")]
    TimestampParse(String),

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub(crate) fn invalid_range(
        context: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Error::InvalidRange {
            context: context.into(),
            start,
            end,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
