//! Error types for supply_tracker

use std::fmt;

use crate::validation::FieldError;

/// Unified error type for store and API operations
#[derive(Debug)]
pub enum TrackerError {
    /// Database operation failed
    Database(rusqlite::Error),
    /// Client-supplied data failed validation
    Validation(Vec<FieldError>),
    /// A referenced entity does not exist (carries the entity name)
    NotFound(&'static str),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Database(e) => write!(f, "Database error: {}", e),
            TrackerError::Validation(errors) => {
                write!(f, "Validation failed:")?;
                for error in errors {
                    write!(f, " {}: {};", error.field, error.message)?;
                }
                Ok(())
            }
            TrackerError::NotFound(entity) => write!(f, "{} not found", entity),
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Database(e) => Some(e),
            TrackerError::Validation(_) => None,
            TrackerError::NotFound(_) => None,
        }
    }
}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Database(err)
    }
}

/// Result alias for supply_tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
