use thiserror::Error;
use uuid::Uuid;

use crate::database::models::OverlapDetected;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalendarError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error(
        "Overlapping shifts for employee {}: {} and {}",
        .0.employee_id,
        .0.first,
        .0.second
    )]
    OverlapDetected(OverlapDetected),

    #[error("Sync transport error: {0}")]
    SyncTransport(String),

    #[error("Stale write: schedule {0} is no longer present")]
    StaleWrite(Uuid),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid row from table '{table}': {reason}")]
    InvalidRow { table: String, reason: String },
}

impl CalendarError {
    pub fn invalid_date(message: impl Into<String>) -> Self {
        CalendarError::InvalidDate(message.into())
    }

    pub fn invalid_time_range(message: impl Into<String>) -> Self {
        CalendarError::InvalidTimeRange(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        CalendarError::SyncTransport(message.into())
    }

    pub fn invalid_row(table: impl Into<String>, reason: impl Into<String>) -> Self {
        CalendarError::InvalidRow {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CalendarError {
    fn from(error: serde_json::Error) -> Self {
        log::error!("Row decoding error: {}", error);
        CalendarError::InvalidRow {
            table: "unknown".to_string(),
            reason: error.to_string(),
        }
    }
}

pub type Result<T, E = CalendarError> = std::result::Result<T, E>;
