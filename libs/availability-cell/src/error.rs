use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Invalid time slot: {0}")]
    InvalidSlot(String),

    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    #[error("Scheduling is not configured for organisation {0}")]
    ScheduleNotConfigured(Uuid),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Weekly override not found for week starting {0}")]
    OverrideNotFound(chrono::NaiveDate),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidSlot(_)
            | AvailabilityError::InvalidRange(_)
            | AvailabilityError::UnknownTimezone(_)
            | AvailabilityError::ScheduleNotConfigured(_) => {
                AppError::ValidationError(err.to_string())
            }
            AvailabilityError::OverrideNotFound(_) => AppError::NotFound(err.to_string()),
            AvailabilityError::DatabaseError(_) | AvailabilityError::SerializationError(_) => {
                AppError::Database(err.to_string())
            }
        }
    }
}
