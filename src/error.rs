// Error taxonomy for the reservation core
// Callers branch on ErrorKind, never on the rendered message.

use crate::model::{BookingReference, BookingStatus, ResourceKind};
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not available: {reason}")]
    Availability { kind: ResourceKind, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot {operation} booking {reference} in its current state ({status})")]
    StateConflict {
        reference: BookingReference,
        status: BookingStatus,
        operation: &'static str,
    },

    #[error("Reservation conflict on {kind} {resource}: {details}")]
    ReservationConflict {
        kind: ResourceKind,
        resource: String,
        details: String,
    },

    #[error("Server error: {0}")]
    Server(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Availability,
    NotFound,
    StateConflict,
    ReservationConflict,
    Server,
}

impl ErrorKind {
    // Only a lost capacity race is worth retrying as-is
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ReservationConflict)
    }
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation { .. } => ErrorKind::Validation,
            BookingError::Availability { .. } => ErrorKind::Availability,
            BookingError::NotFound { .. } => ErrorKind::NotFound,
            BookingError::StateConflict { .. } => ErrorKind::StateConflict,
            BookingError::ReservationConflict { .. } => ErrorKind::ReservationConflict,
            BookingError::Server(_) => ErrorKind::Server,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BookingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(kind: ResourceKind, reason: impl Into<String>) -> Self {
        BookingError::Availability {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BookingError::NotFound {
                entity: "booking",
                id,
            },
            StoreError::VersionMismatch {
                reference, status, ..
            } => BookingError::StateConflict {
                reference,
                status,
                operation: "modify concurrently",
            },
            other => BookingError::Server(other.to_string()),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_translate_to_kinds() {
        let missing: BookingError = StoreError::NotFound("HTL-20260101-AAAAAAAA".to_string()).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let down: BookingError = StoreError::Unavailable("connection refused".to_string()).into();
        assert_eq!(down.kind(), ErrorKind::Server);
        assert!(down.to_string().contains("connection refused"));
    }

    #[test]
    fn test_only_reservation_conflicts_are_retryable() {
        let conflict = BookingError::ReservationConflict {
            kind: ResourceKind::Vehicle,
            resource: "veh-1".to_string(),
            details: "lost race".to_string(),
        };
        assert!(conflict.kind().is_retryable());
        assert!(!BookingError::validation("roomIds", "empty").kind().is_retryable());
    }
}
