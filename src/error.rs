//! Service-level error type
//!
//! Wraps the error of every layer and classifies it as a client or server
//! fault, so API and CLI surfaces can pick a status without matching on
//! message text.

use thiserror::Error;

use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::filter::FilterError;
use crate::transform::TransformError;
use crate::validation::{SchemaError, ValidationError};

/// Fault class of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unknown collection or table
    NotFound,
    /// Request could not be read
    BadRequest,
    /// Request was read but cannot be served as asked
    Unprocessable,
    /// Store, transform or configuration failure
    Internal,
}

impl ErrorClass {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorClass::NotFound => 404,
            ErrorClass::BadRequest => 400,
            ErrorClass::Unprocessable => 422,
            ErrorClass::Internal => 500,
        }
    }
}

/// Errors surfaced by [`StatsService`](crate::service::StatsService)
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Config(
                ConfigError::UnknownCollection(_) | ConfigError::UnknownTable { .. },
            ) => ErrorClass::NotFound,
            ServiceError::Config(_) => ErrorClass::Internal,
            ServiceError::Validation(_) => ErrorClass::BadRequest,
            ServiceError::Schema(_) => ErrorClass::Unprocessable,
            ServiceError::Filter(e) if e.is_malformed() => ErrorClass::BadRequest,
            ServiceError::Filter(_) => ErrorClass::Unprocessable,
            ServiceError::Database(_) | ServiceError::Transform(_) => ErrorClass::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.class().status_code()
    }

    /// Whether the caller, not the service, is at fault
    pub fn is_client_error(&self) -> bool {
        self.class() != ErrorClass::Internal
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let not_found: ServiceError = ConfigError::UnknownCollection("trends".into()).into();
        assert_eq!(not_found.status_code(), 404);

        let malformed: ServiceError = FilterError::Malformed("{".into()).into();
        assert_eq!(malformed.status_code(), 400);

        let reserved: ServiceError = FilterError::ReservedColumn("table_name".into()).into();
        assert_eq!(reserved.status_code(), 422);

        let store: ServiceError = DatabaseError::QueryFailed("boom".into()).into();
        assert_eq!(store.status_code(), 500);
        assert!(!store.is_client_error());

        let transform: ServiceError = ConfigError::UnknownTransform {
            collection: "dukes".into(),
            table_name: "1.1".into(),
            transform: "melt".into(),
        }
        .into();
        assert_eq!(transform.class(), ErrorClass::Internal);
    }

    #[test]
    fn test_message_passes_through() {
        let err: ServiceError = ConfigError::UnknownCollection("trends".into()).into();
        assert_eq!(err.to_string(), "No such data collection: trends");
    }
}
