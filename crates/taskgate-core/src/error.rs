//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Restricted app not found in the list
    #[error("Restricted app not found: {id}")]
    RestrictionNotFound { id: String },

    /// A restricted app with this id already exists
    #[error("Restricted app already exists: {id}")]
    RestrictionAlreadyExists { id: String },

    /// Preset entries cannot be removed, only disabled
    #[error("Restricted app {id} is a preset and cannot be removed")]
    PresetNotRemovable { id: String },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl DomainError {
    /// Shorthand for an `InvalidFieldValue` error.
    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
