// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use thiserror::Error;

/// Errors raised by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad input shape or range. `field` names the offending input.
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} with ID {id} not found.")]
    NotFound { entity: &'static str, id: i64 },

    /// The record is still referenced and cannot be removed.
    #[error("{entity} with ID {id} is still referenced by {dependents} client(s).")]
    InUse {
        entity: &'static str,
        id: i64,
        dependents: i64,
    },

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = LedgerError::validation("due_date", "must be between 1 and 31");
        assert_eq!(err.to_string(), "Invalid due_date: must be between 1 and 31");

        let err = LedgerError::not_found("Payment", 42);
        assert_eq!(err.to_string(), "Payment with ID 42 not found.");
    }
}
