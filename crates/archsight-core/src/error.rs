//! Error types and error code constants for archsight.
//!
//! Every failure aborts the whole analysis run: a half-built entity graph is
//! useless, so there is no degraded mode and no recovery inside the core.
//!
//! ## Error Code Mapping
//!
//! The external CLI maps errors to exit codes through [`ErrorCode`]:
//! - `2`: Invalid input (bad signature pattern, bad regex, bad configuration,
//!   inconsistent saved model)
//! - `3`: Resolution errors (entity type not registered, entity not found,
//!   ambiguous method, unresolved relation)
//! - `4`: Model violations (one element bound to two entity types, illegal cast)
//! - `10`: Internal errors (serialization, unexpected state)

use std::fmt;

use thiserror::Error;

/// Convenience alias used by every fallible archsight API.
pub type Result<T, E = ArchError> = std::result::Result<T, E>;

// ============================================================================
// Error Codes
// ============================================================================

/// Stable numeric error codes for callers that need an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Invalid input supplied by the pipeline author or configuration.
    InvalidInput = 2,
    /// A relation or lookup could not be resolved.
    ResolutionError = 3,
    /// The entity model invariants were violated.
    ModelViolation = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl ErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for the analysis pipeline.
#[derive(Debug, Error)]
pub enum ArchError {
    /// A relationship action references an entity type that no
    /// `RegisterEntity` step ever declared.
    #[error("entity type '{entity_type}' is not registered")]
    EntityNotRegistered { entity_type: String },

    /// A required entity could not be resolved for an element in scope.
    #[error("no '{entity_type}' entity found for {element}")]
    EntityNotFound { entity_type: String, element: String },

    /// An element already bound to one entity type was registered under another.
    #[error("{element} is already registered as '{existing}', refusing to register it as '{requested}'")]
    UniqueElementPerEntityViolation {
        element: String,
        existing: String,
        requested: String,
    },

    /// More than one method matched where exactly one was required.
    #[error("ambiguous method {owner}.{name}{descriptor}: {candidates} candidates")]
    AmbiguousMethodResolution {
        owner: String,
        name: String,
        descriptor: String,
        candidates: usize,
    },

    /// An action received an element of the wrong kind at runtime.
    #[error("illegal cast in '{action}': expected {expected}, found {found}")]
    IllegalGenericCast {
        action: String,
        expected: String,
        found: String,
    },

    /// A children registration found no relation for a populated parent/child pair.
    #[error("unable to resolve any '{key}' relation between '{parent}' and '{child}'")]
    UnresolvedParentRelation {
        parent: String,
        key: String,
        child: String,
    },

    /// The generic signature pattern could not be parsed.
    #[error("invalid signature pattern '{input}': {message}")]
    InvalidSignaturePattern { input: String, message: String },

    /// A regular expression supplied to a filter or text edit is invalid.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Configuration could not be read.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A saved system model is internally inconsistent.
    #[error("invalid system model: {message}")]
    InvalidModel { message: String },

    /// An input file could not be read or an output file written.
    #[error("{path}: {message}")]
    Io { path: String, message: String },

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&ArchError> for ErrorCode {
    fn from(err: &ArchError) -> Self {
        match err {
            ArchError::InvalidSignaturePattern { .. }
            | ArchError::InvalidPattern { .. }
            | ArchError::InvalidConfig { .. }
            | ArchError::InvalidModel { .. }
            | ArchError::Io { .. } => ErrorCode::InvalidInput,
            ArchError::EntityNotRegistered { .. }
            | ArchError::EntityNotFound { .. }
            | ArchError::AmbiguousMethodResolution { .. }
            | ArchError::UnresolvedParentRelation { .. } => ErrorCode::ResolutionError,
            ArchError::UniqueElementPerEntityViolation { .. }
            | ArchError::IllegalGenericCast { .. } => ErrorCode::ModelViolation,
            ArchError::Serialization(_) | ArchError::Internal { .. } => ErrorCode::InternalError,
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl ArchError {
    /// Create an entity-not-registered error.
    pub fn not_registered(entity_type: impl fmt::Display) -> Self {
        ArchError::EntityNotRegistered {
            entity_type: entity_type.to_string(),
        }
    }

    /// Create an entity-not-found error.
    pub fn entity_not_found(entity_type: impl fmt::Display, element: impl Into<String>) -> Self {
        ArchError::EntityNotFound {
            entity_type: entity_type.to_string(),
            element: element.into(),
        }
    }

    /// Create an illegal cast error.
    pub fn illegal_cast(
        action: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        ArchError::IllegalGenericCast {
            action: action.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an I/O error for a file path.
    pub fn io(path: impl fmt::Display, err: std::io::Error) -> Self {
        ArchError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ArchError::Internal {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_errors_share_a_code() {
        assert_eq!(
            ArchError::not_registered("controller").error_code(),
            ErrorCode::ResolutionError
        );
        assert_eq!(
            ArchError::entity_not_found("endpoint", "method Foo.bar").error_code(),
            ErrorCode::ResolutionError
        );
    }

    #[test]
    fn violation_message_names_both_types() {
        let err = ArchError::UniqueElementPerEntityViolation {
            element: "class Foo".to_string(),
            existing: "a".to_string(),
            requested: "b".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("'a'"));
        assert!(message.contains("'b'"));
        assert_eq!(err.error_code().code(), 4);
    }

    #[test]
    fn serde_errors_are_internal() {
        let err: ArchError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.error_code(), ErrorCode::InternalError);
    }
}
