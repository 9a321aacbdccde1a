//! Error types for the application operator
//!
//! Errors carry the application they belong to where one is known, so a
//! failed pass can be traced back to its resource from the logs alone.

use thiserror::Error;

/// Main error type for application operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for an Application spec
    #[error("validation error for {application}: {message}")]
    Validation {
        /// Key of the application with invalid configuration
        application: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.expose.nodePort")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// The pass was cancelled before it could finish
    #[error("reconciliation of {application} cancelled")]
    Cancelled {
        /// Key of the application whose pass was cancelled
        application: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "owner", "store")
        context: String,
    },
}

impl Error {
    /// Create a validation error with application context and field path
    pub fn validation_for_field(
        application: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            application: application.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a cancellation error for the given application
    pub fn cancelled(application: impl Into<String>) -> Self {
        Self::Cancelled {
            application: application.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Every failure talking to the API server is transient from the
    /// controller's point of view, including 409 conflicts. Validation and
    /// serialization errors need a spec change; a cancelled pass is not
    /// rescheduled because the operator is shutting down.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { .. } => true,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Cancelled { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Message suitable for the Application status `reason` field
    ///
    /// Validation failures are reported by their message alone; the
    /// application name is already implied by the object carrying the status.
    pub fn reason(&self) -> String {
        match self {
            Error::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
