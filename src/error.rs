//! Error types for the Spacelift block reconciler
//!
//! Errors are structured with fields to aid debugging in production. Remote
//! failures carry the GraphQL operation name so a failed pass can be traced
//! back to the exact mutation or query that broke it.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for block operations
#[derive(Debug, Error)]
pub enum Error {
    /// The Spacelift API answered with GraphQL errors or an unusable payload
    #[error("spacelift API error [{operation}]: {message}")]
    Api {
        /// GraphQL operation name (e.g. "CreateStack")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Transport-level failure talking to the Spacelift endpoint
    #[error("http error [{operation}]: {source}")]
    Http {
        /// GraphQL operation name, or "ApiKeyUser" for token exchange
        operation: String,
        /// The underlying reqwest error
        #[source]
        source: reqwest::Error,
    },

    /// API key exchange was rejected or returned no token
    #[error("authentication error: {message}")]
    Auth {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The payload kind being serialized (if known)
        kind: Option<String>,
    },

    /// Invalid configuration or block input
    #[error("validation error for {instance}: {message}")]
    Validation {
        /// Instance the invalid input belongs to
        instance: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g. "prefix")
        field: Option<String>,
    },

    /// Key-value store failure
    #[error("store error [{key}]: {message}")]
    Store {
        /// Key (or instance scope) being read or written
        key: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "reconciler", "poller")
        context: String,
    },
}

impl Error {
    /// Create an API error for a GraphQL operation
    pub fn api(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Wrap a transport error for a GraphQL operation
    pub fn http(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            operation: operation.into(),
            source,
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with payload kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without instance context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            instance: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with instance context
    pub fn validation_for(instance: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            instance: instance.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific block input
    pub fn validation_for_field(
        instance: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            instance: instance.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a store error for a key
    pub fn store(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
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
    /// Validation and serialization errors need an input fix. Transport errors
    /// are retryable unless the server answered with a 4xx status.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http { source, .. } => !source
                .status()
                .is_some_and(|status| status.is_client_error()),
            Error::Api { .. } => true,
            Error::Auth { .. } => false,
            Error::Serialization { .. } => false,
            Error::Validation { .. } => false,
            Error::Store { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the GraphQL operation if this error came from a remote call
    pub fn operation(&self) -> Option<&str> {
        match self {
            Error::Api { operation, .. } | Error::Http { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a GraphQL error names the operation that failed
    #[test]
    fn story_api_errors_name_the_operation() {
        let err = Error::api("TriggerRun", "stack is locked");
        assert!(err.to_string().contains("TriggerRun"));
        assert!(err.to_string().contains("stack is locked"));
        assert_eq!(err.operation(), Some("TriggerRun"));
        assert!(err.is_retryable());
    }

    /// Story: bad block input is reported against the field and not retried
    #[test]
    fn story_validation_errors_are_permanent() {
        let err = Error::validation_for_field("blk-1", "prefix", "expected a string");
        match &err {
            Error::Validation {
                instance, field, ..
            } => {
                assert_eq!(instance, "blk-1");
                assert_eq!(field.as_deref(), Some("prefix"));
            }
            _ => panic!("Expected Validation variant"),
        }
        assert!(!err.is_retryable());
        assert_eq!(err.operation(), None);
    }

    #[test]
    fn test_serde_json_errors_convert() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { kind: None, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_and_store_retry_classification() {
        assert!(!Error::auth("bad key").is_retryable());
        assert!(Error::store("mode", "disk full").is_retryable());
        assert!(Error::internal_with_context("poller", "boom")
            .to_string()
            .contains("[poller]"));
    }
}
