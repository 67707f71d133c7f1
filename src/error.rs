use crate::batch::LifecycleError;
use crate::events::CodecError;
use crate::storage::StorageError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "saver.chunk_size", "request.user_id")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "timed_pipeline", "broker_sink")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the request pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Lifecycle violation: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Sink error: {message}{}", format_context(.context))]
    Sink {
        message: String,
        context: ErrorContext,
    },

    #[error("Partial write: {written_items} item(s) written, {unwritten} left unwritten: {source}")]
    PartialWrite {
        written_items: usize,
        unwritten: usize,
        source: Box<Error>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a sink error without extra context
    pub fn sink(msg: impl Into<String>) -> Self {
        Error::Sink {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a sink error with structured context
    pub fn sink_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Sink {
            message: msg.into(),
            context,
        }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Sink { context, .. }
            | Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Call-order violation such as submit-after-close.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::Lifecycle(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(StorageError::NotFound(_)))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_formatting() {
        let err = Error::validation_with_context(
            "value must be greater than 0",
            ErrorContext::new()
                .with_field_path("request.user_id")
                .with_source("request_service"),
        );
        assert_eq!(
            err.to_string(),
            "Validation error: value must be greater than 0 (field: request.user_id, source: request_service)"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_plain_sink_error() {
        let err = Error::sink("broker down");
        assert_eq!(err.to_string(), "Sink error: broker down");
        assert!(err.context().is_some());
        assert!(!err.is_usage_error());
    }

    #[test]
    fn test_classification() {
        let usage: Error = LifecycleError::Closed("saver").into();
        assert!(usage.is_usage_error());

        let missing: Error = StorageError::NotFound(42).into();
        assert!(missing.is_not_found());
        assert!(missing.context().is_none());
    }

    #[test]
    fn test_partial_write_display() {
        let err = Error::PartialWrite {
            written_items: 4,
            unwritten: 3,
            source: Box::new(Error::sink("disk full")),
        };
        assert_eq!(
            err.to_string(),
            "Partial write: 4 item(s) written, 3 left unwritten: Sink error: disk full"
        );
    }
}
