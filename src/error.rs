use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for document combination.
///
/// Collaborators (generators, tokenizers, splitters) report failures through
/// the `Generator`, `Tokenizer` and `Splitter` variants. The combination
/// layer propagates them as-is.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Detailed error message
        message: String,
    },

    /// A document lacks metadata required by the document prompt.
    #[error(
        "Document is missing metadata keys {missing:?} required by the document prompt (requires {required:?})"
    )]
    MissingMetadataKey {
        /// Keys absent from the document's metadata
        missing: Vec<String>,
        /// All metadata keys the document prompt requires
        required: Vec<String>,
    },

    /// A template or chain input was not supplied.
    #[error("Missing input variable '{variable}'")]
    MissingInput {
        /// Name of the absent variable
        variable: String,
    },

    /// Template parsing or rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// External template rejected by validation.
    #[error("Invalid template '{template}': {message}")]
    TemplateValidation {
        /// Template path or name
        template: String,
        /// Reason for rejection
        message: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Failure reported by a generator implementation.
    #[error("Generator error: {message}")]
    Generator {
        /// Error message
        message: String,
    },

    /// Failure reported by a token estimator implementation.
    #[error("Tokenizer error: {message}")]
    Tokenizer {
        /// Error message
        message: String,
    },

    /// Failure reported by a text splitter implementation.
    #[error("Splitter error: {message}")]
    Splitter {
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Async operation exceeded its deadline.
    #[error("Operation timed out after {millis}ms")]
    Timeout {
        /// Deadline in milliseconds
        millis: u64,
    },
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Creates a missing input error.
    #[must_use]
    pub fn missing_input(variable: impl Into<String>) -> Self {
        Self::MissingInput {
            variable: variable.into(),
        }
    }

    /// Creates a template error from a Tera error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: &tera::Error) -> Self {
        // Tera hides the useful part of the message in the source chain.
        let mut message = source.to_string();
        let mut cause = std::error::Error::source(source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }

        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Creates a template syntax error with a plain message.
    #[must_use]
    pub fn template_syntax(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Creates a template validation error.
    #[must_use]
    pub fn template_validation(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateValidation {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a generator error.
    #[must_use]
    pub fn generator(message: impl Into<String>) -> Self {
        Self::Generator {
            message: message.into(),
        }
    }

    /// Creates a tokenizer error.
    #[must_use]
    pub fn tokenizer(message: impl Into<String>) -> Self {
        Self::Tokenizer {
            message: message.into(),
        }
    }

    /// Creates a splitter error.
    #[must_use]
    pub fn splitter(message: impl Into<String>) -> Self {
        Self::Splitter {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            millis: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }

    /// Returns true if a document lacked required metadata.
    #[must_use]
    pub const fn is_missing_metadata(&self) -> bool {
        matches!(self, Self::MissingMetadataKey { .. })
    }

    /// Returns true if a template or chain input was missing.
    #[must_use]
    pub const fn is_missing_input(&self) -> bool {
        matches!(self, Self::MissingInput { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = Error::config("bad variable");
        assert!(err.is_invalid_configuration());
        assert!(err.to_string().contains("bad variable"));
    }

    #[test]
    fn test_missing_metadata_message() {
        let err = Error::MissingMetadataKey {
            missing: vec!["source".to_string()],
            required: vec!["page".to_string(), "source".to_string()],
        };
        assert!(err.is_missing_metadata());
        assert!(err.to_string().contains("\"source\""));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/prompt.tera", &io_err);
        assert!(err.to_string().contains("/tmp/prompt.tera"));
    }

    #[test]
    fn test_timeout_error() {
        let err = Error::timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_error_clone() {
        let err = Error::generator("upstream refused");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
