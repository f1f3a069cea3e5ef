//! Error types for the autotemplate-rs library.
//!
//! Mining itself almost never fails: an unresolvable statement or expression is
//! reported as `None`/`false` by the classifiers and template builders. The
//! error type below covers what is left over: file I/O, configuration, corpus
//! (de)serialization and caller contract violations.

use std::io;

use thiserror::Error;

/// Main result type for autotemplate operations.
pub type Result<T> = std::result::Result<T, AutoTemplateError>;

/// Error type for all autotemplate operations.
#[derive(Error, Debug)]
pub enum AutoTemplateError {
    /// I/O related errors (corpus files, suggestions file, source files)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error description
        message: String,
        /// Configuration field that caused the error
        field: Option<String>,
    },

    /// Source parsing errors
    #[error("Parse error in {language}: {message}")]
    Parse {
        /// Language being parsed
        language: String,
        /// Error description
        message: String,
        /// File path where error occurred
        file_path: Option<String>,
    },

    /// Corpus or configuration (de)serialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Data format being processed
        data_type: Option<String>,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors for caller-supplied input
    #[error("Validation error: {message}")]
    Validation {
        /// Error description
        message: String,
        /// Field or input that failed validation
        field: Option<String>,
    },

    /// Background update or build task failures
    #[error("Pipeline error at stage '{stage}': {message}")]
    Pipeline {
        /// Pipeline stage where error occurred
        stage: String,
        /// Error description
        message: String,
    },

    /// Failures with no better home, such as the file watcher
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
    },
}

impl AutoTemplateError {
    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new configuration error with field context
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new parse error
    pub fn parse(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            language: language.into(),
            message: message.into(),
            file_path: None,
        }
    }

    /// Create a new parse error with file context
    pub fn parse_in_file(
        language: impl Into<String>,
        message: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self::Parse {
            language: language.into(),
            message: message.into(),
            file_path: Some(file_path.into()),
        }
    }

    /// Create a new serialization error for the given data format
    pub fn serialization(message: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            data_type: Some(data_type.into()),
            source: None,
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new validation error naming the offending field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new pipeline error
    pub fn pipeline(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Prefix the message with `context`
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        match &mut self {
            Self::Io { message, .. }
            | Self::Config { message, .. }
            | Self::Parse { message, .. }
            | Self::Serialization { message, .. }
            | Self::Validation { message, .. }
            | Self::Pipeline { message, .. }
            | Self::Internal { message } => {
                *message = format!("{context}: {message}");
            }
        }
        self
    }
}

impl From<io::Error> for AutoTemplateError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_yaml::Error> for AutoTemplateError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML serialization failed: {err}"),
            data_type: Some("YAML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<quick_xml::Error> for AutoTemplateError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Serialization {
            message: format!("XML processing failed: {err}"),
            data_type: Some("XML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for AutoTemplateError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Serialization {
            message: format!("Malformed XML attribute: {err}"),
            data_type: Some("XML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<walkdir::Error> for AutoTemplateError {
    fn from(err: walkdir::Error) -> Self {
        let message = format!("Directory traversal failed: {err}");
        match err.into_io_error() {
            Some(source) => Self::io(message, source),
            None => Self::internal(message),
        }
    }
}

/// Result extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error result
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<AutoTemplateError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| e.into().with_context(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_context_is_prefixed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let result: std::result::Result<(), std::io::Error> = Err(io_err);

        let err = result.context("Reading corpus").unwrap_err();
        match err {
            AutoTemplateError::Io { message, source } => {
                assert_eq!(message, "Reading corpus: I/O operation failed");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_config_field_error() {
        let err = AutoTemplateError::config_field("Invalid value", "min_percentage");

        if let AutoTemplateError::Config { message, field } = err {
            assert_eq!(message, "Invalid value");
            assert_eq!(field, Some("min_percentage".to_string()));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_truncated_xml_keeps_its_context() {
        let err = crate::io::records::read_records(b"<i><i k=\"a\">x</i>")
            .context("Reading Shop.xml")
            .unwrap_err();
        assert!(matches!(err, AutoTemplateError::Serialization { .. }));
        assert!(err.to_string().starts_with("Serialization error: Reading Shop.xml: "));
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = AutoTemplateError::pipeline("build", "task panicked");
        assert_eq!(err.to_string(), "Pipeline error at stage 'build': task panicked");
    }
}
