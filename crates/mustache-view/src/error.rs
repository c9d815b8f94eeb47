//! Error types for view rendering

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for view operations
pub type Result<T, E = ViewError> = std::result::Result<T, E>;

/// Error type for every stage of the render pipeline
#[derive(Debug, Error)]
pub enum ViewError {
    /// A template, layout or required file does not exist
    #[error("Template not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A template file exists but could not be read as UTF-8 text
    #[error("Failed to read template {}: {source}", path.display())]
    Io {
        /// Path that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The engine rejected the template source
    #[error("Template compile error in {name}: {message}")]
    Compile {
        /// Path or label of the rejected source
        name: String,
        /// Engine message
        message: String,
    },

    /// Evaluation failed, including failures raised by view logic
    #[error("Template render error: {0}")]
    Render(String),

    /// Context or view-logic data could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No engine is registered under the configured name
    #[error("Unknown template engine: {0}")]
    UnknownEngine(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ViewError {
    /// Create a compile error for the given source label
    pub fn compile(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a render error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Map an I/O error on `path`, keeping "not found" distinct
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether this error reports a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound(_))
    }
}

impl From<envy::Error> for ViewError {
    fn from(err: envy::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinct() {
        let err = ViewError::from_io(
            "views/missing.mustache",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("views/missing.mustache"));
    }

    #[test]
    fn test_other_io_errors_keep_source() {
        let err = ViewError::from_io(
            "views/binary.mustache",
            std::io::Error::new(std::io::ErrorKind::InvalidData, "stream did not contain valid UTF-8"),
        );
        assert!(matches!(err, ViewError::Io { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_compile_error_display() {
        let err = ViewError::compile("home.mustache", "unclosed tag");
        assert_eq!(
            err.to_string(),
            "Template compile error in home.mustache: unclosed tag"
        );
    }
}
