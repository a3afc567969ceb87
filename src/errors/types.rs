//! # Error Types
//!
//! Process-level error types for vaultflow using `thiserror`.

/// Custom result type for vaultflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for process-level failures.
///
/// Binding-local failures never surface through this type; they are absorbed
/// at the dispatch task boundary and turned into counter increments. The only
/// path from the rotation engine back to the process exit code is
/// [`Error::CycleFailed`], produced by one-shot mode.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Admin HTTP surface errors
    #[error("Admin server error: {message}")]
    AdminServer { message: String },

    /// Aggregate failure returned by one-shot mode when any counter recorded
    /// an error during the single cycle.
    #[error("rotation cycle recorded {errors} error(s); see the logs for details")]
    CycleFailed { errors: u64 },
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create an admin server error
    pub fn admin_server<S: Into<String>>(message: S) -> Self {
        Self::AdminServer { message: message.into() }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config_with_source("Configuration parsing failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
