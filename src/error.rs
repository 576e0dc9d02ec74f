use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the highlight library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// External template failed validation.
    #[error("Invalid template '{template}': {reason}")]
    TemplateValidation {
        /// Template file or name
        template: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// PDF text extraction failed.
    #[error("Failed to extract text from PDF '{source_name}': {message}")]
    Pdf {
        /// Name of the uploaded document
        source_name: String,
        /// Error message
        message: String,
    },

    /// Document kind could not be determined.
    #[error("Unsupported document '{source_name}': expected a PDF or plain text file")]
    UnsupportedDocument {
        /// Name of the uploaded document
        source_name: String,
    },

    /// Invalid UTF-8 encountered in a text document.
    #[error("Invalid UTF-8 encoding in '{source_name}'. Plain text documents must be UTF-8.")]
    InvalidUtf8 {
        /// Name of the document with encoding issues
        source_name: String,
    },

    /// Prompt plus requested completion does not fit the model's context.
    #[error(
        "Input text tokens need to be reduced: the prompt exceeds the maximum allowable \
         tokens per request ({limit}) by {excess} tokens"
    )]
    TokenBudget {
        /// Prompt tokens plus requested completion tokens
        requested: usize,
        /// Maximum allowable tokens for the model
        limit: usize,
        /// Amount over the limit
        excess: usize,
    },

    /// A field was requested before the field it builds on.
    #[error("Cannot generate '{field}' before '{requires}': {hint}")]
    MissingDependency {
        /// Field being generated
        field: String,
        /// Field that must exist first
        requires: String,
        /// Human readable hint
        hint: String,
    },

    /// HTTP transport error talking to the model API.
    #[error("HTTP error: {message}")]
    Http {
        /// Error message
        message: String,
    },

    /// The model API answered with an error or an unusable body.
    #[error("Model API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Api {
        /// HTTP status, when known
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Zip container error while reading or writing Office files.
    #[error("Archive error in '{entry}': {message}")]
    Archive {
        /// Archive entry or file name
        entry: String,
        /// Error message
        message: String,
    },

    /// JSON/TOML serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// System time error.
    #[error("System time error: {message}")]
    SystemTime {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: source.to_string(),
        }
    }

    /// Creates a template error from a plain message.
    #[must_use]
    pub fn template_msg(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Creates a template validation error.
    #[must_use]
    pub fn template_validation(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TemplateValidation {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Creates a PDF extraction error.
    #[must_use]
    pub fn pdf(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Pdf {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(source_name: impl Into<String>) -> Self {
        Self::InvalidUtf8 {
            source_name: source_name.into(),
        }
    }

    /// Creates an unsupported document error.
    #[must_use]
    pub fn unsupported_document(source_name: impl Into<String>) -> Self {
        Self::UnsupportedDocument {
            source_name: source_name.into(),
        }
    }

    /// Creates a token budget error.
    #[must_use]
    pub const fn token_budget(requested: usize, limit: usize) -> Self {
        Self::TokenBudget {
            requested,
            limit,
            excess: requested.saturating_sub(limit),
        }
    }

    /// Creates a missing dependency error.
    #[must_use]
    pub fn missing_dependency(
        field: impl Into<String>,
        requires: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::MissingDependency {
            field: field.into(),
            requires: requires.into(),
            hint: hint.into(),
        }
    }

    /// Creates an HTTP transport error.
    #[must_use]
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Creates a model API error.
    #[must_use]
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates an archive error.
    #[must_use]
    pub fn archive(entry: impl Into<String>, message: impl ToString) -> Self {
        Self::Archive {
            entry: entry.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the request was rejected before reaching the API
    /// because it would not fit the token budget.
    #[must_use]
    pub const fn is_token_budget(&self) -> bool {
        matches!(self, Self::TokenBudget { .. })
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Self::SystemTime {
            message: e.to_string(),
        }
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::Template {
            template: "unknown".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http {
            message: e.to_string(),
        }
    }
}
