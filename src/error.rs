//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout sqlscout.
//! All errors are structured and map to stable error codes for JSON output.
//!
//! # Error Categories
//! - `ConnectionFailed`: A connection could not be established or re-established
//! - `UnsafeQuery`: A denylisted keyword was found; the statement never reached the database
//! - `QueryFailed`: The database rejected or errored on a validated, connected execution
//! - `MetadataLoadFailed`: Catalog enumeration failed during the first metadata load
//! - `TableNotFound`: A table name did not resolve (carries "did you mean" suggestions)
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `ConfigError`: Missing credentials or an unreadable settings file
//!
//! Driver-level failures are described by [`DriverError`], which records whether
//! the failure was connection-class (retry-eligible) or statement-class.

use thiserror::Error;

/// Classification of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Closed socket, OS-level I/O error, or statement timeout.
    /// The connection is presumed dead and a reconnect may help.
    Connection,
    /// Syntax errors, permission errors, conversion failures.
    /// Retrying the same statement cannot succeed.
    Statement,
}

/// Failure reported by a database engine
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DriverError {
    /// Whether the failure is connection-class or statement-class
    pub kind: FailureKind,
    /// Driver message (never contains credentials)
    pub message: String,
}

impl DriverError {
    /// Create a connection-class failure
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Connection,
            message: message.into(),
        }
    }

    /// Create a statement-class failure
    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Statement,
            message: message.into(),
        }
    }

    /// True when a reconnect-and-retry is worth attempting
    #[must_use]
    pub fn is_connection_class(&self) -> bool {
        self.kind == FailureKind::Connection
    }
}

/// Main error type for sqlscout operations
#[derive(Error, Debug)]
pub enum ScoutError {
    /// Database connection could not be established
    #[error("Connection failed ({target}): {source}")]
    ConnectionFailed {
        target: String,
        #[source]
        source: DriverError,
    },

    /// Statement contains a denylisted keyword outside of comments
    #[error(
        "Query blocked: contains disallowed keyword '{keyword}'. \
         Only SELECT / WITH queries are allowed."
    )]
    UnsafeQuery { keyword: String },

    /// Query execution failed
    #[error("{}: {source}", failure_prefix(.after_reconnect))]
    QueryFailed {
        after_reconnect: bool,
        #[source]
        source: DriverError,
    },

    /// Catalog enumeration failed; the metadata cache stays unloaded
    #[error("Metadata load failed while reading {stage}: {source}")]
    MetadataLoadFailed {
        stage: &'static str,
        #[source]
        source: Box<ScoutError>,
    },

    /// Table name did not resolve against the loaded catalog
    #[error("Table '{name}' not found.{}", suggestion_suffix(.suggestions))]
    TableNotFound { name: String, suggestions: Vec<String> },

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (missing credentials, invalid settings file, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn failure_prefix(after_reconnect: &bool) -> &'static str {
    if *after_reconnect {
        "Query failed after reconnect"
    } else {
        "Query execution failed"
    }
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" Did you mean: {}?", suggestions.join(", "))
    }
}

impl ScoutError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by agents.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::UnsafeQuery { .. } => "UNSAFE_QUERY",
            Self::QueryFailed { .. } => "QUERY_FAILED",
            Self::MetadataLoadFailed { .. } => "METADATA_LOAD_FAILED",
            Self::TableNotFound { .. } => "TABLE_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message (agent-appropriate, no sensitive data)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connection failed error
    pub fn connection_failed(target: impl Into<String>, source: DriverError) -> Self {
        Self::ConnectionFailed { target: target.into(), source }
    }

    /// Create an unsafe query error
    pub fn unsafe_query(keyword: impl Into<String>) -> Self {
        Self::UnsafeQuery { keyword: keyword.into() }
    }

    /// Create a query failed error
    pub fn query_failed(source: DriverError, after_reconnect: bool) -> Self {
        Self::QueryFailed { after_reconnect, source }
    }

    /// Wrap a failure that happened while loading one stage of the catalog
    pub fn metadata_load_failed(stage: &'static str, source: ScoutError) -> Self {
        Self::MetadataLoadFailed { stage, source: Box::new(source) }
    }

    /// Create a table not found error
    pub fn table_not_found(name: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::TableNotFound { name: name.into(), suggestions }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for sqlscout operations
pub type Result<T> = std::result::Result<T, ScoutError>;
