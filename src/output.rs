//! JSON Output Envelopes
//!
//! Every CLI invocation prints exactly one envelope to stdout:
//!
//! ```text
//! {"ok": true,  "engine": "sqlserver", "command": "search", "data": {...}, "meta": {...}}
//! {"ok": false, "engine": "sqlserver", "command": "search", "error": {"code": "...", ...}}
//! ```
//!
//! Error codes come from [`ScoutError::error_code`] and are stable. A failed
//! table lookup also lists its "did you mean" candidates under
//! `error.suggestions`.

use serde::{Deserialize, Serialize};

use crate::error::ScoutError;

/// Successful command result, generic over the command's payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    pub ok: bool,
    /// `sqlserver` or `sqlite`
    pub engine: String,
    pub command: String,
    pub data: T,
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(
        engine: impl Into<String>,
        command: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self {
            ok: true,
            engine: engine.into(),
            command: command.into(),
            data,
            meta,
        }
    }
}

/// Failed command result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub engine: String,
    pub command: String,
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            engine: engine.into(),
            command: command.into(),
            error,
        }
    }

    /// Envelope for a [`ScoutError`], carrying table suggestions when present
    pub fn from_error(
        engine: impl Into<String>,
        command: impl Into<String>,
        err: &ScoutError,
    ) -> Self {
        let mut info = ErrorInfo::new(err.error_code(), err.message());
        if let ScoutError::TableNotFound { suggestions, .. } = err {
            info.suggestions.clone_from(suggestions);
        }
        Self::new(engine, command, info)
    }
}

/// Stable code plus a message safe to show an agent (never credentials)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,

    /// Closest table names for `TABLE_NOT_FOUND`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            suggestions: Vec::new(),
        }
    }
}

/// Timing and row count for a successful command
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metadata {
    pub execution_ms: u64,

    /// Rows (or items) in `data`; omitted for commands without a natural count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    pub fn new(execution_ms: u64) -> Self {
        Self {
            execution_ms,
            rows_returned: None,
        }
    }

    pub fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self {
            execution_ms,
            rows_returned: Some(rows_returned),
        }
    }
}
