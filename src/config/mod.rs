//! Configuration Management
//!
//! Two independent pieces of configuration:
//!
//! - [`ConnectionConfig`]: credentials for the target SQL Server, read from the
//!   environment. All of host, database, user and password must be present.
//! - [`Settings`]: tunables (default schema, row caps, timeouts) read from JSON.
//!
//! # Settings Locations
//! - Local: `.sqlscout/settings.json` (per-project)
//! - Global: `~/.config/sqlscout/settings.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Local settings file
//! 2. Global settings file
//! 3. Built-in defaults
//!
//! Fields missing from a file fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ScoutError};
use crate::safety::{ABSOLUTE_MAX_ROWS, DEFAULT_MAX_ROWS};

pub const ENV_HOST: &str = "SQL_SERVER_HOST";
pub const ENV_PORT: &str = "SQL_SERVER_PORT";
pub const ENV_DATABASE: &str = "SQL_SERVER_DATABASE";
pub const ENV_USER: &str = "SQL_SERVER_USER";
pub const ENV_PASSWORD: &str = "SQL_SERVER_PASSWORD";

/// Default SQL Server port
pub const DEFAULT_PORT: u16 = 1433;

/// SQL Server connection parameters
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ConnectionConfig {
    /// Read credentials from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test fixtures)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = read(ENV_HOST);
        let database = read(ENV_DATABASE);
        let user = read(ENV_USER);
        let password = read(ENV_PASSWORD);

        let (Some(host), Some(database), Some(user), Some(password)) =
            (host, database, user, password)
        else {
            return Err(ScoutError::config_error(format!(
                "Missing SQL Server credentials. Set {ENV_HOST}, {ENV_DATABASE}, {ENV_USER}, \
                 {ENV_PASSWORD} in the environment."
            )));
        };

        let port = match read(ENV_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                ScoutError::config_error(format!("Invalid {ENV_PORT} value '{raw}': {e}"))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self { host, port, database, user, password })
    }

    /// Credential-free `host:port/database` description
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Runtime tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Schema tried first when a table name is given without one
    pub default_schema: String,

    /// Row cap used when a caller does not request one
    pub default_max_rows: usize,

    /// Ceiling applied to every requested row cap
    pub absolute_max_rows: usize,

    /// Per-statement timeout; exceeding it counts as a connection failure
    pub statement_timeout_ms: u64,

    /// Bound on establishing a connection
    pub login_timeout_ms: u64,

    /// Accept the server certificate without validation
    pub trust_server_certificate: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_schema: "Erp".to_string(),
            default_max_rows: DEFAULT_MAX_ROWS,
            absolute_max_rows: ABSOLUTE_MAX_ROWS,
            statement_timeout_ms: 120_000,
            login_timeout_ms: 30_000,
            trust_server_certificate: true,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    #[must_use]
    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }
}

/// Get path to local settings file (`.sqlscout/settings.json`)
pub fn local_settings_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        ScoutError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".sqlscout").join("settings.json"))
}

/// Get path to global settings file (`~/.config/sqlscout/settings.json`)
pub fn global_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ScoutError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("sqlscout").join("settings.json"))
}

/// Load settings from one file; `None` if the file does not exist
pub fn load_settings_file(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ScoutError::config_error(format!("Could not read settings file: {e}")))?;

    let settings = serde_json::from_str::<Settings>(&contents)
        .map_err(|e| ScoutError::config_error(format!("Invalid settings file format: {e}")))?;

    Ok(Some(settings))
}

/// Load settings with precedence (local first, then global, then defaults)
pub fn load_settings() -> Result<Settings> {
    // No resolvable config dir just means there is no global file
    let global = global_settings_path().ok();

    for path in std::iter::once(local_settings_path()?).chain(global) {
        if let Some(settings) = load_settings_file(&path)? {
            tracing::debug!(path = %path.display(), "loaded settings");
            return Ok(settings);
        }
    }

    Ok(Settings::default())
}
