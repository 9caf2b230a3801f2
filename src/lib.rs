//! sqlscout - Read-Only, Schema-Aware SQL Server Access for Agents
//!
//! sqlscout gives an agent a safe query surface over a wide, multi-tenant
//! database: every statement is checked against a keyword denylist and capped in
//! row count before it reaches the server, and the catalog's tables and foreign
//! keys are loaded once into an in-memory graph for name resolution, search and
//! join-path discovery.
//!
//! # Core Principles
//! - Read-only under every configuration (no write path exists)
//! - Every ad-hoc query is bounded in row count
//! - One reconnect-and-retry on a dropped connection, never more
//! - Deterministic lookups (same catalog, same answers)
//! - JSON-only output from the CLI; diagnostics go to stderr
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`output`] - JSON output envelope types
//! - [`config`] - Credentials and runtime settings
//! - [`engine`] - Connector/connection traits and engine implementations
//! - [`safety`] - Read-only validation and row-cap injection
//! - [`connection`] - Single-handle connection manager
//! - [`executor`] - Validated execution with bounded retry
//! - [`metadata`] - Load-once catalog cache, relationship graph, search
//! - [`describe`] - Column definitions, row counts and table samples
//! - [`session`] - Constructed-once owner of executor and metadata

pub mod config;
pub mod connection;
pub mod describe;
pub mod engine;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod output;
pub mod safety;
pub mod session;

// Re-export commonly used types for convenience
pub use config::{load_settings, ConnectionConfig, Settings};
pub use describe::{ColumnInfo, TableDescription};
pub use engine::{Connection, Connector, Dialect, QueryResult, SqlParam};
pub use error::{DriverError, FailureKind, Result, ScoutError};
pub use executor::QueryExecutor;
pub use metadata::{
    Direction, ForeignKeyEdge, JoinPath, MetadataCache, SchemaCatalog, TableIdentity, TableKind,
};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use safety::{KeywordDenylist, SafetyPolicy};
pub use session::Session;

#[cfg(feature = "mssql")]
pub use engine::mssql::MssqlConnector;
#[cfg(feature = "sqlite")]
pub use engine::sqlite::SqliteConnector;
