//! Database Engine Traits and Core Types
//!
//! This module defines the core abstractions for database engines.
//! Each engine (SQL Server, `SQLite`) implements the [`Connector`] and
//! [`Connection`] traits.
//!
//! # Connection Model
//! A [`Connector`] knows how to open one connection; the
//! [`ConnectionManager`](crate::connection::ConnectionManager) keeps at most one
//! live [`Connection`] and replaces it when a connection-class failure is seen.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! The only shared knowledge is the [`Dialect`], which carries catalog SQL.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::{DriverError, Result};

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
pub(crate) mod scripted;

/// SQL dialect spoken by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Microsoft SQL Server (T-SQL over TDS)
    SqlServer,
    /// `SQLite`
    Sqlite,
}

impl Dialect {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SqlServer => "sqlserver",
            Self::Sqlite => "sqlite",
        }
    }

    /// Whether row caps are applied by rewriting the statement with `TOP N`.
    ///
    /// `SQLite` has no TOP clause; its engine stops reading at the cap instead.
    #[must_use]
    pub const fn supports_top(&self) -> bool {
        matches!(self, Self::SqlServer)
    }

    /// Schema that unqualified table names resolve against first
    #[must_use]
    pub const fn default_schema(&self) -> &'static str {
        match self {
            Self::SqlServer => "Erp",
            Self::Sqlite => "main",
        }
    }

    /// Catalog query returning `(schema, name, kind)` ordered by schema then name.
    ///
    /// `kind` is `BASE TABLE` or `VIEW`.
    #[must_use]
    pub const fn tables_query(&self) -> &'static str {
        match self {
            Self::SqlServer => {
                "SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE
                 FROM INFORMATION_SCHEMA.TABLES
                 ORDER BY TABLE_SCHEMA, TABLE_NAME"
            }
            Self::Sqlite => {
                "SELECT 'main' AS TABLE_SCHEMA,
                        name AS TABLE_NAME,
                        CASE type WHEN 'view' THEN 'VIEW' ELSE 'BASE TABLE' END AS TABLE_TYPE
                 FROM sqlite_master
                 WHERE type IN ('table', 'view')
                   AND name NOT LIKE 'sqlite_%'
                 ORDER BY 1, 2"
            }
        }
    }

    /// Catalog query returning one row per foreign-key column mapping:
    /// `(fk_name, parent_schema, parent_table, parent_col, child_schema, child_table, child_col)`
    /// ordered by constraint name then column ordinal.
    #[must_use]
    pub const fn foreign_keys_query(&self) -> &'static str {
        match self {
            Self::SqlServer => {
                "SELECT
                     fk.name                                                      AS FK_Name,
                     OBJECT_SCHEMA_NAME(fk.parent_object_id)                      AS ParentSchema,
                     OBJECT_NAME(fk.parent_object_id)                             AS ParentTable,
                     COL_NAME(fkc.parent_object_id, fkc.parent_column_id)         AS ParentCol,
                     OBJECT_SCHEMA_NAME(fk.referenced_object_id)                  AS ChildSchema,
                     OBJECT_NAME(fk.referenced_object_id)                         AS ChildTable,
                     COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS ChildCol
                 FROM sys.foreign_keys fk
                 JOIN sys.foreign_key_columns fkc
                     ON fk.object_id = fkc.constraint_object_id
                 ORDER BY fk.name, fkc.constraint_column_id"
            }
            Self::Sqlite => {
                "SELECT 'FK_' || m.name || '_' || p.id AS FK_Name,
                        'main' AS ParentSchema,
                        m.name AS ParentTable,
                        p.\"from\" AS ParentCol,
                        'main' AS ChildSchema,
                        p.\"table\" AS ChildTable,
                        COALESCE(p.\"to\", p.\"from\") AS ChildCol
                 FROM sqlite_master m
                 JOIN pragma_foreign_key_list(m.name) p
                 WHERE m.type = 'table'
                 ORDER BY 1, p.seq"
            }
        }
    }

    /// Column query for one table, bound as `(schema, table)`.
    ///
    /// Returns `(name, data_type, max_length, precision, scale, is_nullable,
    /// default, pk_ordinal)` in ordinal order. `max_length` is `-1` for
    /// `(max)` types; `pk_ordinal` is NULL outside the primary key.
    #[must_use]
    pub const fn columns_query(&self) -> &'static str {
        match self {
            Self::SqlServer => {
                "SELECT
                     c.COLUMN_NAME,
                     c.DATA_TYPE,
                     c.CHARACTER_MAXIMUM_LENGTH,
                     c.NUMERIC_PRECISION,
                     c.NUMERIC_SCALE,
                     c.IS_NULLABLE,
                     c.COLUMN_DEFAULT,
                     pk.ORDINAL_POSITION AS PK_ORDINAL
                 FROM INFORMATION_SCHEMA.COLUMNS c
                 LEFT JOIN (
                     SELECT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME, ku.ORDINAL_POSITION
                     FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                     JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
                         ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
                         AND tc.TABLE_SCHEMA = ku.TABLE_SCHEMA
                     WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
                 ) pk
                     ON c.TABLE_SCHEMA = pk.TABLE_SCHEMA
                     AND c.TABLE_NAME = pk.TABLE_NAME
                     AND c.COLUMN_NAME = pk.COLUMN_NAME
                 WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
                 ORDER BY c.ORDINAL_POSITION"
            }
            Self::Sqlite => {
                "SELECT name,
                        type,
                        NULL,
                        NULL,
                        NULL,
                        CASE WHEN \"notnull\" = 0 AND pk = 0 THEN 'YES' ELSE 'NO' END,
                        dflt_value,
                        NULLIF(pk, 0)
                 FROM pragma_table_info(?2, ?1)
                 ORDER BY cid"
            }
        }
    }

    /// Quote an identifier for this dialect (`[Name]` or `"Name"`)
    #[must_use]
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::SqlServer => format!("[{}]", ident.replace(']', "]]")),
            Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// `schema.name` with both parts quoted
    #[must_use]
    pub fn qualified(&self, schema: &str, name: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(name))
    }

    /// Exact row count of one table
    #[must_use]
    pub fn row_count_query(&self, schema: &str, name: &str) -> String {
        let count = match self {
            Self::SqlServer => "COUNT_BIG(*)",
            Self::Sqlite => "COUNT(*)",
        };
        format!("SELECT {count} FROM {}", self.qualified(schema, name))
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Positional statement parameter
///
/// Parameters are always bound by the driver, never interpolated into SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Query execution result
///
/// A statement without a result set yields empty `columns` and `rows`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result set order
    pub columns: Vec<String>,

    /// Result rows, each an ordered tuple matching `columns`
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    /// Result with neither columns nor rows
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows returned
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Opens connections to one database
pub trait Connector: Send + Sync {
    /// Live connection type produced by this connector
    type Connection: Connection;

    /// Dialect of the target database
    fn dialect(&self) -> Dialect;

    /// Credential-free description of the target (e.g. `host:port/database`)
    fn target(&self) -> String;

    /// Open a new connection, failing fast on unreachable targets
    fn connect(&self) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// One live database connection
pub trait Connection: Send {
    /// Run one statement with positional parameters.
    ///
    /// `row_limit` lets engines without TOP support stop reading early;
    /// engines that receive a TOP-rewritten statement may ignore it.
    fn query(
        &mut self,
        sql: &str,
        params: &[SqlParam],
        row_limit: Option<usize>,
    ) -> impl Future<Output = std::result::Result<QueryResult, DriverError>> + Send;

    /// Close the connection
    fn close(self) -> impl Future<Output = std::result::Result<(), DriverError>> + Send;
}
