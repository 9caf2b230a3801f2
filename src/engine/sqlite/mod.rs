//! `SQLite` Database Engine Implementation
//!
//! Serves local catalog copies and integration tests through the same
//! [`Connector`] seam as SQL Server.
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - Files are opened read-only, with `query_only` set on top
//! - BLOB data is Base64-encoded for JSON safety
//! - Lock waits bounded via `busy_timeout`
//! - Row caps enforced while stepping (no TOP clause in `SQLite`)
//! - Everything lives in the single `main` schema

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{ErrorCode, OpenFlags, Row, ToSql};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::engine::{Connection, Connector, Dialect, QueryResult, SqlParam};
use crate::error::{DriverError, Result, ScoutError};

/// Opens read-only connections to one `SQLite` file
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            path: path.into(),
            busy_timeout: settings.login_timeout(),
        }
    }
}

/// Live `SQLite` connection
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl Connector for SqliteConnector {
    type Connection = SqliteConnection;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        let started = Instant::now();
        let fail = |e: rusqlite::Error| {
            ScoutError::connection_failed(self.target(), DriverError::connection(e.to_string()))
        };

        let conn = rusqlite::Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(fail)?;
        conn.busy_timeout(self.busy_timeout).map_err(fail)?;
        conn.pragma_update(None, "query_only", true).map_err(fail)?;

        // Opening is lazy; touch the schema so a non-database file fails here
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(fail)?;

        tracing::debug!(
            path = %self.path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "opened sqlite database"
        );
        Ok(SqliteConnection { conn })
    }
}

impl Connection for SqliteConnection {
    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlParam],
        row_limit: Option<usize>,
    ) -> std::result::Result<QueryResult, DriverError> {
        execute_query(&self.conn, sql, params, row_limit).map_err(classify)
    }

    async fn close(self) -> std::result::Result<(), DriverError> {
        self.conn.close().map_err(|(_, e)| classify(e))
    }
}

fn execute_query(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[SqlParam],
    row_limit: Option<usize>,
) -> rusqlite::Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut data = Vec::new();

    while let Some(row) = rows.next()? {
        data.push(row_to_json(columns.len(), row)?);

        if row_limit.is_some_and(|limit| data.len() >= limit) {
            break;
        }
    }

    Ok(QueryResult { columns, rows: data })
}

/// Open and I/O failures mean the file went away; everything else is the statement
fn classify(e: rusqlite::Error) -> DriverError {
    match e.sqlite_error_code() {
        Some(ErrorCode::CannotOpen | ErrorCode::SystemIoFailure) => {
            DriverError::connection(e.to_string())
        }
        _ => DriverError::statement(e.to_string()),
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            Self::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Convert a `SQLite` row to a JSON-safe `Vec`
fn row_to_json(
    column_count: usize,
    row: &Row,
) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    (0..column_count).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    let value_ref = row.get_ref(idx)?;

    Ok(match value_ref {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        // NaN and infinities have no JSON form
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            // Encode BLOB as Base64 for JSON safety
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(b);
            serde_json::Value::String(encoded)
        }
    })
}
