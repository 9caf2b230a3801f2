//! Query Executor
//!
//! Composes the [`ConnectionManager`] with a [`SafetyPolicy`]:
//!
//! 1. Validate the statement (never sent if it fails)
//! 2. Apply the row cap (`TOP N` rewrite where the dialect has one)
//! 3. Run it on the live connection under the statement timeout
//! 4. On a connection-class failure, reconnect once and run it again
//!
//! Statement-class failures surface immediately. One statement runs at a time:
//! the manager sits behind an async mutex held for the whole attempt sequence.

use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::engine::{Connection, Connector, Dialect, QueryResult, SqlParam};
use crate::error::{DriverError, Result, ScoutError};
use crate::safety::{clamp_row_cap, inject_row_limit, KeywordDenylist, SafetyPolicy};

/// Initial attempt plus one retry after reconnect
const MAX_ATTEMPTS: u32 = 2;

/// Result of a single attempt at running a statement
enum Outcome {
    Rows(QueryResult),
    /// Dead socket, I/O failure or timeout; a fresh connection may help
    ConnectionLost(DriverError),
    /// The database refused the statement itself
    Rejected(DriverError),
}

/// Runs validated, row-capped statements over a single connection
pub struct QueryExecutor<C: Connector> {
    manager: Mutex<ConnectionManager<C>>,
    policy: Box<dyn SafetyPolicy>,
    dialect: Dialect,
    statement_timeout: Duration,
    default_max_rows: usize,
    absolute_max_rows: usize,
}

impl<C: Connector> QueryExecutor<C> {
    /// Create an executor guarded by the keyword denylist
    pub fn new(connector: C, settings: &Settings) -> Self {
        Self::with_policy(connector, settings, Box::new(KeywordDenylist))
    }

    /// Create an executor with a custom safety policy
    pub fn with_policy(connector: C, settings: &Settings, policy: Box<dyn SafetyPolicy>) -> Self {
        Self {
            dialect: connector.dialect(),
            manager: Mutex::new(ConnectionManager::new(connector)),
            policy,
            statement_timeout: settings.statement_timeout(),
            default_max_rows: settings.default_max_rows,
            absolute_max_rows: settings.absolute_max_rows,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Connect eagerly instead of on the first statement
    pub async fn connect(&self) -> Result<()> {
        let mut manager = self.manager.lock().await;
        manager.ensure_connection().await.map(|_| ())
    }

    /// Number of successful connects so far, reconnects included
    pub async fn connect_count(&self) -> u64 {
        self.manager.lock().await.connect_count()
    }

    /// Run a read-only statement returning at most `max_rows` rows.
    ///
    /// `None` or `Some(0)` uses the configured default; any request is clamped
    /// to the absolute maximum. A zero cap never means "unlimited": every
    /// ad-hoc statement gets a `TOP` (or an engine-side bound), and
    /// [`QueryExecutor::execute_raw`] is the only uncapped path.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
        max_rows: Option<usize>,
    ) -> Result<QueryResult> {
        self.validate(sql)?;

        let requested = max_rows.filter(|n| *n > 0).unwrap_or(self.default_max_rows);
        let cap = clamp_row_cap(requested, self.absolute_max_rows);

        let statement =
            if self.dialect.supports_top() { inject_row_limit(sql, cap) } else { sql.to_string() };

        let mut result = self.run(&statement, params, Some(cap)).await?;
        result.rows.truncate(cap);
        Ok(result)
    }

    /// Run a read-only statement exactly as written, without a row cap.
    ///
    /// Used for catalog queries where every row matters.
    pub async fn execute_raw(&self, sql: &str, params: &[SqlParam]) -> Result<QueryResult> {
        self.validate(sql)?;
        self.run(sql, params, None).await
    }

    fn validate(&self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Err(ScoutError::invalid_input("Query cannot be empty"));
        }
        self.policy.validate(sql)
    }

    async fn run(
        &self,
        sql: &str,
        params: &[SqlParam],
        row_limit: Option<usize>,
    ) -> Result<QueryResult> {
        let mut manager = self.manager.lock().await;
        let mut attempt = 1;

        loop {
            let conn = manager.ensure_connection().await?;

            match self.attempt(conn, sql, params, row_limit).await {
                Outcome::Rows(result) => {
                    tracing::debug!(rows = result.row_count(), attempt, "statement complete");
                    return Ok(result);
                }
                Outcome::Rejected(cause) => {
                    return Err(ScoutError::query_failed(cause, attempt > 1));
                }
                Outcome::ConnectionLost(cause) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(error = %cause, attempt, "connection lost, retrying once");
                    manager.reconnect().await?;
                    attempt += 1;
                }
                Outcome::ConnectionLost(cause) => {
                    tracing::warn!(error = %cause, attempt, "connection lost again, giving up");
                    manager.discard().await;
                    return Err(ScoutError::query_failed(cause, true));
                }
            }
        }
    }

    async fn attempt(
        &self,
        conn: &mut C::Connection,
        sql: &str,
        params: &[SqlParam],
        row_limit: Option<usize>,
    ) -> Outcome {
        let timeout = self.statement_timeout;
        match tokio::time::timeout(timeout, conn.query(sql, params, row_limit)).await {
            Ok(Ok(result)) => Outcome::Rows(result),
            Ok(Err(e)) if e.is_connection_class() => Outcome::ConnectionLost(e),
            Ok(Err(e)) => Outcome::Rejected(e),
            Err(_) => Outcome::ConnectionLost(DriverError::connection(format!(
                "Query exceeded timeout of {}ms",
                timeout.as_millis()
            ))),
        }
    }
}
