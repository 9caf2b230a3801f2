//! Scripted in-memory engine for unit tests.
//!
//! Each statement pops the next [`Step`] from a shared script; an empty script
//! answers with an empty result. A [`Probe`] records connects and the exact SQL
//! text that reached the "database".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{Connection, Connector, Dialect, QueryResult, SqlParam};
use crate::error::{DriverError, Result, ScoutError};

pub(crate) enum Step {
    Rows(QueryResult),
    Fail(DriverError),
    Delayed(Duration, QueryResult),
    Stall,
}

#[derive(Clone, Default)]
pub(crate) struct Probe {
    connects: Arc<AtomicUsize>,
    statements: Arc<Mutex<Vec<(String, Vec<SqlParam>)>>>,
}

impl Probe {
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn params(&self) -> Vec<Vec<SqlParam>> {
        self.statements.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }
}

pub(crate) struct ScriptedConnector {
    dialect: Dialect,
    script: Arc<Mutex<VecDeque<Step>>>,
    probe: Probe,
    refuse_connects_from: Option<usize>,
}

impl ScriptedConnector {
    pub(crate) fn new(dialect: Dialect, steps: impl IntoIterator<Item = Step>) -> (Self, Probe) {
        let probe = Probe::default();
        let connector = Self {
            dialect,
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            probe: probe.clone(),
            refuse_connects_from: None,
        };
        (connector, probe)
    }

    /// Connect attempts numbered `n` and later fail (1-based)
    pub(crate) fn refuse_connects_from(mut self, n: usize) -> Self {
        self.refuse_connects_from = Some(n);
        self
    }
}

pub(crate) struct ScriptedConnection {
    script: Arc<Mutex<VecDeque<Step>>>,
    probe: Probe,
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn target(&self) -> String {
        "scripted:0/test".to_string()
    }

    async fn connect(&self) -> Result<ScriptedConnection> {
        let attempt = self.probe.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refuse_connects_from.is_some_and(|n| attempt >= n) {
            return Err(ScoutError::connection_failed(
                self.target(),
                DriverError::connection("connection refused"),
            ));
        }
        Ok(ScriptedConnection { script: Arc::clone(&self.script), probe: self.probe.clone() })
    }
}

impl Connection for ScriptedConnection {
    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlParam],
        row_limit: Option<usize>,
    ) -> std::result::Result<QueryResult, DriverError> {
        self.probe.statements.lock().unwrap().push((sql.to_string(), params.to_vec()));
        let step = self.script.lock().unwrap().pop_front();

        let mut result = match step {
            None => QueryResult::empty(),
            Some(Step::Rows(result)) => result,
            Some(Step::Fail(err)) => return Err(err),
            Some(Step::Delayed(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            Some(Step::Stall) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                QueryResult::empty()
            }
        };
        if let Some(limit) = row_limit {
            result.rows.truncate(limit);
        }
        Ok(result)
    }

    async fn close(self) -> std::result::Result<(), DriverError> {
        Ok(())
    }
}

/// Build a result from string cells
pub(crate) fn rows(columns: &[&str], data: &[&[&str]]) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|c| (*c).to_string()).collect(),
        rows: data
            .iter()
            .map(|row| row.iter().map(|v| serde_json::Value::String((*v).to_string())).collect())
            .collect(),
    }
}
