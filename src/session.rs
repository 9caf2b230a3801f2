//! Session
//!
//! The one object a front end constructs: it owns the [`QueryExecutor`] and the
//! load-once [`SchemaCatalog`] for a single database, and every consumer borrows
//! it. Nothing here is process-global.

use std::sync::Arc;

use crate::config::Settings;
use crate::describe::{self, ColumnInfo, TableDescription};
use crate::engine::{Connector, Dialect, QueryResult, SqlParam};
use crate::error::{Result, ScoutError};
use crate::executor::QueryExecutor;
use crate::metadata::search::DEFAULT_SUGGESTION_LIMIT;
use crate::metadata::{MetadataCache, SchemaCatalog, TableIdentity};

/// Query execution and schema metadata for one database
pub struct Session<C: Connector> {
    executor: Arc<QueryExecutor<C>>,
    catalog: SchemaCatalog,
}

impl<C: Connector> Session<C> {
    /// Create a session; nothing connects until first use or [`Session::warm_up`]
    pub fn new(connector: C, settings: &Settings) -> Self {
        Self::with_executor(QueryExecutor::new(connector, settings), settings)
    }

    /// Create a session around a preconfigured executor
    pub fn with_executor(executor: QueryExecutor<C>, settings: &Settings) -> Self {
        let default_schema = match executor.dialect() {
            Dialect::SqlServer => settings.default_schema.clone(),
            other => other.default_schema().to_string(),
        };
        Self {
            executor: Arc::new(executor),
            catalog: SchemaCatalog::new(default_schema),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    /// Shared handle to the executor
    #[must_use]
    pub fn executor(&self) -> Arc<QueryExecutor<C>> {
        Arc::clone(&self.executor)
    }

    #[must_use]
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Connect eagerly and load metadata.
    ///
    /// A connection failure is returned. A metadata failure is logged and
    /// tolerated: queries keep working and the next [`Session::metadata`] call
    /// tries the load again.
    pub async fn warm_up(&self) -> Result<()> {
        self.executor.connect().await?;

        if let Err(e) = self.metadata().await {
            tracing::warn!(
                error = %e,
                "metadata unavailable, schema lookups disabled until a load succeeds"
            );
        }
        Ok(())
    }

    /// Run a read-only statement with a row cap (`None` uses the default)
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
        max_rows: Option<usize>,
    ) -> Result<QueryResult> {
        self.executor.execute(sql, params, max_rows).await
    }

    /// Run a read-only statement without a row cap
    pub async fn execute_raw(&self, sql: &str, params: &[SqlParam]) -> Result<QueryResult> {
        self.executor.execute_raw(sql, params).await
    }

    /// The loaded metadata cache, loading it on first use
    pub async fn metadata(&self) -> Result<&MetadataCache> {
        self.catalog.ensure_loaded(&*self.executor).await
    }

    /// Resolve a table or fail with "did you mean" suggestions
    pub async fn require_table(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> Result<Arc<TableIdentity>> {
        let cache = self.metadata().await?;
        match cache.resolve(name, schema) {
            Some(table) => Ok(Arc::clone(table)),
            None => {
                let shown = match schema.filter(|s| !s.is_empty()) {
                    Some(schema) => format!("{schema}.{name}"),
                    None => name.to_string(),
                };
                Err(ScoutError::table_not_found(
                    shown,
                    cache.suggest_similar(name, DEFAULT_SUGGESTION_LIMIT),
                ))
            }
        }
    }

    /// Column definitions of a resolved table
    pub async fn columns(&self, table: &TableIdentity) -> Result<Vec<ColumnInfo>> {
        describe::columns(&self.executor, table).await
    }

    /// Columns, row count and relationship counts of a table
    pub async fn describe(&self, name: &str, schema: Option<&str>) -> Result<TableDescription> {
        let table = self.require_table(name, schema).await?;
        let cache = self.metadata().await?;
        describe::describe(&self.executor, cache, table).await
    }

    /// A few rows of a table's readable columns, ordered by primary key.
    ///
    /// `limit` defaults to 10 and is held to 100; `filter` is a `WHERE` body.
    pub async fn sample(
        &self,
        name: &str,
        schema: Option<&str>,
        limit: Option<usize>,
        filter: Option<&str>,
    ) -> Result<QueryResult> {
        let table = self.require_table(name, schema).await?;
        describe::sample(&self.executor, &table, limit, filter).await
    }
}
