//! Metadata Cache
//!
//! Catalog data (tables and foreign keys) is read once through
//! [`QueryExecutor::execute_raw`] and frozen into a [`MetadataCache`]. The cache
//! has no mutation path; a refresh means a new process.
//!
//! # Load Sequence
//! 1. Tables in schema-then-name order, indexed by full name, bare name and schema
//! 2. Foreign-key column rows ordered by constraint name then ordinal, grouped
//!    into one [`ForeignKeyEdge`] per constraint
//! 3. Undirected adjacency over the edges
//!
//! [`SchemaCatalog`] guards the load so concurrent first callers trigger exactly
//! one catalog read and every caller sees the fully built cache.
//!
//! Lookups live in [`graph`] (relationships, join paths) and [`search`]
//! (resolution, ranking, suggestions).

pub mod graph;
pub mod search;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

use crate::engine::Connector;
use crate::error::{Result, ScoutError};
use crate::executor::QueryExecutor;

pub use graph::{Direction, Hop, JoinPath};

/// Whether a catalog entry is a table or a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    BaseTable,
    View,
}

impl TableKind {
    /// Parse the `TABLE_TYPE` catalog value; anything but `VIEW` is a table
    #[must_use]
    pub fn from_catalog(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("VIEW") {
            Self::View
        } else {
            Self::BaseTable
        }
    }
}

/// One table or view, identified by schema and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableIdentity {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    full: String,
}

impl TableIdentity {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, kind: TableKind) -> Self {
        let schema = schema.into();
        let name = name.into();
        let full = format!("{schema}.{name}");
        Self { schema, name, kind, full }
    }

    /// `schema.name`, unique across the catalog
    #[must_use]
    pub fn full(&self) -> &str {
        &self.full
    }
}

impl std::fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

/// A named foreign-key constraint.
///
/// `parent` is the referencing table, `child` the referenced one. Column pairs
/// are `(parent_column, child_column)` in constraint ordinal order.
#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyEdge {
    pub name: String,
    pub parent: Arc<TableIdentity>,
    pub child: Arc<TableIdentity>,
    pub column_pairs: Vec<(String, String)>,
}

impl ForeignKeyEdge {
    /// `Parent.col = Child.col AND ...` using bare table names
    #[must_use]
    pub fn join_clause(&self) -> String {
        self.column_pairs
            .iter()
            .map(|(pc, cc)| format!("{}.{pc} = {}.{cc}", self.parent.name, self.child.name))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// `JOIN schema.Child ON ...` for one hop of a path
    #[must_use]
    pub fn join_sql(&self) -> String {
        format!("JOIN {} ON {}", self.child.full(), self.join_clause())
    }

    #[must_use]
    pub fn is_self_reference(&self) -> bool {
        self.parent.full() == self.child.full()
    }
}

/// One row of the foreign-key catalog query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyColumn {
    pub constraint: String,
    pub parent_schema: String,
    pub parent_table: String,
    pub parent_column: String,
    pub child_schema: String,
    pub child_table: String,
    pub child_column: String,
}

/// Immutable, indexed view of the catalog
#[derive(Debug, Default)]
pub struct MetadataCache {
    default_schema: String,
    /// Loaded tables in catalog order
    order: Vec<Arc<TableIdentity>>,
    tables: HashMap<String, Arc<TableIdentity>>,
    by_name: HashMap<String, Vec<Arc<TableIdentity>>>,
    by_schema: BTreeMap<String, Vec<Arc<TableIdentity>>>,
    /// Graph nodes: every loaded table plus FK endpoints the table query did not list
    nodes: HashMap<String, Arc<TableIdentity>>,
    edges: Vec<ForeignKeyEdge>,
    by_parent: HashMap<String, Vec<usize>>,
    by_child: HashMap<String, Vec<usize>>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl MetadataCache {
    /// Build the cache from catalog rows.
    ///
    /// `tables` should arrive in schema-then-name order and `foreign_keys` in
    /// constraint-then-ordinal order; both orders are preserved.
    pub fn build(
        default_schema: impl Into<String>,
        tables: impl IntoIterator<Item = TableIdentity>,
        foreign_keys: impl IntoIterator<Item = ForeignKeyColumn>,
    ) -> Self {
        let mut cache = Self { default_schema: default_schema.into(), ..Self::default() };

        for table in tables {
            let table = Arc::new(table);
            if cache.tables.contains_key(table.full()) {
                continue;
            }
            cache.tables.insert(table.full().to_string(), Arc::clone(&table));
            cache.nodes.insert(table.full().to_string(), Arc::clone(&table));
            cache.by_name.entry(table.name.clone()).or_default().push(Arc::clone(&table));
            cache.by_schema.entry(table.schema.clone()).or_default().push(Arc::clone(&table));
            cache.order.push(table);
        }

        let mut slots: HashMap<String, usize> = HashMap::new();
        for row in foreign_keys {
            let pair = (row.parent_column.clone(), row.child_column.clone());
            if let Some(&slot) = slots.get(&row.constraint) {
                cache.edges[slot].column_pairs.push(pair);
                continue;
            }
            let parent = cache.node(&row.parent_schema, &row.parent_table);
            let child = cache.node(&row.child_schema, &row.child_table);
            slots.insert(row.constraint.clone(), cache.edges.len());
            cache.edges.push(ForeignKeyEdge {
                name: row.constraint,
                parent,
                child,
                column_pairs: vec![pair],
            });
        }

        for (idx, edge) in cache.edges.iter().enumerate() {
            let parent = edge.parent.full().to_string();
            let child = edge.child.full().to_string();
            cache.by_parent.entry(parent.clone()).or_default().push(idx);
            cache.by_child.entry(child.clone()).or_default().push(idx);
            cache.adjacency.entry(parent.clone()).or_default().insert(child.clone());
            cache.adjacency.entry(child).or_default().insert(parent);
        }

        cache
    }

    /// Node for an FK endpoint, synthesized when the table list lacks it
    fn node(&mut self, schema: &str, name: &str) -> Arc<TableIdentity> {
        let identity = TableIdentity::new(schema, name, TableKind::BaseTable);
        Arc::clone(
            self.nodes
                .entry(identity.full().to_string())
                .or_insert_with(|| Arc::new(identity)),
        )
    }

    #[must_use]
    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.order.len()
    }

    /// All loaded tables in catalog order
    #[must_use]
    pub fn tables(&self) -> &[Arc<TableIdentity>] {
        &self.order
    }

    /// Every foreign-key edge in constraint-name order
    #[must_use]
    pub fn edges(&self) -> &[ForeignKeyEdge] {
        &self.edges
    }

    /// Undirected neighbors of a table, sorted by full name
    pub fn neighbors(&self, full: &str) -> impl Iterator<Item = &str> {
        self.adjacency.get(full).into_iter().flat_map(|set| set.iter().map(String::as_str))
    }
}

/// Load-once holder for the [`MetadataCache`]
#[derive(Debug)]
pub struct SchemaCatalog {
    default_schema: String,
    cache: OnceCell<MetadataCache>,
    loads: AtomicUsize,
}

impl SchemaCatalog {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
            cache: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Return the cache, reading the catalog first if this is the first call.
    ///
    /// A failed load leaves the catalog unloaded; the next call tries again.
    pub async fn ensure_loaded<C: Connector>(
        &self,
        executor: &QueryExecutor<C>,
    ) -> Result<&MetadataCache> {
        self.cache.get_or_try_init(|| self.load(executor)).await
    }

    /// The cache if it has been loaded
    #[must_use]
    pub fn get(&self) -> Option<&MetadataCache> {
        self.cache.get()
    }

    /// Number of catalog loads started (successful or not)
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    async fn load<C: Connector>(&self, executor: &QueryExecutor<C>) -> Result<MetadataCache> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let dialect = executor.dialect();

        let tables = executor
            .execute_raw(dialect.tables_query(), &[])
            .await
            .map_err(|e| ScoutError::metadata_load_failed("tables", e))?;

        let foreign_keys = executor
            .execute_raw(dialect.foreign_keys_query(), &[])
            .await
            .map_err(|e| ScoutError::metadata_load_failed("foreign keys", e))?;

        let cache = MetadataCache::build(
            self.default_schema.clone(),
            tables.rows.iter().filter_map(|row| table_row(row)),
            foreign_keys.rows.iter().filter_map(|row| foreign_key_row(row)),
        );

        tracing::info!(
            tables = cache.table_count(),
            foreign_keys = cache.edges().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "metadata cache loaded"
        );
        Ok(cache)
    }
}

pub(crate) fn cell(row: &[serde_json::Value], idx: usize) -> Option<&str> {
    row.get(idx).and_then(serde_json::Value::as_str)
}

fn table_row(row: &[serde_json::Value]) -> Option<TableIdentity> {
    match (cell(row, 0), cell(row, 1), cell(row, 2)) {
        (Some(schema), Some(name), kind) => {
            Some(TableIdentity::new(schema, name, TableKind::from_catalog(kind.unwrap_or(""))))
        }
        _ => {
            tracing::debug!(?row, "skipping catalog table row with missing values");
            None
        }
    }
}

fn foreign_key_row(row: &[serde_json::Value]) -> Option<ForeignKeyColumn> {
    let values: Option<Vec<&str>> = (0..7).map(|idx| cell(row, idx)).collect();
    let Some(values) = values else {
        tracing::debug!(?row, "skipping foreign-key row with missing values");
        return None;
    };
    Some(ForeignKeyColumn {
        constraint: values[0].to_string(),
        parent_schema: values[1].to_string(),
        parent_table: values[2].to_string(),
        parent_column: values[3].to_string(),
        child_schema: values[4].to_string(),
        child_table: values[5].to_string(),
        child_column: values[6].to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{erp, fk, table};
    use super::*;
    use crate::engine::scripted::{rows, ScriptedConnector, Step};
    use crate::engine::Dialect;
    use crate::config::Settings;
    use crate::error::DriverError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_kind_from_catalog() {
        assert_eq!(TableKind::from_catalog("BASE TABLE"), TableKind::BaseTable);
        assert_eq!(TableKind::from_catalog("VIEW"), TableKind::View);
        assert_eq!(TableKind::from_catalog("view"), TableKind::View);
    }

    #[test]
    fn test_full_name() {
        assert_eq!(table("Erp", "Customer").full(), "Erp.Customer");
    }

    #[test]
    fn test_multi_column_edge_keeps_ordinal_order() {
        let cache = erp();
        let edge = cache.edges().iter().find(|e| e.name == "FK_OrderDtl_OrderHed").unwrap();

        assert_eq!(
            edge.column_pairs,
            vec![
                ("Company".to_string(), "Company".to_string()),
                ("OrderNum".to_string(), "OrderNum".to_string()),
            ]
        );
        assert_eq!(
            edge.join_clause(),
            "OrderDtl.Company = OrderHed.Company AND OrderDtl.OrderNum = OrderHed.OrderNum"
        );
        assert_eq!(
            edge.join_sql(),
            format!("JOIN Erp.OrderHed ON {}", edge.join_clause())
        );
    }

    #[test]
    fn test_one_edge_per_constraint() {
        let cache = erp();
        assert_eq!(cache.edges().len(), 5);
        assert_eq!(cache.table_count(), 10);
    }

    #[test]
    fn test_edges_share_table_identities() {
        let cache = erp();
        let edge = cache.edges().iter().find(|e| e.name == "FK_OrderHed_Customer").unwrap();
        let loaded = cache.tables().iter().find(|t| t.full() == "Erp.Customer").unwrap();
        assert!(Arc::ptr_eq(&edge.child, loaded));
    }

    #[test]
    fn test_single_edge_adjacency_is_symmetric() {
        let cache = MetadataCache::build(
            "Erp",
            [table("Erp", "A"), table("Erp", "B")],
            [fk("FK_A_B", ("Erp", "A", "BId"), ("Erp", "B", "Id"))],
        );
        assert_eq!(cache.neighbors("Erp.A").collect::<Vec<_>>(), vec!["Erp.B"]);
        assert_eq!(cache.neighbors("Erp.B").collect::<Vec<_>>(), vec!["Erp.A"]);
    }

    #[test]
    fn test_self_reference_round_trips() {
        let cache = MetadataCache::build(
            "Erp",
            [table("Erp", "EmpBasic")],
            [fk(
                "FK_Emp_Supervisor",
                ("Erp", "EmpBasic", "SupervisorID"),
                ("Erp", "EmpBasic", "EmpID"),
            )],
        );
        let edge = &cache.edges()[0];
        assert!(edge.is_self_reference());
        assert_eq!(edge.join_clause(), "EmpBasic.SupervisorID = EmpBasic.EmpID");
        assert_eq!(cache.neighbors("Erp.EmpBasic").collect::<Vec<_>>(), vec!["Erp.EmpBasic"]);
    }

    #[test]
    fn test_fk_to_unlisted_table_gets_a_graph_node_only() {
        let cache = MetadataCache::build(
            "Erp",
            [table("Erp", "A")],
            [fk("FK_A_Hidden", ("Erp", "A", "HId"), ("Secret", "Hidden", "Id"))],
        );
        assert_eq!(cache.table_count(), 1);
        assert_eq!(cache.edges()[0].child.full(), "Secret.Hidden");
        assert_eq!(cache.neighbors("Secret.Hidden").collect::<Vec<_>>(), vec!["Erp.A"]);
    }

    fn catalog_steps() -> Vec<Step> {
        vec![
            Step::Rows(rows(
                &["TABLE_SCHEMA", "TABLE_NAME", "TABLE_TYPE"],
                &[&["Erp", "Customer", "BASE TABLE"], &["Erp", "OrderHed", "BASE TABLE"]],
            )),
            Step::Rows(rows(
                &[
                    "FK_Name",
                    "ParentSchema",
                    "ParentTable",
                    "ParentCol",
                    "ChildSchema",
                    "ChildTable",
                    "ChildCol",
                ],
                &[&[
                    "FK_OrderHed_Customer",
                    "Erp",
                    "OrderHed",
                    "CustNum",
                    "Erp",
                    "Customer",
                    "CustNum",
                ]],
            )),
        ]
    }

    #[tokio::test]
    async fn test_catalog_load_uses_raw_catalog_queries() {
        let (connector, probe) = ScriptedConnector::new(Dialect::SqlServer, catalog_steps());
        let executor = QueryExecutor::new(connector, &Settings::default());
        let catalog = SchemaCatalog::new("Erp");

        let cache = catalog.ensure_loaded(&executor).await.unwrap();

        assert_eq!(cache.table_count(), 2);
        assert_eq!(cache.edges().len(), 1);
        assert_eq!(
            probe.statements(),
            vec![
                Dialect::SqlServer.tables_query().to_string(),
                Dialect::SqlServer.foreign_keys_query().to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_load_once() {
        let (connector, probe) = ScriptedConnector::new(Dialect::SqlServer, catalog_steps());
        let executor = QueryExecutor::new(connector, &Settings::default());
        let catalog = SchemaCatalog::new("Erp");

        let (a, b, c) = tokio::join!(
            catalog.ensure_loaded(&executor),
            catalog.ensure_loaded(&executor),
            catalog.ensure_loaded(&executor)
        );

        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(std::ptr::eq(a, b) && std::ptr::eq(b, c));
        assert_eq!(a.table_count(), 2);
        assert_eq!(catalog.load_count(), 1);
        assert_eq!(probe.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_cache_unloaded() {
        let (connector, _probe) = ScriptedConnector::new(
            Dialect::SqlServer,
            [Step::Fail(DriverError::statement("permission denied on INFORMATION_SCHEMA"))],
        );
        let executor = QueryExecutor::new(connector, &Settings::default());
        let catalog = SchemaCatalog::new("Erp");

        let err = catalog.ensure_loaded(&executor).await.unwrap_err();

        assert_eq!(err.error_code(), "METADATA_LOAD_FAILED");
        assert!(err.message().contains("tables"));
        assert!(catalog.get().is_none());

        // Script is exhausted: the retry sees empty catalogs and succeeds
        let cache = catalog.ensure_loaded(&executor).await.unwrap();
        assert_eq!(cache.table_count(), 0);
        assert_eq!(catalog.load_count(), 2);
    }
}
