//! Table Descriptions and Samples
//!
//! Per-table detail that the catalog cache does not hold: column definitions
//! read through [`Dialect::columns_query`], an exact row count, and a small
//! ordered sample of the table's displayable columns. Column and count queries
//! go through [`QueryExecutor::execute_raw`] with the schema and table bound as
//! parameters; samples go through the capped [`QueryExecutor::execute`] path.

use serde::Serialize;
use std::sync::Arc;

use crate::engine::{Connector, Dialect, QueryResult, SqlParam};
use crate::error::{Result, ScoutError};
use crate::executor::QueryExecutor;
use crate::metadata::{cell, Direction, MetadataCache, TableIdentity};

/// Rows returned by a sample when no limit is given
pub const DEFAULT_SAMPLE_ROWS: usize = 10;

/// Upper bound on the rows one sample returns
pub const MAX_SAMPLE_ROWS: usize = 100;

/// Declared types left out of samples
const BINARY_TYPES: &[&str] = &["binary", "varbinary", "image", "timestamp", "rowversion", "blob"];

/// Integer types whose precision is implied by the name
const INTEGER_TYPES: &[&str] = &["int", "bigint", "smallint", "tinyint", "bit"];

/// `CHARACTER_MAXIMUM_LENGTH` of legacy `text`/`ntext`/`image` columns
const LEGACY_MAX_LENGTH: i64 = 2_147_483_647;

/// One column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    /// Character length; `-1` marks a `(max)` column
    pub max_length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nullable: bool,
    pub default: Option<String>,
    /// 1-based position in the primary key
    pub primary_key: Option<i64>,
}

impl ColumnInfo {
    /// Type with its length or precision, e.g. `nvarchar(50)`, `decimal(18,2)`
    #[must_use]
    pub fn type_display(&self) -> String {
        let dtype = &self.data_type;
        match (self.max_length, self.precision) {
            (Some(len), _) if len == -1 || len >= LEGACY_MAX_LENGTH => format!("{dtype}(max)"),
            (Some(len), _) if len > 0 => format!("{dtype}({len})"),
            (_, Some(precision)) if !is_integer_type(dtype) => {
                format!("{dtype}({precision},{})", self.scale.unwrap_or(0))
            }
            _ => dtype.clone(),
        }
    }

    /// Binary and row-version columns carry nothing readable
    #[must_use]
    pub fn is_binary(&self) -> bool {
        BINARY_TYPES.contains(&self.data_type.to_ascii_lowercase().as_str())
    }

    fn from_row(row: &[serde_json::Value]) -> Option<Self> {
        let number = |idx: usize| row.get(idx).and_then(serde_json::Value::as_i64);
        let name = cell(row, 0)?;
        Some(Self {
            name: name.to_string(),
            data_type: cell(row, 1).unwrap_or_default().to_string(),
            max_length: number(2),
            precision: number(3),
            scale: number(4),
            nullable: cell(row, 5).is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            default: cell(row, 6).map(str::to_string),
            primary_key: number(7),
        })
    }
}

fn is_integer_type(dtype: &str) -> bool {
    INTEGER_TYPES.contains(&dtype.to_ascii_lowercase().as_str())
}

#[derive(Serialize)]
struct ColumnView<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_display: String,
    nullable: bool,
    default: Option<&'a str>,
    primary_key: bool,
}

/// Columns, size and foreign-key fan-out of one table
#[derive(Debug, Clone)]
pub struct TableDescription {
    pub table: Arc<TableIdentity>,
    /// `None` when the count query failed (permissions, timeouts)
    pub row_count: Option<i64>,
    pub columns: Vec<ColumnInfo>,
    /// Constraints on this table pointing elsewhere
    pub references: usize,
    /// Constraints elsewhere pointing at this table
    pub referenced_by: usize,
}

impl TableDescription {
    /// Primary-key column names in key order
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        primary_key_columns(&self.columns)
    }

    /// JSON shape used by the CLI
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let columns: Vec<ColumnView<'_>> = self
            .columns
            .iter()
            .map(|c| ColumnView {
                name: &c.name,
                type_display: c.type_display(),
                nullable: c.nullable,
                default: c.default.as_deref(),
                primary_key: c.primary_key.is_some(),
            })
            .collect();
        serde_json::json!({
            "table": self.table.full(),
            "kind": self.table.kind,
            "row_count": self.row_count,
            "primary_key": self.primary_key(),
            "columns": columns,
            "relationships": {
                "references": self.references,
                "referenced_by": self.referenced_by,
            },
        })
    }
}

fn primary_key_columns(columns: &[ColumnInfo]) -> Vec<&str> {
    let mut keyed: Vec<(i64, &str)> =
        columns.iter().filter_map(|c| Some((c.primary_key?, c.name.as_str()))).collect();
    keyed.sort_unstable();
    keyed.into_iter().map(|(_, name)| name).collect()
}

/// Column definitions of `table` in ordinal order
pub async fn columns<C: Connector>(
    executor: &QueryExecutor<C>,
    table: &TableIdentity,
) -> Result<Vec<ColumnInfo>> {
    let params = [SqlParam::from(table.schema.as_str()), SqlParam::from(table.name.as_str())];
    let result = executor.execute_raw(executor.dialect().columns_query(), &params).await?;

    Ok(result
        .rows
        .iter()
        .filter_map(|row| {
            let column = ColumnInfo::from_row(row);
            if column.is_none() {
                tracing::debug!(?row, "skipping column row without a name");
            }
            column
        })
        .collect())
}

/// Exact row count, or `None` if the count could not be taken
pub async fn row_count<C: Connector>(
    executor: &QueryExecutor<C>,
    table: &TableIdentity,
) -> Option<i64> {
    let sql = executor.dialect().row_count_query(&table.schema, &table.name);
    match executor.execute_raw(&sql, &[]).await {
        Ok(result) => {
            result.rows.first().and_then(|row| row.first()).and_then(serde_json::Value::as_i64)
        }
        Err(e) => {
            tracing::debug!(table = %table, error = %e, "row count unavailable");
            None
        }
    }
}

/// Columns, row count and relationship counts of a resolved table
pub async fn describe<C: Connector>(
    executor: &QueryExecutor<C>,
    cache: &MetadataCache,
    table: Arc<TableIdentity>,
) -> Result<TableDescription> {
    let columns = columns(executor, &table).await?;
    let row_count = row_count(executor, &table).await;

    // A self-reference counts on both sides
    let references = cache.relationships_of(&table, Direction::Parent).len();
    let referenced_by = cache.relationships_of(&table, Direction::Child).len();

    Ok(TableDescription { table, row_count, columns, references, referenced_by })
}

/// `SELECT` over the displayable columns, ordered by primary key when one exists
pub fn sample_sql(
    dialect: Dialect,
    table: &TableIdentity,
    columns: &[ColumnInfo],
    filter: Option<&str>,
) -> Result<String> {
    let shown: Vec<String> =
        columns.iter().filter(|c| !c.is_binary()).map(|c| dialect.quote_ident(&c.name)).collect();
    if shown.is_empty() {
        return Err(ScoutError::invalid_input(format!("No displayable columns in {table}")));
    }

    let source = dialect.qualified(&table.schema, &table.name);
    let mut sql = format!("SELECT {} FROM {source}", shown.join(", "));

    if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }

    let key = primary_key_columns(columns);
    if !key.is_empty() {
        let order: Vec<String> = key.iter().map(|c| dialect.quote_ident(c)).collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    Ok(sql)
}

/// Up to `limit` rows (default 10, at most 100) of `table`'s readable columns.
///
/// `filter` is a `WHERE` body without the keyword; the full statement passes
/// the same safety gate as any ad-hoc query.
pub async fn sample<C: Connector>(
    executor: &QueryExecutor<C>,
    table: &TableIdentity,
    limit: Option<usize>,
    filter: Option<&str>,
) -> Result<QueryResult> {
    let columns = columns(executor, table).await?;
    let sql = sample_sql(executor.dialect(), table, &columns, filter)?;
    let cap = limit.unwrap_or(DEFAULT_SAMPLE_ROWS).clamp(1, MAX_SAMPLE_ROWS);
    executor.execute(&sql, &[], Some(cap)).await
}
