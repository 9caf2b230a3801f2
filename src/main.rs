//! sqlscout CLI Entry Point
//!
//! Subcommands:
//! - `query` - Run a read-only, row-capped statement
//! - `schemas` - List schemas with table counts
//! - `tables` - List the tables of one schema
//! - `search` - Ranked table-name search with suggestions on a miss
//! - `relationships` - Foreign keys touching a table
//! - `join-path` - Shortest foreign-key paths between two tables
//! - `describe` - Column definitions, row count and relationship counts
//! - `sample` - A few primary-key-ordered rows of a table
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use sqlscout::describe::DEFAULT_SAMPLE_ROWS;
use sqlscout::metadata::graph::{DEFAULT_MAX_DEPTH, DEFAULT_RELATIONSHIP_LIMIT};
use sqlscout::metadata::search::{DEFAULT_SEARCH_LIMIT, DEFAULT_SUGGESTION_LIMIT};
use sqlscout::{
    load_settings, Connector, Direction, ErrorEnvelope, ErrorInfo, ForeignKeyEdge, Metadata,
    ScoutError, Session, Settings, SuccessEnvelope,
};

/// sqlscout - Read-only, schema-aware SQL Server access for agents
#[derive(Parser)]
#[command(name = "sqlscout")]
#[command(about = "Read-only, schema-aware query surface for wide SQL Server databases")]
#[command(version)]
struct Cli {
    /// Use a SQLite database file instead of SQL Server
    #[arg(long, global = true, value_name = "FILE")]
    sqlite: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a read-only SELECT / WITH statement
    Query {
        sql: String,

        /// Row cap (defaults to the configured default, clamped to the absolute maximum)
        #[arg(long)]
        max_rows: Option<usize>,
    },

    /// List schemas with their table counts
    Schemas,

    /// List the tables of one schema
    Tables { schema: String },

    /// Search table names (exact, then prefix, then substring)
    Search {
        query: String,

        #[arg(long)]
        schema: Option<String>,

        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Foreign keys touching a table
    Relationships {
        table: String,

        #[arg(long)]
        schema: Option<String>,

        #[arg(long, default_value = "both", value_parser = ["both", "parent", "child"])]
        direction: String,

        #[arg(long, default_value_t = DEFAULT_RELATIONSHIP_LIMIT)]
        limit: usize,
    },

    /// Shortest foreign-key join paths between two tables
    JoinPath {
        from: String,
        to: String,

        #[arg(long)]
        from_schema: Option<String>,

        #[arg(long)]
        to_schema: Option<String>,

        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// Column definitions, row count and relationship counts of a table
    Describe {
        table: String,

        #[arg(long)]
        schema: Option<String>,
    },

    /// Sample rows of a table's readable columns, ordered by primary key
    Sample {
        table: String,

        #[arg(long)]
        schema: Option<String>,

        /// Rows to return (at most 100)
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        limit: usize,

        /// Filter without the WHERE keyword, e.g. "Company = 'EPIC06'"
        #[arg(long = "where", value_name = "CONDITION")]
        filter: Option<String>,
    },
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Schemas => "schemas",
            Self::Tables { .. } => "tables",
            Self::Search { .. } => "search",
            Self::Relationships { .. } => "relationships",
            Self::JoinPath { .. } => "join-path",
            Self::Describe { .. } => "describe",
            Self::Sample { .. } => "sample",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let engine = if cli.sqlite.is_some() { "sqlite" } else { "sqlserver" };
    let command = cli.command.name();

    match run(cli, engine).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let envelope = match err.downcast_ref::<ScoutError>() {
                Some(scout) => ErrorEnvelope::from_error(engine, command, scout),
                None => ErrorEnvelope::new(
                    engine,
                    command,
                    ErrorInfo::new("INTERNAL_ERROR", err.to_string()),
                ),
            };
            match serde_json::to_string(&envelope) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "failed to serialize error envelope"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, engine: &'static str) -> anyhow::Result<String> {
    let settings = load_settings()?;

    match cli.sqlite {
        #[cfg(feature = "sqlite")]
        Some(path) => {
            let connector = sqlscout::SqliteConnector::new(path, &settings);
            dispatch(connector, &settings, cli.command, engine).await
        }
        #[cfg(not(feature = "sqlite"))]
        Some(_) => {
            Err(ScoutError::config_error("This build does not include SQLite support").into())
        }

        #[cfg(feature = "mssql")]
        None => {
            let config = sqlscout::ConnectionConfig::from_env()?;
            let connector = sqlscout::MssqlConnector::new(config, &settings);
            dispatch(connector, &settings, cli.command, engine).await
        }
        #[cfg(not(feature = "mssql"))]
        None => {
            Err(ScoutError::config_error("This build does not include SQL Server support").into())
        }
    }
}

async fn dispatch<C: Connector>(
    connector: C,
    settings: &Settings,
    command: Commands,
    engine: &'static str,
) -> anyhow::Result<String> {
    let started = Instant::now();
    let name = command.name();
    let session = Session::new(connector, settings);

    let (data, rows) = match command {
        Commands::Query { sql, max_rows } => {
            let result = session.execute(&sql, &[], max_rows).await?;
            let rows = result.row_count();
            (serde_json::to_value(&result)?, Some(rows))
        }

        Commands::Schemas => {
            let cache = session.metadata().await?;
            let schemas: Vec<Value> = cache
                .schemas()
                .into_iter()
                .map(|(schema, tables)| json!({ "schema": schema, "tables": tables }))
                .collect();
            (json!({ "schemas": schemas }), None)
        }

        Commands::Tables { schema } => {
            let cache = session.metadata().await?;
            let tables = cache.tables_in_schema(&schema);
            if tables.is_empty() {
                let message = format!("Schema '{schema}' has no tables");
                return Err(ScoutError::invalid_input(message).into());
            }
            (json!({ "schema": schema, "tables": tables }), Some(tables.len()))
        }

        Commands::Search { query, schema, limit } => {
            let cache = session.metadata().await?;
            let hits = cache.search(&query, schema.as_deref(), limit);
            let suggestions = if hits.is_empty() {
                cache.suggest_similar(&query, DEFAULT_SUGGESTION_LIMIT)
            } else {
                Vec::new()
            };
            let data = json!({ "query": query, "matches": hits, "suggestions": suggestions });
            (data, Some(hits.len()))
        }

        Commands::Relationships { table, schema, direction, limit } => {
            let direction: Direction = direction.parse()?;
            let table = session.require_table(&table, schema.as_deref()).await?;
            let cache = session.metadata().await?;

            let edges = cache.relationships_of(&table, direction);
            let shown: Vec<Value> = edges.iter().take(limit).map(|e| edge_json(e)).collect();
            let data = json!({
                "table": table.full(),
                "direction": direction,
                "total": edges.len(),
                "relationships": shown,
            });
            (data, Some(shown.len()))
        }

        Commands::JoinPath { from, to, from_schema, to_schema, max_depth } => {
            let from = session.require_table(&from, from_schema.as_deref()).await?;
            let to = session.require_table(&to, to_schema.as_deref()).await?;
            let cache = session.metadata().await?;

            let paths: Vec<Value> = cache
                .join_path(&from, &to, max_depth)
                .iter()
                .map(|path| {
                    let hops: Vec<Value> = cache
                        .hops(path)
                        .iter()
                        .map(|hop| {
                            json!({
                                "from": hop.from.full(),
                                "to": hop.to.full(),
                                "direct": !hop.edges.is_empty(),
                                "joins": hop.edges.iter().map(|e| edge_json(e)).collect::<Vec<_>>(),
                            })
                        })
                        .collect();
                    json!({ "tables": path, "hops": path.hop_count(), "steps": hops })
                })
                .collect();

            let data = json!({
                "from": from.full(),
                "to": to.full(),
                "max_depth": max_depth,
                "paths": paths,
            });
            (data, Some(paths.len()))
        }

        Commands::Describe { table, schema } => {
            let description = session.describe(&table, schema.as_deref()).await?;
            let columns = description.columns.len();
            (description.to_json(), Some(columns))
        }

        Commands::Sample { table, schema, limit, filter } => {
            let resolved = session.require_table(&table, schema.as_deref()).await?;
            let executor = session.executor();
            let result =
                sqlscout::describe::sample(&executor, &resolved, Some(limit), filter.as_deref())
                    .await?;
            let rows = result.row_count();
            let data = json!({
                "table": resolved.full(),
                "columns": result.columns,
                "rows": result.rows,
            });
            (data, Some(rows))
        }
    };

    let elapsed = started.elapsed().as_millis() as u64;
    let meta = match rows {
        Some(rows) => Metadata::with_rows(elapsed, rows),
        None => Metadata::new(elapsed),
    };
    let envelope = SuccessEnvelope::new(engine, name, data, meta);
    Ok(serde_json::to_string(&envelope)?)
}

fn edge_json(edge: &ForeignKeyEdge) -> Value {
    json!({
        "name": edge.name,
        "parent": edge.parent.full(),
        "child": edge.child.full(),
        "columns": edge.column_pairs,
        "join": edge.join_sql(),
        "self_reference": edge.is_self_reference(),
    })
}
