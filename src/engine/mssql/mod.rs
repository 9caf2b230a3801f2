//! SQL Server Database Engine Implementation
//!
//! # Features
//! - TDS 7.3 over TCP with SQL authentication
//! - Login bounded by the configured login timeout
//! - Positional parameters bound as `@P1..@Pn`
//! - Rows are read one at a time and reading stops at the row limit
//!
//! # Implementation Notes
//! - Uses `tiberius` (async driver on tokio via `tokio-util` compat)
//! - DECIMAL/NUMERIC rendered as exact decimal strings
//! - Dates and times rendered as ISO-8601 strings via `chrono`
//! - GUIDs rendered as strings
//! - VARBINARY data is Base64-encoded for JSON safety
//! - I/O, TLS and protocol failures are connection-class

use std::borrow::Cow;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::{Stream, TryStreamExt};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, Query, QueryItem};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::{ConnectionConfig, Settings};
use crate::engine::{Connection, Connector, Dialect, QueryResult, SqlParam};
use crate::error::{DriverError, Result, ScoutError};

/// Opens TDS connections to one SQL Server database
#[derive(Debug, Clone)]
pub struct MssqlConnector {
    config: ConnectionConfig,
    trust_server_certificate: bool,
    login_timeout: Duration,
}

impl MssqlConnector {
    pub fn new(config: ConnectionConfig, settings: &Settings) -> Self {
        Self {
            config,
            trust_server_certificate: settings.trust_server_certificate,
            login_timeout: settings.login_timeout(),
        }
    }

    fn tds_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));
        config.application_name("sqlscout");
        if self.trust_server_certificate {
            config.trust_cert();
        }
        config
    }

    async fn login(&self) -> std::result::Result<Client<Compat<TcpStream>>, DriverError> {
        let config = self.tds_config();

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DriverError::connection(format!("TCP connect failed: {e}")))?;
        tcp.set_nodelay(true)
            .map_err(|e| DriverError::connection(format!("Failed to set TCP_NODELAY: {e}")))?;

        Client::connect(config, tcp.compat_write()).await.map_err(classify)
    }
}

/// Live SQL Server connection
pub struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
}

impl Connector for MssqlConnector {
    type Connection = MssqlConnection;

    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn target(&self) -> String {
        self.config.target()
    }

    async fn connect(&self) -> Result<MssqlConnection> {
        let started = Instant::now();

        let client = match tokio::time::timeout(self.login_timeout, self.login()).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(ScoutError::connection_failed(self.target(), e)),
            Err(_) => {
                return Err(ScoutError::connection_failed(
                    self.target(),
                    DriverError::connection(format!(
                        "Login timed out after {}ms",
                        self.login_timeout.as_millis()
                    )),
                ))
            }
        };

        tracing::debug!(
            target_db = %self.target(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tds login complete"
        );
        Ok(MssqlConnection { client })
    }
}

impl Connection for MssqlConnection {
    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlParam],
        row_limit: Option<usize>,
    ) -> std::result::Result<QueryResult, DriverError> {
        let mut query = Query::new(sql);
        for param in params {
            match param {
                SqlParam::Null => query.bind(Option::<&str>::None),
                SqlParam::Bool(b) => query.bind(*b),
                SqlParam::Int(i) => query.bind(*i),
                SqlParam::Float(f) => query.bind(*f),
                SqlParam::Text(s) => query.bind(s.as_str()),
            }
        }

        let stream = query.query(&mut self.client).await.map_err(classify)?;
        let limit = row_limit.unwrap_or(usize::MAX);
        read_first_result(stream.map_ok(ResultItem::from), limit).await.map_err(classify)
    }

    async fn close(self) -> std::result::Result<(), DriverError> {
        self.client.close().await.map_err(classify)
    }
}

/// One item of a TDS response, reduced to what the first result set needs
enum ResultItem {
    Columns(Vec<String>),
    Row(Vec<serde_json::Value>),
    /// Metadata or rows of a later result set
    NextResult,
}

impl From<QueryItem> for ResultItem {
    fn from(item: QueryItem) -> Self {
        match item {
            QueryItem::Metadata(meta) if meta.result_index() == 0 => {
                Self::Columns(meta.columns().iter().map(|c| c.name().to_string()).collect())
            }
            QueryItem::Row(row) if row.result_index() == 0 => {
                Self::Row(row.into_iter().map(column_to_json).collect())
            }
            _ => Self::NextResult,
        }
    }
}

/// Read the first result set, stopping at `limit` rows.
///
/// Nothing past the limit is polled; the client drains the rest of the
/// response before its next request.
async fn read_first_result<S, E>(items: S, limit: usize) -> std::result::Result<QueryResult, E>
where
    S: Stream<Item = std::result::Result<ResultItem, E>>,
{
    let mut items = std::pin::pin!(items);
    let mut result = QueryResult::default();

    while result.rows.len() < limit {
        match items.try_next().await? {
            Some(ResultItem::Columns(columns)) => result.columns = columns,
            Some(ResultItem::Row(row)) => result.rows.push(row),
            Some(ResultItem::NextResult) | None => break,
        }
    }
    Ok(result)
}

fn classify(e: tiberius::error::Error) -> DriverError {
    use tiberius::error::Error;

    match e {
        Error::Io { .. } | Error::Tls(_) | Error::Protocol(_) | Error::Routing { .. } => {
            DriverError::connection(e.to_string())
        }
        _ => DriverError::statement(e.to_string()),
    }
}

fn column_to_json(data: ColumnData<'static>) -> serde_json::Value {
    use serde_json::Value;

    match data {
        ColumnData::U8(v) => v.map_or(Value::Null, Value::from),
        ColumnData::I16(v) => v.map_or(Value::Null, Value::from),
        ColumnData::I32(v) => v.map_or(Value::Null, Value::from),
        ColumnData::I64(v) => v.map_or(Value::Null, Value::from),
        ColumnData::F32(v) => float_to_json(v.map(f64::from)),
        ColumnData::F64(v) => float_to_json(v),
        ColumnData::Bit(v) => v.map_or(Value::Null, Value::Bool),
        ColumnData::String(v) => v.map_or(Value::Null, |s| Value::String(s.into_owned())),
        ColumnData::Guid(v) => v.map_or(Value::Null, |g| Value::String(g.to_string())),
        ColumnData::Binary(v) => v.map_or(Value::Null, |b| Value::String(encode_binary(&b))),
        ColumnData::Numeric(v) => {
            v.map_or(Value::Null, |n| Value::String(decimal_string(n.value(), n.scale())))
        }
        ColumnData::Xml(v) => v.map_or(Value::Null, |x| Value::String(x.to_string())),
        other => temporal_to_json(&other),
    }
}

fn float_to_json(v: Option<f64>) -> serde_json::Value {
    v.and_then(serde_json::Number::from_f64)
        .map_or(serde_json::Value::Null, serde_json::Value::Number) // Handle NaN/Infinity as null
}

fn encode_binary(bytes: &Cow<'_, [u8]>) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn temporal_to_json(data: &ColumnData<'static>) -> serde_json::Value {
    let text = match data {
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .ok()
                .flatten()
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data).ok().flatten().map(|d| d.to_string()),
        ColumnData::Time(_) => NaiveTime::from_sql(data).ok().flatten().map(|t| t.to_string()),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .ok()
            .flatten()
            .map(|dt| dt.to_rfc3339()),
        _ => None,
    };
    text.map_or(serde_json::Value::Null, serde_json::Value::String)
}

/// Render a scaled integer as an exact decimal (`12345`, scale 2 -> `123.45`)
fn decimal_string(value: i128, scale: u8) -> String {
    let scale = usize::from(scale);
    if scale == 0 {
        return value.to_string();
    }

    let digits = format!("{:0>width$}", value.unsigned_abs(), width = scale + 1);
    let (whole, fraction) = digits.split_at(digits.len() - scale);
    let sign = if value < 0 { "-" } else { "" };
    format!("{sign}{whole}.{fraction}")
}
