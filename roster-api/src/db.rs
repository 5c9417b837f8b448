//! PostgreSQL record store.
//!
//! Every call opens its own connection, runs one statement and closes the
//! connection before returning, on both the success and the failure path.
//! Connect, query and close each carry their own deadline, so no call can
//! outlive `connect_timeout + query_timeout + CLOSE_GRACE`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use roster_core::{DatabaseConfig, Row, RowSet, StoreError, TableName, Value};
use roster_storage::RecordStore;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, NoTls};

/// Build the driver configuration for `dbname` on the configured server.
pub(crate) fn pg_config(db: &DatabaseConfig, dbname: &str) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&db.host)
        .port(db.port)
        .user(&db.user)
        .password(&db.password)
        .dbname(dbname)
        .connect_timeout(db.connect_timeout);
    config
}

/// How long a closing connection may take to send its terminate message
/// and shut down before its task is aborted.
pub(crate) const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// A connection that lives for exactly one unit of work.
pub(crate) struct OneShotConnection {
    pub(crate) client: Client,
    driver: JoinHandle<()>,
}

impl OneShotConnection {
    /// Open a connection to `dbname`, bounded by the connect timeout.
    pub(crate) async fn open(db: &DatabaseConfig, dbname: &str) -> Result<Self, StoreError> {
        let config = pg_config(db, dbname);
        let (client, connection) = tokio::time::timeout(db.connect_timeout, config.connect(NoTls))
            .await
            .map_err(|_| StoreError::timeout("connect", db.connect_timeout))?
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(error = %err, "PostgreSQL connection closed with error");
            }
        });

        Ok(Self { client, driver })
    }

    /// Tear the connection down after a unit of work ending in `outcome`.
    ///
    /// A timed-out statement may still be pending on the server, and the
    /// driver would wait for its reply, so that case aborts at once.
    pub(crate) async fn release<T>(self, outcome: &Result<T, StoreError>) {
        if matches!(outcome, Err(StoreError::Timeout { .. })) {
            self.abort();
        } else {
            self.close().await;
        }
    }

    /// Drop the client and give the connection task [`CLOSE_GRACE`] to
    /// wind down, aborting it after that.
    pub(crate) async fn close(self) {
        let Self { client, mut driver } = self;
        drop(client);
        match tokio::time::timeout(CLOSE_GRACE, &mut driver).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "PostgreSQL connection task failed"),
            Err(_) => {
                tracing::warn!(grace = ?CLOSE_GRACE, "PostgreSQL connection did not close, aborting");
                driver.abort();
            }
        }
    }

    /// Drop the client and abort the connection task without waiting.
    pub(crate) fn abort(self) {
        drop(self.client);
        self.driver.abort();
    }
}

/// Await `fut` under `deadline`, mapping both failure kinds to [`StoreError`].
pub(crate) async fn with_deadline<T, F>(
    deadline: Duration,
    operation: &str,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, tokio_postgres::Error>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| StoreError::timeout(operation, deadline))?
        .map_err(driver_error)
}

/// Map a driver error raised after the connection was established.
pub(crate) fn driver_error(err: tokio_postgres::Error) -> StoreError {
    if err.is_closed() {
        StoreError::connection(err.to_string())
    } else {
        StoreError::query(err.to_string())
    }
}

pub(crate) fn select_all_sql(table: &TableName) -> String {
    format!("SELECT * FROM {}", table.quoted())
}

/// Record store backed by one PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    config: DatabaseConfig,
}

impl PgRecordStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fetch_all(&self, table: &TableName) -> Result<RowSet, StoreError> {
        let connection = OneShotConnection::open(&self.config, self.config.name.as_str()).await?;
        let sql = select_all_sql(table);
        let result = with_deadline(
            self.config.query_timeout,
            "query",
            connection.client.query(sql.as_str(), &[]),
        )
        .await;
        connection.release(&result).await;

        let rows = result?;
        tracing::debug!(table = %table, rows = rows.len(), "Fetched rows from PostgreSQL");
        rows.iter().map(decode_row).collect()
    }
}

/// Convert one driver row, keeping column order.
fn decode_row(row: &tokio_postgres::Row) -> Result<Row, StoreError> {
    let mut decoded = Row::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, index, column.type_()).map_err(|reason| {
            StoreError::query(format!(
                "column {} ({}): {}",
                column.name(),
                column.type_(),
                reason
            ))
        })?;
        decoded.push(column.name(), value);
    }
    Ok(decoded)
}

fn decode_value(row: &tokio_postgres::Row, index: usize, ty: &Type) -> Result<Value, String> {
    match *ty {
        Type::INT2 => nullable(row.try_get::<_, Option<i16>>(index), |v| {
            Value::Integer(v.into())
        }),
        Type::INT4 => nullable(row.try_get::<_, Option<i32>>(index), |v| {
            Value::Integer(v.into())
        }),
        Type::INT8 => nullable(row.try_get::<_, Option<i64>>(index), Value::Integer),
        Type::OID => nullable(row.try_get::<_, Option<u32>>(index), |v| {
            Value::Integer(v.into())
        }),
        Type::BOOL => nullable(row.try_get::<_, Option<bool>>(index), Value::Bool),
        Type::FLOAT4 => nullable(row.try_get::<_, Option<f32>>(index), |v| {
            Value::Float(v.into())
        }),
        Type::FLOAT8 => nullable(row.try_get::<_, Option<f64>>(index), Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            nullable(row.try_get::<_, Option<String>>(index), Value::Text)
        }
        Type::UUID => nullable(row.try_get::<_, Option<uuid::Uuid>>(index), |v| {
            Value::Text(v.to_string())
        }),
        Type::DATE => nullable(row.try_get::<_, Option<NaiveDate>>(index), |v| {
            Value::Text(v.to_string())
        }),
        Type::TIME => nullable(row.try_get::<_, Option<NaiveTime>>(index), |v| {
            Value::Text(v.to_string())
        }),
        Type::TIMESTAMP => nullable(row.try_get::<_, Option<NaiveDateTime>>(index), |v| {
            Value::Text(v.to_string())
        }),
        Type::TIMESTAMPTZ => nullable(row.try_get::<_, Option<DateTime<Utc>>>(index), |v| {
            Value::Text(v.to_rfc3339())
        }),
        Type::JSON | Type::JSONB => {
            nullable(row.try_get::<_, Option<serde_json::Value>>(index), |v| {
                Value::Text(v.to_string())
            })
        }
        Type::NUMERIC => match row.try_get::<_, Option<RawValue<'_>>>(index) {
            Ok(Some(raw)) => numeric_text(raw.0).map(Value::Text),
            Ok(None) => Ok(Value::Null),
            Err(e) => Err(e.to_string()),
        },
        _ => nullable(row.try_get::<_, Option<RawValue<'_>>>(index), |raw| {
            Value::Text(raw.to_text())
        }),
    }
}

fn nullable<T>(
    fetched: Result<Option<T>, tokio_postgres::Error>,
    convert: impl FnOnce(T) -> Value,
) -> Result<Value, String> {
    fetched
        .map(|value| value.map_or(Value::Null, convert))
        .map_err(|e| e.to_string())
}

/// Undecoded column bytes, accepted for any type.
struct RawValue<'a>(&'a [u8]);

impl RawValue<'_> {
    /// UTF-8 payloads (enums, domains over text, xml) as-is; anything else
    /// as `\x`-prefixed hex, the way PostgreSQL prints bytea.
    fn to_text(&self) -> String {
        match std::str::from_utf8(self.0) {
            Ok(text) => text.to_string(),
            Err(_) => format!("\\x{}", hex::encode(self.0)),
        }
    }
}

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawValue(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

const NUMERIC_NEGATIVE: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_POS_INF: u16 = 0xD000;
const NUMERIC_NEG_INF: u16 = 0xF000;

/// Render a binary NUMERIC (base-10000 digit groups) as decimal text,
/// keeping the column's display scale.
fn numeric_text(raw: &[u8]) -> Result<String, String> {
    let word = |at: usize| {
        raw.get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric".to_string())
    };
    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let scale = usize::from(word(6)?);
    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Result<Vec<_>, _>>()?;
    let group = |index: i32| {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_POS_INF => return Ok("Infinity".to_string()),
        NUMERIC_NEG_INF => return Ok("-Infinity".to_string()),
        NUMERIC_NEGATIVE => text.push('-'),
        0 => {}
        other => return Err(format!("invalid numeric sign {other:#06x}")),
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(0).to_string());
        for index in 1..=weight {
            text.push_str(&format!("{:04}", group(index)));
        }
    }

    if scale > 0 {
        let mut fraction = String::with_capacity(scale + 4);
        let mut index = weight + 1;
        while fraction.len() < scale {
            fraction.push_str(&format!("{:04}", group(index)));
            index += 1;
        }
        fraction.truncate(scale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}
