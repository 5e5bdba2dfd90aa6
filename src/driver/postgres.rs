use std::error::Error;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls, Row, Statement};
use tokio_util::bytes;
use uuid::Uuid;

use super::{ConnectTarget, Driver, DriverConnection};
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::translation::PlaceholderStyle;
use crate::types::{IsolationLevel, RowValues};

/// `PostgreSQL` over `tokio-postgres`, without TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Postgres
    }

    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let mut config = tokio_postgres::Config::new();
        config.host(&target.host).port(target.port);
        if let Some(user) = &target.user {
            config.user(user);
        }
        if let Some(password) = &target.password {
            config.password(password);
        }
        if let Some(database) = &target.database {
            config.dbname(database);
        }

        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection task ended with an error");
            }
        });

        Ok(Box::new(PostgresConnection {
            client: Some(client),
            pending: None,
        }))
    }
}

/// A live `tokio-postgres` client plus the rows of the last statement.
pub struct PostgresConnection {
    client: Option<Client>,
    pending: Option<ResultSet>,
}

impl PostgresConnection {
    fn client(&self) -> Result<&Client, DriverError> {
        self.client.as_ref().ok_or(DriverError::Closed)
    }
}

#[async_trait]
impl DriverConnection for PostgresConnection {
    fn is_closed(&self) -> bool {
        self.client.as_ref().is_none_or(Client::is_closed)
    }

    fn begin_sql(&self, isolation: IsolationLevel) -> &'static str {
        match isolation {
            IsolationLevel::ReadCommitted => "BEGIN ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::Autocommit => "BEGIN",
        }
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        self.pending = None;
        let client = self.client()?;
        let stmt = client.prepare(sql).await?;
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if stmt.columns().is_empty() {
            return Ok(client.execute(&stmt, &refs).await?);
        }

        let rows = client.query(&stmt, &refs).await?;
        let result_set = build_result_set(&stmt, &rows)?;
        let count = rows.len() as u64;
        self.pending = Some(result_set);
        Ok(count)
    }

    async fn fetch_all(&mut self) -> Result<ResultSet, DriverError> {
        self.pending.take().ok_or(DriverError::NoResultSet)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.pending = None;
        Ok(self.client()?.batch_execute(sql).await?)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.pending = None;
        // Dropping the client ends the spawned connection task.
        self.client = None;
        Ok(())
    }
}

/// Build a result set from rows of a prepared statement.
///
/// # Errors
/// Returns errors from value extraction.
fn build_result_set(stmt: &Statement, rows: &[Row]) -> Result<ResultSet, DriverError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_columns(column_names, rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(postgres_extract_value(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `DriverError` if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, DriverError> {
    let type_info = row.columns()[idx].type_();

    let value = match *type_info {
        Type::INT2 => {
            let val: Option<i16> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        Type::INT4 => {
            let val: Option<i32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        Type::INT8 => {
            let val: Option<i64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Int)
        }
        Type::FLOAT4 => {
            let val: Option<f32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))
        }
        Type::FLOAT8 => {
            let val: Option<f64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Float)
        }
        Type::BOOL => {
            let val: Option<bool> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Bool)
        }
        Type::TIMESTAMP => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Timestamp)
        }
        Type::TIMESTAMPTZ => {
            let val: Option<DateTime<Utc>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc()))
        }
        Type::DATE => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
        }
        Type::TIME => {
            let val: Option<NaiveTime> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
        }
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(val) => val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string())),
            // NaN or more digits than a Decimal holds
            Err(_) => raw_value(row, idx)?,
        },
        Type::UUID => {
            let val: Option<Uuid> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
        }
        Type::JSON | Type::JSONB => {
            let val: Option<Value> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::JSON)
        }
        Type::BYTEA => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Blob)
        }
        _ if <String as FromSql>::accepts(type_info) => {
            let val: Option<String> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Text)
        }
        _ => raw_value(row, idx)?,
    };
    Ok(value)
}

/// The undecoded wire bytes of a column of any type.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxedError> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn raw_value(row: &Row, idx: usize) -> Result<RowValues, DriverError> {
    let val: Option<RawBytes> = row.try_get(idx)?;
    Ok(val.map_or(RowValues::Null, |RawBytes(bytes)| RowValues::Blob(bytes)))
}

type BoxedError = Box<dyn Error + Sync + Send>;

impl ToSql for RowValues {
    fn to_sql(&self, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxedError> {
        match self {
            RowValues::Int(i) => int_to_sql(*i, ty, out),
            RowValues::Float(f) => float_to_sql(*f, ty, out),
            RowValues::Text(s) => text_to_sql(s, ty, out),
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => Utc.from_utc_datetime(dt).to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
                | Type::NUMERIC
                | Type::UUID
        )
    }

    to_sql_checked!();
}

// The server decides the parameter type from context, so an i64 may have to be sent
// as a narrower integer or as a float.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn int_to_sql(i: i64, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxedError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => i.to_string().to_sql(ty, out),
        _ => i.to_sql(ty, out),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_sql(f: f64, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxedError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => f.to_string().to_sql(ty, out),
        _ => f.to_sql(ty, out),
    }
}

fn text_to_sql(s: &str, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxedError> {
    match *ty {
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::BOOL => s.trim().parse::<bool>()?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<Value>(s)?.to_sql(ty, out),
        Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::DATE => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(date) => date.to_sql(ty, out),
            Err(_) => timestamp_from_text(s)?.date().to_sql(ty, out),
        },
        Type::TIMESTAMP | Type::TIMESTAMPTZ => {
            RowValues::Timestamp(timestamp_from_text(s)?).to_sql(ty, out)
        }
        _ => s.to_sql(ty, out),
    }
}

fn timestamp_from_text(s: &str) -> Result<NaiveDateTime, BoxedError> {
    RowValues::Text(s.to_string())
        .as_timestamp()
        .ok_or_else(|| format!("cannot read {s:?} as a timestamp").into())
}
