use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{Connection, Statement, ToSql};
use tokio::sync::Mutex;

use super::{ConnectTarget, Driver, DriverConnection};
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::translation::PlaceholderStyle;
use crate::types::RowValues;

type SharedSqliteConnection = Arc<Mutex<Connection>>;

/// Embedded `SQLite` through `rusqlite`.
///
/// The target's `database` is the file path; user, password, host and port are
/// ignored. Without a database an in-memory database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Sqlite
    }

    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let path = target.database.clone();
        let conn = tokio::task::spawn_blocking(move || match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        })
        .await
        .map_err(|e| DriverError::Other(format!("sqlite spawn_blocking join error: {e}")))??;

        Ok(Box::new(SqliteConnection {
            conn: Some(Arc::new(Mutex::new(conn))),
            pending: None,
        }))
    }
}

/// A `rusqlite` connection driven from blocking tasks.
pub struct SqliteConnection {
    conn: Option<SharedSqliteConnection>,
    pending: Option<ResultSet>,
}

impl SqliteConnection {
    fn conn_handle(&self) -> Result<SharedSqliteConnection, DriverError> {
        self.conn.as_ref().map(Arc::clone).ok_or(DriverError::Closed)
    }
}

async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, DriverError>
where
    F: FnOnce(&mut Connection) -> Result<R, DriverError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| DriverError::Other(format!("sqlite spawn_blocking join error: {e}")))?
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        self.pending = None;
        let handle = self.conn_handle()?;
        let sql = sql.to_owned();
        let values: Vec<Value> = params.iter().map(row_value_to_sqlite_value).collect();

        let (count, result_set) = run_blocking(handle, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            if stmt.column_count() == 0 {
                let affected = stmt.execute(rusqlite::params_from_iter(values.iter()))?;
                Ok((affected as u64, None))
            } else {
                let result_set = build_result_set(&mut stmt, &values)?;
                Ok((result_set.len() as u64, Some(result_set)))
            }
        })
        .await?;

        self.pending = result_set;
        Ok(count)
    }

    async fn fetch_all(&mut self) -> Result<ResultSet, DriverError> {
        self.pending.take().ok_or(DriverError::NoResultSet)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.pending = None;
        let handle = self.conn_handle()?;
        let sql = sql.to_owned();
        run_blocking(handle, move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.pending = None;
        self.conn = None;
        Ok(())
    }
}

/// Convert a bound value into a rusqlite `Value`.
///
/// `SQLite` has no boolean, timestamp or JSON storage class, so those are stored as
/// integers and text.
fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, DriverError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Run a row-returning statement and collect every row.
fn build_result_set(stmt: &mut Statement, params: &[Value]) -> Result<ResultSet, DriverError> {
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut rows_iter = stmt.query(&param_refs[..])?;
    let mut result_set = ResultSet::with_columns(column_names, 10);

    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
