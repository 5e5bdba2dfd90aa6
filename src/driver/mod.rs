//! The database capability set the handler is written against.
//!
//! A [`Driver`] knows how to open a [`DriverConnection`]; a connection runs one
//! statement at a time and keeps the rows of the last statement around until they
//! are fetched. Transactions, isolation and cursors are layered on top of this in
//! [`crate::connection`], so a backend only has to provide the primitives below.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DriverError, SqlHandlerError};
use crate::results::ResultSet;
use crate::translation::PlaceholderStyle;
use crate::types::{DatabaseType, IsolationLevel, RowValues};

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

/// Everything needed to open one connection.
///
/// `database` is `None` when connecting to the server without selecting a database.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectTarget {
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub host: String,
    pub port: u16,
}

// Keep passwords out of logs and error messages.
impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        write!(f, "{}:{}", self.host, self.port)?;
        match &self.database {
            Some(db) => write!(f, "/{db}"),
            None => f.write_str(" (no database)"),
        }
    }
}

/// A backend able to open connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short backend name used in log output.
    fn name(&self) -> &'static str;

    /// The positional bind-marker style statements must use.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Open a new connection.
    ///
    /// # Errors
    /// Returns `DriverError` if the server cannot be reached or rejects the connection.
    async fn connect(&self, target: &ConnectTarget)
    -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// One open connection to a backend.
#[async_trait]
pub trait DriverConnection: Send {
    fn is_closed(&self) -> bool;

    /// Statement that opens a transaction at the given isolation.
    fn begin_sql(&self, _isolation: IsolationLevel) -> &'static str {
        "BEGIN"
    }

    /// Run one statement and return the affected row count.
    ///
    /// Rows produced by the statement are kept until [`DriverConnection::fetch_all`]
    /// is called or the next statement runs.
    ///
    /// # Errors
    /// Returns `DriverError` if preparing, binding or executing the statement fails.
    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError>;

    /// Take the rows of the last statement.
    ///
    /// # Errors
    /// Returns `DriverError::NoResultSet` when the last statement produced no rows
    /// description, e.g. a plain `INSERT`.
    async fn fetch_all(&mut self) -> Result<ResultSet, DriverError>;

    /// Run one or more statements without parameters or results.
    ///
    /// # Errors
    /// Returns `DriverError` if the server rejects the batch.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if the backend fails while shutting the connection down.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Pick the built-in driver for a backend.
#[must_use]
pub fn driver_for(backend: DatabaseType) -> Arc<dyn Driver> {
    match backend {
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => Arc::new(PostgresDriver),
        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => Arc::new(SqliteDriver),
    }
}

/// Open a connection, reporting any failure as a connection error.
pub(crate) async fn connect_with(
    driver: &dyn Driver,
    target: &ConnectTarget,
) -> Result<Box<dyn DriverConnection>, SqlHandlerError> {
    tracing::info!(backend = driver.name(), target = %target, "opening connection");
    driver.connect(target).await.map_err(|e| {
        SqlHandlerError::ConnectionError(format!("Cannot connect to database {target}: {e}"))
    })
}
