//! A single-connection SQL handler with named, single-use transaction queues.
//!
//! [`SqlConnectionHandler`] owns one connection to `PostgreSQL` (through
//! `tokio-postgres`) or `SQLite` (through `rusqlite`). It runs single statements in
//! their own commit/rollback boundary and lets callers stage several statements in
//! a named queue that runs as one transaction. Inside a queue, an argument written
//! as `"{0}"`, `"{1}"`, ... picks up a value returned by an earlier statement.
//!
//! ```rust,no_run
//! use sql_queue_handler::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlHandlerError> {
//! let settings = DbSettings::sqlite("app.db");
//! let mut handler = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
//!
//! handler.execute("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, v TEXT)", ()).await?;
//! handler.create_queue("q")?;
//! handler.add_to_queue("q", "INSERT INTO t (v) VALUES (?1) RETURNING id", vec![RowValues::from("a")])?;
//! handler.add_to_queue("q", "SELECT v FROM t WHERE id = ?1", vec![RowValues::from("{0}")])?;
//! let values = handler.execute_queue("q").await?;
//! assert_eq!(values, vec![RowValues::from("a")]);
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod config;
pub(crate) mod connection;
pub mod cursor;
pub mod driver;
pub mod error;
mod executor;
pub mod handler;
pub mod prelude;
pub mod queue;
pub mod results;
pub mod translation;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use args::{IntoSqlArgs, SqlArgs, check_sql_args, check_sql_args_many};
pub use config::{AdminMode, CONFIG_PATH_ENV, DbSettings};
pub use cursor::Cursor;
pub use driver::{ConnectTarget, Driver, DriverConnection, driver_for};
pub use error::{DriverError, SqlHandlerError};
pub use handler::SqlConnectionHandler;
pub use queue::QueuedStatement;
pub use results::{CustomDbRow, ResultSet};
pub use translation::{PlaceholderStyle, translate_placeholders};
pub use types::{DatabaseType, IsolationLevel, RowValues};
