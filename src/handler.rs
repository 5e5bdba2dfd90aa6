use std::sync::Arc;

use crate::config::{AdminMode, DbSettings};
use crate::connection::ManagedConnection;
use crate::cursor::Cursor;
use crate::driver::{Driver, driver_for};
use crate::error::SqlHandlerError;
use crate::queue::QueueTable;
use crate::types::IsolationLevel;

/// One database connection plus a table of named statement queues.
///
/// Single statements run through [`execute`](Self::execute) and the `fetch_*`
/// methods, each in its own commit/rollback boundary. Several statements can be
/// staged in a queue and run as one transaction with
/// [`execute_queue`](Self::execute_queue):
///
/// ```rust,no_run
/// use sql_queue_handler::prelude::*;
///
/// # async fn demo() -> Result<(), SqlHandlerError> {
/// let settings = DbSettings::from_env()?;
/// let mut handler = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
///
/// handler.create_queue("signup")?;
/// handler.add_to_queue(
///     "signup",
///     "INSERT INTO users (email) VALUES ($1) RETURNING id",
///     vec![RowValues::from("a@b.c")],
/// )?;
/// handler.add_to_queue(
///     "signup",
///     "INSERT INTO profiles (user_id) VALUES ($1)",
///     vec![RowValues::from("{0}")],
/// )?;
/// let leftover = handler.execute_queue("signup").await?;
/// assert!(leftover.is_empty());
/// # Ok(())
/// # }
/// ```
///
/// All mutating methods take `&mut self`; share a handler across tasks behind a
/// mutex.
pub struct SqlConnectionHandler {
    pub(crate) conn: ManagedConnection,
    pub(crate) queues: QueueTable,
    pub(crate) translate: bool,
    mode: AdminMode,
}

impl SqlConnectionHandler {
    /// Connect with the built-in driver for `settings.backend`.
    ///
    /// # Errors
    /// Returns `SqlHandlerError::ConnectionError` if the connection cannot be opened.
    pub async fn new(settings: &DbSettings, mode: AdminMode) -> Result<Self, SqlHandlerError> {
        Self::with_driver(driver_for(settings.backend), settings, mode).await
    }

    /// Connect with the settings file named by `SQL_HANDLER_CONFIG_FP`.
    ///
    /// # Errors
    /// `ConfigError` if the settings cannot be loaded, `ConnectionError` if connecting fails.
    pub async fn from_env(mode: AdminMode) -> Result<Self, SqlHandlerError> {
        let settings = DbSettings::from_env()?;
        Self::new(&settings, mode).await
    }

    /// Connect through a caller-supplied driver.
    ///
    /// # Errors
    /// `ConfigError` if `mode` needs credentials the settings lack,
    /// `ConnectionError` if the connection cannot be opened.
    pub async fn with_driver(
        driver: Arc<dyn Driver>,
        settings: &DbSettings,
        mode: AdminMode,
    ) -> Result<Self, SqlHandlerError> {
        let conn = ManagedConnection::open(driver, settings.target(mode)?).await?;
        Ok(Self {
            conn,
            queues: QueueTable::default(),
            translate: settings.translate_placeholders,
            mode,
        })
    }

    #[must_use]
    pub fn admin_mode(&self) -> AdminMode {
        self.mode
    }

    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.conn.isolation().is_autocommit()
    }

    /// Switch between autocommit and read-committed.
    ///
    /// An open transaction is rolled back first.
    pub async fn set_autocommit(&mut self, autocommit: bool) {
        self.set_isolation_level(IsolationLevel::from_autocommit(autocommit))
            .await;
    }

    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.conn.isolation()
    }

    pub async fn set_isolation_level(&mut self, level: IsolationLevel) {
        self.conn.set_isolation(level).await;
    }

    /// Lend a cursor to `scope` and end its transaction when the scope returns:
    /// committed on `Ok`, rolled back on `Err`.
    ///
    /// ```rust,no_run
    /// # use sql_queue_handler::prelude::*;
    /// # async fn demo(handler: &mut SqlConnectionHandler) -> Result<(), SqlHandlerError> {
    /// let moved = handler
    ///     .with_cursor(async |cur| {
    ///         let n = cur.execute("UPDATE jobs SET state = 'done' WHERE state = 'running'", ()).await?;
    ///         cur.execute("INSERT INTO audit (note) VALUES ($1)", vec![RowValues::from("jobs closed")]).await?;
    ///         Ok(n)
    ///     })
    ///     .await?;
    /// # let _ = moved;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// `ConnectionError` if reopening the connection or finishing an abandoned
    /// transaction fails, `ExecutionError` if the final commit fails, and whatever
    /// `scope` returns.
    pub async fn with_cursor<T, F>(&mut self, scope: F) -> Result<T, SqlHandlerError>
    where
        F: AsyncFnOnce(&mut Cursor<'_>) -> Result<T, SqlHandlerError>,
    {
        let mut cursor = self.conn.cursor(self.translate).await?;
        match scope(&mut cursor).await {
            Ok(value) => {
                cursor.commit().await?;
                Ok(value)
            }
            Err(e) => {
                cursor.rollback_quietly().await;
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// Close the connection. The next cursor request reopens it with the same mode.
    pub async fn close(&mut self) {
        self.conn.close().await;
    }
}
