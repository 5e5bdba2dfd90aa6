//! The single managed connection behind a handler.
//!
//! Tracks whether a transaction is open so that read-committed mode can open one
//! implicitly on the first statement, the way DB-API drivers do, while autocommit
//! mode runs each statement on its own.

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::driver::{ConnectTarget, Driver, DriverConnection, connect_with};
use crate::error::{DriverError, SqlHandlerError};
use crate::results::ResultSet;
use crate::translation::PlaceholderStyle;
use crate::types::{IsolationLevel, RowValues};

pub(crate) struct ManagedConnection {
    driver: Arc<dyn Driver>,
    target: ConnectTarget,
    inner: Option<Box<dyn DriverConnection>>,
    isolation: IsolationLevel,
    pub(crate) in_transaction: bool,
    pub(crate) needs_rollback: bool,
}

impl ManagedConnection {
    /// Connect right away; failure here fails handler construction.
    pub(crate) async fn open(
        driver: Arc<dyn Driver>,
        target: ConnectTarget,
    ) -> Result<Self, SqlHandlerError> {
        let inner = connect_with(driver.as_ref(), &target).await?;
        Ok(Self {
            driver,
            target,
            inner: Some(inner),
            isolation: IsolationLevel::default(),
            in_transaction: false,
            needs_rollback: false,
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.as_ref().is_none_or(|c| c.is_closed())
    }

    pub(crate) fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub(crate) fn placeholder_style(&self) -> PlaceholderStyle {
        self.driver.placeholder_style()
    }

    /// Change isolation, rolling back an open transaction first.
    pub(crate) async fn set_isolation(&mut self, level: IsolationLevel) {
        if self.in_transaction {
            self.rollback_quietly().await;
        }
        tracing::debug!(?level, "isolation level changed");
        self.isolation = level;
    }

    /// Hand out a cursor, reopening the connection and finishing an abandoned
    /// transaction first. Any failure on the way is a connection error.
    pub(crate) async fn cursor(&mut self, translate: bool) -> Result<Cursor<'_>, SqlHandlerError> {
        if self.is_closed() {
            tracing::info!(backend = self.driver.name(), "connection closed, reopening");
            self.inner = None;
            let inner = connect_with(self.driver.as_ref(), &self.target).await?;
            self.inner = Some(inner);
            self.in_transaction = false;
            self.needs_rollback = false;
        }

        if self.needs_rollback {
            tracing::debug!("rolling back transaction left open by a dropped cursor");
            self.rollback().await.map_err(|e| {
                SqlHandlerError::ConnectionError(format!("Error running query: {e}"))
            })?;
            self.needs_rollback = false;
        }

        Ok(Cursor::new(self, translate))
    }

    fn live(&mut self) -> Result<&mut Box<dyn DriverConnection>, DriverError> {
        self.inner.as_mut().ok_or(DriverError::Closed)
    }

    /// Open a transaction unless one is already open.
    pub(crate) async fn begin(&mut self) -> Result<(), DriverError> {
        if self.in_transaction {
            return Ok(());
        }
        let isolation = self.isolation;
        let conn = self.live()?;
        let begin = conn.begin_sql(isolation);
        conn.batch_execute(begin).await?;
        self.in_transaction = true;
        Ok(())
    }

    pub(crate) async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<u64, DriverError> {
        if !self.isolation.is_autocommit() {
            self.begin().await?;
        }
        tracing::debug!(sql, params = params.len(), "executing statement");
        self.live()?.execute(sql, params).await
    }

    pub(crate) async fn fetch_all(&mut self) -> Result<ResultSet, DriverError> {
        self.live()?.fetch_all().await
    }

    /// A failed commit leaves the transaction marked open so it is rolled back.
    pub(crate) async fn commit(&mut self) -> Result<(), DriverError> {
        if !self.in_transaction {
            return Ok(());
        }
        self.live()?.batch_execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> Result<(), DriverError> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.live()?.batch_execute("ROLLBACK").await
    }

    /// Roll back, logging instead of returning a failure.
    pub(crate) async fn rollback_quietly(&mut self) {
        if let Err(e) = self.rollback().await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }

    /// Release the driver connection. Calling this on a closed connection is a no-op.
    pub(crate) async fn close(&mut self) {
        self.in_transaction = false;
        self.needs_rollback = false;
        if let Some(mut conn) = self.inner.take() {
            if conn.is_closed() {
                return;
            }
            tracing::info!(backend = self.driver.name(), "closing connection");
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "error while closing connection");
            }
        }
    }
}
