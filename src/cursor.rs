use crate::args::{BoundStatement, IntoSqlArgs, SqlArgs, bind, check_sql_args_many, describe_args};
use crate::connection::ManagedConnection;
use crate::error::{DriverError, SqlHandlerError};
use crate::results::{CustomDbRow, ResultSet};

/// A cursor over the handler's connection, lent out by
/// [`SqlConnectionHandler::with_cursor`](crate::SqlConnectionHandler::with_cursor).
///
/// Statements run through the cursor share the connection's current transaction.
/// [`Cursor::commit`] and [`Cursor::rollback`] end it early; otherwise the scope
/// ends it. A cursor dropped mid-scope (its future was cancelled) leaves the
/// transaction to be rolled back before the next cursor is handed out.
///
/// Every failure surfaced as [`SqlHandlerError::ExecutionError`] has already been
/// rolled back.
pub struct Cursor<'c> {
    conn: &'c mut ManagedConnection,
    translate: bool,
    last_sql: Option<String>,
    last_args: String,
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(conn: &'c mut ManagedConnection, translate: bool) -> Self {
        Self {
            conn,
            translate,
            last_sql: None,
            last_args: describe_args(None),
        }
    }

    /// Run one statement and return the affected row count.
    ///
    /// # Errors
    /// `ArgumentTypeError` for unsupported argument shapes, `ExecutionError` if the
    /// statement fails.
    pub async fn execute<A: IntoSqlArgs>(&mut self, sql: &str, args: A) -> Result<u64, SqlHandlerError> {
        let args = args.into_sql_args()?;
        self.remember(sql, args.as_ref());
        let bound = self.bind(sql, args.as_ref())?;
        match self.run_bound(&bound).await {
            Ok(count) => Ok(count),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Run one statement once per argument set and return the summed row count.
    ///
    /// # Errors
    /// `ArgumentTypeError` if any argument set has an unsupported shape or a mapping
    /// lacks a named marker (nothing runs), `ExecutionError` for the first failing run.
    pub async fn execute_many<A, I>(&mut self, sql: &str, batch: I) -> Result<u64, SqlHandlerError>
    where
        A: IntoSqlArgs,
        I: IntoIterator<Item = A>,
    {
        let batch = check_sql_args_many(batch)?;
        let bound = batch
            .iter()
            .map(|args| self.bind(sql, args.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut total = 0;
        for (args, bound) in batch.iter().zip(&bound) {
            self.remember(sql, args.as_ref());
            match self.run_bound(bound).await {
                Ok(count) => total += count,
                Err(e) => return Err(self.fail(e).await),
            }
        }
        Ok(total)
    }

    /// Every row of the last statement.
    ///
    /// # Errors
    /// `ExecutionError` if the last statement produced no result set or fetching fails.
    pub async fn fetch_all(&mut self) -> Result<ResultSet, SqlHandlerError> {
        match self.fetch_raw().await {
            Ok(result_set) => Ok(result_set),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// First row of the last statement, if any.
    ///
    /// # Errors
    /// Same as [`Cursor::fetch_all`].
    pub async fn fetch_one(&mut self) -> Result<Option<CustomDbRow>, SqlHandlerError> {
        Ok(self.fetch_all().await?.into_first())
    }

    /// # Errors
    /// `ExecutionError` if the commit fails; the transaction is rolled back.
    pub async fn commit(&mut self) -> Result<(), SqlHandlerError> {
        self.remember("COMMIT", None);
        match self.conn.commit().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// # Errors
    /// `ExecutionError` if the server rejects the rollback.
    pub async fn rollback(&mut self) -> Result<(), SqlHandlerError> {
        self.conn
            .rollback()
            .await
            .map_err(|e| SqlHandlerError::execution("ROLLBACK", describe_args(None), e))
    }

    fn remember(&mut self, sql: &str, args: Option<&SqlArgs>) {
        self.last_sql = Some(sql.to_string());
        self.last_args = describe_args(args);
    }

    pub(crate) fn bind<'s>(
        &self,
        sql: &'s str,
        args: Option<&SqlArgs>,
    ) -> Result<BoundStatement<'s>, SqlHandlerError> {
        bind(sql, args, self.conn.placeholder_style(), self.translate)
    }

    pub(crate) async fn begin(&mut self) -> Result<(), DriverError> {
        self.conn.begin().await
    }

    pub(crate) async fn run_bound(&mut self, bound: &BoundStatement<'_>) -> Result<u64, DriverError> {
        self.conn.execute(&bound.sql, &bound.params).await
    }

    pub(crate) async fn fetch_raw(&mut self) -> Result<ResultSet, DriverError> {
        self.conn.fetch_all().await
    }

    pub(crate) async fn commit_raw(&mut self) -> Result<(), DriverError> {
        self.conn.commit().await
    }

    pub(crate) async fn rollback_quietly(&mut self) {
        self.conn.rollback_quietly().await;
    }

    async fn fail(&mut self, cause: DriverError) -> SqlHandlerError {
        self.rollback_quietly().await;
        let sql = self.last_sql.as_deref().unwrap_or("<no statement>");
        SqlHandlerError::execution(sql, self.last_args.clone(), cause)
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if self.conn.in_transaction {
            self.conn.needs_rollback = true;
        }
    }
}
