//! Single-statement execution, each call in its own commit/rollback boundary.

use crate::args::{IntoSqlArgs, SqlArgs, check_named_args, check_sql_args, check_sql_args_many};
use crate::error::SqlHandlerError;
use crate::handler::SqlConnectionHandler;
use crate::results::{CustomDbRow, ResultSet};

impl SqlConnectionHandler {
    /// Run a statement and commit. Returns the affected row count.
    ///
    /// # Errors
    /// - `ArgumentTypeError` if `args` is not a sequence, a mapping or nothing, or a
    ///   mapping lacks a value for one of the statement's `:name` markers; raised
    ///   before touching the connection.
    /// - `ConnectionError` if a closed connection cannot be reopened.
    /// - `ExecutionError` if the statement or the commit fails; the transaction has
    ///   been rolled back.
    pub async fn execute<A: IntoSqlArgs>(&mut self, sql: &str, args: A) -> Result<u64, SqlHandlerError> {
        let args = checked(sql, args)?;
        self.with_cursor(async |cur| cur.execute(sql, args).await).await
    }

    /// Run a statement once per argument set, all in one transaction, and commit.
    /// Returns the summed affected row count.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute); every argument set is validated, and every
    /// mapping checked against the statement's named markers, before anything runs.
    pub async fn execute_many<A, I>(&mut self, sql: &str, batch: I) -> Result<u64, SqlHandlerError>
    where
        A: IntoSqlArgs,
        I: IntoIterator<Item = A>,
    {
        let batch = check_sql_args_many(batch)?;
        for args in &batch {
            check_named_args(sql, args.as_ref())?;
        }
        self.with_cursor(async |cur| cur.execute_many(sql, batch).await)
            .await
    }

    /// Run a statement, commit, and return its first row.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute). A statement that returns no result set
    /// (a plain `INSERT`, say) is an `ExecutionError` too.
    pub async fn fetch_one<A: IntoSqlArgs>(
        &mut self,
        sql: &str,
        args: A,
    ) -> Result<Option<CustomDbRow>, SqlHandlerError> {
        let args = checked(sql, args)?;
        self.with_cursor(async |cur| {
            cur.execute(sql, args).await?;
            cur.fetch_one().await
        })
        .await
    }

    /// Run a statement, commit, and return all of its rows.
    ///
    /// # Errors
    /// Same as [`fetch_one`](Self::fetch_one).
    pub async fn fetch_all<A: IntoSqlArgs>(
        &mut self,
        sql: &str,
        args: A,
    ) -> Result<ResultSet, SqlHandlerError> {
        let args = checked(sql, args)?;
        self.with_cursor(async |cur| {
            cur.execute(sql, args).await?;
            cur.fetch_all().await
        })
        .await
    }
}

fn checked<A: IntoSqlArgs>(sql: &str, args: A) -> Result<Option<SqlArgs>, SqlHandlerError> {
    let args = check_sql_args(args)?;
    check_named_args(sql, args.as_ref())?;
    Ok(args)
}
