//! Named, single-use statement queues.
//!
//! A queue collects statements in FIFO order and runs them as one transaction.
//! Rows returned along the way are flattened into a result buffer, and a later
//! argument written as `"{i}"` is replaced by the `i`-th buffered value. The buffer
//! is emptied after every statement that consumed it. A queue is removed once it
//! has been executed, whether it succeeded or not.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

use crate::args::{
    IntoSqlArgs, SqlArgs, check_named_args, check_sql_args, check_sql_args_many, describe_args,
};
use crate::cursor::Cursor;
use crate::error::{DriverError, SqlHandlerError};
use crate::handler::SqlConnectionHandler;
use crate::results::ResultSet;
use crate::types::RowValues;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([0-9]+)\}$").expect("placeholder pattern compiles"));

/// One staged statement and its (unresolved) arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedStatement {
    pub sql: String,
    pub args: Option<SqlArgs>,
}

#[derive(Debug, Default)]
pub(crate) struct QueueTable {
    queues: IndexMap<String, Vec<QueuedStatement>>,
}

impl QueueTable {
    fn create(&mut self, name: &str) -> Result<(), SqlHandlerError> {
        if self.queues.contains_key(name) {
            return Err(SqlHandlerError::DuplicateQueue(name.to_string()));
        }
        self.queues.insert(name.to_string(), Vec::new());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&[QueuedStatement], SqlHandlerError> {
        self.queues
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| SqlHandlerError::QueueNotFound(name.to_string()))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Vec<QueuedStatement>, SqlHandlerError> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| SqlHandlerError::QueueNotFound(name.to_string()))
    }

    fn take(&mut self, name: &str) -> Result<Vec<QueuedStatement>, SqlHandlerError> {
        self.queues
            .shift_remove(name)
            .ok_or_else(|| SqlHandlerError::QueueNotFound(name.to_string()))
    }

    fn names(&self) -> Vec<&str> {
        self.queues.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Error)]
#[error("placeholder {{{index}}} has no corresponding prior result ({available} buffered)")]
pub(crate) struct PlaceholderOutOfRange {
    index: String,
    available: usize,
}

/// Values returned so far by the statements of one queue run.
#[derive(Debug, Default)]
pub(crate) struct ResultBuffer {
    values: Vec<RowValues>,
}

impl ResultBuffer {
    /// Replace every `"{i}"` argument with `values[i]`.
    ///
    /// All placeholders of `args` resolve against the same buffer contents; the
    /// replacements are not scanned again. Returns whether anything was replaced,
    /// leaving `args` untouched on error.
    pub(crate) fn substitute(&self, args: &mut SqlArgs) -> Result<bool, PlaceholderOutOfRange> {
        let mut replacements = Vec::new();
        for (pos, value) in args.values().enumerate() {
            let RowValues::Text(text) = value else {
                continue;
            };
            let Some(caps) = PLACEHOLDER.captures(text) else {
                continue;
            };
            let index = &caps[1];
            let resolved = index
                .parse::<usize>()
                .ok()
                .and_then(|i| self.values.get(i))
                .ok_or_else(|| PlaceholderOutOfRange {
                    index: index.to_string(),
                    available: self.values.len(),
                })?;
            replacements.push((pos, resolved.clone()));
        }

        if replacements.is_empty() {
            return Ok(false);
        }
        let mut pending = replacements.into_iter().peekable();
        for (pos, slot) in args.values_mut().enumerate() {
            if let Some((_, value)) = pending.next_if(|(at, _)| *at == pos) {
                *slot = value;
            }
        }
        Ok(true)
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }

    pub(crate) fn extend(&mut self, rows: ResultSet) {
        self.values.extend(rows.into_flat_values());
    }

    pub(crate) fn into_values(self) -> Vec<RowValues> {
        self.values
    }
}

impl SqlConnectionHandler {
    /// Register an empty queue.
    ///
    /// # Errors
    /// Returns `SqlHandlerError::DuplicateQueue` if the name is taken; the existing
    /// queue is left as it was.
    pub fn create_queue(&mut self, name: &str) -> Result<(), SqlHandlerError> {
        self.queues.create(name)?;
        tracing::debug!(queue = name, "queue created");
        Ok(())
    }

    /// Names of the live queues, oldest first.
    #[must_use]
    pub fn list_queues(&self) -> Vec<&str> {
        self.queues.names()
    }

    /// Statements staged in a queue, in the order they will run.
    ///
    /// # Errors
    /// Returns `SqlHandlerError::QueueNotFound` for an unknown name.
    pub fn queued_statements(&self, name: &str) -> Result<&[QueuedStatement], SqlHandlerError> {
        self.queues.get(name)
    }

    /// Append one statement to the end of a queue.
    ///
    /// # Errors
    /// `QueueNotFound` for an unknown name, `ArgumentTypeError` for unsupported
    /// argument shapes or a mapping missing one of the statement's `:name` markers.
    pub fn add_to_queue<A: IntoSqlArgs>(
        &mut self,
        name: &str,
        sql: &str,
        args: A,
    ) -> Result<(), SqlHandlerError> {
        let queue = self.queues.get_mut(name)?;
        let args = check_sql_args(args)?;
        check_named_args(sql, args.as_ref())?;
        queue.push(QueuedStatement {
            sql: sql.to_string(),
            args,
        });
        Ok(())
    }

    /// Append the same statement once per argument set, in order.
    ///
    /// Nothing is appended if any argument set is rejected.
    ///
    /// # Errors
    /// `QueueNotFound` for an unknown name, `ArgumentTypeError` as for
    /// [`add_to_queue`](Self::add_to_queue).
    pub fn add_many_to_queue<A, I>(
        &mut self,
        name: &str,
        sql: &str,
        batch: I,
    ) -> Result<(), SqlHandlerError>
    where
        A: IntoSqlArgs,
        I: IntoIterator<Item = A>,
    {
        let queue = self.queues.get_mut(name)?;
        let batch = check_sql_args_many(batch)?;
        for args in &batch {
            check_named_args(sql, args.as_ref())?;
        }
        queue.extend(batch.into_iter().map(|args| QueuedStatement {
            sql: sql.to_string(),
            args,
        }));
        Ok(())
    }

    /// Run every statement of a queue in one transaction and remove the queue.
    ///
    /// Returns the values buffered since the last placeholder substitution, row by
    /// row. Statements that return no rows add nothing.
    ///
    /// # Errors
    /// - `QueueNotFound` for an unknown name.
    /// - `ConnectionError` if no cursor can be obtained; the queue is kept.
    /// - `ExecutionError` if a placeholder cannot be resolved or a statement, fetch
    ///   or the commit fails. The transaction is rolled back and the queue removed.
    pub async fn execute_queue(&mut self, name: &str) -> Result<Vec<RowValues>, SqlHandlerError> {
        self.queues.get(name)?;
        let mut cursor = self.conn.cursor(self.translate).await?;
        let statements = self.queues.take(name)?;
        tracing::debug!(queue = name, statements = statements.len(), "executing queue");

        if let Err(e) = cursor.begin().await {
            return Err(abort(&mut cursor, name, "BEGIN", None, e).await);
        }

        let mut buffer = ResultBuffer::default();
        for QueuedStatement { sql, mut args } in statements {
            if let Some(args) = args.as_mut() {
                match buffer.substitute(args) {
                    Ok(true) => buffer.clear(),
                    Ok(false) => {}
                    Err(e) => return Err(abort(&mut cursor, name, &sql, Some(&*args), e).await),
                }
            }

            let bound = match cursor.bind(&sql, args.as_ref()) {
                Ok(bound) => bound,
                Err(e) => return Err(abort(&mut cursor, name, &sql, args.as_ref(), e).await),
            };
            if let Err(e) = cursor.run_bound(&bound).await {
                return Err(abort(&mut cursor, name, &sql, args.as_ref(), e).await);
            }

            match cursor.fetch_raw().await {
                Ok(rows) => buffer.extend(rows),
                Err(DriverError::NoResultSet) => {}
                Err(e) => return Err(abort(&mut cursor, name, &sql, args.as_ref(), e).await),
            }
        }

        if let Err(e) = cursor.commit_raw().await {
            return Err(abort(&mut cursor, name, "COMMIT", None, e).await);
        }
        tracing::debug!(queue = name, "queue committed");
        Ok(buffer.into_values())
    }
}

async fn abort(
    cursor: &mut Cursor<'_>,
    queue: &str,
    sql: &str,
    args: Option<&SqlArgs>,
    cause: impl ToString,
) -> SqlHandlerError {
    cursor.rollback_quietly().await;
    tracing::debug!(queue, "queue rolled back");
    SqlHandlerError::queued_execution(queue, sql, describe_args(args), cause)
}
