use thiserror::Error;

/// Failures raised by a driver connection.
///
/// These never reach callers of [`crate::SqlConnectionHandler`] directly; they are
/// translated into [`SqlHandlerError`] with statement and argument context first.
#[derive(Debug, Error)]
pub enum DriverError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// The last statement did not produce a result set (e.g. a plain INSERT).
    #[error("no results to fetch")]
    NoResultSet,

    #[error("connection already closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    #[must_use]
    pub fn is_no_result_set(&self) -> bool {
        matches!(self, Self::NoResultSet)
    }
}

#[derive(Debug, Error)]
pub enum SqlHandlerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Argument type error: {0}")]
    ArgumentTypeError(String),

    /// A statement, fetch, commit or placeholder resolution failed. The active
    /// transaction has already been rolled back when this is returned.
    #[error("{}", render_execution(.queue.as_deref(), .sql, .args, .cause))]
    ExecutionError {
        queue: Option<String>,
        sql: String,
        args: String,
        cause: String,
    },

    #[error("Queue already contains {0}")]
    DuplicateQueue(String),

    #[error("Queue {0} does not exist")]
    QueueNotFound(String),
}

impl SqlHandlerError {
    pub(crate) fn execution(sql: &str, args: impl Into<String>, cause: impl ToString) -> Self {
        Self::ExecutionError {
            queue: None,
            sql: sql.to_string(),
            args: args.into(),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn queued_execution(
        queue: &str,
        sql: &str,
        args: impl Into<String>,
        cause: impl ToString,
    ) -> Self {
        Self::ExecutionError {
            queue: Some(queue.to_string()),
            sql: sql.to_string(),
            args: args.into(),
            cause: cause.to_string(),
        }
    }

    /// Name of the queue an execution error came from, if any.
    #[must_use]
    pub fn queue(&self) -> Option<&str> {
        match self {
            Self::ExecutionError { queue, .. } => queue.as_deref(),
            _ => None,
        }
    }
}

fn render_execution(queue: Option<&str>, sql: &str, args: &str, cause: &str) -> String {
    match queue {
        Some(name) => format!(
            "Error running SQL query in queue {name}: {sql}\nARGS: {args}\nError: {cause}"
        ),
        None => format!("Error running SQL query: {sql}\nARGS: {args}\nError: {cause}"),
    }
}
