//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::args::{IntoSqlArgs, SqlArgs, check_sql_args, check_sql_args_many};
pub use crate::config::{AdminMode, DbSettings};
pub use crate::cursor::Cursor;
pub use crate::error::SqlHandlerError;
pub use crate::handler::SqlConnectionHandler;
pub use crate::queue::QueuedStatement;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::translation::{PlaceholderStyle, translate_placeholders};
pub use crate::types::{DatabaseType, IsolationLevel, RowValues};
