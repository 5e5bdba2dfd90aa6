//! Bound statement arguments.
//!
//! A statement takes either no arguments, an ordered sequence, or a mapping from
//! marker name to value. Anything that converts into [`SqlArgs`] goes through
//! [`IntoSqlArgs`], which is also where loosely-typed input (JSON) is validated.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::error::SqlHandlerError;
use crate::translation::{PlaceholderStyle, bind_named_placeholders, translate_placeholders};
use crate::types::RowValues;

/// Arguments bound to one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArgs {
    /// Values for `$1`/`?1`-style markers, in order.
    Positional(Vec<RowValues>),
    /// Values for `:name` markers.
    Named(IndexMap<String, RowValues>),
}

impl SqlArgs {
    /// Build a mapping from `(name, value)` pairs.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<RowValues>,
        I: IntoIterator<Item = (K, V)>,
    {
        SqlArgs::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            SqlArgs::Positional(values) => values.len(),
            SqlArgs::Named(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every bound value, in positional or insertion order.
    pub fn values(&self) -> Box<dyn Iterator<Item = &RowValues> + '_> {
        match self {
            SqlArgs::Positional(values) => Box::new(values.iter()),
            SqlArgs::Named(map) => Box::new(map.values()),
        }
    }

    pub fn values_mut(&mut self) -> Box<dyn Iterator<Item = &mut RowValues> + '_> {
        match self {
            SqlArgs::Positional(values) => Box::new(values.iter_mut()),
            SqlArgs::Named(map) => Box::new(map.values_mut()),
        }
    }
}

impl fmt::Display for SqlArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlArgs::Positional(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            SqlArgs::Named(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{key}': {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Render optional arguments for error messages.
pub(crate) fn describe_args(args: Option<&SqlArgs>) -> String {
    args.map_or_else(|| "None".to_string(), ToString::to_string)
}

/// Conversion into validated statement arguments.
///
/// `Ok(None)` means "no arguments". Shapes other than a sequence, a mapping or nothing
/// fail with [`SqlHandlerError::ArgumentTypeError`].
pub trait IntoSqlArgs {
    /// # Errors
    /// Returns `SqlHandlerError::ArgumentTypeError` if the value is not a sequence, a mapping or empty.
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError>;
}

impl IntoSqlArgs for () {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        Ok(None)
    }
}

impl IntoSqlArgs for SqlArgs {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        Ok(Some(self))
    }
}

impl IntoSqlArgs for Option<SqlArgs> {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        Ok(self)
    }
}

impl IntoSqlArgs for Vec<RowValues> {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        Ok(Some(SqlArgs::Positional(self)))
    }
}

impl IntoSqlArgs for &[RowValues] {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        Ok(Some(SqlArgs::Positional(self.to_vec())))
    }
}

impl<const N: usize> IntoSqlArgs for [RowValues; N] {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        Ok(Some(SqlArgs::Positional(self.into())))
    }
}

impl IntoSqlArgs for IndexMap<String, RowValues> {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        Ok(Some(SqlArgs::Named(self)))
    }
}

/// Arrays become positional arguments, objects become named arguments and `null` means
/// no arguments. Bare scalars and strings are rejected.
impl IntoSqlArgs for JsonValue {
    fn into_sql_args(self) -> Result<Option<SqlArgs>, SqlHandlerError> {
        match self {
            JsonValue::Null => Ok(None),
            JsonValue::Array(items) => Ok(Some(SqlArgs::Positional(
                items.into_iter().map(RowValues::from).collect(),
            ))),
            JsonValue::Object(map) => Ok(Some(SqlArgs::Named(
                map.into_iter().map(|(k, v)| (k, RowValues::from(v))).collect(),
            ))),
            other => Err(SqlHandlerError::ArgumentTypeError(format!(
                "sql_args should be a sequence or a mapping, found {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Validate one argument set without binding it to a statement.
///
/// # Errors
/// Returns `SqlHandlerError::ArgumentTypeError` for unsupported shapes.
pub fn check_sql_args<A: IntoSqlArgs>(args: A) -> Result<Option<SqlArgs>, SqlHandlerError> {
    args.into_sql_args()
}

/// Validate every element of a batch individually.
///
/// # Errors
/// Returns `SqlHandlerError::ArgumentTypeError` naming the first offending element.
pub fn check_sql_args_many<A, I>(batch: I) -> Result<Vec<Option<SqlArgs>>, SqlHandlerError>
where
    A: IntoSqlArgs,
    I: IntoIterator<Item = A>,
{
    batch
        .into_iter()
        .enumerate()
        .map(|(idx, args)| {
            args.into_sql_args().map_err(|e| match e {
                SqlHandlerError::ArgumentTypeError(msg) => {
                    SqlHandlerError::ArgumentTypeError(format!("batch element {idx}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

/// A statement ready for the driver: markers in the backend's style and values in bind order.
#[derive(Debug, Clone)]
pub(crate) struct BoundStatement<'s> {
    pub(crate) sql: Cow<'s, str>,
    pub(crate) params: Vec<RowValues>,
}

/// Line `args` up with the markers in `sql`.
///
/// Positional markers are translated only when `translate` is set. Named markers are
/// always rewritten to positional ones, since neither driver binds by name here.
pub(crate) fn bind<'s>(
    sql: &'s str,
    args: Option<&SqlArgs>,
    style: PlaceholderStyle,
    translate: bool,
) -> Result<BoundStatement<'s>, SqlHandlerError> {
    match args {
        None => Ok(BoundStatement {
            sql: translate_placeholders(sql, style, translate),
            params: Vec::new(),
        }),
        Some(SqlArgs::Positional(values)) => Ok(BoundStatement {
            sql: translate_placeholders(sql, style, translate),
            params: values.clone(),
        }),
        Some(SqlArgs::Named(map)) => {
            let (rewritten, names) = bind_named_placeholders(sql, style);
            let params = names
                .iter()
                .map(|name| map.get(name).cloned().ok_or_else(|| missing_key(name)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BoundStatement {
                sql: rewritten,
                params,
            })
        }
    }
}

/// Check that a mapping has a value for every `:name` marker of `sql`.
///
/// Sequences are not checked here; their length is the server's business.
pub(crate) fn check_named_args(sql: &str, args: Option<&SqlArgs>) -> Result<(), SqlHandlerError> {
    let Some(SqlArgs::Named(map)) = args else {
        return Ok(());
    };
    let (_, names) = bind_named_placeholders(sql, PlaceholderStyle::Postgres);
    match names.iter().find(|name| !map.contains_key(name.as_str())) {
        Some(name) => Err(missing_key(name)),
        None => Ok(()),
    }
}

fn missing_key(name: &str) -> SqlHandlerError {
    SqlHandlerError::ArgumentTypeError(format!("mapping has no value for :{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_sequences_mappings_and_nothing() {
        assert!(check_sql_args(json!(["a", "list"])).unwrap().is_some());
        assert!(check_sql_args(json!({"a": "dict"})).unwrap().is_some());
        assert!(check_sql_args(JsonValue::Null).unwrap().is_none());
        assert!(check_sql_args(()).unwrap().is_none());
        assert!(check_sql_args(vec![RowValues::Int(1)]).unwrap().is_some());
    }

    #[test]
    fn rejects_scalars_and_strings() {
        for bad in [json!("a string"), json!(1), json!(1.2), json!(true)] {
            let err = check_sql_args(bad).unwrap_err();
            assert!(matches!(err, SqlHandlerError::ArgumentTypeError(_)));
        }
    }

    #[test]
    fn batch_validation_names_the_bad_element() {
        let err = check_sql_args_many(vec![json!([1]), json!("oops"), json!([3])]).unwrap_err();
        match err {
            SqlHandlerError::ArgumentTypeError(msg) => assert!(msg.starts_with("batch element 1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn named_arguments_bind_in_marker_order() {
        let args = SqlArgs::named([("id", RowValues::Int(7)), ("name", RowValues::from("x"))]);
        let bound = bind(
            "UPDATE t SET name = :name WHERE id = :id",
            Some(&args),
            PlaceholderStyle::Sqlite,
            false,
        )
        .unwrap();
        assert_eq!(bound.sql, "UPDATE t SET name = ?1 WHERE id = ?2");
        assert_eq!(bound.params, vec![RowValues::from("x"), RowValues::Int(7)]);
    }

    #[test]
    fn named_arguments_missing_key_is_rejected() {
        let args = SqlArgs::named([("id", 1)]);
        let err = bind("SELECT :other", Some(&args), PlaceholderStyle::Postgres, false).unwrap_err();
        assert!(matches!(err, SqlHandlerError::ArgumentTypeError(_)));
    }

    #[test]
    fn named_check_ignores_extra_keys_and_sequences() {
        let args = SqlArgs::named([("id", 1), ("unused", 2)]);
        assert!(check_named_args("SELECT :id", Some(&args)).is_ok());
        let seq = SqlArgs::Positional(vec![RowValues::Int(1)]);
        assert!(check_named_args("SELECT :id", Some(&seq)).is_ok());
        assert!(check_named_args("SELECT :id", None).is_ok());

        let err = check_named_args("SELECT :id, :name", Some(&args)).unwrap_err();
        assert_eq!(err.to_string(), "Argument type error: mapping has no value for :name");
    }

    #[test]
    fn display_matches_error_context_format() {
        let args = SqlArgs::Positional(vec![RowValues::from("a"), RowValues::Int(2), RowValues::Null]);
        assert_eq!(args.to_string(), "['a', 2, NULL]");
        assert_eq!(describe_args(None), "None");
    }
}
