#![cfg(feature = "sqlite")]

use serde_json::json;
use sql_queue_handler::prelude::*;
use tempfile::TempDir;

const DB_LAYOUT: &str = "CREATE TABLE test_table (
    str_column  TEXT    DEFAULT 'foo' NOT NULL,
    bool_column BOOLEAN DEFAULT 1 NOT NULL,
    int_column  INTEGER NOT NULL
)";

/// Fresh database file with the test table; the `TempDir` must outlive the handler.
async fn setup() -> Result<(TempDir, DbSettings, SqlConnectionHandler), SqlHandlerError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = DbSettings::sqlite(dir.path().join("sql_handler_test.db"));
    let mut handler = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
    handler.execute(DB_LAYOUT, ()).await?;
    Ok((dir, settings, handler))
}

async fn populate(settings: &DbSettings) -> Result<(), SqlHandlerError> {
    let mut other = SqlConnectionHandler::new(settings, AdminMode::NoAdmin).await?;
    other
        .execute_many(
            "INSERT INTO test_table (str_column, bool_column, int_column) VALUES (?1, ?2, ?3)",
            [
                json!(["test1", true, 1]),
                json!(["test2", true, 2]),
                json!(["test3", false, 3]),
                json!(["test4", false, 4]),
            ],
        )
        .await?;
    other.close().await;
    Ok(())
}

/// Table contents as seen from a separate connection.
async fn table_contents(settings: &DbSettings) -> Result<Vec<Vec<RowValues>>, SqlHandlerError> {
    let mut other = SqlConnectionHandler::new(settings, AdminMode::NoAdmin).await?;
    let rows = other
        .fetch_all("SELECT * FROM test_table ORDER BY int_column", ())
        .await?;
    other.close().await;
    Ok(rows.results.into_iter().map(CustomDbRow::into_values).collect())
}

fn row(s: &str, b: bool, i: i64) -> Vec<RowValues> {
    vec![RowValues::from(s), RowValues::Int(i64::from(b)), RowValues::Int(i)]
}

#[tokio::test]
async fn init_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, _settings, handler) = setup().await?;
    assert_eq!(handler.admin_mode(), AdminMode::NoAdmin);
    assert!(handler.list_queues().is_empty());
    assert!(!handler.is_closed());
    assert!(!handler.autocommit());
    Ok(())
}

#[tokio::test]
async fn init_admin_error() {
    assert!(matches!(
        "not a valid value".parse::<AdminMode>(),
        Err(SqlHandlerError::ConfigError(_))
    ));
}

#[tokio::test]
async fn init_connection_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = DbSettings::sqlite(dir.path().join("missing_dir").join("db.sqlite"));
    let res = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await;
    assert!(matches!(res, Err(SqlHandlerError::ConnectionError(_))));
}

#[tokio::test]
async fn admin_without_database_connects_to_engine() -> Result<(), Box<dyn std::error::Error>> {
    let settings = DbSettings::sqlite("unused.db");
    let mut handler =
        SqlConnectionHandler::new(&settings, AdminMode::AdminWithoutDatabase).await?;
    let row = handler.fetch_one("SELECT 1 AS one", ()).await?.expect("one row");
    assert_eq!(row.get("one"), Some(&RowValues::Int(1)));
    assert!(!std::path::Path::new("unused.db").exists());
    Ok(())
}

#[tokio::test]
async fn set_autocommit() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, _settings, mut handler) = setup().await?;
    assert_eq!(handler.isolation_level(), IsolationLevel::ReadCommitted);
    handler.set_autocommit(true).await;
    assert!(handler.autocommit());
    assert_eq!(handler.isolation_level(), IsolationLevel::Autocommit);
    handler.set_autocommit(false).await;
    assert!(!handler.autocommit());
    assert_eq!(handler.isolation_level(), IsolationLevel::ReadCommitted);

    let level: IsolationLevel = "on".parse()?;
    handler.set_isolation_level(level).await;
    assert!(handler.autocommit());
    Ok(())
}

#[tokio::test]
async fn set_autocommit_error() {
    assert!(matches!(
        "not a valid value".parse::<IsolationLevel>(),
        Err(SqlHandlerError::ArgumentTypeError(_))
    ));
}

#[tokio::test]
async fn bad_argument_shapes_fail_before_running() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let sql = "INSERT INTO test_table (int_column) VALUES (?1)";

    for bad in [json!("a string"), json!(1), json!(1.2)] {
        let err = handler.execute(sql, bad).await.unwrap_err();
        assert!(matches!(err, SqlHandlerError::ArgumentTypeError(_)));
    }
    let err = handler
        .execute_many(sql, [json!([1]), json!("a string")])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlHandlerError::ArgumentTypeError(_)));

    assert!(table_contents(&settings).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn execute_no_sql_args() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let count = handler
        .execute("INSERT INTO test_table (int_column) VALUES (1)", ())
        .await?;
    assert_eq!(count, 1);
    assert_eq!(table_contents(&settings).await?, vec![row("foo", true, 1)]);
    Ok(())
}

#[tokio::test]
async fn execute_with_sql_args() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    handler
        .execute(
            "INSERT INTO test_table (int_column) VALUES (?1)",
            vec![RowValues::Int(1)],
        )
        .await?;
    assert_eq!(table_contents(&settings).await?, vec![row("foo", true, 1)]);
    Ok(())
}

#[tokio::test]
async fn execute_with_named_args() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    handler
        .execute(
            "INSERT INTO test_table (str_column, int_column) VALUES (:s, :i)",
            json!({"i": 7, "s": "named"}),
        )
        .await?;
    let err = handler
        .execute(
            "INSERT INTO test_table (int_column) VALUES (:missing)",
            SqlArgs::named([("i", 1)]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqlHandlerError::ArgumentTypeError(_)));

    assert_eq!(table_contents(&settings).await?, vec![row("named", true, 7)]);
    Ok(())
}

#[tokio::test]
async fn executemany() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let count = handler
        .execute_many(
            "INSERT INTO test_table (int_column) VALUES (?1)",
            vec![vec![RowValues::Int(1)], vec![RowValues::Int(2)]],
        )
        .await?;
    assert_eq!(count, 2);
    assert_eq!(
        table_contents(&settings).await?,
        vec![row("foo", true, 1), row("foo", true, 2)]
    );
    Ok(())
}

#[tokio::test]
async fn execute_fetchone() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    populate(&settings).await?;

    let obs = handler
        .fetch_one("SELECT str_column FROM test_table WHERE int_column = 1", ())
        .await?
        .expect("row");
    assert_eq!(obs.values, vec![RowValues::from("test1")]);

    let obs = handler
        .fetch_one(
            "SELECT str_column FROM test_table WHERE int_column = ?1",
            vec![RowValues::Int(2)],
        )
        .await?
        .expect("row");
    assert_eq!(obs.get("str_column").and_then(RowValues::as_text), Some("test2"));

    let none = handler
        .fetch_one("SELECT str_column FROM test_table WHERE int_column = 99", ())
        .await?;
    assert!(none.is_none());
    Ok(())
}

#[tokio::test]
async fn execute_fetchall() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    populate(&settings).await?;

    let obs = handler
        .fetch_all(
            "SELECT * FROM test_table WHERE bool_column = FALSE ORDER BY int_column",
            (),
        )
        .await?;
    let rows: Vec<_> = obs.results.into_iter().map(CustomDbRow::into_values).collect();
    assert_eq!(rows, vec![row("test3", false, 3), row("test4", false, 4)]);

    let obs = handler
        .fetch_all(
            "SELECT * FROM test_table WHERE bool_column = ?1 ORDER BY int_column",
            vec![RowValues::Bool(true)],
        )
        .await?;
    assert_eq!(obs.column_names(), ["str_column", "bool_column", "int_column"]);
    assert_eq!(obs.len(), 2);
    assert_eq!(obs.results[0].get("bool_column").and_then(RowValues::as_bool), Some(true));
    Ok(())
}

#[tokio::test]
async fn fetch_without_result_set_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let err = handler
        .fetch_all("INSERT INTO test_table (int_column) VALUES (5)", ())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlHandlerError::ExecutionError { .. }));
    assert!(err.to_string().contains("no results to fetch"));

    // the insert was rolled back with the failed fetch
    assert!(table_contents(&settings).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn execution_error_carries_statement_and_args() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let err = handler
        .execute(
            "INSERT INTO no_table (some_column) VALUES (?1)",
            vec![RowValues::from("x")],
        )
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("Error running SQL query: INSERT INTO no_table"));
    assert!(msg.contains("ARGS: ['x']"));
    assert!(err.queue().is_none());

    // the handler is still usable afterwards
    handler
        .execute("INSERT INTO test_table (int_column) VALUES (3)", ())
        .await?;
    assert_eq!(table_contents(&settings).await?, vec![row("foo", true, 3)]);
    Ok(())
}

#[tokio::test]
async fn translates_postgres_markers_when_enabled() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let settings = DbSettings::sqlite(dir.path().join("translate.db")).with_translation(true);
    let mut handler = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
    handler.execute(DB_LAYOUT, ()).await?;
    handler
        .execute(
            "INSERT INTO test_table (str_column, int_column) VALUES ($1, $2)",
            vec![RowValues::from("pg"), RowValues::Int(4)],
        )
        .await?;
    assert_eq!(table_contents(&settings).await?, vec![row("pg", true, 4)]);
    Ok(())
}

#[tokio::test]
async fn cursor_scope_error_rolls_back_before_returning() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let err = handler
        .with_cursor(async |cur| {
            cur.execute("INSERT INTO test_table (int_column) VALUES (1)", ())
                .await?;
            Err::<(), _>(SqlHandlerError::ArgumentTypeError("stop here".into()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlHandlerError::ArgumentTypeError(_)));

    // a second handler can write right away: no transaction was left holding the lock
    let mut other = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
    other
        .execute("INSERT INTO test_table (int_column) VALUES (2)", ())
        .await?;
    other.close().await;
    assert_eq!(table_contents(&settings).await?, vec![row("foo", true, 2)]);
    Ok(())
}

#[tokio::test]
async fn cursor_scope_commits_on_success() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let inserted = handler
        .with_cursor(async |cur| {
            let a = cur
                .execute("INSERT INTO test_table (int_column) VALUES (1)", ())
                .await?;
            let b = cur
                .execute("INSERT INTO test_table (int_column) VALUES (2)", ())
                .await?;
            Ok(a + b)
        })
        .await?;
    assert_eq!(inserted, 2);

    let mut other = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
    other
        .execute("INSERT INTO test_table (int_column) VALUES (3)", ())
        .await?;
    other.close().await;
    assert_eq!(
        table_contents(&settings).await?,
        vec![row("foo", true, 1), row("foo", true, 2), row("foo", true, 3)]
    );
    Ok(())
}

#[tokio::test]
async fn cursor_scope_keeps_autocommitted_work_on_error() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    handler.set_autocommit(true).await;
    let res = handler
        .with_cursor(async |cur| {
            cur.execute("INSERT INTO test_table (int_column) VALUES (1)", ())
                .await?;
            Err::<(), _>(SqlHandlerError::ArgumentTypeError("stop here".into()))
        })
        .await;
    assert!(res.is_err());
    assert_eq!(table_contents(&settings).await?, vec![row("foo", true, 1)]);
    Ok(())
}

#[tokio::test]
async fn cursor_fetches_rows_of_last_statement() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    populate(&settings).await?;

    let first = handler
        .with_cursor(async |cur| {
            cur.execute("SELECT int_column FROM test_table ORDER BY int_column DESC", ())
                .await?;
            let first = cur.fetch_one().await?;
            cur.rollback().await?;
            Ok(first)
        })
        .await?
        .expect("row");
    assert_eq!(first.get_by_index(0), Some(&RowValues::Int(4)));
    Ok(())
}

#[tokio::test]
async fn execute_many_checks_every_mapping_first() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    let err = handler
        .execute_many(
            "INSERT INTO test_table (int_column) VALUES (:x)",
            [json!({"x": 1}), json!({"y": 2})],
        )
        .await
        .unwrap_err();
    match err {
        SqlHandlerError::ArgumentTypeError(msg) => assert!(msg.contains(":x")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(table_contents(&settings).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reopens_closed_connection() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, settings, mut handler) = setup().await?;
    handler.close().await;
    assert!(handler.is_closed());
    // closing twice is fine
    handler.close().await;

    handler
        .execute("INSERT INTO test_table (int_column) VALUES (1)", ())
        .await?;
    assert!(!handler.is_closed());
    assert_eq!(table_contents(&settings).await?, vec![row("foo", true, 1)]);
    Ok(())
}

#[tokio::test]
async fn settings_load_from_json_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("from_file.db");
    let config_path = dir.path().join("settings.json");
    std::fs::write(
        &config_path,
        json!({
            "backend": "sqlite",
            "database": db_path.to_string_lossy(),
            "password": "",
            "translate_placeholders": true
        })
        .to_string(),
    )?;

    let settings = DbSettings::from_json_file(&config_path)?;
    assert_eq!(settings.backend, DatabaseType::Sqlite);
    assert!(settings.translate_placeholders);
    assert_eq!(settings.password, None);

    let mut handler = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
    handler.execute(DB_LAYOUT, ()).await?;
    assert!(db_path.exists());
    Ok(())
}
