#![cfg(feature = "test-utils")]

use sql_queue_handler::prelude::*;
use sql_queue_handler::test_utils::postgres::{setup_postgres_embedded, stop_postgres_embedded};

const DB_LAYOUT: &str = "CREATE TABLE test_table (
    str_column  varchar DEFAULT 'foo' NOT NULL,
    bool_column bool    DEFAULT True NOT NULL,
    int_column  bigint  NOT NULL
)";

async fn table_contents(
    handler: &mut SqlConnectionHandler,
) -> Result<Vec<Vec<RowValues>>, SqlHandlerError> {
    let rows = handler
        .fetch_all("SELECT * FROM test_table ORDER BY int_column", ())
        .await?;
    Ok(rows.results.into_iter().map(CustomDbRow::into_values).collect())
}

fn row(s: &str, b: bool, i: i64) -> Vec<RowValues> {
    vec![RowValues::from(s), RowValues::Bool(b), RowValues::Int(i)]
}

#[tokio::test]
async fn postgres_statements_and_queues() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("sql_handler_test").await?;
    let settings = pg.settings.clone();

    let mut handler = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
    handler.execute(DB_LAYOUT, ()).await?;

    handler
        .execute_many(
            "INSERT INTO test_table (str_column, bool_column, int_column) VALUES ($1, $2, $3)",
            [
                vec![RowValues::from("test1"), RowValues::Bool(true), RowValues::Int(1)],
                vec![RowValues::from("test3"), RowValues::Bool(false), RowValues::Int(3)],
            ],
        )
        .await?;
    let obs = handler
        .fetch_one("SELECT str_column FROM test_table WHERE int_column = $1", vec![RowValues::Int(3)])
        .await?
        .expect("row");
    assert_eq!(obs.values, vec![RowValues::from("test3")]);

    // insert-returning feeds the next statement
    handler.create_queue("test_queue")?;
    handler.add_to_queue(
        "test_queue",
        "INSERT INTO test_table (int_column) VALUES ($1) RETURNING str_column",
        vec![RowValues::Int(2)],
    )?;
    handler.add_to_queue(
        "test_queue",
        "UPDATE test_table SET bool_column = FALSE WHERE str_column = $1 AND int_column = 2",
        vec![RowValues::from("{0}")],
    )?;
    assert!(handler.execute_queue("test_queue").await?.is_empty());
    assert_eq!(
        table_contents(&mut handler).await?,
        vec![row("test1", true, 1), row("foo", false, 2), row("test3", false, 3)]
    );

    // a failing statement rolls back the whole queue
    handler.create_queue("huge")?;
    for x in 100..220 {
        handler.add_to_queue(
            "huge",
            "INSERT INTO test_table (int_column) VALUES ($1)",
            vec![RowValues::Int(x)],
        )?;
    }
    handler.add_to_queue("huge", "INSERT INTO NO_TABLE (some_column) VALUES (1)", ())?;
    let err = handler.execute_queue("huge").await.unwrap_err();
    assert_eq!(err.queue(), Some("huge"));
    assert_eq!(table_contents(&mut handler).await?.len(), 3);

    // numeric aggregates and uuid keys come back as text and bind back in
    handler.execute(
        "CREATE TABLE accounts (id uuid PRIMARY KEY DEFAULT gen_random_uuid(), total numeric NOT NULL)",
        (),
    )
    .await?;
    handler.create_queue("totals")?;
    handler.add_to_queue("totals", "SELECT sum(int_column) FROM test_table", ())?;
    handler.add_to_queue(
        "totals",
        "INSERT INTO accounts (total) VALUES ($1) RETURNING id",
        vec![RowValues::from("{0}")],
    )?;
    handler.add_to_queue(
        "totals",
        "SELECT total, gen_random_uuid() FROM accounts WHERE id = $1",
        vec![RowValues::from("{0}")],
    )?;
    let values = handler.execute_queue("totals").await?;
    assert_eq!(values.len(), 2);
    assert_eq!(values[0], RowValues::from("6"));
    let generated = values[1].as_text().expect("uuid as text");
    assert_eq!(generated.len(), 36);
    assert_eq!(generated.matches('-').count(), 4);

    // types without a dedicated mapping are passed through as raw bytes
    let inet = handler
        .fetch_one("SELECT '10.0.0.1'::inet AS addr", ())
        .await?
        .expect("row");
    assert!(inet.get("addr").and_then(RowValues::as_blob).is_some());

    // admin connection without a database can still run statements
    let mut admin = SqlConnectionHandler::new(&settings, AdminMode::AdminWithoutDatabase).await?;
    admin.set_autocommit(true).await;
    let one = admin.fetch_one("SELECT 1::int4 AS one", ()).await?.expect("row");
    assert_eq!(one.get("one"), Some(&RowValues::Int(1)));
    admin.close().await;

    handler.close().await;
    stop_postgres_embedded(pg).await;
    Ok(())
}
