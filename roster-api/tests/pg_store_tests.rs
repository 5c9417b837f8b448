//! PostgreSQL record store and schema guard against a scripted wire server.

use std::time::Duration;

use roster_api::{ensure_schema, PgRecordStore};
use roster_core::{DatabaseConfig, Row, StoreError, Value};
use roster_storage::RecordStore;
use roster_test_utils::fake_postgres::{cell, oid, FakePostgres, FakeTable};
use roster_test_utils::fixtures::{employees_table, test_config};

fn database(port: u16, query_timeout: Duration) -> DatabaseConfig {
    let mut db = test_config().database;
    db.host = "127.0.0.1".to_string();
    db.port = port;
    db.connect_timeout = Duration::from_secs(2);
    db.query_timeout = query_timeout;
    db
}

#[tokio::test]
async fn test_fetch_all_gives_up_on_silent_server() {
    let server = FakePostgres::silent().await.unwrap();
    let db = database(server.port(), Duration::from_millis(200));
    let store = PgRecordStore::new(db);

    let outcome = tokio::time::timeout(Duration::from_secs(3), store.fetch_all(&employees_table()))
        .await
        .expect("fetch_all must return within its own deadlines");

    assert_eq!(
        outcome,
        Err(StoreError::timeout("query", Duration::from_millis(200)))
    );
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_ensure_schema_gives_up_on_silent_server() {
    let server = FakePostgres::silent().await.unwrap();
    let db = database(server.port(), Duration::from_millis(200));

    let outcome = tokio::time::timeout(Duration::from_secs(3), ensure_schema(&db))
        .await
        .expect("ensure_schema must return within its own deadlines");

    assert!(
        matches!(outcome, Err(StoreError::Timeout { ref operation, .. }) if operation == "database lookup"),
        "unexpected outcome: {outcome:?}"
    );
}

#[tokio::test]
async fn test_fetch_all_decodes_rows_in_column_order() -> Result<(), Box<dyn std::error::Error>> {
    let table = FakeTable::new()
        .column("id", oid::INT4)
        .column("name", oid::VARCHAR)
        .column("age", oid::INT4)
        .column("active", oid::BOOL)
        .column("score", oid::FLOAT8)
        .row(vec![
            cell::int4(1),
            cell::text("Ada"),
            cell::int4(36),
            cell::bool(true),
            cell::float8(9.5),
        ])
        .row(vec![
            cell::int4(2),
            cell::null(),
            cell::null(),
            cell::bool(false),
            cell::null(),
        ]);
    let server = FakePostgres::serving(table).await?;
    let store = PgRecordStore::new(database(server.port(), Duration::from_secs(2)));

    let rows = store.fetch_all(&employees_table()).await?;

    assert_eq!(
        rows,
        vec![
            Row::new()
                .with("id", 1)
                .with("name", "Ada")
                .with("age", 36)
                .with("active", Value::Bool(true))
                .with("score", Value::Float(9.5)),
            Row::new()
                .with("id", 2)
                .with("name", Value::Null)
                .with("age", Value::Null)
                .with("active", Value::Bool(false))
                .with("score", Value::Null),
        ]
    );
    let names: Vec<&str> = rows[0].column_names().collect();
    assert_eq!(names, vec!["id", "name", "age", "active", "score"]);
    Ok(())
}

#[tokio::test]
async fn test_fetch_all_renders_other_types_as_text() -> Result<(), Box<dyn std::error::Error>> {
    let table = FakeTable::new()
        .column("salary", oid::NUMERIC)
        .column("hired", oid::DATE)
        .column("updated", oid::TIMESTAMP)
        .column("badge", oid::UUID)
        .column("meta", oid::JSONB)
        .column("notes", oid::XML)
        .column("photo", oid::BYTEA)
        .row(vec![
            cell::numeric(0, false, 2, &[1234, 5000]),
            // 2024-03-01 is 8826 days after 2000-01-01.
            cell::date(8826),
            cell::timestamp(8826 * 86_400_000_000 + 3_600_000_000),
            cell::uuid([0x11; 16]),
            cell::jsonb(r#"{"team":"ops"}"#),
            cell::text("<n/>"),
            cell::bytes(&[0xff, 0x00]),
        ]);
    let server = FakePostgres::serving(table).await?;
    let store = PgRecordStore::new(database(server.port(), Duration::from_secs(2)));

    let rows = store.fetch_all(&employees_table()).await?;

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("salary"), Some(&Value::from("1234.50")));
    assert_eq!(row.get("hired"), Some(&Value::from("2024-03-01")));
    assert_eq!(row.get("updated"), Some(&Value::from("2024-03-01 01:00:00")));
    assert_eq!(
        row.get("badge"),
        Some(&Value::from("11111111-1111-1111-1111-111111111111"))
    );
    assert_eq!(row.get("meta"), Some(&Value::from(r#"{"team":"ops"}"#)));
    assert_eq!(row.get("notes"), Some(&Value::from("<n/>")));
    assert_eq!(row.get("photo"), Some(&Value::from("\\xff00")));
    Ok(())
}

#[tokio::test]
async fn test_fetch_all_returns_empty_table() -> Result<(), Box<dyn std::error::Error>> {
    let table = FakeTable::new().column("id", oid::INT4);
    let server = FakePostgres::serving(table).await?;
    let store = PgRecordStore::new(database(server.port(), Duration::from_secs(2)));

    assert!(store.fetch_all(&employees_table()).await?.is_empty());
    Ok(())
}
