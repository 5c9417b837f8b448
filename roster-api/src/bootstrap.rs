//! Startup schema guard.
//!
//! Makes sure the target database and table exist before the server starts
//! accepting requests. Safe to run any number of times, including from
//! several instances at once.

use roster_core::{DatabaseConfig, StoreError, TableName};
use tokio_postgres::error::SqlState;
use tokio_postgres::Client;

use crate::db::{driver_error, with_deadline, OneShotConnection};

/// Database used to inspect and create the target database.
pub const MAINTENANCE_DATABASE: &str = "postgres";

const DATABASE_EXISTS_SQL: &str = "SELECT 1 FROM pg_database WHERE datname = $1";

pub(crate) fn create_database_sql(name: &TableName) -> String {
    format!("CREATE DATABASE {}", name.quoted())
}

pub(crate) fn create_table_sql(table: &TableName) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id SERIAL PRIMARY KEY, name VARCHAR(100), age INT, email VARCHAR(100))",
        table.quoted()
    )
}

/// Create the configured database and table if they are missing.
pub async fn ensure_schema(db: &DatabaseConfig) -> Result<(), StoreError> {
    ensure_database(db).await?;
    ensure_table(db).await?;
    tracing::info!(database = %db.name, table = %db.table, "Schema ready");
    Ok(())
}

async fn ensure_database(db: &DatabaseConfig) -> Result<(), StoreError> {
    let connection = OneShotConnection::open(db, MAINTENANCE_DATABASE).await?;
    let result = create_database_if_missing(&connection.client, db).await;
    connection.release(&result).await;
    result
}

async fn create_database_if_missing(client: &Client, db: &DatabaseConfig) -> Result<(), StoreError> {
    let existing = with_deadline(
        db.query_timeout,
        "database lookup",
        client.query_opt(DATABASE_EXISTS_SQL, &[&db.name.as_str()]),
    )
    .await?;
    if existing.is_some() {
        tracing::debug!(database = %db.name, "Database already exists");
        return Ok(());
    }

    let created = tokio::time::timeout(
        db.query_timeout,
        client.batch_execute(&create_database_sql(&db.name)),
    )
    .await
    .map_err(|_| StoreError::timeout("create database", db.query_timeout))?;

    match created {
        Ok(()) => {
            tracing::info!(database = %db.name, "Created database");
            Ok(())
        }
        Err(err) if created_concurrently(&err) => {
            tracing::debug!(database = %db.name, "Database created concurrently");
            Ok(())
        }
        Err(err) => Err(driver_error(err)),
    }
}

/// Racing creators lose with a duplicate error or a catalog unique violation.
fn created_concurrently(err: &tokio_postgres::Error) -> bool {
    matches!(
        err.code(),
        Some(code) if *code == SqlState::DUPLICATE_DATABASE
            || *code == SqlState::DUPLICATE_TABLE
            || *code == SqlState::UNIQUE_VIOLATION
    )
}

async fn ensure_table(db: &DatabaseConfig) -> Result<(), StoreError> {
    let connection = OneShotConnection::open(db, db.name.as_str()).await?;
    let result = create_table_if_missing(&connection.client, db).await;
    connection.release(&result).await;
    result
}

async fn create_table_if_missing(client: &Client, db: &DatabaseConfig) -> Result<(), StoreError> {
    let created = tokio::time::timeout(
        db.query_timeout,
        client.batch_execute(&create_table_sql(&db.table)),
    )
    .await
    .map_err(|_| StoreError::timeout("create table", db.query_timeout))?;

    match created {
        Ok(()) => Ok(()),
        Err(err) if created_concurrently(&err) => {
            tracing::debug!(table = %db.table, "Table created concurrently");
            Ok(())
        }
        Err(err) => Err(driver_error(err)),
    }
}
