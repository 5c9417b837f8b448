//! Roster Test Utilities
//!
//! Centralized test infrastructure for the Roster workspace:
//! - Scriptable record store and cache fakes
//! - A scriptable PostgreSQL wire server ([`fake_postgres`])
//! - Proptest generators for rows and row sets
//! - Test fixtures for common scenarios
//! - Custom assertions for the cache-aside path

pub mod fake_postgres;

// Re-export the in-memory backends from their source crate
pub use roster_storage::{InMemoryCache, InMemorySessionStore};

// Re-export core types for convenience
pub use roster_core::{
    CacheError, RosterConfig, Row, RowSet, ServiceError, StoreError, TableName, Value,
};

use async_trait::async_trait;
use roster_storage::{CacheClient, RecordStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// MOCK BACKENDS
// ============================================================================

/// Record store returning a scripted result, counting calls.
#[derive(Debug)]
pub struct ScriptedRecordStore {
    result: Mutex<Result<RowSet, StoreError>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedRecordStore {
    /// A store that returns `rows` on every call.
    pub fn returning(rows: RowSet) -> Self {
        Self {
            result: Mutex::new(Ok(rows)),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// A store that fails with `err` on every call.
    pub fn failing(err: StoreError) -> Self {
        Self {
            result: Mutex::new(Err(err)),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep for `delay` inside every call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the scripted result for subsequent calls.
    pub fn set_result(&self, result: Result<RowSet, StoreError>) {
        if let Ok(mut slot) = self.result.lock() {
            *slot = result;
        }
    }

    /// Number of `fetch_all` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for ScriptedRecordStore {
    async fn fetch_all(&self, _table: &TableName) -> Result<RowSet, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result
            .lock()
            .map(|result| result.clone())
            .unwrap_or_else(|_| Err(StoreError::query("scripted result lock poisoned")))
    }
}

/// Cache that refuses every call, as if the server were down.
#[derive(Debug, Default)]
pub struct UnreachableCache {
    calls: AtomicUsize,
}

impl UnreachableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` and `set_with_expiry` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheClient for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::unavailable("connection refused"))
    }

    async fn set_with_expiry(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::unavailable("connection refused"))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating rows and row sets.

    use super::*;
    use proptest::prelude::*;

    /// Generate a scalar value. Floats are finite so they survive JSON.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            (-1.0e12f64..1.0e12f64).prop_map(Value::Float),
            "\\PC{0,24}".prop_map(Value::Text),
        ]
    }

    /// Generate a column name.
    pub fn arb_column_name() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,11}"
    }

    /// Generate a row with distinct column names in arbitrary order.
    pub fn arb_row() -> impl Strategy<Value = Row> {
        prop::collection::vec((arb_column_name(), arb_value()), 0..8).prop_map(|columns| {
            let mut row = Row::new();
            for (name, value) in columns {
                if row.get(&name).is_none() {
                    row.push(name, value);
                }
            }
            row
        })
    }

    /// Generate a row set, including the empty one.
    pub fn arb_row_set() -> impl Strategy<Value = RowSet> {
        prop::collection::vec(arb_row(), 0..16)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Common fixtures.

    use super::*;
    use roster_storage::CacheAsideConfig;
    use std::collections::HashMap;

    /// Three employees, one with null columns.
    pub fn employee_rows() -> RowSet {
        vec![
            Row::new()
                .with("id", 1)
                .with("name", "Ada Lovelace")
                .with("age", 36)
                .with("email", "ada@example.com"),
            Row::new()
                .with("id", 2)
                .with("name", "Grace Hopper")
                .with("age", 85)
                .with("email", "grace@example.com"),
            Row::new()
                .with("id", 3)
                .with("name", "Anonymous")
                .with("age", Value::Null)
                .with("email", Value::Null),
        ]
    }

    /// The default `employees` table name.
    pub fn employees_table() -> TableName {
        match TableName::parse("DATABASE_TABLE", "employees") {
            Ok(table) => table,
            Err(err) => panic!("fixture table name rejected: {}", err),
        }
    }

    /// Cache-aside settings matching production: shared key, 30s TTL.
    pub fn cache_aside_config() -> CacheAsideConfig {
        CacheAsideConfig::new(
            employees_table(),
            roster_core::SHARED_CACHE_KEY,
            roster_core::SHARED_CACHE_TTL,
        )
    }

    /// A complete configuration with only the required variables set, plus
    /// a fixed session secret.
    pub fn test_config() -> RosterConfig {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_HOST", "localhost"),
            ("DATABASE_USER", "roster"),
            ("DATABASE_PASSWORD", "roster"),
            ("SECRET_KEY", "test-secret"),
            ("HOSTNAME", "test-host"),
            ("APP_VERSION", "9.9"),
        ]
        .into_iter()
        .collect();
        match RosterConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())) {
            Ok(config) => config,
            Err(err) => panic!("fixture config rejected: {}", err),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache-aside outcomes.

    use super::*;

    /// Assert that a read failed because the store was unavailable.
    pub fn assert_database_unavailable<T: std::fmt::Debug>(result: &Result<T, ServiceError>) {
        assert!(
            matches!(result, Err(ServiceError::DatabaseUnavailable(_))),
            "expected DatabaseUnavailable, got {:?}",
            result
        );
    }

    /// Assert two row sets are equal column-by-column, including order.
    pub fn assert_same_rows(left: &RowSet, right: &RowSet) {
        assert_eq!(left.len(), right.len(), "row counts differ");
        for (index, (a, b)) in left.iter().zip(right).enumerate() {
            let a_columns: Vec<&str> = a.column_names().collect();
            let b_columns: Vec<&str> = b.column_names().collect();
            assert_eq!(a_columns, b_columns, "column order differs in row {}", index);
            assert_eq!(a, b, "values differ in row {}", index);
        }
    }
}
