//! Record store abstraction.
//!
//! The PostgreSQL implementation lives in roster-api; this crate only needs
//! the seam so the cache-aside path can run against any source of rows.

use async_trait::async_trait;
use roster_core::{RowSet, StoreError, TableName};

/// Source of truth for the row set.
///
/// Implementations must either return every row of `table` or fail; a
/// partial row set is never returned.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read all rows of `table`, in the order the store returns them.
    async fn fetch_all(&self, table: &TableName) -> Result<RowSet, StoreError>;
}
