//! Database capability used by the planner.
//!
//! The core never links a driver. The CLI implements [`Adapter`] over
//! sqlx; tests implement it in memory.

use crate::dialect::Dialect;
use crate::error::{RelqError, Result};
use crate::migration::AppliedMigration;
use crate::schema::Schema;

/// Message an adapter returns from [`Adapter::begin`] when the database
/// cannot run DDL inside a transaction.
pub const NO_TRANSACTIONAL_DDL: &str = "transactional DDL is not supported";

/// True when `err` is a begin failure meaning "run statements one by one".
pub fn is_transaction_unsupported(err: &RelqError) -> bool {
    match err {
        RelqError::Database(message) => message.contains(NO_TRANSACTIONAL_DDL),
        _ => false,
    }
}

/// One database connection.
#[allow(async_fn_in_trait)]
pub trait Adapter {
    fn dialect(&self) -> Dialect;

    /// Database name recorded in snapshots.
    fn database(&self) -> Option<String> {
        None
    }

    /// Read the live schema. Failures are [`RelqError::Introspection`].
    async fn introspect(&mut self) -> Result<Schema>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Run one statement. Failures are [`RelqError::Database`] carrying the driver message.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Rows of the bookkeeping table, oldest first; empty when the table does not exist.
    async fn applied_migrations(&mut self, table: &str) -> Result<Vec<AppliedMigration>>;
}
