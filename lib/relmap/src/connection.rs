//! The storage connection collaborator.
//!
//! Implemented by database-specific connection types (e.g. `MySqlConnection`).
//! Statements use named `:name` placeholders; the implementation is responsible
//! for translating them to whatever its driver expects.

use async_trait::async_trait;

use crate::{MapperError, Params, Row};

/// Outcome of a data-modifying statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

/// Trait for executing statements against a database backend.
///
/// Driver failures must be reported as [`MapperError::Execution`] carrying the
/// SQLSTATE, the numeric driver code and the driver message.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Prepare and run a row-returning statement with named bindings.
    async fn fetch_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>, MapperError>;

    /// Prepare and run a data-modifying statement with named bindings.
    async fn execute(&self, sql: &str, params: &Params) -> Result<ExecResult, MapperError>;

    /// Run a raw statement without bindings (savepoints, DDL).
    async fn exec(&self, sql: &str) -> Result<u64, MapperError>;

    async fn begin(&self) -> Result<(), MapperError>;

    async fn commit(&self) -> Result<(), MapperError>;

    async fn rollback(&self) -> Result<(), MapperError>;
}
