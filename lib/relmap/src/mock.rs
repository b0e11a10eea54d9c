//! Scripted in-memory connection for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Connection, ExecResult, MapperError, Params, Row};

type FetchHandler = dyn Fn(&str, &Params) -> Result<Vec<Row>, MapperError> + Send + Sync;
type ExecuteHandler = dyn Fn(&str, &Params) -> Result<ExecResult, MapperError> + Send + Sync;
type CommitHandler = dyn Fn() -> Result<(), MapperError> + Send + Sync;

/// Records every statement and answers through caller-supplied handlers.
pub(crate) struct MockConnection {
    fetch: Box<FetchHandler>,
    execute: Box<ExecuteHandler>,
    commit: Box<CommitHandler>,
    log: Mutex<Vec<(String, Params)>>,
}

impl MockConnection {
    pub(crate) fn new(
        fetch: impl Fn(&str, &Params) -> Result<Vec<Row>, MapperError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            fetch: Box::new(fetch),
            execute: Box::new(|_, _| {
                Ok(ExecResult {
                    rows_affected: 1,
                    last_insert_id: 0,
                })
            }),
            commit: Box::new(|| Ok(())),
            log: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn on_execute(
        mut self,
        execute: impl Fn(&str, &Params) -> Result<ExecResult, MapperError> + Send + Sync + 'static,
    ) -> Self {
        self.execute = Box::new(execute);
        self
    }

    pub(crate) fn on_commit(
        mut self,
        commit: impl Fn() -> Result<(), MapperError> + Send + Sync + 'static,
    ) -> Self {
        self.commit = Box::new(commit);
        self
    }

    /// Every statement text seen so far, in order.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.log.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn executed(&self) -> Vec<(String, Params)> {
        self.log.lock().clone()
    }

    fn record(&self, sql: &str, params: &Params) {
        self.log.lock().push((sql.to_string(), params.clone()));
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn fetch_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>, MapperError> {
        self.record(sql, params);
        (self.fetch)(sql, params)
    }

    async fn execute(&self, sql: &str, params: &Params) -> Result<ExecResult, MapperError> {
        self.record(sql, params);
        (self.execute)(sql, params)
    }

    async fn exec(&self, sql: &str) -> Result<u64, MapperError> {
        self.record(sql, &Params::new());
        (self.execute)(sql, &Params::new()).map(|r| r.rows_affected)
    }

    async fn begin(&self) -> Result<(), MapperError> {
        self.record("BEGIN", &Params::new());
        Ok(())
    }

    async fn commit(&self) -> Result<(), MapperError> {
        self.record("COMMIT", &Params::new());
        (self.commit)()
    }

    async fn rollback(&self) -> Result<(), MapperError> {
        self.record("ROLLBACK", &Params::new());
        Ok(())
    }
}

/// Build a row from literal pairs.
pub(crate) fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}
