//! MySQL implementation of Connection.

use async_trait::async_trait;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{Connection as _, Executor};
use tokio::sync::Mutex;
use tracing::{debug, info};

use relmap::{Connection, ConnectionConfig, ExecResult, MapperError, Params, Row};

use crate::bind::{arguments, to_positional};
use crate::decode::decode_row;

/// SQLSTATE reported when the driver gives none.
const GENERAL_ERROR: &str = "HY000";

/// Map a driver failure to an execution error carrying SQLSTATE, numeric
/// code and message.
fn map_error(err: sqlx::Error) -> MapperError {
    match &err {
        sqlx::Error::Database(db) => {
            let state = db
                .code()
                .map(|c| c.into_owned())
                .unwrap_or_else(|| GENERAL_ERROR.to_string());
            let code = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| u32::from(e.number()))
                .unwrap_or(0);
            MapperError::execution(state, code, db.message())
        }
        _ => MapperError::execution(GENERAL_ERROR, 0, err.to_string()),
    }
}

/// A single MySQL connection. Statements run one at a time.
pub struct MySqlConnection {
    conn: Mutex<sqlx::MySqlConnection>,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection").finish_non_exhaustive()
    }
}

impl MySqlConnection {
    pub fn new(conn: sqlx::MySqlConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Connect to a MySQL database.
    pub async fn connect(config: impl Into<ConnectionConfig>) -> Result<Self, MapperError> {
        let ConnectionConfig::Url(url) = config.into();
        let conn = sqlx::MySqlConnection::connect(&url)
            .await
            .map_err(map_error)?;
        info!("connected to MySQL");
        Ok(Self::new(conn))
    }

    /// Close the underlying connection.
    pub async fn close(self) -> Result<(), MapperError> {
        self.conn.into_inner().close().await.map_err(map_error)
    }

    async fn raw(&self, sql: &str) -> Result<u64, MapperError> {
        let mut conn = self.conn.lock().await;
        let result = (&mut *conn).execute(sql).await.map_err(map_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn fetch_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>, MapperError> {
        let (positional, values) = to_positional(sql, params)?;
        let args = arguments(&values)?;
        debug!(sql = %positional, params = values.len(), "mysql fetch");

        let mut conn = self.conn.lock().await;
        let rows = sqlx::query_with(&positional, args)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &Params) -> Result<ExecResult, MapperError> {
        let (positional, values) = to_positional(sql, params)?;
        let args = arguments(&values)?;
        debug!(sql = %positional, params = values.len(), "mysql execute");

        let mut conn = self.conn.lock().await;
        let result = sqlx::query_with(&positional, args)
            .execute(&mut *conn)
            .await
            .map_err(map_error)?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        })
    }

    async fn exec(&self, sql: &str) -> Result<u64, MapperError> {
        debug!(sql, "mysql exec");
        self.raw(sql).await
    }

    async fn begin(&self) -> Result<(), MapperError> {
        self.raw("START TRANSACTION").await.map(|_| ())
    }

    async fn commit(&self) -> Result<(), MapperError> {
        self.raw("COMMIT").await.map(|_| ())
    }

    async fn rollback(&self) -> Result<(), MapperError> {
        self.raw("ROLLBACK").await.map(|_| ())
    }
}
