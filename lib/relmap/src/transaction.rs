//! Nested transactions via savepoints, and named advisory locks.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{Database, MapperError, Params, Row, Value};

const MAX_LOCK_NAME: usize = 64;

fn savepoint(level: u32) -> String {
    format!("relmap_sp_{level}")
}

fn flag(rows: &[Row], column: &str) -> bool {
    rows.first()
        .and_then(|row| row.get(column))
        .map(Value::from)
        .and_then(|v| v.as_u64())
        == Some(1)
}

fn lock_params(name: &str) -> Result<Params, MapperError> {
    if name.is_empty() || name.len() > MAX_LOCK_NAME {
        return Err(MapperError::invalid(format!(
            "lock name must be 1..={MAX_LOCK_NAME} bytes"
        )));
    }
    let mut params = Params::new();
    params.insert("name".to_string(), Value::from(name));
    Ok(params)
}

impl Database {
    /// Current nesting level; 0 outside any transaction.
    pub fn transaction_level(&self) -> u32 {
        self.tx_depth.load(Ordering::SeqCst)
    }

    /// Begin a transaction, or a savepoint when one is already open.
    pub async fn begin(&self) -> Result<(), MapperError> {
        let level = self.transaction_level();
        if level == 0 {
            self.connection().begin().await?;
        } else {
            self.connection()
                .exec(&format!("SAVEPOINT {}", savepoint(level)))
                .await?;
        }
        self.tx_depth.store(level + 1, Ordering::SeqCst);
        info!(level = level + 1, "transaction begin");
        Ok(())
    }

    pub async fn commit(&self) -> Result<(), MapperError> {
        let level = self.transaction_level();
        match level {
            0 => return Err(MapperError::Transaction("commit without an open transaction".into())),
            1 => {
                // a failed COMMIT still ends the transaction on the server
                let result = self.connection().commit().await;
                self.tx_depth.store(0, Ordering::SeqCst);
                result?;
            }
            _ => {
                self.connection()
                    .exec(&format!("RELEASE SAVEPOINT {}", savepoint(level - 1)))
                    .await?;
            }
        }
        self.tx_depth.store(level - 1, Ordering::SeqCst);
        info!(level, "transaction commit");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), MapperError> {
        let level = self.transaction_level();
        match level {
            0 => {
                return Err(MapperError::Transaction(
                    "rollback without an open transaction".into(),
                ));
            }
            1 => {
                let result = self.connection().rollback().await;
                self.tx_depth.store(0, Ordering::SeqCst);
                result?;
            }
            _ => {
                self.connection()
                    .exec(&format!("ROLLBACK TO SAVEPOINT {}", savepoint(level - 1)))
                    .await?;
            }
        }
        self.tx_depth.store(level - 1, Ordering::SeqCst);
        info!(level, "transaction rollback");
        Ok(())
    }

    /// Run `body` inside a (possibly nested) transaction, committing on `Ok`
    /// and rolling back on `Err`.
    pub async fn transaction<R, F>(&self, body: F) -> Result<R, MapperError>
    where
        F: AsyncFnOnce(&Database) -> Result<R, MapperError>,
    {
        self.begin().await?;
        let level = self.transaction_level();
        match body(self).await {
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.abandon(level).await;
                    Err(err)
                }
            },
            Err(err) => {
                if let Err(rollback) = self.rollback().await {
                    warn!(error = %rollback, "rollback after failed transaction body failed");
                }
                Err(err)
            }
        }
    }

    /// Roll back after a failed commit at `level`. A failed top-level COMMIT
    /// has already reset the level, so the driver is asked directly.
    async fn abandon(&self, level: u32) {
        let result = if self.transaction_level() == level {
            self.rollback().await
        } else {
            self.connection().rollback().await
        };
        if let Err(err) = result {
            warn!(error = %err, level, "rollback after failed commit failed");
        }
    }

    /// Acquire a named advisory lock. Without a timeout a single attempt is
    /// made; with one, the lock is polled at the configured interval.
    pub async fn lock(&self, name: &str, timeout: Option<Duration>) -> Result<bool, MapperError> {
        let params = lock_params(name)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let rows = self
                .connection()
                .fetch_all("SELECT GET_LOCK(:name, 0) AS acquired", &params)
                .await?;
            if flag(&rows, "acquired") {
                info!(lock = name, "advisory lock acquired");
                return Ok(true);
            }
            let Some(deadline) = deadline else {
                return Ok(false);
            };
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.config().lock_poll_interval.min(deadline - now)).await;
        }
    }

    pub async fn unlock(&self, name: &str) -> Result<bool, MapperError> {
        let params = lock_params(name)?;
        let rows = self
            .connection()
            .fetch_all("SELECT RELEASE_LOCK(:name) AS released", &params)
            .await?;
        Ok(flag(&rows, "released"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnection, row};
    use crate::{ExecResult, MapperConfig};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn database() -> (Database, Arc<MockConnection>) {
        let conn = Arc::new(MockConnection::new(|_, _| Ok(vec![])));
        (Database::from_shared(conn.clone()), conn)
    }

    #[tokio::test]
    async fn nested_levels_use_savepoints() {
        let (db, conn) = database();
        db.begin().await.unwrap();
        db.begin().await.unwrap();
        db.begin().await.unwrap();
        assert_eq!(db.transaction_level(), 3);
        db.rollback().await.unwrap();
        db.commit().await.unwrap();
        db.commit().await.unwrap();
        assert_eq!(db.transaction_level(), 0);

        assert_eq!(
            conn.statements(),
            vec![
                "BEGIN",
                "SAVEPOINT relmap_sp_1",
                "SAVEPOINT relmap_sp_2",
                "ROLLBACK TO SAVEPOINT relmap_sp_2",
                "RELEASE SAVEPOINT relmap_sp_1",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn commit_without_transaction_fails() {
        let (db, _) = database();
        assert!(matches!(db.commit().await, Err(MapperError::Transaction(_))));
        assert!(matches!(db.rollback().await, Err(MapperError::Transaction(_))));
    }

    #[tokio::test]
    async fn transaction_helper_rolls_back_on_error() {
        let (db, conn) = database();
        let result: Result<(), MapperError> = db
            .transaction(async |_db: &Database| Err(MapperError::invalid("boom")))
            .await;
        assert!(result.is_err());
        assert_eq!(conn.statements(), vec!["BEGIN", "ROLLBACK"]);

        let value = db
            .transaction(async |inner: &Database| {
                inner.transaction(async |_db: &Database| Ok(7)).await
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(db.transaction_level(), 0);
        assert!(conn.statements().contains(&"RELEASE SAVEPOINT relmap_sp_1".to_string()));
    }

    #[tokio::test]
    async fn failed_commit_resets_level_and_rolls_back() {
        let conn = Arc::new(
            MockConnection::new(|_, _| Ok(vec![]))
                .on_commit(|| Err(MapperError::execution("40001", 1213, "Deadlock found"))),
        );
        let db = Database::from_shared(conn.clone());

        let result = db.transaction(async |_db: &Database| Ok(1)).await;
        assert_eq!(result.unwrap_err().code(), Some(1213));
        assert_eq!(db.transaction_level(), 0);
        assert_eq!(conn.statements(), vec!["BEGIN", "COMMIT", "ROLLBACK"]);

        // the next transaction starts for real instead of nesting
        db.begin().await.unwrap();
        assert_eq!(conn.statements().last().map(String::as_str), Some("BEGIN"));
        assert_eq!(db.transaction_level(), 1);
    }

    #[tokio::test]
    async fn failed_release_rolls_back_to_savepoint() {
        let conn = Arc::new(MockConnection::new(|_, _| Ok(vec![])).on_execute(|sql, _| {
            if sql.starts_with("RELEASE") {
                return Err(MapperError::execution("HY000", 1305, "SAVEPOINT does not exist"));
            }
            Ok(ExecResult::default())
        }));
        let db = Database::from_shared(conn.clone());

        db.begin().await.unwrap();
        let nested = db.transaction(async |_db: &Database| Ok(())).await;
        assert!(nested.is_err());
        assert_eq!(db.transaction_level(), 1);
        assert_eq!(
            conn.statements().last().map(String::as_str),
            Some("ROLLBACK TO SAVEPOINT relmap_sp_1")
        );
    }

    #[tokio::test]
    async fn lock_polls_until_acquired() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let conn = MockConnection::new(move |sql, _| {
            if sql.contains("GET_LOCK") {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                return Ok(vec![row(&[("acquired", json!(i64::from(n >= 2)))])]);
            }
            Ok(vec![row(&[("released", json!(1))])])
        });
        let db = Database::with_config(
            conn,
            MapperConfig::default().lock_poll_interval(Duration::from_millis(1)),
        );

        assert!(db.lock("jobs", Some(Duration::from_secs(5))).await.unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(db.unlock("jobs").await.unwrap());
    }

    #[tokio::test]
    async fn lock_without_timeout_tries_once() {
        let (db, conn) = database();
        assert!(!db.lock("jobs", None).await.unwrap());
        assert_eq!(conn.statements().len(), 1);
        assert!(db.lock("", None).await.is_err());
    }
}
