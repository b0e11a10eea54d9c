//! Schema introspection through `information_schema`, memoized per owner.
//!
//! Caches live for the lifetime of the owning [`Database`](crate::Database)
//! and are only invalidated by [`SchemaCache::clear`].

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{Connection, MapperError, Params, Row, Value};

/// A non-primary unique index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    pub name: String,
    pub columns: Vec<String>,
}

/// One column of a foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub constraint: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: Mutex<HashMap<String, bool>>,
    columns: Mutex<HashMap<String, Vec<String>>>,
    unique_indexes: Mutex<HashMap<String, Vec<UniqueIndex>>>,
    foreign_keys: Mutex<HashMap<String, Vec<ForeignKey>>>,
}

fn cache_key(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{schema}.{table}"),
        None => table.to_string(),
    }
}

/// `table_schema = ...` predicate plus the bindings it needs.
fn scope(schema: Option<&str>, table: &str) -> (String, Params) {
    let mut params = Params::new();
    params.insert("table".to_string(), Value::from(table));
    let predicate = match schema {
        Some(schema) => {
            params.insert("schema".to_string(), Value::from(schema));
            "table_schema = :schema AND table_name = :table"
        }
        None => "table_schema = DATABASE() AND table_name = :table",
    };
    (predicate.to_string(), params)
}

fn text(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(|v| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    })
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn table_exists(
        &self,
        conn: &dyn Connection,
        schema: Option<&str>,
        table: &str,
    ) -> Result<bool, MapperError> {
        let key = cache_key(schema, table);
        if let Some(hit) = self.tables.lock().get(&key) {
            return Ok(*hit);
        }

        let (predicate, params) = scope(schema, table);
        let sql = format!(
            "SELECT COUNT(*) AS aggregate FROM information_schema.tables WHERE {predicate}"
        );
        let rows = conn.fetch_all(&sql, &params).await?;
        let exists = rows
            .first()
            .and_then(|row| row.get("aggregate"))
            .map(|v| Value::from(v).as_u64().unwrap_or(0) > 0)
            .unwrap_or(false);

        self.tables.lock().insert(key, exists);
        Ok(exists)
    }

    /// Column names of `table` in ordinal order. Empty when the table is unknown.
    pub async fn columns(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<Vec<String>, MapperError> {
        if let Some(hit) = self.columns.lock().get(table) {
            return Ok(hit.clone());
        }

        let (schema, name) = crate::identifier::parse_qualified(table);
        let (predicate, params) = scope(schema, name);
        let sql = format!(
            "SELECT COLUMN_NAME AS column_name FROM information_schema.columns \
             WHERE {predicate} ORDER BY ORDINAL_POSITION"
        );
        let columns: Vec<String> = conn
            .fetch_all(&sql, &params)
            .await?
            .iter()
            .filter_map(|row| text(row, "column_name"))
            .collect();

        self.columns
            .lock()
            .insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    pub async fn unique_indexes(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<Vec<UniqueIndex>, MapperError> {
        if let Some(hit) = self.unique_indexes.lock().get(table) {
            return Ok(hit.clone());
        }

        let (schema, name) = crate::identifier::parse_qualified(table);
        let (predicate, params) = scope(schema, name);
        let sql = format!(
            "SELECT INDEX_NAME AS index_name, COLUMN_NAME AS column_name \
             FROM information_schema.statistics \
             WHERE {predicate} AND NON_UNIQUE = 0 AND INDEX_NAME <> 'PRIMARY' \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX"
        );
        let mut indexes: Vec<UniqueIndex> = Vec::new();
        for row in conn.fetch_all(&sql, &params).await? {
            let (Some(index), Some(column)) = (text(&row, "index_name"), text(&row, "column_name"))
            else {
                continue;
            };
            match indexes.iter_mut().find(|i| i.name == index) {
                Some(existing) => existing.columns.push(column),
                None => indexes.push(UniqueIndex {
                    name: index,
                    columns: vec![column],
                }),
            }
        }

        self.unique_indexes
            .lock()
            .insert(table.to_string(), indexes.clone());
        Ok(indexes)
    }

    pub async fn foreign_keys(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<Vec<ForeignKey>, MapperError> {
        if let Some(hit) = self.foreign_keys.lock().get(table) {
            return Ok(hit.clone());
        }

        let (schema, name) = crate::identifier::parse_qualified(table);
        let (predicate, params) = scope(schema, name);
        let sql = format!(
            "SELECT CONSTRAINT_NAME AS constraint_name, COLUMN_NAME AS column_name, \
             REFERENCED_TABLE_NAME AS referenced_table, REFERENCED_COLUMN_NAME AS referenced_column \
             FROM information_schema.key_column_usage \
             WHERE {predicate} AND REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION"
        );
        let keys: Vec<ForeignKey> = conn
            .fetch_all(&sql, &params)
            .await?
            .iter()
            .filter_map(|row| {
                Some(ForeignKey {
                    constraint: text(row, "constraint_name")?,
                    column: text(row, "column_name")?,
                    referenced_table: text(row, "referenced_table")?,
                    referenced_column: text(row, "referenced_column")?,
                })
            })
            .collect();

        self.foreign_keys
            .lock()
            .insert(table.to_string(), keys.clone());
        Ok(keys)
    }

    /// Forget everything cached about `table`.
    pub fn invalidate(&self, table: &str) {
        self.tables.lock().retain(|key, _| key != table);
        self.columns.lock().remove(table);
        self.unique_indexes.lock().remove(table);
        self.foreign_keys.lock().remove(table);
    }

    pub fn clear(&self) {
        self.tables.lock().clear();
        self.columns.lock().clear();
        self.unique_indexes.lock().clear();
        self.foreign_keys.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnection, row};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn introspection() -> MockConnection {
        MockConnection::new(|sql, _| {
            if sql.contains("information_schema.columns") {
                return Ok(vec![
                    row(&[("column_name", json!("id"))]),
                    row(&[("column_name", json!("email"))]),
                    row(&[("column_name", json!("team_id"))]),
                ]);
            }
            if sql.contains("information_schema.statistics") {
                return Ok(vec![
                    row(&[("index_name", json!("uniq_email")), ("column_name", json!("email"))]),
                    row(&[("index_name", json!("uniq_pair")), ("column_name", json!("team_id"))]),
                    row(&[("index_name", json!("uniq_pair")), ("column_name", json!("email"))]),
                ]);
            }
            if sql.contains("information_schema.key_column_usage") {
                return Ok(vec![row(&[
                    ("constraint_name", json!("fk_team")),
                    ("column_name", json!("team_id")),
                    ("referenced_table", json!("team")),
                    ("referenced_column", json!("id")),
                ])]);
            }
            Ok(vec![])
        })
    }

    #[tokio::test]
    async fn reads_columns_once() {
        let conn = introspection();
        let cache = SchemaCache::new();
        let first = cache.columns(&conn, "users").await.unwrap();
        let second = cache.columns(&conn, "users").await.unwrap();
        assert_eq!(first, vec!["id", "email", "team_id"]);
        assert_eq!(first, second);
        assert_eq!(conn.statements().len(), 1);

        cache.clear();
        cache.columns(&conn, "users").await.unwrap();
        assert_eq!(conn.statements().len(), 2);
    }

    #[tokio::test]
    async fn groups_unique_index_columns() {
        let conn = introspection();
        let cache = SchemaCache::new();
        let indexes = cache.unique_indexes(&conn, "users").await.unwrap();
        assert_eq!(
            indexes,
            vec![
                UniqueIndex {
                    name: "uniq_email".into(),
                    columns: vec!["email".into()],
                },
                UniqueIndex {
                    name: "uniq_pair".into(),
                    columns: vec!["team_id".into(), "email".into()],
                },
            ]
        );
    }

    #[tokio::test]
    async fn reads_foreign_keys() {
        let conn = introspection();
        let cache = SchemaCache::new();
        let keys = cache.foreign_keys(&conn, "users").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].referenced_table, "team");
    }

    #[tokio::test]
    async fn schema_qualified_lookup_binds_schema() {
        let conn = introspection();
        let cache = SchemaCache::new();
        cache.columns(&conn, "shop.users").await.unwrap();
        let (sql, params) = conn.executed().remove(0);
        assert!(sql.contains("table_schema = :schema"));
        assert_eq!(params.get("schema"), Some(&Value::from("shop")));
        assert_eq!(params.get("table"), Some(&Value::from("users")));
    }
}
