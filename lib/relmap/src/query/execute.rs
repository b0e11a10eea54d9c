//! Running builders against a [`Database`]: preflight, fetches, aggregates,
//! pagination and write statements.

use serde::de::DeserializeOwned;

use super::{QueryBuilder, Source, TableRef};
use crate::identifier::parse_qualified;
use crate::{Database, ExecResult, MapperError, Payload, Row, Value};

/// One page of rows plus the totals needed to render pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Row>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub last_page: u64,
}

/// The key a selected column shows up under in result rows.
fn output_key(column: &str) -> &str {
    let column = column.trim();
    let lowered = column.to_ascii_lowercase();
    let tail = match lowered.rfind(" as ") {
        Some(pos) => &column[pos + 4..],
        None => column.rsplit('.').next().unwrap_or(column),
    };
    tail.trim().trim_matches('`')
}

fn aggregate(rows: &[Row]) -> Value {
    rows.first()
        .and_then(|row| row.get("aggregate"))
        .map(Value::from)
        .unwrap_or(Value::Null)
}

async fn resolve_ref(db: &Database, table: &mut TableRef) -> Result<(), MapperError> {
    let resolved = db.resolve_table(&table.qualified()).await?;
    let (schema, name) = parse_qualified(&resolved);
    table.schema = schema.map(str::to_string);
    table.name = name.to_string();
    Ok(())
}

impl QueryBuilder {
    /// Resolve FROM and JOIN table references against the live schema. Runs at
    /// most once per builder; later calls are no-ops.
    pub async fn preflight(&mut self, db: &Database) -> Result<(), MapperError> {
        if self.preflighted {
            return Ok(());
        }
        if let Some(Source::Table(table)) = &mut self.statement.from {
            resolve_ref(db, table).await?;
        }
        for join in &mut self.statement.joins {
            if let Source::Table(table) = &mut join.source {
                resolve_ref(db, table).await?;
            }
        }
        self.preflighted = true;
        Ok(())
    }

    pub async fn fetch_all(&mut self, db: &Database) -> Result<Vec<Row>, MapperError> {
        self.preflight(db).await?;
        let compiled = self.compile()?;
        db.fetch(&compiled).await
    }

    /// First row, fetched with `LIMIT 1`.
    pub async fn fetch_one(&mut self, db: &Database) -> Result<Option<Row>, MapperError> {
        self.preflight(db).await?;
        let mut dup = self.clone();
        dup.statement.limit = Some(1);
        Ok(dup.fetch_all(db).await?.into_iter().next())
    }

    /// Rows deserialized into `T`.
    pub async fn fetch_as<T: DeserializeOwned>(
        &mut self,
        db: &Database,
    ) -> Result<Vec<T>, MapperError> {
        self.fetch_all(db)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(serde_json::Value::Object(row)).map_err(Into::into))
            .collect()
    }

    /// One column from every row.
    pub async fn pluck(&mut self, db: &Database, column: &str) -> Result<Vec<Value>, MapperError> {
        self.preflight(db).await?;
        let key = output_key(column).to_string();
        let mut dup = self.clone().select([column]);
        Ok(dup
            .fetch_all(db)
            .await?
            .iter()
            .map(|row| row.get(&key).map(Value::from).unwrap_or(Value::Null))
            .collect())
    }

    /// One column from the first row.
    pub async fn value(
        &mut self,
        db: &Database,
        column: &str,
    ) -> Result<Option<Value>, MapperError> {
        self.preflight(db).await?;
        let key = output_key(column).to_string();
        let mut dup = self.clone().select([column]);
        Ok(dup
            .fetch_one(db)
            .await?
            .and_then(|row| row.get(&key).map(Value::from)))
    }

    /// Row count ignoring limit, offset and ordering. Grouped, distinct and
    /// union statements are counted as a derived table.
    pub async fn count(&mut self, db: &Database) -> Result<u64, MapperError> {
        self.preflight(db).await?;
        let inner = self.duplicate_for_aggregate();
        let statement = inner.statement();
        let wrap = !statement.group_by.is_empty()
            || statement.distinct
            || !statement.unions.is_empty()
            || statement.custom.is_some();

        let mut counter = if wrap {
            QueryBuilder::new()
                .select(["COUNT(*) AS aggregate"])
                .from_sub(inner, "aggregate_table")
        } else {
            inner.select(["COUNT(*) AS aggregate"])
        };
        let rows = counter.fetch_all(db).await?;
        Ok(aggregate(&rows).as_u64().unwrap_or(0))
    }

    pub async fn exists(&mut self, db: &Database) -> Result<bool, MapperError> {
        self.preflight(db).await?;
        let inner = self.duplicate_for_aggregate().compile()?;
        let mut probe = QueryBuilder::new().custom(
            format!("SELECT EXISTS({}) AS aggregate", inner.sql),
            inner.params,
        );
        let rows = probe.fetch_all(db).await?;
        Ok(aggregate(&rows).as_u64().unwrap_or(0) > 0)
    }

    async fn aggregate_of(
        &mut self,
        db: &Database,
        function: &str,
        column: &str,
    ) -> Result<Option<Value>, MapperError> {
        self.preflight(db).await?;
        let mut dup = self
            .duplicate_for_aggregate()
            .select([format!("{function}({column}) AS aggregate")]);
        let value = aggregate(&dup.fetch_all(db).await?);
        Ok((!value.is_null()).then_some(value))
    }

    pub async fn sum(&mut self, db: &Database, column: &str) -> Result<Option<Value>, MapperError> {
        self.aggregate_of(db, "SUM", column).await
    }

    pub async fn avg(&mut self, db: &Database, column: &str) -> Result<Option<Value>, MapperError> {
        self.aggregate_of(db, "AVG", column).await
    }

    pub async fn min(&mut self, db: &Database, column: &str) -> Result<Option<Value>, MapperError> {
        self.aggregate_of(db, "MIN", column).await
    }

    pub async fn max(&mut self, db: &Database, column: &str) -> Result<Option<Value>, MapperError> {
        self.aggregate_of(db, "MAX", column).await
    }

    /// `FOUND_ROWS()` after a `calc_found_rows` query on the same connection.
    pub async fn found_rows(db: &Database) -> Result<u64, MapperError> {
        let rows = db
            .fetch(&super::CompiledQuery {
                sql: "SELECT FOUND_ROWS() AS aggregate".to_string(),
                params: Default::default(),
            })
            .await?;
        Ok(aggregate(&rows).as_u64().unwrap_or(0))
    }

    /// A 1-based page together with the total count.
    pub async fn paginate(
        &mut self,
        db: &Database,
        page: u64,
        per_page: u64,
    ) -> Result<Page, MapperError> {
        if per_page == 0 {
            return Err(MapperError::invalid("per_page must be positive"));
        }
        let page = page.max(1);
        let total = self.count(db).await?;
        let mut dup = self.clone().for_page(page, per_page);
        let items = dup.fetch_all(db).await?;
        Ok(Page {
            items,
            total,
            page,
            per_page,
            last_page: total.div_ceil(per_page).max(1),
        })
    }

    pub async fn insert(
        &mut self,
        db: &Database,
        payload: &Payload,
    ) -> Result<ExecResult, MapperError> {
        self.preflight(db).await?;
        db.execute(&self.compile_insert(payload)?).await
    }

    pub async fn insert_get_id(
        &mut self,
        db: &Database,
        payload: &Payload,
    ) -> Result<u64, MapperError> {
        Ok(self.insert(db, payload).await?.last_insert_id)
    }

    pub async fn upsert(
        &mut self,
        db: &Database,
        payload: &Payload,
        update_columns: &[&str],
    ) -> Result<u64, MapperError> {
        self.preflight(db).await?;
        let compiled = self.compile_upsert(payload, update_columns)?;
        Ok(db.execute(&compiled).await?.rows_affected)
    }

    pub async fn update(&mut self, db: &Database, payload: &Payload) -> Result<u64, MapperError> {
        self.preflight(db).await?;
        Ok(db.execute(&self.compile_update(payload)?).await?.rows_affected)
    }

    pub async fn delete(&mut self, db: &Database) -> Result<u64, MapperError> {
        self.preflight(db).await?;
        Ok(db.execute(&self.compile_delete()?).await?.rows_affected)
    }
}
