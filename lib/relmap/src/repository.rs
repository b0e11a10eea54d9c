//! Per-entity repository façade.
//!
//! - Reads (`find`, `find_by`, `find_one_by`, `find_all`) load roots through
//!   the relation loader and return them with their graph.
//! - `save` updates by primary key, upserts by natural key, and recovers once
//!   from a unique conflict or a foreign key aimed at a renamed table.
//! - `delete` clears join rows, detaches inverse foreign keys, then removes
//!   the row.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::identifier::quote;
use crate::metadata::{FieldMetadata, RelationKind, join_spec};
use crate::schema::UniqueIndex;
use crate::{Database, Entity, Loaded, MapperError, Order, Payload, QueryBuilder, Row, Value};

/// MySQL's text for a child-row foreign-key failure.
const FK_FAILURE: &str = r"CONSTRAINT `(?P<constraint>[^`]+)` FOREIGN KEY \(`(?P<column>[^`]+)`\) REFERENCES (?P<target>`[^`]+`(?:\.`[^`]+`)?) \(`(?P<referenced>[^`]+)`\)";

/// Column names that identify a row on their own.
const IDENTITY_LIKE: &[&str] = &["email", "uuid", "username", "slug"];

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// New row; carries the generated key (0 when the table has none).
    Inserted(u64),
    /// Existing row updated; carries the affected row count.
    Updated(u64),
    /// Nothing differed from the load-time snapshot.
    Unchanged,
}

pub struct Repository<'db, T> {
    db: &'db Database,
    /// Rows as loaded, keyed by identity key; drives partial updates.
    snapshots: Mutex<HashMap<String, Row>>,
    _entity: PhantomData<fn() -> T>,
}

impl<'db, T: Entity> Repository<'db, T> {
    pub fn new(db: &'db Database) -> Self {
        Self {
            db,
            snapshots: Mutex::new(HashMap::new()),
            _entity: PhantomData,
        }
    }

    /// A builder over this entity's table.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::table(T::metadata().table)
    }

    fn primary_key_column() -> Result<String, MapperError> {
        quote(T::metadata().primary_key_column())
    }

    /// Column behind a property name; unknown names are taken as columns.
    async fn column_for(&self, property: &str) -> Result<String, MapperError> {
        let meta = T::metadata();
        match meta.field(property) {
            Some(field) if field.is_owning() => {
                self.db
                    .extractor()
                    .foreign_key_column(self.db, meta.table, field)
                    .await
            }
            Some(field) if field.is_relation() => Err(MapperError::invalid(format!(
                "cannot filter {} on inverse relation {property}",
                meta.name
            ))),
            Some(field) => Ok(field.column_name().to_string()),
            None => Ok(property.to_string()),
        }
    }

    async fn criteria_query(&self, criteria: &[(&str, Value)]) -> Result<QueryBuilder, MapperError> {
        let mut query = self.query();
        for (property, value) in criteria {
            let column = quote(&self.column_for(property).await?)?;
            query = if value.is_null() {
                query.where_null(column)
            } else {
                query.r#where(column, "=", value)
            };
        }
        Ok(query)
    }

    async fn load(&self, rows: Vec<Row>) -> Result<Loaded<T>, MapperError> {
        let graph = self.db.loader().load(T::metadata(), rows).await?;
        {
            let mut snapshots = self.snapshots.lock();
            for (id, _) in graph.all::<T>() {
                if let (Some(key), Some(row)) = (graph.key(id), graph.row(id)) {
                    if let Some(identity) = key.identity_key() {
                        snapshots.insert(identity, row.clone());
                    }
                }
            }
        }
        Ok(Loaded::new(graph))
    }

    pub async fn find(&self, id: impl Into<Value>) -> Result<Option<Loaded<T>>, MapperError> {
        let id = id.into();
        if id.is_null() {
            return Ok(None);
        }
        let rows = self
            .query()
            .r#where(Self::primary_key_column()?, "=", id)
            .limit(1)
            .fetch_all(self.db)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        self.load(rows).await.map(Some)
    }

    /// Entities whose properties equal `criteria`. Owning relation properties
    /// compare their foreign-key column; a null value matches `IS NULL`.
    pub async fn find_by(
        &self,
        criteria: &[(&str, Value)],
        order: &[(&str, Order)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Loaded<T>, MapperError> {
        let mut query = self.criteria_query(criteria).await?;
        for (property, direction) in order {
            query = query.order_by(quote(&self.column_for(property).await?)?, *direction);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        if let Some(offset) = offset {
            query = query.offset(offset);
        }
        let rows = query.fetch_all(self.db).await?;
        self.load(rows).await
    }

    pub async fn find_one_by(
        &self,
        criteria: &[(&str, Value)],
    ) -> Result<Option<Loaded<T>>, MapperError> {
        let loaded = self.find_by(criteria, &[], Some(1), None).await?;
        Ok((!loaded.is_empty()).then_some(loaded))
    }

    /// Every entity matching `criteria`, in primary key order.
    pub async fn find_all(&self, criteria: &[(&str, Value)]) -> Result<Loaded<T>, MapperError> {
        let pk = T::metadata().primary_key;
        self.find_by(criteria, &[(pk, Order::Asc)], None, None).await
    }

    pub async fn count(&self, criteria: &[(&str, Value)]) -> Result<u64, MapperError> {
        self.criteria_query(criteria).await?.count(self.db).await
    }

    /// Persist `entity`, assigning its primary key when a row is created or
    /// matched by natural key.
    pub async fn save(&self, entity: &mut T) -> Result<SaveOutcome, MapperError> {
        let meta = T::metadata();
        let table = self.db.resolve_table(meta.table).await?;
        let payload = self.db.extractor().extract(self.db, entity).await?;
        if payload.is_empty() {
            return Err(MapperError::invalid(format!("{} has nothing to save", meta.name)));
        }

        if let Some(key) = entity.primary_key().filter(|k| !k.is_null()) {
            return self.update_existing(&table, &key, payload).await;
        }

        if let Some(key) = self.locate_by_natural_key(&table, &payload).await? {
            debug!(entity = meta.name, key = ?key, "matched existing row by natural key");
            entity.set_primary_key(&key)?;
            return self.update_existing(&table, &key, payload).await;
        }

        self.insert(entity, &table, payload).await
    }

    async fn insert(
        &self,
        entity: &mut T,
        table: &str,
        payload: Payload,
    ) -> Result<SaveOutcome, MapperError> {
        let mut repaired = false;
        loop {
            match QueryBuilder::table(table).insert(self.db, &payload).await {
                Ok(result) => {
                    if result.last_insert_id > 0 {
                        entity.set_primary_key(&Value::UInt(result.last_insert_id))?;
                    }
                    info!(table, id = result.last_insert_id, "inserted");
                    return Ok(SaveOutcome::Inserted(result.last_insert_id));
                }
                Err(err) if err.is_unique_violation() => {
                    warn!(table, error = %err, "unique conflict on insert, falling back to update");
                    return match self.locate_by_natural_key(table, &payload).await? {
                        Some(key) => {
                            entity.set_primary_key(&key)?;
                            self.update_existing(table, &key, payload).await
                        }
                        None => Err(err),
                    };
                }
                Err(err)
                    if err.is_foreign_key_violation()
                        && self.db.config().repair_foreign_keys
                        && !repaired =>
                {
                    if !self.repair_foreign_key(table, &err).await? {
                        return Err(err);
                    }
                    repaired = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn update_existing(
        &self,
        table: &str,
        key: &Value,
        payload: Payload,
    ) -> Result<SaveOutcome, MapperError> {
        let pk = T::metadata().primary_key_column();
        let identity = key.identity_key();
        let mut changes: Payload = payload.into_iter().filter(|(c, _)| c != pk).collect();

        if self.db.config().partial_updates {
            if let Some(snapshot) = identity.as_ref().and_then(|i| self.snapshots.lock().get(i).cloned()) {
                changes.retain(|column, value| {
                    snapshot.get(column).map(Value::from).as_ref() != Some(value)
                });
            }
        }
        if changes.is_empty() {
            return Ok(SaveOutcome::Unchanged);
        }

        let rows = QueryBuilder::table(table)
            .r#where(quote(pk)?, "=", key)
            .update(self.db, &changes)
            .await?;

        if let Some(identity) = identity {
            if let Some(snapshot) = self.snapshots.lock().get_mut(&identity) {
                for (column, value) in &changes {
                    snapshot.insert(column.clone(), value.to_json());
                }
            }
        }
        Ok(SaveOutcome::Updated(rows))
    }

    /// Primary key of the row sharing a unique index with `payload`.
    ///
    /// Usable indexes have every column present and non-null. They are tried
    /// preferring those not made only of foreign keys, then wider ones, then
    /// those with identity-like columns.
    async fn locate_by_natural_key(
        &self,
        table: &str,
        payload: &Payload,
    ) -> Result<Option<Value>, MapperError> {
        let conn = self.db.connection();
        let indexes = self.db.schema().unique_indexes(conn, table).await?;
        let foreign: HashSet<String> = self
            .db
            .schema()
            .foreign_keys(conn, table)
            .await?
            .into_iter()
            .map(|fk| fk.column)
            .collect();

        let mut usable: Vec<&UniqueIndex> = indexes
            .iter()
            .filter(|index| {
                index
                    .columns
                    .iter()
                    .all(|c| payload.get(c).is_some_and(|v| !v.is_null()))
            })
            .collect();
        usable.sort_by_key(|index| {
            let fk_only = index
                .columns
                .iter()
                .all(|c| foreign.contains(c) || c.ends_with("_id"));
            let identity = index
                .columns
                .iter()
                .any(|c| IDENTITY_LIKE.iter().any(|i| c.to_lowercase().contains(i)));
            Reverse((!fk_only, index.columns.len(), identity))
        });

        let pk = Self::primary_key_column()?;
        for index in usable {
            let mut query = QueryBuilder::table(table);
            for column in &index.columns {
                if let Some(value) = payload.get(column) {
                    query = query.r#where(quote(column)?, "=", value);
                }
            }
            if let Some(key) = query.value(self.db, &pk).await?.filter(|v| !v.is_null()) {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Re-point a foreign key whose referenced table was renamed. Returns
    /// `false` when the failure is not of that kind.
    async fn repair_foreign_key(&self, table: &str, err: &MapperError) -> Result<bool, MapperError> {
        let Some(message) = err.message() else {
            return Ok(false);
        };
        let pattern = Regex::new(FK_FAILURE).map_err(|e| MapperError::invalid(e.to_string()))?;
        let Some(caps) = pattern.captures(message) else {
            return Ok(false);
        };
        let (constraint, column, target, referenced) = (
            &caps["constraint"],
            &caps["column"],
            caps["target"].replace('`', ""),
            &caps["referenced"],
        );

        let resolved = self.db.resolve_table(&target).await?;
        if resolved == target {
            return Ok(false);
        }

        let quoted = quote(table)?;
        let constraint = quote(constraint)?;
        let conn = self.db.connection();
        conn.exec(&format!("ALTER TABLE {quoted} DROP FOREIGN KEY {constraint}"))
            .await?;
        conn.exec(&format!(
            "ALTER TABLE {quoted} ADD CONSTRAINT {constraint} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote(column)?,
            quote(&resolved)?,
            quote(referenced)?
        ))
        .await?;
        self.db.schema().invalidate(table);
        info!(table, from = %target, to = %resolved, "foreign key re-pointed");
        Ok(true)
    }

    /// Delete by primary key. Returns 0 when no such row exists.
    pub async fn delete(&self, id: impl Into<Value>) -> Result<u64, MapperError> {
        let meta = T::metadata();
        let id = id.into();
        if id.is_null() {
            return Err(MapperError::invalid(format!("{} delete needs a key", meta.name)));
        }
        let table = self.db.resolve_table(meta.table).await?;
        let pk = Self::primary_key_column()?;

        let exists = QueryBuilder::table(&table)
            .r#where(pk.clone(), "=", &id)
            .exists(self.db)
            .await?;
        if !exists {
            return Ok(0);
        }

        for field in meta.relations() {
            match field.kind() {
                Some(RelationKind::ManyToMany) => {
                    if let Err(err) = self.delete_join_rows(field, &id).await {
                        warn!(
                            entity = meta.name,
                            relation = field.name,
                            error = %err,
                            "join row cleanup failed"
                        );
                    }
                }
                Some(RelationKind::OneToMany | RelationKind::OneToOne) if !field.is_owning() => {
                    self.detach_inverse(field, &id).await?;
                }
                _ => {}
            }
        }

        let rows = QueryBuilder::table(&table)
            .r#where(pk, "=", &id)
            .delete(self.db)
            .await?;
        if let Some(identity) = id.identity_key() {
            self.snapshots.lock().remove(&identity);
        }
        info!(entity = meta.name, rows, "deleted");
        Ok(rows)
    }

    pub async fn delete_entity(&self, entity: &T) -> Result<u64, MapperError> {
        let key = entity.primary_key().ok_or_else(|| {
            MapperError::invalid(format!("{} has no primary key", T::metadata().name))
        })?;
        self.delete(key).await
    }

    async fn delete_join_rows(&self, field: &FieldMetadata, id: &Value) -> Result<u64, MapperError> {
        let spec = join_spec(T::metadata(), field)?;
        QueryBuilder::table(&spec.table)
            .r#where(quote(&spec.own_column)?, "=", id)
            .delete(self.db)
            .await
    }

    /// Null the foreign keys on the target table that point at `id`.
    async fn detach_inverse(&self, field: &FieldMetadata, id: &Value) -> Result<u64, MapperError> {
        let (target, column) = self
            .db
            .extractor()
            .inverse_foreign_key(self.db, T::metadata(), field)
            .await?;
        let mut payload = Payload::new();
        payload.insert(column.clone(), Value::Null);
        QueryBuilder::table(target.table)
            .r#where(quote(&column)?, "=", id)
            .update(self.db, &payload)
            .await
    }

    /// Drop snapshots and every cache on the underlying handle.
    pub fn clear_caches(&self) {
        self.snapshots.lock().clear();
        self.db.clear_caches();
    }
}
