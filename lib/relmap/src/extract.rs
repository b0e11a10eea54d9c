//! Entity → column payload extraction and the foreign-key column heuristic.
//!
//! Owning relation properties rarely name their column explicitly. The column
//! is found by generating spellings of `<property>_id` and checking them
//! against the table, then by a loose underscore-insensitive match, and
//! finally by assuming `snake_case(property)_id`.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::metadata::{EntityMetadata, FieldMetadata, FieldRole};
use crate::{Database, Entity, MapperError, Payload, Value};

/// Split a property name on underscores and case boundaries. Runs of capitals
/// stay together: `parentHTTPRequest` → `parent`, `HTTP`, `Request`.
pub fn tokenize(property: &str) -> Vec<String> {
    let chars: Vec<char> = property.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                tokens.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

pub fn snake_case(name: &str) -> String {
    tokenize(name)
        .iter()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

fn is_acronym(token: &str) -> bool {
    token.chars().count() > 1 && token.chars().all(|c| c.is_uppercase() || c.is_ascii_digit())
}

/// Candidate column spellings for an owning relation property, most likely
/// first.
pub fn candidates(property: &str) -> Vec<String> {
    let tokens = tokenize(property);
    let lower: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    let snake = lower.join("_");
    let mut out: Vec<String> = Vec::new();

    if lower.len() > 1 && lower.last().is_some_and(|t| t == "id") {
        out.push(snake.clone());
    }
    out.push(format!("{snake}_id"));
    out.push(format!("{}_id", lower.concat()));

    for (i, token) in tokens.iter().enumerate() {
        if !is_acronym(token) {
            continue;
        }
        if i + 1 < lower.len() {
            let mut merged = lower.clone();
            let next = merged.remove(i + 1);
            merged[i].push_str(&next);
            out.push(format!("{}_id", merged.join("_")));
        }
        if i > 0 {
            let mut merged = lower.clone();
            let this = merged.remove(i);
            merged[i - 1].push_str(&this);
            out.push(format!("{}_id", merged.join("_")));
        }
    }

    out.push(format!("{property}_id"));
    out.push(format!("{property}Id"));

    let mut seen = Vec::with_capacity(out.len());
    out.retain(|c| {
        if seen.contains(c) {
            false
        } else {
            seen.push(c.clone());
            true
        }
    });
    out
}

/// Pick the foreign-key column for `property` among `columns`.
pub fn match_column(property: &str, columns: &[String]) -> String {
    let candidates = candidates(property);
    if let Some(hit) = candidates.iter().find(|c| columns.contains(c)) {
        return hit.clone();
    }
    for candidate in &candidates {
        if let Some(column) = columns.iter().find(|col| col.eq_ignore_ascii_case(candidate)) {
            return column.clone();
        }
    }

    let stripped = property.replace('_', "").to_lowercase();
    for column in columns {
        let lowered = column.to_lowercase();
        if let Some(prefix) = lowered.strip_suffix("_id") {
            if prefix.replace('_', "") == stripped {
                return column.clone();
            }
        }
    }

    format!("{}_id", snake_case(property))
}

/// Turns entities into column payloads; memoizes heuristic column lookups
/// until [`MetadataExtractor::clear`].
#[derive(Debug, Default)]
pub struct MetadataExtractor {
    columns: Mutex<HashMap<(String, String), String>>,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column holding the foreign key of owning relation `field` on `table`.
    pub async fn foreign_key_column(
        &self,
        db: &Database,
        table: &str,
        field: &FieldMetadata,
    ) -> Result<String, MapperError> {
        if let Some(column) = field.column {
            return Ok(column.to_string());
        }
        let key = (table.to_string(), field.name.to_string());
        if let Some(hit) = self.columns.lock().get(&key) {
            return Ok(hit.clone());
        }

        let resolved = db.resolve_table(table).await?;
        let columns = db.table_columns(&resolved).await?;
        let column = match_column(field.name, &columns);
        debug!(table = %resolved, property = field.name, column = %column, "foreign key column matched");

        self.columns.lock().insert(key, column.clone());
        Ok(column)
    }

    /// Target metadata and the foreign-key column on the target's table that
    /// points back at the owner of inverse relation `field`.
    pub async fn inverse_foreign_key(
        &self,
        db: &Database,
        owner: &EntityMetadata,
        field: &FieldMetadata,
    ) -> Result<(&'static EntityMetadata, String), MapperError> {
        let target = field.target()?;
        let mapped_by = field.mapped_by.ok_or_else(|| {
            MapperError::invalid(format!(
                "inverse relation {}.{} has no mapped_by",
                owner.name, field.name
            ))
        })?;
        let owning = target.field(mapped_by).ok_or_else(|| {
            MapperError::invalid(format!("{}.{mapped_by} does not exist", target.name))
        })?;
        let column = self.foreign_key_column(db, target.table, owning).await?;
        Ok((target, column))
    }

    /// Column → value payload for persisting `entity`.
    ///
    /// Scalars map to their column, owning relations to their foreign-key
    /// column, inverse relations are skipped, and an unset primary key is
    /// omitted. Every payload column must exist on the table.
    pub async fn extract<T: Entity>(
        &self,
        db: &Database,
        entity: &T,
    ) -> Result<Payload, MapperError> {
        let meta = T::metadata();
        let serialized = serde_json::to_value(entity)?;
        let object = serialized.as_object().ok_or_else(|| {
            MapperError::invalid(format!("{} does not serialize to an object", meta.name))
        })?;

        let mut payload = Payload::new();
        for field in meta.fields {
            let Some(raw) = object.get(field.name) else {
                continue;
            };
            let value = Value::from(raw);
            match field.role {
                FieldRole::Scalar => {
                    if field.name == meta.primary_key && value.is_null() {
                        continue;
                    }
                    payload.insert(field.column_name().to_string(), value);
                }
                FieldRole::Relation(_) if field.is_owning() => {
                    let column = self.foreign_key_column(db, meta.table, field).await?;
                    payload.insert(column, value);
                }
                FieldRole::Relation(_) => {}
            }
        }

        let table = db.resolve_table(meta.table).await?;
        let columns = db.table_columns(&table).await?;
        if !columns.is_empty() {
            if let Some(missing) = payload.keys().find(|c| !columns.contains(c)) {
                return Err(MapperError::SchemaMismatch {
                    table,
                    column: missing.clone(),
                });
            }
        }
        Ok(payload)
    }

    pub fn clear(&self) {
        self.columns.lock().clear();
    }
}
