//! The [`Entity`] trait and row hydration.

use std::any::Any;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::extract::match_column;
use crate::metadata::{EntityMetadata, FieldRole};
use crate::{Link, MapperError, Row, Value};

/// A persistable struct with static mapping metadata.
///
/// Usually derived with `#[derive(Entity)]`. Serialized field names must
/// match the property names in [`EntityMetadata::fields`].
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn metadata() -> &'static EntityMetadata;

    /// Current primary key, `None` when unsaved.
    fn primary_key(&self) -> Option<Value>;

    fn set_primary_key(&mut self, key: &Value) -> Result<(), MapperError>;

    /// Attach loaded graph handles to a relation property. Returns `false`
    /// when `field` is not a relation of this entity.
    fn set_relation(&mut self, field: &str, link: &Link) -> bool;
}

/// Object-safe view of an entity stored in a graph.
pub trait AnyEntity: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn entity_metadata(&self) -> &'static EntityMetadata;
    fn attach(&mut self, field: &str, link: &Link) -> bool;
}

impl<T: Entity> AnyEntity for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn entity_metadata(&self) -> &'static EntityMetadata {
        T::metadata()
    }

    fn attach(&mut self, field: &str, link: &Link) -> bool {
        self.set_relation(field, link)
    }
}

/// Build an entity from a flat row.
///
/// Scalars read their column; owning relations read their foreign-key column
/// (explicit or heuristic against the row's columns); inverse relations start
/// out unloaded.
pub fn hydrate<T: Entity>(row: &Row) -> Result<T, MapperError> {
    let meta = T::metadata();
    let columns: Vec<String> = row.keys().cloned().collect();
    let mut object = serde_json::Map::new();

    for field in meta.fields {
        let value = match field.role {
            FieldRole::Scalar => match row.get(field.column_name()) {
                Some(value) => value.clone(),
                None => continue,
            },
            FieldRole::Relation(_) if field.is_owning() => {
                let column = match field.column {
                    Some(column) => column.to_string(),
                    None => match_column(field.name, &columns),
                };
                row.get(&column).cloned().unwrap_or(JsonValue::Null)
            }
            FieldRole::Relation(_) => JsonValue::Null,
        };
        object.insert(field.name.to_string(), value);
    }

    serde_json::from_value(JsonValue::Object(object)).map_err(|err| {
        MapperError::invalid(format!("cannot hydrate {} from row: {err}", meta.name))
    })
}

/// Type-erased [`hydrate`], stored in [`EntityMetadata::hydrate`].
pub fn hydrate_boxed<T: Entity>(row: &Row) -> Result<Box<dyn AnyEntity>, MapperError> {
    Ok(Box::new(hydrate::<T>(row)?))
}

/// Coerce a key value into an integer primary key.
pub fn key_as_i64(key: &Value) -> Result<i64, MapperError> {
    match key {
        Value::Int(n) => Ok(*n),
        Value::UInt(n) => i64::try_from(*n)
            .map_err(|_| MapperError::invalid(format!("key {n} out of range"))),
        Value::String(s) => s
            .parse()
            .map_err(|_| MapperError::invalid(format!("key {s:?} is not an integer"))),
        other => Err(MapperError::invalid(format!("unsupported key {other:?}"))),
    }
}

/// Coerce a key value into a text primary key.
pub fn key_as_string(key: &Value) -> Result<String, MapperError> {
    key.identity_key()
        .ok_or_else(|| MapperError::invalid("primary key cannot be null"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Post, User};
    use crate::mock::row;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn hydrates_scalars_and_foreign_keys() {
        let post: Post = hydrate(&row(&[
            ("id", json!(5)),
            ("title", json!("Hello")),
            ("author_id", json!(2)),
        ]))
        .unwrap();
        assert_eq!(post.id, Some(5));
        assert_eq!(post.title, "Hello");
        assert_eq!(post.author.key(), Some(&Value::Int(2)));
        assert!(!post.tags.is_loaded());
    }

    #[test]
    fn missing_required_column_is_reported() {
        let err = hydrate::<User>(&row(&[("id", json!(1))])).unwrap_err();
        assert!(matches!(err, MapperError::InvalidArgument(_)));
    }

    #[test]
    fn key_coercion() {
        assert_eq!(key_as_i64(&Value::UInt(3)).unwrap(), 3);
        assert_eq!(key_as_i64(&Value::from("12")).unwrap(), 12);
        assert!(key_as_i64(&Value::Null).is_err());
        assert_eq!(key_as_string(&Value::Int(4)).unwrap(), "4");
    }
}
