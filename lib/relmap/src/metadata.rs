//! Static per-entity mapping metadata.
//!
//! Each [`Entity`](crate::Entity) exposes one `&'static EntityMetadata`,
//! normally generated by `#[derive(Entity)]`. Relation targets are function
//! pointers so mutually referencing entities can name each other.

use std::fmt;

use crate::extract::snake_case;
use crate::identifier::toggle_plural;
use crate::{AnyEntity, MapperError, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Scalar,
    Relation(RelationKind),
}

/// Explicit join table of a many-to-many owning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTable {
    pub table: &'static str,
    /// Column referencing the owning entity; defaults to `<entity>_id`.
    pub join_column: Option<&'static str>,
    /// Column referencing the target entity; defaults to `<target>_id`.
    pub inverse_join_column: Option<&'static str>,
}

impl JoinTable {
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            join_column: None,
            inverse_join_column: None,
        }
    }

    pub const fn columns(mut self, join: &'static str, inverse: &'static str) -> Self {
        self.join_column = Some(join);
        self.inverse_join_column = Some(inverse);
        self
    }
}

pub type MetadataFn = fn() -> &'static EntityMetadata;
pub type HydrateFn = fn(&Row) -> Result<Box<dyn AnyEntity>, MapperError>;

#[derive(Clone, Copy)]
pub struct FieldMetadata {
    /// Property name; must match the serialized field name.
    pub name: &'static str,
    pub role: FieldRole,
    /// Explicit column. Scalars default to `name`; owning relations fall back
    /// to the foreign-key heuristic.
    pub column: Option<&'static str>,
    pub target: Option<MetadataFn>,
    /// Property on the target that owns the relation (inverse sides only).
    pub mapped_by: Option<&'static str>,
    pub join_table: Option<JoinTable>,
    pub nullable: bool,
}

impl FieldMetadata {
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::Scalar,
            column: None,
            target: None,
            mapped_by: None,
            join_table: None,
            nullable: true,
        }
    }

    const fn relation(name: &'static str, kind: RelationKind, target: MetadataFn) -> Self {
        Self {
            name,
            role: FieldRole::Relation(kind),
            column: None,
            target: Some(target),
            mapped_by: None,
            join_table: None,
            nullable: true,
        }
    }

    pub const fn many_to_one(name: &'static str, target: MetadataFn) -> Self {
        Self::relation(name, RelationKind::ManyToOne, target)
    }

    /// Owning one-to-one (holds the foreign key).
    pub const fn one_to_one(name: &'static str, target: MetadataFn) -> Self {
        Self::relation(name, RelationKind::OneToOne, target)
    }

    pub const fn one_to_many(name: &'static str, target: MetadataFn, mapped_by: &'static str) -> Self {
        Self::relation(name, RelationKind::OneToMany, target).mapped_by(mapped_by)
    }

    pub const fn many_to_many(name: &'static str, target: MetadataFn) -> Self {
        Self::relation(name, RelationKind::ManyToMany, target)
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub const fn mapped_by(mut self, property: &'static str) -> Self {
        self.mapped_by = Some(property);
        self
    }

    pub const fn join_table(mut self, join_table: JoinTable) -> Self {
        self.join_table = Some(join_table);
        self
    }

    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn kind(&self) -> Option<RelationKind> {
        match self.role {
            FieldRole::Relation(kind) => Some(kind),
            FieldRole::Scalar => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.kind().is_some()
    }

    /// Holds a foreign-key column on this entity's table.
    pub fn is_owning(&self) -> bool {
        match self.kind() {
            Some(RelationKind::ManyToOne) => true,
            Some(RelationKind::OneToOne) => self.mapped_by.is_none(),
            _ => false,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind(),
            Some(RelationKind::OneToMany | RelationKind::ManyToMany)
        )
    }

    pub fn target(&self) -> Result<&'static EntityMetadata, MapperError> {
        self.target
            .map(|target| target())
            .ok_or_else(|| MapperError::invalid(format!("relation {} has no target", self.name)))
    }

    /// Scalar column name.
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }
}

impl fmt::Debug for FieldMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMetadata")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("column", &self.column)
            .field("target", &self.target.map(|t| t().name))
            .field("mapped_by", &self.mapped_by)
            .field("join_table", &self.join_table)
            .field("nullable", &self.nullable)
            .finish()
    }
}

pub struct EntityMetadata {
    pub name: &'static str,
    pub table: &'static str,
    /// Property holding the primary key.
    pub primary_key: &'static str,
    pub fields: &'static [FieldMetadata],
    pub hydrate: HydrateFn,
}

impl EntityMetadata {
    pub fn field(&self, name: &str) -> Option<&'static FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &'static FieldMetadata> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    pub fn primary_key_column(&self) -> &'static str {
        self.field(self.primary_key)
            .map(FieldMetadata::column_name)
            .unwrap_or(self.primary_key)
    }

    /// Default join-table column referencing this entity: `<entity>_id`.
    pub fn default_join_column(&self) -> String {
        let base = snake_case(self.name);
        if base.is_empty() {
            format!("{}_id", toggle_plural(self.table))
        } else {
            format!("{base}_id")
        }
    }
}

impl fmt::Debug for EntityMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Join table and columns for a many-to-many relation, seen from `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub table: String,
    /// References `owner`.
    pub own_column: String,
    /// References the target.
    pub other_column: String,
}

/// Resolve the join table of a many-to-many relation. Inverse sides follow
/// `mapped_by` to the owning side and swap its columns.
pub fn join_spec(
    owner: &'static EntityMetadata,
    field: &FieldMetadata,
) -> Result<JoinSpec, MapperError> {
    let target = field.target()?;
    if let Some(join) = field.join_table {
        return Ok(JoinSpec {
            table: join.table.to_string(),
            own_column: join
                .join_column
                .map(str::to_string)
                .unwrap_or_else(|| owner.default_join_column()),
            other_column: join
                .inverse_join_column
                .map(str::to_string)
                .unwrap_or_else(|| target.default_join_column()),
        });
    }

    let mapped_by = field.mapped_by.ok_or_else(|| {
        MapperError::invalid(format!(
            "many-to-many {}.{} needs a join table or mapped_by",
            owner.name, field.name
        ))
    })?;
    let opposite = target.field(mapped_by).ok_or_else(|| {
        MapperError::invalid(format!("{}.{mapped_by} does not exist", target.name))
    })?;
    let join = opposite.join_table.ok_or_else(|| {
        MapperError::invalid(format!(
            "{}.{mapped_by} does not declare a join table",
            target.name
        ))
    })?;
    Ok(JoinSpec {
        table: join.table.to_string(),
        own_column: join
            .inverse_join_column
            .map(str::to_string)
            .unwrap_or_else(|| owner.default_join_column()),
        other_column: join
            .join_column
            .map(str::to_string)
            .unwrap_or_else(|| target.default_join_column()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Post, Tag, User};
    use crate::Entity;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_relation_sides() {
        let post = Post::metadata();
        assert!(post.field("author").unwrap().is_owning());
        assert!(!post.field("title").unwrap().is_relation());
        assert!(post.field("tags").unwrap().is_collection());
        let user = User::metadata();
        assert!(!user.field("posts").unwrap().is_owning());
        assert!(!user.field("profile").unwrap().is_owning());
    }

    #[test]
    fn join_spec_is_symmetric() {
        let owning = join_spec(Post::metadata(), Post::metadata().field("tags").unwrap()).unwrap();
        assert_eq!(
            owning,
            JoinSpec {
                table: "post_tags".into(),
                own_column: "post_id".into(),
                other_column: "tag_id".into(),
            }
        );

        let inverse = join_spec(Tag::metadata(), Tag::metadata().field("posts").unwrap()).unwrap();
        assert_eq!(
            inverse,
            JoinSpec {
                table: "post_tags".into(),
                own_column: "tag_id".into(),
                other_column: "post_id".into(),
            }
        );
    }

    #[test]
    fn primary_key_column_defaults_to_property() {
        assert_eq!(User::metadata().primary_key_column(), "id");
        assert_eq!(User::metadata().default_join_column(), "user_id");
    }
}
