//! Hand-written entities and a schema-aware mock database for unit tests.
//!
//! Tables:
//! - `users(id, name, email)` with unique `email`
//! - `profiles(id, bio, user_id)`
//! - `posts(id, title, author_id)`
//! - `tags(id, label)` with unique `label`
//! - `post_tags(post_id, tag_id)`

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::entity::{hydrate_boxed, key_as_i64};
use crate::metadata::{EntityMetadata, FieldMetadata, JoinTable};
use crate::mock::{MockConnection, row};
use crate::{
    Collection, Database, Entity, ExecResult, Link, MapperConfig, MapperError, Params, Reference,
    Row, Value,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub posts: Collection<Post>,
    #[serde(default)]
    pub profile: Reference<Profile>,
}

impl Entity for User {
    fn metadata() -> &'static EntityMetadata {
        static META: EntityMetadata = EntityMetadata {
            name: "User",
            table: "users",
            primary_key: "id",
            fields: &[
                FieldMetadata::scalar("id"),
                FieldMetadata::scalar("name"),
                FieldMetadata::scalar("email"),
                FieldMetadata::one_to_many("posts", Post::metadata, "author"),
                FieldMetadata::one_to_one("profile", Profile::metadata).mapped_by("user"),
            ],
            hydrate: hydrate_boxed::<User>,
        };
        &META
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_primary_key(&mut self, key: &Value) -> Result<(), MapperError> {
        self.id = Some(key_as_i64(key)?);
        Ok(())
    }

    fn set_relation(&mut self, field: &str, link: &Link) -> bool {
        match field {
            "posts" => self.posts.set_link(link),
            "profile" => self.profile.set_link(link),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Option<i64>,
    pub bio: String,
    #[serde(default)]
    pub user: Reference<User>,
}

impl Entity for Profile {
    fn metadata() -> &'static EntityMetadata {
        static META: EntityMetadata = EntityMetadata {
            name: "Profile",
            table: "profiles",
            primary_key: "id",
            fields: &[
                FieldMetadata::scalar("id"),
                FieldMetadata::scalar("bio"),
                FieldMetadata::one_to_one("user", User::metadata).nullable(false),
            ],
            hydrate: hydrate_boxed::<Profile>,
        };
        &META
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_primary_key(&mut self, key: &Value) -> Result<(), MapperError> {
        self.id = Some(key_as_i64(key)?);
        Ok(())
    }

    fn set_relation(&mut self, field: &str, link: &Link) -> bool {
        match field {
            "user" => self.user.set_link(link),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub author: Reference<User>,
    #[serde(default)]
    pub tags: Collection<Tag>,
}

impl Entity for Post {
    fn metadata() -> &'static EntityMetadata {
        static META: EntityMetadata = EntityMetadata {
            name: "Post",
            table: "posts",
            primary_key: "id",
            fields: &[
                FieldMetadata::scalar("id"),
                FieldMetadata::scalar("title"),
                FieldMetadata::many_to_one("author", User::metadata),
                FieldMetadata::many_to_many("tags", Tag::metadata)
                    .join_table(JoinTable::new("post_tags")),
            ],
            hydrate: hydrate_boxed::<Post>,
        };
        &META
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_primary_key(&mut self, key: &Value) -> Result<(), MapperError> {
        self.id = Some(key_as_i64(key)?);
        Ok(())
    }

    fn set_relation(&mut self, field: &str, link: &Link) -> bool {
        match field {
            "author" => self.author.set_link(link),
            "tags" => self.tags.set_link(link),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: String,
    #[serde(default)]
    pub posts: Collection<Post>,
}

impl Entity for Tag {
    fn metadata() -> &'static EntityMetadata {
        static META: EntityMetadata = EntityMetadata {
            name: "Tag",
            table: "tags",
            primary_key: "id",
            fields: &[
                FieldMetadata::scalar("id"),
                FieldMetadata::scalar("label"),
                FieldMetadata::many_to_many("posts", Post::metadata).mapped_by("tags"),
            ],
            hydrate: hydrate_boxed::<Tag>,
        };
        &META
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_primary_key(&mut self, key: &Value) -> Result<(), MapperError> {
        self.id = Some(key_as_i64(key)?);
        Ok(())
    }

    fn set_relation(&mut self, field: &str, link: &Link) -> bool {
        match field {
            "posts" => self.posts.set_link(link),
            _ => return false,
        }
        true
    }
}

/// Maps onto `users` but carries a property with no column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stray {
    pub id: Option<i64>,
    pub name: String,
    pub nickname: String,
}

impl Entity for Stray {
    fn metadata() -> &'static EntityMetadata {
        static META: EntityMetadata = EntityMetadata {
            name: "Stray",
            table: "users",
            primary_key: "id",
            fields: &[
                FieldMetadata::scalar("id"),
                FieldMetadata::scalar("name"),
                FieldMetadata::scalar("nickname"),
            ],
            hydrate: hydrate_boxed::<Stray>,
        };
        &META
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn set_primary_key(&mut self, key: &Value) -> Result<(), MapperError> {
        self.id = Some(key_as_i64(key)?);
        Ok(())
    }

    fn set_relation(&mut self, _field: &str, _link: &Link) -> bool {
        false
    }
}

const TABLES: &[(&str, &[&str])] = &[
    ("users", &["id", "name", "email"]),
    ("profiles", &["id", "bio", "user_id"]),
    ("posts", &["id", "title", "author_id"]),
    ("tags", &["id", "label"]),
    ("post_tags", &["post_id", "tag_id"]),
];

const UNIQUE: &[(&str, &str, &str)] = &[
    ("users", "uniq_email", "email"),
    ("tags", "uniq_label", "label"),
];

const FOREIGN: &[(&str, &str, &str, &str)] = &[
    ("posts", "fk_posts_author", "author_id", "users"),
    ("profiles", "fk_profiles_user", "user_id", "users"),
    ("post_tags", "fk_post_tags_post", "post_id", "posts"),
    ("post_tags", "fk_post_tags_tag", "tag_id", "tags"),
];

/// Answer `information_schema` lookups for the fixture tables.
pub fn introspect(sql: &str, params: &Params) -> Option<Vec<Row>> {
    if !sql.contains("information_schema") {
        return None;
    }
    let table = params
        .get("table")
        .and_then(Value::identity_key)
        .unwrap_or_default();

    if sql.contains("information_schema.tables") {
        let exists = TABLES.iter().any(|(name, _)| *name == table);
        return Some(vec![row(&[("aggregate", json!(i64::from(exists)))])]);
    }
    if sql.contains("information_schema.columns") {
        let columns = TABLES
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, columns)| *columns)
            .unwrap_or_default();
        return Some(
            columns
                .iter()
                .map(|c| row(&[("column_name", json!(c))]))
                .collect(),
        );
    }
    if sql.contains("information_schema.statistics") {
        return Some(
            UNIQUE
                .iter()
                .filter(|(name, _, _)| *name == table)
                .map(|(_, index, column)| {
                    row(&[("index_name", json!(index)), ("column_name", json!(column))])
                })
                .collect(),
        );
    }
    if sql.contains("information_schema.key_column_usage") {
        return Some(
            FOREIGN
                .iter()
                .filter(|(name, _, _, _)| *name == table)
                .map(|(_, constraint, column, referenced)| {
                    row(&[
                        ("constraint_name", json!(constraint)),
                        ("column_name", json!(column)),
                        ("referenced_table", json!(referenced)),
                        ("referenced_column", json!("id")),
                    ])
                })
                .collect(),
        );
    }
    Some(vec![])
}

type Fetch = dyn Fn(&str, &Params) -> Result<Vec<Row>, MapperError> + Send + Sync;

fn connection(fetch: Box<Fetch>) -> MockConnection {
    MockConnection::new(move |sql, params| match introspect(sql, params) {
        Some(rows) => Ok(rows),
        None => fetch(sql, params),
    })
}

/// Database over the fixture schema; `fetch` answers every data query.
pub fn database(
    fetch: impl Fn(&str, &Params) -> Result<Vec<Row>, MapperError> + Send + Sync + 'static,
) -> (Database, Arc<MockConnection>) {
    let conn = Arc::new(connection(Box::new(fetch)));
    (Database::from_shared(conn.clone()), conn)
}

/// Like [`database`], with scripted writes and explicit configuration.
pub fn database_with(
    fetch: impl Fn(&str, &Params) -> Result<Vec<Row>, MapperError> + Send + Sync + 'static,
    execute: impl Fn(&str, &Params) -> Result<ExecResult, MapperError> + Send + Sync + 'static,
    config: MapperConfig,
) -> (Database, Arc<MockConnection>) {
    let conn = Arc::new(connection(Box::new(fetch)).on_execute(execute));
    (
        Database::with_config_shared(conn.clone(), config),
        conn,
    )
}
