//! relmap - a MySQL data-access core.
//!
//! # Pieces
//!
//! - [`QueryBuilder`]: fluent SELECT builder with collision-safe named
//!   parameters, plus aggregates, pagination, streaming and write statements.
//! - [`IdentifierResolver`]: maps a table reference to a live table (explicit
//!   map, exact name, then singular/plural toggle).
//! - [`MetadataExtractor`]: turns an entity into a column payload, guessing
//!   foreign-key columns for relation properties.
//! - [`Repository`]: find/save/delete façade with natural-key upserts,
//!   unique-conflict fallback, foreign-key repair and cascade cleanup.
//! - [`RelationLoader`] and [`Graph`]: identity-mapped, depth-bounded loading
//!   of relation graphs, cycle safe.
//!
//! Everything executes through a [`Database`], which owns the [`Connection`]
//! and the caches layered over it.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

extern crate self as relmap;

mod config;
mod connection;
mod db;
pub mod entity;
mod error;
pub mod extract;
mod graph;
pub mod identifier;
mod loader;
mod macros;
pub mod metadata;
pub mod query;
mod relation;
mod repository;
mod schema;
mod transaction;
mod value;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod mock;

pub use config::{ConnectionConfig, MapperConfig};
pub use connection::{Connection, ExecResult};
pub use db::Database;
pub use entity::{AnyEntity, Entity};
pub use error::MapperError;
pub use extract::MetadataExtractor;
pub use graph::{Graph, Loaded};
pub use identifier::IdentifierResolver;
pub use loader::RelationLoader;
pub use macros::{MacroRegistry, QueryMacro};
pub use metadata::{EntityMetadata, FieldMetadata, FieldRole, JoinTable, RelationKind};
pub use query::{CompiledQuery, Order, Page, PageStream, QueryBuilder, RowCursor};
pub use relation::{Collection, Link, NodeId, Reference};
pub use repository::{Repository, SaveOutcome};
pub use schema::{ForeignKey, SchemaCache, UniqueIndex};
pub use value::{Params, Payload, Row, Value};

// Derive macro; generates the static metadata table and relation setters.
pub use relmap_derive::Entity;
