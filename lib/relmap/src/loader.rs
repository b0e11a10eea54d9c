//! Depth-bounded, cycle-safe relation loading.
//!
//! Loading is a breadth-first worklist over graph nodes. A node's relations
//! are expanded only while its depth is below the configured maximum. Every
//! node is registered in the graph before it is queued, so cycles terminate;
//! a node reached again at a shallower depth is re-queued so that its
//! relations get the deeper budget.
//!
//! A failing relation never aborts the load: it is logged and its property
//! is set to an empty collection, to null when nullable, or left unset.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::graph::Registration;
use crate::identifier::quote;
use crate::metadata::{EntityMetadata, FieldMetadata, RelationKind, join_spec};
use crate::{Database, Graph, Link, MapperError, NodeId, Order, QueryBuilder, Row, Value};

type Reached = Vec<(NodeId, Registration)>;

/// Link used when a single relation is absent.
fn absent(field: &FieldMetadata) -> Link {
    if field.nullable { Link::Null } else { Link::Unset }
}

/// Link used when loading a relation failed.
fn fallback(field: &FieldMetadata) -> Link {
    if field.is_collection() {
        Link::Many(Vec::new())
    } else {
        absent(field)
    }
}

pub struct RelationLoader<'db> {
    db: &'db Database,
    max_depth: u32,
}

impl<'db> RelationLoader<'db> {
    pub fn new(db: &'db Database) -> Self {
        Self {
            db,
            max_depth: db.config().max_depth,
        }
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Register `rows` as roots of a new graph and load their relations.
    pub async fn load(
        &self,
        meta: &'static EntityMetadata,
        rows: Vec<Row>,
    ) -> Result<Graph, MapperError> {
        let mut graph = Graph::new();
        let mut seeds = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, _) = graph.register(meta, row, 0)?;
            graph.add_root(id);
            seeds.push(id);
        }
        self.expand(&mut graph, seeds).await?;
        Ok(graph)
    }

    /// Expand relations breadth-first from `seeds`.
    pub async fn expand(
        &self,
        graph: &mut Graph,
        seeds: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), MapperError> {
        let mut queue: VecDeque<NodeId> = seeds.into_iter().collect();

        while let Some(id) = queue.pop_front() {
            let (Some(depth), Some(meta)) = (graph.depth(id), graph.metadata(id)) else {
                continue;
            };
            if depth >= self.max_depth || !graph.begin_expansion(id) {
                continue;
            }
            debug!(entity = meta.name, node = id.index(), depth, "expanding relations");

            for field in meta.relations() {
                let link = match self.load_relation(graph, id, meta, field, depth + 1).await {
                    Ok((link, reached)) => {
                        queue.extend(
                            reached
                                .into_iter()
                                .filter(|(_, registration)| registration.needs_expansion())
                                .map(|(node, _)| node),
                        );
                        link
                    }
                    Err(err) => {
                        warn!(
                            entity = meta.name,
                            relation = field.name,
                            error = %err,
                            "relation load failed"
                        );
                        fallback(field)
                    }
                };
                graph.attach(id, field.name, link);
            }
        }
        Ok(())
    }

    async fn load_relation(
        &self,
        graph: &mut Graph,
        id: NodeId,
        meta: &'static EntityMetadata,
        field: &'static FieldMetadata,
        child_depth: u32,
    ) -> Result<(Link, Reached), MapperError> {
        let kind = field
            .kind()
            .ok_or_else(|| MapperError::invalid(format!("{} is not a relation", field.name)))?;
        match kind {
            RelationKind::ManyToMany => self.load_many_to_many(graph, id, meta, field, child_depth).await,
            _ if field.is_owning() => self.load_owning(graph, id, meta, field, child_depth).await,
            _ => self.load_inverse(graph, id, meta, field, child_depth).await,
        }
    }

    /// Many-to-one and owning one-to-one: follow this row's foreign key.
    async fn load_owning(
        &self,
        graph: &mut Graph,
        id: NodeId,
        meta: &'static EntityMetadata,
        field: &'static FieldMetadata,
        child_depth: u32,
    ) -> Result<(Link, Reached), MapperError> {
        let column = self
            .db
            .extractor()
            .foreign_key_column(self.db, meta.table, field)
            .await?;
        let key = graph.key(id).cloned().unwrap_or(Value::Null);

        let foreign = match graph.row(id).and_then(|row| row.get(&column)) {
            Some(value) => Value::from(value),
            None => QueryBuilder::table(meta.table)
                .r#where(quote(meta.primary_key_column())?, "=", key)
                .value(self.db, &quote(&column)?)
                .await?
                .unwrap_or(Value::Null),
        };
        if foreign.is_null() {
            return Ok((absent(field), Vec::new()));
        }

        let target = field.target()?;
        if let Some(existing) = graph.lookup(target, &foreign) {
            let registration = graph.reach(existing, child_depth);
            return Ok((Link::One(existing), vec![(existing, registration)]));
        }

        let row = QueryBuilder::table(target.table)
            .r#where(quote(target.primary_key_column())?, "=", foreign)
            .fetch_one(self.db)
            .await?;
        match row {
            Some(row) => {
                let (node, registration) = graph.register(target, row, child_depth)?;
                Ok((Link::One(node), vec![(node, registration)]))
            }
            None => Ok((absent(field), Vec::new())),
        }
    }

    /// One-to-many and inverse one-to-one: rows of the target whose
    /// foreign key points at this node.
    async fn load_inverse(
        &self,
        graph: &mut Graph,
        id: NodeId,
        meta: &'static EntityMetadata,
        field: &'static FieldMetadata,
        child_depth: u32,
    ) -> Result<(Link, Reached), MapperError> {
        let (target, column) = self
            .db
            .extractor()
            .inverse_foreign_key(self.db, meta, field)
            .await?;
        let key = graph.key(id).cloned().unwrap_or(Value::Null);

        let mut query = QueryBuilder::table(target.table)
            .r#where(quote(&column)?, "=", key)
            .order_by(quote(target.primary_key_column())?, Order::Asc);
        if !field.is_collection() {
            query = query.limit(1);
        }
        let rows = query.fetch_all(self.db).await?;
        self.register_all(graph, target, rows, field, child_depth)
    }

    async fn load_many_to_many(
        &self,
        graph: &mut Graph,
        id: NodeId,
        meta: &'static EntityMetadata,
        field: &'static FieldMetadata,
        child_depth: u32,
    ) -> Result<(Link, Reached), MapperError> {
        let target = field.target()?;
        let spec = join_spec(meta, field)?;
        let key = graph.key(id).cloned().unwrap_or(Value::Null);

        let rows = QueryBuilder::new()
            .select(["t.*"])
            .from(format!("{} AS t", target.table))
            .join(
                format!("{} AS j", spec.table),
                format!("j.{}", quote(&spec.other_column)?),
                "=",
                format!("t.{}", quote(target.primary_key_column())?),
            )
            .r#where(format!("j.{}", quote(&spec.own_column)?), "=", key)
            .order_by(format!("t.{}", quote(target.primary_key_column())?), Order::Asc)
            .fetch_all(self.db)
            .await?;
        self.register_all(graph, target, rows, field, child_depth)
    }

    fn register_all(
        &self,
        graph: &mut Graph,
        target: &'static EntityMetadata,
        rows: Vec<Row>,
        field: &FieldMetadata,
        child_depth: u32,
    ) -> Result<(Link, Reached), MapperError> {
        let mut reached = Vec::with_capacity(rows.len());
        for row in rows {
            reached.push(graph.register(target, row, child_depth)?);
        }
        let link = if field.is_collection() {
            Link::Many(reached.iter().map(|(node, _)| *node).collect())
        } else {
            match reached.first() {
                Some((node, _)) => Link::One(*node),
                None => absent(field),
            }
        };
        Ok((link, reached))
    }
}
