//! Identity-mapped arena of loaded entities.
//!
//! Each `(entity, primary key)` pair is stored at most once per graph.
//! Relation properties on stored entities hold [`NodeId`]s into the same
//! graph, so cyclic object graphs need no shared ownership.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::metadata::EntityMetadata;
use crate::{AnyEntity, Collection, Entity, Link, MapperError, NodeId, Reference, Row, Value};

struct Node {
    meta: &'static EntityMetadata,
    key: Value,
    row: Row,
    entity: Box<dyn AnyEntity>,
    depth: u32,
    expanded_at: Option<u32>,
    links: HashMap<&'static str, Link>,
}

/// Outcome of registering a row or reaching an existing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    New,
    /// Already present, now at a shallower depth.
    Lowered,
    Existing,
}

impl Registration {
    pub(crate) fn needs_expansion(self) -> bool {
        !matches!(self, Registration::Existing)
    }
}

#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<(&'static str, String), NodeId>,
    roots: Vec<NodeId>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// The node already holding `key` for this entity type.
    pub fn lookup(&self, meta: &EntityMetadata, key: &Value) -> Option<NodeId> {
        let key = key.identity_key()?;
        self.index.get(&(meta.name, key)).copied()
    }

    pub fn get<T: Entity>(&self, id: NodeId) -> Option<&T> {
        self.node(id)?.entity.as_any().downcast_ref::<T>()
    }

    /// The entity a loaded reference points at.
    pub fn resolve<T: Entity>(&self, reference: &Reference<T>) -> Option<&T> {
        self.get(reference.node()?)
    }

    /// The entities a loaded collection holds, in load order.
    pub fn collect<T: Entity>(&self, collection: &Collection<T>) -> Vec<&T> {
        collection
            .nodes()
            .iter()
            .filter_map(|id| self.get(*id))
            .collect()
    }

    /// Every stored entity of type `T`.
    pub fn all<T: Entity>(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.nodes.iter().enumerate().filter_map(|(i, node)| {
            node.entity
                .as_any()
                .downcast_ref::<T>()
                .map(|entity| (NodeId(i), entity))
        })
    }

    pub fn depth(&self, id: NodeId) -> Option<u32> {
        self.node(id).map(|n| n.depth)
    }

    pub fn key(&self, id: NodeId) -> Option<&Value> {
        self.node(id).map(|n| &n.key)
    }

    pub fn row(&self, id: NodeId) -> Option<&Row> {
        self.node(id).map(|n| &n.row)
    }

    pub fn metadata(&self, id: NodeId) -> Option<&'static EntityMetadata> {
        self.node(id).map(|n| n.meta)
    }

    /// What the loader attached to relation `field` of node `id`.
    pub fn link(&self, id: NodeId, field: &str) -> Option<&Link> {
        self.node(id)?.links.get(field)
    }

    /// Store a row, or find the node that already holds its key.
    pub(crate) fn register(
        &mut self,
        meta: &'static EntityMetadata,
        row: Row,
        depth: u32,
    ) -> Result<(NodeId, Registration), MapperError> {
        let key = row
            .get(meta.primary_key_column())
            .map(Value::from)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                MapperError::invalid(format!(
                    "row for {} has no `{}` value",
                    meta.name,
                    meta.primary_key_column()
                ))
            })?;

        if let Some(id) = self.lookup(meta, &key) {
            return Ok((id, self.reach(id, depth)));
        }

        let identity = key
            .identity_key()
            .ok_or_else(|| MapperError::invalid("null primary key"))?;
        let entity = (meta.hydrate)(&row)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            meta,
            key,
            row,
            entity,
            depth,
            expanded_at: None,
            links: HashMap::new(),
        });
        self.index.insert((meta.name, identity), id);
        Ok((id, Registration::New))
    }

    /// Note that `id` is reachable at `depth`; depths only ever decrease.
    pub(crate) fn reach(&mut self, id: NodeId, depth: u32) -> Registration {
        match self.nodes.get_mut(id.0) {
            Some(node) if depth < node.depth => {
                node.depth = depth;
                Registration::Lowered
            }
            _ => Registration::Existing,
        }
    }

    pub(crate) fn add_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// Mark `id` as expanded at its current depth. `false` when it was
    /// already expanded at this depth or shallower.
    pub(crate) fn begin_expansion(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id.0) else {
            return false;
        };
        if node.expanded_at.is_some_and(|at| at <= node.depth) {
            return false;
        }
        node.expanded_at = Some(node.depth);
        true
    }

    pub(crate) fn attach(&mut self, id: NodeId, field: &'static str, link: Link) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.entity.attach(field, &link);
            node.links.insert(field, link);
        }
    }
}

/// Root entities of type `T` together with the graph they were loaded into.
pub struct Loaded<T> {
    graph: Graph,
    _root: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Loaded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loaded").field("graph", &self.graph).finish()
    }
}

impl<T: Entity> Loaded<T> {
    pub(crate) fn new(graph: Graph) -> Self {
        Self {
            graph,
            _root: PhantomData,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.roots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.roots().is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.iter().next()
    }

    /// Roots in query order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.graph
            .roots()
            .iter()
            .filter_map(|id| self.graph.get::<T>(*id))
    }

    pub fn resolve<U: Entity>(&self, reference: &Reference<U>) -> Option<&U> {
        self.graph.resolve(reference)
    }

    pub fn collect<U: Entity>(&self, collection: &Collection<U>) -> Vec<&U> {
        self.graph.collect(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Post, User};
    use crate::mock::row;
    use serde_json::json;

    fn user_row(id: i64) -> Row {
        row(&[
            ("id", json!(id)),
            ("name", json!("Ada")),
            ("email", json!(format!("u{id}@example.com"))),
        ])
    }

    #[test]
    fn registers_each_key_once() {
        let mut graph = Graph::new();
        let (a, first) = graph.register(User::metadata(), user_row(1), 2).unwrap();
        let (b, second) = graph.register(User::metadata(), user_row(1), 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(first, Registration::New);
        assert_eq!(second, Registration::Existing);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn string_and_integer_keys_share_identity() {
        let mut graph = Graph::new();
        let (a, _) = graph.register(User::metadata(), user_row(7), 0).unwrap();
        assert_eq!(graph.lookup(User::metadata(), &Value::from("7")), Some(a));
    }

    #[test]
    fn same_key_different_entity_is_distinct() {
        let mut graph = Graph::new();
        let (u, _) = graph.register(User::metadata(), user_row(1), 0).unwrap();
        let (p, _) = graph
            .register(
                Post::metadata(),
                row(&[("id", json!(1)), ("title", json!("x")), ("author_id", json!(1))]),
                0,
            )
            .unwrap();
        assert_ne!(u, p);
        assert!(graph.get::<User>(u).is_some());
        assert!(graph.get::<Post>(u).is_none());
    }

    #[test]
    fn depth_only_decreases() {
        let mut graph = Graph::new();
        let (id, _) = graph.register(User::metadata(), user_row(1), 2).unwrap();
        assert_eq!(graph.reach(id, 3), Registration::Existing);
        assert_eq!(graph.depth(id), Some(2));
        assert_eq!(graph.reach(id, 1), Registration::Lowered);
        assert_eq!(graph.depth(id), Some(1));
    }

    #[test]
    fn expansion_is_repeated_only_after_lowering() {
        let mut graph = Graph::new();
        let (id, _) = graph.register(User::metadata(), user_row(1), 1).unwrap();
        assert!(graph.begin_expansion(id));
        assert!(!graph.begin_expansion(id));
        graph.reach(id, 0);
        assert!(graph.begin_expansion(id));
    }

    #[test]
    fn rows_without_keys_are_rejected() {
        let mut graph = Graph::new();
        let err = graph
            .register(User::metadata(), row(&[("name", json!("x"))]), 0)
            .unwrap_err();
        assert!(matches!(err, MapperError::InvalidArgument(_)));
    }
}
