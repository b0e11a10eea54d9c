//! Relation properties on entity structs.
//!
//! Loaded entities live in a [`Graph`](crate::Graph) arena; relation
//! properties hold [`NodeId`] handles into it instead of owning pointers, so a
//! graph may contain cycles while every entity is stored once.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Value;

/// Handle to an entity stored in a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What the loader attached to one relation property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Not loaded: beyond the depth bound, or a failed non-nullable relation.
    Unset,
    /// Loaded and absent.
    Null,
    One(NodeId),
    Many(Vec<NodeId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceState {
    Unset,
    Null,
    Node(NodeId),
}

/// A to-one relation: the related entity's key plus, once loaded, its node.
///
/// Serializes as the key (or `null`) so owning sides persist as a foreign-key
/// column; deserializes from the column value.
pub struct Reference<T> {
    key: Option<Value>,
    state: ReferenceState,
    _target: PhantomData<fn() -> T>,
}

impl<T> Reference<T> {
    pub fn unset() -> Self {
        Self {
            key: None,
            state: ReferenceState::Unset,
            _target: PhantomData,
        }
    }

    /// Point at the entity with primary key `key`.
    pub fn to(key: impl Into<Value>) -> Self {
        let key = key.into();
        Self {
            key: (!key.is_null()).then_some(key),
            state: ReferenceState::Unset,
            _target: PhantomData,
        }
    }

    pub fn null() -> Self {
        Self {
            key: None,
            state: ReferenceState::Null,
            _target: PhantomData,
        }
    }

    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn node(&self) -> Option<NodeId> {
        match self.state {
            ReferenceState::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.state, ReferenceState::Unset)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.state, ReferenceState::Null)
    }

    pub fn set_link(&mut self, link: &Link) {
        match link {
            Link::Unset => {}
            Link::Null => {
                self.key = None;
                self.state = ReferenceState::Null;
            }
            Link::One(id) => self.state = ReferenceState::Node(*id),
            Link::Many(ids) => {
                if let Some(id) = ids.first() {
                    self.state = ReferenceState::Node(*id);
                }
            }
        }
    }

    /// Set the key without touching the loaded state.
    pub(crate) fn set_key(&mut self, key: Option<Value>) {
        self.key = key.filter(|k| !k.is_null());
    }
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            state: self.state,
            _target: PhantomData,
        }
    }
}

impl<T> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.state == other.state
    }
}

impl<T> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("key", &self.key)
            .field("state", &self.state)
            .finish()
    }
}

impl<T> Serialize for Reference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.key {
            Some(key) => key.to_json().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de, T> Deserialize<'de> for Reference<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        let mut reference = Self::unset();
        reference.set_key(raw.as_ref().map(Value::from));
        Ok(reference)
    }
}

/// A to-many relation: node handles once loaded.
///
/// Collections are never persisted through the owning entity's columns, so
/// serialization emits `null` and deserialization ignores the input.
pub struct Collection<T> {
    nodes: Option<Vec<NodeId>>,
    _target: PhantomData<fn() -> T>,
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self {
            nodes: None,
            _target: PhantomData,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.nodes.is_some()
    }

    /// Loaded handles; empty when not loaded.
    pub fn nodes(&self) -> &[NodeId] {
        self.nodes.as_deref().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }

    pub fn set_link(&mut self, link: &Link) {
        match link {
            Link::Unset => {}
            Link::Null => self.nodes = Some(Vec::new()),
            Link::One(id) => self.nodes = Some(vec![*id]),
            Link::Many(ids) => self.nodes = Some(ids.clone()),
        }
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> PartialEq for Collection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl<T> Serialize for Collection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_none()
    }
}

impl<'de, T> Deserialize<'de> for Collection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<serde::de::IgnoredAny>::deserialize(deserializer)?;
        Ok(Self::new())
    }
}
