//! Named, reusable builder fragments.
//!
//! A macro is a plain function from a builder and positional arguments to a
//! builder. Registries are explicit values owned by the caller (usually the
//! [`Database`](crate::Database)); nothing is attached to the builder type at
//! runtime.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{MapperError, QueryBuilder, Value};

pub type QueryMacro =
    dyn Fn(QueryBuilder, &[Value]) -> Result<QueryBuilder, MapperError> + Send + Sync;

#[derive(Default)]
pub struct MacroRegistry {
    macros: RwLock<HashMap<String, Arc<QueryMacro>>>,
}

impl std::fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.macros.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("MacroRegistry").field("macros", &names).finish()
    }
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a macro under `name`.
    pub fn register<F>(&self, name: impl Into<String>, body: F)
    where
        F: Fn(QueryBuilder, &[Value]) -> Result<QueryBuilder, MapperError> + Send + Sync + 'static,
    {
        self.macros.write().insert(name.into(), Arc::new(body));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.macros.write().remove(name).is_some()
    }

    pub fn invoke(
        &self,
        name: &str,
        builder: QueryBuilder,
        args: &[Value],
    ) -> Result<QueryBuilder, MapperError> {
        let body = self
            .macros
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::invalid(format!("unknown query macro {name:?}")))?;
        body(builder, args)
    }
}

impl QueryBuilder {
    /// Apply a registered macro.
    pub fn apply(
        self,
        registry: &MacroRegistry,
        name: &str,
        args: &[Value],
    ) -> Result<Self, MapperError> {
        registry.invoke(name, self, args)
    }
}
