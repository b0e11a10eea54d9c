//! The shared handle every builder, loader and repository runs against.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use tracing::debug;

use crate::extract::MetadataExtractor;
use crate::identifier::IdentifierResolver;
use crate::macros::MacroRegistry;
use crate::query::CompiledQuery;
use crate::{
    Connection, Entity, ExecResult, MapperConfig, MapperError, QueryBuilder, RelationLoader,
    Repository, Row, SchemaCache,
};

/// A connection plus the caches and configuration layered over it.
///
/// Schema, identifier and heuristic caches live as long as the handle and are
/// dropped only by [`Database::clear_caches`].
pub struct Database {
    conn: Arc<dyn Connection>,
    config: MapperConfig,
    schema: SchemaCache,
    resolver: IdentifierResolver,
    extractor: MetadataExtractor,
    macros: MacroRegistry,
    pub(crate) tx_depth: AtomicU32,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("macros", &self.macros)
            .field("tx_depth", &self.tx_depth)
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn new(conn: impl Connection + 'static) -> Self {
        Self::with_config(conn, MapperConfig::default())
    }

    pub fn with_config(conn: impl Connection + 'static, config: MapperConfig) -> Self {
        Self::with_config_shared(Arc::new(conn), config)
    }

    pub fn from_shared(conn: Arc<dyn Connection>) -> Self {
        Self::with_config_shared(conn, MapperConfig::default())
    }

    pub fn with_config_shared(conn: Arc<dyn Connection>, config: MapperConfig) -> Self {
        Self {
            resolver: IdentifierResolver::new(config.table_map.clone()),
            conn,
            config,
            schema: SchemaCache::new(),
            extractor: MetadataExtractor::new(),
            macros: MacroRegistry::new(),
            tx_depth: AtomicU32::new(0),
        }
    }

    pub fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    /// A fresh builder selecting from `reference`.
    pub fn table(&self, reference: impl AsRef<str>) -> QueryBuilder {
        QueryBuilder::table(reference)
    }

    pub fn repository<T: Entity>(&self) -> Repository<'_, T> {
        Repository::new(self)
    }

    pub fn loader(&self) -> RelationLoader<'_> {
        RelationLoader::new(self)
    }

    /// Canonical table name for `reference` (map, exact, plural toggle).
    pub async fn resolve_table(&self, reference: &str) -> Result<String, MapperError> {
        self.resolver
            .resolve(self.conn.as_ref(), &self.schema, reference)
            .await
    }

    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>, MapperError> {
        self.schema.columns(self.conn.as_ref(), table).await
    }

    pub async fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Row>, MapperError> {
        debug!(sql = %query.sql, params = query.params.len(), "fetch");
        self.conn.fetch_all(&query.sql, &query.params).await
    }

    pub async fn execute(&self, query: &CompiledQuery) -> Result<ExecResult, MapperError> {
        debug!(sql = %query.sql, params = query.params.len(), "execute");
        self.conn.execute(&query.sql, &query.params).await
    }

    /// Drop schema, identifier and column-heuristic caches.
    pub fn clear_caches(&self) {
        self.schema.clear();
        self.resolver.clear();
        self.extractor.clear();
    }
}
