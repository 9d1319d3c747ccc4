//! The mapping layer's entrypoint.
//!
//! A [`Mapper`] ties together a finished [`SchemaRegistry`], a
//! [`PersistenceGateway`], one [`IdentityCache`] per document type and the
//! [`Validator`]. It is built once at startup and passed by handle to
//! whatever needs it; every live document carries a clone.

mod cursor;
mod lifecycle;

pub use cursor::DocumentCursor;

use crate::cache::IdentityCache;
use crate::codec::ReferenceCodec;
use crate::core::{OdmError, Record, Result};
use crate::document::{Document, EmbeddedDocument, FieldAccess};
use crate::gateway::PersistenceGateway;
use crate::schema::{FieldInput, Schema, SchemaRegistry, TypeCategory};
use crate::validate::Validator;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{Level, event};

struct MapperInner {
    registry: SchemaRegistry,
    gateway: Arc<dyn PersistenceGateway>,
    caches: HashMap<String, Arc<IdentityCache>>,
    validator: Validator,
}

#[derive(Clone)]
pub struct Mapper {
    inner: Arc<MapperInner>,
}

impl Mapper {
    /// Verifies the registry and makes sure every document type's collection
    /// and indexes exist in the store.
    pub fn open(registry: SchemaRegistry, gateway: Arc<dyn PersistenceGateway>) -> Result<Self> {
        Self::with_validator(registry, gateway, Validator::default())
    }

    pub fn with_validator(
        registry: SchemaRegistry,
        gateway: Arc<dyn PersistenceGateway>,
        validator: Validator,
    ) -> Result<Self> {
        registry.verify()?;

        let mut caches = HashMap::new();
        for schema in registry.schemas(TypeCategory::Document) {
            if let Some(collection) = schema.collection() {
                gateway.ensure_collection(collection)?;
                for index in schema.indexes() {
                    gateway.ensure_index(&collection.name, index)?;
                }
            }
            caches.insert(
                schema.type_name().to_string(),
                Arc::new(IdentityCache::new(schema.type_name())),
            );
        }
        event!(Level::DEBUG, document_types = caches.len(), "mapper opened");

        Ok(Self {
            inner: Arc::new(MapperInner {
                registry,
                gateway,
                caches,
                validator,
            }),
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.inner.gateway
    }

    pub fn codec(&self) -> ReferenceCodec<'_> {
        ReferenceCodec::new(self)
    }

    pub fn cache(&self, type_name: &str) -> Result<&Arc<IdentityCache>> {
        self.inner.caches.get(type_name).ok_or_else(|| {
            if self.registry().contains(type_name) {
                OdmError::TypeMismatch(format!("'{}' is not a document type", type_name))
            } else {
                OdmError::UnknownType(type_name.to_string())
            }
        })
    }

    /// Runs the validator chain over `record` as an instance of `schema`.
    pub fn validate(&self, schema: &Schema, record: &Record) -> Result<()> {
        self.inner.validator.validate(self.registry(), schema, record)
    }

    /// New unsaved document. Fields are set through their descriptors, then
    /// defaults fill whatever was not supplied.
    pub fn create<I, K, V>(&self, type_name: &str, fields: I) -> Result<Document>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldInput>,
    {
        let schema = self.registry().document_schema(type_name)?;
        let document = Document::bind(schema, Record::new(), self.clone());
        for (name, value) in fields {
            document.set(name.as_ref(), value)?;
        }
        document.schema().apply_defaults(document.record());
        Ok(document)
    }

    /// New embedded instance, ready to assign to an embedded field.
    pub fn embedded<I, K, V>(&self, type_name: &str, fields: I) -> Result<EmbeddedDocument>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldInput>,
    {
        let schema = self.registry().embedded_schema(type_name)?;
        let embedded = EmbeddedDocument::bind(schema, Record::new(), self.clone());
        for (name, value) in fields {
            embedded.set(name.as_ref(), value)?;
        }
        embedded.schema().apply_defaults(embedded.record());
        Ok(embedded)
    }

    /// Resident instance for `id`, without touching the store.
    pub fn cached(&self, type_name: &str, id: &crate::core::DocumentId) -> Option<Document> {
        self.inner.caches.get(type_name)?.lookup(id)
    }

    /// Purges dead entries from every identity cache.
    pub fn sweep_caches(&self) -> usize {
        let purged: usize = self.inner.caches.values().map(|cache| cache.sweep()).sum();
        if purged > 0 {
            event!(Level::DEBUG, purged, "identity caches swept");
        }
        purged
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("types", &self.registry().type_names().collect::<Vec<_>>())
            .field("caches", &self.inner.caches.len())
            .finish()
    }
}
