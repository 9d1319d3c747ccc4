use super::Mapper;
use crate::cache::CacheRegistration;
use crate::codec::wire;
use crate::core::{DocumentId, FieldMap, ID_FIELD, OdmError, Record, Result, Value};
use crate::document::{Document, DocumentCell, FieldAccess};
use crate::schema::Schema;
use std::sync::Arc;
use tracing::{Level, event, info_span};

impl Mapper {
    /// Validates `document`, then inserts or updates it.
    ///
    /// A first insert assigns the identity locally and registers the
    /// instance before the record reaches the gateway, so anything that
    /// decodes the record while it is being stored (a change-stream watcher)
    /// binds to this instance.
    pub(crate) fn save(&self, document: &Document) -> Result<()> {
        let schema = document.schema();
        let collection = schema.collection_name()?;
        let span = info_span!(
            "memodoc.save",
            type_name = %schema.type_name(),
            collection = %collection
        );
        let _enter = span.enter();

        if let Err(err) = self.validate(schema, document.record()) {
            event!(Level::DEBUG, error = %err, "save rejected by validation");
            return Err(err);
        }

        match document.id() {
            Some(id) => {
                let record = wire::to_wire(&document.record().snapshot())?;
                self.gateway().update(collection, &id, record)?;
                event!(Level::DEBUG, id = %id, "document updated");
            }
            None => {
                let cache = self.cache(schema.type_name())?;
                let id = DocumentId::new();
                document.record().insert(ID_FIELD, Value::Id(id));
                if let CacheRegistration::Existing(_) = cache.register(&id, document) {
                    document.record().remove(ID_FIELD);
                    return Err(OdmError::InvalidRecord(format!(
                        "identity {} is already resident",
                        id
                    )));
                }

                let stored = wire::to_wire(&document.record().snapshot())
                    .and_then(|record| Ok(self.gateway().insert(collection, record)?));
                match stored {
                    Ok(assigned) if assigned == id => {}
                    Ok(assigned) => {
                        cache.forget(&id, document);
                        document.record().insert(ID_FIELD, Value::Id(assigned));
                        cache.register(&assigned, document);
                        event!(Level::WARN, id = %assigned, requested = %id, "gateway replaced the identity");
                    }
                    Err(err) => {
                        cache.forget(&id, document);
                        document.record().remove(ID_FIELD);
                        return Err(err);
                    }
                }
                event!(Level::DEBUG, id = %document.id().unwrap_or(id), "document inserted");
            }
        }
        Ok(())
    }

    /// Deletes the stored record, drops the identity and the cache entry.
    pub(crate) fn remove(&self, document: &Document) -> Result<()> {
        let Some(id) = document.id() else {
            return Ok(());
        };
        let schema = document.schema();
        self.gateway().remove(schema.collection_name()?, &id)?;
        document.record().remove(ID_FIELD);
        self.cache(schema.type_name())?.forget(&id, document);
        event!(Level::DEBUG, type_name = %schema.type_name(), id = %id, "document removed");
        Ok(())
    }

    /// Binds freshly fetched fields to the live instance for their identity.
    ///
    /// A resident instance has its mapping replaced in place and is returned.
    /// Otherwise a new instance is registered; if another caller registered
    /// one first, that winner takes the fetched fields and is returned.
    pub(crate) fn adopt(&self, schema: Arc<Schema>, fields: FieldMap) -> Result<Document> {
        let id = match fields.get(ID_FIELD) {
            Some(Value::Id(id)) => *id,
            _ => {
                return Err(OdmError::InvalidRecord(format!(
                    "fetched '{}' record has no identity",
                    schema.type_name()
                )));
            }
        };
        let cache = self.cache(schema.type_name())?;

        let record = Record::from_fields(fields);
        schema.apply_defaults(&record);

        if let Some(resident) = cache.lookup(&id) {
            resident.record().replace(record.snapshot());
            event!(Level::TRACE, type_name = %schema.type_name(), id = %id, "decode hit");
            return Ok(resident);
        }

        let candidate = Document::bind(schema, record, self.clone());
        match cache.register(&id, &candidate) {
            CacheRegistration::Inserted => {
                event!(Level::TRACE, type_name = %candidate.type_name(), id = %id, "decode miss");
                Ok(candidate)
            }
            CacheRegistration::Existing(winner) => {
                winner.record().replace(candidate.record().snapshot());
                event!(
                    Level::DEBUG,
                    type_name = %winner.type_name(),
                    id = %id,
                    "concurrent decode adopted resident instance"
                );
                Ok(winner)
            }
        }
    }

    /// Drop hook: removes the cache entry if it still belongs to `cell`.
    pub(crate) fn evict(&self, type_name: &str, id: &DocumentId, cell: *const DocumentCell) {
        if let Some(cache) = self.inner.caches.get(type_name)
            && cache.evict(id, cell)
        {
            event!(Level::TRACE, type_name, id = %id, "evicted");
        }
    }
}
