//! Live instances bound to record mappings.
//!
//! A [`Document`] is a cheap handle; clones share one instance. The mapper's
//! identity cache keeps only a weak binding, so the instance lives exactly as
//! long as some caller holds a handle, and removes its own cache entry when
//! the last one is dropped.

mod access;
mod embedded;
mod list;

pub use access::FieldAccess;
pub use embedded::EmbeddedDocument;
pub use list::{ListField, ListIter};

use crate::core::{DocumentId, OdmError, Record, Reference, Result};
use crate::mapper::Mapper;
use crate::schema::Schema;
use std::fmt;
use std::sync::{Arc, Weak};

pub(crate) struct DocumentCell {
    schema: Arc<Schema>,
    record: Record,
    mapper: Mapper,
}

impl Drop for DocumentCell {
    fn drop(&mut self) {
        if let Some(id) = self.record.id() {
            self.mapper
                .evict(self.schema.type_name(), &id, self as *const DocumentCell);
        }
    }
}

#[derive(Clone)]
pub struct Document {
    cell: Arc<DocumentCell>,
}

impl Document {
    pub(crate) fn bind(schema: Arc<Schema>, record: Record, mapper: Mapper) -> Self {
        Self {
            cell: Arc::new(DocumentCell {
                schema,
                record,
                mapper,
            }),
        }
    }

    pub(crate) fn from_cell(cell: Arc<DocumentCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn downgrade(&self) -> Weak<DocumentCell> {
        Arc::downgrade(&self.cell)
    }

    pub(crate) fn cell_ptr(&self) -> *const DocumentCell {
        Arc::as_ptr(&self.cell)
    }

    /// Identity assigned by the gateway; `None` until first saved.
    pub fn id(&self) -> Option<DocumentId> {
        self.cell.record.id()
    }

    pub fn is_saved(&self) -> bool {
        self.id().is_some()
    }

    /// Validates, then inserts (first save) or updates the stored record.
    pub fn save(&self) -> Result<()> {
        self.cell.mapper.save(self)
    }

    /// Deletes the stored record and drops the identity. No-op when unsaved.
    pub fn remove(&self) -> Result<()> {
        self.cell.mapper.remove(self)
    }

    /// Reloads the stored record into this instance in place.
    pub fn refresh(&self) -> Result<()> {
        let id = self.id().ok_or_else(|| {
            OdmError::NotFound(format!("unsaved '{}' has no stored record", self.type_name()))
        })?;
        self.cell.mapper.get(self.type_name(), &id).map(|_| ())
    }

    /// Reference token for this document, saving it first if needed.
    pub fn to_reference(&self) -> Result<Reference> {
        let id = match self.id() {
            Some(id) => id,
            None => {
                self.save()?;
                self.id().ok_or_else(|| {
                    OdmError::InvalidRecord(format!(
                        "'{}' has no identity after save",
                        self.type_name()
                    ))
                })?
            }
        };
        Ok(Reference::new(self.type_name(), id))
    }

    /// True when both handles are the same live instance.
    pub fn ptr_eq(a: &Document, b: &Document) -> bool {
        Arc::ptr_eq(&a.cell, &b.cell)
    }
}

impl FieldAccess for Document {
    fn schema(&self) -> &Arc<Schema> {
        &self.cell.schema
    }

    fn record(&self) -> &Record {
        &self.cell.record
    }

    fn mapper(&self) -> &Mapper {
        &self.cell.mapper
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Document::ptr_eq(self, other)
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("type", &self.type_name())
            .field("fields", &self.cell.record)
            .finish()
    }
}
