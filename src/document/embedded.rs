use super::FieldAccess;
use crate::core::Record;
use crate::mapper::Mapper;
use crate::schema::Schema;
use std::fmt;
use std::sync::Arc;

/// Typed view over an identity-less record stored inside a parent.
///
/// The view shares the parent's stored mapping, so writes through it are
/// visible in the parent without reassigning the field. Embedded instances
/// never enter an identity cache.
#[derive(Clone)]
pub struct EmbeddedDocument {
    schema: Arc<Schema>,
    record: Record,
    mapper: Mapper,
}

impl EmbeddedDocument {
    pub(crate) fn bind(schema: Arc<Schema>, record: Record, mapper: Mapper) -> Self {
        Self {
            schema,
            record,
            mapper,
        }
    }

    /// True when both views share one mapping.
    pub fn ptr_eq(a: &EmbeddedDocument, b: &EmbeddedDocument) -> bool {
        a.record.ptr_eq(&b.record)
    }
}

impl FieldAccess for EmbeddedDocument {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn mapper(&self) -> &Mapper {
        &self.mapper
    }
}

impl PartialEq for EmbeddedDocument {
    fn eq(&self, other: &Self) -> bool {
        self.schema.type_name() == other.schema.type_name() && self.record == other.record
    }
}

impl fmt::Debug for EmbeddedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedDocument")
            .field("type", &self.schema.type_name())
            .field("fields", &self.record)
            .finish()
    }
}
