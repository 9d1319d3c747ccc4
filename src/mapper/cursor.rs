use super::Mapper;
use crate::core::{DocumentId, Reference, Result, TYPE_FIELD};
use crate::document::Document;
use crate::gateway::{Filter, RecordStream, WireRecord};
use crate::schema::TypeCategory;
use serde_json::Value as JsonValue;
use tracing::{Level, event};

/// Lazy sequence of documents; each record is decoded as it is pulled.
///
/// Records of registered types outside the requested subtree (siblings
/// sharing a collection) are skipped.
pub struct DocumentCursor {
    mapper: Mapper,
    targets: Vec<String>,
    stream: RecordStream,
}

impl DocumentCursor {
    fn is_foreign(&self, record: &WireRecord) -> bool {
        match record.get(TYPE_FIELD) {
            Some(JsonValue::String(name)) => {
                let registry = self.mapper.registry();
                registry.contains(name)
                    && !registry.admits(&self.targets, TypeCategory::Document, name)
            }
            _ => false,
        }
    }
}

impl Iterator for DocumentCursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.stream.next()? {
                Ok(record) => record,
                Err(err) => return Some(Err(err.into())),
            };
            if self.is_foreign(&record) {
                continue;
            }
            return Some(self.mapper.codec().decode_record(&self.targets, record));
        }
    }
}

impl Mapper {
    /// Documents of `type_name` (subtypes included) matching `filter`.
    ///
    /// Subtypes sharing the collection are returned as themselves. Records
    /// carrying an unregistered discriminator fail with `UnknownType`.
    pub fn find(&self, type_name: &str, filter: &Filter) -> Result<DocumentCursor> {
        let schema = self.registry().document_schema(type_name)?;
        let collection = schema.collection_name()?;
        let filter = self.narrow(type_name, filter);
        event!(Level::TRACE, type_name, collection, filter = %filter, "find");
        let stream = self.gateway().find(collection, &filter)?;
        Ok(DocumentCursor {
            mapper: self.clone(),
            targets: vec![type_name.to_string()],
            stream,
        })
    }

    pub fn find_one(&self, type_name: &str, filter: &Filter) -> Result<Document> {
        let schema = self.registry().document_schema(type_name)?;
        let filter = self.narrow(type_name, filter);
        let record = self
            .gateway()
            .find_one(schema.collection_name()?, &filter)?;
        self.codec().decode_record(&[type_name.to_string()], record)
    }

    /// A type without subtypes only ever matches its own discriminator, so
    /// the store can filter on it directly.
    fn narrow(&self, type_name: &str, filter: &Filter) -> Filter {
        if self.registry().children(type_name).is_empty() {
            filter.clone().eq(TYPE_FIELD, type_name)
        } else {
            filter.clone()
        }
    }

    /// Fetches by identity. Returns the resident instance, refreshed, when
    /// there is one.
    pub fn get(&self, type_name: &str, id: &DocumentId) -> Result<Document> {
        let reference = Reference::new(type_name, *id);
        self.codec().decode(&reference, &[type_name.to_string()])
    }

    /// Decode entrypoint for records arriving from outside a lookup, such as
    /// a change stream. `declared` limits the accepted types to a subtree.
    pub fn decode_record(&self, declared: Option<&str>, record: WireRecord) -> Result<Document> {
        let targets: Vec<String> = declared.map(str::to_string).into_iter().collect();
        self.codec().decode_record(&targets, record)
    }
}
