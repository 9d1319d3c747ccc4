use super::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Discriminator field carried by every record.
pub const TYPE_FIELD: &str = "_type";

/// Identity field, present only after the first insert.
pub const ID_FIELD: &str = "_id";

pub type FieldMap = BTreeMap<String, Value>;

/// Opaque identity assigned by the gateway on first insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Names a persisted record without carrying its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub type_name: String,
    pub id: DocumentId,
}

impl Reference {
    pub fn new(type_name: impl Into<String>, id: DocumentId) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name, self.id)
    }
}

/// Shared handle to one record's field mapping.
///
/// Cloning a `Record` clones the handle, not the mapping: every clone reads
/// and writes the same fields. Use [`Record::deep_clone`] for an independent
/// copy.
#[derive(Clone, Default)]
pub struct Record {
    fields: Arc<RwLock<FieldMap>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: FieldMap) -> Self {
        Self {
            fields: Arc::new(RwLock::new(fields)),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, FieldMap> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, FieldMap> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn insert(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.write().insert(name.into(), value)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Shallow copy of the current fields. Embedded records stay shared.
    pub fn snapshot(&self) -> FieldMap {
        self.read().clone()
    }

    /// Fully independent copy, embedded records included.
    pub fn deep_clone(&self) -> Record {
        let fields = self
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.deep_clone()))
            .collect();
        Record::from_fields(fields)
    }

    /// Replaces the whole mapping in place; existing handles see the new fields.
    pub fn replace(&self, fields: FieldMap) {
        *self.write() = fields;
    }

    pub fn type_name(&self) -> Option<String> {
        match self.read().get(TYPE_FIELD) {
            Some(Value::Text(name)) => Some(name.clone()),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<DocumentId> {
        match self.read().get(ID_FIELD) {
            Some(Value::Id(id)) => Some(*id),
            _ => None,
        }
    }

    /// True when both handles point at the same mapping.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.read().iter()).finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.snapshot() == other.snapshot()
    }
}

impl From<FieldMap> for Record {
    fn from(fields: FieldMap) -> Self {
        Record::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_mapping() {
        let record = Record::new();
        let alias = record.clone();
        alias.insert("name", Value::from("Frank"));

        assert_eq!(record.get("name"), Some(Value::from("Frank")));
        assert!(record.ptr_eq(&alias));
    }

    #[test]
    fn deep_clone_detaches_embedded_records() {
        let inner = Record::new();
        inner.insert("text", Value::from("Item A"));
        let outer = Record::new();
        outer.insert("item", Value::Embedded(inner.clone()));

        let copy = outer.deep_clone();
        inner.insert("text", Value::from("changed"));

        match copy.get("item") {
            Some(Value::Embedded(embedded)) => {
                assert_eq!(embedded.get("text"), Some(Value::from("Item A")));
                assert!(!embedded.ptr_eq(&inner));
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn replace_is_visible_through_existing_handles() {
        let record = Record::new();
        record.insert("a", Value::Integer(1));
        let alias = record.clone();

        let mut fresh = FieldMap::new();
        fresh.insert("b".to_string(), Value::Integer(2));
        record.replace(fresh);

        assert!(!alias.contains("a"));
        assert_eq!(alias.get("b"), Some(Value::Integer(2)));
    }

    #[test]
    fn document_id_parses_from_display() {
        let id = DocumentId::new();
        let parsed: DocumentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
