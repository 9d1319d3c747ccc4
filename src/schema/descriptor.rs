//! Field encode/decode: how a descriptor turns caller input into a stored
//! value and a stored value back into something a caller can use.

use super::field::{FieldDescriptor, FieldKind};
use super::registry::{SchemaRegistry, TypeCategory};
use crate::core::{
    DocumentId, FieldMap, ID_FIELD, OdmError, Record, Reference, Result, TYPE_FIELD, Value,
};
use crate::document::{Document, EmbeddedDocument, FieldAccess, ListField};
use crate::mapper::Mapper;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Anything a caller may assign to a field.
#[derive(Debug, Clone)]
pub enum FieldInput {
    Value(Value),
    /// A live document, stored as a reference.
    Document(Document),
    /// An embedded instance; the field shares its mapping.
    Embedded(EmbeddedDocument),
    /// Raw mapping for an embedded field, bound to its declared type.
    Fields(FieldMap),
    List(Vec<FieldInput>),
}

impl FieldInput {
    pub fn kind_name(&self) -> String {
        match self {
            Self::Value(value) => value.type_name().to_string(),
            Self::Document(document) => format!("DOCUMENT({})", document.type_name()),
            Self::Embedded(embedded) => format!("EMBEDDED({})", embedded.type_name()),
            Self::Fields(_) => "MAPPING".to_string(),
            Self::List(_) => "LIST".to_string(),
        }
    }
}

macro_rules! input_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldInput {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

input_from_value!(bool, i64, i32, f64, &str, String, DateTime<Utc>, DocumentId, Reference);

impl From<Value> for FieldInput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Document> for FieldInput {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

impl From<&Document> for FieldInput {
    fn from(document: &Document) -> Self {
        Self::Document(document.clone())
    }
}

impl From<EmbeddedDocument> for FieldInput {
    fn from(embedded: EmbeddedDocument) -> Self {
        Self::Embedded(embedded)
    }
}

impl From<&EmbeddedDocument> for FieldInput {
    fn from(embedded: &EmbeddedDocument) -> Self {
        Self::Embedded(embedded.clone())
    }
}

impl From<FieldMap> for FieldInput {
    fn from(fields: FieldMap) -> Self {
        Self::Fields(fields)
    }
}

impl<T: Into<FieldInput>> From<Vec<T>> for FieldInput {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// A decoded field value.
pub enum FieldValue {
    Value(Value),
    Document(Document),
    Embedded(EmbeddedDocument),
    List(ListField),
}

impl FieldValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Document(document) => Some(document),
            _ => None,
        }
    }

    pub fn into_embedded(self) -> Option<EmbeddedDocument> {
        match self {
            Self::Embedded(embedded) => Some(embedded),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<ListField> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "Value({})", value),
            Self::Document(document) => write!(f, "{:?}", document),
            Self::Embedded(embedded) => write!(f, "{:?}", embedded),
            Self::List(list) => write!(f, "List({}, len={})", list.name(), list.len()),
        }
    }
}

fn mismatch(field: &str, kind: &FieldKind, got: &str) -> OdmError {
    OdmError::TypeMismatch(format!("field '{}' expects {}, got {}", field, kind, got))
}

impl FieldKind {
    /// Converts caller input to the stored form. References to unsaved
    /// documents trigger a cascade save here, before anything is stored.
    pub(crate) fn encode(&self, field: &str, input: FieldInput, mapper: &Mapper) -> Result<Value> {
        match self {
            Self::Scalar(kinds) => match input {
                FieldInput::Value(value) if Self::accepts_scalar(kinds, value.kind()) => Ok(value),
                other => Err(mismatch(field, self, &other.kind_name())),
            },
            Self::Reference(targets) => mapper.codec().encode(input, targets).map(Value::Reference),
            Self::Embedded(types) => match input {
                FieldInput::Embedded(embedded) => {
                    let registry = mapper.registry();
                    if !registry.admits(types, TypeCategory::Embedded, embedded.type_name()) {
                        return Err(mismatch(field, self, &format!("'{}'", embedded.type_name())));
                    }
                    Ok(Value::Embedded(embedded.record().clone()))
                }
                FieldInput::Fields(fields) => {
                    bind_embedded(field, self, types, Record::from_fields(fields), mapper)
                }
                FieldInput::Value(Value::Embedded(record)) => {
                    bind_embedded(field, self, types, record, mapper)
                }
                other => Err(mismatch(field, self, &other.kind_name())),
            },
            Self::ListOf(element) => {
                let items = match input {
                    FieldInput::List(items) => items,
                    FieldInput::Value(Value::List(values)) => {
                        values.into_iter().map(FieldInput::Value).collect()
                    }
                    other => return Err(mismatch(field, self, &other.kind_name())),
                };
                items
                    .into_iter()
                    .map(|item| element.encode(field, item, mapper))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
        }
    }

    /// Converts a stored value for the caller. References are resolved
    /// through the identity cache; nested lists are returned raw.
    pub(crate) fn decode(&self, field: &str, value: Value, mapper: &Mapper) -> Result<FieldValue> {
        match (self, value) {
            (_, Value::Null) => Ok(FieldValue::Value(Value::Null)),
            (Self::Scalar(_), value) => Ok(FieldValue::Value(value)),
            (Self::Reference(targets), Value::Reference(reference)) => mapper
                .codec()
                .decode(&reference, targets)
                .map(FieldValue::Document),
            (Self::Embedded(types), Value::Embedded(record)) => {
                let schema = embedded_schema(mapper.registry(), types, &record)?;
                Ok(FieldValue::Embedded(EmbeddedDocument::bind(
                    schema,
                    record,
                    mapper.clone(),
                )))
            }
            (Self::ListOf(_), value @ Value::List(_)) => Ok(FieldValue::Value(value)),
            (_, other) => Err(OdmError::TypeMismatch(format!(
                "field '{}' is {} but holds {}",
                field,
                self,
                other.type_name()
            ))),
        }
    }

    /// Checks a stored value against this kind, resolving type names.
    pub fn validate_value(&self, field: &str, value: &Value, registry: &SchemaRegistry) -> Result<()> {
        let ok = match (self, value) {
            (Self::Scalar(kinds), value) => Self::accepts_scalar(kinds, value.kind()),
            (Self::Reference(targets), Value::Reference(reference)) => {
                registry.admits(targets, TypeCategory::Document, &reference.type_name)
            }
            (Self::Embedded(types), Value::Embedded(record)) => {
                embedded_schema(registry, types, record).is_ok()
            }
            (Self::ListOf(element), Value::List(items)) => {
                for item in items {
                    element.validate_value(field, item, registry)?;
                }
                true
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(mismatch(field, self, &describe(value)))
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Reference(reference) => format!("reference to '{}'", reference.type_name),
        Value::Embedded(record) => match record.type_name() {
            Some(name) => format!("embedded '{}'", name),
            None => "untyped mapping".to_string(),
        },
        other => other.type_name().to_string(),
    }
}

/// The embedded type a stored mapping belongs to: its `_type` if present,
/// otherwise the single declared type.
pub(crate) fn embedded_schema(
    registry: &SchemaRegistry,
    types: &[String],
    record: &Record,
) -> Result<Arc<super::Schema>> {
    match record.type_name() {
        Some(name) => registry.resolve_discriminator(types, TypeCategory::Embedded, &name),
        None if types.len() == 1 => registry.embedded_schema(&types[0]),
        None => Err(OdmError::TypeMismatch(format!(
            "mapping has no {} and the field accepts {}",
            TYPE_FIELD,
            if types.is_empty() {
                "any embedded type".to_string()
            } else {
                types.join("|")
            }
        ))),
    }
}

fn bind_embedded(
    field: &str,
    kind: &FieldKind,
    types: &[String],
    record: Record,
    mapper: &Mapper,
) -> Result<Value> {
    let registry = mapper.registry();
    if let Some(name) = record.type_name()
        && registry.contains(&name)
        && !registry.admits(types, TypeCategory::Embedded, &name)
    {
        return Err(mismatch(field, kind, &format!("'{}'", name)));
    }
    let schema = embedded_schema(registry, types, &record)?;
    schema.apply_defaults(&record);
    Ok(Value::Embedded(record))
}

impl FieldDescriptor {
    /// Reads this field from `owner`. List fields always yield a live
    /// [`ListField`] handle; other fields yield `None` when absent.
    pub fn get(self: &Arc<Self>, owner: &Record, mapper: &Mapper) -> Result<Option<FieldValue>> {
        if let FieldKind::ListOf(_) = self.kind() {
            return Ok(Some(FieldValue::List(ListField::new(
                owner.clone(),
                self.clone(),
                mapper.clone(),
            ))));
        }
        match owner.get(self.name()) {
            Some(value) => self.kind().decode(self.name(), value, mapper).map(Some),
            None => Ok(None),
        }
    }

    /// Encodes `input` and stores it on `owner`. Encoding (and any cascade
    /// save it triggers) happens before the owner's mapping is locked.
    pub fn set(&self, owner: &Record, input: FieldInput, mapper: &Mapper) -> Result<()> {
        if self.name() == ID_FIELD || self.name() == TYPE_FIELD {
            return Err(OdmError::ReadOnlyField(self.name().to_string()));
        }
        let value = self.encode(input, mapper)?;
        owner.insert(self.name(), value);
        Ok(())
    }

    pub fn encode(&self, input: FieldInput, mapper: &Mapper) -> Result<Value> {
        self.kind().encode(self.name(), input, mapper)
    }

    pub fn decode(&self, value: Value, mapper: &Mapper) -> Result<FieldValue> {
        self.kind().decode(self.name(), value, mapper)
    }

    pub fn validate(&self, value: &Value, registry: &SchemaRegistry) -> Result<()> {
        self.kind().validate_value(self.name(), value, registry)
    }
}
