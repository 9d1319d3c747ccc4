use super::{Document, EmbeddedDocument, ListField};
use crate::core::{FieldMap, FromValue, ID_FIELD, OdmError, Record, Result, TYPE_FIELD, Value};
use crate::mapper::Mapper;
use crate::schema::{FieldDescriptor, FieldInput, FieldValue, Schema};
use std::sync::Arc;

/// Field-level access shared by documents and embedded instances.
///
/// Every read and write goes through the field's descriptor in the type's
/// schema; names the schema does not declare fail with
/// [`OdmError::UnknownField`].
pub trait FieldAccess {
    fn schema(&self) -> &Arc<Schema>;

    /// The backing mapping. Writing to it directly bypasses encoding.
    fn record(&self) -> &Record;

    fn mapper(&self) -> &Mapper;

    fn type_name(&self) -> &str {
        self.schema().type_name()
    }

    fn descriptor(&self, name: &str) -> Result<&Arc<FieldDescriptor>> {
        self.schema()
            .field(name)
            .ok_or_else(|| OdmError::UnknownField {
                type_name: self.type_name().to_string(),
                field: name.to_string(),
            })
    }

    /// Decoded value: references resolve to live documents, embedded
    /// values to views over the stored mapping, lists to a [`ListField`].
    fn get(&self, name: &str) -> Result<Option<FieldValue>> {
        self.descriptor(name)?.get(self.record(), self.mapper())
    }

    /// Stored value without decoding.
    fn value(&self, name: &str) -> Result<Option<Value>> {
        self.descriptor(name)?;
        Ok(self.record().get(name))
    }

    fn value_as<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        match self.value(name)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some),
        }
    }

    /// The document a reference field points at, fetched on demand.
    fn reference(&self, name: &str) -> Result<Option<Document>> {
        match self.get(name)? {
            None | Some(FieldValue::Value(Value::Null)) => Ok(None),
            Some(FieldValue::Document(document)) => Ok(Some(document)),
            Some(_) => Err(OdmError::TypeMismatch(format!(
                "field '{}' of '{}' is not a reference",
                name,
                self.type_name()
            ))),
        }
    }

    fn embedded(&self, name: &str) -> Result<Option<EmbeddedDocument>> {
        match self.get(name)? {
            None | Some(FieldValue::Value(Value::Null)) => Ok(None),
            Some(FieldValue::Embedded(embedded)) => Ok(Some(embedded)),
            Some(_) => Err(OdmError::TypeMismatch(format!(
                "field '{}' of '{}' is not embedded",
                name,
                self.type_name()
            ))),
        }
    }

    fn list(&self, name: &str) -> Result<ListField> {
        match self.get(name)? {
            Some(FieldValue::List(list)) => Ok(list),
            _ => Err(OdmError::TypeMismatch(format!(
                "field '{}' of '{}' is not a list",
                name,
                self.type_name()
            ))),
        }
    }

    /// Encodes and stores a value. Nothing is persisted until `save`, except
    /// an unsaved document assigned to a reference field, which is saved
    /// first so its identity can be stored.
    fn set(&self, name: &str, value: impl Into<FieldInput>) -> Result<()> {
        self.descriptor(name)?
            .set(self.record(), value.into(), self.mapper())
    }

    /// Removes a stored value, returning it.
    fn unset(&self, name: &str) -> Result<Option<Value>> {
        self.descriptor(name)?;
        if name == ID_FIELD || name == TYPE_FIELD {
            return Err(OdmError::ReadOnlyField(name.to_string()));
        }
        Ok(self.record().remove(name))
    }

    /// Shallow copy of the stored fields.
    fn data(&self) -> FieldMap {
        self.record().snapshot()
    }

    fn validate(&self) -> Result<()> {
        self.mapper().validate(self.schema(), self.record())
    }
}
