use crate::core::{OdmError, Record, Result, Value};
use crate::mapper::Mapper;
use crate::schema::{FieldDescriptor, FieldInput, FieldKind, FieldValue};
use std::sync::Arc;

/// Live handle on a list-valued field.
///
/// Reads decode one element at a time; writes encode one element at a time
/// and store into the owner's mapping in place. Order is preserved and
/// duplicates are kept.
#[derive(Clone)]
pub struct ListField {
    owner: Record,
    field: Arc<FieldDescriptor>,
    mapper: Mapper,
}

impl ListField {
    pub(crate) fn new(owner: Record, field: Arc<FieldDescriptor>, mapper: Mapper) -> Self {
        Self {
            owner,
            field,
            mapper,
        }
    }

    pub fn name(&self) -> &str {
        self.field.name()
    }

    fn element(&self) -> &FieldKind {
        match self.field.kind() {
            FieldKind::ListOf(element) => element,
            other => other,
        }
    }

    /// Stored elements, undecoded. An absent field reads as empty.
    pub fn raw(&self) -> Result<Vec<Value>> {
        match self.owner.get(self.name()) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(items),
            Some(other) => Err(self.not_a_list(&other)),
        }
    }

    pub fn len(&self) -> usize {
        match self.owner.read().get(self.name()) {
            Some(Value::List(items)) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Option<FieldValue>> {
        let item = match self.owner.read().get(self.name()) {
            Some(Value::List(items)) => items.get(index).cloned(),
            _ => None,
        };
        match item {
            Some(value) => self.element().decode(self.name(), value, &self.mapper).map(Some),
            None => Ok(None),
        }
    }

    /// Replaces the element at `index`.
    pub fn set(&self, index: usize, value: impl Into<FieldInput>) -> Result<()> {
        let encoded = self.encode(value.into())?;
        self.mutate(|items| {
            let len = items.len();
            match items.get_mut(index) {
                Some(slot) => {
                    *slot = encoded;
                    Ok(())
                }
                None => Err(OdmError::IndexOutOfBounds {
                    field: self.name().to_string(),
                    index,
                    len,
                }),
            }
        })
    }

    pub fn append(&self, value: impl Into<FieldInput>) -> Result<()> {
        let encoded = self.encode(value.into())?;
        self.mutate(|items| {
            items.push(encoded);
            Ok(())
        })
    }

    /// Appends every item. Nothing is stored unless all of them encode.
    pub fn extend<I, T>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldInput>,
    {
        let encoded = values
            .into_iter()
            .map(|value| self.encode(value.into()))
            .collect::<Result<Vec<_>>>()?;
        self.mutate(|items| {
            items.extend(encoded);
            Ok(())
        })
    }

    /// Extends with a list input, appends anything else.
    pub fn extend_or_append(&self, value: impl Into<FieldInput>) -> Result<()> {
        match value.into() {
            FieldInput::List(items) => self.extend(items),
            FieldInput::Value(Value::List(items)) => self.extend(items),
            single => self.append(single),
        }
    }

    pub fn remove(&self, index: usize) -> Result<Value> {
        self.mutate(|items| {
            if index < items.len() {
                Ok(items.remove(index))
            } else {
                Err(OdmError::IndexOutOfBounds {
                    field: self.name().to_string(),
                    index,
                    len: items.len(),
                })
            }
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.mutate(|items| {
            items.clear();
            Ok(())
        })
    }

    /// Decodes lazily over the elements present when called.
    pub fn iter(&self) -> Result<ListIter> {
        Ok(ListIter {
            items: self.raw()?.into_iter(),
            list: self.clone(),
        })
    }

    pub fn to_vec(&self) -> Result<Vec<FieldValue>> {
        self.iter()?.collect()
    }

    fn encode(&self, input: FieldInput) -> Result<Value> {
        self.element().encode(self.name(), input, &self.mapper)
    }

    /// Runs `apply` on the stored list under the owner's write lock.
    /// Callers encode first; nothing in `apply` may reach the gateway.
    fn mutate<R>(&self, apply: impl FnOnce(&mut Vec<Value>) -> Result<R>) -> Result<R> {
        let mut fields = self.owner.write();
        let slot = fields
            .entry(self.name().to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        if slot.is_null() {
            *slot = Value::List(Vec::new());
        }
        match slot {
            Value::List(items) => apply(items),
            other => Err(self.not_a_list(other)),
        }
    }

    fn not_a_list(&self, value: &Value) -> OdmError {
        OdmError::TypeMismatch(format!(
            "list field '{}' holds {}",
            self.name(),
            value.type_name()
        ))
    }
}

impl std::fmt::Debug for ListField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListField")
            .field("name", &self.name())
            .field("items", &self.raw().unwrap_or_default())
            .finish()
    }
}

pub struct ListIter {
    items: std::vec::IntoIter<Value>,
    list: ListField,
}

impl Iterator for ListIter {
    type Item = Result<FieldValue>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.items.next()?;
        Some(
            self.list
                .element()
                .decode(self.list.name(), value, &self.list.mapper),
        )
    }
}
