//! Field descriptors: the declared shape of one field of a document type.

use crate::core::{Value, ValueKind};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// Primitive kinds a scalar field may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Boolean,
    Integer,
    Float,
    Text,
    Timestamp,
    Id,
}

impl ScalarKind {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Boolean => ValueKind::Boolean,
            Self::Integer => ValueKind::Integer,
            Self::Float => ValueKind::Float,
            Self::Text => ValueKind::Text,
            Self::Timestamp => ValueKind::Timestamp,
            Self::Id => ValueKind::Id,
        }
    }

    fn of(kind: ValueKind) -> Option<Self> {
        match kind {
            ValueKind::Boolean => Some(Self::Boolean),
            ValueKind::Integer => Some(Self::Integer),
            ValueKind::Float => Some(Self::Float),
            ValueKind::Text => Some(Self::Text),
            ValueKind::Timestamp => Some(Self::Timestamp),
            ValueKind::Id => Some(Self::Id),
            _ => None,
        }
    }
}

/// What a field stores and how its values are encoded.
///
/// An empty accepted list means "anything of this family": any primitive for
/// `Scalar`, any registered document type for `Reference`, any registered
/// embedded type for `Embedded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(Vec<ScalarKind>),
    Reference(Vec<String>),
    Embedded(Vec<String>),
    ListOf(Box<FieldKind>),
}

impl FieldKind {
    pub fn scalar(kinds: impl IntoIterator<Item = ScalarKind>) -> Self {
        Self::Scalar(kinds.into_iter().collect())
    }

    pub fn reference<S: Into<String>>(targets: impl IntoIterator<Item = S>) -> Self {
        Self::Reference(targets.into_iter().map(Into::into).collect())
    }

    pub fn embedded<S: Into<String>>(types: impl IntoIterator<Item = S>) -> Self {
        Self::Embedded(types.into_iter().map(Into::into).collect())
    }

    pub fn list_of(element: FieldKind) -> Self {
        Self::ListOf(Box::new(element))
    }

    pub fn family(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "Scalar",
            Self::Reference(_) => "Reference",
            Self::Embedded(_) => "EmbeddedReference",
            Self::ListOf(_) => "ListOf",
        }
    }

    /// Whether a subtype may redeclare a field of kind `other` as `self`.
    pub fn is_compatible_with(&self, other: &FieldKind) -> bool {
        match (self, other) {
            (Self::Scalar(_), Self::Scalar(_)) => true,
            (Self::Reference(_), Self::Reference(_)) => true,
            (Self::Embedded(_), Self::Embedded(_)) => true,
            (Self::ListOf(a), Self::ListOf(b)) => a.is_compatible_with(b),
            _ => false,
        }
    }

    /// True when `kind` is an acceptable scalar for this field.
    pub(crate) fn accepts_scalar(kinds: &[ScalarKind], kind: ValueKind) -> bool {
        match ScalarKind::of(kind) {
            Some(scalar) => kinds.is_empty() || kinds.contains(&scalar),
            None => false,
        }
    }

    /// Shape check that needs no registry; target types are not resolved.
    pub fn admits_shape(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Scalar(kinds), v) => Self::accepts_scalar(kinds, v.kind()),
            (Self::Reference(_), Value::Reference(_)) => true,
            (Self::Embedded(_), Value::Embedded(_)) => true,
            (Self::ListOf(element), Value::List(items)) => {
                items.iter().all(|item| element.admits_shape(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kinds) if kinds.is_empty() => write!(f, "Scalar(any)"),
            Self::Scalar(kinds) => {
                let names: Vec<&str> = kinds.iter().map(|k| k.value_kind().name()).collect();
                write!(f, "Scalar({})", names.join("|"))
            }
            Self::Reference(targets) if targets.is_empty() => write!(f, "Reference(any)"),
            Self::Reference(targets) => write!(f, "Reference({})", targets.join("|")),
            Self::Embedded(types) if types.is_empty() => write!(f, "EmbeddedReference(any)"),
            Self::Embedded(types) => write!(f, "EmbeddedReference({})", types.join("|")),
            Self::ListOf(element) => write!(f, "ListOf({})", element),
        }
    }
}

pub type DefaultGenerator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Default applied at construction when the field was not supplied.
#[derive(Clone, Default)]
pub enum FieldDefault {
    #[default]
    None,
    Literal(Value),
    Generator(DefaultGenerator),
}

impl FieldDefault {
    /// A fresh default value; literals are deep-copied per instance.
    pub fn produce(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Literal(value) => Some(value.deep_clone()),
            Self::Generator(generate) => Some(generate()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Literal(value) => write!(f, "Literal({})", value),
            Self::Generator(_) => write!(f, "Generator"),
        }
    }
}

/// One declared field: name, kind, default and required flag.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    default: FieldDefault,
    required: bool,
    declared_by: Option<String>,
}

/// Builder alias so declarations read `Field::text("name").required()`.
pub type Field = FieldDescriptor;

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let default = match kind {
            FieldKind::ListOf(_) => FieldDefault::Generator(Arc::new(|| Value::List(Vec::new()))),
            _ => FieldDefault::None,
        };
        Self {
            name: name.into(),
            kind,
            default,
            required: false,
            declared_by: None,
        }
    }

    pub fn scalar(name: impl Into<String>, kinds: impl IntoIterator<Item = ScalarKind>) -> Self {
        Self::new(name, FieldKind::scalar(kinds))
    }

    /// Scalar field accepting any primitive kind.
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(Vec::new()))
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::scalar(name, [ScalarKind::Text])
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::scalar(name, [ScalarKind::Integer])
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::scalar(name, [ScalarKind::Float])
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::scalar(name, [ScalarKind::Boolean])
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::scalar(name, [ScalarKind::Timestamp])
    }

    /// Reference to any registered document type.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Reference(Vec::new()))
    }

    pub fn reference_to<S: Into<String>>(
        name: impl Into<String>,
        targets: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(name, FieldKind::reference(targets))
    }

    pub fn embedded<S: Into<String>>(
        name: impl Into<String>,
        types: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(name, FieldKind::embedded(types))
    }

    /// Ordered list whose elements follow `element`'s semantics. Defaults to an empty list.
    pub fn list_of(name: impl Into<String>, element: FieldKind) -> Self {
        Self::new(name, FieldKind::list_of(element))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Literal(value.into());
        self
    }

    pub fn default_with<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = FieldDefault::Generator(Arc::new(generate));
        self
    }

    /// Timestamp default evaluated at construction time.
    pub fn default_now(self) -> Self {
        self.default_with(|| Value::Timestamp(Utc::now()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn default(&self) -> &FieldDefault {
        &self.default
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Type whose declaration introduced this field, once registered.
    pub fn declared_by(&self) -> Option<&str> {
        self.declared_by.as_deref()
    }

    pub(crate) fn with_owner(mut self, owner: &str) -> Self {
        self.declared_by = Some(owner.to_string());
        self
    }
}
