use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Error, Debug)]
pub enum OdmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Document '{type_name}' missing required fields: {}", fields.join(", "))]
    Validation {
        type_name: String,
        fields: Vec<String>,
    },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid reference kind: {0}")]
    InvalidReferenceKind(String),

    #[error("Unknown document type '{0}'")]
    UnknownType(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Field '{field}' is not declared on '{type_name}'")]
    UnknownField { type_name: String, field: String },

    #[error("Field '{0}' is read-only")]
    ReadOnlyField(String),

    #[error("Index {index} out of bounds for list field '{field}' of length {len}")]
    IndexOutOfBounds {
        field: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl OdmError {
    /// Names of the missing fields when this is a validation failure.
    pub fn missing_fields(&self) -> &[String] {
        match self {
            Self::Validation { fields, .. } => fields,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, OdmError>;

impl<T> From<std::sync::PoisonError<T>> for OdmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<GatewayError> for OdmError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(what) => Self::NotFound(what),
            GatewayError::InvalidRecord(msg) => Self::InvalidRecord(msg),
            other => Self::Gateway(other.to_string()),
        }
    }
}
