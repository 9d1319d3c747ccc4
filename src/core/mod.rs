pub mod error;
pub mod types;
pub mod value;

pub use error::{OdmError, Result};
pub use types::{DocumentId, FieldMap, ID_FIELD, Record, Reference, TYPE_FIELD};
pub use value::{FromValue, Value, ValueKind};
