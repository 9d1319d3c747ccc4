pub mod descriptor;
pub mod field;
pub mod registry;

pub use descriptor::{FieldInput, FieldValue};
pub use field::{DefaultGenerator, Field, FieldDefault, FieldDescriptor, FieldKind, ScalarKind};
pub use registry::{Schema, SchemaRegistry, TypeCategory, TypeDecl};
