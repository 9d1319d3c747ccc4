//! Everything needed to declare types and work with documents.
//!
//! ```
//! use memodoc::prelude::*;
//! ```

pub use crate::core::{DocumentId, FieldMap, FromValue, OdmError, Reference, Result, Value};
pub use crate::document::{Document, EmbeddedDocument, FieldAccess, ListField};
pub use crate::events::{EventHandler, Subscriber, event_type, fire};
pub use crate::gateway::{
    CollectionOptions, Filter, IndexOptions, InMemoryGateway, PersistenceGateway, SortOrder,
};
pub use crate::mapper::Mapper;
pub use crate::schema::{
    Field, FieldInput, FieldKind, FieldValue, ScalarKind, SchemaRegistry, TypeDecl,
};
pub use crate::{GatewayConfig, fields, typed_document};
