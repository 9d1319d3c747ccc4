// ============================================================================
// memodoc: typed document mapping
// ============================================================================

//! Typed mapping between in-process documents and records in a schemaless
//! document store.
//!
//! Declare each type once in a [`SchemaRegistry`], open a [`Mapper`] over a
//! [`PersistenceGateway`], and work with live [`Document`]s:
//!
//! ```
//! use memodoc::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> memodoc::Result<()> {
//! let registry = SchemaRegistry::new()
//!     .with_type(
//!         TypeDecl::document("User")
//!             .field(Field::text("name").required())
//!             .field(Field::text("last_name").required()),
//!     )?
//!     .with_type(
//!         TypeDecl::document("Container")
//!             .field(Field::text("name").required())
//!             .field(Field::reference_to("user", ["User"])),
//!     )?;
//! let mapper = Mapper::open(registry, Arc::new(InMemoryGateway::default()))?;
//!
//! let frank = mapper.create("User", fields! { "name" => "Frank", "last_name" => "Footer" })?;
//! frank.save()?;
//! let container = mapper.create("Container", fields! { "name" => "Asset A", "user" => &frank })?;
//! container.save()?;
//!
//! let found = mapper.find_one("Container", &Filter::new().eq("name", "Asset A"))?;
//! assert!(found.reference("user")?.is_some_and(|user| user == frank));
//! # Ok(())
//! # }
//! ```
//!
//! At most one live instance exists per stored identity: every load of a
//! record that is already live refreshes and returns that instance.

pub mod cache;
pub mod codec;
pub mod config;
pub mod core;
pub mod document;
pub mod events;
pub mod gateway;
mod macros;
pub mod mapper;
pub mod prelude;
pub mod schema;
pub mod validate;

// Re-export main types for convenience
pub use crate::core::{DocumentId, FieldMap, FromValue, OdmError, Record, Reference, Result, Value};
pub use config::GatewayConfig;
pub use document::{Document, EmbeddedDocument, FieldAccess, ListField};
pub use gateway::{
    CollectionOptions, Filter, GatewayError, IndexOptions, InMemoryGateway, PersistenceGateway,
    SortOrder, WireRecord,
};
pub use mapper::{DocumentCursor, Mapper};
pub use schema::{
    Field, FieldInput, FieldKind, FieldValue, ScalarKind, SchemaRegistry, TypeCategory, TypeDecl,
};
pub use validate::{ValidationRule, Validator};

// Used by `typed_document!`.
#[doc(hidden)]
pub use paste;
