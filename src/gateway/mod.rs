//! Persistence gateway: the seam between the mapping layer and a document store.
//!
//! The mapper never talks to a store directly. It hands wire-shaped records
//! (see [`crate::codec::wire`]) to a [`PersistenceGateway`] and decodes what
//! comes back. [`InMemoryGateway`] is the bundled implementation.

mod filter;
pub mod memory;

pub use filter::{Filter, SortOrder};
pub use memory::InMemoryGateway;

use crate::core::{DocumentId, Reference};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// A record in wire shape: a JSON object carrying `_type` and, once stored, `_id`.
pub type WireRecord = Map<String, JsonValue>;

/// Lazy sequence of records returned by [`PersistenceGateway::find`].
pub type RecordStream = Box<dyn Iterator<Item = GatewayResult<WireRecord>> + Send>;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Storage collection for a document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOptions {
    pub name: String,
    /// Keep at most this many records, dropping the oldest.
    pub capped_max: Option<usize>,
}

impl CollectionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capped_max: None,
        }
    }

    pub fn capped(mut self, max: usize) -> Self {
        self.capped_max = Some(max);
        self
    }
}

/// Secondary index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub keys: Vec<String>,
    pub unique: bool,
}

impl IndexOptions {
    pub fn on<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn name(&self) -> String {
        self.keys.join("_")
    }
}

/// Client for the document store.
///
/// All calls are synchronous and may block; the mapping layer never holds
/// one of its own locks across them.
pub trait PersistenceGateway: Send + Sync {
    /// Creates the collection if it does not exist yet.
    fn ensure_collection(&self, _options: &CollectionOptions) -> GatewayResult<()> {
        Ok(())
    }

    /// Creates the index if it does not exist yet.
    fn ensure_index(&self, _collection: &str, _index: &IndexOptions) -> GatewayResult<()> {
        Ok(())
    }

    /// Stores a new record and returns the identity assigned to it.
    fn insert(&self, collection: &str, record: WireRecord) -> GatewayResult<DocumentId>;

    /// Replaces the stored record with identity `id`.
    fn update(&self, collection: &str, id: &DocumentId, record: WireRecord) -> GatewayResult<()>;

    fn find(&self, collection: &str, filter: &Filter) -> GatewayResult<RecordStream>;

    fn find_one(&self, collection: &str, filter: &Filter) -> GatewayResult<WireRecord> {
        let limited = filter.clone().limit(1);
        match self.find(collection, &limited)?.next() {
            Some(record) => record,
            None => Err(GatewayError::NotFound(format!(
                "record matching {} in '{}'",
                filter, collection
            ))),
        }
    }

    fn remove(&self, collection: &str, id: &DocumentId) -> GatewayResult<()>;

    /// Fetches the record a reference points at.
    fn dereference(&self, collection: &str, reference: &Reference) -> GatewayResult<WireRecord>;
}
