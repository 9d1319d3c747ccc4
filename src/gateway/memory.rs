use super::{
    CollectionOptions, Filter, GatewayError, GatewayResult, IndexOptions, PersistenceGateway,
    RecordStream, WireRecord,
};
use crate::codec::wire::{id_from_json, id_to_json};
use crate::config::GatewayConfig;
use crate::core::{DocumentId, ID_FIELD, Reference, Result};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{Level, event};

struct Collection {
    options: CollectionOptions,
    /// Insertion order; capped collections drop from the front.
    records: BTreeMap<u64, WireRecord>,
    positions: HashMap<DocumentId, u64>,
    indexes: Vec<IndexOptions>,
    next_seq: u64,
    changes: broadcast::Sender<WireRecord>,
}

impl Collection {
    fn new(options: CollectionOptions, tail_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(tail_buffer);
        Self {
            options,
            records: BTreeMap::new(),
            positions: HashMap::new(),
            indexes: Vec::new(),
            next_seq: 0,
            changes,
        }
    }

    fn get(&self, id: &DocumentId) -> Option<&WireRecord> {
        self.positions.get(id).and_then(|seq| self.records.get(seq))
    }

    /// Rejects `record` if it collides with another record on a unique index.
    fn check_unique(&self, record: &WireRecord, own: Option<u64>) -> GatewayResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = index_key(index, record);
            let clash = self
                .records
                .iter()
                .filter(|(seq, _)| Some(**seq) != own)
                .any(|(_, other)| index_key(index, other) == key);
            if clash {
                return Err(GatewayError::DuplicateKey(format!(
                    "{}.{} = {}",
                    self.options.name,
                    index.name(),
                    JsonValue::Array(key)
                )));
            }
        }
        Ok(())
    }

    fn trim(&mut self) {
        let Some(max) = self.options.capped_max else {
            return;
        };
        while self.records.len() > max {
            if let Some((_, dropped)) = self.records.pop_first()
                && let Some(Ok(id)) = dropped.get(ID_FIELD).map(|raw| id_from_json(raw))
            {
                self.positions.remove(&id);
            }
        }
    }
}

fn index_key(index: &IndexOptions, record: &WireRecord) -> Vec<JsonValue> {
    index
        .keys
        .iter()
        .map(|key| record.get(key).cloned().unwrap_or(JsonValue::Null))
        .collect()
}

/// Process-local document store.
///
/// Each collection sits behind its own lock, so traffic on one collection
/// never waits on another. Inserts are published on the collection's change
/// stream (see [`InMemoryGateway::tail`]).
pub struct InMemoryGateway {
    config: GatewayConfig,
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
}

impl InMemoryGateway {
    /// Gateway over a validated `config`.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collections: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn existing(&self, name: &str) -> Option<Arc<RwLock<Collection>>> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn collection(&self, name: &str) -> Arc<RwLock<Collection>> {
        if let Some(found) = self.existing(name) {
            return found;
        }
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(Collection::new(
                    CollectionOptions::named(name),
                    self.config.tail_buffer,
                )))
            })
            .clone()
    }

    /// Subscribes to records inserted into `collection` from now on.
    pub fn tail(&self, collection: &str) -> broadcast::Receiver<WireRecord> {
        let handle = self.collection(collection);
        read(&handle).changes.subscribe()
    }

    /// Number of stored records in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.existing(collection)
            .map(|c| read(&c).records.len())
            .unwrap_or(0)
    }

    /// Names of the indexes declared on `collection`.
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.existing(collection)
            .map(|c| read(&c).indexes.iter().map(IndexOptions::name).collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self {
            config: GatewayConfig::default(),
            collections: RwLock::new(HashMap::new()),
        }
    }
}

fn read(collection: &RwLock<Collection>) -> RwLockReadGuard<'_, Collection> {
    collection.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(collection: &RwLock<Collection>) -> RwLockWriteGuard<'_, Collection> {
    collection.write().unwrap_or_else(PoisonError::into_inner)
}

impl PersistenceGateway for InMemoryGateway {
    fn ensure_collection(&self, options: &CollectionOptions) -> GatewayResult<()> {
        let handle = self.collection(&options.name);
        let mut collection = write(&handle);
        if collection.options != *options {
            collection.options = options.clone();
            collection.trim();
            event!(Level::DEBUG, collection = %options.name, capped = ?options.capped_max, "collection configured");
        }
        Ok(())
    }

    fn ensure_index(&self, collection: &str, index: &IndexOptions) -> GatewayResult<()> {
        let handle = self.collection(collection);
        let mut collection = write(&handle);
        if collection.indexes.contains(index) {
            return Ok(());
        }
        collection.indexes.push(index.clone());
        // Existing records must already satisfy a new unique index.
        let violation = if index.unique {
            collection
                .records
                .iter()
                .map(|(seq, record)| collection.check_unique(record, Some(*seq)))
                .find(|result| result.is_err())
        } else {
            None
        };
        if let Some(err) = violation {
            collection.indexes.pop();
            return err;
        }
        Ok(())
    }

    fn insert(&self, collection: &str, mut record: WireRecord) -> GatewayResult<DocumentId> {
        let id = match record.get(ID_FIELD) {
            Some(raw) => {
                id_from_json(raw).map_err(|err| GatewayError::InvalidRecord(err.to_string()))?
            }
            None => DocumentId::new(),
        };
        record.insert(ID_FIELD.to_string(), id_to_json(&id));

        let handle = self.collection(collection);
        let mut coll = write(&handle);
        if coll.positions.contains_key(&id) {
            return Err(GatewayError::DuplicateKey(format!("{}._id = {}", collection, id)));
        }
        coll.check_unique(&record, None)?;

        let seq = coll.next_seq;
        coll.next_seq += 1;
        coll.positions.insert(id, seq);
        coll.records.insert(seq, record.clone());
        coll.trim();
        // No subscribers is not an error.
        let _ = coll.changes.send(record);
        Ok(id)
    }

    fn update(&self, collection: &str, id: &DocumentId, mut record: WireRecord) -> GatewayResult<()> {
        record.insert(ID_FIELD.to_string(), id_to_json(id));
        let handle = self
            .existing(collection)
            .ok_or_else(|| GatewayError::NotFound(format!("{}._id = {}", collection, id)))?;
        let mut coll = write(&handle);
        let seq = *coll
            .positions
            .get(id)
            .ok_or_else(|| GatewayError::NotFound(format!("{}._id = {}", collection, id)))?;
        coll.check_unique(&record, Some(seq))?;
        coll.records.insert(seq, record);
        Ok(())
    }

    fn find(&self, collection: &str, filter: &Filter) -> GatewayResult<RecordStream> {
        let Some(handle) = self.existing(collection) else {
            return Ok(Box::new(std::iter::empty()));
        };
        let mut matched: Vec<WireRecord> = read(&handle)
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        // Stable: ties keep insertion order.
        matched.sort_by(|a, b| filter.compare(a, b));
        if let Some(limit) = filter.max_results() {
            matched.truncate(limit);
        }
        Ok(Box::new(matched.into_iter().map(Ok)))
    }

    fn remove(&self, collection: &str, id: &DocumentId) -> GatewayResult<()> {
        let not_found = || GatewayError::NotFound(format!("{}._id = {}", collection, id));
        let handle = self.existing(collection).ok_or_else(not_found)?;
        let mut coll = write(&handle);
        let seq = coll.positions.remove(id).ok_or_else(not_found)?;
        coll.records.remove(&seq);
        Ok(())
    }

    fn dereference(&self, collection: &str, reference: &Reference) -> GatewayResult<WireRecord> {
        self.existing(collection)
            .and_then(|handle| read(&handle).get(&reference.id).cloned())
            .ok_or_else(|| GatewayError::NotFound(format!("{} in '{}'", reference, collection)))
    }
}
