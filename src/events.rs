//! Events: documents in a capped collection, consumed from its change stream.
//!
//! Firing an event is exactly saving an `Event` (or subtype) document. A
//! [`Subscriber`] decodes each inserted record through the same entrypoint
//! ordinary loads use, so a handler receives the resident instance when the
//! event is already live in this process.

use crate::core::{OdmError, Result, TYPE_FIELD};
use crate::document::{Document, FieldAccess};
use crate::gateway::{CollectionOptions, WireRecord};
use crate::mapper::Mapper;
use crate::schema::{Field, FieldInput, TypeCategory, TypeDecl};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

pub const EVENT_TYPE: &str = "Event";

/// Records kept in the event collection before the oldest are dropped.
pub const EVENT_CAPACITY: usize = 100;

/// Declaration of the base `Event` type. Register it before any subtype.
///
/// * `ref`: the document the event is about
/// * `user`: who fired it
/// * `created`: when it was fired
pub fn event_type() -> TypeDecl {
    TypeDecl::document(EVENT_TYPE)
        .collection(CollectionOptions::named(EVENT_TYPE).capped(EVENT_CAPACITY))
        .field(Field::reference("ref"))
        .field(Field::reference("user"))
        .field(Field::timestamp("created").default_now())
}

/// Creates and saves an event of `type_name`, which must be `Event` or a subtype.
pub fn fire<I, K, V>(mapper: &Mapper, type_name: &str, fields: I) -> Result<Document>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<FieldInput>,
{
    let schema = mapper.registry().document_schema(type_name)?;
    if !schema.is_a(EVENT_TYPE) {
        return Err(OdmError::TypeMismatch(format!(
            "'{}' is not an {}",
            type_name, EVENT_TYPE
        )));
    }
    let fired = mapper.create(type_name, fields)?;
    fired.save()?;
    event!(Level::DEBUG, event_type = %type_name, "event fired");
    Ok(fired)
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Document) -> Result<()>;
}

/// Dispatches decoded events to handlers registered by type.
///
/// A handler registered for a type also receives that type's subtypes, so a
/// handler on `Event` sees everything.
pub struct Subscriber {
    mapper: Mapper,
    receiver: broadcast::Receiver<WireRecord>,
    declared: String,
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    limit: Option<usize>,
}

impl Subscriber {
    /// `receiver` is the change stream of the event collection, e.g.
    /// [`crate::InMemoryGateway::tail`].
    pub fn new(mapper: Mapper, receiver: broadcast::Receiver<WireRecord>) -> Self {
        Self {
            mapper,
            receiver,
            declared: EVENT_TYPE.to_string(),
            handlers: HashMap::new(),
            limit: None,
        }
    }

    /// Only accept events of `type_name` and its subtypes.
    pub fn for_type(mut self, type_name: &str) -> Self {
        self.declared = type_name.to_string();
        self
    }

    /// Stop after dispatching `count` events instead of running until the
    /// stream closes.
    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn on<H: EventHandler + 'static>(mut self, type_name: &str, handler: H) -> Self {
        self.handlers
            .entry(type_name.to_string())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Next accepted event. `None` once the stream is closed.
    ///
    /// Lagging behind the stream skips the dropped records with a warning.
    /// Records of registered types outside the accepted subtree are skipped.
    pub async fn next_event(&mut self) -> Option<Result<Document>> {
        loop {
            let record = match self.receiver.recv().await {
                Ok(record) => record,
                Err(RecvError::Lagged(skipped)) => {
                    event!(Level::WARN, skipped, "event subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };
            if self.is_foreign(&record) {
                continue;
            }
            return Some(self.mapper.decode_record(Some(&self.declared), record));
        }
    }

    fn is_foreign(&self, record: &WireRecord) -> bool {
        match record.get(TYPE_FIELD) {
            Some(JsonValue::String(name)) => {
                let registry = self.mapper.registry();
                registry.contains(name)
                    && !registry.admits(
                        std::slice::from_ref(&self.declared),
                        TypeCategory::Document,
                        name,
                    )
            }
            _ => false,
        }
    }

    fn handlers_for(&self, document: &Document) -> Vec<Arc<dyn EventHandler>> {
        document
            .schema()
            .lineage()
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .flatten()
            .cloned()
            .collect()
    }

    /// Consumes events until the stream closes or the limit is reached.
    /// Returns how many were dispatched.
    pub async fn run(self) -> usize {
        let span = info_span!("memodoc.subscriber", declared = %self.declared);
        self.dispatch_all().instrument(span).await
    }

    async fn dispatch_all(mut self) -> usize {
        let mut dispatched = 0;

        while self.limit.is_none_or(|limit| dispatched < limit)
            && let Some(next) = self.next_event().await
        {
            let document = match next {
                Ok(document) => document,
                Err(err) => {
                    event!(Level::ERROR, error = %err, "event decode failed");
                    continue;
                }
            };
            for handler in self.handlers_for(&document) {
                if let Err(err) = handler.handle(document.clone()).await {
                    event!(
                        Level::ERROR,
                        error = %err,
                        event_type = %document.type_name(),
                        "event handler failed"
                    );
                }
            }
            dispatched += 1;
        }

        event!(Level::DEBUG, dispatched, "event subscriber stopped");
        dispatched
    }

    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(self.run())
    }
}
