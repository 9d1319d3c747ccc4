/// Identity cache tests
///
/// One live instance per stored identity, across threads, with eviction
/// when the last handle goes away.
/// Run with: cargo test --test identity_cache_tests


use memodoc::gateway::{GatewayResult, RecordStream};
use memodoc::prelude::*;
use memodoc::{DocumentId, OdmError, WireRecord};
use serde_json::json;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use test_utils::{CountingGateway, open, open_with};

fn saved_user(mapper: &Mapper, name: &str) -> memodoc::Result<DocumentId> {
    let user = mapper.create("User", fields! { "name" => name, "last_name" => "Footer" })?;
    user.save()?;
    Ok(user.id().expect("saved"))
}

#[test]
fn test_saved_document_is_the_resident_instance() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let user = mapper.create("User", fields! { "name" => "Frank", "last_name" => "Footer" })?;
    user.save()?;
    let id = user.id().unwrap();

    let fetched = mapper.get("User", &id)?;
    assert!(Document::ptr_eq(&fetched, &user));
    assert_eq!(gateway.dereferences(), 1);

    let cached = mapper.cached("User", &id).expect("resident");
    assert!(Document::ptr_eq(&cached, &user));
    assert_eq!(gateway.dereferences(), 1);
    Ok(())
}

#[test]
fn test_concurrent_loads_converge_on_one_instance() -> anyhow::Result<()> {
    let (mapper, gateway) = open_with(CountingGateway::with_rendezvous(2));
    let id = saved_user(&mapper, "Frank")?;
    assert!(mapper.cached("User", &id).is_none());

    // Both threads read the record before either binds it.
    let (a, b) = thread::scope(|scope| {
        let first = scope.spawn(|| mapper.get("User", &id));
        let second = scope.spawn(|| mapper.get("User", &id));
        (first.join().unwrap(), second.join().unwrap())
    });
    let (a, b) = (a?, b?);

    assert_eq!(gateway.dereferences(), 2);
    assert!(Document::ptr_eq(&a, &b));
    assert_eq!(mapper.cache("User")?.len(), 1);
    Ok(())
}

#[test]
fn test_many_threads_share_one_instance() -> anyhow::Result<()> {
    let (mapper, _) = open();
    let id = saved_user(&mapper, "Frank")?;

    let documents: Vec<Document> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| mapper.get("User", &id)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<memodoc::Result<_>>()
    })?;

    let first = &documents[0];
    assert!(documents.iter().all(|doc| Document::ptr_eq(doc, first)));
    Ok(())
}

#[test]
fn test_entry_is_evicted_when_last_handle_drops() -> anyhow::Result<()> {
    let (mapper, _) = open();
    let user = mapper.create("User", fields! { "name" => "Frank", "last_name" => "Footer" })?;
    user.save()?;
    let id = user.id().unwrap();
    let cache = mapper.cache("User")?.clone();
    assert!(cache.contains(&id));

    let other = user.clone();
    drop(user);
    assert!(cache.contains(&id));

    drop(other);
    assert!(!cache.contains(&id));
    assert!(cache.is_empty());
    assert!(mapper.cached("User", &id).is_none());
    assert_eq!(mapper.sweep_caches(), 0);
    Ok(())
}

#[test]
fn test_reload_after_eviction_is_a_new_instance() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let id = saved_user(&mapper, "Frank")?;

    let first = mapper.get("User", &id)?;
    let data = first.data();
    drop(first);

    let second = mapper.get("User", &id)?;
    assert_eq!(second.data(), data);
    assert_eq!(gateway.dereferences(), 2);
    Ok(())
}

#[test]
fn test_fetch_refreshes_the_resident_instance() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let user = mapper.create("User", fields! { "name" => "Frank", "last_name" => "Footer" })?;
    user.save()?;
    let id = user.id().unwrap();

    // Another writer changes the stored record behind the mapper's back.
    let mut stored = gateway
        .inner()
        .dereference("User", &Reference::new("User", id))?;
    stored.insert("last_name".to_string(), json!("Footers"));
    gateway.inner().update("User", &id, stored)?;

    // Local edits are replaced by the stored state.
    user.set("name", "Francis")?;
    let fetched = mapper.get("User", &id)?;
    assert!(Document::ptr_eq(&fetched, &user));
    assert_eq!(user.value_as::<String>("last_name")?, Some("Footers".to_string()));
    assert_eq!(user.value_as::<String>("name")?, Some("Frank".to_string()));
    Ok(())
}

#[test]
fn test_refresh_reloads_in_place() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let user = mapper.create("User", fields! { "name" => "Frank", "last_name" => "Footer" })?;
    user.save()?;
    let id = user.id().unwrap();
    let handle = user.clone();

    let mut stored = gateway
        .inner()
        .dereference("User", &Reference::new("User", id))?;
    stored.insert("email".to_string(), json!("frank@example.com"));
    gateway.inner().update("User", &id, stored)?;

    user.refresh()?;
    assert_eq!(
        handle.value_as::<String>("email")?,
        Some("frank@example.com".to_string())
    );
    Ok(())
}

#[test]
fn test_subtypes_have_their_own_cache() -> anyhow::Result<()> {
    let (mapper, _) = open();
    let rig = mapper.create("Rig", fields! { "name" => "biped" })?;
    rig.save()?;
    let id = rig.id().unwrap();

    assert!(mapper.cache("Rig")?.contains(&id));
    assert!(!mapper.cache("Asset")?.contains(&id));

    // Fetching through the base type resolves to the same live instance.
    let fetched = mapper.find_one("Asset", &Filter::new().eq("name", "biped"))?;
    assert!(Document::ptr_eq(&fetched, &rig));
    Ok(())
}

#[test]
fn test_remove_forgets_the_identity() -> anyhow::Result<()> {
    let (mapper, _) = open();
    let user = mapper.create("User", fields! { "name" => "Frank", "last_name" => "Footer" })?;
    user.save()?;
    let id = user.id().unwrap();

    user.remove()?;
    assert!(!mapper.cache("User")?.contains(&id));

    // Saving again yields a fresh identity.
    user.save()?;
    let new_id = user.id().unwrap();
    assert_ne!(new_id, id);
    assert!(mapper.cache("User")?.contains(&new_id));
    Ok(())
}

#[test]
fn test_cache_lookup_rejects_embedded_and_unknown_types() {
    let (mapper, _) = open();
    assert!(matches!(mapper.cache("Comment"), Err(OdmError::TypeMismatch(_))));
    assert!(matches!(mapper.cache("Ghost"), Err(OdmError::UnknownType(_))));
    assert!(mapper.cached("Ghost", &DocumentId::new()).is_none());
}

/// Decodes every inserted record before the insert returns, the way a
/// change-stream consumer in another thread may.
#[derive(Default)]
struct WatchedGateway {
    inner: InMemoryGateway,
    mapper: OnceLock<Mapper>,
    seen: Mutex<Vec<Document>>,
}

impl PersistenceGateway for WatchedGateway {
    fn ensure_collection(&self, options: &CollectionOptions) -> GatewayResult<()> {
        self.inner.ensure_collection(options)
    }

    fn ensure_index(&self, collection: &str, index: &IndexOptions) -> GatewayResult<()> {
        self.inner.ensure_index(collection, index)
    }

    fn insert(&self, collection: &str, record: WireRecord) -> GatewayResult<DocumentId> {
        let id = self.inner.insert(collection, record.clone())?;
        if let Some(mapper) = self.mapper.get() {
            let decoded = mapper.decode_record(None, record).unwrap();
            self.seen.lock().unwrap().push(decoded);
        }
        Ok(id)
    }

    fn update(&self, collection: &str, id: &DocumentId, record: WireRecord) -> GatewayResult<()> {
        self.inner.update(collection, id, record)
    }

    fn find(&self, collection: &str, filter: &Filter) -> GatewayResult<RecordStream> {
        self.inner.find(collection, filter)
    }

    fn remove(&self, collection: &str, id: &DocumentId) -> GatewayResult<()> {
        self.inner.remove(collection, id)
    }

    fn dereference(&self, collection: &str, reference: &Reference) -> GatewayResult<WireRecord> {
        self.inner.dereference(collection, reference)
    }
}

#[test]
fn test_record_decoded_during_insert_binds_to_the_saver() -> anyhow::Result<()> {
    let gateway = Arc::new(WatchedGateway::default());
    let mapper = Mapper::open(test_utils::registry(), gateway.clone())?;
    gateway.mapper.set(mapper.clone()).ok();

    let frank = mapper.create("User", fields! { "name" => "Frank", "last_name" => "Footer" })?;
    frank.save()?;

    let watched = gateway.seen.lock().unwrap().pop().expect("insert was observed");
    assert!(Document::ptr_eq(&watched, &frank));
    assert!(Document::ptr_eq(&mapper.get("User", &frank.id().unwrap())?, &frank));

    frank.set("name", "Francis")?;
    assert_eq!(watched.value_as::<String>("name")?, Some("Francis".to_string()));
    Ok(())
}

#[test]
fn test_failed_insert_leaves_no_identity_behind() -> anyhow::Result<()> {
    let (mapper, _) = open();
    let frank = mapper.create(
        "User",
        fields! { "name" => "Frank", "last_name" => "Footer", "email" => "f@example.com" },
    )?;
    frank.save()?;

    let twin = mapper.create(
        "User",
        fields! { "name" => "Frank", "last_name" => "Twin", "email" => "f@example.com" },
    )?;
    assert!(twin.save().is_err());
    assert!(!twin.is_saved());
    assert_eq!(mapper.cache("User")?.len(), 1);
    Ok(())
}
