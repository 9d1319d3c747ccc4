/// Event tests
///
/// Firing events into the capped collection and consuming them through a
/// subscriber on the collection's change stream.
/// Run with: cargo test --test events_tests

use async_trait::async_trait;
use memodoc::OdmError;
use memodoc::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn open() -> (Mapper, Arc<InMemoryGateway>) {
    let registry = SchemaRegistry::new()
        .with_type(event_type())
        .unwrap()
        .with_type(
            TypeDecl::document("Login")
                .extends("Event")
                .field(Field::text("ip")),
        )
        .unwrap()
        .with_type(TypeDecl::document("Logout").extends("Event"))
        .unwrap()
        .with_type(TypeDecl::document("User").field(Field::text("name").required()))
        .unwrap();
    let gateway = Arc::new(InMemoryGateway::default());
    let mapper = Mapper::open(registry, gateway.clone()).unwrap();
    (mapper, gateway)
}

#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Document>>>,
    calls: Arc<AtomicUsize>,
}

impl Recorder {
    fn types(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|doc| doc.type_name().to_string())
            .collect()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, event: Document) -> memodoc::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(event);
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl EventHandler for Failing {
    async fn handle(&self, _event: Document) -> memodoc::Result<()> {
        Err(OdmError::Configuration("handler refused".to_string()))
    }
}

#[test]
fn test_fire_saves_an_event() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let user = mapper.create("User", fields! { "name" => "Frank" })?;

    let login = fire(&mapper, "Login", fields! { "user" => &user, "ip" => "10.0.0.1" })?;
    assert!(login.is_saved());
    assert!(user.is_saved());
    assert!(login.value("created")?.is_some());
    assert_eq!(gateway.count("Event"), 1);
    assert!(Document::ptr_eq(&login.reference("user")?.unwrap(), &user));
    Ok(())
}

#[test]
fn test_fire_rejects_non_event_types() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let err = fire(&mapper, "User", fields! { "name" => "Frank" }).unwrap_err();
    assert!(matches!(err, OdmError::TypeMismatch(_)));
    assert!(matches!(
        fire(&mapper, "Ghost", fields! {}),
        Err(OdmError::UnknownType(_))
    ));
    assert_eq!(gateway.count("User"), 0);
    Ok(())
}

#[test]
fn test_event_collection_is_capped() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    for n in 0..(memodoc::events::EVENT_CAPACITY + 5) {
        fire(&mapper, "Login", fields! { "ip" => format!("10.0.0.{}", n) })?;
    }
    assert_eq!(gateway.count("Event"), memodoc::events::EVENT_CAPACITY);

    // The oldest were dropped.
    let first = mapper.find_one(
        "Login",
        &Filter::new().order_by("created", SortOrder::Ascending),
    )?;
    assert_ne!(first.value_as::<String>("ip")?, Some("10.0.0.0".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_subscriber_dispatches_by_lineage() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let receiver = gateway.tail("Event");

    let all = Recorder::default();
    let logins = Recorder::default();
    let subscriber = Subscriber::new(mapper.clone(), receiver)
        .on("Event", all.clone())
        .on("Login", logins.clone())
        .limit(3);

    let login = fire(&mapper, "Login", fields! { "ip" => "10.0.0.1" })?;
    fire(&mapper, "Logout", fields! {})?;
    fire(&mapper, "Event", fields! {})?;

    assert_eq!(subscriber.run().await, 3);
    assert_eq!(all.types(), vec!["Login", "Logout", "Event"]);
    assert_eq!(logins.types(), vec!["Login"]);

    // The handler got the live instance, not a copy.
    let received = logins.seen.lock().unwrap()[0].clone();
    assert!(Document::ptr_eq(&received, &login));
    Ok(())
}

#[tokio::test]
async fn test_subscriber_for_type_skips_other_events() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let recorder = Recorder::default();
    let subscriber = Subscriber::new(mapper.clone(), gateway.tail("Event"))
        .for_type("Login")
        .on("Event", recorder.clone())
        .limit(2);

    fire(&mapper, "Logout", fields! {})?;
    fire(&mapper, "Login", fields! { "ip" => "10.0.0.1" })?;
    fire(&mapper, "Event", fields! {})?;
    fire(&mapper, "Login", fields! { "ip" => "10.0.0.2" })?;

    let dispatched = subscriber.spawn().await?;
    assert_eq!(dispatched, 2);
    assert_eq!(recorder.types(), vec!["Login", "Login"]);
    Ok(())
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_dispatch() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let recorder = Recorder::default();
    let subscriber = Subscriber::new(mapper.clone(), gateway.tail("Event"))
        .on("Event", Failing)
        .on("Event", recorder.clone())
        .limit(2);

    fire(&mapper, "Login", fields! {})?;
    fire(&mapper, "Logout", fields! {})?;

    assert_eq!(subscriber.run().await, 2);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_next_event_decodes_with_references() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let mut subscriber = Subscriber::new(mapper.clone(), gateway.tail("Event"));

    let user = mapper.create("User", fields! { "name" => "Frank" })?;
    fire(&mapper, "Event", fields! { "ref" => &user, "user" => &user })?;

    let event = subscriber.next_event().await.expect("stream open")?;
    assert_eq!(event.type_name(), "Event");
    let subject = event.reference("ref")?.expect("ref is set");
    assert!(Document::ptr_eq(&subject, &user));
    Ok(())
}

#[tokio::test]
async fn test_next_event_yields_the_fired_instance() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let mut subscriber = Subscriber::new(mapper.clone(), gateway.tail("Event"));

    let login = fire(&mapper, "Login", fields! { "ip" => "10.0.0.1" })?;
    let received = subscriber.next_event().await.expect("stream open")?;
    assert!(Document::ptr_eq(&received, &login));

    login.set("ip", "10.0.0.2")?;
    assert_eq!(received.value_as::<String>("ip")?, Some("10.0.0.2".to_string()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiting_subscriber_receives_the_fired_instance() -> anyhow::Result<()> {
    let (mapper, gateway) = open();
    let mut subscriber = Subscriber::new(mapper.clone(), gateway.tail("Event"));
    let waiting = tokio::spawn(async move { subscriber.next_event().await });

    let login = fire(&mapper, "Login", fields! { "ip" => "10.0.0.1" })?;
    let received = waiting.await?.expect("stream open")?;
    assert!(Document::ptr_eq(&received, &login));
    Ok(())
}
