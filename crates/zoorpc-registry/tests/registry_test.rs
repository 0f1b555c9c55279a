//! Discovery against an in-memory coordinator.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use zoorpc_common::ZoorpcError;
use zoorpc_registry::{
    ConsumerDescriptor, Coordinator, Discovery, DiscoveryOutcome, MemoryCoordinator,
    ProviderFilter, RegistryClient, Subscription,
};

const INTERFACE: &str = "com.example.UserService";
const PATH: &str = "/dubbo/com.example.UserService/providers";

fn node(host: &str, query: &str) -> String {
    urlencoding::encode(&format!("dubbo://{}/{}?{}", host, INTERFACE, query)).into_owned()
}

fn v1() -> ProviderFilter {
    ProviderFilter::new(Some("1.0.0".to_string()), None)
}

fn setup() -> (Arc<MemoryCoordinator>, RegistryClient) {
    let coordinator = Arc::new(MemoryCoordinator::new());
    let registry = RegistryClient::new(coordinator.clone());
    (coordinator, registry)
}

#[test]
fn test_providers_path() {
    let (_, registry) = setup();
    assert_eq!(registry.providers_path(INTERFACE), PATH);

    let registry = registry.with_root("/custom/");
    assert_eq!(
        registry.providers_path(INTERFACE),
        "/custom/com.example.UserService/providers"
    );
}

#[tokio::test]
async fn test_resolve_filters_and_dedupes() {
    let (coordinator, registry) = setup();
    coordinator.set_children(
        PATH,
        [
            node("10.0.0.1:20880", "methods=findUser,saveUser&version=1.0.0"),
            node("10.0.0.2:20880", "methods=findUser&version=2.0.0"),
            node("10.0.0.3:20880", "methods=deleteUser&version=1.0.0&group=blue"),
            node("10.0.0.1:20880", "methods=findUser,listUsers&version=1.0.0"),
            node("10.0.0.4:20880", "methods=findUser&version=1.0.0&group="),
        ],
    );

    let discovery = registry.resolve(INTERFACE, &v1()).await;
    assert_eq!(discovery.outcome, DiscoveryOutcome::Found);
    assert_eq!(discovery.hosts, vec!["10.0.0.1:20880", "10.0.0.4:20880"]);
    assert_eq!(
        discovery.methods.iter().cloned().collect::<Vec<_>>(),
        vec!["findUser", "listUsers", "saveUser"]
    );
}

#[tokio::test]
async fn test_group_must_match_exactly() {
    let (coordinator, registry) = setup();
    coordinator.set_children(
        PATH,
        [
            node("10.0.0.1:20880", "methods=a&version=1.0.0"),
            node("10.0.0.3:20880", "methods=b&version=1.0.0&group=blue"),
        ],
    );

    let blue = ProviderFilter::new(Some("1.0.0".to_string()), Some("blue".to_string()));
    let discovery = registry.resolve(INTERFACE, &blue).await;
    assert_eq!(discovery.hosts, vec!["10.0.0.3:20880"]);
    assert_eq!(discovery.methods.len(), 1);
}

#[tokio::test]
async fn test_skips_unparsable_nodes() {
    let (coordinator, registry) = setup();
    coordinator.set_children(
        PATH,
        [
            "garbage".to_string(),
            node("10.0.0.1:20880", "methods=a&version=1.0.0"),
        ],
    );

    let discovery = registry.resolve(INTERFACE, &v1()).await;
    assert_eq!(discovery.hosts, vec!["10.0.0.1:20880"]);
}

#[tokio::test]
async fn test_empty_outcomes_are_distinct() {
    let (coordinator, registry) = setup();

    let missing = registry.resolve(INTERFACE, &v1()).await;
    assert!(matches!(missing.outcome, DiscoveryOutcome::Failed(_)));
    assert!(missing.hosts.is_empty());

    coordinator.set_children(PATH, Vec::<String>::new());
    let empty = registry.resolve(INTERFACE, &v1()).await;
    assert_eq!(empty.outcome, DiscoveryOutcome::NoProviders);

    coordinator.set_children(PATH, [node("10.0.0.1:20880", "version=9.9.9")]);
    let unmatched = registry.resolve(INTERFACE, &v1()).await;
    assert_eq!(unmatched.outcome, DiscoveryOutcome::Unmatched { skipped: 1 });
    assert!(unmatched.hosts.is_empty());
    assert!(unmatched.methods.is_empty());

    coordinator.set_failure(Some("connection loss"));
    let failed = registry.resolve(INTERFACE, &v1()).await;
    assert!(matches!(failed.outcome, DiscoveryOutcome::Failed(m) if m.contains("connection loss")));
}

#[tokio::test]
async fn test_subscription_follows_changes() {
    let (coordinator, registry) = setup();
    coordinator.set_children(PATH, [node("10.0.0.1:20880", "methods=a&version=1.0.0")]);

    let seen: Arc<Mutex<Vec<Discovery>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = Subscription::new(registry, INTERFACE, v1(), Duration::from_millis(20))
        .spawn(move |discovery| sink.lock().unwrap().push(discovery));

    wait_for(&seen, 1).await;
    coordinator.add_child(PATH, node("10.0.0.2:20880", "methods=b&version=1.0.0"));
    wait_for(&seen, 2).await;

    let last = seen.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.hosts, vec!["10.0.0.1:20880", "10.0.0.2:20880"]);
    assert_eq!(last.methods.len(), 2);

    handle.abort();
}

#[tokio::test]
async fn test_subscription_retries_after_failure() {
    let (coordinator, registry) = setup();

    let seen: Arc<Mutex<Vec<Discovery>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = Subscription::new(registry, INTERFACE, v1(), Duration::from_millis(20))
        .spawn(move |discovery| sink.lock().unwrap().push(discovery));

    wait_for(&seen, 1).await;
    assert!(matches!(
        seen.lock().unwrap()[0].outcome,
        DiscoveryOutcome::Failed(_)
    ));

    // the path appears later; the retry picks it up without a watch
    coordinator.set_children(PATH, [node("10.0.0.1:20880", "methods=a&version=1.0.0")]);
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let found = seen
                .lock()
                .unwrap()
                .iter()
                .any(|d| d.outcome == DiscoveryOutcome::Found);
            if found {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    handle.abort();
}

async fn wait_for(seen: &Arc<Mutex<Vec<Discovery>>>, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while seen.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_register_consumer_creates_parents() {
    let (coordinator, registry) = setup();
    coordinator.set_children(PATH, [node("10.0.0.1:20880", "version=1.0.0")]);

    let consumer = ConsumerDescriptor::new("10.0.0.9", INTERFACE)
        .with_application(Some("billing".to_string()))
        .with_version(Some("1.0.0".to_string()));
    let path = registry.register_consumer(&consumer).await.unwrap();

    let consumers = "/dubbo/com.example.UserService/consumers";
    assert_eq!(path, format!("{}/{}", consumers, consumer.node_name().unwrap()));
    assert!(coordinator.is_ephemeral(&path));
    assert!(!coordinator.is_ephemeral(consumers));

    let children = coordinator.children(consumers).await.unwrap();
    assert_eq!(children.len(), 1);
    let url = urlencoding::decode(&children[0]).unwrap().into_owned();
    assert!(url.starts_with("consumer://10.0.0.9/com.example.UserService?application=billing"));
    assert!(url.contains("category=consumers"));
    assert!(url.contains("version=1.0.0"));

    // providers are untouched
    assert_eq!(registry.resolve(INTERFACE, &v1()).await.hosts, vec!["10.0.0.1:20880"]);
}

#[tokio::test]
async fn test_register_consumer_twice() {
    let (coordinator, registry) = setup();
    let first = ConsumerDescriptor::new("10.0.0.9", INTERFACE);
    let mut second = first.clone();
    second.pid += 1;

    registry.register_consumer(&first).await.unwrap();
    // same node again is not an error
    registry.register_consumer(&first).await.unwrap();
    registry.register_consumer(&second).await.unwrap();

    let consumers = registry.consumers_path(INTERFACE);
    assert_eq!(coordinator.children(&consumers).await.unwrap().len(), 2);

    coordinator.expire_session();
    assert!(coordinator.children(&consumers).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_register_consumer_failure_is_reported() {
    let (coordinator, registry) = setup();
    coordinator.set_failure(Some("not connected"));

    let result = registry
        .register_consumer(&ConsumerDescriptor::new("10.0.0.9", INTERFACE))
        .await;
    assert!(matches!(result, Err(ZoorpcError::Discovery { .. })));
}
