use super::*;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use zoorpc_client::{DependencyConfig, Value};
use zoorpc_registry::{Discovery, DiscoveryOutcome, MemoryCoordinator, RegistryClient};

#[test]
fn test_parse_call_args() {
    let args = parse_call_args(r#"[1, "two", {"$class": "java.lang.Long", "$": 3}]"#).unwrap();
    assert_eq!(args.len(), 3);
    assert_eq!(args[0].value, Value::Int(1));
    assert_eq!(args[1].descriptor, "Ljava/lang/String;");
    assert_eq!(args[2].value, Value::Long(3));
    assert_eq!(args[2].descriptor, "Ljava/lang/Long;");
}

#[test]
fn test_parse_call_args_empty() {
    assert!(parse_call_args("[]").unwrap().is_empty());
}

#[test]
fn test_parse_call_args_rejects_non_array() {
    assert!(parse_call_args(r#"{"id": 1}"#).is_err());
    assert!(parse_call_args("not json").is_err());
    assert!(parse_call_args(r#"[{"$class": 1, "$": 2}]"#).is_err());
}

#[test]
fn test_load_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"registry": "zk:2181", "dependencies": {{"users": {{"interface": "com.example.UserService"}}}}}}"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.dependencies.len(), 1);

    let err = load_config("/nonexistent/zoorpc.json").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/zoorpc.json"));
}

#[test]
fn test_service_summary() {
    let registry = RegistryClient::new(Arc::new(MemoryCoordinator::new()));
    let proxy = ServiceProxy::new(
        "users",
        &ClientConfig::new("zk:2181"),
        DependencyConfig::new("com.example.UserService").with_version("1.0.0"),
        registry,
    );
    proxy.apply(Discovery {
        hosts: vec!["10.0.0.1:20880".to_string()],
        methods: ["findUser".to_string()].into_iter().collect::<BTreeSet<_>>(),
        outcome: DiscoveryOutcome::Found,
    });

    assert_eq!(
        service_summary(&proxy),
        json!({
            "service": "users",
            "interface": "com.example.UserService",
            "version": "1.0.0",
            "group": null,
            "hosts": ["10.0.0.1:20880"],
            "methods": ["findUser"],
        })
    );
}
