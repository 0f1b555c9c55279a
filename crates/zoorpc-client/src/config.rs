//! Client configuration.
//!
//! Loaded once from JSON and immutable afterwards:
//!
//! ```json
//! {
//!   "registry": "zk1:2181,zk2:2181",
//!   "application": "billing",
//!   "dependencies": {
//!     "users": { "interface": "com.example.UserService", "version": "1.0.0", "timeout_ms": 3000 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zoorpc_common::{Result, ZoorpcError, DEFAULT_DUBBO_VERSION, DEFAULT_MAX_BODY_LEN, DEFAULT_TIMEOUT_MS};
use zoorpc_registry::{ProviderFilter, DEFAULT_ROOT};

/// Environment variable overriding [`ClientConfig::registry`].
pub const REGISTRY_ENV: &str = "ZOORPC_REGISTRY";

pub const DEFAULT_DISCOVERY_RETRY_MS: u64 = 5000;

/// One remote service the client calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub interface: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// Bound on a whole call, failover included
    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_body_len", alias = "maxLength")]
    pub max_body_len: usize,
}

impl DependencyConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            version: None,
            group: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn filter(&self) -> ProviderFilter {
        ProviderFilter::new(self.version.clone(), self.group.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Coordination service connection string
    #[serde(default, alias = "register")]
    pub registry: String,
    #[serde(default = "default_dubbo_version", alias = "dubboVer")]
    pub dubbo_version: String,
    /// Sent to providers as the `remote.application` attachment
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_discovery_retry_ms")]
    pub discovery_retry_ms: u64,
    /// Publish a consumer node per dependency
    #[serde(default = "default_register_consumer")]
    pub register_consumer: bool,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            registry: String::new(),
            dubbo_version: default_dubbo_version(),
            application: None,
            root: default_root(),
            discovery_retry_ms: default_discovery_retry_ms(),
            register_consumer: default_register_consumer(),
            dependencies: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            ..Self::default()
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, dependency: DependencyConfig) -> Self {
        self.dependencies.insert(name.into(), dependency);
        self
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_discovery_retry(mut self, retry_ms: u64) -> Self {
        self.discovery_retry_ms = retry_ms;
        self
    }

    pub fn with_consumer_registration(mut self, enabled: bool) -> Self {
        self.register_consumer = enabled;
        self
    }

    /// Load configuration from a JSON file
    ///
    /// The registry connection string may be overridden with
    /// `ZOORPC_REGISTRY`. The result is validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ZoorpcError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut config: ClientConfig = serde_json::from_str(content)
            .map_err(|e| ZoorpcError::Config(format!("Failed to parse configuration: {}", e)))?;

        if let Ok(registry) = std::env::var(REGISTRY_ENV) {
            if !registry.trim().is_empty() {
                config.registry = registry;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if:
    /// - the registry connection string is empty
    /// - a dependency has an empty interface
    /// - a dependency has a zero timeout or body limit
    /// - the discovery retry interval is zero
    pub fn validate(&self) -> Result<()> {
        if self.registry.trim().is_empty() {
            return Err(ZoorpcError::Config(
                "registry connection string must not be empty".to_string(),
            ));
        }

        if self.discovery_retry_ms == 0 {
            return Err(ZoorpcError::Config(
                "discovery_retry_ms must be greater than zero".to_string(),
            ));
        }

        for (name, dependency) in &self.dependencies {
            if dependency.interface.trim().is_empty() {
                return Err(ZoorpcError::Config(format!(
                    "dependency '{}' has an empty interface",
                    name
                )));
            }
            if dependency.timeout_ms == 0 {
                return Err(ZoorpcError::Config(format!(
                    "dependency '{}' timeout must be greater than zero",
                    name
                )));
            }
            if dependency.max_body_len == 0 {
                return Err(ZoorpcError::Config(format!(
                    "dependency '{}' max_body_len must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_body_len() -> usize {
    DEFAULT_MAX_BODY_LEN
}

fn default_register_consumer() -> bool {
    true
}

fn default_dubbo_version() -> String {
    DEFAULT_DUBBO_VERSION.to_string()
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_discovery_retry_ms() -> u64 {
    DEFAULT_DISCOVERY_RETRY_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_applied() {
        let config = ClientConfig::from_json_str(
            r#"{"registry": "zk:2181", "dependencies": {"users": {"interface": "com.example.UserService"}}}"#,
        )
        .unwrap();

        assert_eq!(config.dubbo_version, "2.5.3.6");
        assert_eq!(config.root, "dubbo");
        assert_eq!(config.discovery_retry_ms, 5000);
        assert!(config.application.is_none());
        assert!(config.register_consumer);

        let users = &config.dependencies["users"];
        assert_eq!(users.timeout_ms, 6000);
        assert_eq!(users.max_body_len, 8 * 1024 * 1024);
        assert!(users.version.is_none());
        assert_eq!(users.filter(), ProviderFilter::default());
    }

    #[test]
    fn test_legacy_key_names() {
        let config = ClientConfig::from_json_str(
            r#"{
                "register": "zk:2181",
                "dubboVer": "2.6.0",
                "dependencies": {
                    "users": {"interface": "com.example.UserService", "timeout": 1500, "maxLength": 1024}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.dubbo_version, "2.6.0");
        assert_eq!(config.dependencies["users"].timeout_ms, 1500);
        assert_eq!(config.dependencies["users"].max_body_len, 1024);
    }

    #[test]
    fn test_consumer_registration_can_be_disabled() {
        let config = ClientConfig::from_json_str(r#"{"registry": "zk:2181", "register_consumer": false}"#)
            .unwrap();
        assert!(!config.register_consumer);
        assert!(ClientConfig::new("zk:2181").with_consumer_registration(false) == config);
    }

    #[test]
    fn test_validation_errors() {
        assert!(ClientConfig::default().validate().is_err());

        let empty_interface = ClientConfig::new("zk:2181").with_dependency("x", DependencyConfig::new(" "));
        assert!(matches!(empty_interface.validate(), Err(ZoorpcError::Config(_))));

        let zero_timeout = ClientConfig::new("zk:2181")
            .with_dependency("x", DependencyConfig::new("com.example.X").with_timeout(0));
        assert!(zero_timeout.validate().is_err());

        let zero_limit = ClientConfig::new("zk:2181")
            .with_dependency("x", DependencyConfig::new("com.example.X").with_max_body_len(0));
        assert!(zero_limit.validate().is_err());

        assert!(ClientConfig::new("zk:2181").with_discovery_retry(0).validate().is_err());
        assert!(ClientConfig::new("zk:2181").validate().is_ok());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            ClientConfig::from_json_str("{not json"),
            Err(ZoorpcError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"registry": "zk:2181", "application": "billing", "dependencies": {{"users": {{"interface": "com.example.UserService", "version": "1.0.0"}}}}}}"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.application.as_deref(), Some("billing"));
        assert_eq!(config.dependencies["users"].version.as_deref(), Some("1.0.0"));

        assert!(ClientConfig::from_file("/nonexistent/zoorpc.json").is_err());
    }
}
