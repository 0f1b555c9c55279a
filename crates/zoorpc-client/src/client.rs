use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use zoorpc_common::{Argument, Result, Value, ZoorpcError};
use zoorpc_registry::{ConsumerDescriptor, Coordinator, RegistryClient, Subscription};

use crate::config::ClientConfig;
use crate::proxy::ServiceProxy;
use crate::readiness::ReadinessTracker;

/// zoorpc client for calling registry-discovered services
///
/// Creates one [`ServiceProxy`] per configured dependency and keeps each
/// one subscribed to its providers for as long as the client lives. Unless
/// disabled, the client also publishes one consumer node per dependency. Every
/// call opens a fresh TCP connection, so calls run fully in parallel.
pub struct ZoorpcClient {
    config: ClientConfig,
    services: BTreeMap<String, Arc<ServiceProxy>>,
    readiness: Arc<ReadinessTracker>,
    tasks: Vec<JoinHandle<()>>,
}

impl ZoorpcClient {
    /// Create a client over an existing coordinator
    ///
    /// Must be called inside a Tokio runtime: one subscription task is
    /// spawned per dependency.
    pub fn with_coordinator(config: ClientConfig, coordinator: Arc<dyn Coordinator>) -> Result<Self> {
        config.validate()?;

        let registry = RegistryClient::new(coordinator).with_root(config.root.clone());
        let readiness = Arc::new(ReadinessTracker::new(config.dependencies.keys().cloned()));

        let mut services = BTreeMap::new();
        let mut tasks = Vec::with_capacity(config.dependencies.len());

        for (name, dependency) in &config.dependencies {
            let proxy = Arc::new(ServiceProxy::new(
                name.clone(),
                &config,
                dependency.clone(),
                registry.clone(),
            ));

            let subscription = Subscription::new(
                registry.clone(),
                dependency.interface.clone(),
                dependency.filter(),
                config.discovery_retry(),
            );
            let sink_proxy = proxy.clone();
            let sink_readiness = readiness.clone();
            tasks.push(subscription.spawn(move |discovery| {
                sink_proxy.apply(discovery);
                sink_readiness.mark_discovered(sink_proxy.name());
            }));

            services.insert(name.clone(), proxy);
        }

        if config.register_consumer && !config.dependencies.is_empty() {
            tasks.push(tokio::spawn(register_consumers(registry, config.clone())));
        }

        info!(
            registry = %config.registry,
            dependencies = services.len(),
            "client started"
        );

        Ok(Self {
            config,
            services,
            readiness,
            tasks,
        })
    }

    /// Connect to the ZooKeeper ensemble named in the configuration
    #[cfg(feature = "zookeeper")]
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let coordinator = zoorpc_registry::ZkCoordinator::connect(&config.registry).await?;
        Self::with_coordinator(config, Arc::new(coordinator))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The proxy of a configured dependency
    pub fn service(&self, name: &str) -> Option<Arc<ServiceProxy>> {
        self.services.get(name).cloned()
    }

    pub fn services(&self) -> impl Iterator<Item = (&str, &Arc<ServiceProxy>)> {
        self.services.iter().map(|(name, proxy)| (name.as_str(), proxy))
    }

    /// Call a method of a configured dependency
    ///
    /// # Arguments
    ///
    /// * `service` - Dependency name from the configuration
    /// * `method` - A method advertised by the dependency's providers
    /// * `args` - Positional arguments
    pub async fn invoke(&self, service: &str, method: &str, args: Vec<Argument>) -> Result<Value> {
        let proxy = self.services.get(service).ok_or_else(|| {
            ZoorpcError::InvalidRequest(format!("no dependency named '{}' is configured", service))
        })?;
        proxy.invoke(method, args).await
    }

    /// Wait until every dependency has completed its first discovery pass
    pub async fn ready(&self) {
        self.readiness.wait().await
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }
}

impl Drop for ZoorpcClient {
    fn drop(&mut self) {
        for handle in &self.tasks {
            handle.abort();
        }
    }
}

/// Publishes a consumer node per dependency. Failures are logged only.
async fn register_consumers(registry: RegistryClient, config: ClientConfig) {
    let host = zoorpc_registry::local_address(&config.registry).await;

    for dependency in config.dependencies.values() {
        let consumer = ConsumerDescriptor::new(host.to_string(), dependency.interface.clone())
            .with_application(config.application.clone())
            .with_dubbo_version(config.dubbo_version.clone())
            .with_version(dependency.version.clone())
            .with_group(dependency.group.clone());

        if let Err(e) = registry.register_consumer(&consumer).await {
            warn!(interface = %dependency.interface, error = %e, "consumer registration failed");
        }
    }
}
