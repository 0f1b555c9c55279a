//! Per-dependency invocation proxy.
//!
//! A [`ServiceProxy`] owns the latest [`ServiceSnapshot`] for one
//! dependency. Snapshots are built from a single discovery pass and
//! swapped in whole, so a reader never sees the hosts of one pass next to
//! the methods of another.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;
use zoorpc_common::{Argument, Invocation, Result, Value, ZoorpcError};
use zoorpc_registry::{Discovery, DiscoveryOutcome, ProviderFilter, RegistryClient};

use crate::config::{ClientConfig, DependencyConfig};
use crate::invoker::Invoker;

/// Everything about a dependency that goes into each invocation.
#[derive(Debug)]
struct Dependency {
    name: String,
    config: DependencyConfig,
    dubbo_version: String,
    application: Option<String>,
}

/// A callable method of a dependency.
#[derive(Debug, Clone)]
pub struct MethodBinding {
    method: String,
    dependency: Arc<Dependency>,
}

impl MethodBinding {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Builds the invocation context for one call.
    pub fn invocation(&self, arguments: Vec<Argument>) -> Invocation {
        let dep = &self.dependency;
        let mut invocation = Invocation::new(dep.config.interface.clone(), self.method.clone())
            .with_dubbo_version(dep.dubbo_version.clone())
            .with_version(dep.config.version.clone())
            .with_group(dep.config.group.clone())
            .with_timeout(dep.config.timeout_ms)
            .with_max_body_len(dep.config.max_body_len)
            .with_arguments(arguments);
        if let Some(application) = &dep.application {
            invocation = invocation.with_attachment("remote.application", application.clone());
        }
        invocation
    }
}

/// Hosts and methods from one discovery pass.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    pub hosts: Vec<String>,
    pub methods: BTreeMap<String, MethodBinding>,
    /// `None` until the first discovery pass completes
    pub outcome: Option<DiscoveryOutcome>,
}

impl ServiceSnapshot {
    fn empty() -> Self {
        Self {
            hosts: Vec::new(),
            methods: BTreeMap::new(),
            outcome: None,
        }
    }
}

pub struct ServiceProxy {
    dependency: Arc<Dependency>,
    registry: RegistryClient,
    snapshot: ArcSwap<ServiceSnapshot>,
    invoker: Invoker,
}

impl ServiceProxy {
    /// Creates a proxy with an empty snapshot.
    ///
    /// # Arguments
    ///
    /// * `name` - The dependency name used in configuration
    /// * `config` - Client-wide settings (protocol version, application)
    /// * `dependency` - The dependency's own settings
    /// * `registry` - Where to resolve providers on refresh
    pub fn new(
        name: impl Into<String>,
        config: &ClientConfig,
        dependency: DependencyConfig,
        registry: RegistryClient,
    ) -> Self {
        Self {
            dependency: Arc::new(Dependency {
                name: name.into(),
                config: dependency,
                dubbo_version: config.dubbo_version.clone(),
                application: config.application.clone(),
            }),
            registry,
            snapshot: ArcSwap::from_pointee(ServiceSnapshot::empty()),
            invoker: Invoker::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.dependency.name
    }

    pub fn interface(&self) -> &str {
        &self.dependency.config.interface
    }

    pub fn config(&self) -> &DependencyConfig {
        &self.dependency.config
    }

    pub fn filter(&self) -> ProviderFilter {
        self.dependency.config.filter()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<ServiceSnapshot> {
        self.snapshot.load_full()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.snapshot.load().hosts.clone()
    }

    /// Names of the currently callable methods, sorted.
    pub fn methods(&self) -> Vec<String> {
        self.snapshot.load().methods.keys().cloned().collect()
    }

    pub fn method(&self, name: &str) -> Option<MethodBinding> {
        self.snapshot.load().methods.get(name).cloned()
    }

    /// Replaces the snapshot with one built from `discovery`.
    pub fn apply(&self, discovery: Discovery) -> Arc<ServiceSnapshot> {
        let methods = discovery
            .methods
            .into_iter()
            .map(|method| {
                let binding = MethodBinding {
                    method: method.clone(),
                    dependency: self.dependency.clone(),
                };
                (method, binding)
            })
            .collect();

        let snapshot = Arc::new(ServiceSnapshot {
            hosts: discovery.hosts,
            methods,
            outcome: Some(discovery.outcome),
        });
        debug!(
            service = %self.dependency.name,
            hosts = snapshot.hosts.len(),
            methods = snapshot.methods.len(),
            "applied provider snapshot"
        );
        self.snapshot.store(snapshot.clone());
        snapshot
    }

    /// Resolves providers now and applies the result.
    pub async fn refresh(&self) -> Arc<ServiceSnapshot> {
        let discovery = self
            .registry
            .resolve(&self.dependency.config.interface, &self.filter())
            .await;
        self.apply(discovery)
    }

    /// Calls a discovered method.
    ///
    /// # Errors
    ///
    /// `NoProvider` when no host is known, `MethodNotFound` when the
    /// providers do not advertise `method`, otherwise whatever the
    /// invocation itself returns.
    pub async fn invoke(&self, method: &str, arguments: Vec<Argument>) -> Result<Value> {
        let snapshot = self.snapshot();
        if snapshot.hosts.is_empty() {
            return Err(ZoorpcError::NoProvider(self.dependency.config.interface.clone()));
        }

        let binding = snapshot
            .methods
            .get(method)
            .ok_or_else(|| ZoorpcError::MethodNotFound {
                interface: self.dependency.config.interface.clone(),
                method: method.to_string(),
            })?;

        self.invoker
            .invoke(self, binding.invocation(arguments), &snapshot.hosts)
            .await
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("name", &self.dependency.name)
            .field("interface", &self.dependency.config.interface)
            .field("hosts", &self.snapshot.load().hosts)
            .finish()
    }
}
