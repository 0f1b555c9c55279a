use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use zoorpc_common::{Result, ZoorpcError};

use crate::consumer::ConsumerDescriptor;
use crate::coordinator::{ChildWatch, Coordinator, NodeKind};
use crate::provider::{ProviderDescriptor, ProviderFilter};

pub const DEFAULT_ROOT: &str = "dubbo";

/// How a discovery pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// At least one provider matched
    Found,
    /// The providers path exists but has no children
    NoProviders,
    /// Providers exist but none carry the requested version and group
    Unmatched { skipped: usize },
    /// Listing failed, including a missing path
    Failed(String),
}

/// The result of one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// `host:port` of every matching provider, first-seen order, no duplicates
    pub hosts: Vec<String>,
    /// Union of the methods the matching providers advertise
    pub methods: BTreeSet<String>,
    pub outcome: DiscoveryOutcome,
}

impl Discovery {
    fn empty(outcome: DiscoveryOutcome) -> Self {
        Self {
            hosts: Vec::new(),
            methods: BTreeSet::new(),
            outcome,
        }
    }
}

/// Resolves interfaces to provider addresses.
///
/// The registry client never fails: every problem is logged and turned
/// into an empty [`Discovery`] with the matching [`DiscoveryOutcome`].
#[derive(Clone)]
pub struct RegistryClient {
    coordinator: Arc<dyn Coordinator>,
    root: String,
}

impl RegistryClient {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            coordinator,
            root: DEFAULT_ROOT.to_string(),
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into().trim_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Registry path holding the providers of an interface.
    pub fn providers_path(&self, interface: &str) -> String {
        format!("/{}/{}/providers", self.root, interface)
    }

    /// Registry path holding the consumers of an interface.
    pub fn consumers_path(&self, interface: &str) -> String {
        format!("/{}/{}/consumers", self.root, interface)
    }

    /// Publishes an ephemeral consumer node.
    ///
    /// Missing parents are created as persistent nodes. A node that already
    /// exists counts as registered.
    ///
    /// # Returns
    ///
    /// The full path of the consumer node
    pub async fn register_consumer(&self, consumer: &ConsumerDescriptor) -> Result<String> {
        let parent = self.consumers_path(&consumer.interface);
        self.ensure_path(&parent).await?;

        let path = format!("{}/{}", parent, consumer.node_name()?);
        match self.coordinator.create(&path, NodeKind::Ephemeral).await {
            Ok(()) | Err(ZoorpcError::NodeExists(_)) => {
                info!(interface = %consumer.interface, host = %consumer.host, "registered consumer");
                Ok(path)
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_path(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            match self.coordinator.create(&current, NodeKind::Persistent).await {
                Ok(()) | Err(ZoorpcError::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Runs one discovery pass without arming a watch.
    ///
    /// # Arguments
    ///
    /// * `interface` - Fully qualified interface name
    /// * `filter` - Version and group the providers must carry
    pub async fn resolve(&self, interface: &str, filter: &ProviderFilter) -> Discovery {
        let path = self.providers_path(interface);
        let listing = self.coordinator.children(&path).await;
        match listing {
            Ok(children) => Self::collect(interface, &children, filter),
            Err(e) => Self::failed(interface, &path, e),
        }
    }

    /// Runs one discovery pass and arms a watch on the providers path.
    ///
    /// The watch is `None` when listing failed, since nothing can be
    /// watched on a path that could not be read.
    pub async fn resolve_and_watch(
        &self,
        interface: &str,
        filter: &ProviderFilter,
    ) -> (Discovery, Option<ChildWatch>) {
        let path = self.providers_path(interface);
        match self.coordinator.watch_children(&path).await {
            Ok((children, watch)) => (Self::collect(interface, &children, filter), Some(watch)),
            Err(e) => (Self::failed(interface, &path, e), None),
        }
    }

    fn failed(interface: &str, path: &str, err: ZoorpcError) -> Discovery {
        error!(interface = %interface, path = %path, error = %err, "provider discovery failed");
        Discovery::empty(DiscoveryOutcome::Failed(err.to_string()))
    }

    fn collect(interface: &str, children: &[String], filter: &ProviderFilter) -> Discovery {
        if children.is_empty() {
            warn!(interface = %interface, "no providers registered");
            return Discovery::empty(DiscoveryOutcome::NoProviders);
        }

        let mut hosts: Vec<String> = Vec::new();
        let mut methods = BTreeSet::new();
        let mut skipped = 0;

        for child in children {
            let provider = match ProviderDescriptor::parse(child) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(interface = %interface, node = %child, error = %e, "skipping unparsable provider node");
                    continue;
                }
            };

            if !filter.matches(&provider) {
                debug!(
                    interface = %interface,
                    provider = %provider.address(),
                    version = ?provider.version,
                    group = ?provider.group,
                    "skipping provider with different version or group"
                );
                skipped += 1;
                continue;
            }

            let address = provider.address();
            if !hosts.contains(&address) {
                hosts.push(address);
            }
            methods.extend(provider.methods);
        }

        if hosts.is_empty() {
            if skipped > 0 {
                warn!(
                    interface = %interface,
                    skipped,
                    version = ?filter.version,
                    group = ?filter.group,
                    "no provider matches the requested version and group"
                );
                return Discovery::empty(DiscoveryOutcome::Unmatched { skipped });
            }
            warn!(interface = %interface, "no usable provider nodes");
            return Discovery::empty(DiscoveryOutcome::NoProviders);
        }

        info!(
            interface = %interface,
            hosts = hosts.len(),
            methods = methods.len(),
            "discovered providers"
        );
        Discovery {
            hosts,
            methods,
            outcome: DiscoveryOutcome::Found,
        }
    }
}

/// Keeps one interface's provider set up to date.
///
/// Each round lists and watches the providers path, hands the result to
/// the sink, then waits for the watch to fire. When listing fails there is
/// no watch to wait on, so the next round starts after `retry_interval`.
pub struct Subscription {
    registry: RegistryClient,
    interface: String,
    filter: ProviderFilter,
    retry_interval: Duration,
}

impl Subscription {
    pub fn new(
        registry: RegistryClient,
        interface: impl Into<String>,
        filter: ProviderFilter,
        retry_interval: Duration,
    ) -> Self {
        Self {
            registry,
            interface: interface.into(),
            filter,
            retry_interval,
        }
    }

    /// Starts the subscription task.
    pub fn spawn<F>(self, sink: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(Discovery) + Send + 'static,
    {
        tokio::spawn(async move {
            self.run(sink).await;
        })
    }

    /// Main subscription loop
    async fn run<F>(self, mut sink: F)
    where
        F: FnMut(Discovery) + Send + 'static,
    {
        loop {
            let (discovery, watch) = self
                .registry
                .resolve_and_watch(&self.interface, &self.filter)
                .await;
            sink(discovery);

            match watch {
                Some(watch) => {
                    watch.changed().await;
                    debug!(interface = %self.interface, "providers changed, re-listing");
                }
                None => tokio::time::sleep(self.retry_interval).await,
            }
        }
    }
}
