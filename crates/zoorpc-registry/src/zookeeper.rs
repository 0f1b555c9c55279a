//! ZooKeeper binding for [`Coordinator`].

use async_trait::async_trait;
use zoorpc_common::{Result, ZoorpcError};

use crate::coordinator::{ChildWatch, Coordinator, NodeKind};

/// Coordinator backed by a ZooKeeper session.
#[derive(Clone)]
pub struct ZkCoordinator {
    client: zookeeper_client::Client,
}

impl ZkCoordinator {
    /// Opens a session.
    ///
    /// # Arguments
    ///
    /// * `connect_string` - `host:port[,host:port...]`, optionally prefixed
    ///   with `zookeeper://`
    pub async fn connect(connect_string: &str) -> Result<Self> {
        let cluster = normalize_connect_string(connect_string);
        let client = zookeeper_client::Client::connect(&cluster)
            .await
            .map_err(|e| {
                ZoorpcError::Connection(format!("Failed to connect to registry {}: {}", cluster, e))
            })?;
        tracing::info!(registry = %cluster, "connected to registry");
        Ok(Self { client })
    }
}

#[async_trait]
impl Coordinator for ZkCoordinator {
    async fn watch_children(&self, path: &str) -> Result<(Vec<String>, ChildWatch)> {
        match self.client.get_and_watch_children(path).await {
            Ok((children, _stat, watcher)) => {
                let watch = ChildWatch::new(async move {
                    let event = watcher.changed().await;
                    tracing::debug!(?event, "children watch fired");
                });
                Ok((children, watch))
            }
            Err(e) => Err(map_error(path, e)),
        }
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.client
            .get_children(path)
            .await
            .map(|(children, _stat)| children)
            .map_err(|e| map_error(path, e))
    }

    async fn create(&self, path: &str, kind: NodeKind) -> Result<()> {
        let mode = match kind {
            NodeKind::Persistent => zookeeper_client::CreateMode::Persistent,
            NodeKind::Ephemeral => zookeeper_client::CreateMode::Ephemeral,
        };
        let options = mode.with_acls(zookeeper_client::Acls::anyone_all());
        self.client
            .create(path, &[], &options)
            .await
            .map(|_| ())
            .map_err(|e| map_error(path, e))
    }
}

fn map_error(path: &str, err: zookeeper_client::Error) -> ZoorpcError {
    match err {
        zookeeper_client::Error::NoNode => ZoorpcError::NoNode(path.to_string()),
        zookeeper_client::Error::NodeExists => ZoorpcError::NodeExists(path.to_string()),
        e => ZoorpcError::Discovery {
            path: path.to_string(),
            message: e.to_string(),
        },
    }
}

/// Strips a `zookeeper://` scheme and any trailing path or query.
pub fn normalize_connect_string(connect_string: &str) -> String {
    let trimmed = connect_string.trim();
    let without_scheme = trimmed.strip_prefix("zookeeper://").unwrap_or(trimmed);
    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or_default()
        .to_string()
}
