//! In-process coordinator.
//!
//! Holds children per path in memory and fires watches on every change.
//! Nodes created through [`Coordinator::create`] follow ZooKeeper's rules:
//! the parent must exist and the path must not. The root always exists.
//! Used by tests, and by embedders that feed provider lists from somewhere
//! other than ZooKeeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use zoorpc_common::{Result, ZoorpcError};

use crate::coordinator::{ChildWatch, Coordinator, NodeKind};

#[derive(Default)]
struct PathState {
    /// `None` until the path is created
    children: Option<Vec<String>>,
    generation: Option<watch::Sender<u64>>,
    ephemeral: bool,
}

impl PathState {
    fn sender(&mut self) -> &watch::Sender<u64> {
        self.generation.get_or_insert_with(|| watch::channel(0).0)
    }

    fn bump(&mut self) {
        self.sender().send_modify(|g| *g += 1);
    }
}

#[derive(Default)]
pub struct MemoryCoordinator {
    paths: Mutex<HashMap<String, PathState>>,
    failure: Mutex<Option<String>>,
    listings: AtomicUsize,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_path<R>(&self, path: &str, f: impl FnOnce(&mut PathState) -> R) -> R {
        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        f(paths.entry(path.to_string()).or_default())
    }

    /// Replaces the children of `path`, creating it if needed.
    pub fn set_children<I, S>(&self, path: &str, children: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = children.into_iter().map(Into::into).collect();
        self.with_path(path, |state| {
            state.children = Some(children);
            state.bump();
        });
    }

    pub fn add_child(&self, path: &str, child: impl Into<String>) {
        let child = child.into();
        self.with_path(path, |state| {
            state.children.get_or_insert_with(Vec::new).push(child);
            state.bump();
        });
    }

    pub fn remove_child(&self, path: &str, child: &str) {
        self.with_path(path, |state| {
            if let Some(children) = state.children.as_mut() {
                children.retain(|c| c != child);
            }
            state.bump();
        });
    }

    /// Deletes `path`; later listings fail with `NoNode`.
    pub fn delete(&self, path: &str) {
        self.with_path(path, |state| {
            state.children = None;
            state.bump();
        });
    }

    /// Makes every listing fail until cleared with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = message.map(str::to_string);
    }

    /// Whether `path` was created as an ephemeral node and still exists.
    pub fn is_ephemeral(&self, path: &str) -> bool {
        let paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        paths
            .get(path)
            .is_some_and(|state| state.ephemeral && state.children.is_some())
    }

    /// Drops every ephemeral node, as ZooKeeper does when a session ends.
    pub fn expire_session(&self) {
        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = paths
            .iter()
            .filter(|(_, state)| state.ephemeral && state.children.is_some())
            .map(|(path, _)| path.clone())
            .collect();

        for path in expired {
            if let Some(state) = paths.get_mut(&path) {
                state.children = None;
                state.ephemeral = false;
                state.bump();
            }
            if let Some((parent, name)) = split_path(&path) {
                if let Some(children) = paths.get_mut(parent).and_then(|p| p.children.as_mut()) {
                    children.retain(|c| c != name);
                }
                if let Some(parent) = paths.get_mut(parent) {
                    parent.bump();
                }
            }
        }
    }

    fn injected_failure(&self, path: &str) -> Result<()> {
        match self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(message) => Err(ZoorpcError::Discovery {
                path: path.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    /// How many listings have been served, successful or not.
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn watch_children(&self, path: &str) -> Result<(Vec<String>, ChildWatch)> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.injected_failure(path)?;

        self.with_path(path, |state| -> Result<(Vec<String>, ChildWatch)> {
            let children = state
                .children
                .clone()
                .ok_or_else(|| ZoorpcError::NoNode(path.to_string()))?;
            let mut rx = state.sender().subscribe();
            let watch = ChildWatch::new(async move {
                let _ = rx.changed().await;
            });
            Ok((children, watch))
        })
    }

    async fn create(&self, path: &str, kind: NodeKind) -> Result<()> {
        self.injected_failure(path)?;
        let (parent, name) = split_path(path)
            .ok_or_else(|| ZoorpcError::InvalidRequest(format!("invalid node path '{}'", path)))?;

        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        if paths.get(path).is_some_and(|state| state.children.is_some()) {
            return Err(ZoorpcError::NodeExists(path.to_string()));
        }

        let parent_state = paths.entry(parent.to_string()).or_default();
        if parent_state.children.is_none() {
            if parent != "/" {
                return Err(ZoorpcError::NoNode(parent.to_string()));
            }
            parent_state.children = Some(Vec::new());
        }
        if let Some(children) = parent_state.children.as_mut() {
            children.push(name.to_string());
        }
        parent_state.bump();

        let state = paths.entry(path.to_string()).or_default();
        state.children = Some(Vec::new());
        state.ephemeral = kind == NodeKind::Ephemeral;
        state.bump();
        Ok(())
    }
}

/// Splits `/a/b/c` into `("/a/b", "c")` and `/a` into `("/", "a")`.
fn split_path(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once('/')?;
    if name.is_empty() || !path.starts_with('/') {
        return None;
    }
    Some((if parent.is_empty() { "/" } else { parent }, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PATH: &str = "/dubbo/com.example.Svc/providers";

    #[tokio::test]
    async fn test_missing_path_is_no_node() {
        let coordinator = MemoryCoordinator::new();
        let err = coordinator.children(PATH).await.unwrap_err();
        assert!(matches!(err, ZoorpcError::NoNode(p) if p == PATH));
    }

    #[tokio::test]
    async fn test_lists_children() {
        let coordinator = MemoryCoordinator::new();
        coordinator.set_children(PATH, ["a", "b"]);
        coordinator.add_child(PATH, "c");
        coordinator.remove_child(PATH, "a");
        assert_eq!(coordinator.children(PATH).await.unwrap(), vec!["b", "c"]);
        assert_eq!(coordinator.listings(), 1);
    }

    #[tokio::test]
    async fn test_watch_fires_on_change() {
        let coordinator = MemoryCoordinator::new();
        coordinator.set_children(PATH, ["a"]);

        let (_, watch) = coordinator.watch_children(PATH).await.unwrap();
        let fired = tokio::spawn(watch.changed());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!fired.is_finished());

        coordinator.add_child(PATH, "b");
        tokio::time::timeout(Duration::from_secs(1), fired)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let coordinator = MemoryCoordinator::new();
        coordinator.set_children(PATH, ["a"]);
        coordinator.set_failure(Some("session expired"));
        assert!(matches!(
            coordinator.children(PATH).await,
            Err(ZoorpcError::Discovery { .. })
        ));

        coordinator.set_failure(None);
        assert!(coordinator.children(PATH).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_follows_node_rules() {
        let coordinator = MemoryCoordinator::new();

        assert!(matches!(
            coordinator.create("/dubbo/svc", NodeKind::Persistent).await,
            Err(ZoorpcError::NoNode(p)) if p == "/dubbo"
        ));

        coordinator.create("/dubbo", NodeKind::Persistent).await.unwrap();
        coordinator.create("/dubbo/svc", NodeKind::Persistent).await.unwrap();
        assert!(matches!(
            coordinator.create("/dubbo/svc", NodeKind::Persistent).await,
            Err(ZoorpcError::NodeExists(_))
        ));

        coordinator.create("/dubbo/svc/node", NodeKind::Ephemeral).await.unwrap();
        assert_eq!(coordinator.children("/dubbo/svc").await.unwrap(), vec!["node"]);
        assert!(coordinator.is_ephemeral("/dubbo/svc/node"));
        assert!(!coordinator.is_ephemeral("/dubbo/svc"));

        assert!(matches!(
            coordinator.create("relative", NodeKind::Persistent).await,
            Err(ZoorpcError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_expire_session_drops_ephemeral_nodes() {
        let coordinator = MemoryCoordinator::new();
        coordinator.create("/consumers", NodeKind::Persistent).await.unwrap();
        coordinator.create("/consumers/me", NodeKind::Ephemeral).await.unwrap();

        let (_, watch) = coordinator.watch_children("/consumers").await.unwrap();
        coordinator.expire_session();

        tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap();
        assert!(coordinator.children("/consumers").await.unwrap().is_empty());
        assert!(!coordinator.is_ephemeral("/consumers/me"));
        assert!(matches!(
            coordinator.children("/consumers/me").await,
            Err(ZoorpcError::NoNode(_))
        ));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/a/b/c"), Some(("/a/b", "c")));
        assert_eq!(split_path("/a"), Some(("/", "a")));
        assert_eq!(split_path("/a/"), None);
        assert_eq!(split_path("a/b"), None);
    }
}
