//! The coordination service seen by the registry.
//!
//! Discovery needs two capabilities: list the children of a path, and be
//! told once when that list changes. Watches are one-shot, as in
//! ZooKeeper; a caller that wants to keep following a path re-lists and
//! re-arms after every notification. Consumer registration additionally
//! creates nodes.

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use zoorpc_common::Result;

/// A one-shot notification that the children of a path changed.
pub struct ChildWatch {
    fired: BoxFuture<'static, ()>,
}

impl ChildWatch {
    pub fn new<F>(fired: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            fired: fired.boxed(),
        }
    }

    /// A watch that never fires.
    pub fn pending() -> Self {
        Self::new(futures::future::pending())
    }

    /// Waits until the watched children change.
    pub async fn changed(self) {
        self.fired.await
    }
}

impl fmt::Debug for ChildWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChildWatch")
    }
}

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Outlives the session that created it
    Persistent,
    /// Removed by the coordination service when the session ends
    Ephemeral,
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Lists the children of `path` and arms a watch on them.
    ///
    /// # Errors
    ///
    /// `NoNode` when the path does not exist, `Discovery` for any other
    /// failure of the coordination service.
    async fn watch_children(&self, path: &str) -> Result<(Vec<String>, ChildWatch)>;

    /// Lists the children of `path` without watching.
    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let (children, _watch) = self.watch_children(path).await?;
        Ok(children)
    }

    /// Creates `path` with empty data.
    ///
    /// # Errors
    ///
    /// `NodeExists` when the path already exists, `NoNode` when its parent
    /// does not, `Discovery` for any other failure.
    async fn create(&self, path: &str, kind: NodeKind) -> Result<()>;
}
