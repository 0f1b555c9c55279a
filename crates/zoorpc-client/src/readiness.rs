use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::info;

/// One-time signal that every dependency finished its first discovery pass.
///
/// Later passes of a dependency that already counted change nothing, and
/// names outside the configured set are ignored. With no dependencies the
/// signal is ready from the start.
pub struct ReadinessTracker {
    expected: HashSet<String>,
    completed: Mutex<HashSet<String>>,
    fired: AtomicBool,
    ready: watch::Sender<bool>,
}

impl ReadinessTracker {
    pub fn new<I, S>(dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expected: HashSet<String> = dependencies.into_iter().map(Into::into).collect();
        let tracker = Self {
            completed: Mutex::new(HashSet::new()),
            fired: AtomicBool::new(false),
            ready: watch::channel(false).0,
            expected,
        };
        if tracker.expected.is_empty() {
            tracker.fire();
        }
        tracker
    }

    pub fn total(&self) -> usize {
        self.expected.len()
    }

    pub fn completed(&self) -> usize {
        self.completed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Records that `dependency` completed a discovery pass.
    ///
    /// # Returns
    ///
    /// `true` only for the call that made the tracker ready
    pub fn mark_discovered(&self, dependency: &str) -> bool {
        if !self.expected.contains(dependency) {
            return false;
        }

        let done = {
            let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
            completed.insert(dependency.to_string());
            completed.len() == self.expected.len()
        };

        done && self.fire()
    }

    fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(dependencies = self.expected.len(), "service discovery complete");
        self.ready.send_replace(true);
        true
    }

    pub fn is_ready(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Waits until the tracker is ready; returns at once if it already is.
    pub async fn wait(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_dependencies_ready_immediately() {
        let tracker = ReadinessTracker::new(Vec::<String>::new());
        assert!(tracker.is_ready());
        tokio::time::timeout(Duration::from_millis(100), tracker.wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_single_dependency() {
        let tracker = ReadinessTracker::new(["users"]);
        assert!(!tracker.is_ready());
        assert!(tracker.mark_discovered("users"));
        assert!(tracker.is_ready());
        assert!(!tracker.mark_discovered("users"));
    }

    #[test]
    fn test_fires_once_after_all_distinct() {
        let names = ["a", "b", "c", "d", "e"];
        let tracker = ReadinessTracker::new(names);

        // repeats of the same dependency do not count twice
        for _ in 0..3 {
            assert!(!tracker.mark_discovered("a"));
        }
        assert!(!tracker.mark_discovered("unknown"));
        for name in &names[1..4] {
            assert!(!tracker.mark_discovered(name));
        }
        assert_eq!(tracker.completed(), 4);
        assert!(!tracker.is_ready());

        assert!(tracker.mark_discovered("e"));
        assert_eq!(
            names.iter().filter(|n| tracker.mark_discovered(n)).count(),
            0
        );
        assert!(tracker.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_marks_fire_exactly_once() {
        let names: Vec<String> = (0..16).map(|i| format!("svc{}", i)).collect();
        let tracker = Arc::new(ReadinessTracker::new(names.clone()));

        let mut handles = Vec::new();
        for name in names.iter().chain(names.iter()).cloned() {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move { tracker.mark_discovered(&name) }));
        }

        let mut fired = 0;
        for handle in handles {
            if handle.await.unwrap() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn test_wait_resolves_when_ready() {
        let tracker = Arc::new(ReadinessTracker::new(["users"]));
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tracker.mark_discovered("users");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
