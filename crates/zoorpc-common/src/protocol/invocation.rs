//! Invocation context and request types.
//!
//! An [`Invocation`] holds everything needed to encode one call: the
//! dependency identity, the method and its arguments, and the attachments
//! sent alongside. It is built once per call and shared between the first
//! attempt and the failover attempt.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::value::Argument;

pub type RequestId = u64;

/// Protocol version written when none is configured.
pub const DEFAULT_DUBBO_VERSION: &str = "2.5.3.6";

pub const DEFAULT_TIMEOUT_MS: u64 = 6000;

/// Largest frame body accepted or produced by default (8 MiB).
pub const DEFAULT_MAX_BODY_LEN: usize = 8 * 1024 * 1024;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub dubbo_version: String,
    pub interface: String,
    pub version: Option<String>,
    pub group: Option<String>,
    pub method: String,
    pub timeout_ms: u64,
    pub max_body_len: usize,
    pub arguments: Vec<Argument>,
    /// Extra attachments, merged after the standard ones
    pub attachments: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(interface: impl Into<String>, method: impl Into<String>) -> Self {
        Invocation {
            dubbo_version: DEFAULT_DUBBO_VERSION.to_string(),
            interface: interface.into(),
            version: None,
            group: None,
            method: method.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            arguments: Vec::new(),
            attachments: BTreeMap::new(),
        }
    }

    pub fn with_dubbo_version(mut self, dubbo_version: impl Into<String>) -> Self {
        self.dubbo_version = dubbo_version.into();
        self
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version.filter(|v| !v.is_empty());
        self
    }

    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group.filter(|g| !g.is_empty());
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

    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    /// Concatenated JVM descriptors of all arguments.
    pub fn parameter_descriptors(&self) -> String {
        self.arguments
            .iter()
            .map(|arg| arg.descriptor.as_str())
            .collect()
    }

    /// The attachments map as written on the wire.
    ///
    /// `path`, `interface` and `timeout` are always present; `version` and
    /// `group` only when set. Caller supplied attachments come last and
    /// may override the standard keys.
    pub fn wire_attachments(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("path".to_string(), self.interface.clone());
        map.insert("interface".to_string(), self.interface.clone());
        map.insert("timeout".to_string(), self.timeout_ms.to_string());
        if let Some(version) = &self.version {
            map.insert("version".to_string(), version.clone());
        }
        if let Some(group) = &self.group {
            map.insert("group".to_string(), group.clone());
        }
        for (key, value) in &self.attachments {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

/// A two-way call on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub invocation: Invocation,
}

impl Request {
    pub fn new(invocation: Invocation) -> Self {
        Request {
            id: generate_request_id(),
            invocation,
        }
    }

    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }
}

fn generate_request_id() -> RequestId {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}
