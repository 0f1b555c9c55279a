//! Provider records as published in the registry.
//!
//! Each child of `/{root}/{interface}/providers` is a percent-encoded URL:
//!
//! ```text
//! dubbo%3A%2F%2F10.0.0.5%3A20880%2Fcom.example.UserService%3Fmethods%3DfindUser%2CsaveUser%26version%3D1.0.0
//! ```
//!
//! which decodes to
//! `dubbo://10.0.0.5:20880/com.example.UserService?methods=findUser,saveUser&version=1.0.0`.

use std::collections::BTreeMap;

use url::Url;
use zoorpc_common::{Result, ZoorpcError};

/// One decoded provider node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Interface path, without the leading slash
    pub path: String,
    pub version: Option<String>,
    pub group: Option<String>,
    pub methods: Vec<String>,
    /// Every query parameter, including the ones lifted into fields above
    pub params: BTreeMap<String, String>,
}

impl ProviderDescriptor {
    /// Parses a registry child name.
    ///
    /// # Errors
    ///
    /// `Discovery` when the name is not valid percent-encoding, not a URL,
    /// or has no host and port.
    pub fn parse(node_name: &str) -> Result<Self> {
        let invalid = |message: String| ZoorpcError::Discovery {
            path: node_name.to_string(),
            message,
        };

        let decoded = urlencoding::decode(node_name)
            .map_err(|e| invalid(format!("invalid percent-encoding: {}", e)))?;
        let url = Url::parse(&decoded).map_err(|e| invalid(format!("invalid provider URL: {}", e)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("provider URL has no host".to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("provider URL has no port".to_string()))?;

        let params: BTreeMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let methods = params
            .get("methods")
            .map(|m| {
                m.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ProviderDescriptor {
            scheme: url.scheme().to_string(),
            host,
            port,
            path: url.path().trim_start_matches('/').to_string(),
            version: non_empty(params.get("version")),
            group: non_empty(params.get("group")),
            methods,
            params,
        })
    }

    /// `host:port`, ready to connect to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// The version and group a dependency is bound to.
///
/// Matching is exact. An absent value and an empty string are the same
/// value, and there are no wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFilter {
    pub version: Option<String>,
    pub group: Option<String>,
}

impl ProviderFilter {
    pub fn new(version: Option<String>, group: Option<String>) -> Self {
        Self {
            version: version.filter(|v| !v.is_empty()),
            group: group.filter(|g| !g.is_empty()),
        }
    }

    pub fn matches(&self, provider: &ProviderDescriptor) -> bool {
        normalize(&self.version) == normalize(&provider.version)
            && normalize(&self.group) == normalize(&provider.group)
    }
}

fn normalize(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}
