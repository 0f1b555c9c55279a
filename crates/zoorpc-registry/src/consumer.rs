//! Consumer records published for governance tooling.
//!
//! A client announces itself per interface with an ephemeral child of
//! `/{root}/{interface}/consumers`, named like provider nodes: a
//! percent-encoded URL such as
//! `consumer://10.0.0.9/com.example.UserService?application=billing&category=consumers&side=consumer`.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;
use zoorpc_common::{Result, ZoorpcError, DEFAULT_DUBBO_VERSION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerDescriptor {
    pub host: String,
    pub interface: String,
    pub application: Option<String>,
    pub dubbo_version: String,
    pub version: Option<String>,
    pub group: Option<String>,
    pub pid: u32,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl ConsumerDescriptor {
    pub fn new(host: impl Into<String>, interface: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            host: host.into(),
            interface: interface.into(),
            application: None,
            dubbo_version: DEFAULT_DUBBO_VERSION.to_string(),
            version: None,
            group: None,
            pid: std::process::id(),
            timestamp,
        }
    }

    pub fn with_application(mut self, application: Option<String>) -> Self {
        self.application = application.filter(|a| !a.is_empty());
        self
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

    /// The consumer URL, parameters in a fixed order.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when host and interface do not form a valid URL.
    pub fn to_url(&self) -> Result<Url> {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let mut url = Url::parse(&format!("consumer://{}/{}", host, self.interface))
            .map_err(|e| ZoorpcError::InvalidRequest(format!("invalid consumer URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(application) = &self.application {
                query.append_pair("application", application);
            }
            query
                .append_pair("category", "consumers")
                .append_pair("check", "false")
                .append_pair("dubbo", &self.dubbo_version);
            if let Some(group) = &self.group {
                query.append_pair("group", group);
            }
            query
                .append_pair("interface", &self.interface)
                .append_pair("pid", &self.pid.to_string())
                .append_pair("side", "consumer")
                .append_pair("timestamp", &self.timestamp.to_string());
            if let Some(version) = &self.version {
                query.append_pair("version", version);
            }
        }

        Ok(url)
    }

    /// The registry child name: the URL, percent-encoded.
    pub fn node_name(&self) -> Result<String> {
        Ok(urlencoding::encode(self.to_url()?.as_str()).into_owned())
    }
}

/// The local address used to reach the first host of a connection string.
///
/// Falls back to `127.0.0.1` when the address cannot be determined. No
/// packet is sent.
pub async fn local_address(connect_string: &str) -> IpAddr {
    let trimmed = connect_string.trim();
    let target = trimmed
        .strip_prefix("zookeeper://")
        .unwrap_or(trimmed)
        .split([',', '/', '?'])
        .next()
        .unwrap_or_default();

    match probe_local_address(target).await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::debug!(target = %target, error = %e, "could not determine local address");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

async fn probe_local_address(target: &str) -> std::io::Result<IpAddr> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(target).await?;
    Ok(socket.local_addr()?.ip())
}
