// Copyright 2025 zoorpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # zoorpc CLI
//!
//! Command-line access to services discovered through the registry.
//!
//! ## Key Commands
//!
//! - `zoorpc call`: Call a method and print the result as JSON
//! - `zoorpc providers`: Show the providers and methods of a dependency
//! - `zoorpc wait`: Wait for discovery to complete and summarize every dependency
//!
//! Every command reads the same JSON configuration file as the library.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use zoorpc_client::{Argument, ClientConfig, ServiceProxy, ZoorpcClient};

/// Load and validate a configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    ClientConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Connect to the registry and wait for the first discovery round
///
/// # Errors
///
/// Returns an error if the registry is unreachable or discovery does not
/// complete within `ready_timeout`.
pub async fn connect(config: ClientConfig, ready_timeout: Duration) -> Result<ZoorpcClient> {
    let client = ZoorpcClient::connect(config).await?;
    tokio::time::timeout(ready_timeout, client.ready())
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "service discovery did not complete within {}ms",
                ready_timeout.as_millis()
            )
        })?;
    Ok(client)
}

/// Parse call arguments given as a JSON array
///
/// Each element becomes one positional argument. Elements of the form
/// `{"$class": "java.lang.Long", "$": 5}` choose the Java parameter type.
pub fn parse_call_args(args: &str) -> Result<Vec<Argument>> {
    let value: serde_json::Value =
        serde_json::from_str(args).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| Argument::from_json(item).map_err(anyhow::Error::from))
            .collect(),
        other => Err(anyhow::anyhow!(
            "args must be a JSON array of positional arguments, got {}",
            other
        )),
    }
}

/// JSON summary of one dependency's current providers
pub fn service_summary(proxy: &ServiceProxy) -> serde_json::Value {
    let config = proxy.config();
    json!({
        "service": proxy.name(),
        "interface": config.interface,
        "version": config.version,
        "group": config.group,
        "hosts": proxy.hosts(),
        "methods": proxy.methods(),
    })
}

#[cfg(test)]
mod tests;
