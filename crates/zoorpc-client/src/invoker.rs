//! One call, start to finish.
//!
//! Each call is an explicit state machine over a fresh connection:
//!
//! ```text
//! Connecting -> Writing -> Reading -> Complete
//!      \            \          \
//!       +------------+----------+--> Failed
//! ```
//!
//! A failure before the provider could have seen the request (connect,
//! write, or a close before any response byte) triggers exactly one
//! registry refresh and one retry against a newly picked host. Everything
//! else, and any failure of the retry, ends the call.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{error, warn};
use zoorpc_common::transport::{DubboCodec, FrameTransport};
use zoorpc_common::{Invocation, Request, Result, Value, ZoorpcError};

use crate::proxy::ServiceProxy;
use crate::selector::RandomSelector;

enum CallState {
    Connecting { host: String },
    Writing { host: String, stream: TcpStream },
    Reading { host: String, stream: TcpStream },
    Complete { host: String, frame: Vec<u8> },
    Failed(ZoorpcError),
}

/// Connect budget per attempt: half the whole-call timeout.
fn connect_timeout(call_timeout_ms: u64) -> Duration {
    Duration::from_millis((call_timeout_ms / 2).max(1))
}

#[derive(Debug, Clone, Default)]
pub struct Invoker {
    selector: RandomSelector,
}

impl Invoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends one invocation and waits for its result.
    ///
    /// # Arguments
    ///
    /// * `proxy` - The dependency's proxy, refreshed on failover
    /// * `invocation` - The call to make
    /// * `hosts` - Providers to pick the first attempt's host from
    ///
    /// # Returns
    ///
    /// The decoded return value
    ///
    /// # Errors
    ///
    /// `Timeout` when the whole call, failover included, outlives the
    /// invocation's timeout. The connection is dropped with the call.
    pub async fn invoke(
        &self,
        proxy: &ServiceProxy,
        invocation: Invocation,
        hosts: &[String],
    ) -> Result<Value> {
        let timeout_ms = invocation.timeout_ms;
        let request = Request::new(invocation);

        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.run(proxy, &request, hosts))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    service = %proxy.name(),
                    method = %request.invocation.method,
                    timeout_ms,
                    "call timed out"
                );
                Err(ZoorpcError::Timeout(timeout_ms))
            }
        }
    }

    async fn run(&self, proxy: &ServiceProxy, request: &Request, hosts: &[String]) -> Result<Value> {
        let frame = DubboCodec::encode_request(request)?;
        let transport = FrameTransport::new(request.invocation.max_body_len)
            .with_connect_timeout(connect_timeout(request.invocation.timeout_ms));
        let mut refreshed = false;

        let mut state = self.pick(proxy, hosts);

        loop {
            state = match state {
                CallState::Connecting { host } => match transport.connect(&host).await {
                    Ok(stream) => CallState::Writing { host, stream },
                    Err(e) => self.failover(proxy, &host, e, &mut refreshed).await,
                },
                CallState::Writing { host, mut stream } => {
                    match transport.send_frame(&mut stream, &frame).await {
                        Ok(()) => CallState::Reading { host, stream },
                        Err(e) => self.failover(proxy, &host, e, &mut refreshed).await,
                    }
                }
                CallState::Reading { host, mut stream } => {
                    match transport.receive_frame(&mut stream).await {
                        Ok(frame) => CallState::Complete { host, frame },
                        Err(e) if e.is_failover_eligible() => {
                            self.failover(proxy, &host, e, &mut refreshed).await
                        }
                        Err(e) => CallState::Failed(e),
                    }
                }
                CallState::Complete { host, frame } => {
                    return Self::finish(proxy, request, &host, &frame);
                }
                CallState::Failed(e) => return Err(e),
            };
        }
    }

    fn pick(&self, proxy: &ServiceProxy, hosts: &[String]) -> CallState {
        match self.selector.select(hosts) {
            Some(host) => CallState::Connecting {
                host: host.to_string(),
            },
            None => CallState::Failed(ZoorpcError::NoProvider(proxy.interface().to_string())),
        }
    }

    async fn failover(
        &self,
        proxy: &ServiceProxy,
        host: &str,
        err: ZoorpcError,
        refreshed: &mut bool,
    ) -> CallState {
        if *refreshed {
            error!(service = %proxy.name(), host = %host, error = %err, "retry after failover failed");
            return CallState::Failed(err);
        }
        *refreshed = true;

        warn!(service = %proxy.name(), host = %host, error = %err, "provider unreachable, refreshing providers");
        let snapshot = proxy.refresh().await;
        self.pick(proxy, &snapshot.hosts)
    }

    fn finish(proxy: &ServiceProxy, request: &Request, host: &str, frame: &[u8]) -> Result<Value> {
        let response = DubboCodec::decode_response(frame).inspect_err(|e| {
            error!(service = %proxy.name(), host = %host, error = %e, "failed to decode response");
        })?;

        if response.id != request.id {
            error!(
                service = %proxy.name(),
                host = %host,
                expected = request.id,
                received = response.id,
                "response id mismatch"
            );
            return Err(ZoorpcError::InvalidResponse(format!(
                "expected response to request {}, got {}",
                request.id, response.id
            )));
        }

        response.into_result()
    }
}
