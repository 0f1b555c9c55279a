use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::error::{Result, ZoorpcError};
use crate::transport::frame::FrameAccumulator;

/// Size of each socket read while assembling a response.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Async TCP transport for single-request connections.
///
/// Each call opens a fresh connection, writes one request frame, reads
/// exactly one response frame and shuts the connection down. Nothing is
/// pooled or kept alive.
///
/// # Example
///
/// ```no_run
/// use zoorpc_common::protocol::{Invocation, Request};
/// use zoorpc_common::transport::{DubboCodec, FrameTransport};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = FrameTransport::new(8 * 1024 * 1024);
/// let mut stream = transport.connect("127.0.0.1:20880").await?;
///
/// let request = Request::new(Invocation::new("com.example.Greeter", "greet"));
/// transport.send_frame(&mut stream, &DubboCodec::encode_request(&request)?).await?;
/// let frame = transport.receive_frame(&mut stream).await?;
/// let value = DubboCodec::decode(&frame)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FrameTransport {
    max_body_len: usize,
    connect_timeout: Option<Duration>,
}

impl FrameTransport {
    pub fn new(max_body_len: usize) -> Self {
        Self {
            max_body_len,
            connect_timeout: None,
        }
    }

    /// Bounds connection establishment. Expiry is reported as `Connection`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Connects to a provider.
    ///
    /// # Arguments
    ///
    /// * `addr` - `host:port` of the provider
    ///
    /// # Errors
    ///
    /// Every failure is reported as `Connection`, which makes it eligible
    /// for failover.
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        let connect = TcpStream::connect(addr);
        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                ZoorpcError::Connection(format!(
                    "Timed out connecting to {} after {}ms",
                    addr,
                    limit.as_millis()
                ))
            })?,
            None => connect.await,
        };

        let stream = result
            .map_err(|e| ZoorpcError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();
        tracing::debug!(addr = %addr, "connected to provider");
        Ok(stream)
    }

    /// Writes one complete frame.
    ///
    /// # Errors
    ///
    /// `Connection` when the write or flush fails.
    pub async fn send_frame(&self, stream: &mut TcpStream, frame: &[u8]) -> Result<()> {
        stream
            .write_all(frame)
            .await
            .map_err(|e| Self::map_io_error(e, "writing frame"))?;

        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads until one complete response frame has arrived.
    ///
    /// # Returns
    ///
    /// The frame bytes, header included
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` with the number of bytes seen when the peer
    /// closes early, `PayloadTooLarge` when the declared body is over the
    /// limit, `InvalidResponse` on a bad header.
    pub async fn receive_frame(&self, stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut accumulator = FrameAccumulator::new(self.max_body_len);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = stream.read(&mut chunk).await.map_err(|e| {
                // a reset is a close as far as the caller is concerned
                if is_disconnect(&e) {
                    ZoorpcError::ConnectionClosed {
                        received: accumulator.received(),
                    }
                } else {
                    ZoorpcError::Io(e)
                }
            })?;

            if n == 0 {
                return Err(ZoorpcError::ConnectionClosed {
                    received: accumulator.received(),
                });
            }

            let pushed = accumulator.push(&chunk[..n]).inspect_err(|e| {
                tracing::error!(error = %e, received = accumulator.received(), "malformed response frame");
            });
            if let Some(frame) = pushed? {
                let _ = stream.shutdown().await;
                return Ok(frame);
            }
        }
    }

    fn map_io_error(err: std::io::Error, context: &str) -> ZoorpcError {
        ZoorpcError::Connection(format!("{}: {}", context, err))
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = FrameTransport::new(1024);
        let err = transport.connect(&addr).await.unwrap_err();
        assert!(matches!(err, ZoorpcError::Connection(_)));
        assert!(err.is_failover_eligible());
    }

    #[tokio::test]
    async fn test_invalid_address_is_connection_error() {
        let transport = FrameTransport::new(1024);
        let err = transport.connect("not an address").await.unwrap_err();
        assert!(matches!(err, ZoorpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_timeout_is_connection_error() {
        // non-routable: either times out or is rejected as unreachable
        let transport = FrameTransport::new(1024).with_connect_timeout(Duration::from_millis(50));
        let started = std::time::Instant::now();
        let err = transport.connect("10.255.255.1:20880").await.unwrap_err();

        assert!(matches!(err, ZoorpcError::Connection(_)));
        assert!(err.is_failover_eligible());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
