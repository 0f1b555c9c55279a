use thiserror::Error;

use super::value::Value;

#[derive(Error, Debug)]
pub enum ZoorpcError {
    #[error("Discovery error for {path}: {message}")]
    Discovery { path: String, message: String },

    #[error("Registry path does not exist: {0}")]
    NoNode(String),

    #[error("Registry path already exists: {0}")]
    NodeExists(String),

    #[error("No available provider for {0}")]
    NoProvider(String),

    #[error("Method {method} is not exposed by {interface}")]
    MethodNotFound { interface: String, method: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed after {received} response bytes")]
    ConnectionClosed { received: usize },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Remote fault: {message}")]
    RemoteFault {
        class: Option<String>,
        message: String,
        payload: Value,
    },

    #[error("Remote returned status {status}: {message}")]
    RemoteStatus { status: u8, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl ZoorpcError {
    /// Whether this failure happened before the provider saw the request.
    ///
    /// Only these errors are eligible for the single refresh-and-retry:
    /// establishing the socket, writing the frame, or the peer closing
    /// before a single response byte arrived.
    pub fn is_failover_eligible(&self) -> bool {
        matches!(
            self,
            ZoorpcError::Connection(_) | ZoorpcError::ConnectionClosed { received: 0 }
        )
    }
}

pub type Result<T> = std::result::Result<T, ZoorpcError>;
