//! zoorpc common types and transport
//!
//! Shared protocol definitions and the wire transport used by the zoorpc
//! client and registry crates.
//!
//! # Wire format
//!
//! - **Transport**: TCP, one connection per call
//! - **Framing**: 16-byte header (magic `0xdabb`, flags, status, request
//!   id, body length) followed by the body
//! - **Serialization**: hessian2
//!
//! # Components
//!
//! - [`protocol`] - values, invocations, responses and the error type
//! - [`transport`] - frame codec and TCP transport
//!
//! # Example
//!
//! ```
//! use zoorpc_common::{Argument, Invocation, Request};
//! use zoorpc_common::transport::DubboCodec;
//!
//! let invocation = Invocation::new("com.example.UserService", "findUser")
//!     .with_version(Some("1.0.0".to_string()))
//!     .with_arguments(vec![Argument::new(42i64)]);
//! let frame = DubboCodec::encode_request(&Request::new(invocation)).unwrap();
//! assert!(frame.len() > 16);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
