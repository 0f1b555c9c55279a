//! Transport layer: frame layout, codec and TCP transport.
//!
//! - **[`frame`]**: 16-byte header parsing and incremental frame assembly
//! - **[`DubboCodec`]**: request/response frames with hessian2 bodies
//! - **[`FrameTransport`]**: one-shot TCP connections carrying one frame each way

pub mod codec;
pub mod frame;
pub mod tcp;

pub use codec::DubboCodec;
pub use frame::{body_length, FrameAccumulator, FrameHeader, HEADER_LENGTH};
pub use tcp::FrameTransport;

#[cfg(test)]
mod tests;
