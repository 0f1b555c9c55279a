//! Frame header layout and incremental frame assembly.
//!
//! ```text
//! 0      2      3        4                  12              16
//! +------+------+--------+------------------+---------------+----------
//! | dabb | flag | status |  request id (BE) | body len (BE) | body ...
//! +------+------+--------+------------------+---------------+----------
//! ```

use crate::protocol::error::{Result, ZoorpcError};
use crate::protocol::invocation::RequestId;

pub const HEADER_LENGTH: usize = 16;
pub const MAGIC: u16 = 0xdabb;

pub const FLAG_REQUEST: u8 = 0x80;
pub const FLAG_TWO_WAY: u8 = 0x40;
pub const FLAG_EVENT: u8 = 0x20;
pub const SERIALIZATION_MASK: u8 = 0x1f;
pub const HESSIAN2_SERIALIZATION_ID: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flag: u8,
    pub status: u8,
    pub request_id: RequestId,
    pub body_length: usize,
}

impl FrameHeader {
    pub fn is_request(&self) -> bool {
        self.flag & FLAG_REQUEST != 0
    }

    pub fn is_two_way(&self) -> bool {
        self.flag & FLAG_TWO_WAY != 0
    }

    pub fn is_event(&self) -> bool {
        self.flag & FLAG_EVENT != 0
    }

    pub fn serialization_id(&self) -> u8 {
        self.flag & SERIALIZATION_MASK
    }

    /// Parses the first 16 bytes of a frame.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let body_length = body_length(bytes)?;
        let mut id = [0u8; 8];
        id.copy_from_slice(&bytes[4..12]);

        Ok(FrameHeader {
            flag: bytes[2],
            status: bytes[3],
            request_id: u64::from_be_bytes(id),
            body_length,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let len = u32::try_from(self.body_length).map_err(|_| ZoorpcError::PayloadTooLarge {
            size: self.body_length,
            limit: u32::MAX as usize,
        })?;
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.push(self.flag);
        out.push(self.status);
        out.extend_from_slice(&self.request_id.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

/// Reads the declared body length from a frame header.
///
/// # Errors
///
/// `InvalidResponse` when fewer than 16 bytes are given or the magic
/// number does not match.
pub fn body_length(header: &[u8]) -> Result<usize> {
    if header.len() < HEADER_LENGTH {
        return Err(ZoorpcError::InvalidResponse(format!(
            "frame header needs {} bytes, got {}",
            HEADER_LENGTH,
            header.len()
        )));
    }

    let magic = u16::from_be_bytes([header[0], header[1]]);
    if magic != MAGIC {
        return Err(ZoorpcError::InvalidResponse(format!(
            "bad magic 0x{:04x}",
            magic
        )));
    }

    Ok(u32::from_be_bytes([header[12], header[13], header[14], header[15]]) as usize)
}

/// Buffers response bytes until one whole frame is present.
///
/// The body length is read as soon as the header is complete; the frame is
/// only released once header and body are both buffered.
#[derive(Debug)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    expected: Option<usize>,
    max_body: usize,
}

impl FrameAccumulator {
    pub fn new(max_body: usize) -> Self {
        Self {
            buf: Vec::new(),
            expected: None,
            max_body,
        }
    }

    /// Number of bytes received so far.
    pub fn received(&self) -> usize {
        self.buf.len()
    }

    /// Appends a chunk and returns the complete frame once available.
    ///
    /// Bytes past the end of the first frame are discarded, since each
    /// connection carries exactly one response.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        self.buf.extend_from_slice(chunk);

        if self.expected.is_none() && self.buf.len() >= HEADER_LENGTH {
            let body = body_length(&self.buf[..HEADER_LENGTH])?;
            if body > self.max_body {
                return Err(ZoorpcError::PayloadTooLarge {
                    size: body,
                    limit: self.max_body,
                });
            }
            self.expected = Some(HEADER_LENGTH + body);
        }

        match self.expected {
            Some(total) if self.buf.len() >= total => {
                let mut frame = std::mem::take(&mut self.buf);
                frame.truncate(total);
                Ok(Some(frame))
            }
            _ => Ok(None),
        }
    }
}
