use std::collections::BTreeMap;

use crate::protocol::error::{Result, ZoorpcError};
use crate::protocol::hessian::{HessianDecoder, HessianEncoder};
use crate::protocol::invocation::{Invocation, Request, DEFAULT_MAX_BODY_LEN};
use crate::protocol::responses::{Response, ResponsePayload, STATUS_OK};
use crate::protocol::value::{split_descriptors, Argument, Value};
use crate::transport::frame::{
    FrameHeader, FLAG_REQUEST, FLAG_TWO_WAY, HEADER_LENGTH, HESSIAN2_SERIALIZATION_ID,
};

const RESPONSE_WITH_EXCEPTION: i32 = 0;
const RESPONSE_VALUE: i32 = 1;
const RESPONSE_NULL_VALUE: i32 = 2;
const RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS: i32 = 3;
const RESPONSE_VALUE_WITH_ATTACHMENTS: i32 = 4;
const RESPONSE_NULL_VALUE_WITH_ATTACHMENTS: i32 = 5;

/// Attachment keys derived from the invocation itself.
const STANDARD_ATTACHMENTS: [&str; 5] = ["path", "interface", "version", "group", "timeout"];

/// Codec for the dubbo frame format with hessian2 bodies.
///
/// Encoding is deterministic: the same request always produces the same
/// bytes, and the header always declares the exact body length.
///
/// # Example
///
/// ```
/// use zoorpc_common::protocol::{Argument, Invocation, Request, Response, Value};
/// use zoorpc_common::transport::DubboCodec;
///
/// let invocation = Invocation::new("com.example.Greeter", "greet")
///     .with_arguments(vec![Argument::new("world")]);
/// let request = Request::new(invocation);
/// let frame = DubboCodec::encode_request(&request).unwrap();
/// assert_eq!(&frame[..2], &[0xda, 0xbb]);
///
/// let reply = DubboCodec::encode_response(&Response::success(request.id, Value::from("hi"))).unwrap();
/// assert_eq!(DubboCodec::decode(&reply).unwrap(), Value::from("hi"));
/// ```
pub struct DubboCodec;

impl DubboCodec {
    /// Encode a request frame
    ///
    /// # Arguments
    ///
    /// * `request` - The request to encode
    ///
    /// # Returns
    ///
    /// Header and body as one byte vector
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` when the body exceeds the invocation's
    /// `max_body_len`.
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        let inv = &request.invocation;
        let mut body = HessianEncoder::new();

        body.write_string(&inv.dubbo_version);
        body.write_string(&inv.interface);
        match &inv.version {
            Some(version) => body.write_string(version),
            None => body.write_null(),
        }
        body.write_string(&inv.method);
        body.write_string(&inv.parameter_descriptors());
        for arg in &inv.arguments {
            body.write_value(&arg.value);
        }
        let attachments = inv.wire_attachments();
        body.write_string_map(attachments.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let header = FrameHeader {
            flag: FLAG_REQUEST | FLAG_TWO_WAY | HESSIAN2_SERIALIZATION_ID,
            status: 0,
            request_id: request.id,
            body_length: body.len(),
        };
        Self::frame(header, body.into_bytes(), inv.max_body_len)
    }

    /// Decode a request frame
    ///
    /// The inverse of [`encode_request`](Self::encode_request); used by
    /// providers written against this crate.
    pub fn decode_request(data: &[u8]) -> Result<Request> {
        let (header, body) = Self::split(data)?;
        if !header.is_request() {
            return Err(ZoorpcError::InvalidRequest(
                "frame is not flagged as a request".to_string(),
            ));
        }
        if header.is_event() {
            return Err(ZoorpcError::InvalidRequest(
                "event frames are not supported".to_string(),
            ));
        }
        Self::check_serialization(&header)?;

        let mut decoder = HessianDecoder::new(body);
        let dubbo_version = decoder.read_string()?;
        let interface = decoder.read_string()?;
        let version = decoder.read_nullable_string()?;
        let method = decoder.read_string()?;
        let descriptors = split_descriptors(&decoder.read_string()?)?;

        let mut arguments = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let value = decoder.read_value()?;
            arguments.push(Argument { descriptor, value });
        }

        let mut attachments = if decoder.is_empty() {
            BTreeMap::new()
        } else {
            string_map(decoder.read_value()?)?
        };

        let group = attachments.remove("group");
        let timeout_ms = attachments
            .get("timeout")
            .and_then(|t| t.parse::<u64>().ok());
        attachments.retain(|key, _| !STANDARD_ATTACHMENTS.contains(&key.as_str()));

        let mut invocation = Invocation::new(interface, method)
            .with_dubbo_version(dubbo_version)
            .with_version(version)
            .with_group(group)
            .with_arguments(arguments);
        if let Some(timeout_ms) = timeout_ms {
            invocation = invocation.with_timeout(timeout_ms);
        }
        invocation.attachments = attachments;

        Ok(Request {
            id: header.request_id,
            invocation,
        })
    }

    /// Encode a response frame
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        let mut body = HessianEncoder::new();
        let with_attachments = response.attachments.is_some();

        match &response.payload {
            ResponsePayload::Value(value) => {
                body.write_int(if with_attachments {
                    RESPONSE_VALUE_WITH_ATTACHMENTS
                } else {
                    RESPONSE_VALUE
                });
                body.write_value(value);
            }
            ResponsePayload::Null => {
                body.write_int(if with_attachments {
                    RESPONSE_NULL_VALUE_WITH_ATTACHMENTS
                } else {
                    RESPONSE_NULL_VALUE
                });
            }
            ResponsePayload::Exception(exception) => {
                body.write_int(if with_attachments {
                    RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS
                } else {
                    RESPONSE_WITH_EXCEPTION
                });
                body.write_value(exception);
            }
            ResponsePayload::Error(message) => body.write_string(message),
        }

        if let (Some(attachments), false) = (
            &response.attachments,
            matches!(response.payload, ResponsePayload::Error(_)),
        ) {
            body.write_string_map(attachments.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let header = FrameHeader {
            flag: HESSIAN2_SERIALIZATION_ID,
            status: response.status,
            request_id: response.id,
            body_length: body.len(),
        };
        Self::frame(header, body.into_bytes(), DEFAULT_MAX_BODY_LEN)
    }

    /// Decode a response frame
    ///
    /// # Arguments
    ///
    /// * `data` - A complete frame: 16 header bytes followed by the body
    ///
    /// # Returns
    ///
    /// The decoded response, with the payload still distinguishing values,
    /// nulls, exceptions and error statuses
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        let (header, body) = Self::split(data)?;
        if header.is_request() {
            return Err(ZoorpcError::InvalidResponse(
                "frame is flagged as a request".to_string(),
            ));
        }
        Self::check_serialization(&header)?;

        let mut decoder = HessianDecoder::new(body);

        if header.status != STATUS_OK {
            let message = if decoder.is_empty() {
                None
            } else {
                decoder.read_nullable_string()?
            };
            return Ok(Response::error(
                header.request_id,
                header.status,
                message.unwrap_or_default(),
            ));
        }

        let marker = decoder.read_int()?;
        let payload = match marker {
            RESPONSE_VALUE | RESPONSE_VALUE_WITH_ATTACHMENTS => {
                ResponsePayload::Value(decoder.read_value()?)
            }
            RESPONSE_NULL_VALUE | RESPONSE_NULL_VALUE_WITH_ATTACHMENTS => ResponsePayload::Null,
            RESPONSE_WITH_EXCEPTION | RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS => {
                ResponsePayload::Exception(decoder.read_value()?)
            }
            other => {
                return Err(ZoorpcError::InvalidResponse(format!(
                    "unknown response marker {}",
                    other
                )))
            }
        };

        let attachments = if marker >= RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS {
            Some(string_map(decoder.read_value()?)?)
        } else {
            None
        };

        Ok(Response {
            id: header.request_id,
            status: header.status,
            payload,
            attachments,
        })
    }

    /// Decode a response frame into the caller-visible result
    ///
    /// # Returns
    ///
    /// The returned value, or `RemoteFault` / `RemoteStatus` when the
    /// provider reported a failure
    pub fn decode(data: &[u8]) -> Result<Value> {
        Self::decode_response(data)?.into_result()
    }

    fn frame(header: FrameHeader, body: Vec<u8>, limit: usize) -> Result<Vec<u8>> {
        if body.len() > limit {
            return Err(ZoorpcError::PayloadTooLarge {
                size: body.len(),
                limit,
            });
        }
        let mut out = Vec::with_capacity(HEADER_LENGTH + body.len());
        header.write(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn split(data: &[u8]) -> Result<(FrameHeader, &[u8])> {
        let header = FrameHeader::parse(data)?;
        let end = HEADER_LENGTH + header.body_length;
        if data.len() < end {
            return Err(ZoorpcError::InvalidResponse(format!(
                "frame declares {} body bytes but only {} are present",
                header.body_length,
                data.len() - HEADER_LENGTH
            )));
        }
        Ok((header, &data[HEADER_LENGTH..end]))
    }

    fn check_serialization(header: &FrameHeader) -> Result<()> {
        match header.serialization_id() {
            HESSIAN2_SERIALIZATION_ID => Ok(()),
            other => Err(ZoorpcError::Serialization(format!(
                "unsupported serialization id {}",
                other
            ))),
        }
    }
}

fn string_map(value: Value) -> Result<BTreeMap<String, String>> {
    match value {
        Value::Map(entries) => Ok(entries
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (display_string(k), display_string(v)))
            .collect()),
        Value::Null => Ok(BTreeMap::new()),
        other => Err(ZoorpcError::InvalidResponse(format!(
            "expected attachments map, got {:?}",
            other
        ))),
    }
}

fn display_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_json().to_string(),
    }
}
