//! Response types.
//!
//! A [`Response`] is what a provider sends back for one request. Its
//! payload is kept as decoded so test providers can fabricate any shape;
//! [`Response::into_result`] turns it into what the caller sees.

use std::collections::BTreeMap;

use super::error::{Result, ZoorpcError};
use super::invocation::RequestId;
use super::value::Value;

pub const STATUS_OK: u8 = 20;
pub const STATUS_CLIENT_TIMEOUT: u8 = 30;
pub const STATUS_SERVER_TIMEOUT: u8 = 31;
pub const STATUS_BAD_REQUEST: u8 = 40;
pub const STATUS_BAD_RESPONSE: u8 = 50;
pub const STATUS_SERVICE_NOT_FOUND: u8 = 60;
pub const STATUS_SERVICE_ERROR: u8 = 70;
pub const STATUS_SERVER_ERROR: u8 = 80;
pub const STATUS_CLIENT_ERROR: u8 = 90;
pub const STATUS_THREADPOOL_EXHAUSTED: u8 = 100;

/// Human readable name of a response status byte.
pub fn status_name(status: u8) -> &'static str {
    match status {
        STATUS_OK => "OK",
        STATUS_CLIENT_TIMEOUT => "CLIENT_TIMEOUT",
        STATUS_SERVER_TIMEOUT => "SERVER_TIMEOUT",
        STATUS_BAD_REQUEST => "BAD_REQUEST",
        STATUS_BAD_RESPONSE => "BAD_RESPONSE",
        STATUS_SERVICE_NOT_FOUND => "SERVICE_NOT_FOUND",
        STATUS_SERVICE_ERROR => "SERVICE_ERROR",
        STATUS_SERVER_ERROR => "SERVER_ERROR",
        STATUS_CLIENT_ERROR => "CLIENT_ERROR",
        STATUS_THREADPOOL_EXHAUSTED => "THREADPOOL_EXHAUSTED",
        _ => "UNKNOWN",
    }
}

/// What an OK response carried.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Value(Value),
    Null,
    /// A serialized Java throwable
    Exception(Value),
    /// Error text sent with a non-OK status
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub status: u8,
    pub payload: ResponsePayload,
    /// Response attachments, present when the provider sent any
    pub attachments: Option<BTreeMap<String, String>>,
}

impl Response {
    /// Creates an OK response carrying a value.
    ///
    /// # Arguments
    ///
    /// * `id` - The request identifier (must match the request's ID)
    /// * `value` - The returned value; `Value::Null` is sent as the null marker
    pub fn success(id: RequestId, value: Value) -> Self {
        let payload = if value.is_null() {
            ResponsePayload::Null
        } else {
            ResponsePayload::Value(value)
        };
        Response {
            id,
            status: STATUS_OK,
            payload,
            attachments: None,
        }
    }

    /// Creates an OK response carrying a thrown exception.
    pub fn exception(id: RequestId, exception: Value) -> Self {
        Response {
            id,
            status: STATUS_OK,
            payload: ResponsePayload::Exception(exception),
            attachments: None,
        }
    }

    /// Creates a response with a non-OK status and an error message.
    pub fn error(id: RequestId, status: u8, message: impl Into<String>) -> Self {
        Response {
            id,
            status,
            payload: ResponsePayload::Error(message.into()),
            attachments: None,
        }
    }

    pub fn with_attachments(mut self, attachments: BTreeMap<String, String>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Converts the response into the caller-visible result.
    ///
    /// # Returns
    ///
    /// The returned value (`Value::Null` for a null return), or
    /// `RemoteFault` for a thrown exception, or `RemoteStatus` for a non-OK
    /// status.
    pub fn into_result(self) -> Result<Value> {
        match self.payload {
            ResponsePayload::Value(value) => Ok(value),
            ResponsePayload::Null => Ok(Value::Null),
            ResponsePayload::Exception(exception) => {
                let class = exception.class_name().map(str::to_string);
                let message = exception
                    .get("detailMessage")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| class.clone())
                    .unwrap_or_else(|| "remote exception".to_string());
                Err(ZoorpcError::RemoteFault {
                    class,
                    message,
                    payload: exception,
                })
            }
            ResponsePayload::Error(message) => Err(ZoorpcError::RemoteStatus {
                status: self.status,
                message: format!("{} ({})", message, status_name(self.status)),
            }),
        }
    }
}
