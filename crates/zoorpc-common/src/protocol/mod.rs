pub mod error;
pub mod hessian;
pub mod invocation;
pub mod responses;
pub mod value;


pub use error::{Result, ZoorpcError};
pub use hessian::{HessianDecoder, HessianEncoder};
pub use invocation::{
    Invocation, Request, RequestId, DEFAULT_DUBBO_VERSION, DEFAULT_MAX_BODY_LEN,
    DEFAULT_TIMEOUT_MS,
};
pub use responses::{Response, ResponsePayload};
pub use value::{Argument, Value};
