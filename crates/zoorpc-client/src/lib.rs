pub mod client;
pub mod config;
pub mod invoker;
pub mod proxy;
pub mod readiness;
pub mod selector;

pub use client::ZoorpcClient;
pub use config::{ClientConfig, DependencyConfig};
pub use invoker::Invoker;
pub use proxy::{MethodBinding, ServiceProxy, ServiceSnapshot};
pub use readiness::ReadinessTracker;
pub use selector::RandomSelector;

pub use zoorpc_common::{Argument, Value, ZoorpcError};
