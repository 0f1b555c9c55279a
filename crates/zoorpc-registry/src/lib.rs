//! Provider discovery for zoorpc.
//!
//! Providers publish themselves as children of
//! `/{root}/{interface}/providers` in a coordination service. This crate
//! reads those children, decodes them into [`ProviderDescriptor`]s, keeps
//! the ones matching a dependency's version and group, and follows changes
//! through one-shot watches.
//!
//! Clients also announce themselves under `/{root}/{interface}/consumers`
//! through [`RegistryClient::register_consumer`].
//!
//! The coordination service is reached through the [`Coordinator`] trait.
//! [`MemoryCoordinator`] is always available; the ZooKeeper binding needs
//! the `zookeeper` feature.

pub mod consumer;
pub mod coordinator;
pub mod memory;
pub mod provider;
pub mod registry;
#[cfg(feature = "zookeeper")]
pub mod zookeeper;

pub use consumer::{local_address, ConsumerDescriptor};
pub use coordinator::{ChildWatch, Coordinator, NodeKind};
pub use memory::MemoryCoordinator;
pub use provider::{ProviderDescriptor, ProviderFilter};
pub use registry::{Discovery, DiscoveryOutcome, RegistryClient, Subscription, DEFAULT_ROOT};
#[cfg(feature = "zookeeper")]
pub use zookeeper::ZkCoordinator;
