//! Service discovery for wirecall.
//!
//! - [`Registry`]: the pluggable discovery abstraction — register and
//!   unregister [`ServiceInstance`]s, list them, subscribe to change
//!   signals
//! - [`MemoryRegistry`]: the in-process implementation, storing instances
//!   under the same key convention an etcd backend uses
//! - [`RegistryResolverBuilder`]: the `registry` scheme adapter that feeds
//!   a gRPC-style client connection ([`AddressSink`]) with resolved
//!   addresses
//! - [`announce`]: register-on-start / revoke-on-shutdown lifecycle for
//!   servers

mod announce;
mod memory;
mod registry;
mod resolver;

pub use announce::{Announcement, announce};
pub use memory::MemoryRegistry;
pub use registry::{
    Event, KEY_PREFIX, Registry, RegistryError, ServiceInstance, Subscription, instance_key,
    service_key,
};
pub use resolver::{AddressSink, RegistryResolver, RegistryResolverBuilder, ResolvedAddress, SCHEME};
