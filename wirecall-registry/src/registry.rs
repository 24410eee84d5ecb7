//! The registry abstraction.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// One running server of one service. Identity is the `(name, address)`
/// pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Service name, as clients address it.
    pub name: String,
    /// `host:port` the instance listens on.
    pub address: String,
}

impl ServiceInstance {
    /// Create an instance record.
    pub fn new<N: Into<String>, A: Into<String>>(name: N, address: A) -> ServiceInstance {
        ServiceInstance {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// A bare "state changed" signal. It carries no payload; consumers re-list
/// the service to learn the new instance set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event;

/// Key prefix shared by every registry backend.
pub const KEY_PREFIX: &str = "/micro";

/// Storage key for one instance: `/micro/<name>/<address>`.
pub fn instance_key(instance: &ServiceInstance) -> String {
    format!("{KEY_PREFIX}/{}/{}", instance.name, instance.address)
}

/// Prefix under which every instance of one service lives:
/// `/micro/<name>`.
pub fn service_key(service: &str) -> String {
    format!("{KEY_PREFIX}/{service}")
}

/// Registry-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The backend could not be reached or answered with a fault.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The registry handle was closed; its registrations are gone.
    #[error("registry handle is closed")]
    Closed,

    /// A stored instance record could not be encoded or decoded.
    #[error("registry codec error: {0}")]
    Codec(String),
}

/// A pluggable service discovery backend.
///
/// Implementations are used through generics, never trait objects; the
/// async methods return `Send` futures so callers can spawn around them.
pub trait Registry: Send + Sync + 'static {
    /// Make an instance discoverable.
    fn register(
        &self,
        instance: ServiceInstance,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Withdraw an instance.
    fn unregister(
        &self,
        instance: ServiceInstance,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// All currently registered instances of one service.
    fn list_services(
        &self,
        service: &str,
    ) -> impl Future<Output = Result<Vec<ServiceInstance>, RegistryError>> + Send;

    /// Subscribe to change signals for one service.
    fn subscribe(&self, service: &str) -> Result<Subscription, RegistryError>;

    /// Close the handle. Registrations made through it are withdrawn, the
    /// way a lease-backed backend expires them when its session ends.
    fn close(&self) -> impl Future<Output = Result<(), RegistryError>> + Send;
}

/// A lazy, infinite sequence of [`Event`]s for one service.
///
/// Built on a watch channel: bounded by construction, with bursts of
/// changes coalescing into a single pending event. A slow consumer never
/// stalls the publisher; it just observes fewer, fresher signals.
pub struct Subscription {
    inner: WatchStream<u64>,
}

impl Subscription {
    /// Wrap a watch receiver whose value is bumped on every change.
    ///
    /// Only changes after this call produce events; the current value is
    /// not replayed.
    pub fn from_watch(rx: watch::Receiver<u64>) -> Subscription {
        Subscription {
            inner: WatchStream::from_changes(rx),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|item| item.map(|_| Event))
    }
}
