//! The `registry` scheme resolver adapter.
//!
//! Bridges a [`Registry`] to a gRPC-style client connection: resolve once
//! on build, re-resolve on every change signal, push the resulting address
//! set into an [`AddressSink`].

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::registry::{Registry, RegistryError};

/// Scheme under which this resolver registers with a client connection
/// builder.
pub const SCHEME: &str = "registry";

/// One resolved backend address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// `host:port` to dial.
    pub address: String,
    /// Service name the address belongs to.
    pub server_name: String,
}

/// The surface of the hosting client connection: where resolved addresses
/// and resolution failures go.
pub trait AddressSink: Send + Sync + 'static {
    /// Replace the known address set.
    fn update_addresses(&self, addresses: Vec<ResolvedAddress>);

    /// Report a failed resolution attempt. The previous address set stays
    /// in effect.
    fn report_error(&self, error: RegistryError);
}

/// Builds [`RegistryResolver`]s over one registry.
#[derive(Debug, Clone)]
pub struct RegistryResolverBuilder<R> {
    registry: Arc<R>,
    list_timeout: Duration,
}

impl<R: Registry> RegistryResolverBuilder<R> {
    /// Create a builder over the given registry.
    pub fn new(registry: Arc<R>) -> RegistryResolverBuilder<R> {
        RegistryResolverBuilder {
            registry,
            list_timeout: Duration::from_secs(3),
        }
    }

    /// Bound one list call. Default is 3 seconds.
    pub fn list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    /// The scheme this resolver serves.
    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    /// Build a resolver for one service: resolve immediately, then spawn a
    /// watcher that re-resolves on every registry change signal.
    pub async fn build(
        &self,
        service: &str,
        sink: Arc<dyn AddressSink>,
    ) -> Result<RegistryResolver<R>, RegistryError> {
        let shared = Arc::new(ResolverShared {
            registry: Arc::clone(&self.registry),
            service: service.to_string(),
            sink,
            list_timeout: self.list_timeout,
        });

        let mut events = self.registry.subscribe(service)?;
        shared.resolve().await;

        let watcher = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                while events.next().await.is_some() {
                    shared.resolve().await;
                }
            }
        });

        Ok(RegistryResolver { shared, watcher })
    }
}

/// A live resolver for one service.
pub struct RegistryResolver<R: Registry> {
    shared: Arc<ResolverShared<R>>,
    watcher: JoinHandle<()>,
}

impl<R: Registry> RegistryResolver<R> {
    /// Force one resolution pass now.
    pub async fn resolve_now(&self) {
        self.shared.resolve().await;
    }

    /// Stop the watcher. No further updates reach the sink.
    pub fn close(&self) {
        self.watcher.abort();
    }
}

impl<R: Registry> Drop for RegistryResolver<R> {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

impl<R: Registry> std::fmt::Debug for RegistryResolver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryResolver")
            .field("service", &self.shared.service)
            .finish_non_exhaustive()
    }
}

struct ResolverShared<R: Registry> {
    registry: Arc<R>,
    service: String,
    sink: Arc<dyn AddressSink>,
    list_timeout: Duration,
}

impl<R: Registry> ResolverShared<R> {
    async fn resolve(&self) {
        let listed =
            tokio::time::timeout(self.list_timeout, self.registry.list_services(&self.service))
                .await;
        match listed {
            Ok(Ok(instances)) => {
                debug!(service = %self.service, count = instances.len(), "resolved addresses");
                let addresses = instances
                    .into_iter()
                    .map(|instance| ResolvedAddress {
                        address: instance.address,
                        server_name: instance.name,
                    })
                    .collect();
                self.sink.update_addresses(addresses);
            }
            Ok(Err(e)) => self.sink.report_error(e),
            Err(_) => self.sink.report_error(RegistryError::Unavailable(format!(
                "listing {} timed out",
                self.service
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use crate::registry::ServiceInstance;
    use tokio::sync::mpsc;

    struct TestSink {
        updates: mpsc::UnboundedSender<Vec<ResolvedAddress>>,
        errors: mpsc::UnboundedSender<RegistryError>,
    }

    impl AddressSink for TestSink {
        fn update_addresses(&self, addresses: Vec<ResolvedAddress>) {
            let _ = self.updates.send(addresses);
        }

        fn report_error(&self, error: RegistryError) {
            let _ = self.errors.send(error);
        }
    }

    type SinkChannels = (
        Arc<TestSink>,
        mpsc::UnboundedReceiver<Vec<ResolvedAddress>>,
        mpsc::UnboundedReceiver<RegistryError>,
    );

    fn sink() -> SinkChannels {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        (
            Arc::new(TestSink {
                updates: updates_tx,
                errors: errors_tx,
            }),
            updates_rx,
            errors_rx,
        )
    }

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting on the sink")
            .expect("sink channel closed")
    }

    #[tokio::test]
    async fn test_build_pushes_the_initial_address_set() {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .register(ServiceInstance::new("user-service", "10.0.0.1:8081"))
            .await
            .unwrap();

        let (sink, mut updates, _errors) = sink();
        let builder = RegistryResolverBuilder::new(registry);
        assert_eq!(builder.scheme(), "registry");

        let _resolver = builder.build("user-service", sink).await.unwrap();
        let addresses = recv(&mut updates).await;
        assert_eq!(
            addresses,
            vec![ResolvedAddress {
                address: "10.0.0.1:8081".to_string(),
                server_name: "user-service".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_watcher_re_resolves_on_changes() {
        let registry = Arc::new(MemoryRegistry::new());
        let (sink, mut updates, _errors) = sink();
        let resolver = RegistryResolverBuilder::new(Arc::clone(&registry))
            .build("user-service", sink)
            .await
            .unwrap();

        let initial = recv(&mut updates).await;
        assert!(initial.is_empty());

        registry
            .register(ServiceInstance::new("user-service", "10.0.0.2:8081"))
            .await
            .unwrap();

        let addresses = recv(&mut updates).await;
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].address, "10.0.0.2:8081");

        resolver.close();
    }

    #[tokio::test]
    async fn test_resolve_now_forces_a_pass() {
        let registry = Arc::new(MemoryRegistry::new());
        let (sink, mut updates, _errors) = sink();
        let resolver = RegistryResolverBuilder::new(Arc::clone(&registry))
            .build("user-service", sink)
            .await
            .unwrap();
        let _ = recv(&mut updates).await;

        resolver.resolve_now().await;
        let addresses = recv(&mut updates).await;
        assert!(addresses.is_empty());
    }

    #[tokio::test]
    async fn test_list_failures_are_reported_to_the_sink() {
        let registry = Arc::new(MemoryRegistry::new());
        let (sink, mut updates, mut errors) = sink();
        let resolver = RegistryResolverBuilder::new(Arc::clone(&registry))
            .build("user-service", sink)
            .await
            .unwrap();
        let _ = recv(&mut updates).await;

        registry.close().await.unwrap();
        resolver.resolve_now().await;

        let error = recv(&mut errors).await;
        assert!(matches!(error, RegistryError::Closed));
    }

    #[tokio::test]
    async fn test_closed_resolver_stops_watching() {
        let registry = Arc::new(MemoryRegistry::new());
        let (sink, mut updates, _errors) = sink();
        let resolver = RegistryResolverBuilder::new(Arc::clone(&registry))
            .build("user-service", sink)
            .await
            .unwrap();
        let _ = recv(&mut updates).await;

        resolver.close();
        // Give the aborted watcher a beat, then change the registry.
        tokio::task::yield_now().await;
        registry
            .register(ServiceInstance::new("user-service", "10.0.0.3:8081"))
            .await
            .unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(100), updates.recv()).await;
        assert!(pending.is_err(), "no updates should follow close");
    }
}
