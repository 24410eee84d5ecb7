//! Registration lifecycle for servers.

use std::sync::Arc;
use tracing::info;

use crate::registry::{Registry, RegistryError, ServiceInstance};

/// Register an instance and get back the guard that withdraws it.
///
/// Server mains call this once the listener is bound (the address is known
/// then) and [`revoke`](Announcement::revoke) it before closing the
/// listener, so subscribers see the removal while the old address still
/// drains.
pub async fn announce<R: Registry>(
    registry: Arc<R>,
    instance: ServiceInstance,
) -> Result<Announcement<R>, RegistryError> {
    registry.register(instance.clone()).await?;
    info!(name = %instance.name, address = %instance.address, "service announced");
    Ok(Announcement { registry, instance })
}

/// A live registration.
///
/// Withdrawal is an async operation, so it is explicit rather than tied to
/// drop; [`Registry::close`] is the backstop for registrations never
/// revoked.
#[derive(Debug)]
pub struct Announcement<R: Registry> {
    registry: Arc<R>,
    instance: ServiceInstance,
}

impl<R: Registry> Announcement<R> {
    /// The registered instance.
    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// Withdraw the registration.
    pub async fn revoke(self) -> Result<(), RegistryError> {
        self.registry.unregister(self.instance.clone()).await?;
        info!(name = %self.instance.name, address = %self.instance.address, "service withdrawn");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;

    #[tokio::test]
    async fn test_announce_then_revoke() {
        let registry = Arc::new(MemoryRegistry::new());
        let instance = ServiceInstance::new("user-service", "10.0.0.1:8081");

        let announcement = announce(Arc::clone(&registry), instance.clone())
            .await
            .unwrap();
        assert_eq!(announcement.instance(), &instance);
        assert_eq!(
            registry.list_services("user-service").await.unwrap(),
            vec![instance]
        );

        announcement.revoke().await.unwrap();
        assert!(
            registry
                .list_services("user-service")
                .await
                .unwrap()
                .is_empty()
        );
    }
}
