use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::worker::CoordinatorClient;

/// Periodic self-registration of this worker's address with every known
/// coordinator; best-effort deregistration on shutdown.
pub struct RegistryHeartbeat {
    clients: Vec<Arc<dyn CoordinatorClient>>,
    app_name: String,
    address: String,
    interval: Duration,
}

impl RegistryHeartbeat {
    pub fn new(
        clients: Vec<Arc<dyn CoordinatorClient>>,
        app_name: impl Into<String>,
        address: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            clients,
            app_name: app_name.into(),
            address: address.into(),
            interval,
        }
    }

    /// Run until `cancel` fires. Registration failures are logged and
    /// retried on the next interval, never fatal to the worker.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = tick.tick() => self.register_all().await,
                _ = cancel.cancelled() => break,
            }
        }
        self.deregister_all().await;
    }

    async fn register_all(&self) {
        for client in &self.clients {
            match client.registry(&self.app_name, &self.address).await {
                Ok(env) if env.is_success() => {}
                Ok(env) => tracing::warn!(
                    app_name = %self.app_name,
                    address = %self.address,
                    msg = %env.msg,
                    "Registry heartbeat rejected"
                ),
                Err(e) => tracing::warn!(
                    app_name = %self.app_name,
                    address = %self.address,
                    error = %e,
                    "Registry heartbeat failed"
                ),
            }
        }
    }

    async fn deregister_all(&self) {
        for client in &self.clients {
            if let Err(e) = client.registry_remove(&self.app_name, &self.address).await {
                tracing::warn!(
                    app_name = %self.app_name,
                    address = %self.address,
                    error = %e,
                    "Registry removal failed"
                );
            }
        }
        tracing::info!(app_name = %self.app_name, address = %self.address, "Registry heartbeat stopped");
    }
}
