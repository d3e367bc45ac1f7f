use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::CoordinatorConfig;

/// Coordinator-side view of self-registered worker addresses, fed by the
/// registry sink and read when resolving auto-discovered group address
/// lists.
pub struct WorkerRegistry {
    /// app name -> address -> last heartbeat
    workers: DashMap<String, HashMap<String, Instant>>,
    dead_timeout: Duration,
}

impl WorkerRegistry {
    pub fn new(dead_timeout: Duration) -> Self {
        Self {
            workers: DashMap::new(),
            dead_timeout,
        }
    }

    /// Registry with the configured dead-worker timeout.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.dead_worker_timeout())
    }

    /// Record a heartbeat registration for `(app_name, address)`.
    pub fn registry(&self, app_name: &str, address: &str) {
        let address = address.trim();
        if app_name.is_empty() || address.is_empty() {
            tracing::warn!(app_name, address, "Registry request with blank fields ignored");
            return;
        }
        let mut entry = self.workers.entry(app_name.to_string()).or_default();
        let known = entry.insert(address.to_string(), Instant::now()).is_some();
        if !known {
            tracing::info!(app_name, address, "Worker registered");
        }
    }

    /// Best-effort deregistration issued by a worker on shutdown.
    pub fn registry_remove(&self, app_name: &str, address: &str) {
        if let Some(mut entry) = self.workers.get_mut(app_name) {
            if entry.remove(address.trim()).is_some() {
                tracing::info!(app_name, address, "Worker deregistered");
            }
        }
    }

    /// Addresses whose last heartbeat is within the dead timeout, sorted
    /// for deterministic group resolution.
    pub fn alive_addresses(&self, app_name: &str) -> Vec<String> {
        let Some(entry) = self.workers.get(app_name) else {
            return Vec::new();
        };
        let mut alive: Vec<String> = entry
            .iter()
            .filter(|(_, last_seen)| last_seen.elapsed() < self.dead_timeout)
            .map(|(address, _)| address.clone())
            .collect();
        alive.sort();
        alive
    }
}
