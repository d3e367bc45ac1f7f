use std::path::PathBuf;
use std::time::Duration;

/// Coordinator-side dispatch configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Shared access token presented on every remote call.
    pub access_token: String,
    /// Timeout applied to each remote `run`/probe invocation.
    pub rpc_timeout_ms: u64,
    /// A registered worker address is considered dead once its last
    /// heartbeat is older than this.
    pub dead_worker_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            rpc_timeout_ms: 3_000,
            dead_worker_timeout_ms: 90_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn dead_worker_timeout(&self) -> Duration {
        Duration::from_millis(self.dead_worker_timeout_ms)
    }
}

/// Worker-side runtime configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Application name registered with every coordinator.
    pub app_name: String,
    /// Externally reachable `host:port` of this worker.
    pub address: String,
    /// Coordinator endpoints, tried in order for callbacks/registration.
    pub coordinator_addresses: Vec<String>,
    /// Shared access token expected on inbound calls and presented on
    /// outbound ones.
    pub access_token: String,
    /// Capacity of each job thread's trigger queue (serial-execution
    /// block strategy rejects arrivals beyond this).
    pub queue_capacity: usize,
    /// Interval between registry heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Interval between retry passes over the callback spool.
    pub callback_retry_interval_ms: u64,
    /// Durable spool for callbacks that could not be delivered.
    pub callback_spool_path: PathBuf,
    /// How long shutdown waits for a retiring job thread to flush its
    /// callbacks before moving on.
    pub join_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "dispatch-worker".to_string(),
            address: "127.0.0.1:9999".to_string(),
            coordinator_addresses: Vec::new(),
            access_token: String::new(),
            queue_capacity: 500,
            heartbeat_interval_ms: 30_000,
            callback_retry_interval_ms: 30_000,
            callback_spool_path: PathBuf::from("callback-spool.log"),
            join_timeout_ms: 10_000,
        }
    }
}

impl WorkerConfig {
    pub fn new(app_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_coordinator(mut self, address: impl Into<String>) -> Self {
        self.coordinator_addresses.push(address.into());
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn callback_retry_interval(&self) -> Duration {
        Duration::from_millis(self.callback_retry_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
