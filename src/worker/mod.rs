//! Worker-side runtime: per-job execution threads, block strategies,
//! callback shipping and coordinator registration.

pub mod callback;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod shell;
pub mod thread;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::model::{GlueType, HandleCallbackParam, ResultEnvelope, TriggerMessage};
use crate::Result;

pub use callback::CallbackReporter;
pub use handler::{JobContext, JobHandler};
pub use heartbeat::RegistryHeartbeat;
pub use registry::WorkerThreadRegistry;
pub use shell::ShellGlueHandler;
pub use thread::WorkerThread;

/// Worker-to-coordinator calls. One instance per coordinator address; the
/// callback reporter and the registry heartbeat iterate over all of them.
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    async fn callback(&self, items: &[HandleCallbackParam]) -> Result<ResultEnvelope<()>>;
    async fn registry(&self, app_name: &str, address: &str) -> Result<ResultEnvelope<()>>;
    async fn registry_remove(&self, app_name: &str, address: &str) -> Result<ResultEnvelope<()>>;
}

/// Owns everything a worker process runs: the job thread registry, the
/// callback reporter and the registry heartbeat, all tied to one
/// cancellation token.
pub struct WorkerRuntime {
    config: WorkerConfig,
    registry: Arc<WorkerThreadRegistry>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerRuntime {
    /// Start the background tasks and return the runtime handle.
    pub fn start(config: WorkerConfig, clients: Vec<Arc<dyn CoordinatorClient>>) -> Arc<Self> {
        let cancel = CancellationToken::new();

        let (callback_tx, reporter_handle) = CallbackReporter::start(
            clients.clone(),
            config.callback_spool_path.clone(),
            config.callback_retry_interval(),
            cancel.clone(),
        );
        let registry = Arc::new(WorkerThreadRegistry::new(config.queue_capacity, callback_tx));

        let heartbeat = RegistryHeartbeat::new(
            clients,
            config.app_name.clone(),
            config.address.clone(),
            config.heartbeat_interval(),
        );
        let heartbeat_cancel = cancel.clone();
        let heartbeat_handle = tokio::spawn(async move { heartbeat.run(heartbeat_cancel).await });

        tracing::info!(
            app_name = %config.app_name,
            address = %config.address,
            "Worker runtime started"
        );
        Arc::new(Self {
            config,
            registry,
            cancel,
            tasks: Mutex::new(vec![reporter_handle, heartbeat_handle]),
        })
    }

    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.registry.register_handler(name, handler);
    }

    /// Accept one routed trigger: resolve its handler, bind it to the job's
    /// thread and offer it under the message's block strategy. A job whose
    /// source or glue type changed gets a fresh thread and the old one is
    /// terminated.
    pub fn receive_trigger(&self, message: TriggerMessage) -> ResultEnvelope<String> {
        let (handler, identity): (Arc<dyn JobHandler>, String) = match message.glue_type {
            GlueType::Handler => match self.registry.load_handler(&message.executor_handler) {
                Some(handler) => (handler, format!("handler:{}", message.executor_handler)),
                None => {
                    return ResultEnvelope::fail(format!(
                        "job handler [{}] not found",
                        message.executor_handler
                    ));
                }
            },
            GlueType::Shell => (
                Arc::new(ShellGlueHandler::new(message.glue_source.clone())),
                format!("shell:{}", message.glue_update_time_ms),
            ),
        };

        let thread = self
            .registry
            .resolve_thread(message.job_id, handler, &identity);
        thread.push(message)
    }

    /// Liveness probe. Reachability is the whole answer.
    pub fn beat(&self) -> ResultEnvelope<()> {
        ResultEnvelope::ok()
    }

    /// Idleness probe for one job id; fails while that job has an in-flight
    /// or queued trigger.
    pub fn idle_beat(&self, job_id: i32) -> ResultEnvelope<()> {
        match self.registry.lookup(job_id) {
            Some(thread) if thread.is_running_or_queued() => {
                ResultEnvelope::fail("job thread is running or has queued triggers")
            }
            _ => ResultEnvelope::ok(),
        }
    }

    /// Graceful stop: drain the job threads first so their terminal
    /// callbacks reach the reporter, then stop the background tasks.
    pub async fn shutdown(&self) {
        tracing::info!(app_name = %self.config.app_name, "Worker runtime stopping");
        self.registry.shutdown(self.config.join_timeout()).await;
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap();
            tasks.drain(..).collect()
        };
        for handle in handles {
            if tokio::time::timeout(self.config.join_timeout(), handle)
                .await
                .is_err()
            {
                tracing::warn!("Background task did not stop within the join timeout");
            }
        }
        tracing::info!(app_name = %self.config.app_name, "Worker runtime stopped");
    }
}
