use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::model::HandleCallbackParam;
use crate::worker::handler::JobHandler;
use crate::worker::thread::WorkerThread;

/// Worker-side registries: job id -> exclusive job thread, and handler
/// name -> handler. The thread map is the single source of truth; at most
/// one live thread exists per job id, and replacement is atomic from the
/// caller's perspective.
pub struct WorkerThreadRegistry {
    threads: DashMap<i32, Arc<WorkerThread>>,
    handlers: DashMap<String, Arc<dyn JobHandler>>,
    queue_capacity: usize,
    callback_tx: mpsc::UnboundedSender<HandleCallbackParam>,
}

impl WorkerThreadRegistry {
    pub fn new(
        queue_capacity: usize,
        callback_tx: mpsc::UnboundedSender<HandleCallbackParam>,
    ) -> Self {
        Self {
            threads: DashMap::new(),
            handlers: DashMap::new(),
            queue_capacity,
            callback_tx,
        }
    }

    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let name = name.into();
        tracing::info!(handler = %name, "Job handler registered");
        self.handlers.insert(name, handler);
    }

    pub fn load_handler(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).map(|entry| entry.clone())
    }

    /// Unconditionally create and start a new thread for `(job_id,
    /// handler)` and swap it into the map. The displaced occupant, if any,
    /// is signaled to stop with `remove_old_reason` before this returns;
    /// its in-flight execution is interrupted and its queue flushed as
    /// cancelled callbacks. The stop-flag is observed before the old
    /// thread pulls its next queue item, so it cannot accept new work
    /// after the swap.
    pub fn register(
        &self,
        job_id: i32,
        handler: Arc<dyn JobHandler>,
        handler_identity: impl Into<String>,
        remove_old_reason: &str,
    ) -> Arc<WorkerThread> {
        let new_thread = WorkerThread::start(
            job_id,
            handler,
            handler_identity,
            self.queue_capacity,
            self.callback_tx.clone(),
        );
        tracing::info!(job_id, "Job thread registered");

        let old_thread = self.threads.insert(job_id, new_thread.clone());
        if let Some(old_thread) = old_thread {
            old_thread.to_stop(remove_old_reason);
        }
        new_thread
    }

    /// Resolve the thread that should accept a trigger for `(job_id,
    /// handler_identity)`: reuse the live thread when the identity matches,
    /// otherwise start a replacement with a stop reason naming what
    /// displaced the old one.
    pub fn resolve_thread(
        &self,
        job_id: i32,
        handler: Arc<dyn JobHandler>,
        handler_identity: &str,
    ) -> Arc<WorkerThread> {
        match self.lookup(job_id) {
            Some(thread)
                if thread.handler_identity() == handler_identity && !thread.is_stopping() =>
            {
                thread
            }
            Some(thread) if thread.handler_identity() == handler_identity => self.register(
                job_id,
                handler,
                handler_identity,
                "job thread is stopping, replaced with a fresh thread",
            ),
            _ => self.register(
                job_id,
                handler,
                handler_identity,
                "change job source or glue type, terminate the old job thread",
            ),
        }
    }

    /// Remove and stop the thread for `job_id`, returning it so the caller
    /// can wait for its drain.
    pub fn unregister(&self, job_id: i32, reason: &str) -> Option<Arc<WorkerThread>> {
        let (_, old_thread) = self.threads.remove(&job_id)?;
        old_thread.to_stop(reason);
        tracing::info!(job_id, reason, "Job thread unregistered");
        Some(old_thread)
    }

    pub fn lookup(&self, job_id: i32) -> Option<Arc<WorkerThread>> {
        self.threads.get(&job_id).map(|entry| entry.clone())
    }

    /// Unregister every job thread and join each one within
    /// `join_timeout`, so in-flight callbacks are flushed before process
    /// exit. Stragglers are logged and abandoned.
    pub async fn shutdown(&self, join_timeout: Duration) {
        let job_ids: Vec<i32> = self.threads.iter().map(|entry| *entry.key()).collect();
        for job_id in job_ids {
            if let Some(thread) = self.unregister(job_id, "worker shutdown") {
                if !thread.join(join_timeout).await {
                    tracing::warn!(job_id, "Job thread did not stop within the join timeout");
                }
            }
        }
        self.handlers.clear();
    }
}
