use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::model::{
    BlockStrategy, HandleCallbackParam, ResultEnvelope, TriggerMessage, FAIL_CODE,
    HANDLE_CODE_CANCELLED, HANDLE_CODE_TIMEOUT, SUCCESS_CODE,
};
use crate::worker::handler::{JobContext, JobHandler};

/// Queue and execution state, guarded by one mutex. The lock is only held
/// for queue manipulation, never across an await.
struct Inner {
    queue: VecDeque<TriggerMessage>,
    pending_log_ids: HashSet<i64>,
    running_log_id: Option<i64>,
    /// Cancels the in-flight execution only; child of the stop token so a
    /// full stop also interrupts it.
    exec_cancel: Option<CancellationToken>,
}

/// A single long-lived execution unit bound to one job id.
///
/// Executions of the same job id are strictly serialized: the task loop
/// pulls one message at a time, and the block strategy decides what happens
/// to arrivals while one is queued or running. Every started execution
/// emits exactly one callback, including timeout and cancellation.
pub struct WorkerThread {
    job_id: i32,
    handler: Arc<dyn JobHandler>,
    handler_identity: String,
    queue_capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
    stop: CancellationToken,
    stop_reason: Mutex<Option<String>>,
    callback_tx: mpsc::UnboundedSender<HandleCallbackParam>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Create the thread and start its task loop.
    pub fn start(
        job_id: i32,
        handler: Arc<dyn JobHandler>,
        handler_identity: impl Into<String>,
        queue_capacity: usize,
        callback_tx: mpsc::UnboundedSender<HandleCallbackParam>,
    ) -> Arc<Self> {
        let thread = Arc::new(Self {
            job_id,
            handler,
            handler_identity: handler_identity.into(),
            queue_capacity,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                pending_log_ids: HashSet::new(),
                running_log_id: None,
                exec_cancel: None,
            }),
            notify: Notify::new(),
            stop: CancellationToken::new(),
            stop_reason: Mutex::new(None),
            callback_tx,
            join_handle: Mutex::new(None),
        });
        let handle = tokio::spawn(thread.clone().run_loop());
        *thread.join_handle.lock().unwrap() = Some(handle);
        thread
    }

    pub fn job_id(&self) -> i32 {
        self.job_id
    }

    pub fn handler_identity(&self) -> &str {
        &self.handler_identity
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn is_running_or_queued(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.running_log_id.is_some() || !inner.queue.is_empty()
    }

    /// Offer a trigger under its block strategy. Returns whether the
    /// message was accepted (queued/replaced/run), not its eventual
    /// execution outcome.
    pub fn push(&self, message: TriggerMessage) -> ResultEnvelope<String> {
        if self.stop.is_cancelled() {
            return ResultEnvelope::fail("job thread is stopping, trigger rejected");
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.pending_log_ids.contains(&message.log_id)
            || inner.running_log_id == Some(message.log_id)
        {
            return ResultEnvelope::fail(format!(
                "repeat trigger, log id {} is already queued or running",
                message.log_id
            ));
        }

        let busy = inner.running_log_id.is_some() || !inner.queue.is_empty();
        let accepted = match message.block_strategy {
            BlockStrategy::SerialExecution => {
                if inner.queue.len() >= self.queue_capacity {
                    return ResultEnvelope::fail(format!(
                        "trigger queue full ({} pending), trigger rejected",
                        inner.queue.len()
                    ));
                }
                if busy {
                    "queued behind in-flight trigger"
                } else {
                    "accepted"
                }
            }
            BlockStrategy::DiscardLater => {
                if busy {
                    return ResultEnvelope::fail(
                        "block strategy DISCARD_LATER effected: trigger discarded while job is busy",
                    );
                }
                "accepted"
            }
            BlockStrategy::CoverEarlier => {
                if busy {
                    // A queued-not-running message is always replaceable;
                    // each replaced one still gets its terminal callback.
                    let replaced: Vec<TriggerMessage> = inner.queue.drain(..).collect();
                    for old in &replaced {
                        inner.pending_log_ids.remove(&old.log_id);
                        self.send_callback(HandleCallbackParam::new(
                            old.log_id,
                            old.log_date_time_ms,
                            HANDLE_CODE_CANCELLED,
                            "trigger superseded by a newer trigger (cover earlier)".to_string(),
                        ));
                    }
                    if let Some(exec_cancel) = &inner.exec_cancel {
                        exec_cancel.cancel();
                    }
                    "cover earlier: superseded pending trigger"
                } else {
                    "accepted"
                }
            }
        };

        inner.pending_log_ids.insert(message.log_id);
        inner.queue.push_back(message);
        drop(inner);

        self.notify.notify_one();
        ResultEnvelope::ok_msg(accepted)
    }

    /// Signal the thread to stop. The in-flight execution is interrupted
    /// (the exec token is a child of the stop token) and still emits its
    /// callback; queued messages are flushed as cancelled callbacks.
    pub fn to_stop(&self, reason: impl Into<String>) {
        {
            let mut stop_reason = self.stop_reason.lock().unwrap();
            if stop_reason.is_none() {
                *stop_reason = Some(reason.into());
            }
        }
        self.stop.cancel();
    }

    /// Wait for the task loop to exit, bounded by `timeout`. Returns false
    /// if the thread is still running after the deadline.
    pub async fn join(&self, timeout: Duration) -> bool {
        let handle = self.join_handle.lock().unwrap().take();
        let Some(handle) = handle else {
            return true;
        };
        tokio::time::timeout(timeout, handle).await.is_ok()
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            if self.stop.is_cancelled() {
                break;
            }

            let next = {
                let mut inner = self.inner.lock().unwrap();
                match inner.queue.pop_front() {
                    Some(message) => {
                        inner.pending_log_ids.remove(&message.log_id);
                        inner.running_log_id = Some(message.log_id);
                        let exec_cancel = self.stop.child_token();
                        inner.exec_cancel = Some(exec_cancel.clone());
                        Some((message, exec_cancel))
                    }
                    None => None,
                }
            };

            let Some((message, exec_cancel)) = next else {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = self.stop.cancelled() => {}
                }
                continue;
            };

            let callback = self.execute(message, exec_cancel).await;
            {
                let mut inner = self.inner.lock().unwrap();
                inner.running_log_id = None;
                inner.exec_cancel = None;
            }
            self.send_callback(callback);
        }

        // Flush whatever is still queued so no attempt goes unreported.
        let leftovers: Vec<TriggerMessage> = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending_log_ids.clear();
            inner.queue.drain(..).collect()
        };
        if !leftovers.is_empty() {
            let reason = self.stop_reason_text();
            for message in leftovers {
                self.send_callback(HandleCallbackParam::new(
                    message.log_id,
                    message.log_date_time_ms,
                    HANDLE_CODE_CANCELLED,
                    format!("job not executed, removed from queue on stop: {reason}"),
                ));
            }
        }
        tracing::info!(job_id = self.job_id, "Job thread stopped");
    }

    async fn execute(
        &self,
        message: TriggerMessage,
        exec_cancel: CancellationToken,
    ) -> HandleCallbackParam {
        let log_id = message.log_id;
        let log_date_time_ms = message.log_date_time_ms;
        let timeout_secs = message.timeout_secs;
        tracing::info!(job_id = self.job_id, log_id, "Job execution start");

        let ctx = JobContext {
            message,
            cancel: exec_cancel.clone(),
        };
        let execution = self.handler.execute(ctx);
        tokio::pin!(execution);

        enum Outcome {
            Done(ResultEnvelope<String>),
            Timeout,
            Cancelled,
        }

        let outcome = if timeout_secs > 0 {
            tokio::select! {
                _ = exec_cancel.cancelled() => Outcome::Cancelled,
                _ = tokio::time::sleep(Duration::from_secs(timeout_secs as u64)) => Outcome::Timeout,
                env = &mut execution => Outcome::Done(env),
            }
        } else {
            tokio::select! {
                _ = exec_cancel.cancelled() => Outcome::Cancelled,
                env = &mut execution => Outcome::Done(env),
            }
        };

        let callback = match outcome {
            Outcome::Done(env) => {
                let handle_code = if env.is_success() {
                    SUCCESS_CODE
                } else {
                    FAIL_CODE
                };
                HandleCallbackParam {
                    log_id,
                    log_date_time_ms,
                    handle_code,
                    handle_msg: env.msg,
                    process_id: env.content,
                }
            }
            Outcome::Timeout => {
                tracing::warn!(job_id = self.job_id, log_id, timeout_secs, "Job execution timeout");
                HandleCallbackParam::new(
                    log_id,
                    log_date_time_ms,
                    HANDLE_CODE_TIMEOUT,
                    format!("job execution timeout ({timeout_secs}s), interrupted"),
                )
            }
            Outcome::Cancelled => {
                let reason = self.stop_reason_text();
                tracing::warn!(job_id = self.job_id, log_id, reason = %reason, "Job execution cancelled");
                HandleCallbackParam::new(
                    log_id,
                    log_date_time_ms,
                    HANDLE_CODE_CANCELLED,
                    format!("job execution cancelled: {reason}"),
                )
            }
        };
        tracing::info!(
            job_id = self.job_id,
            log_id,
            handle_code = callback.handle_code,
            "Job execution end"
        );
        callback
    }

    fn stop_reason_text(&self) -> String {
        self.stop_reason
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "superseded by cover-earlier trigger".to_string())
    }

    fn send_callback(&self, callback: HandleCallbackParam) {
        if self.callback_tx.send(callback).is_err() {
            tracing::error!(
                job_id = self.job_id,
                "Callback channel closed, execution result dropped"
            );
        }
    }
}
