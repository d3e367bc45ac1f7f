use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::{ResultEnvelope, TriggerMessage};

/// Everything an execution sees: the trigger message (params, sharding,
/// increment bounds) and a cancellation token observed at suspension
/// points. Cancellation is cooperative: the surrounding job thread also
/// races the token against the handler future, so a handler that never
/// yields is still cut off at its next await.
pub struct JobContext {
    pub message: TriggerMessage,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn job_id(&self) -> i32 {
        self.message.job_id
    }

    pub fn params(&self) -> &str {
        &self.message.executor_params
    }
}

/// A job body. Implementations report their outcome through the returned
/// envelope; the envelope's content, when present, is treated as an OS
/// process handle for long-running external-process handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, ctx: JobContext) -> ResultEnvelope<String>;
}
