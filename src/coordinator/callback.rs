use std::sync::Arc;

use chrono::Utc;

use crate::coordinator::repository::Repository;
use crate::model::{HandleCallbackParam, ResultEnvelope};

/// Coordinator-side sink for execution results shipped back by workers.
///
/// Idempotent per log id: repeated delivery of the same log id's final
/// result must not change the record beyond its first successful update.
pub struct CallbackSink {
    repository: Arc<dyn Repository>,
}

impl CallbackSink {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    pub async fn receive_callback(
        &self,
        items: Vec<HandleCallbackParam>,
    ) -> ResultEnvelope<()> {
        for item in items {
            match self.repository.load_log(item.log_id).await {
                None => {
                    tracing::warn!(log_id = item.log_id, "Callback for unknown log record ignored");
                }
                Some(record) if record.has_handle_result() => {
                    tracing::debug!(log_id = item.log_id, "Repeat callback ignored");
                }
                Some(_) => {
                    if let Err(e) = self
                        .repository
                        .update_log_handle_info(
                            item.log_id,
                            item.handle_code,
                            &item.handle_msg,
                            Utc::now(),
                            item.process_id.as_deref(),
                        )
                        .await
                    {
                        tracing::error!(log_id = item.log_id, error = %e, "Recording callback failed");
                    }
                }
            }
        }
        ResultEnvelope::ok()
    }
}
