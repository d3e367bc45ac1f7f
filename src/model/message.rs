use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::job::{BlockStrategy, GlueType, IncrementKind};

/// Handler exceeded its declared timeout.
pub const HANDLE_CODE_TIMEOUT: i32 = 502;
/// Execution was cancelled (thread stopped or trigger superseded).
pub const HANDLE_CODE_CANCELLED: i32 = 501;

/// One routed remote invocation. Immutable once constructed; a broadcast
/// dispatch fans out N distinct instances, one per shard index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerMessage {
    pub job_id: i32,
    pub executor_handler: String,
    pub executor_params: String,
    pub block_strategy: BlockStrategy,
    pub timeout_secs: i32,
    /// Unique log id correlating this attempt.
    pub log_id: i64,
    /// Millisecond timestamp of the correlated log record.
    pub log_date_time_ms: i64,
    pub glue_type: GlueType,
    pub glue_source: String,
    pub glue_update_time_ms: i64,
    pub broadcast_index: i32,
    pub broadcast_total: i32,
    pub increment_kind: Option<IncrementKind>,
    pub start_id: Option<i64>,
    pub end_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub trigger_time: Option<DateTime<Utc>>,
    pub partition_info: Option<String>,
    pub replace_param: Option<String>,
    pub replace_param_type: Option<String>,
    pub runtime_param: String,
}

impl TriggerMessage {
    /// Shard descriptor in `"index/total"` form.
    pub fn sharding_descriptor(&self) -> String {
        format!("{}/{}", self.broadcast_index, self.broadcast_total)
    }
}

impl Default for TriggerMessage {
    fn default() -> Self {
        Self {
            job_id: 0,
            executor_handler: String::new(),
            executor_params: String::new(),
            block_strategy: BlockStrategy::SerialExecution,
            timeout_secs: 0,
            log_id: 0,
            log_date_time_ms: 0,
            glue_type: GlueType::Handler,
            glue_source: String::new(),
            glue_update_time_ms: 0,
            broadcast_index: 0,
            broadcast_total: 1,
            increment_kind: None,
            start_id: None,
            end_id: None,
            start_time: None,
            trigger_time: None,
            partition_info: None,
            replace_param: None,
            replace_param_type: None,
            runtime_param: String::new(),
        }
    }
}

/// Final outcome of one job execution, produced by a worker thread and
/// consumed by the callback reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleCallbackParam {
    pub log_id: i64,
    pub log_date_time_ms: i64,
    pub handle_code: i32,
    pub handle_msg: String,
    /// OS process handle for long-running external-process handlers.
    pub process_id: Option<String>,
}

impl HandleCallbackParam {
    pub fn new(log_id: i64, log_date_time_ms: i64, handle_code: i32, handle_msg: String) -> Self {
        Self {
            log_id,
            log_date_time_ms,
            handle_code,
            handle_msg,
            process_id: None,
        }
    }
}
