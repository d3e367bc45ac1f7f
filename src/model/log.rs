use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::job::JobInfo;

/// Audit record of one dispatch attempt. Created and persisted *before* the
/// remote call fires, so an attempt interrupted mid-call is still
/// observable; updated exactly once with the trigger outcome, and later by
/// the callback sink with the execution outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerLogRecord {
    /// Repository-assigned id; zero until saved.
    pub id: i64,
    pub job_id: i32,
    pub group_id: i32,
    pub trigger_time: DateTime<Utc>,
    pub executor_address: Option<String>,
    pub executor_handler: String,
    pub executor_params: String,
    /// `"index/total"` when the dispatch was a broadcast shard.
    pub sharding_param: Option<String>,
    pub fail_retry_count: i32,
    pub trigger_code: i32,
    pub trigger_msg: String,
    /// Probed id watermark for incremental-by-id jobs.
    pub max_id: Option<i64>,
    /// Execution outcome, filled in by the callback sink. Zero means "no
    /// callback received yet".
    pub handle_code: i32,
    pub handle_msg: String,
    pub handle_time: Option<DateTime<Utc>>,
    pub process_id: Option<String>,
}

impl TriggerLogRecord {
    pub fn new(job: &JobInfo, trigger_time: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            job_id: job.id,
            group_id: job.group_id,
            trigger_time,
            executor_address: None,
            executor_handler: job.executor_handler.clone(),
            executor_params: job.executor_params.clone(),
            sharding_param: None,
            fail_retry_count: 0,
            trigger_code: 0,
            trigger_msg: String::new(),
            max_id: None,
            handle_code: 0,
            handle_msg: String::new(),
            handle_time: None,
            process_id: None,
        }
    }

    /// Whether the execution outcome has already been recorded.
    pub fn has_handle_result(&self) -> bool {
        self.handle_code > 0
    }
}
