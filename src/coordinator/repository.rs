use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{DispatchError, Result};
use crate::model::{JobGroup, JobInfo, TriggerLogRecord};

/// External persistence consumed by the dispatch core.
///
/// Storage of job/group/log records is out of scope for this crate; the
/// dispatcher only needs load/save/update-by-id semantics. The max-id probe
/// backs incremental-by-id jobs and may fail; the dispatcher tolerates that
/// as null bounds.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_job(&self, job_id: i32) -> Option<JobInfo>;

    async fn load_group(&self, group_id: i32) -> Option<JobGroup>;

    /// Persist a fresh log record, assigning and returning its id.
    async fn save_log(&self, record: &mut TriggerLogRecord) -> Result<i64>;

    /// Record the trigger outcome (code, trace message, chosen address,
    /// sharding, retry count) for an existing log record.
    async fn update_log_trigger_info(&self, record: &TriggerLogRecord) -> Result<()>;

    async fn load_log(&self, log_id: i64) -> Option<TriggerLogRecord>;

    /// Record the execution outcome reported back by a worker.
    async fn update_log_handle_info(
        &self,
        log_id: i64,
        handle_code: i32,
        handle_msg: &str,
        handle_time: DateTime<Utc>,
        process_id: Option<&str>,
    ) -> Result<()>;

    /// Probe the current max id of `table.primary_key`.
    async fn max_id(&self, table: &str, primary_key: &str) -> Result<i64>;
}

/// In-memory [`Repository`] for embedding and tests.
#[derive(Default)]
pub struct InMemoryRepository {
    jobs: Mutex<HashMap<i32, JobInfo>>,
    groups: Mutex<HashMap<i32, JobGroup>>,
    logs: Mutex<HashMap<i64, TriggerLogRecord>>,
    max_ids: Mutex<HashMap<String, i64>>,
    next_log_id: AtomicI64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            next_log_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub fn insert_job(&self, job: JobInfo) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn insert_group(&self, group: JobGroup) {
        self.groups.lock().unwrap().insert(group.id, group);
    }

    /// Seed the watermark returned by [`Repository::max_id`] for
    /// `table.primary_key`.
    pub fn set_max_id(&self, table: &str, primary_key: &str, value: i64) {
        self.max_ids
            .lock()
            .unwrap()
            .insert(format!("{table}.{primary_key}"), value);
    }

    /// Snapshot of all log records, ordered by id.
    pub fn log_records(&self) -> Vec<TriggerLogRecord> {
        let mut records: Vec<_> = self.logs.lock().unwrap().values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn load_job(&self, job_id: i32) -> Option<JobInfo> {
        self.jobs.lock().unwrap().get(&job_id).cloned()
    }

    async fn load_group(&self, group_id: i32) -> Option<JobGroup> {
        self.groups.lock().unwrap().get(&group_id).cloned()
    }

    async fn save_log(&self, record: &mut TriggerLogRecord) -> Result<i64> {
        let id = self.next_log_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        self.logs.lock().unwrap().insert(id, record.clone());
        Ok(id)
    }

    async fn update_log_trigger_info(&self, record: &TriggerLogRecord) -> Result<()> {
        let mut logs = self.logs.lock().unwrap();
        let stored = logs
            .get_mut(&record.id)
            .ok_or(DispatchError::LogNotFound(record.id))?;
        stored.executor_address = record.executor_address.clone();
        stored.executor_handler = record.executor_handler.clone();
        stored.executor_params = record.executor_params.clone();
        stored.sharding_param = record.sharding_param.clone();
        stored.fail_retry_count = record.fail_retry_count;
        stored.trigger_code = record.trigger_code;
        stored.trigger_msg = record.trigger_msg.clone();
        stored.max_id = record.max_id;
        Ok(())
    }

    async fn load_log(&self, log_id: i64) -> Option<TriggerLogRecord> {
        self.logs.lock().unwrap().get(&log_id).cloned()
    }

    async fn update_log_handle_info(
        &self,
        log_id: i64,
        handle_code: i32,
        handle_msg: &str,
        handle_time: DateTime<Utc>,
        process_id: Option<&str>,
    ) -> Result<()> {
        let mut logs = self.logs.lock().unwrap();
        let stored = logs
            .get_mut(&log_id)
            .ok_or(DispatchError::LogNotFound(log_id))?;
        stored.handle_code = handle_code;
        stored.handle_msg = handle_msg.to_string();
        stored.handle_time = Some(handle_time);
        if let Some(pid) = process_id {
            stored.process_id = Some(pid.to_string());
        }
        Ok(())
    }

    async fn max_id(&self, table: &str, primary_key: &str) -> Result<i64> {
        self.max_ids
            .lock()
            .unwrap()
            .get(&format!("{table}.{primary_key}"))
            .copied()
            .ok_or_else(|| {
                DispatchError::Internal(format!("max id probe failed for {table}.{primary_key}"))
            })
    }
}
