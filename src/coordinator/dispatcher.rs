use std::sync::Arc;

use chrono::{Timelike, Utc};

use crate::coordinator::proxy::ExecutorStubCache;
use crate::coordinator::registry::WorkerRegistry;
use crate::coordinator::repository::Repository;
use crate::coordinator::router::Router;
use crate::model::{
    AddressSource, IncrementKind, JobGroup, JobInfo, ResultEnvelope, RouteStrategy,
    TriggerLogRecord, TriggerMessage, TriggerType,
};

/// Orchestrates one logical trigger: load job, resolve sharding, persist a
/// log record, route, invoke the remote executor, record the outcome.
///
/// `trigger` never returns an error: every failure path below the dispatch
/// boundary terminates in a logged, persisted outcome. The only
/// unrecoverable condition is an unknown job id, which is a no-op.
pub struct TriggerDispatcher {
    repository: Arc<dyn Repository>,
    stubs: Arc<ExecutorStubCache>,
    router: Router,
    worker_registry: Arc<WorkerRegistry>,
}

impl TriggerDispatcher {
    pub fn new(
        repository: Arc<dyn Repository>,
        stubs: Arc<ExecutorStubCache>,
        worker_registry: Arc<WorkerRegistry>,
    ) -> Self {
        Self {
            repository,
            stubs,
            router: Router::new(),
            worker_registry,
        }
    }

    /// Fire one logical trigger for `job_id`.
    ///
    /// `fail_retry_count`: a non-negative override wins over the job's
    /// configured count. `param_override`: replaces the stored executor
    /// params for this firing. `sharding_override`: `"index/total"`;
    /// malformed input is treated as absent, not as an error.
    pub async fn trigger(
        &self,
        job_id: i32,
        trigger_type: TriggerType,
        fail_retry_count: Option<i32>,
        sharding_override: Option<&str>,
        param_override: Option<&str>,
    ) {
        let Some(mut job) = self.repository.load_job(job_id).await else {
            tracing::warn!(job_id, "Trigger skipped, job id invalid");
            return;
        };

        if let Some(params) = param_override {
            job.executor_params = params.to_string();
        }
        let retry_count = fail_retry_count
            .filter(|count| *count >= 0)
            .unwrap_or(job.fail_retry_count);

        let group = self.resolve_group(&job).await;
        let sharding = sharding_override.and_then(parse_sharding);

        if job.route_strategy == RouteStrategy::ShardingBroadcast
            && sharding.is_none()
            && !group.addresses.is_empty()
        {
            let total = group.addresses.len() as i32;
            for index in 0..total {
                self.process_trigger(&group, &job, retry_count, trigger_type, index, total)
                    .await;
            }
        } else {
            let (index, total) = sharding.unwrap_or((0, 1));
            self.process_trigger(&group, &job, retry_count, trigger_type, index, total)
                .await;
        }
    }

    /// Resolve the group's effective address list. Auto-discovered groups
    /// read the worker registry at dispatch time; a missing group dispatches
    /// against an empty list so the attempt is still recorded as failed.
    async fn resolve_group(&self, job: &JobInfo) -> JobGroup {
        match self.repository.load_group(job.group_id).await {
            Some(mut group) => {
                if group.address_source == AddressSource::Auto {
                    group.addresses = self.worker_registry.alive_addresses(&group.app_name);
                }
                group
            }
            None => {
                tracing::warn!(
                    job_id = job.id,
                    group_id = job.group_id,
                    "Job group missing, dispatching with empty address list"
                );
                JobGroup {
                    id: job.group_id,
                    app_name: String::new(),
                    addresses: Vec::new(),
                    address_source: AddressSource::Manual,
                }
            }
        }
    }

    /// One dispatch unit: one log record, one trigger message, at most one
    /// remote call.
    async fn process_trigger(
        &self,
        group: &JobGroup,
        job: &JobInfo,
        retry_count: i32,
        trigger_type: TriggerType,
        index: i32,
        total: i32,
    ) {
        let broadcast = job.route_strategy == RouteStrategy::ShardingBroadcast;
        let sharding_param = broadcast.then(|| format!("{index}/{total}"));

        // Log-record creation precedes the remote call, so an attempt that
        // dies mid-call is still observable.
        let trigger_time = Utc::now().with_nanosecond(0).unwrap_or_else(Utc::now);
        let mut record = TriggerLogRecord::new(job, trigger_time);
        if let Err(e) = self.repository.save_log(&mut record).await {
            tracing::error!(job_id = job.id, error = %e, "Saving trigger log failed, attempt dropped");
            return;
        }
        tracing::debug!(job_id = job.id, log_id = record.id, "Trigger start");

        let mut message = build_message(job, &record, index, total);
        self.resolve_increment(job, &mut record, &mut message).await;

        // Resolve the target address. Broadcast indexes into the list with
        // an index-0 fallback; every other strategy delegates to the router.
        let mut address = None;
        let mut route_result: Option<ResultEnvelope<String>> = None;
        if !group.addresses.is_empty() {
            if broadcast {
                let idx = index as usize;
                let fallback_idx = if idx < group.addresses.len() { idx } else { 0 };
                address = Some(group.addresses[fallback_idx].clone());
            } else {
                let routed = self
                    .router
                    .route(job.route_strategy, &message, &group.addresses, &self.stubs)
                    .await;
                if routed.is_success() {
                    address = routed.content.clone();
                }
                route_result = Some(routed);
            }
        } else {
            route_result = Some(ResultEnvelope::fail(
                "trigger failed, executor address list is empty",
            ));
        }

        let trigger_result = match &address {
            Some(address) => self.run_executor(&message, address).await,
            None => ResultEnvelope::fail_empty(),
        };

        let trigger_msg = compose_trace(
            trigger_type,
            group,
            job,
            retry_count,
            sharding_param.as_deref(),
            route_result.as_ref(),
            &trigger_result,
        );

        record.executor_address = address;
        record.sharding_param = sharding_param;
        record.fail_retry_count = retry_count;
        record.trigger_code = trigger_result.code;
        record.trigger_msg = trigger_msg;
        if let Err(e) = self.repository.update_log_trigger_info(&record).await {
            tracing::error!(job_id = job.id, log_id = record.id, error = %e, "Updating trigger log failed");
        }
        tracing::debug!(job_id = job.id, log_id = record.id, "Trigger end");
    }

    /// Fill in increment bounds when the job declares an increment type. A
    /// probe failure must not crash dispatch: the message goes out with
    /// null bounds and the remote side tolerates them.
    async fn resolve_increment(
        &self,
        job: &JobInfo,
        record: &mut TriggerLogRecord,
        message: &mut TriggerMessage,
    ) {
        let Some(increment) = &job.increment else {
            return;
        };
        message.increment_kind = Some(increment.kind);
        message.replace_param = increment.replace_param.clone();
        match increment.kind {
            IncrementKind::Id => {
                let table = increment.reader_table.as_deref().unwrap_or("");
                let primary_key = increment.primary_key.as_deref().unwrap_or("id");
                match self.repository.max_id(table, primary_key).await {
                    Ok(max_id) => {
                        record.max_id = Some(max_id);
                        message.end_id = Some(max_id);
                        message.start_id = increment.start_id;
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id = job.id,
                            table,
                            error = %e,
                            "Max-id probe failed, dispatching with null bounds"
                        );
                    }
                }
            }
            IncrementKind::Time => {
                message.start_time = increment.start_time;
                message.trigger_time = Some(record.trigger_time);
                message.replace_param_type = increment.replace_param_type.clone();
            }
            IncrementKind::Partition => {
                message.partition_info = increment.partition_info.clone();
            }
        }
    }

    /// Invoke the remote executor. Any transport or remote fault is caught
    /// and converted into a failure envelope carrying the cause; it never
    /// propagates out of `trigger`.
    async fn run_executor(
        &self,
        message: &TriggerMessage,
        address: &str,
    ) -> ResultEnvelope<String> {
        let run_result = match self.stubs.get_stub(address) {
            Some(stub) => match stub.run(message).await {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(
                        address,
                        job_id = message.job_id,
                        error = %e,
                        "Trigger remote call failed, check whether the executor is running"
                    );
                    ResultEnvelope::fail(e.to_string())
                }
            },
            None => ResultEnvelope::fail("executor address is blank"),
        };

        ResultEnvelope {
            code: run_result.code,
            msg: format!(
                "run executor:\naddress: {address}\ncode: {}\nmsg: {}",
                run_result.code, run_result.msg
            ),
            content: run_result.content,
        }
    }
}

/// Parse an `"index/total"` sharding override. Non-numeric segments or a
/// wrong segment count yield `None`.
fn parse_sharding(raw: &str) -> Option<(i32, i32)> {
    let mut parts = raw.split('/');
    let index = parts.next()?.parse::<i32>().ok()?;
    let total = parts.next()?.parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((index, total))
}

fn build_message(
    job: &JobInfo,
    record: &TriggerLogRecord,
    index: i32,
    total: i32,
) -> TriggerMessage {
    TriggerMessage {
        job_id: job.id,
        executor_handler: job.executor_handler.clone(),
        executor_params: job.executor_params.clone(),
        block_strategy: job.block_strategy,
        timeout_secs: job.timeout_secs,
        log_id: record.id,
        log_date_time_ms: record.trigger_time.timestamp_millis(),
        glue_type: job.glue_type,
        glue_source: job.glue_source.clone(),
        glue_update_time_ms: job.glue_update_time.timestamp_millis(),
        broadcast_index: index,
        broadcast_total: total,
        increment_kind: None,
        start_id: None,
        end_id: None,
        start_time: None,
        trigger_time: None,
        partition_info: None,
        replace_param: None,
        replace_param_type: None,
        runtime_param: job.runtime_param.clone(),
    }
}

/// Human-readable audit trace attached to the log record.
fn compose_trace(
    trigger_type: TriggerType,
    group: &JobGroup,
    job: &JobInfo,
    retry_count: i32,
    sharding_param: Option<&str>,
    route_result: Option<&ResultEnvelope<String>>,
    trigger_result: &ResultEnvelope<String>,
) -> String {
    let mut trace = String::new();
    trace.push_str(&format!("trigger type: {trigger_type}\n"));
    trace.push_str(&format!(
        "registry source: {:?}, addresses: {:?}\n",
        group.address_source, group.addresses
    ));
    trace.push_str(&format!("route strategy: {}", job.route_strategy));
    if let Some(sharding) = sharding_param {
        trace.push_str(&format!(" ({sharding})"));
    }
    trace.push('\n');
    trace.push_str(&format!("block strategy: {}\n", job.block_strategy));
    trace.push_str(&format!("timeout: {}s\n", job.timeout_secs));
    trace.push_str(&format!("retry count: {retry_count}\n"));
    trace.push_str(">>>>>>>>>>> trigger run <<<<<<<<<<<\n");
    if let Some(routed) = route_result {
        if !routed.msg.is_empty() {
            trace.push_str(&routed.msg);
            trace.push('\n');
        }
    }
    if !trigger_result.msg.is_empty() {
        trace.push_str(&trigger_result.msg);
    }
    trace
}
