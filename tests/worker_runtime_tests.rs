//! Worker runtime tests: trigger reception, handler resolution, probes and
//! graceful shutdown.


use std::sync::Arc;

use dispatch_lite::config::WorkerConfig;
use dispatch_lite::model::{
    BlockStrategy, GlueType, HANDLE_CODE_CANCELLED, SUCCESS_CODE,
};
use dispatch_lite::worker::{CoordinatorClient, WorkerRuntime};
use test_harness::{sample_message, wait_until, GateHandler, NoopHandler, RecordingCoordinatorClient};

fn test_runtime() -> (
    Arc<WorkerRuntime>,
    Arc<RecordingCoordinatorClient>,
    tempfile::TempDir,
) {
    dispatch_lite::init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(RecordingCoordinatorClient::default());
    let mut config = WorkerConfig::new("data-sync", "127.0.0.1:9999");
    config.callback_spool_path = dir.path().join("spool.log");
    config.callback_retry_interval_ms = 100;
    config.heartbeat_interval_ms = 60_000;
    let runtime = WorkerRuntime::start(config, vec![client.clone() as Arc<dyn CoordinatorClient>]);
    (runtime, client, dir)
}

#[tokio::test]
async fn unknown_handler_is_rejected() {
    let (runtime, _client, _dir) = test_runtime();

    let mut message = sample_message(1, 1, BlockStrategy::SerialExecution);
    message.executor_handler = "missing".to_string();
    let env = runtime.receive_trigger(message);
    assert!(!env.is_success());
    assert!(env.msg.contains("not found"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn registered_handler_executes_and_reports_back() {
    let (runtime, client, _dir) = test_runtime();
    runtime.register_handler("syncHandler", Arc::new(NoopHandler));

    let env = runtime.receive_trigger(sample_message(1, 11, BlockStrategy::SerialExecution));
    assert!(env.is_success());

    wait_until(|| client.delivered().len() == 1).await;
    let callback = &client.delivered()[0];
    assert_eq!(callback.log_id, 11);
    assert_eq!(callback.handle_code, SUCCESS_CODE);

    runtime.shutdown().await;
}

#[tokio::test]
async fn shell_glue_runs_without_a_registered_handler() {
    let (runtime, client, _dir) = test_runtime();

    let mut message = sample_message(2, 21, BlockStrategy::SerialExecution);
    message.glue_type = GlueType::Shell;
    message.glue_source = "echo shard \"$2\"/\"$3\"".to_string();
    let env = runtime.receive_trigger(message);
    assert!(env.is_success());

    wait_until(|| client.delivered().len() == 1).await;
    let callback = &client.delivered()[0];
    assert_eq!(callback.log_id, 21);
    assert_eq!(callback.handle_code, SUCCESS_CODE);
    assert!(callback.handle_msg.contains("shard 0/1"));
    assert!(callback.process_id.is_some());

    runtime.shutdown().await;
}

#[tokio::test]
async fn idle_beat_reflects_job_thread_business() {
    let (runtime, _client, _dir) = test_runtime();
    let gate = GateHandler::new();
    runtime.register_handler("syncHandler", gate.clone());

    assert!(runtime.idle_beat(3).is_success());
    assert!(runtime.beat().is_success());

    let env = runtime.receive_trigger(sample_message(3, 31, BlockStrategy::SerialExecution));
    assert!(env.is_success());
    wait_until(|| gate.executions_started() == 1).await;
    assert!(!runtime.idle_beat(3).is_success());

    gate.release_one();
    wait_until(|| runtime.idle_beat(3).is_success()).await;

    runtime.shutdown().await;
}

#[tokio::test]
async fn shutdown_flushes_in_flight_work_as_cancelled() {
    let (runtime, client, _dir) = test_runtime();
    let gate = GateHandler::new();
    runtime.register_handler("syncHandler", gate.clone());

    let env = runtime.receive_trigger(sample_message(4, 41, BlockStrategy::SerialExecution));
    assert!(env.is_success());
    wait_until(|| gate.executions_started() == 1).await;

    runtime.shutdown().await;

    let delivered = client.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].log_id, 41);
    assert_eq!(delivered[0].handle_code, HANDLE_CODE_CANCELLED);
}
