//! Callback delivery, spool durability, callback sink idempotence and
//! registry heartbeat tests.


use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use dispatch_lite::coordinator::{CallbackSink, InMemoryRepository, Repository};
use dispatch_lite::model::{HandleCallbackParam, TriggerLogRecord, RouteStrategy, SUCCESS_CODE};
use dispatch_lite::worker::{CallbackReporter, CoordinatorClient, RegistryHeartbeat};
use test_harness::{sample_job, wait_until, RecordingCoordinatorClient};

fn param(log_id: i64, handle_code: i32) -> HandleCallbackParam {
    HandleCallbackParam::new(log_id, Utc::now().timestamp_millis(), handle_code, "done".to_string())
}

#[tokio::test]
async fn callbacks_are_delivered_to_the_first_healthy_coordinator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let failing = Arc::new(RecordingCoordinatorClient::default());
    failing.set_failing(true);
    let healthy = Arc::new(RecordingCoordinatorClient::default());

    let cancel = CancellationToken::new();
    let (tx, handle) = CallbackReporter::start(
        vec![
            failing.clone() as Arc<dyn CoordinatorClient>,
            healthy.clone() as Arc<dyn CoordinatorClient>,
        ],
        dir.path().join("spool.log"),
        Duration::from_secs(60),
        cancel.clone(),
    );

    tx.send(param(1, SUCCESS_CODE)).expect("reporter running");
    wait_until(|| healthy.delivered().len() == 1).await;
    assert_eq!(healthy.delivered()[0].log_id, 1);

    cancel.cancel();
    handle.await.expect("reporter task");
}

#[tokio::test]
async fn undeliverable_callbacks_are_spooled_and_retried() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spool = dir.path().join("spool.log");
    let client = Arc::new(RecordingCoordinatorClient::default());
    client.set_failing(true);

    let cancel = CancellationToken::new();
    let (tx, handle) = CallbackReporter::start(
        vec![client.clone() as Arc<dyn CoordinatorClient>],
        spool.clone(),
        Duration::from_millis(100),
        cancel.clone(),
    );

    tx.send(param(7, SUCCESS_CODE)).expect("reporter running");
    {
        let spool = spool.clone();
        wait_until(move || spool.exists()).await;
    }
    assert!(client.delivered().is_empty());

    // Once a coordinator comes back, the spool drains and is removed.
    client.set_failing(false);
    wait_until(|| client.delivered().len() == 1).await;
    assert_eq!(client.delivered()[0].log_id, 7);
    {
        let spool = spool.clone();
        wait_until(move || !spool.exists()).await;
    }

    cancel.cancel();
    handle.await.expect("reporter task");
}

#[tokio::test]
async fn spool_left_by_a_previous_run_is_replayed_on_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spool = dir.path().join("spool.log");
    let leftover = serde_json::to_string(&param(42, SUCCESS_CODE)).expect("serializable");
    std::fs::write(&spool, format!("{leftover}\n")).expect("seed spool");

    let client = Arc::new(RecordingCoordinatorClient::default());
    let cancel = CancellationToken::new();
    let (_tx, handle) = CallbackReporter::start(
        vec![client.clone() as Arc<dyn CoordinatorClient>],
        spool.clone(),
        Duration::from_millis(100),
        cancel.clone(),
    );

    wait_until(|| client.delivered().len() == 1).await;
    assert_eq!(client.delivered()[0].log_id, 42);

    cancel.cancel();
    handle.await.expect("reporter task");
}

#[tokio::test]
async fn callback_sink_records_the_first_result_only() {
    let repository = Arc::new(InMemoryRepository::new());
    let job = sample_job(1, RouteStrategy::First);
    let mut record = TriggerLogRecord::new(&job, Utc::now());
    let log_id = repository.save_log(&mut record).await.expect("saved");

    let sink = CallbackSink::new(repository.clone());
    let first = sink.receive_callback(vec![param(log_id, SUCCESS_CODE)]).await;
    assert!(first.is_success());
    assert_eq!(
        repository.load_log(log_id).await.expect("record").handle_code,
        SUCCESS_CODE
    );

    // A repeated delivery with a different outcome must not overwrite.
    let repeat = sink.receive_callback(vec![param(log_id, 500)]).await;
    assert!(repeat.is_success());
    assert_eq!(
        repository.load_log(log_id).await.expect("record").handle_code,
        SUCCESS_CODE
    );
}

#[tokio::test]
async fn callback_sink_ignores_unknown_log_ids() {
    let repository = Arc::new(InMemoryRepository::new());
    let sink = CallbackSink::new(repository.clone());

    let env = sink.receive_callback(vec![param(999, SUCCESS_CODE)]).await;
    assert!(env.is_success());
    assert!(repository.load_log(999).await.is_none());
}

#[tokio::test]
async fn heartbeat_registers_and_deregisters() {
    let client = Arc::new(RecordingCoordinatorClient::default());
    let heartbeat = RegistryHeartbeat::new(
        vec![client.clone() as Arc<dyn CoordinatorClient>],
        "data-sync",
        "10.0.0.7:9999",
        Duration::from_millis(50),
    );

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { heartbeat.run(run_cancel).await });

    wait_until(|| !client.registrations.lock().unwrap().is_empty()).await;
    assert_eq!(
        client.registrations.lock().unwrap()[0],
        ("data-sync".to_string(), "10.0.0.7:9999".to_string())
    );

    cancel.cancel();
    handle.await.expect("heartbeat task");
    assert_eq!(
        client.removals.lock().unwrap()[0],
        ("data-sync".to_string(), "10.0.0.7:9999".to_string())
    );
}
