use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::model::HandleCallbackParam;
use crate::worker::CoordinatorClient;

/// Asynchronous result shipping, decoupled from the execution path.
///
/// Job threads push callbacks into an unbounded queue; a single drain task
/// batches everything available per cycle and tries each coordinator
/// endpoint in order until one accepts. A batch that no endpoint accepts is
/// appended to a JSON-lines spool file and retried on a fixed interval, so
/// callbacks are never silently lost; they may be delayed across process
/// restarts if the spool survives.
pub struct CallbackReporter;

impl CallbackReporter {
    /// Spawn the drain task. Returns the queue's sender half and the task
    /// handle; cancelling `cancel` drains what is left and exits.
    pub fn start(
        clients: Vec<Arc<dyn CoordinatorClient>>,
        spool_path: PathBuf,
        retry_interval: Duration,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedSender<HandleCallbackParam>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drain_loop(clients, spool_path, retry_interval, cancel, rx));
        (tx, handle)
    }
}

async fn drain_loop(
    clients: Vec<Arc<dyn CoordinatorClient>>,
    spool_path: PathBuf,
    retry_interval: Duration,
    cancel: CancellationToken,
    mut rx: mpsc::UnboundedReceiver<HandleCallbackParam>,
) {
    // The first tick fires immediately, which also retries a spool left
    // over from a previous run.
    let mut retry_tick = tokio::time::interval(retry_interval);
    retry_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = rx.recv() => {
                let Some(item) = item else { break };
                let mut batch = vec![item];
                while let Ok(more) = rx.try_recv() {
                    batch.push(more);
                }
                if !deliver(&clients, &batch).await {
                    spool_append(&spool_path, &batch).await;
                }
            }
            _ = retry_tick.tick() => {
                retry_spool(&clients, &spool_path).await;
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }

    // Final drain so nothing queued at shutdown is lost.
    let mut batch = Vec::new();
    while let Ok(item) = rx.try_recv() {
        batch.push(item);
    }
    if !batch.is_empty() && !deliver(&clients, &batch).await {
        spool_append(&spool_path, &batch).await;
    }
    tracing::info!("Callback reporter stopped");
}

/// Ship one batch, trying each coordinator in order until one accepts.
async fn deliver(clients: &[Arc<dyn CoordinatorClient>], batch: &[HandleCallbackParam]) -> bool {
    for client in clients {
        match client.callback(batch).await {
            Ok(env) if env.is_success() => {
                tracing::debug!(count = batch.len(), "Callback batch delivered");
                return true;
            }
            Ok(env) => {
                tracing::warn!(code = env.code, msg = %env.msg, "Callback batch rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Callback delivery failed");
            }
        }
    }
    false
}

async fn spool_append(path: &Path, batch: &[HandleCallbackParam]) {
    let mut buffer = String::new();
    for item in batch {
        match serde_json::to_string(item) {
            Ok(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
            }
            Err(e) => {
                tracing::error!(log_id = item.log_id, error = %e, "Callback not spoolable, dropped");
            }
        }
    }
    if buffer.is_empty() {
        return;
    }

    match write_spool(path, &buffer).await {
        Ok(()) => tracing::warn!(count = batch.len(), spool = %path.display(), "Callback batch spooled"),
        Err(e) => tracing::error!(error = %e, spool = %path.display(), "Writing callback spool failed"),
    }
}

async fn write_spool(path: &Path, buffer: &str) -> crate::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(buffer.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Re-deliver spooled callbacks; the file is removed only after the whole
/// set is accepted.
async fn retry_spool(clients: &[Arc<dyn CoordinatorClient>], path: &Path) {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::error!(error = %e, spool = %path.display(), "Reading callback spool failed");
            return;
        }
    };

    let items: Vec<HandleCallbackParam> = data
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::error!(error = %e, "Corrupt spool line dropped");
                None
            }
        })
        .collect();

    if items.is_empty() {
        let _ = tokio::fs::remove_file(path).await;
        return;
    }

    if deliver(clients, &items).await {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::error!(error = %e, spool = %path.display(), "Removing delivered spool failed");
        } else {
            tracing::info!(count = items.len(), "Spooled callbacks delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DispatchError;

    #[tokio::test]
    async fn unwritable_spool_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("spool.log");
        let err = write_spool(&path, "{}\n").await.unwrap_err();
        assert!(matches!(err, DispatchError::Io(_)));
    }

    #[tokio::test]
    async fn spool_lines_append() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spool.log");
        write_spool(&path, "one\n").await.expect("first write");
        write_spool(&path, "two\n").await.expect("second write");
        let data = tokio::fs::read_to_string(&path).await.expect("read back");
        assert_eq!(data, "one\ntwo\n");
    }
}
