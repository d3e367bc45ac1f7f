use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::model::ResultEnvelope;
use crate::worker::handler::{JobContext, JobHandler};

/// Runs coordinator-shipped shell source through `sh -c`.
///
/// The script receives three positional arguments: the executor params and
/// the sharding index and total. Stdout of a zero-exit run becomes the
/// handle message and the child pid becomes the process handle; a non-zero
/// exit fails with stderr. The child is killed if the surrounding execution
/// is cancelled or times out, since the future is dropped and the handle is
/// spawned with kill-on-drop.
pub struct ShellGlueHandler {
    source: String,
}

impl ShellGlueHandler {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[async_trait]
impl JobHandler for ShellGlueHandler {
    async fn execute(&self, ctx: JobContext) -> ResultEnvelope<String> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.source)
            .arg("dispatch-job")
            .arg(ctx.params())
            .arg(ctx.message.broadcast_index.to_string())
            .arg(ctx.message.broadcast_total.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id = ctx.job_id(), error = %e, "Spawning shell job failed");
                return ResultEnvelope::fail(format!("failed to spawn shell job: {e}"));
            }
        };
        let pid = child.id();

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => {
                return ResultEnvelope::fail(format!("failed to wait for shell job: {e}"));
            }
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let mut env = ResultEnvelope::ok_msg(stdout);
            env.content = pid.map(|pid| pid.to_string());
            env
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let msg = if stderr.is_empty() {
                format!("shell job exited with status {}", output.status)
            } else {
                stderr
            };
            ResultEnvelope::fail(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TriggerMessage;
    use tokio_util::sync::CancellationToken;

    fn ctx_with(source_params: &str, index: i32, total: i32) -> JobContext {
        let mut message = TriggerMessage::default();
        message.executor_params = source_params.to_string();
        message.broadcast_index = index;
        message.broadcast_total = total;
        JobContext {
            message,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn shell_job_receives_positional_arguments() {
        let handler = ShellGlueHandler::new("echo \"$1|$2|$3\"");
        let env = handler.execute(ctx_with("alpha", 2, 5)).await;
        assert!(env.is_success());
        assert_eq!(env.msg, "alpha|2|5");
        assert!(env.content.is_some());
    }

    #[tokio::test]
    async fn shell_job_failure_reports_stderr() {
        let handler = ShellGlueHandler::new("echo boom >&2; exit 3");
        let env = handler.execute(ctx_with("", 0, 1)).await;
        assert!(!env.is_success());
        assert_eq!(env.msg, "boom");
    }
}
