//! Running external tools with an optional deadline.

use engine::traits::{CapError, CapturedOutput, CommandSpec};
use engine::AppContext;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error(transparent)]
    Cap(CapError),
}

/// Run to completion. A timeout drops the child, which kills it.
pub async fn run(
    ctx: &AppContext,
    cmd: &CommandSpec,
    limit: Option<Duration>,
) -> Result<CapturedOutput, ExecError> {
    tracing::debug!(command = %cmd.display(), ?limit, "running tool");
    let cmd = &cmd.clone().killed_on_drop();
    let fut = ctx.process().run_captured(cmd);
    let res = match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ExecError::TimedOut(limit))?,
        None => fut.await,
    };
    res.map_err(|e| match e {
        CapError::DependencyMissing(_) => ExecError::NotFound(cmd.program.clone()),
        other => ExecError::Cap(other),
    })
}

pub fn succeeded(out: &CapturedOutput) -> bool {
    out.exit_code == Some(0)
}

/// Trimmed stderr, or a generic exit description when stderr is empty.
pub fn stderr_or_status(out: &CapturedOutput) -> String {
    let err = out.stderr.trim();
    if !err.is_empty() {
        return err.to_string();
    }
    match out.exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    }
}
