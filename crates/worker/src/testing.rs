//! Canned process runner for action tests.

use engine::platform::{ManualClock, StdFilesystem};
use engine::traits::*;
use engine::AppContext;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Calls = Arc<Mutex<Vec<CommandSpec>>>;

/// Hands out queued outputs in order. Once the queue is empty every program
/// looks missing.
struct CannedProcess {
    responses: Mutex<VecDeque<CapturedOutput>>,
    calls: Calls,
}

impl CannedProcess {
    fn next(&self, cmd: &CommandSpec) -> CapResult<CapturedOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CapError::DependencyMissing(cmd.program.clone()))
    }
}

#[async_trait::async_trait]
impl ProcessOps for CannedProcess {
    async fn run_captured(&self, cmd: &CommandSpec) -> CapResult<CapturedOutput> {
        self.next(cmd)
    }

    async fn run_status(&self, cmd: &CommandSpec, _timeout: Option<Duration>) -> CapResult<bool> {
        self.next(cmd).map(|o| o.exit_code == Some(0))
    }

    fn spawn_detached(&self, cmd: &CommandSpec) -> CapResult<()> {
        self.calls.lock().unwrap().push(cmd.clone());
        Ok(())
    }
}

pub fn fake_context(responses: Vec<CapturedOutput>) -> (AppContext, Calls) {
    let calls = Calls::default();
    let process = CannedProcess {
        responses: Mutex::new(responses.into()),
        calls: calls.clone(),
    };
    let ctx = AppContext::new(
        Box::new(process),
        Box::new(StdFilesystem),
        Arc::new(ManualClock::new()),
    );
    (ctx, calls)
}

pub fn output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> CapturedOutput {
    CapturedOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

/// Fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("panel-worker-tests")
        .join(format!("{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
