//! Scripted capability doubles shared by the unit tests.

use crate::context::AppContext;
use crate::platform::ManualClock;
use crate::traits::*;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub enum Scripted {
    Output(CapturedOutput),
    Status(bool),
    Fail(fn() -> CapError),
}

/// Replays queued responses and records every command it was handed.
#[derive(Default)]
pub struct ScriptedProcess {
    responses: Mutex<VecDeque<Scripted>>,
    pub calls: Arc<Mutex<Vec<CommandSpec>>>,
    pub detached: Arc<Mutex<Vec<CommandSpec>>>,
    /// Programs whose detached spawn fails as if missing.
    pub missing: Vec<String>,
}

impl ScriptedProcess {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    fn next(&self) -> Option<Scripted> {
        self.responses.lock().unwrap().pop_front()
    }
}

#[async_trait::async_trait]
impl ProcessOps for ScriptedProcess {
    async fn run_captured(&self, cmd: &CommandSpec) -> CapResult<CapturedOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        match self.next() {
            Some(Scripted::Output(o)) => Ok(o),
            Some(Scripted::Fail(f)) => Err(f()),
            Some(Scripted::Status(_)) | None => Ok(CapturedOutput::default()),
        }
    }

    async fn run_status(&self, cmd: &CommandSpec, _timeout: Option<Duration>) -> CapResult<bool> {
        self.calls.lock().unwrap().push(cmd.clone());
        match self.next() {
            Some(Scripted::Status(ok)) => Ok(ok),
            Some(Scripted::Fail(f)) => Err(f()),
            Some(Scripted::Output(o)) => Ok(o.exit_code == Some(0)),
            None => Ok(false),
        }
    }

    fn spawn_detached(&self, cmd: &CommandSpec) -> CapResult<()> {
        if self.missing.iter().any(|m| m == &cmd.program) {
            return Err(CapError::DependencyMissing(format!("{} not found", cmd.program)));
        }
        self.detached.lock().unwrap().push(cmd.clone());
        Ok(())
    }
}

/// Filesystem where only the listed paths exist.
pub struct FakeFilesystem(pub Vec<PathBuf>);

impl FilesystemOps for FakeFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.0.iter().any(|p| p == path)
    }
}

pub fn output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> CapturedOutput {
    CapturedOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

pub fn scripted_context(
    process: ScriptedProcess,
    existing: Vec<PathBuf>,
) -> (AppContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let ctx = AppContext::new(
        Box::new(process),
        Box::new(FakeFilesystem(existing)),
        clock.clone(),
    );
    (ctx, clock)
}
