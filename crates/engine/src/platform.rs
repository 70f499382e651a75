//! Platform implementations of the capability traits.
//!
//! - [`TokioProcess`]: real child processes via `tokio::process`
//! - [`StdFilesystem`]: path checks via std::fs
//! - [`TokioClock`]: wall clock + `tokio::time::sleep`
//! - [`ManualClock`]: virtual clock for deterministic tests and simulations

use crate::traits::*;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ===========================================================================
// Processes – wraps tokio::process
// ===========================================================================

pub struct TokioProcess;

fn spawn_error(program: &str, e: std::io::Error) -> CapError {
    match e.kind() {
        std::io::ErrorKind::NotFound => CapError::DependencyMissing(format!("{} not found", program)),
        std::io::ErrorKind::PermissionDenied => {
            CapError::PermissionDenied(format!("cannot execute {}: {}", program, e))
        }
        _ => CapError::Io(e),
    }
}

#[async_trait::async_trait]
impl ProcessOps for TokioProcess {
    async fn run_captured(&self, cmd: &CommandSpec) -> CapResult<CapturedOutput> {
        let mut command = tokio::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(cmd.kill_on_drop);
        if let Some(ref dir) = cmd.cwd {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| spawn_error(&cmd.program, e))?;

        // wait_with_output drains both pipes concurrently with the wait.
        let output = child.wait_with_output().await?;
        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn run_status(&self, cmd: &CommandSpec, timeout: Option<Duration>) -> CapResult<bool> {
        let mut command = tokio::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(ref dir) = cmd.cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| spawn_error(&cmd.program, e))?;

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(res) => res?,
                Err(_) => {
                    let _ = child.start_kill();
                    return Err(CapError::Timeout);
                }
            },
            None => child.wait().await?,
        };
        Ok(status.success())
    }

    fn spawn_detached(&self, cmd: &CommandSpec) -> CapResult<()> {
        let mut command = std::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(ref dir) = cmd.cwd {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| spawn_error(&cmd.program, e))?;

        // Not supervised; the thread only reaps the exit status.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

// ===========================================================================
// Filesystem – wraps std::fs
// ===========================================================================

pub struct StdFilesystem;

impl FilesystemOps for StdFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

// ===========================================================================
// Clocks
// ===========================================================================

pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time instantly instead of waiting.
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|p| p.into_inner());
        *elapsed += by;
    }

    /// Total virtual time passed since construction.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
