use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Result type for capability operations.
pub type CapResult<T> = Result<T, CapError>;

#[derive(Debug, thiserror::Error)]
pub enum CapError {
    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout")]
    Timeout,
}

// ---------------------------------------------------------------------------
// Process operations
// ---------------------------------------------------------------------------

/// A fully resolved external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Kill the child if the caller stops waiting for it. Off by default:
    /// an abandoned worker call still runs to completion.
    pub kill_on_drop: bool,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            kill_on_drop: false,
        }
    }

    pub fn killed_on_drop(mut self) -> Self {
        self.kill_on_drop = true;
        self
    }

    /// Shell-ish rendering for logs only.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

/// Everything a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

#[async_trait::async_trait]
pub trait ProcessOps: Send + Sync {
    /// Run to completion, draining stdout and stderr while waiting.
    async fn run_captured(&self, cmd: &CommandSpec) -> CapResult<CapturedOutput>;

    /// Run to completion with output discarded. `Ok(true)` iff exit status 0.
    /// A `timeout` that elapses yields `CapError::Timeout`.
    async fn run_status(&self, cmd: &CommandSpec, timeout: Option<Duration>) -> CapResult<bool>;

    /// Start a process without waiting for it or owning it afterwards.
    fn spawn_detached(&self, cmd: &CommandSpec) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

pub trait FilesystemOps: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}
