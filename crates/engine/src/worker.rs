//! Worker location and invocation layout.

use crate::context::AppContext;
use crate::traits::CommandSpec;
use crate::types::OperationRequest;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the bundled worker binary.
pub const BUNDLED_WORKER: &str = if cfg!(windows) {
    "panel-worker.exe"
} else {
    "panel-worker"
};

/// How to start the worker process.
///
/// With a `script`, `program` is its interpreter and the script path is the
/// first argument. The working directory is the directory of the script,
/// or of the program when there is no script. Relative paths are made
/// absolute on construction, since the child starts in that directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub program: String,
    pub script: Option<PathBuf>,
}

impl WorkerSpec {
    pub fn binary(program: impl Into<String>) -> Self {
        Self {
            program: program_path(program.into()),
            script: None,
        }
    }

    pub fn script(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program_path(interpreter.into()),
            script: Some(absolute(script.into())),
        }
    }

    /// The bundled worker next to the running executable, or on PATH.
    pub fn bundled() -> Self {
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(BUNDLED_WORKER)))
            .filter(|p| p.exists());
        match beside_exe {
            Some(p) => Self::binary(p.display().to_string()),
            None => Self::binary(BUNDLED_WORKER),
        }
    }

    pub fn working_dir(&self) -> Option<PathBuf> {
        let anchor = match self.script {
            Some(ref s) => s.as_path(),
            None => Path::new(&self.program),
        };
        anchor
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    /// Lay out one invocation:
    /// `<program> [<script>] --service <svc> --action <action> --args <json>`.
    pub fn command_for(&self, request: &OperationRequest, args_json: &str) -> CommandSpec {
        let mut args = Vec::with_capacity(7);
        if let Some(ref s) = self.script {
            args.push(s.display().to_string());
        }
        args.extend([
            "--service".to_string(),
            request.service.to_string(),
            "--action".to_string(),
            request.action.clone(),
            "--args".to_string(),
            args_json.to_string(),
        ]);
        let mut cmd = CommandSpec::new(self.program.clone(), args);
        cmd.cwd = self.working_dir();
        cmd
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// Bare names stay as they are for PATH lookup; anything with a directory
/// part is anchored to the current directory.
fn program_path(program: String) -> String {
    if Path::new(&program).components().count() > 1 {
        absolute(PathBuf::from(&program)).display().to_string()
    } else {
        program
    }
}

/// Interpreter names to try for script workers, in order.
pub fn default_interpreter_candidates() -> Vec<String> {
    let names: &[&str] = if cfg!(windows) {
        &["python", "python3", "py"]
    } else {
        &["python3", "python"]
    };
    names.iter().map(|s| s.to_string()).collect()
}

/// First candidate answering `--version` with exit 0; the first candidate
/// otherwise, so the later spawn error names something meaningful.
pub async fn find_interpreter(ctx: &AppContext, candidates: &[String]) -> Option<String> {
    for name in candidates {
        let probe = CommandSpec::new(name.clone(), ["--version"]);
        match ctx
            .process()
            .run_status(&probe, Some(Duration::from_secs(5)))
            .await
        {
            Ok(true) => return Some(name.clone()),
            Ok(false) => tracing::debug!(candidate = %name, "interpreter probe exited non-zero"),
            Err(e) => tracing::debug!(candidate = %name, error = %e, "interpreter probe failed"),
        }
    }
    candidates.first().cloned()
}
