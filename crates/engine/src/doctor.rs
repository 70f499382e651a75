//! Doctor – gather environment facts relevant to the panel.

use crate::bridge::CommandBridge;
use crate::context::AppContext;
use crate::readiness::ReadinessMonitor;
use crate::traits::CommandSpec;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    pub os: String,
    pub arch: String,
    pub kernel: String,
    pub headless: bool,
    pub worker: WorkerFacts,
    pub docker_cli: Option<String>,
    pub qemu_system: bool,
    pub qemu_img: bool,
    pub engine_reachable: bool,
    pub engine_state: EngineState,
    pub launcher: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerFacts {
    pub program: String,
    pub program_found: bool,
    pub script: Option<String>,
    pub script_found: Option<bool>,
    pub working_dir: Option<String>,
}

/// Run every check. Never fails; missing tools show up as `false`/`None`.
pub async fn run_doctor(
    ctx: &AppContext,
    bridge: &CommandBridge,
    monitor: &ReadinessMonitor,
) -> DoctorReport {
    let worker = bridge.worker();
    let program_found = if Path::new(&worker.program).components().count() > 1 {
        ctx.fs().exists(Path::new(&worker.program))
    } else {
        tool_answers(ctx, &worker.program, "--version").await
    };

    DoctorReport {
        os: current_os().to_string(),
        arch: std::env::consts::ARCH.to_string(),
        kernel: kernel_version(ctx).await,
        headless: detect_headless(),
        worker: WorkerFacts {
            program: worker.program.clone(),
            program_found,
            script: worker.script.as_ref().map(|s| s.display().to_string()),
            script_found: worker.script.as_ref().map(|s| ctx.fs().exists(s)),
            working_dir: worker.working_dir().map(|d| d.display().to_string()),
        },
        docker_cli: docker_version(ctx).await,
        qemu_system: tool_answers(ctx, "qemu-system-x86_64", "--version").await,
        qemu_img: tool_answers(ctx, "qemu-img", "--version").await,
        engine_reachable: monitor.probe().is_running(ctx).await,
        engine_state: monitor.state(),
        launcher: monitor.launcher_name().to_string(),
    }
}

async fn tool_answers(ctx: &AppContext, program: &str, flag: &str) -> bool {
    ctx.process()
        .run_status(&CommandSpec::new(program, [flag]), Some(TOOL_TIMEOUT))
        .await
        .unwrap_or(false)
}

async fn first_line(ctx: &AppContext, program: &str, args: &[&str]) -> Option<String> {
    let cmd = CommandSpec::new(program, args.iter().copied());
    let fut = ctx.process().run_captured(&cmd);
    let out = tokio::time::timeout(TOOL_TIMEOUT, fut).await.ok()?.ok()?;
    if out.exit_code != Some(0) {
        return None;
    }
    out.stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}

async fn docker_version(ctx: &AppContext) -> Option<String> {
    first_line(ctx, "docker", &["--version"]).await
}

async fn kernel_version(ctx: &AppContext) -> String {
    if cfg!(windows) {
        return "unknown".to_string();
    }
    first_line(ctx, "uname", &["-r"])
        .await
        .unwrap_or_else(|| "unknown".into())
}
