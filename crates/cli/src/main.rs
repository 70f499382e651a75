//! `panelctl` – headless CLI for the container/VM control panel.
//!
//! Drives the same facade a GUI would: worker operations through the
//! command bridge, engine readiness, diagnostics and scripted scenarios.

#[cfg(unix)]
mod serve;

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine::actions::{is_destructive, known_actions};
use engine::scenario::{load_scenario, ScenarioResult};
use engine::types::*;
use panel::Panel;
use std::path::{Path, PathBuf};

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "panelctl",
    version,
    about = "Headless CLI for the container/VM control panel"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect environment facts: tools, worker, engine reachability.
    Doctor {
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
        /// Write report JSON to this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run one worker action.
    Call {
        /// Service: docker | qemu
        service: Service,
        /// Action name (e.g. "list_images", "stop_vm").
        action: String,
        /// JSON object of action arguments.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Skip the confirmation prompt for destructive actions.
        #[arg(long, short = 'y')]
        yes: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Make sure the container engine is running, starting it if needed.
    Engine {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the actions each service understands.
    Actions {
        /// Limit to one service.
        service: Option<Service>,
    },

    /// Run a scripted scenario from a YAML file.
    RunScenario {
        /// Path to the scenario YAML file.
        file: PathBuf,
        /// Directory for artifacts output.
        #[arg(long)]
        artifacts: Option<PathBuf>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start daemon mode over a Unix socket.
    Serve {
        /// Path for the Unix domain socket.
        #[arg(long)]
        socket: PathBuf,
    },
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = panel::get_config().context("failed to load configuration")?;
    panel::logging::init_logging(&config.logging);

    let panel = Panel::from_config(config).await;

    let code = match cli.command {
        Commands::Doctor { json, out } => cmd_doctor(&panel, json, out).await,
        Commands::Call {
            service,
            action,
            args,
            yes,
            json,
        } => cmd_call(&panel, service, &action, &args, yes, json).await,
        Commands::Engine { json } => cmd_engine(&panel, json).await,
        Commands::Actions { service } => cmd_actions(service),
        Commands::RunScenario {
            file,
            artifacts,
            json,
        } => cmd_run_scenario(&panel, &file, json, artifacts).await?,
        Commands::Serve { socket } => cmd_serve(panel, socket).await?,
    };
    std::process::exit(code)
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

async fn cmd_doctor(panel: &Panel, json: bool, out: Option<PathBuf>) -> i32 {
    let report = panel.doctor().await;
    if let Some(ref path) = out {
        write_json_file(path, &report);
    }
    if json {
        print_json(&report);
    } else {
        println!("os:       {} ({}) kernel {}", report.os, report.arch, report.kernel);
        println!("headless: {}", report.headless);
        println!(
            "worker:   {} [{}]",
            report.worker.program,
            found(report.worker.program_found)
        );
        if let Some(ref script) = report.worker.script {
            println!(
                "script:   {} [{}]",
                script,
                found(report.worker.script_found.unwrap_or(false))
            );
        }
        if let Some(ref dir) = report.worker.working_dir {
            println!("cwd:      {}", dir);
        }
        println!(
            "docker:   {}",
            report.docker_cli.as_deref().unwrap_or("not found")
        );
        println!(
            "qemu:     system [{}] img [{}]",
            found(report.qemu_system),
            found(report.qemu_img)
        );
        println!(
            "engine:   {} via {}",
            if report.engine_reachable { "reachable" } else { "unreachable" },
            report.launcher
        );
    }
    0
}

fn found(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "missing"
    }
}

async fn cmd_call(
    panel: &Panel,
    service: Service,
    action: &str,
    args_str: &str,
    yes: bool,
    json: bool,
) -> i32 {
    let request = match serde_json::from_str::<serde_json::Value>(args_str)
        .map_err(|e| format!("invalid JSON args: {}", e))
        .and_then(|v| OperationRequest::new(service, action).with_arguments(v))
    {
        Ok(r) => r,
        Err(message) => {
            eprintln!("error: {}", message);
            return 2;
        }
    };

    if is_destructive(action) && !yes && !confirm(&request) {
        eprintln!("aborted");
        return 1;
    }

    let result = panel.call(&request).await;
    output_result(&request, &result, json)
}

/// Ask before removing or stopping anything. No terminal means no.
fn confirm(request: &OperationRequest) -> bool {
    let prompt = format!(
        "Run {} {} with {}?",
        request.service,
        request.action,
        serde_json::Value::Object(request.arguments.clone())
    );
    match dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
    {
        Ok(answer) => answer,
        Err(e) => {
            eprintln!("cannot prompt for confirmation ({}); pass --yes to proceed", e);
            false
        }
    }
}

async fn cmd_engine(panel: &Panel, json: bool) -> i32 {
    let report = panel.ensure_engine().await;
    if json {
        print_json(&report);
    } else {
        let tag = if report.already_running {
            "RUNNING"
        } else if report.started {
            "STARTED"
        } else {
            "DOWN"
        };
        println!("[{}] {}", tag, report.message);
    }
    if report.is_running() {
        0
    } else {
        1
    }
}

fn cmd_actions(service: Option<Service>) -> i32 {
    let services = match service {
        Some(s) => vec![s],
        None => vec![Service::Docker, Service::Qemu],
    };
    for s in services {
        for action in known_actions(s) {
            let mark = if is_destructive(action) { " (destructive)" } else { "" };
            println!("{} {}{}", s, action, mark);
        }
    }
    0
}

async fn cmd_run_scenario(
    panel: &Panel,
    file: &Path,
    json: bool,
    artifacts: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let yaml = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read scenario file {}", file.display()))?;
    let scenario = load_scenario(&yaml)?;

    let result = panel.run_scenario(&scenario).await;

    if json {
        print_json(&result);
    } else {
        println!("Scenario: {}", result.name.as_deref().unwrap_or("<unnamed>"));
        println!("Overall: {:?}", result.overall_status);
        for s in &result.steps {
            println!(
                "  Step {}: {} -> {} ({}ms)",
                s.step,
                s.label,
                if s.matched { "ok" } else { "MISMATCH" },
                s.elapsed_ms
            );
        }
    }

    if let Some(ref dir) = artifacts {
        write_scenario_artifacts(dir, &result);
    }

    Ok(match result.overall_status {
        Status::Pass => 0,
        Status::Fail => 1,
        Status::Error => 2,
    })
}

#[cfg(unix)]
async fn cmd_serve(panel: Panel, socket: PathBuf) -> anyhow::Result<i32> {
    serve::run_daemon(socket, panel).await?;
    Ok(0)
}

#[cfg(not(unix))]
async fn cmd_serve(_panel: Panel, _socket: PathBuf) -> anyhow::Result<i32> {
    anyhow::bail!("daemon mode needs Unix domain sockets")
}

// ===========================================================================
// Output helpers
// ===========================================================================

/// Print the result; exit 0 on success, 1 for worker-reported failures,
/// 2 when the worker or engine could not be reached or understood.
fn output_result(request: &OperationRequest, result: &OperationResult, json: bool) -> i32 {
    if json {
        print_json(result);
    } else {
        print_human(request, result);
    }
    match result {
        OperationResult::Success { .. } => 0,
        OperationResult::Failure(f) if f.kind == FailureKind::Application => 1,
        OperationResult::Failure(_) => 2,
    }
}

fn print_human(request: &OperationRequest, result: &OperationResult) {
    match result {
        OperationResult::Success { data } => {
            println!("[OK] {} {}", request.service, request.action);
            if let Ok(s) = serde_json::to_string_pretty(data) {
                for line in s.lines() {
                    println!("  {}", line);
                }
            }
        }
        OperationResult::Failure(f) => {
            println!("[{}] {} {}", f.kind, request.service, request.action);
            println!("  error: {}", f.message);
            if let Some(code) = f.exit_code {
                println!("  exit:  {}", code);
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// ===========================================================================
// Artifact helpers
// ===========================================================================

fn write_json_file<T: serde::Serialize>(path: &Path, value: &T) {
    let j = serde_json::to_string_pretty(value).unwrap_or_default();
    if let Err(e) = std::fs::write(path, &j) {
        eprintln!(
            "warning: failed to write result to {}: {}",
            path.display(),
            e
        );
    }
}

fn write_scenario_artifacts(dir: &Path, result: &ScenarioResult) {
    let art_dir = dir.join(&result.run_id);
    if let Err(e) = std::fs::create_dir_all(&art_dir) {
        eprintln!(
            "warning: failed to create artifacts dir {}: {}",
            art_dir.display(),
            e
        );
        return;
    }

    write_json_file(&art_dir.join("result.json"), result);

    // One line per step
    let mut lines = String::new();
    for step in &result.steps {
        if let Ok(line) = serde_json::to_string(step) {
            lines.push_str(&line);
            lines.push('\n');
        }
    }
    let _ = std::fs::write(art_dir.join("events.jsonl"), lines);
}
