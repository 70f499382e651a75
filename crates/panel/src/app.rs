//! The facade the presentation layer talks to.
//!
//! Owns one context, one bridge and one readiness monitor. Every call
//! resolves to an [`OperationResult`]; nothing here returns a transport
//! error to the caller.

use crate::config::AppConfig;
use engine::actions::{docker, qemu};
use engine::doctor::{run_doctor, DoctorReport};
use engine::launcher::strategy_for;
use engine::scenario::{run_scenario, Scenario, ScenarioResult};
use engine::traits::CommandSpec;
use engine::types::current_os;
use engine::worker::{default_interpreter_candidates, find_interpreter};
use engine::{
    AppContext, CommandBridge, EngineProbe, OperationRequest, OperationResult, PhraseDetector,
    ReadinessMonitor, ReadinessNotifier, ReadinessReport, ReadinessSubscription, WorkerSpec,
};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub struct Panel {
    ctx: Arc<AppContext>,
    bridge: Arc<CommandBridge>,
    monitor: Arc<ReadinessMonitor>,
    ensure_on_start: bool,
    startup: Mutex<Option<JoinHandle<ReadinessReport>>>,
}

impl Panel {
    pub fn new(ctx: AppContext, bridge: CommandBridge, monitor: ReadinessMonitor) -> Self {
        Self {
            ctx: Arc::new(ctx),
            bridge: Arc::new(bridge),
            monitor: Arc::new(monitor),
            ensure_on_start: true,
            startup: Mutex::new(None),
        }
    }

    /// Build against the real platform.
    pub async fn from_config(config: &AppConfig) -> Self {
        Self::with_context(config, AppContext::default_platform()).await
    }

    pub async fn with_context(config: &AppConfig, ctx: AppContext) -> Self {
        let worker = resolve_worker(config, &ctx).await;
        tracing::debug!(program = %worker.program, script = ?worker.script, "worker resolved");

        let mut bridge = CommandBridge::new(worker)
            .with_engine_unavailable_message(config.bridge.engine_unavailable_message.clone());
        if !config.bridge.daemon_down_phrases.is_empty() {
            bridge = bridge.with_detector(PhraseDetector::new(&config.bridge.daemon_down_phrases));
        }

        let engine = &config.engine;
        let probe = EngineProbe::new(
            CommandSpec::new(engine.probe_program.clone(), engine.probe_args.clone()),
            engine.probe_timeout(),
        );
        let platform = engine.platform.as_deref().unwrap_or(current_os());
        let notifier = Arc::new(ReadinessNotifier::new(
            ctx.clock_handle(),
            engine.ready_replay_window(),
        ));
        let monitor = ReadinessMonitor::new(probe, strategy_for(platform), notifier, engine.start_grace());

        let mut panel = Self::new(ctx, bridge, monitor);
        panel.ensure_on_start = engine.ensure_on_start;
        panel
    }

    /// Kick off the background engine check. Only the first call spawns;
    /// later calls (and calls with `ensure_on_start` off) return `false`.
    pub fn start(&self) -> bool {
        if !self.ensure_on_start {
            return false;
        }
        let mut startup = self.startup.lock().unwrap_or_else(|p| p.into_inner());
        if startup.is_some() {
            return false;
        }
        let ctx = Arc::clone(&self.ctx);
        let monitor = Arc::clone(&self.monitor);
        *startup = Some(tokio::spawn(async move {
            let report = monitor.ensure_running(&ctx).await;
            tracing::info!(
                already_running = report.already_running,
                started = report.started,
                "startup engine check: {}",
                report.message
            );
            report
        }));
        true
    }

    /// Wait for the startup check, if one was spawned and not yet awaited.
    pub async fn startup_report(&self) -> Option<ReadinessReport> {
        let handle = self.startup.lock().unwrap_or_else(|p| p.into_inner()).take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "startup engine check did not finish");
                None
            }
        }
    }

    pub fn subscribe_ready(&self) -> ReadinessSubscription {
        self.monitor.notifier().subscribe()
    }

    pub async fn ensure_engine(&self) -> ReadinessReport {
        self.monitor.ensure_running(&self.ctx).await
    }

    pub fn engine_state(&self) -> engine::EngineState {
        self.monitor.state()
    }

    /// Whether the last check left the engine marked ready.
    pub fn engine_ready(&self) -> bool {
        self.monitor.notifier().is_ready()
    }

    pub async fn doctor(&self) -> DoctorReport {
        run_doctor(&self.ctx, &self.bridge, &self.monitor).await
    }

    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        run_scenario(scenario, &self.ctx, &self.bridge, &self.monitor).await
    }

    pub fn bridge(&self) -> &CommandBridge {
        &self.bridge
    }

    pub async fn call(&self, request: &OperationRequest) -> OperationResult {
        match self.bridge.execute(request, &self.ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(service = %request.service, action = %request.action, error = %e, "worker unavailable");
                e.into_failure().into()
            }
        }
    }

    // -- docker -------------------------------------------------------------

    pub async fn list_images(&self) -> OperationResult {
        self.call(&docker::list_images()).await
    }

    pub async fn list_containers(&self) -> OperationResult {
        self.call(&docker::list_containers()).await
    }

    pub async fn list_running_containers(&self) -> OperationResult {
        self.call(&docker::list_running_containers()).await
    }

    pub async fn create_dockerfile(&self, path: &str, code: &str) -> OperationResult {
        self.call(&docker::create_dockerfile(path, code)).await
    }

    pub async fn build_image(&self, path: &str, tag: &str) -> OperationResult {
        self.call(&docker::build_image(path, tag)).await
    }

    pub async fn stop_container(&self, id: &str) -> OperationResult {
        self.call(&docker::stop_container(id)).await
    }

    pub async fn start_container(&self, id: &str) -> OperationResult {
        self.call(&docker::start_container(id)).await
    }

    pub async fn create_container(
        &self,
        image: &str,
        name: Option<&str>,
        ports: &[String],
        env_vars: &[String],
    ) -> OperationResult {
        self.call(&docker::create_container(image, name, ports, env_vars))
            .await
    }

    pub async fn delete_container(&self, id: &str, force: bool) -> OperationResult {
        self.call(&docker::delete_container(id, force)).await
    }

    pub async fn delete_image(&self, id: &str, force: bool) -> OperationResult {
        self.call(&docker::delete_image(id, force)).await
    }

    pub async fn get_container_logs(&self, id: &str, tail: Option<u32>) -> OperationResult {
        self.call(&docker::get_container_logs(id, tail)).await
    }

    pub async fn get_container_stats(&self, id: &str) -> OperationResult {
        self.call(&docker::get_container_stats(id)).await
    }

    pub async fn search_dockerhub(&self, name: &str) -> OperationResult {
        self.call(&docker::search_dockerhub(name)).await
    }

    pub async fn pull_image(&self, name: &str) -> OperationResult {
        self.call(&docker::pull_image(name)).await
    }

    pub async fn search_image_local(&self, name: &str) -> OperationResult {
        self.call(&docker::search_image_local(name)).await
    }

    // -- qemu ---------------------------------------------------------------

    pub async fn start_virtual_machine(
        &self,
        cpu_cores: u32,
        ram_size: u32,
        disk_path: &str,
        iso_path: Option<&str>,
    ) -> OperationResult {
        self.call(&qemu::start_virtual_machine(cpu_cores, ram_size, disk_path, iso_path))
            .await
    }

    pub async fn create_vm_from_config(&self, config_file_path: &str) -> OperationResult {
        self.call(&qemu::create_vm_from_config(config_file_path)).await
    }

    pub async fn delete_vm(&self, disk_path: &str) -> OperationResult {
        self.call(&qemu::delete_vm(disk_path)).await
    }

    pub async fn list_running_vms(&self) -> OperationResult {
        self.call(&qemu::list_running_vms()).await
    }

    pub async fn stop_vm(&self, pid: u32) -> OperationResult {
        self.call(&qemu::stop_vm(pid)).await
    }

    pub async fn create_disk_image(&self, path: &str, size: &str) -> OperationResult {
        self.call(&qemu::create_disk_image(path, size)).await
    }
}

/// Script worker with a configured or discovered interpreter, an explicit
/// binary, or the bundled `panel-worker`.
async fn resolve_worker(config: &AppConfig, ctx: &AppContext) -> WorkerSpec {
    let program = config.worker.program.trim();
    match config.worker.script {
        Some(ref script) => {
            let interpreter = if program.is_empty() {
                let candidates = if config.worker.interpreter_candidates.is_empty() {
                    default_interpreter_candidates()
                } else {
                    config.worker.interpreter_candidates.clone()
                };
                find_interpreter(ctx, &candidates)
                    .await
                    .unwrap_or_else(|| "python3".to_string())
            } else {
                program.to_string()
            };
            WorkerSpec::script(interpreter, script.clone())
        }
        None if !program.is_empty() => WorkerSpec::binary(program),
        None => WorkerSpec::bundled(),
    }
}
