//! Platform launch strategies for the container engine.
//!
//! Each strategy only gets the engine process going. None of them waits for
//! the daemon to answer; that is the readiness monitor's job.

use crate::context::AppContext;
use crate::traits::{CapError, CommandSpec};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: CapError,
    },
}

#[async_trait::async_trait]
pub trait LaunchStrategy: Send + Sync {
    /// Short identifier for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Issue the launch. `Err` only when nothing could be started at all.
    async fn launch(&self, ctx: &AppContext) -> Result<CommandSpec, LaunchError>;
}

/// Resolve the strategy for a platform id (`windows`, `macos`, anything else
/// is treated as a service-managed Linux-like host).
pub fn strategy_for(platform: &str) -> Box<dyn LaunchStrategy> {
    match platform {
        "windows" => Box::new(DesktopInstallLauncher::windows_defaults()),
        "macos" => Box::new(FixedCommandLauncher::new(CommandSpec::new(
            "open",
            ["-a", "Docker"],
        ))),
        _ => Box::new(ServiceManagerLauncher::systemd()),
    }
}

fn detach(ctx: &AppContext, cmd: &CommandSpec) -> Result<(), LaunchError> {
    ctx.process()
        .spawn_detached(cmd)
        .map_err(|source| LaunchError::Spawn {
            program: cmd.program.clone(),
            source,
        })
}

// ===========================================================================
// Desktop app at one of several install locations
// ===========================================================================

pub struct DesktopInstallLauncher {
    candidates: Vec<PathBuf>,
    fallback: CommandSpec,
}

impl DesktopInstallLauncher {
    pub fn new(candidates: Vec<PathBuf>, fallback: CommandSpec) -> Self {
        Self {
            candidates,
            fallback,
        }
    }

    /// Docker Desktop's usual install paths, in priority order.
    pub fn windows_defaults() -> Self {
        let env_or = |key: &str, default: &str| {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let program_files = env_or("ProgramFiles", "C:\\Program Files");
        let program_files_x86 = env_or("ProgramFiles(x86)", "C:\\Program Files (x86)");
        let local_app_data = std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                PathBuf::from(env_or("USERPROFILE", "C:\\Users\\Default"))
                    .join("AppData")
                    .join("Local")
            });

        Self::new(
            vec![
                PathBuf::from(program_files)
                    .join("Docker")
                    .join("Docker")
                    .join("Docker Desktop.exe"),
                PathBuf::from(program_files_x86)
                    .join("Docker")
                    .join("Docker")
                    .join("Docker Desktop.exe"),
                local_app_data.join("Docker").join("Docker Desktop.exe"),
            ],
            CommandSpec::new("cmd", ["/c", "start", "\"\"", "Docker Desktop"]),
        )
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }
}

#[async_trait::async_trait]
impl LaunchStrategy for DesktopInstallLauncher {
    fn name(&self) -> &'static str {
        "desktop-install"
    }

    async fn launch(&self, ctx: &AppContext) -> Result<CommandSpec, LaunchError> {
        let cmd = match self.candidates.iter().find(|p| ctx.fs().exists(p)) {
            Some(path) => CommandSpec::new(path.display().to_string(), Vec::<String>::new()),
            None => self.fallback.clone(),
        };
        detach(ctx, &cmd)?;
        Ok(cmd)
    }
}

// ===========================================================================
// One fixed launcher command
// ===========================================================================

pub struct FixedCommandLauncher {
    command: CommandSpec,
}

impl FixedCommandLauncher {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait::async_trait]
impl LaunchStrategy for FixedCommandLauncher {
    fn name(&self) -> &'static str {
        "fixed-command"
    }

    async fn launch(&self, ctx: &AppContext) -> Result<CommandSpec, LaunchError> {
        detach(ctx, &self.command)?;
        Ok(self.command.clone())
    }
}

// ===========================================================================
// Service manager, privileged fallback
// ===========================================================================

pub struct ServiceManagerLauncher {
    primary: CommandSpec,
    privileged: CommandSpec,
    privileged_timeout: Duration,
}

impl ServiceManagerLauncher {
    pub fn new(primary: CommandSpec, privileged: CommandSpec) -> Self {
        Self {
            primary,
            privileged,
            privileged_timeout: Duration::from_secs(120),
        }
    }

    pub fn systemd() -> Self {
        Self::new(
            CommandSpec::new("systemctl", ["--user", "start", "docker"]),
            CommandSpec::new("sudo", ["systemctl", "start", "docker"]),
        )
    }
}

#[async_trait::async_trait]
impl LaunchStrategy for ServiceManagerLauncher {
    fn name(&self) -> &'static str {
        "service-manager"
    }

    async fn launch(&self, ctx: &AppContext) -> Result<CommandSpec, LaunchError> {
        let first = match detach(ctx, &self.primary) {
            Ok(()) => return Ok(self.primary.clone()),
            Err(e) => e,
        };
        tracing::warn!(error = %first, "service manager launch failed, trying privileged fallback");

        // The fallback may prompt for a password, so it is waited for.
        match ctx
            .process()
            .run_status(&self.privileged, Some(self.privileged_timeout))
            .await
        {
            Ok(ok) => {
                if !ok {
                    tracing::warn!(command = %self.privileged.display(), "privileged start exited non-zero");
                }
                Ok(self.privileged.clone())
            }
            Err(CapError::Timeout) => {
                tracing::warn!(command = %self.privileged.display(), "privileged start timed out");
                Ok(self.privileged.clone())
            }
            Err(source) => Err(LaunchError::Spawn {
                program: self.privileged.program.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_strategy_resolution() {
        assert_eq!(strategy_for("windows").name(), "desktop-install");
        assert_eq!(strategy_for("macos").name(), "fixed-command");
        assert_eq!(strategy_for("linux").name(), "service-manager");
        assert_eq!(strategy_for("freebsd").name(), "service-manager");
    }

    #[tokio::test]
    async fn test_desktop_picks_first_existing_candidate() {
        let launcher = DesktopInstallLauncher::new(
            vec![PathBuf::from("/a/Docker.exe"), PathBuf::from("/b/Docker.exe")],
            CommandSpec::new("cmd", ["/c", "start"]),
        );
        let process = ScriptedProcess::new(vec![]);
        let detached = process.detached.clone();
        let (ctx, _clock) = scripted_context(process, vec![PathBuf::from("/b/Docker.exe")]);

        let cmd = launcher.launch(&ctx).await.unwrap();
        assert_eq!(cmd.program, PathBuf::from("/b/Docker.exe").display().to_string());
        assert_eq!(detached.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_desktop_falls_back_to_start_command() {
        let launcher = DesktopInstallLauncher::new(
            vec![PathBuf::from("/a/Docker.exe")],
            CommandSpec::new("cmd", ["/c", "start"]),
        );
        let (ctx, _clock) = scripted_context(ScriptedProcess::new(vec![]), vec![]);
        let cmd = launcher.launch(&ctx).await.unwrap();
        assert_eq!(cmd.program, "cmd");
    }

    #[tokio::test]
    async fn test_service_manager_uses_primary_when_it_spawns() {
        let process = ScriptedProcess::new(vec![]);
        let calls = process.calls.clone();
        let (ctx, _clock) = scripted_context(process, vec![]);

        let cmd = ServiceManagerLauncher::systemd().launch(&ctx).await.unwrap();
        assert_eq!(cmd.program, "systemctl");
        // Privileged fallback never ran.
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_manager_privileged_fallback_on_spawn_failure() {
        let mut process = ScriptedProcess::new(vec![Scripted::Status(true)]);
        process.missing = vec!["systemctl".to_string()];
        let calls = process.calls.clone();
        let (ctx, _clock) = scripted_context(process, vec![]);

        let cmd = ServiceManagerLauncher::systemd().launch(&ctx).await.unwrap();
        assert_eq!(cmd.program, "sudo");
        assert_eq!(calls.lock().unwrap()[0].program, "sudo");
    }

    #[tokio::test]
    async fn test_service_manager_both_unavailable() {
        let mut process = ScriptedProcess::new(vec![Scripted::Fail(|| {
            CapError::DependencyMissing("sudo not found".into())
        })]);
        process.missing = vec!["systemctl".to_string()];
        let (ctx, _clock) = scripted_context(process, vec![]);

        let err = ServiceManagerLauncher::systemd().launch(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("sudo"));
    }
}
