//! Engine readiness – probe, optional launch, one-shot "became ready" signal.

use crate::context::AppContext;
use crate::launcher::LaunchStrategy;
use crate::traits::{CapError, Clock, CommandSpec};
use crate::types::{EngineState, ReadinessReport};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub const MSG_ALREADY_RUNNING: &str = "Docker is already running";
pub const MSG_STARTED: &str = "Docker started successfully";
pub const MSG_COULD_NOT_START: &str = "Could not start Docker. Please start Docker manually.";
pub const MSG_NOT_READY: &str =
    "Docker did not become ready in time. Please start Docker manually if it does not come up.";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ===========================================================================
// Notifier
// ===========================================================================

/// Edge-triggered readiness signal with a short replay window.
///
/// Every subscriber sees each not-ready → ready transition at most once.
/// A subscriber attaching within `replay_window` of the transition gets it
/// immediately; later ones get nothing until the next transition.
pub struct ReadinessNotifier {
    clock: Arc<dyn Clock>,
    replay_window: Duration,
    state: Mutex<NotifierState>,
}

#[derive(Default)]
struct NotifierState {
    ready_since: Option<Instant>,
    subscribers: Vec<mpsc::UnboundedSender<()>>,
}

impl ReadinessNotifier {
    pub fn new(clock: Arc<dyn Clock>, replay_window: Duration) -> Self {
        Self {
            clock,
            replay_window,
            state: Mutex::new(NotifierState::default()),
        }
    }

    pub fn subscribe(&self) -> ReadinessSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        state.subscribers.retain(|tx| !tx.is_closed());
        if let Some(since) = state.ready_since {
            if self.clock.now().saturating_duration_since(since) <= self.replay_window {
                let _ = tx.send(());
            }
        }
        state.subscribers.push(tx);
        ReadinessSubscription { rx }
    }

    /// Record the transition to ready. Returns `false` if already ready.
    pub fn mark_ready(&self) -> bool {
        let mut state = lock(&self.state);
        if state.ready_since.is_some() {
            return false;
        }
        state.ready_since = Some(self.clock.now());
        state.subscribers.retain(|tx| tx.send(()).is_ok());
        tracing::info!(subscribers = state.subscribers.len(), "engine ready");
        true
    }

    /// Re-arm for the next transition.
    pub fn mark_not_ready(&self) {
        let mut state = lock(&self.state);
        if state.ready_since.take().is_some() {
            tracing::info!("engine no longer ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.state).ready_since.is_some()
    }
}

pub struct ReadinessSubscription {
    rx: mpsc::UnboundedReceiver<()>,
}

impl ReadinessSubscription {
    /// Wait for the next notification. `false` once the notifier is gone.
    pub async fn recv(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Consume a pending notification without waiting.
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Wait up to `timeout` of real time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> bool {
        matches!(tokio::time::timeout(timeout, self.rx.recv()).await, Ok(Some(())))
    }
}

// ===========================================================================
// Probe
// ===========================================================================

/// Lightweight listing command; reachable iff it exits 0 within `timeout`.
#[derive(Debug, Clone)]
pub struct EngineProbe {
    command: CommandSpec,
    timeout: Duration,
}

impl EngineProbe {
    pub fn new(command: CommandSpec, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn docker() -> Self {
        Self::new(CommandSpec::new("docker", ["ps"]), Duration::from_secs(5))
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub async fn is_running(&self, ctx: &AppContext) -> bool {
        match ctx
            .process()
            .run_status(&self.command, Some(self.timeout))
            .await
        {
            Ok(ok) => ok,
            Err(CapError::Timeout) => {
                tracing::debug!(command = %self.command.display(), "engine probe timed out");
                false
            }
            Err(e) => {
                tracing::debug!(command = %self.command.display(), error = %e, "engine probe failed to run");
                false
            }
        }
    }
}

// ===========================================================================
// Monitor
// ===========================================================================

pub struct ReadinessMonitor {
    probe: EngineProbe,
    launcher: Box<dyn LaunchStrategy>,
    notifier: Arc<ReadinessNotifier>,
    start_grace: Duration,
    state: Mutex<EngineState>,
}

impl ReadinessMonitor {
    pub fn new(
        probe: EngineProbe,
        launcher: Box<dyn LaunchStrategy>,
        notifier: Arc<ReadinessNotifier>,
        start_grace: Duration,
    ) -> Self {
        Self {
            probe,
            launcher,
            notifier,
            start_grace,
            state: Mutex::new(EngineState::Unknown),
        }
    }

    pub fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    pub fn notifier(&self) -> &Arc<ReadinessNotifier> {
        &self.notifier
    }

    pub fn probe(&self) -> &EngineProbe {
        &self.probe
    }

    pub fn launcher_name(&self) -> &'static str {
        self.launcher.name()
    }

    fn set_state(&self, next: EngineState) {
        let mut state = lock(&self.state);
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "engine state");
            *state = next;
        }
    }

    /// Probe, launch if needed, re-probe once after the grace interval.
    /// Never fails; the report says whether the engine ended up running.
    pub async fn ensure_running(&self, ctx: &AppContext) -> ReadinessReport {
        self.set_state(EngineState::Checking);
        if self.probe.is_running(ctx).await {
            self.set_state(EngineState::Running);
            self.notifier.mark_ready();
            return ReadinessReport {
                already_running: true,
                started: false,
                message: MSG_ALREADY_RUNNING.to_string(),
            };
        }
        self.notifier.mark_not_ready();

        self.set_state(EngineState::Starting);
        tracing::info!(strategy = self.launcher.name(), "engine not reachable, attempting start");
        match self.launcher.launch(ctx).await {
            Ok(cmd) => tracing::debug!(command = %cmd.display(), "engine launch issued"),
            Err(e) => {
                tracing::warn!(error = %e, "engine launch failed");
                self.set_state(EngineState::FailedToStart);
                return ReadinessReport {
                    already_running: false,
                    started: false,
                    message: MSG_COULD_NOT_START.to_string(),
                };
            }
        }

        ctx.clock().sleep(self.start_grace).await;

        if self.probe.is_running(ctx).await {
            self.set_state(EngineState::Running);
            self.notifier.mark_ready();
            ReadinessReport {
                already_running: false,
                started: true,
                message: MSG_STARTED.to_string(),
            }
        } else {
            tracing::warn!(grace_ms = self.start_grace.as_millis() as u64, "engine still unreachable after start");
            self.set_state(EngineState::FailedToStart);
            ReadinessReport {
                already_running: false,
                started: false,
                message: MSG_NOT_READY.to_string(),
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
