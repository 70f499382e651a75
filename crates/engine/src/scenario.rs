//! Scenario runner – execute scripted flows from YAML files.

use crate::bridge::CommandBridge;
use crate::context::AppContext;
use crate::readiness::ReadinessMonitor;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to parse scenario YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("step {step}: {message}")]
    InvalidStep { step: usize, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioStep {
    Call {
        /// `<service>.<action>`, e.g. `docker.list_images`.
        call: String,
        #[serde(default)]
        args: serde_json::Value,
        #[serde(default)]
        expect: Expectation,
    },
    EnsureEngine {
        ensure_engine: bool,
        #[serde(default = "default_expect_running")]
        expect_running: bool,
    },
}

fn default_expect_running() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    #[default]
    Success,
    Application,
    EngineUnavailable,
    TransportFailure,
    ParseFailure,
    Any,
}

impl Expectation {
    pub fn matches(&self, result: &OperationResult) -> bool {
        match (self, result) {
            (Expectation::Any, _) => true,
            (Expectation::Success, OperationResult::Success { .. }) => true,
            (Expectation::Success, OperationResult::Failure(_)) => false,
            (_, OperationResult::Success { .. }) => false,
            (expected, OperationResult::Failure(f)) => match f.kind {
                FailureKind::Application => *expected == Expectation::Application,
                FailureKind::EngineUnavailable => *expected == Expectation::EngineUnavailable,
                FailureKind::TransportFailure => *expected == Expectation::TransportFailure,
                FailureKind::ParseFailure => *expected == Expectation::ParseFailure,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: usize,
    pub label: String,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessReport>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub run_id: String,
    pub name: Option<String>,
    pub overall_status: Status,
    pub steps: Vec<StepOutcome>,
}

/// Load a scenario from a YAML string and check every call target.
pub fn load_scenario(yaml: &str) -> Result<Scenario, ScenarioError> {
    let scenario: Scenario = serde_yaml::from_str(yaml)?;
    for (i, step) in scenario.steps.iter().enumerate() {
        if let ScenarioStep::Call { call, args, .. } = step {
            parse_call(call).map_err(|message| ScenarioError::InvalidStep { step: i, message })?;
            if !(args.is_object() || args.is_null()) {
                return Err(ScenarioError::InvalidStep {
                    step: i,
                    message: "args must be a mapping".into(),
                });
            }
        }
    }
    Ok(scenario)
}

fn parse_call(call: &str) -> Result<(Service, String), String> {
    let (service, action) = call
        .split_once('.')
        .ok_or_else(|| format!("call '{}' must look like <service>.<action>", call))?;
    let service: Service = service.parse()?;
    if action.is_empty() {
        return Err(format!("call '{}' has an empty action", call));
    }
    Ok((service, action.to_string()))
}

/// Execute a scenario and return the overall result.
pub async fn run_scenario(
    scenario: &Scenario,
    ctx: &AppContext,
    bridge: &CommandBridge,
    monitor: &ReadinessMonitor,
) -> ScenarioResult {
    let mut steps = Vec::new();
    let mut overall = Status::Pass;

    for (i, step) in scenario.steps.iter().enumerate() {
        let start = std::time::Instant::now();
        let outcome = match step {
            ScenarioStep::Call { call, args, expect } => {
                let result = match parse_call(call)
                    .and_then(|(svc, action)| OperationRequest::new(svc, action).with_arguments(args.clone()))
                {
                    Ok(request) => match bridge.execute(&request, ctx).await {
                        Ok(r) => r,
                        Err(e) => e.into_failure().into(),
                    },
                    Err(message) => Failure::new(FailureKind::TransportFailure, message, None).into(),
                };
                let matched = expect.matches(&result);
                if !matched {
                    tracing::warn!(step = i, call = %call, expected = ?expect, "scenario step did not match");
                }
                StepOutcome {
                    step: i,
                    label: call.clone(),
                    matched,
                    result: Some(result),
                    readiness: None,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }
            }
            ScenarioStep::EnsureEngine {
                ensure_engine,
                expect_running,
            } => {
                let (report, matched) = if *ensure_engine {
                    let report = monitor.ensure_running(ctx).await;
                    let matched = report.is_running() == *expect_running;
                    (Some(report), matched)
                } else {
                    (None, true)
                };
                StepOutcome {
                    step: i,
                    label: "ensure_engine".to_string(),
                    matched,
                    result: None,
                    readiness: report,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }
            }
        };
        if !outcome.matched {
            overall = Status::Fail;
        }
        steps.push(outcome);
    }

    ScenarioResult {
        run_id: new_run_id(),
        name: scenario.name.clone(),
        overall_status: overall,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::FixedCommandLauncher;
    use crate::readiness::{EngineProbe, ReadinessNotifier};
    use crate::testing::*;
    use crate::traits::CommandSpec;
    use crate::worker::WorkerSpec;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_parse_scenario() {
        let yaml = r#"
name: basic test
steps:
  - ensure_engine: true
  - call: "docker.list_images"
    args: {}
    expect: success
  - call: "qemu.stop_vm"
    args:
      pid: 4242
    expect: application
"#;
        let s = load_scenario(yaml).expect("should parse");
        assert_eq!(s.name, Some("basic test".into()));
        assert_eq!(s.steps.len(), 3);
        assert!(matches!(s.steps[0], ScenarioStep::EnsureEngine { ensure_engine: true, expect_running: true }));
        assert!(matches!(s.steps[2], ScenarioStep::Call { expect: Expectation::Application, .. }));
    }

    #[test]
    fn test_rejects_bad_call_target() {
        let yaml = r#"
steps:
  - call: "podman.list_images"
"#;
        let err = load_scenario(yaml).unwrap_err();
        assert!(err.to_string().contains("step 0"));

        let yaml = r#"
steps:
  - call: "list_images"
"#;
        assert!(load_scenario(yaml).is_err());
    }

    #[test]
    fn test_expectation_matching() {
        let ok = OperationResult::Success { data: serde_json::Value::Null };
        let down: OperationResult = Failure::new(FailureKind::EngineUnavailable, "down", None).into();
        assert!(Expectation::Success.matches(&ok));
        assert!(!Expectation::Success.matches(&down));
        assert!(Expectation::EngineUnavailable.matches(&down));
        assert!(!Expectation::Application.matches(&down));
        assert!(Expectation::Any.matches(&down));
    }

    #[tokio::test]
    async fn test_run_scenario_mixed_steps() {
        let yaml = r#"
name: smoke
steps:
  - ensure_engine: true
  - call: "docker.list_images"
  - call: "docker.delete_image"
    args: { id: "nope" }
    expect: application
  - call: "docker.list_containers"
    expect: engine_unavailable
"#;
        let scenario = load_scenario(yaml).unwrap();
        let process = ScriptedProcess::new(vec![
            Scripted::Status(true),
            Scripted::Output(output(r#"{"success":true,"data":[]}"#, "", Some(0))),
            Scripted::Output(output(r#"{"success":false,"error":"Image nope does not exist."}"#, "", Some(0))),
            // Wrong expectation on purpose: the worker answered fine.
            Scripted::Output(output(r#"{"success":true,"data":[]}"#, "", Some(0))),
        ]);
        let (ctx, clock) = scripted_context(process, vec![]);
        let bridge = CommandBridge::new(WorkerSpec::binary("panel-worker"));
        let monitor = ReadinessMonitor::new(
            EngineProbe::docker(),
            Box::new(FixedCommandLauncher::new(CommandSpec::new("open", ["-a", "Docker"]))),
            Arc::new(ReadinessNotifier::new(clock, Duration::from_millis(500))),
            Duration::from_secs(3),
        );

        let result = run_scenario(&scenario, &ctx, &bridge, &monitor).await;
        assert_eq!(result.steps.len(), 4);
        assert!(result.steps[0].matched);
        assert!(result.steps[0].readiness.as_ref().unwrap().already_running);
        assert!(result.steps[1].matched);
        assert!(result.steps[2].matched);
        assert!(!result.steps[3].matched);
        assert_eq!(result.overall_status, Status::Fail);
    }
}
