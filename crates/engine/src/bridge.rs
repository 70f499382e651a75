//! Command bridge – one logical operation, one worker process, one result.
//!
//! Result priority, strongest first:
//! 1. an envelope on stdout (`{"success": ...}`) wins, whatever the exit code;
//! 2. otherwise a daemon-down match on either stream gives `EngineUnavailable`;
//! 3. otherwise the exit code and raw streams describe a transport/parse failure.
//!
//! Only a worker that cannot be started at all escapes as [`BridgeError`].

use crate::context::AppContext;
use crate::detect::{DaemonDownDetector, PhraseDetector, DEFAULT_ENGINE_UNAVAILABLE_MESSAGE};
use crate::traits::{CapError, CapturedOutput};
use crate::types::*;
use crate::worker::WorkerSpec;
use serde_json::{Map, Value};
use std::time::Instant;

const SNIPPET_CHARS: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to start worker {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: CapError,
    },
    #[error("failed to encode arguments: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BridgeError {
    /// Collapse into a result for callers that only render failures.
    pub fn into_failure(self) -> Failure {
        Failure::new(
            FailureKind::TransportFailure,
            format!("Failed to start worker: {}", self),
            None,
        )
    }
}

pub struct CommandBridge {
    worker: WorkerSpec,
    detector: Box<dyn DaemonDownDetector>,
    engine_unavailable_message: String,
}

impl CommandBridge {
    pub fn new(worker: WorkerSpec) -> Self {
        Self {
            worker,
            detector: Box::new(PhraseDetector::default()),
            engine_unavailable_message: DEFAULT_ENGINE_UNAVAILABLE_MESSAGE.to_string(),
        }
    }

    pub fn with_detector(mut self, detector: impl DaemonDownDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn with_engine_unavailable_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.trim().is_empty() {
            self.engine_unavailable_message = message;
        }
        self
    }

    pub fn worker(&self) -> &WorkerSpec {
        &self.worker
    }

    /// Run one operation through a fresh worker process.
    pub async fn execute(
        &self,
        request: &OperationRequest,
        ctx: &AppContext,
    ) -> Result<OperationResult, BridgeError> {
        let args_json = encode_arguments(&request.arguments)?;
        let cmd = self.worker.command_for(request, &args_json);
        let start = Instant::now();

        tracing::debug!(
            service = %request.service,
            action = %request.action,
            program = %cmd.program,
            "invoking worker"
        );

        let output = ctx
            .process()
            .run_captured(&cmd)
            .await
            .map_err(|source| BridgeError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        let result = self.classify(&output);
        match result {
            OperationResult::Success { .. } => tracing::debug!(
                action = %request.action,
                exit_code = ?output.exit_code,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "worker succeeded"
            ),
            OperationResult::Failure(ref f) => tracing::debug!(
                action = %request.action,
                kind = %f.kind,
                exit_code = ?output.exit_code,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "worker failed"
            ),
        }
        Ok(result)
    }

    /// Turn finished worker output into a result.
    pub fn classify(&self, output: &CapturedOutput) -> OperationResult {
        let stdout = output.stdout.trim();
        let stderr = output.stderr.trim();

        if !stdout.is_empty() {
            match serde_json::from_str::<Value>(stdout) {
                Ok(doc) => match WorkerEnvelope::from_document(doc) {
                    Some(envelope) => return envelope.into_result(output.exit_code),
                    None => tracing::warn!("worker stdout is JSON but not a response envelope"),
                },
                Err(e) => tracing::warn!(error = %e, "worker stdout is not valid JSON"),
            }
        }

        if self.detector.is_daemon_down(&output.stdout, &output.stderr) {
            return Failure::new(
                FailureKind::EngineUnavailable,
                self.engine_unavailable_message.clone(),
                output.exit_code,
            )
            .into();
        }

        let kind = if stdout.is_empty() {
            FailureKind::TransportFailure
        } else {
            FailureKind::ParseFailure
        };

        let failure = match output.exit_code {
            Some(0) => Failure::new(
                FailureKind::ParseFailure,
                format!(
                    "Failed to parse worker response: {}",
                    snippet(first_non_empty(&[stdout, stderr]).unwrap_or("No output"))
                ),
                Some(0),
            ),
            Some(code) => Failure::new(
                kind,
                first_non_empty(&[stderr, stdout])
                    .map(snippet)
                    .unwrap_or_else(|| format!("worker exited with code {}", code)),
                Some(code),
            ),
            None => Failure::new(
                kind,
                first_non_empty(&[stderr, stdout])
                    .map(snippet)
                    .unwrap_or_else(|| "worker terminated by signal".to_string()),
                None,
            ),
        };
        failure.into()
    }
}

/// Canonical JSON for the worker's `--args` parameter. Keys come out sorted.
pub fn encode_arguments(args: &Map<String, Value>) -> Result<String, serde_json::Error> {
    serde_json::to_string(args)
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|s| !s.is_empty())
}

fn snippet(s: &str) -> String {
    s.chars().take(SNIPPET_CHARS).collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use serde_json::json;

    fn bridge() -> CommandBridge {
        CommandBridge::new(WorkerSpec::script("python3", "/app/backend/api.py"))
    }

    #[test]
    fn test_envelope_success_ignores_exit_code() {
        for code in [Some(0), Some(1), Some(137), None] {
            let r = bridge().classify(&output(r#"{"success":true,"data":{"n":1}}"#, "Traceback...", code));
            assert_eq!(r, OperationResult::Success { data: json!({"n": 1}) });
        }
    }

    #[test]
    fn test_envelope_failure_is_application() {
        let r = bridge().classify(&output(
            r#"{"success":false,"error":"Failed to stop container x","details":"No such container: x"}"#,
            "",
            Some(0),
        ));
        let f = r.failure().unwrap();
        assert_eq!(f.kind, FailureKind::Application);
        assert_eq!(f.message, "No such container: x");

        let r = bridge().classify(&output(r#"{"success":false,"error":"Unknown action: x"}"#, "", Some(1)));
        assert_eq!(r.failure().unwrap().message, "Unknown action: x");
        assert_eq!(r.failure().unwrap().exit_code, Some(1));
    }

    #[test]
    fn test_envelope_wins_over_daemon_phrases() {
        let r = bridge().classify(&output(
            r#"{"success":false,"error":"Cannot connect to the Docker daemon"}"#,
            "connection refused",
            Some(1),
        ));
        assert_eq!(r.failure().unwrap().kind, FailureKind::Application);
    }

    #[test]
    fn test_daemon_down_without_envelope() {
        for code in [Some(0), Some(1), None] {
            let r = bridge().classify(&output(
                "",
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
                code,
            ));
            let f = r.failure().unwrap();
            assert_eq!(f.kind, FailureKind::EngineUnavailable);
            assert_eq!(f.message, DEFAULT_ENGINE_UNAVAILABLE_MESSAGE);
        }

        let r = bridge().classify(&output("Error response from daemon: oops", "", Some(1)));
        assert_eq!(r.failure().unwrap().kind, FailureKind::EngineUnavailable);
    }

    #[test]
    fn test_exit_zero_unparsable_is_parse_failure() {
        let r = bridge().classify(&output("not json", "", Some(0)));
        let f = r.failure().unwrap();
        assert_eq!(f.kind, FailureKind::ParseFailure);
        assert!(f.message.starts_with("Failed to parse worker response"));
        assert!(f.message.contains("not json"));

        let r = bridge().classify(&output("", "", Some(0)));
        assert!(r.failure().unwrap().message.contains("No output"));
    }

    #[test]
    fn test_nonzero_exit_message_order() {
        let r = bridge().classify(&output("partial", "ImportError: no module", Some(1)));
        let f = r.failure().unwrap();
        assert_eq!(f.message, "ImportError: no module");
        assert_eq!(f.kind, FailureKind::ParseFailure);

        let r = bridge().classify(&output("partial", "", Some(2)));
        assert_eq!(r.failure().unwrap().message, "partial");

        let r = bridge().classify(&output("", "", Some(3)));
        let f = r.failure().unwrap();
        assert_eq!(f.message, "worker exited with code 3");
        assert_eq!(f.kind, FailureKind::TransportFailure);
        assert_eq!(f.exit_code, Some(3));
    }

    #[test]
    fn test_signal_termination() {
        let r = bridge().classify(&output("", "", None));
        let f = r.failure().unwrap();
        assert_eq!(f.message, "worker terminated by signal");
        assert_eq!(f.exit_code, None);
    }

    #[test]
    fn test_json_without_success_is_not_an_envelope() {
        let r = bridge().classify(&output(r#"{"data": [1]}"#, "", Some(0)));
        assert_eq!(r.failure().unwrap().kind, FailureKind::ParseFailure);
    }

    #[test]
    fn test_pluggable_detector() {
        let b = bridge()
            .with_detector(|_out: &str, err: &str| err.contains("podman"))
            .with_engine_unavailable_message("Podman is down");
        let r = b.classify(&output("", "podman socket", Some(125)));
        assert_eq!(r.failure().unwrap().message, "Podman is down");

        let r = b.classify(&output("", "connection refused", Some(125)));
        assert_eq!(r.failure().unwrap().kind, FailureKind::TransportFailure);
    }

    #[tokio::test]
    async fn test_execute_builds_worker_command() {
        let process = ScriptedProcess::new(vec![Scripted::Output(output(
            r#"{"success":true,"data":[]}"#,
            "",
            Some(0),
        ))]);
        let calls = process.calls.clone();
        let (ctx, _clock) = scripted_context(process, vec![]);

        let req = OperationRequest::new(Service::Docker, "get_container_logs")
            .arg("tail", 50)
            .arg("id", "web");
        let r = bridge().execute(&req, &ctx).await.unwrap();
        assert_eq!(r, OperationResult::Success { data: json!([]) });

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let cmd = &calls[0];
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args[0], "/app/backend/api.py");
        assert_eq!(&cmd.args[1..5], ["--service", "docker", "--action", "get_container_logs"]);
        assert_eq!(cmd.args[6], r#"{"id":"web","tail":50}"#);
        assert_eq!(cmd.cwd.as_deref(), Some(std::path::Path::new("/app/backend")));
    }

    #[tokio::test]
    async fn test_execute_spawn_failure_is_distinguished() {
        let process = ScriptedProcess::new(vec![Scripted::Fail(|| {
            CapError::DependencyMissing("python3 not found".into())
        })]);
        let (ctx, _clock) = scripted_context(process, vec![]);
        let req = OperationRequest::new(Service::Qemu, "list_running_vms");
        let err = bridge().execute(&req, &ctx).await.unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
        assert!(err.to_string().contains("python3"));
    }

    #[test]
    fn test_empty_arguments_encode_to_empty_object() {
        assert_eq!(encode_arguments(&Map::new()).unwrap(), "{}");
    }

    #[cfg(unix)]
    mod real_process {
        use super::*;
        use std::path::PathBuf;

        fn write_script(name: &str, body: &str) -> PathBuf {
            let dir = std::env::temp_dir().join(format!("bridge_test_{}_{}", name, new_run_id()));
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("worker.sh");
            std::fs::write(&path, body).unwrap();
            path
        }

        #[tokio::test]
        async fn test_arguments_round_trip_through_worker() {
            // $6 is the --args value
            let script = write_script("echo", "printf '{\"success\":true,\"data\":%s}' \"$6\"\n");
            let bridge = CommandBridge::new(WorkerSpec::script("sh", &script));
            let ctx = AppContext::default_platform();

            let args = json!({
                "name": "web",
                "ports": ["8080:80", "8443:443"],
                "env_vars": ["A=1", "QUOTE=\"x\" 'y'"],
                "nested": {"force": true, "tail": 100, "ratio": 0.5, "none": null},
                "unicode": "çà✓"
            });
            let req = OperationRequest::new(Service::Docker, "create_container")
                .with_arguments(args.clone())
                .unwrap();
            let r = bridge.execute(&req, &ctx).await.unwrap();
            assert_eq!(r, OperationResult::Success { data: args });

            let _ = std::fs::remove_dir_all(script.parent().unwrap());
        }

        #[tokio::test]
        async fn test_worker_runs_in_script_directory() {
            let script = write_script("cwd", "printf '{\"success\":true,\"data\":\"%s\"}' \"$(pwd -P)\"\n");
            let bridge = CommandBridge::new(WorkerSpec::script("sh", &script));
            let ctx = AppContext::default_platform();

            let r = bridge
                .execute(&OperationRequest::new(Service::Qemu, "noop"), &ctx)
                .await
                .unwrap();
            let expected = std::fs::canonicalize(script.parent().unwrap()).unwrap();
            assert_eq!(r.data().unwrap(), &json!(expected.display().to_string()));

            let _ = std::fs::remove_dir_all(script.parent().unwrap());
        }

        #[tokio::test]
        async fn test_crashing_worker_with_envelope_is_success() {
            let script = write_script(
                "crash",
                "printf '{\"success\":true,\"data\":42}'\necho 'Segmentation fault' >&2\nexit 139\n",
            );
            let bridge = CommandBridge::new(WorkerSpec::script("sh", &script));
            let ctx = AppContext::default_platform();
            let r = bridge
                .execute(&OperationRequest::new(Service::Docker, "list_images"), &ctx)
                .await
                .unwrap();
            assert_eq!(r, OperationResult::Success { data: json!(42) });

            let _ = std::fs::remove_dir_all(script.parent().unwrap());
        }

        #[tokio::test]
        async fn test_relative_script_path() {
            let dir = PathBuf::from(format!("bridge_rel_{}", new_run_id()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("worker.sh"), "printf '{\"success\":true,\"data\":\"%s\"}' \"$4\"\n").unwrap();

            let bridge = CommandBridge::new(WorkerSpec::script("sh", dir.join("worker.sh")));
            let ctx = AppContext::default_platform();
            let r = bridge
                .execute(&OperationRequest::new(Service::Docker, "list_images"), &ctx)
                .await;
            let _ = std::fs::remove_dir_all(&dir);
            assert_eq!(r.unwrap(), OperationResult::Success { data: json!("list_images") });
        }

        #[tokio::test]
        async fn test_abandoned_call_runs_to_completion() {
            let marker = std::env::temp_dir().join(format!("bridge_done_{}", new_run_id()));
            let script = write_script(
                "abandoned",
                &format!("sleep 1\ntouch '{}'\nprintf '{{\"success\":true}}'\n", marker.display()),
            );
            let bridge = CommandBridge::new(WorkerSpec::script("sh", &script));
            let ctx = AppContext::default_platform();
            let req = OperationRequest::new(Service::Docker, "delete_image");

            let res = tokio::time::timeout(std::time::Duration::from_millis(200), bridge.execute(&req, &ctx)).await;
            assert!(res.is_err());
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            assert!(marker.exists());

            let _ = std::fs::remove_file(&marker);
            let _ = std::fs::remove_dir_all(script.parent().unwrap());
        }

        #[tokio::test]
        async fn test_missing_worker_binary() {
            let bridge = CommandBridge::new(WorkerSpec::binary("/nonexistent/panel-worker"));
            let ctx = AppContext::default_platform();
            let err = bridge
                .execute(&OperationRequest::new(Service::Docker, "list_images"), &ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, BridgeError::Spawn { .. }));
        }

        #[tokio::test]
        async fn test_concurrent_calls_are_independent() {
            let script = write_script(
                "concurrent",
                "printf '{\"success\":true,\"data\":\"%s\"}' \"$4\"\n",
            );
            let bridge = CommandBridge::new(WorkerSpec::script("sh", &script));
            let ctx = AppContext::default_platform();

            let a = OperationRequest::new(Service::Docker, "action_a");
            let b = OperationRequest::new(Service::Docker, "action_b");
            let c = OperationRequest::new(Service::Qemu, "action_c");
            let (ra, rb, rc) = tokio::join!(
                bridge.execute(&a, &ctx),
                bridge.execute(&b, &ctx),
                bridge.execute(&c, &ctx)
            );
            assert_eq!(ra.unwrap().data().unwrap(), &json!("action_a"));
            assert_eq!(rb.unwrap().data().unwrap(), &json!("action_b"));
            assert_eq!(rc.unwrap().data().unwrap(), &json!("action_c"));

            let _ = std::fs::remove_dir_all(script.parent().unwrap());
        }
    }
}
