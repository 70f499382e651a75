//! Daemon mode – JSON-lines requests over a Unix socket.
//!
//! One request per line: `{"id": "...", "method": "...", "params": {...}}`.
//! One response per line, carrying the same id.

use anyhow::Context;
use engine::actions::known_actions;
use engine::types::*;
use panel::Panel;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

const DEFAULT_WAIT_READY_MS: u64 = 5000;

#[derive(Debug, Deserialize)]
struct DaemonRequest {
    #[serde(default)]
    id: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct DaemonResponse {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<DaemonError>,
}

#[derive(Debug, Serialize)]
struct DaemonError {
    code: &'static str,
    message: String,
}

impl DaemonResponse {
    fn ok(id: String, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn invalid(id: String, message: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(DaemonError {
                code: "INVALID_INPUT",
                message,
            }),
        }
    }
}

pub async fn run_daemon(socket_path: PathBuf, panel: Panel) -> anyhow::Result<()> {
    // Remove stale socket if it exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("cannot bind socket {}", socket_path.display()))?;

    tracing::info!(socket = %socket_path.display(), "panelctl daemon listening");
    eprintln!("panelctl daemon listening on {}", socket_path.display());

    let panel = Arc::new(panel);
    panel.start();

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let panel = Arc::clone(&panel);
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut lines = BufReader::new(reader).lines();

                    while let Ok(Some(line)) = lines.next_line().await {
                        let response = handle_request(&line, &panel).await;
                        let mut resp_json =
                            serde_json::to_string(&response).unwrap_or_else(|_| "{}".into());
                        resp_json.push('\n');
                        if writer.write_all(resp_json.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept error");
            }
        }
    }
}

async fn handle_request(line: &str, panel: &Panel) -> DaemonResponse {
    let req: DaemonRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return DaemonResponse::invalid("unknown".into(), format!("invalid JSON request: {}", e))
        }
    };
    let id = req
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = match req.method.as_str() {
        "call" => match call_request(&req.params) {
            Ok(request) => to_value(&panel.call(&request).await),
            Err(message) => return DaemonResponse::invalid(id, message),
        },
        "ensure_engine" => to_value(&panel.ensure_engine().await),
        "engine_state" => json!({
            "state": panel.engine_state(),
            "ready": panel.engine_ready(),
        }),
        "doctor" => to_value(&panel.doctor().await),
        "actions" => json!({
            "docker": known_actions(Service::Docker),
            "qemu": known_actions(Service::Qemu),
        }),
        "wait_ready" => {
            let timeout_ms = req
                .params
                .get("timeout_ms")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_WAIT_READY_MS);
            let mut sub = panel.subscribe_ready();
            let ready = panel.engine_ready()
                || sub.recv_timeout(Duration::from_millis(timeout_ms)).await;
            json!({ "ready": ready })
        }
        other => return DaemonResponse::invalid(id, format!("unknown method: {}", other)),
    };

    DaemonResponse::ok(id, result)
}

fn call_request(params: &Value) -> Result<OperationRequest, String> {
    let service: Service = params
        .get("service")
        .and_then(Value::as_str)
        .ok_or("missing 'service'")?
        .parse()?;
    let action = params
        .get("action")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .ok_or("missing 'action'")?;
    let args = params.get("args").cloned().unwrap_or(Value::Null);
    OperationRequest::new(service, action).with_arguments(args)
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel::config::load_config;

    async fn test_panel() -> Panel {
        let mut config = load_config().expect("Should load config");
        config.worker.program = "/nonexistent/panel-worker-missing".into();
        config.engine.ensure_on_start = false;
        Panel::from_config(&config).await
    }

    #[tokio::test]
    async fn test_invalid_json_request() {
        let panel = test_panel().await;
        let resp = handle_request("not json", &panel).await;
        assert_eq!(resp.id, "unknown");
        assert!(resp.error.unwrap().message.contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_unknown_method_keeps_id() {
        let panel = test_panel().await;
        let resp = handle_request(r#"{"id":"7","method":"probe"}"#, &panel).await;
        assert_eq!(resp.id, "7");
        assert_eq!(resp.error.unwrap().message, "unknown method: probe");
    }

    #[tokio::test]
    async fn test_actions_lists_both_services() {
        let panel = test_panel().await;
        let resp = handle_request(r#"{"id":"1","method":"actions"}"#, &panel).await;
        let result = resp.result.unwrap();
        assert_eq!(result["docker"].as_array().unwrap().len(), 15);
        assert_eq!(result["qemu"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_call_with_missing_worker_is_a_result_not_an_error() {
        let panel = test_panel().await;
        let resp = handle_request(
            r#"{"id":"2","method":"call","params":{"service":"docker","action":"list_images"}}"#,
            &panel,
        )
        .await;
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "failure");
        assert_eq!(result["kind"], "TRANSPORT_FAILURE");
    }

    #[tokio::test]
    async fn test_call_rejects_bad_params() {
        let panel = test_panel().await;
        let resp = handle_request(
            r#"{"id":"3","method":"call","params":{"service":"podman","action":"x"}}"#,
            &panel,
        )
        .await;
        assert!(resp.error.is_some());

        let resp = handle_request(
            r#"{"id":"4","method":"call","params":{"service":"qemu","action":"stop_vm","args":[1]}}"#,
            &panel,
        )
        .await;
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_without_engine() {
        let panel = test_panel().await;
        let resp = handle_request(
            r#"{"id":"5","method":"wait_ready","params":{"timeout_ms":20}}"#,
            &panel,
        )
        .await;
        assert_eq!(resp.result.unwrap()["ready"], false);
    }
}
