use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Operation request – one user action, one worker invocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Docker,
    Qemu,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Docker => "docker",
            Service::Qemu => "qemu",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Service::Docker),
            "qemu" => Ok(Service::Qemu),
            other => Err(format!("unknown service: {} (expected docker or qemu)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub service: Service,
    pub action: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl OperationRequest {
    pub fn new(service: Service, action: impl Into<String>) -> Self {
        Self {
            service,
            action: action.into(),
            arguments: Map::new(),
        }
    }

    /// Add one argument. `Option::None` values are serialized as `null`.
    pub fn arg(mut self, key: &str, value: impl Serialize) -> Self {
        let v = serde_json::to_value(value).unwrap_or(Value::Null);
        self.arguments.insert(key.to_string(), v);
        self
    }

    /// Build from a JSON value; anything other than an object or null is rejected.
    pub fn with_arguments(mut self, args: Value) -> Result<Self, String> {
        match args {
            Value::Object(map) => {
                self.arguments = map;
                Ok(self)
            }
            Value::Null => Ok(self),
            other => Err(format!("arguments must be a JSON object, got {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation result – the stable output contract of the bridge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Success { data: Value },
    Failure(Failure),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            OperationResult::Success { data } => Some(data),
            OperationResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            OperationResult::Success { .. } => None,
            OperationResult::Failure(f) => Some(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl Failure {
    /// Build a failure, substituting a generic text for an empty message.
    pub fn new(kind: FailureKind, message: impl Into<String>, exit_code: Option<i32>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            kind.default_message().to_string()
        } else {
            message
        };
        Self {
            message,
            kind,
            exit_code,
        }
    }
}

impl From<Failure> for OperationResult {
    fn from(f: Failure) -> Self {
        OperationResult::Failure(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The worker ran and reported `success: false`.
    Application,
    /// The engine daemon looks unreachable.
    EngineUnavailable,
    /// The worker produced no usable response at all.
    TransportFailure,
    /// The worker wrote something to stdout that is not an envelope.
    ParseFailure,
}

impl FailureKind {
    pub fn default_message(&self) -> &'static str {
        match self {
            FailureKind::Application => "the operation failed without an error message",
            FailureKind::EngineUnavailable => "the container engine is not reachable",
            FailureKind::TransportFailure => "the worker produced no response",
            FailureKind::ParseFailure => "the worker response could not be parsed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&s)
    }
}

// ---------------------------------------------------------------------------
// Worker envelope – what a well-behaved worker prints on stdout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Legacy workers put payloads in ad-hoc keys (`message`, `logs`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkerEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            extra: Map::new(),
        }
    }

    pub fn fail(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            details,
            extra: Map::new(),
        }
    }

    /// Interpret a parsed stdout document. `None` unless it is an object
    /// carrying a boolean `success`. A present `data` key is kept verbatim,
    /// `null` included.
    pub fn from_document(doc: Value) -> Option<Self> {
        let Value::Object(mut map) = doc else {
            return None;
        };
        let success = map.get("success")?.as_bool()?;
        map.remove("success");
        let data = map.remove("data");
        let error = map.remove("error").and_then(text_field);
        let details = map.remove("details").and_then(text_field);
        Some(Self {
            success,
            data,
            error,
            details,
            extra: map,
        })
    }

    /// Convert into the bridge result. Exit code is carried only on failure.
    pub fn into_result(self, exit_code: Option<i32>) -> OperationResult {
        if self.success {
            let data = match self.data {
                Some(d) => d,
                None => Value::Object(self.extra),
            };
            return OperationResult::Success { data };
        }

        let message = [self.details, self.error]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
            .unwrap_or_default();
        Failure::new(FailureKind::Application, message, exit_code).into()
    }
}

fn text_field(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Unknown,
    Checking,
    Starting,
    Running,
    FailedToStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub already_running: bool,
    pub started: bool,
    pub message: String,
}

impl ReadinessReport {
    pub fn is_running(&self) -> bool {
        self.already_running || self.started
    }
}

// ---------------------------------------------------------------------------
// Scenario / harness status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Error,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn current_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macos",
        "linux" => "linux",
        "windows" => "windows",
        other => other,
    }
}

pub fn detect_headless() -> bool {
    match std::env::consts::OS {
        "linux" => {
            // No X11 or Wayland display → headless
            std::env::var("DISPLAY").is_err() && std::env::var("WAYLAND_DISPLAY").is_err()
        }
        "macos" => std::env::var("SSH_TTY").is_ok() && std::env::var("DISPLAY").is_err(),
        _ => false,
    }
}

/// Generate a new run ID (UUIDv4).
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
