use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

/// Built-in defaults, always the lowest layer.
const DEFAULT_CONFIG: &str = include_str!("../global_config.yaml");

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_dev_env")]
    pub dev_env: String,
    pub worker: WorkerConfig,
    pub bridge: BridgeConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

fn default_dev_env() -> String {
    "dev".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerConfig {
    /// Worker binary, or the interpreter when `script` is set.
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(default)]
    pub interpreter_candidates: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BridgeConfig {
    pub engine_unavailable_message: String,
    #[serde(default)]
    pub daemon_down_phrases: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub platform: Option<String>,
    pub probe_program: String,
    #[serde(default)]
    pub probe_args: Vec<String>,
    pub probe_timeout_ms: u64,
    pub start_grace_ms: u64,
    pub ready_replay_window_ms: u64,
    #[serde(default = "true_default")]
    pub ensure_on_start: bool,
}

impl EngineConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace_ms)
    }

    pub fn ready_replay_window(&self) -> Duration {
        Duration::from_millis(self.ready_replay_window_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    pub location: LoggingLocationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLocationConfig {
    pub enabled: bool,
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub critical: bool,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RedactionConfig {
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default = "true_default")]
    pub use_default_pii: bool,
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

fn true_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionPattern {
    pub name: String,
    pub regex: String,
    pub placeholder: String,
}

static CONFIG: RwLock<Option<&'static AppConfig>> = RwLock::new(None);

/// Load once, then serve the cached value.
pub fn get_config() -> Result<&'static AppConfig, ConfigError> {
    if let Some(cfg) = *CONFIG.read().unwrap_or_else(|p| p.into_inner()) {
        return Ok(cfg);
    }

    let mut write = CONFIG.write().unwrap_or_else(|p| p.into_inner());
    if let Some(cfg) = *write {
        return Ok(cfg);
    }

    let cfg: &'static AppConfig = Box::leak(Box::new(load_config()?));
    *write = Some(cfg);
    Ok(cfg)
}

#[cfg(test)]
pub fn reset_config() {
    let mut write = CONFIG.write().unwrap_or_else(|p| p.into_inner());
    *write = None;
}

/// Directory searched for override files: `APP_CONFIG_DIR`, else the
/// current directory.
fn override_dir() -> PathBuf {
    std::env::var_os("APP_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&override_dir())
}

fn load_config_from(dir: &Path) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        // Embedded defaults (always present)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml))
        // Deployment file, production overrides, local overrides
        .add_source(File::from(dir.join("global_config.yaml")).required(false))
        .add_source(File::from(dir.join("production_config.yaml")).required(false))
        .add_source(File::from(dir.join(".global_config.yaml")).required(false))
        // Map nested env vars like APP__ENGINE__START_GRACE_MS=1000
        .add_source(Environment::with_prefix("APP").separator("__"));

    builder.build()?.try_deserialize()
}
