//! Control panel facade.
//!
//! Loads layered configuration, installs logging, and exposes [`Panel`]:
//! the one object a presentation layer needs to run worker operations and
//! follow engine readiness.

pub mod app;
pub mod config;
pub mod logging;

pub use app::Panel;
pub use config::{get_config, AppConfig};
