//! Engine crate – the command bridge and engine readiness logic.
//!
//! Everything that touches the OS goes through the capability traits in
//! [`traits`], so the bridge, the readiness monitor and the doctor run the
//! same way under the panel, the `panelctl` harness and the unit tests.

pub mod actions;
pub mod bridge;
pub mod context;
pub mod detect;
pub mod doctor;
pub mod launcher;
pub mod platform;
pub mod readiness;
pub mod scenario;
pub mod traits;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use bridge::{BridgeError, CommandBridge};
pub use context::AppContext;
pub use detect::{DaemonDownDetector, PhraseDetector};
pub use readiness::{EngineProbe, ReadinessMonitor, ReadinessNotifier, ReadinessSubscription};
pub use types::{
    EngineState, Failure, FailureKind, OperationRequest, OperationResult, ReadinessReport, Service,
    Status, WorkerEnvelope,
};
pub use worker::WorkerSpec;
