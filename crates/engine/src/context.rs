//! Application context – holds capability trait objects.

use crate::platform::{StdFilesystem, TokioClock, TokioProcess};
use crate::traits::*;
use std::sync::Arc;

/// Central context passed to all engine operations.
///
/// Holds trait-object capabilities so callers (CLI / panel / tests) can swap
/// implementations, e.g. a scripted process runner or a manual clock.
pub struct AppContext {
    process: Box<dyn ProcessOps>,
    fs: Box<dyn FilesystemOps>,
    clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(
        process: Box<dyn ProcessOps>,
        fs: Box<dyn FilesystemOps>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { process, fs, clock }
    }

    /// Create a context with real platform implementations.
    pub fn default_platform() -> Self {
        Self {
            process: Box::new(TokioProcess),
            fs: Box::new(StdFilesystem),
            clock: Arc::new(TokioClock),
        }
    }

    pub fn process(&self) -> &dyn ProcessOps {
        self.process.as_ref()
    }

    pub fn fs(&self) -> &dyn FilesystemOps {
        self.fs.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Shared handle for components that outlive a single call.
    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}
