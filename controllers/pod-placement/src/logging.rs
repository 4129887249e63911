//! Logging setup
//!
//! `tracing` with an `EnvFilter` behind a reload layer, so the singleton's
//! `logVerbosity` can change the level of a running process. A `RUST_LOG`
//! set at startup pins the filter and the CR value is then ignored.

use crds::LogVerbosity;
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// Handle for changing the log filter at runtime
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned_by_env: bool,
    current: Mutex<LogVerbosity>,
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("pinned_by_env", &self.pinned_by_env)
            .field("current", &*self.current.lock())
            .finish_non_exhaustive()
    }
}

/// Installs the global subscriber.
pub fn init() -> LogHandle {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned_by_env = from_env.is_some();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(LogVerbosity::Normal.filter_directive()));

    let (filter_layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry().with(filter_layer).with(fmt::layer()).init();

    LogHandle::new(handle, pinned_by_env)
}

impl LogHandle {
    fn new(handle: reload::Handle<EnvFilter, Registry>, pinned_by_env: bool) -> Self {
        Self {
            handle,
            pinned_by_env,
            current: Mutex::new(LogVerbosity::Normal),
        }
    }

    /// Applies `verbosity`; returns true when the filter changed.
    pub fn apply(&self, verbosity: LogVerbosity) -> bool {
        if self.pinned_by_env {
            return false;
        }
        let mut current = self.current.lock();
        if *current == verbosity {
            return false;
        }
        match self.handle.reload(EnvFilter::new(verbosity.filter_directive())) {
            Ok(()) => {
                *current = verbosity;
                info!("Log verbosity set to {:?}", verbosity);
                true
            }
            Err(e) => {
                warn!("Failed to change log verbosity to {:?}: {}", verbosity, e);
                false
            }
        }
    }
}
