//! vigil-core: Core library for vigil
//!
//! This crate watches a host application for two failure modes — an
//! unhandled fatal error (a crash) and a prolonged stall of the primary
//! thread (a hang) — and durably records diagnostic snapshots for later
//! inspection, while never itself becoming a source of instability.
//!
//! # Architecture
//!
//! ```text
//! Lifecycle Controller ──┬──► Crash Interceptor (panic hook, chained)
//!                        └──► Hang Watchdog (monitor thread + heartbeat)
//!                                      │
//!                              CaptureEvent ──► Log Store ──► *.txt files
//!                                                   │
//!                                             retention prune
//! ```
//!
//! # Modules
//!
//! - `lifecycle`: process-wide state machine, enable/disable, wiring
//! - `crash`: panic-hook crash interception with previous-hook chaining
//! - `watchdog`: primary-thread liveness monitoring
//! - `store`: bounded on-disk capture store
//! - `event`: capture event types
//! - `format`: plain-text rendering of captures
//! - `environment`: device/application snapshots
//! - `config`: configuration management
//! - `logging`: diagnostic logging
//! - `error`: error types
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod crash;
pub mod environment;
pub mod error;
pub mod event;
pub mod format;
pub mod lifecycle;
pub mod logging;
pub mod store;
pub mod watchdog;

pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::{
    Controller, Host, initialize, initialize_with, is_enabled, is_initialized, log_directory,
    set_enabled, shutdown,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
