//! Process-wide lifecycle control for the capture subsystem.
//!
//! A [`Controller`] owns the configuration, wires the crash interceptor and
//! hang watchdog together exactly once, and exposes the enable/disable and
//! shutdown controls. Detectors receive a controller handle instead of
//! reaching into ambient global state, which keeps them independently
//! testable; the process-wide instance used by the convenience functions
//! lives behind [`Controller::global`].
//!
//! State machine: `Uninitialized → Initialized → ShutDown`, with
//! re-initialization permitted after shutdown. `Initialized` is the only
//! state in which detectors are active.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tracing::{info, warn};

use crate::config::Config;
use crate::crash;
use crate::environment::{EnvProvider, HostEnvironment};
use crate::error::Result;
use crate::store::LogStore;
use crate::watchdog::{HangWatchdog, MainQueue, ProcSampler, ThreadSampler};

/// Lifecycle phase of the capture subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    ShutDown,
}

/// Host capabilities injected at initialization.
///
/// The primary-thread queue is optional because a plain Rust process has no
/// ambient main-thread dispatcher; hang detection is skipped (with a
/// warning) when the host does not supply one.
pub struct Host {
    /// The primary thread's task queue, when the host has one
    pub queue: Option<Arc<dyn MainQueue>>,
    /// Stack snapshot capability
    pub sampler: Arc<dyn ThreadSampler>,
    /// Device/application metadata provider
    pub env: Arc<dyn EnvProvider>,
}

impl Host {
    /// Default host: best-effort local probes, no primary-thread queue.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            queue: None,
            sampler: Arc::new(ProcSampler),
            env: Arc::new(HostEnvironment::detect()),
        }
    }

    /// Attach the primary-thread queue.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn MainQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Replace the stack sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn ThreadSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Replace the environment provider.
    #[must_use]
    pub fn with_env(mut self, env: Arc<dyn EnvProvider>) -> Self {
        self.env = env;
        self
    }
}

/// Snapshot of everything the crash interceptor needs at capture time.
pub(crate) struct CaptureContext {
    pub store: Arc<LogStore>,
    pub env: Arc<dyn EnvProvider>,
    pub include_device_info: bool,
    pub include_app_info: bool,
}

struct Inner {
    phase: Phase,
    config: Option<Config>,
    store: Option<Arc<LogStore>>,
    env: Option<Arc<dyn EnvProvider>>,
    watchdog: Option<Arc<HangWatchdog>>,
    log_dir: Option<PathBuf>,
}

/// Process-wide singleton state machine owning the detectors.
pub struct Controller {
    inner: Mutex<Inner>,
    /// Runtime enable toggle, consulted by both detectors before capture.
    enabled: AtomicBool,
    /// Mirrors `phase == Initialized` for lock-free reads from the panic
    /// hook and the watchdog loop.
    initialized: AtomicBool,
    /// Handle to the owning `Arc`, so `initialize` can hand the detectors a
    /// strong reference to this controller.
    self_handle: Weak<Controller>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("initialized", &self.is_initialized())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Controller {
    /// Create an uninitialized controller.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            inner: Mutex::new(Inner {
                phase: Phase::Uninitialized,
                config: None,
                store: None,
                env: None,
                watchdog: None,
                log_dir: None,
            }),
            enabled: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            self_handle: weak.clone(),
        })
    }

    /// The process-wide controller instance.
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL: OnceLock<Arc<Controller>> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Initialize with detected host capabilities.
    ///
    /// No-op when already initialized. Safe under concurrent callers:
    /// exactly one performs construction, the rest observe the result.
    pub fn initialize(&self, config: Config) -> Result<()> {
        self.initialize_with(config, Host::detect())
    }

    /// Initialize with explicit host capabilities.
    pub fn initialize_with(&self, config: Config, host: Host) -> Result<()> {
        let Some(this) = self.self_handle.upgrade() else {
            // Only reachable mid-drop of the owning Arc; nothing to wire.
            return Ok(());
        };

        let mut inner = self.lock_inner();
        if inner.phase == Phase::Initialized {
            return Ok(());
        }

        config.validate().map_err(crate::error::Error::from)?;
        self.enabled.store(config.enabled, Ordering::SeqCst);

        let log_dir = config.resolved_log_dir();
        let store = Arc::new(LogStore::new(
            log_dir.clone(),
            config.log_file_prefix.clone(),
            config.max_log_files,
        ));

        if config.crash_detection {
            crash::install(Arc::clone(&this));
        }

        if config.hang_detection {
            if let Some(queue) = host.queue {
                let watchdog = Arc::new(HangWatchdog::new(
                    &config,
                    Arc::clone(&this),
                    Arc::clone(&store),
                    queue,
                    Arc::clone(&host.sampler),
                    Arc::clone(&host.env),
                ));
                watchdog.start();
                inner.watchdog = Some(watchdog);
            } else {
                warn!("hang detection enabled but no primary-thread queue supplied; skipped");
            }
        }

        info!(
            log_dir = %log_dir.display(),
            crash_detection = config.crash_detection,
            hang_detection = config.hang_detection,
            "vigil initialized"
        );

        inner.log_dir = Some(log_dir);
        inner.store = Some(store);
        inner.env = Some(host.env);
        inner.config = Some(config);
        inner.phase = Phase::Initialized;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the watchdog and transition to `ShutDown`.
    ///
    /// No-op unless initialized. The panic hook stays installed (it is not
    /// safely revocable once other code may have chained onto it) but goes
    /// inert because the controller no longer reports active. A later
    /// `initialize` works again.
    pub fn shutdown(&self) {
        let watchdog = {
            let mut inner = self.lock_inner();
            if inner.phase != Phase::Initialized {
                return;
            }
            inner.phase = Phase::ShutDown;
            self.initialized.store(false, Ordering::SeqCst);
            inner.watchdog.take()
        };

        // Joining the monitor thread happens outside the state lock so the
        // panic hook can never be blocked behind a shutdown in progress.
        if let Some(watchdog) = watchdog {
            watchdog.stop();
        }
        info!("vigil shut down");
    }

    /// Runtime toggle consulted by both detectors before capture.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Current value of the runtime toggle.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether the subsystem is initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether detectors should capture: initialized and enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_initialized() && self.is_enabled()
    }

    /// Capture directory, absent if never initialized.
    #[must_use]
    pub fn log_directory(&self) -> Option<PathBuf> {
        self.lock_inner().log_dir.clone()
    }

    /// Everything the crash interceptor needs, read at invocation time.
    ///
    /// Uses `try_lock`: if the state lock is held the controller is mid
    /// transition, and skipping one capture is preferable to blocking a
    /// terminating thread.
    pub(crate) fn capture_context(&self) -> Option<CaptureContext> {
        if !self.is_active() {
            return None;
        }
        let inner = self.inner.try_lock().ok()?;
        let config = inner.config.as_ref()?;
        Some(CaptureContext {
            store: Arc::clone(inner.store.as_ref()?),
            env: Arc::clone(inner.env.as_ref()?),
            include_device_info: config.include_device_info,
            include_app_info: config.include_app_info,
        })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Process-wide convenience surface
// ---------------------------------------------------------------------------

/// Initialize the process-wide controller. Idempotent.
pub fn initialize(config: Config) -> Result<()> {
    Controller::global().initialize(config)
}

/// Initialize the process-wide controller with explicit host capabilities.
pub fn initialize_with(config: Config, host: Host) -> Result<()> {
    Controller::global().initialize_with(config, host)
}

/// Shut down the process-wide controller. Safe to call at any time.
pub fn shutdown() {
    Controller::global().shutdown();
}

/// Toggle capture at runtime.
pub fn set_enabled(enabled: bool) {
    Controller::global().set_enabled(enabled);
}

/// Current value of the runtime toggle.
#[must_use]
pub fn is_enabled() -> bool {
    Controller::global().is_enabled()
}

/// Whether the process-wide controller is initialized.
#[must_use]
pub fn is_initialized() -> bool {
    Controller::global().is_initialized()
}

/// Capture directory of the process-wide controller.
#[must_use]
pub fn log_directory() -> Option<PathBuf> {
    Controller::global().log_directory()
}
