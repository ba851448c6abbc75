//! Hang watchdog: liveness monitoring of the primary thread.
//!
//! The primary thread's responsiveness is not observable from outside
//! without cooperation, so the watchdog routes a counter increment through
//! the primary thread's own ordered task queue. Because the queue is
//! serviced in order, the increment can only run once all work queued ahead
//! of it has completed; if it has not run when the timeout expires, the
//! primary thread is stalled.
//!
//! ```text
//! monitor thread                     primary thread
//!   current = acks ─┐
//!   dispatch probe ─┼──────────────►  queue: ... | acks += 1
//!   wait timeout    │
//!   acks == current?┘ → hang capture
//! ```
//!
//! Monitoring is continuous: a detected hang does not stop the watchdog,
//! and a recovered primary thread simply produces no report on the next
//! cycle. The `last_reported` counter suppresses duplicate reports for the
//! same unresolved stall.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::environment::EnvProvider;
use crate::event::{CaptureEvent, HangCapture, ThreadDump, epoch_ms};
use crate::lifecycle::Controller;
use crate::store::LogStore;

/// A unit of work scheduled onto the primary thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The primary thread's ordered task queue, as a capability.
///
/// The watchdog only ever enqueues its lightweight heartbeat probe here;
/// it never blocks on the queue and never assumes when (or whether) a task
/// runs.
pub trait MainQueue: Send + Sync + 'static {
    /// Enqueue a task for execution on the primary thread.
    fn dispatch(&self, task: Task);
}

/// Supplier of stack snapshots at hang time, as a capability.
///
/// Both calls are best effort at call time: no ordering or completeness
/// guarantees, and implementations must not panic.
pub trait ThreadSampler: Send + Sync + 'static {
    /// Current call-stack frames of the primary thread.
    fn primary_frames(&self) -> Vec<String>;

    /// Stack dumps of every live thread, keyed by thread id.
    fn all_threads(&self) -> HashMap<u64, ThreadDump>;
}

// ---------------------------------------------------------------------------
// Host implementations
// ---------------------------------------------------------------------------

/// [`MainQueue`] backed by a crossbeam channel.
///
/// The host's primary thread owns the matching [`QueuePump`] and services
/// it from its main loop. Dispatch to a disconnected pump is dropped
/// silently: a vanished primary thread will be reported as a hang anyway.
pub struct ChannelQueue {
    tx: Sender<Task>,
}

impl MainQueue for ChannelQueue {
    fn dispatch(&self, task: Task) {
        let _ = self.tx.send(task);
    }
}

/// Receiving side of a [`ChannelQueue`], serviced by the primary thread.
pub struct QueuePump {
    rx: Receiver<Task>,
}

impl QueuePump {
    /// Run every task currently queued. Returns the number executed.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            executed += 1;
        }
        executed
    }

    /// Service the queue for a wall-clock window, blocking between tasks.
    /// Returns the number executed.
    pub fn run_for(&self, window: Duration) -> usize {
        let deadline = std::time::Instant::now() + window;
        let mut executed = 0;
        loop {
            let now = std::time::Instant::now();
            if now >= deadline {
                return executed;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(task) => {
                    task();
                    executed += 1;
                }
                Err(_) => return executed,
            }
        }
    }
}

/// Create a connected [`ChannelQueue`] / [`QueuePump`] pair.
#[must_use]
pub fn channel_queue() -> (Arc<ChannelQueue>, QueuePump) {
    let (tx, rx) = unbounded();
    (Arc::new(ChannelQueue { tx }), QueuePump { rx })
}

/// Best-effort [`ThreadSampler`] backed by `/proc`.
///
/// Foreign-thread frame capture requires cooperative instrumentation the
/// host may not have, so frames are empty here; the live-thread inventory
/// (name, state) is still reported on Linux. Tests and instrumented hosts
/// supply richer samplers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcSampler;

impl ThreadSampler for ProcSampler {
    fn primary_frames(&self) -> Vec<String> {
        Vec::new()
    }

    fn all_threads(&self) -> HashMap<u64, ThreadDump> {
        proc_thread_dumps()
    }
}

#[cfg(target_os = "linux")]
fn proc_thread_dumps() -> HashMap<u64, ThreadDump> {
    let mut dumps = HashMap::new();
    let Ok(entries) = std::fs::read_dir("/proc/self/task") else {
        return dumps;
    };
    for entry in entries.filter_map(Result::ok) {
        let Some(tid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
        else {
            continue;
        };
        let name = std::fs::read_to_string(entry.path().join("comm"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "<unnamed>".to_string());
        let state = std::fs::read_to_string(entry.path().join("stat"))
            .ok()
            .and_then(|s| parse_stat_state(&s))
            .unwrap_or_else(|| "unknown".to_string());
        dumps.insert(
            tid,
            ThreadDump {
                name,
                id: tid,
                state,
                frames: Vec::new(),
            },
        );
    }
    dumps
}

#[cfg(not(target_os = "linux"))]
fn proc_thread_dumps() -> HashMap<u64, ThreadDump> {
    HashMap::new()
}

/// Extract the state field from `/proc/<pid>/task/<tid>/stat`.
/// The comm field is parenthesized and may contain spaces, so the state is
/// the first field after the closing paren.
#[cfg(target_os = "linux")]
fn parse_stat_state(stat: &str) -> Option<String> {
    let after_comm = stat.rsplit_once(')')?.1;
    let code = after_comm.split_whitespace().next()?;
    let state = match code {
        "R" => "running",
        "S" => "sleeping",
        "D" => "disk-sleep",
        "T" => "stopped",
        "Z" => "zombie",
        other => return Some(other.to_string()),
    };
    Some(state.to_string())
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

/// Monitor-thread context, cloned out of the watchdog at `start`.
struct MonitorCtx {
    timeout: Duration,
    include_all_threads: bool,
    include_device_info: bool,
    include_app_info: bool,
    /// Weak: the controller owns the watchdog, so a strong handle here
    /// would form a reference cycle and pin both allocations forever.
    controller: Weak<Controller>,
    store: Arc<LogStore>,
    queue: Arc<dyn MainQueue>,
    sampler: Arc<dyn ThreadSampler>,
    env: Arc<dyn EnvProvider>,
    acks: Arc<AtomicU64>,
    last_reported: Arc<AtomicU64>,
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Background monitor that verifies the primary thread keeps servicing its
/// queue within the configured timeout, and captures a hang report when it
/// does not.
pub struct HangWatchdog {
    timeout: Duration,
    include_all_threads: bool,
    include_device_info: bool,
    include_app_info: bool,
    controller: Weak<Controller>,
    store: Arc<LogStore>,
    queue: Arc<dyn MainQueue>,
    sampler: Arc<dyn ThreadSampler>,
    env: Arc<dyn EnvProvider>,
    /// Incremented only by the heartbeat probe running on the primary thread.
    acks: Arc<AtomicU64>,
    /// Written only by the monitor loop; sentinel `u64::MAX` means "nothing
    /// reported yet" so a stall present from the very first cycle is still
    /// reported.
    last_reported: Arc<AtomicU64>,
    state: Mutex<Option<Running>>,
}

impl std::fmt::Debug for HangWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HangWatchdog")
            .field("timeout", &self.timeout)
            .field("running", &self.is_running())
            .finish()
    }
}

impl HangWatchdog {
    /// Create a watchdog. It does nothing until [`HangWatchdog::start`].
    #[must_use]
    pub fn new(
        config: &Config,
        controller: Arc<Controller>,
        store: Arc<LogStore>,
        queue: Arc<dyn MainQueue>,
        sampler: Arc<dyn ThreadSampler>,
        env: Arc<dyn EnvProvider>,
    ) -> Self {
        Self {
            timeout: config.hang_timeout(),
            include_all_threads: config.include_all_threads,
            include_device_info: config.include_device_info,
            include_app_info: config.include_app_info,
            controller: Arc::downgrade(&controller),
            store,
            queue,
            sampler,
            env,
            acks: Arc::new(AtomicU64::new(0)),
            last_reported: Arc::new(AtomicU64::new(u64::MAX)),
            state: Mutex::new(None),
        }
    }

    /// Start the monitor thread. No-op when already running.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ctx = MonitorCtx {
            timeout: self.timeout,
            include_all_threads: self.include_all_threads,
            include_device_info: self.include_device_info,
            include_app_info: self.include_app_info,
            controller: Weak::clone(&self.controller),
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            sampler: Arc::clone(&self.sampler),
            env: Arc::clone(&self.env),
            acks: Arc::clone(&self.acks),
            last_reported: Arc::clone(&self.last_reported),
        };

        let spawned = std::thread::Builder::new()
            .name("vigil-watchdog".to_string())
            .spawn(move || monitor_loop(&ctx, &stop_rx));
        match spawned {
            Ok(handle) => *state = Some(Running { stop_tx, handle }),
            Err(err) => error!(error = %err, "failed to spawn watchdog thread"),
        }
    }

    /// Stop the monitor thread. No-op when not running.
    ///
    /// Guarantees no further cycles are armed. An in-flight timeout wait is
    /// cut short by the stop signal; a check already past the wait may still
    /// complete (a possibly-stale report is acceptable, a lost one is not).
    pub fn stop(&self) {
        let running = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            let _ = running.stop_tx.send(());
            if running.handle.join().is_err() {
                error!("watchdog thread terminated abnormally");
            }
        }
    }

    /// Whether the monitor thread is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for HangWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_loop(ctx: &MonitorCtx, stop_rx: &Receiver<()>) {
    debug!(timeout_ms = ctx.timeout.as_millis() as u64, "hang watchdog started");
    loop {
        // Honor a stop that arrived while the previous check ran, before
        // arming a new cycle.
        match stop_rx.try_recv() {
            Ok(()) | Err(crossbeam::channel::TryRecvError::Disconnected) => break,
            Err(crossbeam::channel::TryRecvError::Empty) => {}
        }

        let current = ctx.acks.load(Ordering::SeqCst);

        // The probe: liveness signal routed through the primary thread's
        // own ordered queue. A foreign queue implementation must not be able
        // to kill the monitor thread.
        let probe_acks = Arc::clone(&ctx.acks);
        let dispatched = std::panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.queue.dispatch(Box::new(move || {
                probe_acks.fetch_add(1, Ordering::SeqCst);
            }));
        }));
        if dispatched.is_err() {
            warn!("primary queue dispatch panicked; heartbeat probe dropped");
        }

        match stop_rx.recv_timeout(ctx.timeout) {
            Err(RecvTimeoutError::Timeout) => {
                let acked = ctx.acks.load(Ordering::SeqCst);
                if acked == current && ctx.last_reported.load(Ordering::SeqCst) != current {
                    ctx.last_reported.store(current, Ordering::SeqCst);
                    let captured =
                        std::panic::catch_unwind(AssertUnwindSafe(|| report_hang(ctx)));
                    if captured.is_err() {
                        error!("hang capture panicked; watchdog continues");
                    }
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("hang watchdog stopped");
}

fn report_hang(ctx: &MonitorCtx) {
    let active = ctx
        .controller
        .upgrade()
        .is_some_and(|controller| controller.is_active());
    if !active {
        debug!("primary thread stall detected while disabled; capture skipped");
        return;
    }

    warn!(
        timeout_ms = ctx.timeout.as_millis() as u64,
        "primary thread unresponsive; capturing hang report"
    );

    let event = CaptureEvent::Hang(HangCapture {
        timestamp_ms: epoch_ms(),
        primary_frames: ctx.sampler.primary_frames(),
        all_threads: ctx.include_all_threads.then(|| ctx.sampler.all_threads()),
        device_info: if ctx.include_device_info {
            ctx.env.device_info()
        } else {
            None
        },
        app_info: if ctx.include_app_info {
            ctx.env.app_info()
        } else {
            None
        },
    });
    ctx.store.persist(&event);
}
