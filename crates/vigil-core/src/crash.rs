//! Crash interception via the process-wide panic hook.
//!
//! [`install`] replaces the panic hook with a shim that records a crash
//! capture and then forwards to the previously installed hook, so the
//! host's normal fatal-error path (including default termination behavior)
//! proceeds unimpeded. The interceptor is purely an observer: nothing in
//! this module may suppress, alter, or outrun the termination path it is
//! watching.
//!
//! # Safety discipline
//!
//! A panic raised inside a panic hook aborts the process before any capture
//! can be written, so everything on the hook path is written to be
//! infallible: no unwraps, no expects, all internal errors swallowed after
//! diagnostic logging.

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::event::{CaptureEvent, CrashCapture, epoch_ms};
use crate::lifecycle::Controller;

/// Tracks the single per-process hook installation.
static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Fault details normalized for capture, independent of the panic machinery
/// so tests can drive the interceptor with synthetic faults.
#[derive(Debug, Clone)]
pub struct FaultInfo {
    /// Name of the faulting thread (`<unnamed>` when the thread has none)
    pub thread_name: String,
    /// Numeric identity of the faulting thread (0 when unavailable)
    pub thread_id: u64,
    /// Error classification, e.g. `panic`
    pub error_type: String,
    /// Error message / panic payload
    pub message: String,
    /// Source location (`file:line:col`) if available
    pub location: Option<String>,
    /// Ordered stack frames of the faulting thread
    pub frames: Vec<String>,
}

/// Builds crash captures and hands them to the store.
///
/// Holds only a controller handle: lifecycle state, configuration and the
/// store are read at invocation time, so shutdown / re-initialize cycles
/// are observed without reinstalling the hook.
pub struct CrashInterceptor {
    controller: Arc<Controller>,
}

impl CrashInterceptor {
    /// Create an interceptor bound to a controller.
    #[must_use]
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }

    /// Record a fault.
    ///
    /// Skips capture entirely when the controller reports the system
    /// inactive. Never propagates failure: the caller is on the process
    /// termination path and must reach the previous hook regardless.
    pub fn record(&self, fault: &FaultInfo) {
        let Some(ctx) = self.controller.capture_context() else {
            debug!("crash observed while inactive; capture skipped");
            return;
        };

        let event = CaptureEvent::Crash(CrashCapture {
            timestamp_ms: epoch_ms(),
            thread_name: fault.thread_name.clone(),
            thread_id: fault.thread_id,
            error_type: fault.error_type.clone(),
            error_message: fault.message.clone(),
            location: fault.location.clone(),
            frames: fault.frames.clone(),
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
}

/// Install the crash interceptor as the process panic hook, chaining the
/// previously installed hook.
///
/// Idempotent: at most one installation per process. The shim consults the
/// controller at invocation time, so it goes inert after `shutdown()` and
/// picks up a later re-initialization without being reinstalled (the
/// process-wide hook is not safely revocable once other code may have
/// chained onto it).
pub fn install(controller: Arc<Controller>) {
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let interceptor = CrashInterceptor::new(controller);
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let fault = fault_from_panic(info);
        interceptor.record(&fault);
        // Guaranteed-run forwarding: capture must never suppress or alter
        // the host's fatal-error termination path.
        previous(info);
    }));
    debug!("crash interceptor installed");
}

/// Whether the process panic hook has been installed.
#[must_use]
pub fn is_installed() -> bool {
    HOOK_INSTALLED.load(Ordering::SeqCst)
}

/// Extract normalized fault details from a panic, including a backtrace of
/// the faulting thread.
#[must_use]
pub fn fault_from_panic(info: &std::panic::PanicHookInfo<'_>) -> FaultInfo {
    // Capture the backtrace early, before any allocation that might fail.
    let backtrace = Backtrace::force_capture();

    let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    let location = info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));

    let thread = std::thread::current();
    FaultInfo {
        thread_name: thread
            .name()
            .unwrap_or("<unnamed>")
            .to_string(),
        thread_id: thread_id_value(thread.id()),
        error_type: "panic".to_string(),
        message,
        location,
        frames: parse_backtrace(&backtrace.to_string()),
    }
}

/// Numeric value of a thread id.
/// `ThreadId` exposes no stable accessor, so the value is extracted from
/// its Debug rendering (`ThreadId(N)`); 0 when that shape ever changes.
fn thread_id_value(id: std::thread::ThreadId) -> u64 {
    let repr = format!("{id:?}");
    let digits: String = repr.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Parse `Backtrace`'s rendered output into per-frame descriptions.
///
/// Symbol lines look like `  12: path::to::function`, optionally followed
/// by an `at file:line:col` continuation that is folded into the frame as
/// `path::to::function (file:line:col)`.
fn parse_backtrace(rendered: &str) -> Vec<String> {
    let mut frames = Vec::new();
    for line in rendered.lines() {
        let trimmed = line.trim_start();
        if let Some(symbol) = frame_symbol(trimmed) {
            frames.push(symbol.to_string());
        } else if let Some(loc) = trimmed.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.push_str(" (");
                last.push_str(loc.trim());
                last.push(')');
            }
        }
    }
    frames
}

fn frame_symbol(line: &str) -> Option<&str> {
    let (index, rest) = line.split_once(':')?;
    let index = index.trim();
    if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
        Some(rest.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::list_capture_logs;

    fn fault() -> FaultInfo {
        FaultInfo {
            thread_name: "worker".to_string(),
            thread_id: 3,
            error_type: "panic".to_string(),
            message: "boom".to_string(),
            location: Some("src/job.rs:7:9".to_string()),
            frames: vec!["job::run (src/job.rs:7)".to_string()],
        }
    }

    fn initialized_controller(dir: &std::path::Path) -> Arc<Controller> {
        let controller = Controller::new();
        let config = Config {
            crash_detection: false,
            hang_detection: false,
            include_device_info: false,
            include_app_info: false,
            log_dir: Some(dir.to_path_buf()),
            ..Config::default()
        };
        controller.initialize(config).unwrap();
        controller
    }

    #[test]
    fn record_on_uninitialized_controller_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = Controller::new();
        let interceptor = CrashInterceptor::new(controller);

        interceptor.record(&fault());
        assert!(list_capture_logs(tmp.path(), 10).is_empty());
    }

    #[test]
    fn record_persists_crash_document() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = initialized_controller(tmp.path());
        let interceptor = CrashInterceptor::new(controller);

        interceptor.record(&fault());

        let files = list_capture_logs(tmp.path(), 10);
        assert_eq!(files.len(), 1);
        assert!(files[0].file_name.contains("_crash_"));

        let text = std::fs::read_to_string(&files[0].path).unwrap();
        assert!(text.contains("=== CRASH LOG ==="));
        assert!(text.contains("Thread: worker (id=3)"));
        assert!(text.contains("Exception: panic: boom"));
        assert!(text.contains("  at job::run (src/job.rs:7)"));
        assert!(!text.contains("DEVICE INFO"));
        assert!(!text.contains("APP INFO"));
    }

    #[test]
    fn record_respects_runtime_disable() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = initialized_controller(tmp.path());
        controller.set_enabled(false);
        let interceptor = CrashInterceptor::new(controller);

        interceptor.record(&fault());
        assert!(list_capture_logs(tmp.path(), 10).is_empty());
    }

    #[test]
    fn backtrace_parsing_folds_locations() {
        let rendered = "\
   0: vigil_core::crash::tests::synthetic
             at ./src/crash.rs:10:5
   1: core::ops::function::FnOnce::call_once
   2: std::sys::backtrace::__rust_begin_short_backtrace
             at /rustc/abc/library/std/src/sys/backtrace.rs:154:18
";
        let frames = parse_backtrace(rendered);
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[0],
            "vigil_core::crash::tests::synthetic (./src/crash.rs:10:5)"
        );
        assert_eq!(frames[1], "core::ops::function::FnOnce::call_once");
    }

    #[test]
    fn disabled_backtrace_yields_no_frames() {
        assert!(parse_backtrace("disabled backtrace").is_empty());
    }

    #[test]
    fn current_thread_id_is_nonzero() {
        assert!(thread_id_value(std::thread::current().id()) > 0);
    }
}
