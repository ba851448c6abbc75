//! Plain-text rendering of capture events.
//!
//! [`render`] is a pure function from a [`CaptureEvent`] to the multi-section
//! log document written by the store. The layout is stable and line-oriented
//! so the files remain grep-able:
//!
//! ```text
//! === CRASH LOG ===        (or === ANR LOG ===)
//! Timestamp: ...
//! Type: CRASH              (or ANR)
//! Log Version: 1.0
//!
//! === EXCEPTION INFO ===   (or === MAIN THREAD STACK TRACE ===)
//! ...
//! === END LOG ===
//! ```
//!
//! Per-thread frame lists in the `ALL THREADS` section are truncated to the
//! first [`MAX_FRAMES_PER_THREAD`] entries with a `... <k> more` marker.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::environment::{AppInfo, DeviceInfo};
use crate::event::{CaptureEvent, CrashCapture, HangCapture};

/// Version line embedded in every log document.
pub const LOG_VERSION: &str = "1.0";

/// Maximum frames rendered per thread in the `ALL THREADS` section.
pub const MAX_FRAMES_PER_THREAD: usize = 10;

/// Render a capture event to its log document.
#[must_use]
pub fn render(event: &CaptureEvent) -> String {
    match event {
        CaptureEvent::Crash(crash) => render_crash(crash),
        CaptureEvent::Hang(hang) => render_hang(hang),
    }
}

fn render_crash(crash: &CrashCapture) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== CRASH LOG ===");
    let _ = writeln!(out, "Timestamp: {}", human_timestamp(crash.timestamp_ms));
    let _ = writeln!(out, "Type: CRASH");
    let _ = writeln!(out, "Log Version: {LOG_VERSION}");
    let _ = writeln!(out);

    let _ = writeln!(out, "=== EXCEPTION INFO ===");
    let _ = writeln!(
        out,
        "Thread: {} (id={})",
        crash.thread_name, crash.thread_id
    );
    let _ = writeln!(
        out,
        "Exception: {}: {}",
        crash.error_type, crash.error_message
    );
    if let Some(location) = &crash.location {
        let _ = writeln!(out, "Location: {location}");
    }
    let _ = writeln!(out, "Stack Trace:");
    for frame in &crash.frames {
        let _ = writeln!(out, "  at {frame}");
    }
    let _ = writeln!(out);

    if let Some(device) = &crash.device_info {
        append_device_info(&mut out, device);
    }
    if let Some(app) = &crash.app_info {
        append_app_info(&mut out, app);
    }

    let _ = writeln!(out, "=== END LOG ===");
    out
}

fn render_hang(hang: &HangCapture) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== ANR LOG ===");
    let _ = writeln!(out, "Timestamp: {}", human_timestamp(hang.timestamp_ms));
    let _ = writeln!(out, "Type: ANR");
    let _ = writeln!(out, "Log Version: {LOG_VERSION}");
    let _ = writeln!(out);

    let _ = writeln!(out, "=== MAIN THREAD STACK TRACE ===");
    if hang.primary_frames.is_empty() {
        let _ = writeln!(out, "  (unavailable)");
    }
    for frame in &hang.primary_frames {
        let _ = writeln!(out, "  at {frame}");
    }
    let _ = writeln!(out);

    if let Some(threads) = &hang.all_threads {
        let _ = writeln!(out, "=== ALL THREADS ({} total) ===", threads.len());
        for dump in threads.values() {
            let _ = writeln!(
                out,
                "Thread: {} (id={}, state={})",
                dump.name, dump.id, dump.state
            );
            for frame in dump.frames.iter().take(MAX_FRAMES_PER_THREAD) {
                let _ = writeln!(out, "  at {frame}");
            }
            if dump.frames.len() > MAX_FRAMES_PER_THREAD {
                let _ = writeln!(
                    out,
                    "  ... {} more",
                    dump.frames.len() - MAX_FRAMES_PER_THREAD
                );
            }
            let _ = writeln!(out);
        }
    }

    if let Some(device) = &hang.device_info {
        append_device_info(&mut out, device);
    }
    if let Some(app) = &hang.app_info {
        append_app_info(&mut out, app);
    }

    let _ = writeln!(out, "=== END LOG ===");
    out
}

fn append_device_info(out: &mut String, device: &DeviceInfo) {
    let _ = writeln!(out, "=== DEVICE INFO ===");
    if let Some(hostname) = &device.hostname {
        let _ = writeln!(out, "Hostname: {hostname}");
    }
    let _ = writeln!(out, "OS: {} ({})", device.os, device.arch);
    if let Some(kernel) = &device.kernel {
        let _ = writeln!(out, "Kernel: {kernel}");
    }
    let _ = writeln!(out, "CPU Count: {}", device.cpu_count);
    if let Some(ram) = device.available_ram_mb {
        let _ = writeln!(out, "Available RAM: {ram} MB");
    }
    if let Some(storage) = device.total_storage_gb {
        let _ = writeln!(out, "Total Storage: {storage} GB");
    }
    let _ = writeln!(out);
}

fn append_app_info(out: &mut String, app: &AppInfo) {
    let _ = writeln!(out, "=== APP INFO ===");
    let _ = writeln!(out, "Package: {}", app.name);
    if let Some(version) = &app.version {
        let _ = writeln!(out, "Version: {version}");
    }
    let _ = writeln!(out, "Process: {}", app.pid);
    if let Some(exe) = &app.exe_path {
        let _ = writeln!(out, "Executable: {exe}");
    }
    let _ = writeln!(out);
}

/// Format epoch milliseconds as `YYYY-MM-DD HH:MM:SS.mmm` (UTC).
fn human_timestamp(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).map_or_else(
        || format!("{epoch_ms} ms"),
        |dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
    )
}

/// Format epoch milliseconds as `yyyyMMdd_HHmmss` (UTC) for file names.
#[must_use]
pub fn file_timestamp(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).map_or_else(
        || format!("{epoch_ms}"),
        |dt| dt.format("%Y%m%d_%H%M%S").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::event::ThreadDump;

    fn crash_event() -> CrashCapture {
        CrashCapture {
            // 2023-11-14 22:13:20 UTC
            timestamp_ms: 1_700_000_000_000,
            thread_name: "worker-3".to_string(),
            thread_id: 7,
            error_type: "panic".to_string(),
            error_message: "index out of bounds".to_string(),
            location: Some("src/lib.rs:42:5".to_string()),
            frames: vec![
                "app::do_work (src/lib.rs:42)".to_string(),
                "std::thread::spawn".to_string(),
            ],
            device_info: None,
            app_info: None,
        }
    }

    #[test]
    fn crash_document_has_header_and_terminator() {
        let text = render(&CaptureEvent::Crash(crash_event()));
        assert!(text.starts_with("=== CRASH LOG ===\n"));
        assert!(text.contains("Type: CRASH"));
        assert!(text.contains("Log Version: 1.0"));
        assert!(text.contains("Timestamp: 2023-11-14 22:13:20.000"));
        assert!(text.ends_with("=== END LOG ===\n"));
    }

    #[test]
    fn crash_document_renders_exception_info() {
        let text = render(&CaptureEvent::Crash(crash_event()));
        assert!(text.contains("=== EXCEPTION INFO ==="));
        assert!(text.contains("Thread: worker-3 (id=7)"));
        assert!(text.contains("Exception: panic: index out of bounds"));
        assert!(text.contains("Location: src/lib.rs:42:5"));
        assert!(text.contains("  at app::do_work (src/lib.rs:42)"));
    }

    #[test]
    fn sections_absent_without_device_and_app_info() {
        let text = render(&CaptureEvent::Crash(crash_event()));
        assert!(!text.contains("DEVICE INFO"));
        assert!(!text.contains("APP INFO"));
    }

    #[test]
    fn device_and_app_sections_render_when_present() {
        let mut crash = crash_event();
        crash.device_info = Some(DeviceInfo {
            hostname: Some("buildbox".to_string()),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            kernel: Some("6.1.0".to_string()),
            cpu_count: 8,
            available_ram_mb: Some(4096),
            total_storage_gb: Some(512),
        });
        crash.app_info = Some(AppInfo {
            name: "demo".to_string(),
            version: Some("0.3.1".to_string()),
            pid: 4242,
            exe_path: None,
        });
        let text = render(&CaptureEvent::Crash(crash));
        assert!(text.contains("=== DEVICE INFO ==="));
        assert!(text.contains("Hostname: buildbox"));
        assert!(text.contains("OS: linux (x86_64)"));
        assert!(text.contains("Available RAM: 4096 MB"));
        assert!(text.contains("=== APP INFO ==="));
        assert!(text.contains("Package: demo"));
        assert!(text.contains("Version: 0.3.1"));
        assert!(text.contains("Process: 4242"));
    }

    #[test]
    fn hang_document_truncates_per_thread_frames() {
        let frames: Vec<String> = (0..20).map(|i| format!("frame_{i}")).collect();
        let mut threads = HashMap::new();
        threads.insert(
            9,
            ThreadDump {
                name: "io-pool".to_string(),
                id: 9,
                state: "sleeping".to_string(),
                frames,
            },
        );
        let hang = HangCapture {
            timestamp_ms: 1_700_000_000_000,
            primary_frames: vec!["main_loop".to_string()],
            all_threads: Some(threads),
            device_info: None,
            app_info: None,
        };
        let text = render(&CaptureEvent::Hang(hang));

        assert!(text.contains("=== ANR LOG ==="));
        assert!(text.contains("=== ALL THREADS (1 total) ==="));
        assert!(text.contains("Thread: io-pool (id=9, state=sleeping)"));
        let at_lines = text
            .lines()
            .filter(|l| l.starts_with("  at frame_"))
            .count();
        assert_eq!(at_lines, MAX_FRAMES_PER_THREAD);
        assert!(text.contains("  ... 10 more"));
    }

    #[test]
    fn hang_primary_stack_is_not_truncated() {
        let frames: Vec<String> = (0..30).map(|i| format!("deep_{i}")).collect();
        let hang = HangCapture {
            timestamp_ms: 0,
            primary_frames: frames,
            all_threads: None,
            device_info: None,
            app_info: None,
        };
        let text = render(&CaptureEvent::Hang(hang));
        let at_lines = text.lines().filter(|l| l.starts_with("  at deep_")).count();
        assert_eq!(at_lines, 30);
        assert!(!text.contains("more"));
        assert!(!text.contains("ALL THREADS"));
    }

    #[test]
    fn hang_without_primary_frames_marks_unavailable() {
        let hang = HangCapture {
            timestamp_ms: 0,
            primary_frames: vec![],
            all_threads: None,
            device_info: None,
            app_info: None,
        };
        let text = render(&CaptureEvent::Hang(hang));
        assert!(text.contains("  (unavailable)"));
    }

    #[test]
    fn file_timestamp_is_sortable() {
        assert_eq!(file_timestamp(1_700_000_000_000), "20231114_221320");
    }
}
