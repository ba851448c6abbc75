//! Capture event types.
//!
//! A [`CaptureEvent`] is the immutable record of a single detected failure:
//! either a crash (an unhandled fatal error) or a hang (the primary thread
//! failing to service its queue within the configured timeout).  Events are
//! built once by a detector, rendered and persisted immediately, and never
//! mutated afterwards.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::environment::{AppInfo, DeviceInfo};

/// Kind of capture, used for file naming and report headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Crash,
    Hang,
}

impl CaptureKind {
    /// Tag used in log file names (`{prefix}_{tag}_{timestamp}.txt`).
    #[must_use]
    pub fn file_tag(self) -> &'static str {
        match self {
            Self::Crash => "crash",
            Self::Hang => "anr",
        }
    }
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crash => write!(f, "crash"),
            Self::Hang => write!(f, "hang"),
        }
    }
}

/// Snapshot of an unhandled fatal error, taken on the faulting thread.
#[derive(Debug, Clone, Serialize)]
pub struct CrashCapture {
    /// Event creation time (epoch ms)
    pub timestamp_ms: u64,
    /// Name of the faulting thread (`<unnamed>` when the thread has none)
    pub thread_name: String,
    /// Numeric identity of the faulting thread (0 when unavailable)
    pub thread_id: u64,
    /// Error classification, e.g. `panic`
    pub error_type: String,
    /// Error message / panic payload
    pub error_message: String,
    /// Source location (`file:line:col`) if available
    pub location: Option<String>,
    /// Ordered stack frames of the faulting thread, outermost last
    pub frames: Vec<String>,
    /// Device snapshot taken at capture time, when configured
    pub device_info: Option<DeviceInfo>,
    /// Application snapshot taken at capture time, when configured
    pub app_info: Option<AppInfo>,
}

/// Stack dump of a single live thread, as sampled at hang time.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadDump {
    /// Thread name (`<unnamed>` when the thread has none)
    pub name: String,
    /// Numeric thread identity
    pub id: u64,
    /// Scheduler state string, e.g. `running`, `sleeping` (best effort)
    pub state: String,
    /// Ordered stack frames; stored in full, truncated at render time
    pub frames: Vec<String>,
}

/// Snapshot of a detected primary-thread stall.
#[derive(Debug, Clone, Serialize)]
pub struct HangCapture {
    /// Event creation time (epoch ms)
    pub timestamp_ms: u64,
    /// Stack frames of the primary thread at detection time
    pub primary_frames: Vec<String>,
    /// All live threads keyed by thread id; `None` when not configured.
    /// Iteration order is irrelevant.
    pub all_threads: Option<HashMap<u64, ThreadDump>>,
    /// Device snapshot taken at capture time, when configured
    pub device_info: Option<DeviceInfo>,
    /// Application snapshot taken at capture time, when configured
    pub app_info: Option<AppInfo>,
}

/// A single detected failure, ready for rendering and persistence.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureEvent {
    Crash(CrashCapture),
    Hang(HangCapture),
}

impl CaptureEvent {
    /// Event creation time (epoch ms).
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Crash(c) => c.timestamp_ms,
            Self::Hang(h) => h.timestamp_ms,
        }
    }

    /// Kind of this capture.
    #[must_use]
    pub fn kind(&self) -> CaptureKind {
        match self {
            Self::Crash(_) => CaptureKind::Crash,
            Self::Hang(_) => CaptureKind::Hang,
        }
    }
}

/// Current wall-clock time as epoch milliseconds.
#[must_use]
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}
