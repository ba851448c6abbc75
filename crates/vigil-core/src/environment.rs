//! Host environment snapshots for capture reports.
//!
//! Provides best-effort collection of device and application metadata
//! attached to capture events.  All probes are designed to be safe and
//! non-fatal: missing data is represented as `None`, never as an error.
//! Snapshots are re-collected for every capture so they reflect current
//! values (available memory in particular changes between captures).

use std::path::Path;

use serde::Serialize;

/// Device/platform snapshot attached to captures when configured.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Host name, when resolvable
    pub hostname: Option<String>,
    /// Operating system identifier, e.g. `linux`
    pub os: String,
    /// CPU architecture, e.g. `x86_64`
    pub arch: String,
    /// Kernel release string, when resolvable
    pub kernel: Option<String>,
    /// Logical CPU count
    pub cpu_count: usize,
    /// Currently available RAM in MB, when resolvable
    pub available_ram_mb: Option<u64>,
    /// Total capacity of the data filesystem in GB, when resolvable
    pub total_storage_gb: Option<u64>,
}

impl DeviceInfo {
    /// Collect a snapshot of the current device state.
    #[must_use]
    pub fn collect() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            hostname: detect_hostname(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            kernel: detect_kernel(),
            cpu_count,
            available_ram_mb: detect_available_ram_mb(),
            total_storage_gb: detect_total_storage_gb(Path::new("/")),
        }
    }
}

/// Application snapshot attached to captures when configured.
#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    /// Application name as registered by the host
    pub name: String,
    /// Application version as registered by the host, when known
    pub version: Option<String>,
    /// Process id
    pub pid: u32,
    /// Resolved executable path, when resolvable
    pub exe_path: Option<String>,
}

/// Supplier of environment snapshots, injected into the detectors.
///
/// Implementations must be cheap enough to call on the faulting thread and
/// must not panic; any internal failure is reported as `None`.
pub trait EnvProvider: Send + Sync + 'static {
    /// Snapshot the device state, or `None` when unavailable.
    fn device_info(&self) -> Option<DeviceInfo>;

    /// Snapshot the application state, or `None` when unavailable.
    fn app_info(&self) -> Option<AppInfo>;
}

/// Default [`EnvProvider`] backed by local probes.
///
/// The application identity is supplied by the host at construction time;
/// everything else is detected at each call.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    app_name: String,
    app_version: Option<String>,
}

impl HostEnvironment {
    /// Create a provider with an explicit application identity.
    #[must_use]
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: Some(app_version.into()),
        }
    }

    /// Create a provider that derives the application name from the
    /// running executable. The version is left unknown.
    #[must_use]
    pub fn detect() -> Self {
        let app_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            app_name,
            app_version: None,
        }
    }
}

impl EnvProvider for HostEnvironment {
    fn device_info(&self) -> Option<DeviceInfo> {
        Some(DeviceInfo::collect())
    }

    fn app_info(&self) -> Option<AppInfo> {
        Some(AppInfo {
            name: self.app_name.clone(),
            version: self.app_version.clone(),
            pid: std::process::id(),
            exe_path: std::env::current_exe()
                .ok()
                .map(|p| p.display().to_string()),
        })
    }
}

fn detect_hostname() -> Option<String> {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim().to_string();
        if !name.is_empty() {
            return Some(name);
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "linux")]
fn detect_kernel() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(not(target_os = "linux"))]
fn detect_kernel() -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn detect_available_ram_mb() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb = rest
                .trim()
                .split_whitespace()
                .next()
                .and_then(|val| val.parse::<u64>().ok())?;
            return Some(kb / 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn detect_available_ram_mb() -> Option<u64> {
    None
}

fn detect_total_storage_gb(path: &Path) -> Option<u64> {
    fs2::total_space(path)
        .ok()
        .map(|bytes| bytes / (1024 * 1024 * 1024))
}
