//! Shared helpers for integration tests.

use std::path::Path;
use std::time::{Duration, Instant};

use vigil_core::store::list_capture_logs;

/// Poll `predicate` every 10 ms until it holds or `deadline` elapses.
pub fn wait_for(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

/// Number of capture files currently in `dir`.
pub fn capture_count(dir: &Path) -> usize {
    list_capture_logs(dir, 1000).len()
}
