//! Bounded waits for asynchronous kernel-side effects.
//!
//! Writes to sysfs controls return before the kernel finishes the work they
//! trigger (VF teardown, driver probe, ...). Instead of sleeping a fixed
//! interval, each barrier polls a post-condition until it holds or its
//! timeout runs out. Callers re-observe state afterwards either way.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Poll interval and per-barrier timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    pub poll_interval_ms: u64,
    /// Wait for the VF count to read back 0 after disabling
    pub vf_teardown_ms: u64,
    /// Wait for the VF count to read back the target after creating
    pub vf_creation_ms: u64,
    /// Wait for a driver directory to appear after a module load
    pub module_load_ms: u64,
    /// Wait for the old driver link to disappear after an unbind
    pub unbind_ms: u64,
    /// Wait for an auto-probe claim after identity registration
    pub registration_ms: u64,
    /// Wait for the driver link to show the target after a bind
    pub bind_ms: u64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            vf_teardown_ms: 2_000,
            vf_creation_ms: 5_000,
            module_load_ms: 3_000,
            unbind_ms: 2_000,
            registration_ms: 100,
            bind_ms: 2_000,
        }
    }
}

impl SettlePolicy {
    /// Zero timeouts: every barrier checks its condition exactly once.
    pub fn immediate() -> Self {
        Self {
            poll_interval_ms: 0,
            vf_teardown_ms: 0,
            vf_creation_ms: 0,
            module_load_ms: 0,
            unbind_ms: 0,
            registration_ms: 0,
            bind_ms: 0,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poll `condition` for up to `timeout_ms`. Returns whether it held.
    pub fn wait_until(&self, timeout_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if condition() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(self.poll_interval().max(Duration::from_millis(1)));
        }
    }
}
