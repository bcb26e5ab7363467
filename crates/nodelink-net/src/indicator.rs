//! Log-backed status indicator
//!
//! Hosts have no status LED; phase changes of the indicator are written to
//! the log instead. Repeated starts while already active are not logged
//! again.

use nodelink_core::traits::Indicator;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Indicator that logs when flashing starts and stops
#[derive(Debug, Default)]
pub struct LogIndicator {
    active: AtomicBool,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the indicator is currently flashing
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Indicator for LogIndicator {
    fn start(&self, intensity: f32) {
        if !self.active.swap(true, Ordering::SeqCst) {
            debug!("Indicator flashing every {}s", intensity);
        }
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("Indicator off");
        }
    }
}
