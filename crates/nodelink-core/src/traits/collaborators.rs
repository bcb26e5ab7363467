// # Observational Collaborators
//
// The status indicator and the debug relay are purely observational: the
// core calls them around long operations and at phase transitions, but no
// return value ever feeds back into control flow.

use async_trait::async_trait;
use tracing::debug;

/// Visual "working" indicator (the double-flash LED on the device)
pub trait Indicator: Send + Sync {
    /// Start flashing; `intensity` is the flash period in seconds
    fn start(&self, intensity: f32);

    /// Stop flashing
    fn stop(&self);
}

/// Best-effort diagnostic message relay
///
/// Delivery failures are swallowed by the implementation.
#[async_trait]
pub trait DebugRelay: Send + Sync {
    /// Report `message` on behalf of `sender_id`
    async fn report(&self, message: &str, sender_id: &str);
}

/// Indicator that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndicator;

impl Indicator for NoopIndicator {
    fn start(&self, _intensity: f32) {}

    fn stop(&self) {}
}

/// Relay that only forwards messages to the local `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRelay;

#[async_trait]
impl DebugRelay for TracingRelay {
    async fn report(&self, message: &str, sender_id: &str) {
        debug!(sender = sender_id, "{}", message);
    }
}
