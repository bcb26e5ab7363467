// # Discovery Channel Trait
//
// Defines the datagram channel the discovery listener reads announcements
// from. It mirrors the packet-at-a-time interface of embedded UDP stacks:
// wait for a packet, ask who sent it, read its bytes, flush what is left.

use async_trait::async_trait;
use std::net::IpAddr;

/// Largest datagram payload the discovery channel hands out
pub const MAX_DATAGRAM_LEN: usize = 1024;

/// Trait for discovery channel implementations
///
/// A channel holds at most one pending packet. `next_packet` replaces it;
/// `flush` discards it.
///
/// # Cancellation
///
/// `next_packet` is raced against timers and shutdown in the node control
/// loop, so it must be cancellation-safe: dropping the future must not lose
/// a packet that was already returned.
#[async_trait]
pub trait DiscoveryChannel: Send + Sync {
    /// Bind the channel to `port` on all interfaces, broadcast enabled
    async fn bind(&mut self, port: u16) -> Result<(), crate::Error>;

    /// Release the port
    async fn close(&mut self);

    /// Wait for the next datagram and make it the pending packet
    ///
    /// # Returns
    ///
    /// The payload length, at most [`MAX_DATAGRAM_LEN`]
    async fn next_packet(&mut self) -> Result<usize, crate::Error>;

    /// Sender address of the pending packet
    fn remote_ip(&self) -> Option<IpAddr>;

    /// Copy bytes of the pending packet into `buf`
    ///
    /// Returns the number of bytes copied; consecutive reads continue where
    /// the previous one stopped.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Discard whatever is left of the pending packet
    fn flush(&mut self);
}
