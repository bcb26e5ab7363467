//! UDP discovery channel
//!
//! Binds a tokio `UdpSocket` on all interfaces with broadcast enabled and
//! hands received datagrams to the discovery listener one at a time.

use async_trait::async_trait;
use nodelink_core::traits::{DiscoveryChannel, MAX_DATAGRAM_LEN};
use nodelink_core::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Discovery channel over a UDP socket
///
/// Datagrams longer than [`MAX_DATAGRAM_LEN`] are truncated by the receive
/// buffer.
pub struct UdpDiscoveryChannel {
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
    pending: Option<Pending>,
}

struct Pending {
    sender: IpAddr,
    len: usize,
    cursor: usize,
}

impl UdpDiscoveryChannel {
    /// Create an unbound channel
    pub fn new() -> Self {
        Self {
            socket: None,
            buf: vec![0u8; MAX_DATAGRAM_LEN],
            pending: None,
        }
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl Default for UdpDiscoveryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryChannel for UdpDiscoveryChannel {
    async fn bind(&mut self, port: u16) -> Result<()> {
        self.close().await;

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::channel(format!("Failed to bind UDP port {}: {}", port, e)))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::channel(format!("Failed to enable broadcast: {}", e)))?;

        debug!("UDP discovery socket bound to {}", addr);
        self.socket = Some(socket);
        Ok(())
    }

    async fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("UDP discovery socket closed");
        }
        self.pending = None;
    }

    async fn next_packet(&mut self) -> Result<usize> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(Error::channel("UDP discovery socket is not bound"));
        };

        // recv_from is cancel safe; nothing is consumed until it resolves
        let (len, from) = socket.recv_from(&mut self.buf).await?;
        trace!("Received {} byte datagram from {}", len, from);

        self.pending = Some(Pending {
            sender: from.ip(),
            len,
            cursor: 0,
        });
        Ok(len)
    }

    fn remote_ip(&self) -> Option<IpAddr> {
        self.pending.as_ref().map(|p| p.sender)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(pending) = self.pending.as_mut() else {
            return 0;
        };
        let available = &self.buf[pending.cursor..pending.len];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        pending.cursor += n;
        n
    }

    fn flush(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    async fn bound_channel() -> (UdpDiscoveryChannel, SocketAddr) {
        let mut channel = UdpDiscoveryChannel::new();
        channel.bind(0).await.unwrap();
        let port = channel.local_addr().unwrap().port();
        (channel, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    #[tokio::test]
    async fn test_receive_read_and_flush() {
        let (mut channel, target) = bound_channel().await;
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(br#"{"de":"cam-7"}"#, target).await.unwrap();

        let len = assert_ok!(channel.next_packet().await);
        assert_eq!(len, 14);
        assert_eq!(channel.remote_ip(), Some(IpAddr::from(Ipv4Addr::LOCALHOST)));

        let mut first = [0u8; 4];
        assert_eq!(channel.read(&mut first), 4);
        assert_eq!(&first, br#"{"de"#);

        let mut rest = [0u8; 64];
        assert_eq!(channel.read(&mut rest), 10);

        channel.flush();
        assert_eq!(channel.remote_ip(), None);
        assert_eq!(channel.read(&mut rest), 0);
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_truncated() {
        let (mut channel, target) = bound_channel().await;
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&vec![b'x'; MAX_DATAGRAM_LEN + 100], target)
            .await
            .unwrap();

        let len = assert_ok!(channel.next_packet().await);
        assert!(len <= MAX_DATAGRAM_LEN);
    }

    #[tokio::test]
    async fn test_unbound_channel_errors() {
        let mut channel = UdpDiscoveryChannel::new();
        assert_err!(channel.next_packet().await);
        assert!(channel.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_close_releases_socket() {
        let (mut channel, _) = bound_channel().await;
        channel.close().await;
        assert!(channel.local_addr().is_none());
    }
}
