//! TCP debug relay
//!
//! Each report opens a short-lived TCP connection to every configured
//! endpoint and writes one line, `"<sender> <message>\n"`. The primary
//! endpoint is tried first, then the secondary. Unreachable endpoints are
//! logged and skipped.

use async_trait::async_trait;
use nodelink_core::traits::DebugRelay;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Default time allowed to reach one endpoint
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Debug relay writing to a primary and an optional secondary TCP endpoint
#[derive(Debug, Clone)]
pub struct TcpDebugRelay {
    endpoints: Vec<SocketAddr>,
    connect_timeout: Duration,
}

impl TcpDebugRelay {
    /// Create a relay for `primary`
    pub fn new(primary: SocketAddr) -> Self {
        Self {
            endpoints: vec![primary],
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Also deliver every report to `secondary`
    pub fn with_secondary(mut self, secondary: SocketAddr) -> Self {
        self.endpoints.push(secondary);
        self
    }

    /// Override the per-endpoint connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Configured endpoints, primary first
    pub fn endpoints(&self) -> &[SocketAddr] {
        &self.endpoints
    }

    async fn deliver(&self, endpoint: SocketAddr, line: &[u8]) -> std::io::Result<()> {
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.write_all(line).await?;
        stream.shutdown().await
    }
}

#[async_trait]
impl DebugRelay for TcpDebugRelay {
    async fn report(&self, message: &str, sender_id: &str) {
        debug!(sender = sender_id, "{}", message);

        let line = format!("{} {}\n", sender_id, message);
        for endpoint in &self.endpoints {
            if let Err(e) = self.deliver(*endpoint, line.as_bytes()).await {
                warn!("Debug relay to {} failed: {}", endpoint, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn read_one_line(listener: &TcpListener) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = String::new();
        stream.read_to_string(&mut received).await.unwrap();
        received
    }

    #[tokio::test]
    async fn test_report_reaches_both_endpoints() {
        let primary = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let secondary = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = TcpDebugRelay::new(primary.local_addr().unwrap())
            .with_secondary(secondary.local_addr().unwrap());

        let (_, first, second) = tokio::join!(
            relay.report("Connected to net", "WIFI"),
            read_one_line(&primary),
            read_one_line(&secondary),
        );

        assert_eq!(first, "WIFI Connected to net\n");
        assert_eq!(second, "WIFI Connected to net\n");
    }

    #[tokio::test]
    async fn test_unreachable_primary_does_not_block_secondary() {
        // Bind and drop to get a port nobody listens on
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let secondary = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = TcpDebugRelay::new(closed)
            .with_secondary(secondary.local_addr().unwrap())
            .with_connect_timeout(Duration::from_millis(500));

        let (_, received) = tokio::join!(
            relay.report("{\"camID\":\"cam-7\"}", "CONFIG"),
            read_one_line(&secondary),
        );

        assert_eq!(received, "CONFIG {\"camID\":\"cam-7\"}\n");
    }

    #[test]
    fn test_endpoint_order() {
        let primary: SocketAddr = "10.0.0.2:8888".parse().unwrap();
        let secondary: SocketAddr = "10.0.0.3:8888".parse().unwrap();
        let relay = TcpDebugRelay::new(primary).with_secondary(secondary);
        assert_eq!(relay.endpoints(), &[primary, secondary]);
    }
}
