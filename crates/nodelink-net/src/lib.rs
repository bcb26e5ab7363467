// # nodelink-net
//
// Host implementations of the nodelink hardware seams.
//
// ## Contents
//
// - [`UdpDiscoveryChannel`]: tokio `UdpSocket` bound to the discovery port
// - [`TcpDebugRelay`]: forwards diagnostics to up to two TCP endpoints
// - [`HostRadio`]: WiFi radio backed by the host network stack (Linux)
// - [`LogIndicator`]: status indicator that writes to the log
//
// ## Platform Support
//
// The UDP channel, TCP relay and indicator are portable. `HostRadio` reads
// link quality from `/proc/net/wireless` and therefore only reports signal
// strength on Linux; elsewhere every scan comes back empty.

pub mod indicator;
pub mod radio;
pub mod relay;
pub mod udp;

pub use indicator::LogIndicator;
pub use radio::HostRadio;
pub use relay::TcpDebugRelay;
pub use udp::UdpDiscoveryChannel;
