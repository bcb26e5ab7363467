// # nodelinkd - nodelink Node Daemon
//
// The nodelinkd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the host implementations of radio, channel, relay and indicator
// 4. Booting the node and running its control loop
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Storage
// - `NODE_CONFIG_PATH`: Path to the persisted settings file
// - `NODE_FORMAT_STORE`: Erase the settings file before booting (true/false)
//
// ### Network
// - `NODE_SSID`: Network name used when none is persisted
// - `NODE_WIRELESS_INTERFACE`: Interface whose link quality is reported
// - `NODE_PORTAL_TIMEOUT_SECS`: Upper bound for one association attempt
// - `NODE_LINK_CHECK_SECS`: Interval between link checks
// - `NODE_FACTORY_RESET`: Erase credentials and exit for restart (true/false)
//
// ### Discovery
// - `NODE_DISCOVERY_PORT`: UDP port peers announce themselves on
//
// ### Diagnostics
// - `NODE_DEBUG_PRIMARY`: Primary debug relay endpoint (host:port)
// - `NODE_DEBUG_SECONDARY`: Secondary debug relay endpoint (host:port)
// - `NODE_LOG_LEVEL`: trace, debug, info, warn or error
//
// ## Example
//
// ```bash
// export NODE_CONFIG_PATH=/var/lib/nodelink/config.json
// export NODE_SSID=greenhouse
// export NODE_DEBUG_PRIMARY=192.168.1.2:8888
//
// nodelinkd
// ```

use anyhow::{Context, Result};
use nodelink_core::traits::{ConfigStore, DebugRelay, TracingRelay};
use nodelink_core::{Error as CoreError, FileConfigStore, Node, NodeConfig, NodeEvent};
use nodelink_net::{HostRadio, LogIndicator, TcpDebugRelay, UdpDiscoveryChannel};
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
/// - 3: The node must be restarted (provisioning or factory reset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// Restart required to continue
    RestartRequested = 3,
}

impl From<NodeExitCode> for ExitCode {
    fn from(code: NodeExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Default location of the persisted settings
const DEFAULT_CONFIG_PATH: &str = "/var/lib/nodelink/config.json";

/// Default interface whose link quality is reported
const DEFAULT_WIRELESS_INTERFACE: &str = "wlan0";

/// Application configuration
#[derive(Debug)]
struct Config {
    config_path: String,
    ssid: Option<String>,
    discovery_port: Option<u16>,
    portal_timeout_secs: Option<u64>,
    link_check_secs: Option<u64>,
    debug_primary: Option<String>,
    debug_secondary: Option<String>,
    wireless_interface: String,
    format_store: bool,
    factory_reset: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: env::var("NODE_CONFIG_PATH")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
            ssid: env::var("NODE_SSID").ok(),
            discovery_port: parse_var("NODE_DISCOVERY_PORT")?,
            portal_timeout_secs: parse_var("NODE_PORTAL_TIMEOUT_SECS")?,
            link_check_secs: parse_var("NODE_LINK_CHECK_SECS")?,
            debug_primary: env::var("NODE_DEBUG_PRIMARY").ok(),
            debug_secondary: env::var("NODE_DEBUG_SECONDARY").ok(),
            wireless_interface: env::var("NODE_WIRELESS_INTERFACE")
                .unwrap_or_else(|_| DEFAULT_WIRELESS_INTERFACE.to_string()),
            format_store: parse_var("NODE_FORMAT_STORE")?.unwrap_or(false),
            factory_reset: parse_var("NODE_FACTORY_RESET")?.unwrap_or(false),
            log_level: env::var("NODE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.config_path.is_empty() {
            anyhow::bail!("NODE_CONFIG_PATH cannot be empty");
        }

        if let Some(ssid) = &self.ssid
            && !(1..=32).contains(&ssid.len())
        {
            anyhow::bail!(
                "NODE_SSID must be between 1 and 32 bytes. Got {} bytes",
                ssid.len()
            );
        }

        if self.discovery_port == Some(0) {
            anyhow::bail!("NODE_DISCOVERY_PORT must be between 1 and 65535");
        }

        if let Some(timeout) = self.portal_timeout_secs
            && !(10..=3600).contains(&timeout)
        {
            anyhow::bail!(
                "NODE_PORTAL_TIMEOUT_SECS must be between 10 and 3600 seconds. Got: {}",
                timeout
            );
        }

        if let Some(interval) = self.link_check_secs
            && !(5..=3600).contains(&interval)
        {
            anyhow::bail!(
                "NODE_LINK_CHECK_SECS must be between 5 and 3600 seconds. Got: {}",
                interval
            );
        }

        if self.debug_secondary.is_some() && self.debug_primary.is_none() {
            anyhow::bail!("NODE_DEBUG_SECONDARY requires NODE_DEBUG_PRIMARY");
        }
        for (name, endpoint) in [
            ("NODE_DEBUG_PRIMARY", &self.debug_primary),
            ("NODE_DEBUG_SECONDARY", &self.debug_secondary),
        ] {
            if let Some(endpoint) = endpoint
                && endpoint.parse::<SocketAddr>().is_err()
            {
                anyhow::bail!("{} must be an address:port pair. Got: {}", name, endpoint);
            }
        }

        if self.wireless_interface.is_empty() {
            anyhow::bail!("NODE_WIRELESS_INTERFACE cannot be empty");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "NODE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Runtime tunables for the node
    fn node_config(&self) -> NodeConfig {
        let mut config = NodeConfig::new();
        if let Some(port) = self.discovery_port {
            config.discovery_port = port;
        }
        if let Some(timeout) = self.portal_timeout_secs {
            config.portal_timeout_secs = timeout;
        }
        if let Some(interval) = self.link_check_secs {
            config.link_check_interval_secs = interval;
        }
        if let Some(ssid) = &self.ssid {
            config = config.with_fallback_ssid(ssid.clone());
        }
        config
    }

    /// Debug relay for the configured endpoints
    fn debug_relay(&self) -> Result<Arc<dyn DebugRelay>> {
        let Some(primary) = &self.debug_primary else {
            return Ok(Arc::new(TracingRelay));
        };

        let mut relay = TcpDebugRelay::new(primary.parse()?);
        if let Some(secondary) = &self.debug_secondary {
            relay = relay.with_secondary(secondary.parse()?);
        }
        Ok(Arc::new(relay))
    }
}

/// Parse an optional environment variable
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return NodeExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return NodeExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NodeExitCode::ConfigError.into();
    }

    info!("Starting nodelinkd daemon");
    info!("Settings file: {}", config.config_path);

    // The node runs a single cooperative loop
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NodeExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run_daemon(config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                NodeExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Exit code for an error returned by `Node::boot`
fn boot_failure_code(err: &CoreError) -> NodeExitCode {
    match err {
        CoreError::ConnectFailed { .. } => NodeExitCode::RestartRequested,
        CoreError::Config(_) => NodeExitCode::ConfigError,
        _ => NodeExitCode::RuntimeError,
    }
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<NodeExitCode> {
    let relay = config.debug_relay()?;

    let store = FileConfigStore::new(&config.config_path)
        .await?
        .with_relay(Arc::clone(&relay));
    if config.format_store {
        info!("Formatting settings store");
        store.format().await?;
    }

    let radio = HostRadio::new(config.wireless_interface.clone());
    let (mut node, events) = Node::new(
        Arc::new(radio),
        Box::new(UdpDiscoveryChannel::new()),
        Arc::new(store),
        Arc::new(LogIndicator::new()),
        relay,
        config.node_config(),
    )?;
    tokio::spawn(log_events(events));

    if config.factory_reset {
        node.factory_reset().await?;
        info!("Factory reset complete, restart required");
        return Ok(NodeExitCode::RestartRequested);
    }

    match node.boot().await {
        Ok(address) => info!("Node up at {}", address),
        Err(e) => {
            let code = boot_failure_code(&e);
            match code {
                NodeExitCode::RestartRequested => {
                    warn!("Could not associate, restart required for provisioning: {}", e)
                }
                _ => error!("Boot failed: {}", e),
            }
            return Ok(code);
        }
    }
    info!("Signal strength: {} dBm", node.signal_strength().await);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown signal error: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    node.run_with_shutdown(Some(shutdown_rx)).await?;
    info!("Shutting down daemon");

    Ok(NodeExitCode::CleanShutdown)
}

/// Log node events as they arrive
async fn log_events(mut events: mpsc::Receiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::PeerDiscovered { role, address } => info!("Peer {} at {}", role, address),
            NodeEvent::LinkLost => warn!("Link lost"),
            other => info!("Node event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
