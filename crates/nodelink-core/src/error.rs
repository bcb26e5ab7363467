//! Error types for the nodelink core
//!
//! Lookup and parse failures never reach this type: the config store and the
//! discovery listener degrade them to "no data". What remains are the
//! conditions a caller can act on.

use thiserror::Error;

/// Result type alias for nodelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the nodelink system
#[derive(Error, Debug)]
pub enum Error {
    /// The config file could not be opened or replaced for writing
    #[error("Config write failed: {0}")]
    Write(String),

    /// Association did not succeed within the provisioning window
    #[error("Connection to '{ssid}' failed")]
    ConnectFailed {
        /// Network name the attempt was made against
        ssid: String,
    },

    /// The operation is not valid in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// WiFi radio errors
    #[error("Radio error: {0}")]
    Radio(String),

    /// Discovery channel errors
    #[error("Discovery channel error: {0}")]
    Channel(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Create a connection failure for the given network name
    pub fn connect_failed(ssid: impl Into<String>) -> Self {
        Self::ConnectFailed { ssid: ssid.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a radio error
    pub fn radio(msg: impl Into<String>) -> Self {
        Self::Radio(msg.into())
    }

    /// Create a discovery channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is the recoverable "could not associate" outcome
    /// that hands control to the provisioning flow
    pub fn is_connect_failed(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        assert!(matches!(Error::from(io), Error::Network(_)));

        let err = Error::from(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_connect_failed_is_recognised() {
        assert!(Error::connect_failed("net").is_connect_failed());
        assert!(!Error::write("disk full").is_connect_failed());
        assert_eq!(
            Error::connect_failed("net").to_string(),
            "Connection to 'net' failed"
        );
    }
}
