//! Plug configuration.
//!
//! [`PlugConfig`] is built once and handed to the session manager; nothing in
//! the engine reads mutable defaults at run time. Durations below their
//! minimum are clamped up, with a warning, as soon as they are set.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Credentials, error::Error, transport::DEFAULT_PORT};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Smallest accepted request timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default host poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Smallest accepted host poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Consecutive identical device errors before a fault counts as persistent.
pub const DEFAULT_FAULT_THRESHOLD: u32 = 3;

/// Protocol generation spoken by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionType {
    /// Seed handshake with sequence-bound AES (current firmware).
    #[default]
    Klap,
    /// RSA key exchange with securePassthrough (older firmware).
    Aes,
}

impl std::fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncryptionType::Klap => write!(f, "KLAP"),
            EncryptionType::Aes => write!(f, "AES"),
        }
    }
}

impl std::str::FromStr for EncryptionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "klap" => Ok(EncryptionType::Klap),
            "aes" | "passthrough" => Ok(EncryptionType::Aes),
            other => Err(Error::InvalidConfig(format!(
                "unknown encryption type '{}'",
                other
            ))),
        }
    }
}

/// Configuration for one plug.
#[derive(Debug, Clone)]
pub struct PlugConfig {
    /// Device hostname or IP address.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Account credentials.
    pub credentials: Credentials,
    /// Protocol generation.
    pub encryption: EncryptionType,
    /// Bound on every HTTP exchange.
    pub timeout: Duration,
    /// Interval at which a host should poll the plug.
    pub poll_interval: Duration,
    /// Whether the host wants energy readings on each poll.
    pub power_measurement: bool,
    /// Identical device errors in a row before reporting a persistent fault.
    pub fault_threshold: u32,
}

impl PlugConfig {
    /// Creates a configuration with defaults for everything but host and
    /// credentials.
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            credentials,
            encryption: EncryptionType::default(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            power_measurement: false,
            fault_threshold: DEFAULT_FAULT_THRESHOLD,
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the protocol generation.
    pub fn with_encryption(mut self, encryption: EncryptionType) -> Self {
        self.encryption = encryption;
        self
    }

    /// Sets the request timeout, clamped to [`MIN_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = clamp("timeout", timeout, MIN_TIMEOUT);
        self
    }

    /// Sets the poll interval, clamped to [`MIN_POLL_INTERVAL`].
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = clamp("poll interval", interval, MIN_POLL_INTERVAL);
        self
    }

    /// Enables energy readings on metering models.
    pub fn with_power_measurement(mut self, enabled: bool) -> Self {
        self.power_measurement = enabled;
        self
    }

    /// Sets the persistent-fault threshold (at least 1).
    pub fn with_fault_threshold(mut self, threshold: u32) -> Self {
        self.fault_threshold = threshold.max(1);
        self
    }

    /// Rejects configurations that cannot authenticate.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host is empty".into()));
        }
        if self.credentials.is_blank() {
            return Err(Error::InvalidConfig(
                "credentials are required for local control".into(),
            ));
        }
        Ok(())
    }
}

fn clamp(name: &str, value: Duration, min: Duration) -> Duration {
    if value < min {
        warn!(
            requested = ?value,
            minimum = ?min,
            "{} below minimum, using minimum",
            name
        );
        min
    } else {
        value
    }
}
