//! Device facade: the typed operations a host calls.
//!
//! # Example
//!
//! ```no_run
//! use tapo_core::{Credentials, Plug, PlugConfig, SmartPlug};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PlugConfig::new("192.168.1.50", Credentials::new("user@example.com", "password"));
//!     let mut plug = Plug::new(config)?;
//!
//!     let info = plug.switch_on().await?;
//!     println!("{} is {}", info.nickname, info.power_state());
//!
//!     if info.supports_energy_monitoring() {
//!         let energy = plug.get_energy().await?;
//!         println!("Power: {:.1}W", energy.current_power_w());
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    commands,
    config::PlugConfig,
    error::Error,
    response::{DeviceInfo, EnergyUsage, Readings},
    session::SessionManager,
};

/// Operations every Tapo plug supports.
#[async_trait]
pub trait SmartPlug: Send {
    /// Establishes a session now instead of on the first command.
    async fn connect(&mut self) -> Result<(), Error>;

    /// Switches the outlet on and returns the refreshed device info.
    async fn switch_on(&mut self) -> Result<DeviceInfo, Error>;

    /// Switches the outlet off and returns the refreshed device info.
    async fn switch_off(&mut self) -> Result<DeviceInfo, Error>;

    /// Fetches device info.
    async fn get_info(&mut self) -> Result<DeviceInfo, Error>;

    /// Fetches energy statistics (metering models only).
    async fn get_energy(&mut self) -> Result<EnergyUsage, Error>;
}

/// One poll's worth of device state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Device info.
    pub info: DeviceInfo,
    /// Energy statistics, when measured this tick.
    pub energy: Option<EnergyUsage>,
}

impl Snapshot {
    /// Combined field mapping for the host.
    pub fn readings(&self) -> Readings {
        let mut readings = self.info.readings();
        if let Some(energy) = &self.energy {
            readings.extend(energy.readings());
        }
        readings
    }
}

/// A Tapo smart plug reached over the local network.
#[derive(Debug)]
pub struct Plug {
    config: PlugConfig,
    session: SessionManager,
}

impl Plug {
    /// Validates `config` and creates the plug. No network traffic happens
    /// until the first command.
    pub fn new(config: PlugConfig) -> Result<Self, Error> {
        config.validate()?;
        let session = SessionManager::new(&config);
        Ok(Self { config, session })
    }

    /// Creates a plug around an existing session manager.
    pub fn with_session(config: PlugConfig, session: SessionManager) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { config, session })
    }

    /// The configuration this plug was built with.
    pub fn config(&self) -> &PlugConfig {
        &self.config
    }

    /// The underlying session manager.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Runs an arbitrary method through the authenticated envelope and
    /// returns the raw `result`.
    pub async fn send_raw(&mut self, method: &str, params: Option<Value>) -> Result<Value, Error> {
        self.session.execute(method, params).await
    }

    async fn set_power(&mut self, on: bool) -> Result<DeviceInfo, Error> {
        debug!(host = %self.config.host, on, "Switching outlet");
        let request = commands::set_power(on);
        self.session.execute(&request.method, request.params).await?;
        self.get_info().await
    }

    /// One host poll: always device info; energy only when power
    /// measurement is enabled, the model meters power, and the outlet is on.
    pub async fn refresh(&mut self) -> Result<Snapshot, Error> {
        let info = self.get_info().await?;
        let energy = if self.config.power_measurement
            && info.supports_energy_monitoring()
            && info.is_on()
        {
            Some(self.get_energy().await?)
        } else {
            None
        };
        Ok(Snapshot { info, energy })
    }
}

#[async_trait]
impl SmartPlug for Plug {
    async fn connect(&mut self) -> Result<(), Error> {
        self.session.ensure_authenticated().await
    }

    async fn switch_on(&mut self) -> Result<DeviceInfo, Error> {
        self.set_power(true).await
    }

    async fn switch_off(&mut self) -> Result<DeviceInfo, Error> {
        self.set_power(false).await
    }

    async fn get_info(&mut self) -> Result<DeviceInfo, Error> {
        let result = self.session.execute(commands::GET_DEVICE_INFO, None).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_energy(&mut self) -> Result<EnergyUsage, Error> {
        let result = self
            .session
            .execute(commands::GET_ENERGY_USAGE, None)
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}
