//! Typed response structures for Tapo device replies.
//!
//! Every reply, whichever envelope carried it, decodes to a [`DeviceReply`]:
//! an `error_code` (0 on success) and, on success, a method-specific
//! `result` object.
//!
//! # Example
//!
//! ```
//! use tapo_core::response::{DeviceInfo, DeviceReply};
//!
//! let json = r#"{"error_code":0,"result":{"model":"P110","device_on":true,"nickname":"TGFtcA=="}}"#;
//! let reply: DeviceReply = serde_json::from_str(json).unwrap();
//! let info: DeviceInfo = serde_json::from_value(reply.into_result().unwrap()).unwrap();
//! assert_eq!(info.nickname, "Lamp");
//! assert!(info.is_on());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorCode};

/// Host-facing field mapping: reading name to display value.
pub type Readings = BTreeMap<String, String>;

/// Generic reply envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceReply {
    /// Device status, 0 on success.
    pub error_code: i32,
    /// Method result; absent for some setters and on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Optional failure text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl DeviceReply {
    /// Typed view of `error_code`.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from_code(self.error_code)
    }

    /// Returns `true` when `error_code` is 0.
    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }

    /// Returns the result, or [`Error::Device`] for a nonzero code. A
    /// successful reply without `result` yields `Value::Null`.
    pub fn into_result(self) -> Result<Value, Error> {
        if !self.is_success() {
            return Err(Error::Device(self.code()));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Relay state derived from `device_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Outlet energized.
    On,
    /// Outlet off.
    Off,
}

impl PowerState {
    /// Maps a `device_on` flag.
    pub fn from_device_on(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// Models with a power meter answering `get_energy_usage`.
const METERING_MODELS: &[&str] = &["P110", "P115"];

/// `get_device_info` result.
///
/// `ssid` and `nickname` arrive base64-encoded and are decoded on parse.
/// Fields this type does not name are kept in [`extra`](Self::extra).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceInfo {
    /// Unique device ID.
    #[serde(default)]
    pub device_id: String,

    /// Device model (e.g., "P100", "P110").
    #[serde(default)]
    pub model: String,

    /// Device type identifier (e.g., "SMART.TAPOPLUG").
    #[serde(default, rename = "type")]
    pub device_type: String,

    /// Firmware version.
    #[serde(default)]
    pub fw_ver: String,

    /// Hardware version.
    #[serde(default)]
    pub hw_ver: String,

    /// MAC address.
    #[serde(default)]
    pub mac: String,

    /// Whether the outlet is on.
    #[serde(default)]
    pub device_on: bool,

    /// Seconds since the outlet was switched on (0 if off).
    #[serde(default)]
    pub on_time: u64,

    /// WiFi signal strength in dBm.
    #[serde(default)]
    pub rssi: i32,

    /// Signal quality bucket reported by the firmware.
    #[serde(default)]
    pub signal_level: i32,

    /// Whether the device reports overheating.
    #[serde(default)]
    pub overheated: bool,

    /// WiFi network name (decoded).
    #[serde(default, deserialize_with = "deserialize_base64_text")]
    pub ssid: String,

    /// User-assigned name (decoded).
    #[serde(default, deserialize_with = "deserialize_base64_text")]
    pub nickname: String,

    /// Remaining fields, as sent.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Decodes base64 text fields. Values that are not valid base64 UTF-8 are
/// kept as sent.
fn deserialize_base64_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(decode_base64_text(&raw).unwrap_or(raw))
}

fn decode_base64_text(raw: &str) -> Option<String> {
    let bytes = STANDARD.decode(raw).ok()?;
    String::from_utf8(bytes).ok()
}

impl DeviceInfo {
    /// Returns true if the outlet is on.
    pub fn is_on(&self) -> bool {
        self.device_on
    }

    /// Relay state as an enum.
    pub fn power_state(&self) -> PowerState {
        PowerState::from_device_on(self.device_on)
    }

    /// Returns true for models that answer `get_energy_usage`.
    pub fn supports_energy_monitoring(&self) -> bool {
        METERING_MODELS
            .iter()
            .any(|prefix| self.model.starts_with(prefix))
    }

    /// Field mapping for the host.
    pub fn readings(&self) -> Readings {
        let mut readings = Readings::new();
        readings.insert("state".into(), self.power_state().to_string());
        readings.insert("device_id".into(), self.device_id.clone());
        readings.insert("model".into(), self.model.clone());
        readings.insert("type".into(), self.device_type.clone());
        readings.insert("fw_ver".into(), self.fw_ver.clone());
        readings.insert("hw_ver".into(), self.hw_ver.clone());
        readings.insert("mac".into(), self.mac.clone());
        readings.insert("nickname".into(), self.nickname.clone());
        readings.insert("ssid".into(), self.ssid.clone());
        readings.insert("rssi".into(), self.rssi.to_string());
        readings.insert("signal_level".into(), self.signal_level.to_string());
        readings.insert("on_time".into(), self.on_time.to_string());
        readings.insert("overheated".into(), self.overheated.to_string());
        readings
    }
}

/// `get_energy_usage` result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EnergyUsage {
    /// Minutes switched on today.
    #[serde(default)]
    pub today_runtime: u64,

    /// Minutes switched on this month.
    #[serde(default)]
    pub month_runtime: u64,

    /// Energy used today in Wh.
    #[serde(default)]
    pub today_energy: u64,

    /// Energy used this month in Wh.
    #[serde(default)]
    pub month_energy: u64,

    /// Instantaneous power in mW.
    #[serde(default)]
    pub current_power: u64,

    /// Device wall clock at the time of the reading.
    #[serde(default)]
    pub local_time: Option<String>,

    /// Remaining fields, as sent.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EnergyUsage {
    /// Instantaneous power in watts.
    pub fn current_power_w(&self) -> f64 {
        self.current_power as f64 / 1000.0
    }

    /// Field mapping for the host.
    pub fn readings(&self) -> Readings {
        let mut readings = Readings::new();
        readings.insert("today_runtime".into(), self.today_runtime.to_string());
        readings.insert("month_runtime".into(), self.month_runtime.to_string());
        readings.insert("today_energy".into(), self.today_energy.to_string());
        readings.insert("month_energy".into(), self.month_energy.to_string());
        readings.insert(
            "current_power".into(),
            format!("{:.3}", self.current_power_w()),
        );
        if let Some(local_time) = &self.local_time {
            readings.insert("local_time".into(), local_time.clone());
        }
        readings
    }
}
