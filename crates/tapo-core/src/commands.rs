//! Tapo command requests.
//!
//! Every Tapo command is a JSON object naming a `method`, with optional
//! `params`. The same inner commands travel through both protocol
//! generations; only the envelope differs.
//!
//! # Example
//!
//! ```
//! use tapo_core::commands::{self, Request};
//!
//! let request = Request::new(commands::GET_DEVICE_INFO);
//! assert_eq!(request.to_json().unwrap(), r#"{"method":"get_device_info"}"#);
//! ```

use serde::Serialize;
use serde_json::{Value, json};

/// Get device information (model, firmware, on/off state, signal).
pub const GET_DEVICE_INFO: &str = "get_device_info";

/// Get energy meter statistics. Only answered by metering models.
pub const GET_ENERGY_USAGE: &str = "get_energy_usage";

/// Change device settings, including the relay (`device_on`).
pub const SET_DEVICE_INFO: &str = "set_device_info";

/// Legacy: exchange the RSA public key for the session key.
pub const HANDSHAKE: &str = "handshake";

/// Legacy: authenticate and obtain the request token.
pub const LOGIN_DEVICE: &str = "login_device";

/// Legacy: outer envelope carrying an encrypted inner command.
pub const SECURE_PASSTHROUGH: &str = "securePassthrough";

/// A single command sent to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Method name.
    pub method: String,
    /// Method parameters; omitted from the JSON when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Client timestamp in milliseconds; only some legacy requests carry it.
    #[serde(rename = "requestTimeMils", skip_serializing_if = "Option::is_none")]
    pub request_time_millis: Option<u64>,
}

impl Request {
    /// Creates a request without params.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
            request_time_millis: None,
        }
    }

    /// Creates a request with `params`.
    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            params: Some(params),
            ..Self::new(method)
        }
    }

    /// Stamps the request with the current time.
    pub fn timestamped(mut self) -> Self {
        self.request_time_millis = Some(now_millis());
        self
    }

    /// Serializes to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `set_device_info` switching the relay.
pub fn set_power(on: bool) -> Request {
    Request::with_params(SET_DEVICE_INFO, json!({ "device_on": on }))
}

/// Legacy `handshake` carrying the client public key (SPKI PEM).
pub fn handshake(public_key_pem: &str) -> Request {
    Request::with_params(HANDSHAKE, json!({ "key": public_key_pem })).timestamped()
}

/// Legacy `login_device` with already-encoded credentials.
pub fn login_device(username: &str, password: &str) -> Request {
    Request::with_params(
        LOGIN_DEVICE,
        json!({ "username": username, "password": password }),
    )
    .timestamped()
}

/// Legacy `securePassthrough` wrapping a base64 ciphertext.
pub fn secure_passthrough(encrypted_request: &str) -> Request {
    Request::with_params(SECURE_PASSTHROUGH, json!({ "request": encrypted_request }))
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
