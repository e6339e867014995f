//! Core library for controlling TP-Link Tapo smart plugs on the local network.
//!
//! Tapo plugs accept commands over HTTP on port 80, but only inside an
//! authenticated, encrypted session. This crate implements both protocol
//! generations the firmware has shipped:
//!
//! - **KLAP** (current firmware): a two-step seed handshake proves both sides
//!   know `sha256(sha1(username) + sha1(password))`; every request is then
//!   AES-128-CBC encrypted under an IV bound to a per-request sequence number.
//! - **securePassthrough** (older firmware): the device hands over a static
//!   AES key encrypted to a client RSA key; commands are base64 ciphertext
//!   wrapped in a JSON envelope and authorized by a login token.
//!
//! # Example
//!
//! ```no_run
//! use tapo_core::{Credentials, EncryptionType, Plug, PlugConfig, SmartPlug};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tapo_core::Error> {
//!     let config = PlugConfig::new("192.168.1.50", Credentials::new("user@example.com", "password"))
//!         .with_encryption(EncryptionType::Klap);
//!     let mut plug = Plug::new(config)?;
//!
//!     let info = plug.get_info().await?;
//!     println!("{} ({}) is {}", info.nickname, info.model, info.power_state());
//!     Ok(())
//! }
//! ```
//!
//! # Layers
//!
//! 1. [`crypto`]: hashes, AES-CBC, RSA, KLAP key derivation
//! 2. [`transport`]: raw HTTP/1.1 client with session cookie
//! 3. [`handshake`]: one [`HandshakeStrategy`] per protocol generation
//! 4. [`envelope`]: seals commands and opens replies for the active session
//! 5. [`session`]: (re)handshakes on demand and interprets device errors
//! 6. [`device`]: the [`Plug`] facade

pub mod commands;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod device;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod response;
pub mod session;
pub mod transport;

pub use config::{
    DEFAULT_FAULT_THRESHOLD, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, EncryptionType,
    MIN_POLL_INTERVAL, MIN_TIMEOUT, PlugConfig,
};
pub use credentials::Credentials;
pub use device::{Plug, SmartPlug, Snapshot};
pub use envelope::CipherEnvelope;
pub use error::{Error, ErrorCode};
pub use handshake::{HandshakeStrategy, LegacyRsaHandshake, SeedKlapHandshake};
pub use response::{DeviceInfo, DeviceReply, EnergyUsage, PowerState, Readings};
pub use session::{SessionManager, SessionState};
pub use transport::DEFAULT_PORT;

/// The version of the tapo-core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
