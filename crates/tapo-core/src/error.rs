//! Error types for tapo-core.
//!
//! [`Error`] is the single error type returned across the public API. Failures
//! fall into four families that callers usually treat differently:
//!
//! - **transport** ([`Error::ConnectionFailed`], [`Error::Timeout`],
//!   [`Error::Http`], [`Error::IoError`]): the device could not be reached or
//!   answered with a non-200 status. Retry on the next tick.
//! - **authentication** ([`Error::AuthenticationFailed`]): a handshake step was
//!   rejected or could not be verified.
//! - **device** ([`Error::Device`]): the device answered with a nonzero
//!   `error_code`.
//! - **persistent fault** ([`Error::PersistentFault`]): the same device error
//!   keeps coming back across fresh sessions and re-handshaking will not help.

use std::fmt;

use thiserror::Error;

use crate::crypto::CryptoError;

/// Error type for tapo-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection to the device failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The device answered with a non-200 HTTP status.
    #[error("HTTP status {status} from {path}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Request path (without query string).
        path: String,
    },

    /// A handshake step failed or could not be verified.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Protocol error (unexpected response format, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device returned a nonzero `error_code`.
    #[error("device error: {0}")]
    Device(ErrorCode),

    /// The same device error persisted across repeated fresh sessions.
    #[error("persistent device fault: {code} after {attempts} consecutive attempts")]
    PersistentFault {
        /// The repeating device error code.
        code: ErrorCode,
        /// Number of consecutive attempts that ended with this code.
        attempts: u32,
    },

    /// Failed to parse device response.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Cryptographic primitive failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl Error {
    /// Returns `true` for failures of the network exchange itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed(_) | Error::Timeout(_) | Error::Http { .. } | Error::IoError(_)
        )
    }

    /// Returns `true` if a handshake was rejected.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::AuthenticationFailed(_))
    }

    /// Returns `true` if the failure will not clear by re-handshaking.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Error::PersistentFault { .. })
    }

    /// The device error code carried by this error, if any.
    pub fn device_code(&self) -> Option<ErrorCode> {
        match self {
            Error::Device(code) | Error::PersistentFault { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if this failure must drop the current session.
    ///
    /// Configuration errors are raised before any session exists and leave
    /// nothing to invalidate.
    pub fn invalidates_session(&self) -> bool {
        !matches!(self, Error::InvalidConfig(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

/// Device-reported `error_code` values.
///
/// Both protocol generations report failures with the same numeric table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `0`
    Success,
    /// `404`
    NotFound,
    /// `500`
    InternalError,
    /// `1002`
    IncorrectRequest,
    /// `1003`: also returned permanently by some firmware after a power loss.
    MalformedJson,
    /// `1008`
    VariableType,
    /// `1010`
    PublicKeyLength,
    /// `1012`
    TerminalUuid,
    /// `1015`
    InvalidRequestOrLogin,
    /// `9999`: session no longer known to the device.
    Unreachable,
    /// Any code outside the known table.
    Unknown(i32),
}

impl ErrorCode {
    /// Maps a raw `error_code` to its variant.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            404 => Self::NotFound,
            500 => Self::InternalError,
            1002 => Self::IncorrectRequest,
            1003 => Self::MalformedJson,
            1008 => Self::VariableType,
            1010 => Self::PublicKeyLength,
            1012 => Self::TerminalUuid,
            1015 => Self::InvalidRequestOrLogin,
            9999 => Self::Unreachable,
            other => Self::Unknown(other),
        }
    }

    /// The raw numeric code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::NotFound => 404,
            Self::InternalError => 500,
            Self::IncorrectRequest => 1002,
            Self::MalformedJson => 1003,
            Self::VariableType => 1008,
            Self::PublicKeyLength => 1010,
            Self::TerminalUuid => 1012,
            Self::InvalidRequestOrLogin => 1015,
            Self::Unreachable => 9999,
            Self::Unknown(code) => *code,
        }
    }

    /// Human-readable meaning of the code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound | Self::Unreachable => "device unreachable",
            Self::InternalError => "internal error",
            Self::IncorrectRequest => "incorrect request",
            Self::MalformedJson => "JSON formatting error",
            Self::VariableType => "variable type error",
            Self::PublicKeyLength => "public key length error",
            Self::TerminalUuid => "invalid terminal UUID",
            Self::InvalidRequestOrLogin => "invalid request or credentials",
            Self::Unknown(_) => "unknown error",
        }
    }

    /// Returns `true` for code `0`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns `true` for the codes meaning the device could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::NotFound | Self::Unreachable)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_roundtrip_known_table() {
        for code in [0, 404, 500, 1002, 1003, 1008, 1010, 1012, 1015, 9999] {
            let parsed = ErrorCode::from_code(code);
            assert!(!matches!(parsed, ErrorCode::Unknown(_)), "{code} unmapped");
            assert_eq!(parsed.code(), code);
        }
    }

    #[test]
    fn test_error_code_unknown_preserves_value() {
        let code = ErrorCode::from_code(-1501);
        assert_eq!(code, ErrorCode::Unknown(-1501));
        assert_eq!(code.code(), -1501);
        assert!(!code.is_success());
    }

    #[test]
    fn test_error_code_unreachable() {
        assert!(ErrorCode::from_code(404).is_unreachable());
        assert!(ErrorCode::from_code(9999).is_unreachable());
        assert!(!ErrorCode::from_code(500).is_unreachable());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            ErrorCode::MalformedJson.to_string(),
            "JSON formatting error (1003)"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Timeout("read".into()).is_transport());
        assert!(
            Error::Http {
                status: 403,
                path: "/app".into()
            }
            .is_transport()
        );
        assert!(!Error::Device(ErrorCode::InternalError).is_transport());
        assert!(Error::AuthenticationFailed("hash".into()).is_authentication());

        let fault = Error::PersistentFault {
            code: ErrorCode::MalformedJson,
            attempts: 3,
        };
        assert!(fault.is_persistent());
        assert_eq!(fault.device_code(), Some(ErrorCode::MalformedJson));
        assert!(!Error::InvalidConfig("host".into()).invalidates_session());
    }
}
