use std::time::Duration;

use thiserror::Error;

use crate::api::PeripheralId;

/// Rejection reported by a native adapter primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("operation not supported by this adapter")]
    Unsupported,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

/// Failures of the BLE layer itself. These are expected in normal operation
/// and most of them are worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("bluetooth adapter is unavailable")]
    AdapterUnavailable,

    #[error("{request} timed out after {after:?}")]
    Timeout { request: String, after: Duration },

    #[error("peripheral disconnected during {request}")]
    Disconnected { request: String },

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Malformed buffer for a known value format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl DecodeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Ensure `buffer` holds at least `expected` bytes.
pub(crate) fn require_len(buffer: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buffer.len() < expected {
        return Err(DecodeError::TooShort {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    WriteWithoutResponse,
    Notify,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::WriteWithoutResponse => "write without response",
            Capability::Notify => "notify",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Ble(#[from] BleError),

    #[error("unknown peripheral {0}")]
    UnknownPeripheral(PeripheralId),

    #[error("unknown service `{0}`")]
    UnknownService(String),

    #[error("unknown characteristic `{characteristic}` in service `{service}`")]
    UnknownCharacteristic {
        service: String,
        characteristic: String,
    },

    #[error("characteristic `{characteristic}` does not support {capability}")]
    Unsupported {
        characteristic: String,
        capability: Capability,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("device rejected {operation} with status {status:#04x}")]
    Rejected { operation: String, status: u8 },
}

impl From<AdapterError> for Error {
    fn from(error: AdapterError) -> Self {
        Error::Ble(BleError::Adapter(error))
    }
}

impl Error {
    /// BLE-class failures are expected and loggable at low severity; anything
    /// else points at a caller or device capability problem.
    pub fn is_ble(&self) -> bool {
        matches!(self, Error::Ble(_))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ble(BleError::AdapterUnavailable) => false,
            Error::Ble(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let timeout = Error::from(BleError::Timeout {
            request: "read".into(),
            after: Duration::from_secs(1),
        });
        assert!(timeout.is_ble());
        assert!(timeout.is_retryable());

        let unavailable = Error::from(BleError::AdapterUnavailable);
        assert!(unavailable.is_ble());
        assert!(!unavailable.is_retryable());

        let native = Error::from(AdapterError::Failed("gatt error 133".into()));
        assert!(native.is_retryable());

        let unknown = Error::UnknownService("nope".into());
        assert!(!unknown.is_ble());
        assert!(!unknown.is_retryable());
    }

    #[test]
    fn too_short_message() {
        let err = require_len(&[1, 2], 4).unwrap_err();
        assert_eq!(
            err.to_string(),
            "buffer too short: expected at least 4 bytes, got 2"
        );
    }
}
