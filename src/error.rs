//! # Error Types
//!
//! This module defines the error type shared by every layer of the crate:
//! connection management, receipt encoding and the BLE transport.

use std::time::Duration;

use thiserror::Error;

/// Main error type for blethermal operations
#[derive(Debug, Error)]
pub enum PrinterError {
    /// The host has no usable Bluetooth Low Energy adapter
    #[error("Bluetooth Low Energy is not supported on this host")]
    NotSupported,

    /// The device chooser was cancelled or the device is unreachable
    #[error("Printer not found: {0}")]
    NotFound(String),

    /// A connect attempt is already suspended waiting on the host
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    /// Reattachment picked a device other than the stored one
    #[error("Selected device {actual} does not match stored printer {expected}")]
    DeviceMismatch { expected: String, actual: String },

    /// A write was attempted without a live GATT session
    #[error("Printer is not connected")]
    NotConnected,

    /// No known or discovered service exposes a writable characteristic
    #[error("No writable characteristic found on the printer")]
    CharacteristicNotFound,

    /// Logo decode or conversion failed
    #[error("Encoding failure: {0}")]
    EncodingFailure(String),

    /// The transport rejected a chunk
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// Receipt input rejected at the subsystem boundary
    #[error("Invalid receipt: {0}")]
    InvalidReceipt(String),

    /// Print or session options out of range
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A BLE operation exceeded the configured bound
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Device registry store failure
    #[error("Registry error: {0}")]
    Registry(String),

    /// Host BLE layer error with no more specific kind
    #[error("Bluetooth error: {0}")]
    Ble(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrinterError {
    /// Whether the auto-reconnect loop should keep trying after this error.
    ///
    /// `NotSupported` and `DeviceMismatch` will not fix themselves by
    /// waiting, but the loop still swallows them; this only drives the log
    /// level and the attempt counter.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            PrinterError::NotSupported
                | PrinterError::DeviceMismatch { .. }
                | PrinterError::InvalidOptions(_)
                | PrinterError::Registry(_)
        )
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PrinterError>;
