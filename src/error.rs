//! # Error Types
//!
//! Custom error types for the Phoenix USB reader using `thiserror`.

use thiserror::Error;

/// Main error type for the Phoenix USB reader
#[derive(Debug, Error)]
pub enum PhoenixError {
    /// Opening, configuring or claiming the adapter failed
    #[error("Device open error: {0}")]
    DeviceOpen(String),

    /// Bulk read failed or timed out
    #[error("Transport read error: {0}")]
    TransportRead(String),

    /// Releasing the claimed interface failed
    #[error("Device release error: {0}")]
    DeviceRelease(String),

    /// No adapter with the Phoenix vendor/product id is attached
    #[error("No Phoenix USB adapter found")]
    DeviceNotFound,

    /// A read was requested before the device was opened
    #[error("Input reading has not been started")]
    NotStarted,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Axis map document could not be parsed
    #[error("Axis map error: {0}")]
    AxisMap(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the Phoenix USB reader
pub type Result<T> = std::result::Result<T, PhoenixError>;
