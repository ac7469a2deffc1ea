//! Error types for the camlink media endpoint

use thiserror::Error;

/// Result type alias for camlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the media pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Camera or audio hardware could not deliver (busy, missing, timed out)
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Frame could not be converted to the delivery format
    #[error("transcode error: {0}")]
    Transcode(String),

    /// Peer went away or the connection could not take more data
    #[error("network write failed: {0}")]
    NetworkWrite(String),

    /// Inbound buffer could not be allocated
    #[error("allocation of {0} bytes failed")]
    Allocation(usize),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
