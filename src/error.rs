//! # Error Types
//!
//! Custom error types for geotrack using `thiserror`.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::location::LocationError;
use crate::storage::StorageError;

/// Main error type for geotrack
#[derive(Debug, Error)]
pub enum GeotrackError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Location sampling errors
    #[error("location error: {0}")]
    Location(#[from] LocationError),

    /// Delivery channel errors
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Key-value storage errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for geotrack
pub type Result<T> = std::result::Result<T, GeotrackError>;
