//! Error types for risk engine

use thiserror::Error;

/// Risk engine error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Latitude outside [-90, 90]
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180]
    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
