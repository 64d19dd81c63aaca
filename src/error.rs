//! Error types at the crate's I/O boundaries.
//!
//! Nothing below this module's types is allowed to escape a scheduler
//! tick (see `scheduler`): every caller that can produce one of these
//! folds it into an `InfoView` fault/status update instead of
//! propagating it further.

use thiserror::Error;

/// Failure reading or decoding a MAX31855 SPI frame.
#[derive(Debug, Error)]
pub enum SpiError {
    #[error("spi transfer failed: {0}")]
    Transfer(#[from] rppal::spi::Error),

    #[error("gpio error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// Failure loading or validating `Config`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
