//! Error types for uvwresponse-core.

use thiserror::Error;

/// Result type alias for uvwresponse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for response modelling.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid smearing window, sigma or generation setting.
    #[error("configuration error: {0}")]
    Config(String),

    /// Direction index outside U/V/W.
    #[error("invalid strip direction index: {0}")]
    InvalidDirection(usize),

    /// Tables do not match the window they are supposed to cover.
    #[error("kernel shape error: {0}")]
    KernelShape(String),

    /// A table required by the configured window is absent.
    #[error("missing response table: {0}")]
    MissingTable(String),

    /// Long-running preparation was cancelled by the caller.
    #[error("kernel generation cancelled")]
    Cancelled,
}
