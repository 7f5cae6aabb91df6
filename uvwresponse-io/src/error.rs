//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Persistence error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid container layout.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A container with the same identity already exists; nothing was written.
    #[error("container already exists: {}", .0.display())]
    ContainerExists(PathBuf),

    /// The container lacks a table required by the configured window.
    #[error("container is missing table {0}")]
    MissingTable(String),

    /// The container was written for other parameters.
    #[error("container identity {found} does not match {expected}")]
    IdentityMismatch { expected: String, found: String },

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] uvwresponse_core::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    /// True if a container exists but cannot serve the requested family.
    ///
    /// Callers recover from these by regenerating the kernels.
    #[must_use]
    pub fn is_kernel_mismatch(&self) -> bool {
        matches!(
            self,
            Error::MissingTable(_)
                | Error::IdentityMismatch { .. }
                | Error::CoreError(uvwresponse_core::Error::KernelShape(_))
        )
    }
}
