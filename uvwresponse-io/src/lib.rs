//! uvwresponse-io: Persistence of strip response kernel families.
//!
//! Containers are named after the full parameter tuple of the family, so
//! callers with matching parameters reuse a prior container and mismatched
//! callers regenerate. Binary containers are read through memmap2; HDF5
//! containers are available behind the `hdf5` feature.
//!

mod binary;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod store;

pub use binary::{write_container, BinaryContainer};
pub use error::{Error, Result};
pub use store::{ContainerFormat, KernelStore};
