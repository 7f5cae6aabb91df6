//! uvwresponse-core: Core traits and types for UVW strip response modelling.
//!
//! This crate provides the strip geometry contract, a regular reference
//! readout, smearing configuration, the dense response kernel tables and
//! the output sinks that receive projected charge.
//!

pub mod config;
pub mod error;
pub mod geometry;
pub mod histogram;
pub mod kernel;
pub mod regular;
pub mod sink;

pub use config::{GenerationSettings, KernelIdentity, ResponseConfig};
pub use error::{Error, Result};
pub use geometry::{
    boundaries_are_contiguous, sections_of, Direction, SectionBoundary, SectionTag, StripGeometry,
    StripId, Vec2,
};
pub use histogram::{Axis, Histogram1D, Histogram2D};
pub use kernel::{ResponseKernels, Table, TableKey, TableRef, TransverseTables, Window};
pub use regular::{RegularGeometry, RegularGeometryConfig};
pub use sink::{
    ChannelKey, ChargeMap, ChargeSink, Deposit, DriftProfile, OutputSink, PhysicalProjections,
    StripTimeProjections,
};
