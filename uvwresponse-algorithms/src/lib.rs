//! uvwresponse-algorithms: Response kernel generation and charge projection.
//!
//! This crate provides:
//! - **`KernelGenerator`** - Monte-Carlo XY tables and closed-form (or shaped) time tables
//! - **`NodeLocator`** - reference crossing node and time cell of a deposit
//! - **`SectionSplitter`** - merged-strip fractions split over electronic sections
//! - **`ChargeProjector`** - the per-deposit projection onto all attached sinks
//!

mod generator;
mod locator;
mod projector;
mod splitter;

pub use generator::KernelGenerator;
pub use locator::{NodeLocator, ReferenceCell, ReferenceNode};
pub use projector::ChargeProjector;
pub use splitter::{SectionFraction, SectionSplitter};
