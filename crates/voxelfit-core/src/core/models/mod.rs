//! # Core Models Module
//!
//! Data structures shared by the fitting engine and its callers.
//!
//! ## Key Components
//!
//! - [`channel`] - Atom-type buckets with their density kernel radii
//! - [`grid`] - Multi-channel volumetric density grids with center and resolution
//! - [`cloud`] - Flattened point/value representation of a grid
//! - [`structure`] - Fitted atom sets with positions, channel labels, and bonds
//!
//! A `DensityGrid` is produced externally and consumed read-only; an `AtomSet` is
//! created empty per fit call, grown by the placement loop, and returned to the
//! caller.

pub mod channel;
pub mod cloud;
pub mod grid;
pub mod structure;
