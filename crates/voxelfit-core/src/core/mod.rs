//! # Core Module
//!
//! Fundamental building blocks for atom-density fitting: the data models shared
//! across the engine, the analytic per-atom density kernel, the bijection between
//! grid indices and continuous coordinates, and pure numerical utilities.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Channels, density grids, point clouds, and atom sets
//! - **Density Kernel** ([`density`]) - Analytic atom density, its gradient, and bond potentials
//! - **Grid Sampling** ([`sampling`]) - Index ↔ coordinate mapping and grid flattening
//! - **Utilities** ([`utils`]) - The optimal assignment solver used for structure comparison
//!
//! Everything in this layer is stateless and purely functional; all iteration and
//! mutable optimization state lives in the `engine` layer.

pub mod density;
pub mod models;
pub mod sampling;
pub mod utils;
