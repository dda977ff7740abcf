//! # Voxelfit Core Library
//!
//! A library for reconstructing discrete atomic structures (positions, channel
//! labels, bonds) from continuous volumetric density grids produced by an
//! external density-generating model.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`DensityGrid`,
//!   `AtomSet`), the analytic atom density kernel, grid sampling, and pure
//!   numerical utilities such as the optimal assignment solver.
//!
//! - **[`engine`]: The Logic Core.** This layer implements the iterative
//!   optimization algorithms: FFT-based spectral convolution, the
//!   expectation-maximization mixture fitter, the momentum gradient-descent
//!   fitter, and the greedy atom placement loop that drives them.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing layer. It
//!   ties the `engine` and `core` together into complete procedures: fitting an
//!   atom set to a density grid, and comparing two fitted structures.
//!
//! Every `fit` invocation is synchronous, CPU-bound, and owns all of its working
//! buffers, so independent invocations may run concurrently with no shared state.

pub mod core;
pub mod engine;
pub mod workflows;
