//! # Engine Module
//!
//! The optimization engine for atom-density fitting: iterative numerical
//! algorithms that reconstruct a discrete atom set from a continuous density
//! grid.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Optimizer selection, placement policy, and numeric parameters
//! - **Error Handling** ([`error`]) - Engine-specific error types and propagation
//! - **Spectral Convolution** ([`spectral`]) - FFT-based convolution and Wiener deconvolution
//! - **Mixture Fitting** ([`gmm`]) - Expectation-maximization Gaussian mixture position fitting
//! - **Gradient Descent** ([`gradient`]) - Momentum descent on the L2 density residual
//! - **Placement** ([`placement`]) - The greedy outer loop growing the atom set one candidate at a time
//!
//! Each fit call owns all of its working buffers; nothing in this layer shares
//! mutable state across invocations, so independent fits may run concurrently.

pub mod config;
pub mod error;
pub mod gmm;
pub mod gradient;
pub mod placement;
pub mod spectral;
