//! # Workflows Module
//!
//! High-level entry points tying the `core` and `engine` layers together.
//!
//! - **Fitting** ([`fit`]) - Reconstructs an atom set from a multi-channel
//!   density grid and returns it with the predicted grid, loss, and timing.
//! - **Comparison** ([`compare`]) - Permutation-invariant RMSD between two
//!   fitted structures via optimal per-channel assignment.
//!
//! Both workflows are stateless pure functions: callers may fan independent
//! invocations out across worker threads with no synchronization.

pub mod compare;
pub mod fit;
