//! Pure numerical utilities shared across the crate.

pub mod assignment;
