use crate::core::models::grid::GridError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("Mixture model needs at least one component: zero atoms and no noise model")]
    EmptyMixture,

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Channel index {index} is out of range for a catalog of {n_channels} channels")]
    ChannelIndexOutOfRange { index: usize, n_channels: usize },

    #[error("Grid has {grid} channels but the catalog describes {catalog}")]
    ChannelCountMismatch { grid: usize, catalog: usize },

    #[error("Channel {channel} has {left} atoms in the first structure but {right} in the second")]
    ChannelCardinalityMismatch {
        channel: usize,
        left: usize,
        right: usize,
    },

    #[error("Unsupported feature: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Grid(#[from] GridError),
}
