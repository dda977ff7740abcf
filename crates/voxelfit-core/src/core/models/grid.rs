use crate::core::models::cloud::PointCloud;
use crate::core::sampling::GridSampler;
use nalgebra::Point3;
use ndarray::{Array2, Array4, ArrayView3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("Grid spatial shape {0}x{1}x{2} is not cubic")]
    NotCubic(usize, usize, usize),

    #[error("Grid resolution must be positive, got {0}")]
    InvalidResolution(f64),

    #[error("Value table with {n_points} rows does not reshape to a {side}^3 grid")]
    ShapeMismatch { n_points: usize, side: usize },
}

/// A multi-channel volumetric density grid.
///
/// Values are indexed `(channel, x, y, z)` and are expected to be nonnegative
/// densities produced by an external model. The spatial shape is cubic with a
/// single uniform resolution in Angstroms per voxel; both are validated at
/// construction. Grids are consumed read-only by the fitting engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    data: Array4<f64>,
    center: Point3<f64>,
    resolution: f64,
}

impl DensityGrid {
    pub fn new(data: Array4<f64>, center: Point3<f64>, resolution: f64) -> Result<Self, GridError> {
        let (_, nx, ny, nz) = data.dim();
        if nx != ny || ny != nz {
            return Err(GridError::NotCubic(nx, ny, nz));
        }
        if !(resolution > 0.0) {
            return Err(GridError::InvalidResolution(resolution));
        }
        Ok(Self {
            data,
            center,
            resolution,
        })
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.data.dim().0
    }

    /// Side length of the cubic spatial shape, in voxels.
    #[inline]
    pub fn side(&self) -> usize {
        self.data.dim().1
    }

    #[inline]
    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    #[inline]
    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    /// Spatial view of one channel.
    pub fn channel(&self, index: usize) -> ArrayView3<'_, f64> {
        self.data.index_axis(ndarray::Axis(0), index)
    }

    pub fn sampler(&self) -> GridSampler {
        GridSampler::new(self.side(), self.center, self.resolution)
    }

    /// Flattens the grid into voxel coordinates and an `(n_points, n_channels)`
    /// value table, both in row-major voxel order.
    pub fn to_point_cloud(&self) -> PointCloud {
        let sampler = self.sampler();
        let n_points = sampler.n_points();
        let n_channels = self.n_channels();
        let mut values = Array2::zeros((n_points, n_channels));
        for ch in 0..n_channels {
            for (flat, &v) in self.channel(ch).iter().enumerate() {
                values[[flat, ch]] = v;
            }
        }
        PointCloud {
            points: sampler.points(),
            values,
        }
    }

    /// Reshapes an `(n_points, n_channels)` value table back into a grid,
    /// inverting [`Self::to_point_cloud`] for matching center and resolution.
    pub fn from_values(
        values: &Array2<f64>,
        side: usize,
        center: Point3<f64>,
        resolution: f64,
    ) -> Result<Self, GridError> {
        let (n_points, n_channels) = values.dim();
        if n_points != side * side * side {
            return Err(GridError::ShapeMismatch { n_points, side });
        }
        let mut data = Array4::zeros((n_channels, side, side, side));
        for ch in 0..n_channels {
            let mut spatial = data.index_axis_mut(ndarray::Axis(0), ch);
            for (flat, v) in spatial.iter_mut().enumerate() {
                *v = values[[flat, ch]];
            }
        }
        Self::new(data, center, resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_cubic_grid_is_rejected() {
        let data = Array4::zeros((1, 4, 4, 5));
        let err = DensityGrid::new(data, Point3::origin(), 0.5).unwrap_err();
        assert_eq!(err, GridError::NotCubic(4, 4, 5));
    }

    #[test]
    fn non_positive_resolution_is_rejected() {
        let data = Array4::zeros((1, 4, 4, 4));
        let err = DensityGrid::new(data, Point3::origin(), 0.0).unwrap_err();
        assert_eq!(err, GridError::InvalidResolution(0.0));
    }

    #[test]
    fn point_cloud_round_trip_is_exact() {
        let mut data = Array4::zeros((2, 3, 3, 3));
        for (i, v) in data.iter_mut().enumerate() {
            *v = i as f64 * 0.25;
        }
        let grid = DensityGrid::new(data, Point3::new(1.0, -1.0, 0.0), 0.5).unwrap();
        let cloud = grid.to_point_cloud();
        let rebuilt =
            DensityGrid::from_values(&cloud.values, grid.side(), grid.center(), grid.resolution())
                .unwrap();
        assert_eq!(grid, rebuilt);
    }

    #[test]
    fn flattened_values_follow_row_major_voxel_order() {
        let mut data = Array4::zeros((1, 2, 2, 2));
        data[[0, 0, 0, 1]] = 1.0;
        data[[0, 1, 0, 0]] = 2.0;
        let grid = DensityGrid::new(data, Point3::origin(), 1.0).unwrap();
        let cloud = grid.to_point_cloud();
        assert_eq!(cloud.values[[1, 0]], 1.0);
        assert_eq!(cloud.values[[4, 0]], 2.0);
    }
}
