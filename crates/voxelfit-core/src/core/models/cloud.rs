use nalgebra::Point3;
use ndarray::Array2;

/// Flattened representation of a [`DensityGrid`](crate::core::models::grid::DensityGrid):
/// voxel coordinates and an `(n_points, n_channels)` value table in the same
/// row-major voxel order.
///
/// The fitting engine works on this form; the grid form exists for the
/// external model interface and for spectral convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
    pub values: Array2<f64>,
}

impl PointCloud {
    #[inline]
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.values.ncols()
    }
}
