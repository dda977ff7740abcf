use nalgebra::{Point3, Vector3};

/// Bijection between row-major grid indices and continuous coordinates.
///
/// Grid voxels are enumerated in lexicographic (row-major) order over
/// `(x, y, z)`; voxel `(i, j, k)` sits at `origin + resolution * (i, j, k)`
/// where the origin is chosen so that the grid is centered on `center`.
/// Flattening and reshaping throughout the crate share this order, so a
/// grid → point-cloud → grid round trip is exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSampler {
    side: usize,
    center: Point3<f64>,
    resolution: f64,
}

impl GridSampler {
    pub fn new(side: usize, center: Point3<f64>, resolution: f64) -> Self {
        Self {
            side,
            center,
            resolution,
        }
    }

    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    #[inline]
    pub fn n_points(&self) -> usize {
        self.side * self.side * self.side
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Coordinate of voxel `(0, 0, 0)`: `center - resolution * (side - 1) / 2`.
    pub fn origin(&self) -> Point3<f64> {
        let half_extent = self.resolution * (self.side as f64 - 1.0) / 2.0;
        self.center - Vector3::repeat(half_extent)
    }

    /// Multi-index of a flat row-major index.
    #[inline]
    pub fn unflatten_index(&self, flat: usize) -> (usize, usize, usize) {
        let k = flat % self.side;
        let j = (flat / self.side) % self.side;
        let i = flat / (self.side * self.side);
        (i, j, k)
    }

    /// Coordinate of the voxel at a flat row-major index.
    pub fn point(&self, flat: usize) -> Point3<f64> {
        let (i, j, k) = self.unflatten_index(flat);
        let origin = self.origin();
        Point3::new(
            origin.x + self.resolution * i as f64,
            origin.y + self.resolution * j as f64,
            origin.z + self.resolution * k as f64,
        )
    }

    /// All voxel coordinates in flat row-major order.
    pub fn points(&self) -> Vec<Point3<f64>> {
        (0..self.n_points()).map(|flat| self.point(flat)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_centered_on_grid_center() {
        let sampler = GridSampler::new(5, Point3::new(1.0, 2.0, 3.0), 0.5);
        let origin = sampler.origin();
        assert_eq!(origin, Point3::new(0.0, 1.0, 2.0));
    }

    #[test]
    fn points_are_enumerated_in_row_major_order() {
        let sampler = GridSampler::new(2, Point3::origin(), 1.0);
        let points = sampler.points();
        assert_eq!(points.len(), 8);
        // Last axis varies fastest.
        assert_eq!(points[0], Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(points[1], Point3::new(-0.5, -0.5, 0.5));
        assert_eq!(points[2], Point3::new(-0.5, 0.5, -0.5));
        assert_eq!(points[7], Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn unflatten_index_inverts_row_major_flattening() {
        let sampler = GridSampler::new(4, Point3::origin(), 1.0);
        for flat in 0..sampler.n_points() {
            let (i, j, k) = sampler.unflatten_index(flat);
            assert_eq!((i * 4 + j) * 4 + k, flat);
        }
    }

    #[test]
    fn central_voxel_of_odd_grid_sits_at_center() {
        let center = Point3::new(-2.0, 4.0, 0.5);
        let sampler = GridSampler::new(7, center, 0.5);
        let mid = sampler.point((3 * 7 + 3) * 7 + 3);
        assert!((mid - center).norm() < 1e-12);
    }
}
