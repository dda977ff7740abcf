//! FFT-based circular convolution and Wiener deconvolution of density grids.
//!
//! Convolution kernels are sampled from the analytic atom density and rolled
//! so their peak sits at index zero; on the FFT torus this makes the
//! convolution response peak at the position of a matching atom instead of a
//! shifted copy.

use crate::core::density;
use crate::core::models::channel::Channel;
use crate::core::models::grid::{DensityGrid, GridError};
use crate::core::sampling::GridSampler;
use nalgebra::Point3;
use ndarray::{Array3, Array4, Axis, Zip};
use rustfft::num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

/// Samples one channel's density kernel over a cubic grid centered at zero.
///
/// The kernel peak sits at the voxel nearest the grid center; callers that
/// feed it to the convolver must align it with [`roll_peak_to_origin`] first.
pub fn atom_kernel(side: usize, resolution: f64, radius: f64, radius_multiple: f64) -> Array3<f64> {
    let sampler = GridSampler::new(side, Point3::origin(), resolution);
    let center = Point3::origin();
    let mut kernel = Array3::zeros((side, side, side));
    for (flat, value) in kernel.iter_mut().enumerate() {
        *value = density::density(&sampler.point(flat), &center, radius, radius_multiple);
    }
    kernel
}

/// Circularly shifts a kernel so its maximum lands at index `(0, 0, 0)`.
pub fn roll_peak_to_origin(kernel: &Array3<f64>) -> Array3<f64> {
    let (nx, ny, nz) = kernel.dim();
    let mut peak = (0, 0, 0);
    let mut best = f64::NEG_INFINITY;
    for ((i, j, k), &v) in kernel.indexed_iter() {
        if v > best {
            best = v;
            peak = (i, j, k);
        }
    }
    let mut rolled = Array3::zeros(kernel.raw_dim());
    for ((i, j, k), &v) in kernel.indexed_iter() {
        rolled[[
            (i + nx - peak.0) % nx,
            (j + ny - peak.1) % ny,
            (k + nz - peak.2) % nz,
        ]] = v;
    }
    rolled
}

/// Sum of squared kernel values: the L2 contribution a correctly placed atom
/// of this kernel's type adds to a grid.
pub fn kernel_self_energy(kernel: &Array3<f64>) -> f64 {
    kernel.iter().map(|v| v * v).sum()
}

/// FFT-based convolution engine for cubic grids.
///
/// Owns an FFT planner so repeated transforms of the same side length reuse
/// their plans; one instance belongs to exactly one fit invocation.
pub struct SpectralConvolver {
    planner: FftPlanner<f64>,
}

impl Default for SpectralConvolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralConvolver {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Circular convolution: `Re(IFFT(FFT(grid) * FFT(kernel)))`.
    pub fn convolve(&mut self, grid: &Array3<f64>, kernel: &Array3<f64>) -> Array3<f64> {
        let mut f_grid = to_complex(grid);
        let mut f_kernel = to_complex(kernel);
        self.transform(&mut f_grid, FftDirection::Forward);
        self.transform(&mut f_kernel, FftDirection::Forward);
        Zip::from(&mut f_grid).and(&f_kernel).for_each(|g, &k| *g *= k);
        self.transform(&mut f_grid, FftDirection::Inverse);
        f_grid.mapv(|v| v.re)
    }

    /// Wiener deconvolution:
    /// `Re(IFFT(FFT(grid) * conj(FFT(kernel)) / (|FFT(kernel)|^2 + noise_ratio)))`.
    ///
    /// `noise_ratio = 0` degenerates to the exact inverse filter, which is
    /// numerically unstable near spectral zeros of the kernel; callers wanting
    /// robustness must pass a positive ratio.
    pub fn deconvolve(
        &mut self,
        grid: &Array3<f64>,
        kernel: &Array3<f64>,
        noise_ratio: f64,
    ) -> Array3<f64> {
        let mut f_grid = to_complex(grid);
        let mut f_kernel = to_complex(kernel);
        self.transform(&mut f_grid, FftDirection::Forward);
        self.transform(&mut f_kernel, FftDirection::Forward);
        Zip::from(&mut f_grid).and(&f_kernel).for_each(|g, &k| {
            *g *= k.conj() / (k * k.conj() + noise_ratio);
        });
        self.transform(&mut f_grid, FftDirection::Inverse);
        f_grid.mapv(|v| v.re)
    }

    /// Applies Wiener deconvolution to every channel of a grid, approximating
    /// the inverse of the atom-to-density conversion.
    ///
    /// `radius_factor` scales each channel's kernel radius before sampling.
    pub fn deconvolve_grid(
        &mut self,
        grid: &DensityGrid,
        channels: &[Channel],
        radius_multiple: f64,
        noise_ratio: f64,
        radius_factor: f64,
    ) -> Result<DensityGrid, GridError> {
        let side = grid.side();
        let mut data = Array4::zeros((channels.len(), side, side, side));
        for (index, channel) in channels.iter().enumerate() {
            let kernel = roll_peak_to_origin(&atom_kernel(
                side,
                grid.resolution(),
                channel.atomic_radius * radius_factor,
                radius_multiple,
            ));
            let deconvolved = self.deconvolve(&grid.channel(index).to_owned(), &kernel, noise_ratio);
            data.index_axis_mut(Axis(0), index).assign(&deconvolved);
        }
        DensityGrid::new(data, grid.center(), grid.resolution())
    }

    /// In-place 3D FFT, one axis at a time through a contiguous lane buffer.
    fn transform(&mut self, field: &mut Array3<Complex64>, direction: FftDirection) {
        for axis in 0..3 {
            let len = field.shape()[axis];
            let fft = self.planner.plan_fft(len, direction);
            let mut lane_buf = vec![Complex64::new(0.0, 0.0); len];
            for mut lane in field.lanes_mut(Axis(axis)) {
                for (slot, value) in lane_buf.iter_mut().zip(lane.iter()) {
                    *slot = *value;
                }
                fft.process(&mut lane_buf);
                for (value, slot) in lane.iter_mut().zip(lane_buf.iter()) {
                    *value = *slot;
                }
            }
        }
        if direction == FftDirection::Inverse {
            let scale = 1.0 / field.len() as f64;
            field.mapv_inplace(|v| v * scale);
        }
    }
}

fn to_complex(real: &Array3<f64>) -> Array3<Complex64> {
    real.mapv(|v| Complex64::new(v, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_kernel(side: usize) -> Array3<f64> {
        atom_kernel(side, 0.5, 1.2, 1.5)
    }

    #[test]
    fn rolled_kernel_peaks_at_index_zero() {
        for side in [7, 8] {
            let rolled = roll_peak_to_origin(&gaussian_kernel(side));
            let max = rolled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(rolled[[0, 0, 0]], max);
        }
    }

    #[test]
    fn convolving_a_delta_with_a_rolled_kernel_reproduces_the_kernel_in_place() {
        let side = 7;
        let kernel = roll_peak_to_origin(&gaussian_kernel(side));
        let mut delta = Array3::zeros((side, side, side));
        delta[[3, 2, 5]] = 1.0;

        let mut convolver = SpectralConvolver::new();
        let response = convolver.convolve(&delta, &kernel);

        // The response peak sits exactly where the delta was.
        let mut peak = (0, 0, 0);
        let mut best = f64::NEG_INFINITY;
        for (idx, &v) in response.indexed_iter() {
            if v > best {
                best = v;
                peak = idx;
            }
        }
        assert_eq!(peak, (3, 2, 5));
        assert!((best - 1.0).abs() < 1e-9);
    }

    #[test]
    fn deconvolution_with_zero_noise_ratio_inverts_convolution() {
        let side = 8;
        let kernel = roll_peak_to_origin(&gaussian_kernel(side));
        let mut original = Array3::zeros((side, side, side));
        original[[1, 2, 3]] = 0.8;
        original[[5, 5, 1]] = 0.4;
        original[[4, 0, 6]] = 1.3;

        let mut convolver = SpectralConvolver::new();
        let blurred = convolver.convolve(&original, &kernel);
        let restored = convolver.deconvolve(&blurred, &kernel, 0.0);

        let max_err = Zip::from(&original)
            .and(&restored)
            .fold(0.0_f64, |acc, &a, &b| acc.max((a - b).abs()));
        assert!(max_err < 1e-6, "round-trip error {max_err}");
    }

    #[test]
    fn positive_noise_ratio_damps_the_inverse_filter() {
        let side = 8;
        let kernel = roll_peak_to_origin(&gaussian_kernel(side));
        let mut original = Array3::zeros((side, side, side));
        original[[2, 2, 2]] = 1.0;

        let mut convolver = SpectralConvolver::new();
        let blurred = convolver.convolve(&original, &kernel);
        let restored = convolver.deconvolve(&blurred, &kernel, 10.0);

        // Heavy regularization shrinks the restored peak well below the original.
        assert!(restored[[2, 2, 2]] < original[[2, 2, 2]]);
    }

    #[test]
    fn deconvolve_grid_processes_every_channel() {
        let side = 6;
        let mut data = Array4::zeros((2, side, side, side));
        data[[0, 2, 2, 2]] = 1.0;
        data[[1, 3, 3, 3]] = 1.0;
        let grid = DensityGrid::new(data, Point3::origin(), 0.5).unwrap();
        let channels = vec![
            Channel::new("Carbon", 6, "C", 1.0),
            Channel::new("Oxygen", 8, "O", 1.2),
        ];

        let mut convolver = SpectralConvolver::new();
        let out = convolver
            .deconvolve_grid(&grid, &channels, 1.5, 0.5, 1.0)
            .unwrap();
        assert_eq!(out.n_channels(), 2);
        assert_eq!(out.side(), side);
    }
}
