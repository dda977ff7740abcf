//! Expectation-maximization fitting of atom positions as a Gaussian mixture.
//!
//! Each atom is an isotropic Gaussian component with fixed covariance
//! `(radius / 2)^2 * I`; only its mean is re-estimated. Observed density
//! values act as point masses weighting the expected log-likelihood. An
//! optional noise component competes with the atoms in the mixture.

use crate::core::density;
use crate::engine::config::{GoodnessOfFit, NoiseModel};
use crate::engine::error::FitError;
use nalgebra::{Point3, Vector3};
use ndarray::Array2;
use std::f64::consts::PI;
use tracing::trace;

const CONVERGENCE_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct GmmParams {
    pub max_iter: usize,
    pub noise_model: NoiseModel,
    pub goodness_of_fit: GoodnessOfFit,
    /// Kernel cutoff used when the goodness-of-fit is the L2 reconstruction
    /// error against the analytic kernels.
    pub radius_multiple: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GmmFit {
    pub positions: Vec<Point3<f64>>,
    pub goodness: f64,
    pub iterations: usize,
}

/// Isotropic 3D Gaussian density at squared distance `dist2`.
#[inline]
fn gaussian_3d(dist2: f64, cov: f64) -> f64 {
    (2.0 * PI * cov).powf(-1.5) * (-dist2 / (2.0 * cov)).exp()
}

/// Univariate Gaussian density.
#[inline]
fn gaussian_1d(x: f64, mean: f64, variance: f64) -> f64 {
    (2.0 * PI * variance).powf(-0.5) * (-(x - mean) * (x - mean) / (2.0 * variance)).exp()
}

/// Fits atom positions to density-weighted points by expectation-maximization.
///
/// Iterates until the gain in expected log-likelihood drops below `1e-3` or
/// `max_iter` is reached, then evaluates the configured goodness-of-fit.
/// A noise component whose re-estimated variance collapses to zero (or turns
/// undefined) is reset to its initial parameters rather than surfaced as an
/// error.
pub fn fit(
    points: &[Point3<f64>],
    density_weights: &[f64],
    initial_positions: &[Point3<f64>],
    atom_radii: &[f64],
    params: &GmmParams,
) -> Result<GmmFit, FitError> {
    let n_points = points.len();
    let n_atoms = initial_positions.len();
    let has_noise = params.noise_model != NoiseModel::None;
    let n_comps = n_atoms + usize::from(has_noise);
    if n_comps == 0 {
        return Err(FitError::EmptyMixture);
    }

    let mut positions = initial_positions.to_vec();
    let cov: Vec<f64> = atom_radii.iter().map(|r| (0.5 * r) * (0.5 * r)).collect();

    let mut n_params = 3 * n_atoms + (n_comps - 1);
    let (mut noise_mean, mut noise_var, noise_prob) = match params.noise_model {
        NoiseModel::None => (0.0, 0.0, 0.0),
        NoiseModel::GaussianDensity { mean, variance } => {
            n_params += 2;
            (mean, variance, 0.0)
        }
        NoiseModel::ConstantProbability { prob } => {
            n_params += 1;
            (0.0, 0.0, prob)
        }
    };

    let mut weights = vec![1.0 / n_comps as f64; n_comps];
    let mut likelihood = Array2::<f64>::zeros((n_points, n_comps));
    let mut resp = Array2::<f64>::zeros((n_points, n_comps));

    let mut log_likelihood = f64::NEG_INFINITY;
    let mut iter = 0;
    loop {
        // Per-point component likelihoods.
        for (j, pos) in positions.iter().enumerate() {
            for (i, point) in points.iter().enumerate() {
                likelihood[[i, j]] = gaussian_3d((point - pos).norm_squared(), cov[j]);
            }
        }
        if has_noise {
            let last = n_comps - 1;
            match params.noise_model {
                NoiseModel::GaussianDensity { .. } => {
                    for i in 0..n_points {
                        likelihood[[i, last]] =
                            gaussian_1d(density_weights[i], noise_mean, noise_var);
                    }
                }
                NoiseModel::ConstantProbability { .. } => {
                    for i in 0..n_points {
                        likelihood[[i, last]] = noise_prob;
                    }
                }
                NoiseModel::None => unreachable!(),
            }
        }

        // E-step: responsibilities by Bayes' rule, and the expected
        // log-likelihood under the density point masses.
        let mut new_ll = 0.0;
        for i in 0..n_points {
            let total: f64 = (0..n_comps).map(|j| weights[j] * likelihood[[i, j]]).sum();
            if total > 0.0 {
                for j in 0..n_comps {
                    resp[[i, j]] = weights[j] * likelihood[[i, j]] / total;
                }
                if density_weights[i] > 0.0 {
                    new_ll += density_weights[i] * total.ln();
                }
            } else {
                for j in 0..n_comps {
                    resp[[i, j]] = 0.0;
                }
            }
        }

        let previous_ll = log_likelihood;
        log_likelihood = new_ll;
        trace!(iter, log_likelihood, "EM iteration");
        if log_likelihood - previous_ll < CONVERGENCE_TOLERANCE || iter == params.max_iter {
            break;
        }

        // M-step: density-weighted centroids for atom means.
        for j in 0..n_atoms {
            let mut weight_sum = 0.0;
            let mut centroid = Vector3::zeros();
            for i in 0..n_points {
                let w = density_weights[i] * resp[[i, j]];
                weight_sum += w;
                centroid += points[i].coords * w;
            }
            if weight_sum > 0.0 {
                positions[j] = Point3::from(centroid / weight_sum);
            }
        }

        // Density-based noise parameters, with reset on degeneracy.
        if let NoiseModel::GaussianDensity { mean, variance } = params.noise_model {
            let last = n_comps - 1;
            let resp_sum: f64 = (0..n_points).map(|i| resp[[i, last]]).sum();
            if resp_sum > 0.0 {
                let new_mean = (0..n_points)
                    .map(|i| resp[[i, last]] * density_weights[i])
                    .sum::<f64>()
                    / resp_sum;
                let new_var = (0..n_points)
                    .map(|i| {
                        let d = density_weights[i] - new_mean;
                        resp[[i, last]] * d * d
                    })
                    .sum::<f64>()
                    / resp_sum;
                if new_var == 0.0 || new_var.is_nan() {
                    noise_mean = mean;
                    noise_var = variance;
                } else {
                    noise_mean = new_mean;
                    noise_var = new_var;
                }
            }
        }

        // Mixture weights: noise share plus an equal split across atoms.
        if has_noise && n_atoms > 0 {
            let last = n_comps - 1;
            let density_sum: f64 = density_weights.iter().sum();
            if density_sum > 0.0 {
                let noise_share = (0..n_points)
                    .map(|i| density_weights[i] * resp[[i, last]])
                    .sum::<f64>()
                    / density_sum;
                weights[last] = noise_share;
                for w in weights.iter_mut().take(n_atoms) {
                    *w = (1.0 - noise_share) / n_atoms as f64;
                }
            }
        }

        iter += 1;
    }

    let goodness = match params.goodness_of_fit {
        GoodnessOfFit::NegLogLikelihood => -log_likelihood,
        GoodnessOfFit::Akaike => 2.0 * n_params as f64 - 2.0 * log_likelihood,
        GoodnessOfFit::L2 => {
            let mut residual = 0.0;
            for (i, point) in points.iter().enumerate() {
                let mut predicted = 0.0;
                for (j, pos) in positions.iter().enumerate() {
                    predicted +=
                        density::density(point, pos, atom_radii[j], params.radius_multiple);
                }
                let d = predicted - density_weights[i];
                residual += d * d;
            }
            residual / 2.0
        }
    };

    Ok(GmmFit {
        positions,
        goodness,
        iterations: iter,
    })
}
