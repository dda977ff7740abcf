//! Momentum gradient descent of atom positions on the L2 density residual,
//! with an optional interatomic bond energy term.

use crate::core::density;
use nalgebra::{Point3, Vector3};
use ndarray::Array2;
use tracing::trace;

const RELATIVE_LOSS_TOLERANCE: f64 = 1e-2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescentParams {
    pub max_iter: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Weight of the Morse-like bond energy term; 0 disables it.
    pub bonded_energy_weight: f64,
    pub radius_multiple: f64,
}

/// Outcome of one descent run. The predicted and residual tables are owned by
/// the call and returned to the caller; nothing aliases across invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientDescentFit {
    /// Summed kernel density of the fitted atoms, `(n_points, n_channels)`.
    pub predicted: Array2<f64>,
    /// `density - predicted`.
    pub residual: Array2<f64>,
    pub loss: f64,
    pub iterations: usize,
}

/// Minimizes `sum((density - predicted)^2) + weight * sum(bond energies)` over
/// atom positions by full-batch gradient descent with momentum.
///
/// The step blends the previous raw gradient with the current one:
/// `step = momentum * previous + (1 - momentum) * current`, and positions move
/// by `-learning_rate * step`. Stops when the relative loss improvement falls
/// below `1e-2`, the iteration cap is reached, or the atom set is empty. The
/// first step is damped by the momentum blend, so the relative-improvement
/// stop is suppressed until roughly `1 / (1 - momentum)` iterations have run.
/// Bond equilibria are the sums of the partner radii; each pair's gradient is
/// evaluated once and applied with opposite signs to the two partners.
pub fn fit(
    points: &[Point3<f64>],
    density_values: &Array2<f64>,
    positions: &mut [Point3<f64>],
    channel_of_atom: &[usize],
    bonds: &Array2<u8>,
    atom_radii: &[f64],
    params: &GradientDescentParams,
) -> GradientDescentFit {
    let n_atoms = positions.len();
    let use_bonds = params.bonded_energy_weight != 0.0;

    let mut predicted = Array2::zeros(density_values.raw_dim());
    let mut residual = Array2::zeros(density_values.raw_dim());
    let mut gradient = vec![Vector3::zeros(); n_atoms];
    let mut previous_gradient = vec![Vector3::zeros(); n_atoms];

    // Until the momentum filter has warmed up the steps are damped and the
    // per-iteration improvement says nothing about convergence.
    let warmup = (1.0 / (1.0 - params.momentum)).ceil() as usize;

    let mut loss = f64::INFINITY;
    let mut iter = 0;
    loop {
        let previous_loss = loss;

        predicted.fill(0.0);
        density::sum_density_into(
            points,
            positions,
            channel_of_atom,
            atom_radii,
            params.radius_multiple,
            &mut predicted,
        );
        ndarray::Zip::from(&mut residual)
            .and(density_values)
            .and(&predicted)
            .for_each(|r, &d, &p| *r = d - p);
        loss = residual.iter().map(|r| r * r).sum();

        if use_bonds {
            for j in 0..n_atoms {
                for k in (j + 1)..n_atoms {
                    if bonds[[j, k]] != 0 {
                        let distance = (positions[j] - positions[k]).norm();
                        let bond_length = atom_radii[j] + atom_radii[k];
                        loss += params.bonded_energy_weight
                            * density::bond_energy(distance, bond_length);
                    }
                }
            }
        }

        let delta = loss - previous_loss;
        trace!(iter, loss, delta, "gradient descent iteration");
        if n_atoms == 0
            || iter == params.max_iter
            || (iter >= warmup
                && previous_loss.is_finite()
                && delta.abs() / (previous_loss.abs() + 1e-8) < RELATIVE_LOSS_TOLERANCE)
        {
            break;
        }

        std::mem::swap(&mut gradient, &mut previous_gradient);
        for g in gradient.iter_mut() {
            *g = Vector3::zeros();
        }

        for (j, pos) in positions.iter().enumerate() {
            let ch = channel_of_atom[j];
            for (i, point) in points.iter().enumerate() {
                let kernel_gradient =
                    density::density_gradient(point, pos, atom_radii[j], params.radius_multiple);
                gradient[j] += kernel_gradient * (-2.0 * residual[[i, ch]]);
            }
        }

        if use_bonds {
            for j in 0..n_atoms {
                for k in (j + 1)..n_atoms {
                    if bonds[[j, k]] == 0 {
                        continue;
                    }
                    let separation = positions[j] - positions[k];
                    let distance = separation.norm();
                    if distance < 1e-12 {
                        continue;
                    }
                    let bond_length = atom_radii[j] + atom_radii[k];
                    let force = params.bonded_energy_weight
                        * density::bond_energy_gradient(distance, bond_length);
                    let direction = separation / distance;
                    gradient[j] += direction * force;
                    gradient[k] -= direction * force;
                }
            }
        }

        for j in 0..n_atoms {
            let step = previous_gradient[j] * params.momentum
                + gradient[j] * (1.0 - params.momentum);
            positions[j] -= step * params.learning_rate;
        }
        iter += 1;
    }

    GradientDescentFit {
        predicted,
        residual,
        loss,
        iterations: iter,
    }
}
