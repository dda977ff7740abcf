//! Analytic per-atom density kernel, its gradient, and the interatomic bond
//! potential used by the gradient-descent fitter.
//!
//! The kernel is a truncated Gaussian: within one atomic radius it is a
//! Gaussian with half-width `h = radius / 2`; between one radius and the
//! cutoff it continues as a quadratic matched to the Gaussian at the value
//! `e^-2`; beyond the cutoff it is exactly zero. The quadratic touches zero at
//! `1.5 * radius` and would rise again past that point, so the effective
//! cutoff is `min(radius_multiple, 1.5) * radius`.

use nalgebra::{Point3, Vector3};
use ndarray::Array2;

/// Density contribution of an atom at a query point, in `[0, 1]`.
///
/// Nonincreasing in distance by construction, with compact support beyond
/// `min(radius_multiple, 1.5) * radius`.
#[inline]
pub fn density(point: &Point3<f64>, atom_pos: &Point3<f64>, radius: f64, radius_multiple: f64) -> f64 {
    let dist2 = (point - atom_pos).norm_squared();
    let dist = dist2.sqrt();
    if dist >= radius_multiple.min(1.5) * radius {
        return 0.0;
    }
    let h = 0.5 * radius;
    if dist <= radius {
        (-dist2 / (2.0 * h * h)).exp()
    } else {
        let ie2 = (-2.0f64).exp();
        dist2 * ie2 / (h * h) - 6.0 * dist * ie2 / h + 9.0 * ie2
    }
}

/// Derivative of [`density`] with respect to the atom position.
///
/// Defined to be zero at the exact center and beyond the cutoff so callers
/// never divide by a vanishing distance.
#[inline]
pub fn density_gradient(
    point: &Point3<f64>,
    atom_pos: &Point3<f64>,
    radius: f64,
    radius_multiple: f64,
) -> Vector3<f64> {
    let diff = point - atom_pos;
    let dist2 = diff.norm_squared();
    let dist = dist2.sqrt();
    if dist >= radius_multiple.min(1.5) * radius || dist < 1e-12 {
        return Vector3::zeros();
    }
    let h = 0.5 * radius;
    // d(density)/d(dist) of the piecewise form above.
    let slope = if dist <= radius {
        -dist / (h * h) * (-dist2 / (2.0 * h * h)).exp()
    } else {
        let ie2 = (-2.0f64).exp();
        2.0 * dist * ie2 / (h * h) - 6.0 * ie2 / h
    };
    -diff * (slope / dist)
}

/// Morse-like bond stretch energy with equilibrium at `bond_length`.
#[inline]
pub fn bond_energy(distance: f64, bond_length: f64) -> f64 {
    let e = (bond_length - distance).exp();
    (1.0 - e) * (1.0 - e)
}

/// Derivative of [`bond_energy`] with respect to the interatomic distance.
#[inline]
pub fn bond_energy_gradient(distance: f64, bond_length: f64) -> f64 {
    let e = (bond_length - distance).exp();
    2.0 * (1.0 - e) * e
}

/// Accumulates the summed kernel density of a set of atoms into a per-point,
/// per-channel table.
///
/// `out` has shape `(n_points, n_channels)`; each atom adds its kernel to the
/// column of its channel. The table is not cleared first.
pub fn sum_density_into(
    points: &[Point3<f64>],
    positions: &[Point3<f64>],
    channel_of_atom: &[usize],
    atom_radii: &[f64],
    radius_multiple: f64,
    out: &mut Array2<f64>,
) {
    for (atom, pos) in positions.iter().enumerate() {
        let ch = channel_of_atom[atom];
        let radius = atom_radii[atom];
        for (i, point) in points.iter().enumerate() {
            out[[i, ch]] += density(point, pos, radius, radius_multiple);
        }
    }
}
