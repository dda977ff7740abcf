use crate::core::utils::assignment::min_cost_assignment;
use crate::engine::error::FitError;
use nalgebra::Point3;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Permutation-invariant RMSD between two structures of the same channel
/// composition.
///
/// Both atom sets are partitioned by channel label; within each channel the
/// minimum-cost perfect matching on squared distances yields the exact optimal
/// correspondence, so the result is invariant under any same-channel
/// reordering of either input. Channel cardinalities must match between the
/// two sets.
pub fn min_rmsd(
    positions_a: &[Point3<f64>],
    labels_a: &[usize],
    positions_b: &[Point3<f64>],
    labels_b: &[usize],
) -> Result<f64, FitError> {
    if positions_a.len() != labels_a.len() || positions_b.len() != labels_b.len() {
        return Err(FitError::InvalidParameter {
            name: "labels",
            reason: "each structure needs one channel label per atom".to_string(),
        });
    }

    let mut by_channel: BTreeMap<usize, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, &c) in labels_a.iter().enumerate() {
        by_channel.entry(c).or_default().0.push(i);
    }
    for (i, &c) in labels_b.iter().enumerate() {
        by_channel.entry(c).or_default().1.push(i);
    }

    let mut total_squared = 0.0;
    for (&channel, (in_a, in_b)) in &by_channel {
        if in_a.len() != in_b.len() {
            return Err(FitError::ChannelCardinalityMismatch {
                channel,
                left: in_a.len(),
                right: in_b.len(),
            });
        }
        let n = in_a.len();
        let cost = Array2::from_shape_fn((n, n), |(r, c)| {
            (positions_a[in_a[r]] - positions_b[in_b[c]]).norm_squared()
        });
        for (row, col) in min_cost_assignment(&cost).into_iter().enumerate() {
            total_squared += cost[[row, col]];
        }
    }

    if positions_a.is_empty() {
        return Ok(0.0);
    }
    Ok((total_squared / positions_a.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure() -> (Vec<Point3<f64>>, Vec<usize>) {
        (
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.5, 0.0, 0.0),
                Point3::new(0.0, 1.5, 0.0),
                Point3::new(0.0, 0.0, 1.5),
            ],
            vec![0, 0, 1, 2],
        )
    }

    #[test]
    fn identical_structures_have_zero_rmsd() {
        let (positions, labels) = structure();
        let rmsd = min_rmsd(&positions, &labels, &positions, &labels).unwrap();
        assert!(rmsd.abs() < 1e-12);
    }

    #[test]
    fn invariant_under_same_channel_permutation() {
        let (positions, labels) = structure();
        // Swap the two channel-0 atoms.
        let permuted = vec![positions[1], positions[0], positions[2], positions[3]];
        let rmsd = min_rmsd(&positions, &labels, &permuted, &labels).unwrap();
        assert!(rmsd.abs() < 1e-12);
    }

    #[test]
    fn mismatched_channel_cardinalities_are_rejected() {
        let (positions, labels) = structure();
        let other_labels = vec![0, 1, 1, 2];
        let err = min_rmsd(&positions, &labels, &positions, &other_labels).unwrap_err();
        assert_eq!(
            err,
            FitError::ChannelCardinalityMismatch {
                channel: 0,
                left: 2,
                right: 1
            }
        );
    }

    #[test]
    fn known_displacement_yields_the_expected_rmsd() {
        let (positions, labels) = structure();
        let shifted: Vec<_> = positions
            .iter()
            .map(|p| p + nalgebra::Vector3::new(0.3, 0.0, 0.0))
            .collect();
        let rmsd = min_rmsd(&positions, &labels, &shifted, &labels).unwrap();
        assert!((rmsd - 0.3).abs() < 1e-12);
    }

    #[test]
    fn empty_structures_compare_as_identical() {
        assert_eq!(min_rmsd(&[], &[], &[], &[]).unwrap(), 0.0);
    }
}
