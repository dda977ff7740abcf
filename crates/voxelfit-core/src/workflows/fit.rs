use crate::core::models::channel::Channel;
use crate::core::models::grid::DensityGrid;
use crate::core::models::structure::AtomSet;
use crate::engine::config::FitConfig;
use crate::engine::error::FitError;
use crate::engine::placement;
use std::time::Duration;
use tracing::{info, instrument};

/// Outcome of fitting an atom set to a density grid.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Fitted positions, channel indices, and bond adjacency.
    pub atoms: AtomSet,
    /// Density grid predicted by the fitted atoms, on the input grid's lattice.
    pub predicted: DensityGrid,
    /// Final L2 loss (plus the bond energy term when enabled).
    pub loss: f64,
    /// Wall-clock time spent in the fit.
    pub elapsed: Duration,
}

/// Fits atoms to a multi-channel density grid.
///
/// Stateless and synchronous: every working buffer is owned by this call, so
/// independent invocations are safe to run concurrently. Configuration errors
/// are raised before any optimization loop; inner fitter errors propagate
/// unchanged.
#[instrument(skip_all, name = "fit_workflow", fields(side = grid.side(), n_channels = channels.len()))]
pub fn run(
    grid: &DensityGrid,
    channels: &[Channel],
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    info!("Starting atom fitting");
    let result = placement::fit(grid, channels, config)?;
    let predicted = DensityGrid::from_values(
        &result.predicted,
        grid.side(),
        grid.center(),
        grid.resolution(),
    )?;
    info!(
        n_atoms = result.atoms.len(),
        loss = result.loss,
        "Atom fitting finished"
    );
    Ok(FitResult {
        atoms: result.atoms,
        predicted,
        loss: result.loss,
        elapsed: result.elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::density;
    use crate::core::sampling::GridSampler;
    use nalgebra::Point3;
    use ndarray::Array2;

    #[test]
    fn predicted_grid_shares_the_input_lattice_and_matches_the_loss() {
        let channels = vec![Channel::new("Carbon", 6, "C", 1.0)];
        let truth = vec![Point3::new(0.25, 0.25, -0.25)];
        let sampler = GridSampler::new(12, Point3::origin(), 0.5);
        let points = sampler.points();
        let mut values = Array2::zeros((points.len(), 1));
        density::sum_density_into(&points, &truth, &[0], &[1.0], 1.5, &mut values);
        let grid = DensityGrid::from_values(&values, 12, Point3::origin(), 0.5).unwrap();

        let result = run(&grid, &channels, &FitConfig::default()).unwrap();
        assert_eq!(result.predicted.side(), grid.side());
        assert_eq!(result.predicted.resolution(), grid.resolution());
        assert_eq!(result.atoms.len(), 1);

        let observed = grid.to_point_cloud().values;
        let predicted = result.predicted.to_point_cloud().values;
        let l2: f64 = observed
            .iter()
            .zip(predicted.iter())
            .map(|(o, p)| (o - p) * (o - p))
            .sum();
        assert!((l2 - result.loss).abs() < 1e-9);
    }
}
