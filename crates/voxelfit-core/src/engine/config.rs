use crate::engine::error::FitError;
use serde::{Deserialize, Serialize};

/// Local position optimizer driven by the placement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Optimizer {
    /// Full-batch momentum gradient descent on the L2 density residual.
    GradientDescent,
    /// Per-channel expectation-maximization mixture refinement.
    MixtureModel,
}

/// How the placement loop chooses new-atom candidates.
///
/// Modeled as an explicit policy variant rather than runtime flags, so the
/// branch is decided once per fit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlacementPolicy {
    /// Every channel whose residual response qualifies contributes a candidate
    /// each round.
    FreeTyping,
    /// The true channel sequence is known a priori; at most the next required
    /// type is accepted per round.
    ChannelSequence(Vec<usize>),
    /// Candidates are restricted to a distance annulus around existing atoms
    /// with spare bond valence. The annulus is derived from the Morse bond
    /// potential at `max_init_bond_energy`, which must lie in `(0, 1)` for the
    /// annulus bounds to stay finite.
    Bonded { max_init_bond_energy: f64 },
}

/// Noise component competing with the atoms in the mixture fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NoiseModel {
    None,
    /// Gaussian likelihood over the observed density values; mean and variance
    /// are re-estimated every EM iteration and reset on degeneracy.
    GaussianDensity { mean: f64, variance: f64 },
    /// Constant per-point probability.
    ConstantProbability { prob: f64 },
}

/// Goodness-of-fit criterion reported by the mixture fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoodnessOfFit {
    NegLogLikelihood,
    Akaike,
    L2,
}

/// Parameters for one fit invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub optimizer: Optimizer,
    pub placement: PlacementPolicy,
    pub noise_model: NoiseModel,
    pub goodness_of_fit: GoodnessOfFit,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// Gradient descent momentum, in `[0, 1)`.
    pub momentum: f64,
    /// Iteration cap for the inner optimizers; bounds worst-case latency.
    pub max_iter: usize,
    /// Kernel cutoff as a multiple of the atomic radius, at least 1.
    pub radius_multiple: f64,
    /// Weight of the interatomic bond energy term; 0 disables it.
    pub bonded_energy_weight: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            optimizer: Optimizer::GradientDescent,
            placement: PlacementPolicy::FreeTyping,
            noise_model: NoiseModel::None,
            goodness_of_fit: GoodnessOfFit::L2,
            learning_rate: 0.01,
            momentum: 0.9,
            max_iter: 1000,
            radius_multiple: 1.5,
            bonded_energy_weight: 0.0,
        }
    }
}

impl FitConfig {
    /// Rejects invalid numeric parameters before any optimization loop runs.
    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.learning_rate > 0.0) {
            return Err(FitError::InvalidParameter {
                name: "learning_rate",
                reason: format!("must be positive, got {}", self.learning_rate),
            });
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(FitError::InvalidParameter {
                name: "momentum",
                reason: format!("must be in [0, 1), got {}", self.momentum),
            });
        }
        if !(self.radius_multiple >= 1.0) {
            return Err(FitError::InvalidParameter {
                name: "radius_multiple",
                reason: format!("must be at least 1, got {}", self.radius_multiple),
            });
        }
        if self.bonded_energy_weight < 0.0 {
            return Err(FitError::InvalidParameter {
                name: "bonded_energy_weight",
                reason: format!("must be nonnegative, got {}", self.bonded_energy_weight),
            });
        }
        if let PlacementPolicy::Bonded {
            max_init_bond_energy,
        } = &self.placement
        {
            if !(*max_init_bond_energy > 0.0 && *max_init_bond_energy < 1.0) {
                return Err(FitError::InvalidParameter {
                    name: "placement.max_init_bond_energy",
                    reason: format!("must be in (0, 1), got {max_init_bond_energy}"),
                });
            }
        }
        match self.noise_model {
            NoiseModel::GaussianDensity { variance, .. } if !(variance > 0.0) => {
                Err(FitError::InvalidParameter {
                    name: "noise_model.variance",
                    reason: format!("must be positive, got {variance}"),
                })
            }
            NoiseModel::ConstantProbability { prob } if !(prob > 0.0) => {
                Err(FitError::InvalidParameter {
                    name: "noise_model.prob",
                    reason: format!("must be positive, got {prob}"),
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(FitConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_numeric_parameters_are_rejected() {
        let mut config = FitConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FitError::InvalidParameter {
                name: "learning_rate",
                ..
            })
        ));

        config.learning_rate = 0.01;
        config.momentum = 1.0;
        assert!(matches!(
            config.validate(),
            Err(FitError::InvalidParameter { name: "momentum", .. })
        ));

        config.momentum = 0.9;
        config.radius_multiple = 0.5;
        assert!(matches!(
            config.validate(),
            Err(FitError::InvalidParameter {
                name: "radius_multiple",
                ..
            })
        ));
    }

    #[test]
    fn bonded_energy_bound_outside_the_unit_interval_is_rejected() {
        for bad in [0.0, 1.0, 2.0, -0.5] {
            let config = FitConfig {
                placement: PlacementPolicy::Bonded {
                    max_init_bond_energy: bad,
                },
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(FitError::InvalidParameter {
                    name: "placement.max_init_bond_energy",
                    ..
                })
            ));
        }
    }

    #[test]
    fn degenerate_noise_parameters_are_rejected() {
        let config = FitConfig {
            noise_model: NoiseModel::GaussianDensity {
                mean: 0.0,
                variance: 0.0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
