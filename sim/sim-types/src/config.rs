//! Configuration types for the physics world.
//!
//! Everything the world needs arrives through these structs at construction
//! time: substep length, gravity, the owner-to-simulation length scale,
//! worker count, and the solver/sleep tuning constants.

use crate::dynamics::Gravity;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a physics world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicsConfig {
    /// Fixed substep duration (seconds).
    pub substep: f64,
    /// Gravity configuration.
    pub gravity: Gravity,
    /// Factor converting owner units into simulation units.
    ///
    /// Positions pulled from owners are multiplied by it, positions pushed
    /// back are divided by it.
    pub sim_scale: f64,
    /// Worker thread count. `None` derives it from hardware concurrency,
    /// keeping one core free for the caller.
    pub max_threads: Option<usize>,
    /// Contact solver tuning.
    pub solver: SolverConfig,
    /// Sleep tuning.
    pub sleep: SleepConfig,
    /// How long (seconds) a tracked collision may go unobserved before a
    /// stop notification fires.
    pub collision_window: f64,
    /// Collapse every manifold into a single depth-weighted contact before
    /// solving.
    pub combine_manifold_points: bool,
    /// Friction coefficient given to newly created bodies.
    pub default_friction: f64,
    /// Restitution coefficient given to newly created bodies.
    pub default_restitution: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            substep: 1.0 / 120.0,
            gravity: Gravity::earth(),
            sim_scale: 1.0,
            max_threads: None,
            solver: SolverConfig::default(),
            sleep: SleepConfig::default(),
            collision_window: 0.015,
            combine_manifold_points: true,
            default_friction: 0.5,
            default_restitution: 0.0,
        }
    }
}

impl PhysicsConfig {
    /// Create a configuration with the given substep.
    #[must_use]
    pub fn with_substep(substep: f64) -> Self {
        Self {
            substep,
            ..Default::default()
        }
    }

    /// Configuration for a 60 Hz simulation.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            substep: 1.0 / 60.0,
            ..Default::default()
        }
    }

    /// Configuration for a 240 Hz simulation.
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            substep: 1.0 / 240.0,
            ..Default::default()
        }
    }

    /// Set the gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Gravity::zero();
        self
    }

    /// Set the owner-to-simulation length scale.
    #[must_use]
    pub fn sim_scale(mut self, sim_scale: f64) -> Self {
        self.sim_scale = sim_scale;
        self
    }

    /// Pin the worker thread count.
    #[must_use]
    pub fn max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the sleep configuration.
    #[must_use]
    pub fn sleep(mut self, sleep: SleepConfig) -> Self {
        self.sleep = sleep;
        self
    }

    /// Disable sleeping.
    #[must_use]
    pub fn without_sleeping(mut self) -> Self {
        self.sleep.enabled = false;
        self
    }

    /// Keep every manifold point instead of collapsing to one contact.
    #[must_use]
    pub fn keep_manifold_points(mut self) -> Self {
        self.combine_manifold_points = false;
        self
    }

    /// Worker count actually used: the pinned value, or hardware concurrency
    /// minus one (at least one).
    #[must_use]
    pub fn effective_max_threads(&self) -> usize {
        self.max_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1)
        })
    }

    /// Get the substep frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.substep
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.substep.is_finite() || self.substep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.substep));
        }
        if self.substep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "substep > 1 second is likely an error",
            ));
        }
        if !self.sim_scale.is_finite() || self.sim_scale <= 0.0 {
            return Err(crate::SimError::invalid_config(
                "sim_scale must be positive and finite",
            ));
        }
        if !self.gravity.is_finite() {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }
        if self.max_threads == Some(0) {
            return Err(crate::SimError::invalid_config(
                "max_threads must be at least 1",
            ));
        }
        if !(self.collision_window > 0.0) {
            return Err(crate::SimError::invalid_config(
                "collision_window must be positive",
            ));
        }
        if self.default_friction < 0.0 || self.default_restitution < 0.0 {
            return Err(crate::SimError::invalid_config(
                "material coefficients cannot be negative",
            ));
        }

        self.solver.validate()?;
        self.sleep.validate()?;

        Ok(())
    }
}

/// Tuning constants of the sequential impulse contact solver.
///
/// The defaults are the values gameplay tuning was calibrated against; the
/// solver runs one pass per contact with no iteration loop.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Fraction of the penetration depth removed directly from positions.
    pub position_correction: f64,
    /// Approach speed (m/s) below which restitution is ignored.
    pub restitution_threshold: f64,
    /// Symmetric clamp on any single axis impulse.
    pub max_impulse: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            position_correction: 0.6,
            restitution_threshold: 0.08,
            max_impulse: 3.4,
        }
    }
}

impl SolverConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.position_correction) {
            return Err(crate::SimError::invalid_config(
                "position_correction must be in [0, 1]",
            ));
        }
        if self.restitution_threshold < 0.0 {
            return Err(crate::SimError::invalid_config(
                "restitution_threshold cannot be negative",
            ));
        }
        if !(self.max_impulse > 0.0) {
            return Err(crate::SimError::invalid_config(
                "max_impulse must be positive",
            ));
        }
        Ok(())
    }
}

/// Sleep tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepConfig {
    /// Whether dynamic bodies may fall asleep.
    pub enabled: bool,
    /// Per-unit-mass threshold (J/kg): a body counts as idle while its
    /// linear plus angular kinetic energy divided by its mass stays below
    /// this value. Bodies of any mass moving alike are judged alike.
    pub energy_threshold: f64,
    /// Seconds a body must stay idle before it falls asleep.
    pub time_to_sleep: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            energy_threshold: 0.0025,
            time_to_sleep: 0.8,
        }
    }
}

impl SleepConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.energy_threshold < 0.0 {
            return Err(crate::SimError::invalid_config(
                "sleep energy_threshold cannot be negative",
            ));
        }
        if self.time_to_sleep < 0.0 {
            return Err(crate::SimError::invalid_config(
                "time_to_sleep cannot be negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PhysicsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.solver.max_impulse, 3.4);
        assert_eq!(config.sleep.time_to_sleep, 0.8);
        assert_eq!(config.collision_window, 0.015);
    }

    #[test]
    fn test_presets() {
        assert!((PhysicsConfig::realtime().frequency() - 60.0).abs() < 1e-9);
        assert!((PhysicsConfig::high_fidelity().frequency() - 240.0).abs() < 1e-9);
        assert!(PhysicsConfig::default()
            .zero_gravity()
            .gravity
            .acceleration
            .norm()
            < 1e-12);
    }

    #[test]
    fn test_invalid_substep() {
        let err = PhysicsConfig::with_substep(0.0).validate().unwrap_err();
        assert!(matches!(err, crate::SimError::InvalidTimestep(_)));
        assert!(PhysicsConfig::with_substep(f64::NAN).validate().is_err());
        assert!(PhysicsConfig::with_substep(2.0).validate().is_err());
    }

    #[test]
    fn test_invalid_scale_and_threads() {
        assert!(PhysicsConfig::default().sim_scale(0.0).validate().is_err());
        assert!(PhysicsConfig::default().max_threads(0).validate().is_err());
    }

    #[test]
    fn test_invalid_solver() {
        let solver = SolverConfig {
            position_correction: 1.5,
            ..Default::default()
        };
        assert!(PhysicsConfig::default().solver(solver).validate().is_err());
    }

    #[test]
    fn test_effective_threads() {
        assert_eq!(PhysicsConfig::default().max_threads(3).effective_max_threads(), 3);
        assert!(PhysicsConfig::default().effective_max_threads() >= 1);
    }
}
