//! Core types for the rigid-body physics core.
//!
//! This crate provides the plain data shared by the geometry, contact and
//! world crates:
//!
//! - [`BodyHandle`] - Generation-checked handle into the world's body arena
//! - [`Pose`], [`Twist`] - Position/orientation and linear/angular velocity
//! - [`MassProperties`] - Mass and local inertia tensor of a shape
//! - [`PhysicsConfig`] - Substep, gravity, scale, solver and sleep settings
//! - [`SimError`] - Construction and configuration errors
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: up
//! - Z: toward the viewer
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::{PhysicsConfig, Pose};
//! use nalgebra::Point3;
//!
//! let config = PhysicsConfig::default().zero_gravity();
//! assert!(config.validate().is_ok());
//!
//! let pose = Pose::from_position(Point3::new(0.0, 1.0, 0.0)).scaled(0.5);
//! assert_eq!(pose.position.y, 0.5);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod dynamics;
mod error;

pub use body::{world_inverse_inertia, BodyHandle, MassProperties, Pose, Twist};
pub use config::{PhysicsConfig, SleepConfig, SolverConfig};
pub use dynamics::Gravity;
pub use error::SimError;

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, SimError>;
