//! Fixed-substep rigid-body world.
//!
//! This crate owns the bodies and runs the simulation loop. It builds on
//! [`sim_geometry`] for shapes and [`sim_contact`] for contact generation and
//! the impulse solver.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PhysicsWorld                            │
//! │  process(delta) → fixed substeps on a worker pool            │
//! │  prepare → forces → broad → narrow → solve → finish          │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ SlotMap<BodyHandle, PhysicsBody>
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PhysicsBody                             │
//! │  Shape, Motion (dynamic only), constraints, collision        │
//! │  records; state behind a per-body mutex                      │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!        BodyControl (any thread)       BodyOwner (callbacks)
//! ```
//!
//! # Units
//!
//! Bodies live in simulation units. Poses and points exchanged with a
//! [`BodyOwner`], and [`PhysicsWorld::cast_ray`] arguments and results, are
//! in owner units; `PhysicsConfig::sim_scale` converts between them.
//! [`BodyControl`] works in simulation units.
//!
//! # Quick Start
//!
//! ```
//! use sim_core::PhysicsWorld;
//! use sim_geometry::Shape;
//! use sim_types::{PhysicsConfig, Pose};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = PhysicsWorld::new(PhysicsConfig::default()).unwrap();
//!
//! // Static ground and a crate dropped onto it
//! world.create_physics_body(Shape::plane(Vector3::y(), 0.0).unwrap(), None);
//! let crate_box = world
//!     .create_dynamic_body(Shape::cuboid(Vector3::repeat(0.5), 2.0).unwrap(), None)
//!     .unwrap();
//! world
//!     .control(crate_box)
//!     .unwrap()
//!     .set_pose(Pose::from_position(Point3::new(0.0, 1.0, 0.0)));
//!
//! world.process(2.0);
//!
//! let y = world.body(crate_box).unwrap().center_of_mass().y;
//! assert!((y - 0.5).abs() < 0.05);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod body;
pub mod broad_phase;
mod control;
pub mod integrators;
mod owner;
mod world;

pub use body::{Constraint, CollisionRecord, Motion, PhysicsBody, MAX_COLLISION_RECORDS};
pub use control::BodyControl;
pub use owner::BodyOwner;
pub use world::{PhysicsWorld, RaycastHit, StepStats};

// Re-export key types from the lower crates for convenience
pub use sim_contact::{DebugColor, DebugLineSink, RecordingSink};
pub use sim_geometry::{Shape, ShapeType};
pub use sim_types::{
    BodyHandle, Gravity, MassProperties, PhysicsConfig, Pose, SimError, SleepConfig, SolverConfig,
    Twist,
};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::manual_range_contains
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn zero_gravity_world() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig::default().zero_gravity().max_threads(2)).unwrap()
    }

    fn ball_at(world: &mut PhysicsWorld, x: f64, vx: f64) -> BodyHandle {
        let handle = world
            .create_dynamic_body(Shape::sphere(0.5, 1.0).unwrap(), None)
            .unwrap();
        let control = world.control(handle).unwrap();
        control.set_pose(Pose::from_position(Point3::new(x, 0.0, 0.0)));
        control.set_linear_velocity(Vector3::new(vx, 0.0, 0.0));
        handle
    }

    #[test]
    fn test_momentum_conservation() {
        let mut world = zero_gravity_world();
        let a = ball_at(&mut world, -1.0, 1.0);
        let b = ball_at(&mut world, 1.0, -1.0);

        for _ in 0..240 {
            world.step();
        }

        let va = world.body(a).unwrap().linear_velocity();
        let vb = world.body(b).unwrap().linear_velocity();
        assert_relative_eq!(va + vb, Vector3::zeros(), epsilon = 1e-9);
        // Inelastic by default: the balls stop dead on each other.
        assert!(va.x.abs() < 1e-6, "va = {va:?}");
        let gap = world.body(b).unwrap().center_of_mass().x
            - world.body(a).unwrap().center_of_mass().x;
        assert!(gap > 0.9 && gap <= 1.0 + 1e-9, "gap = {gap}");
    }

    #[test]
    fn test_restitution_bounces_apart() {
        let mut world = zero_gravity_world();
        let a = ball_at(&mut world, -1.0, 1.0);
        let b = ball_at(&mut world, 1.0, -1.0);
        world.control(a).unwrap().set_restitution(1.0);

        for _ in 0..240 {
            world.step();
        }

        let va = world.body(a).unwrap().linear_velocity();
        let vb = world.body(b).unwrap().linear_velocity();
        assert!(va.x < -0.5, "va = {va:?}");
        assert!(vb.x > 0.5, "vb = {vb:?}");
        assert_relative_eq!(va + vb, Vector3::zeros(), epsilon = 1e-9);
    }
}
