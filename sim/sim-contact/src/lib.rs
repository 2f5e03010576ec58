//! Contact generation and resolution for the rigid-body physics core.
//!
//! The narrow phase and the solver live here:
//!
//! - [`CollisionDispatcher`] - Shape-pair table routing each pair to its
//!   narrow-phase routine
//! - [`clipping`] - SAT face/edge selection and reference-face clipping for
//!   convex hulls and capsules
//! - [`CollisionManifold`] - Up to eight contact points per body pair, with
//!   reduction to four and depth-weighted combination into one
//! - [`CollisionCollector`] - Thread-safe accumulation of narrow-phase output
//! - [`ContactSolver`] - Single-pass positional correction plus normal and
//!   friction impulses
//! - [`DebugLineSink`] - Optional line output from the clipping routines
//!
//! Every contact normal points from body A toward body B.
//!
//! # Example
//!
//! ```
//! use sim_contact::CollisionDispatcher;
//! use sim_geometry::Shape;
//! use nalgebra::{Isometry3, Vector3};
//!
//! let dispatcher = CollisionDispatcher::new();
//!
//! let mut ground = Shape::plane(Vector3::y(), 0.0).unwrap();
//! ground.provide_transformation(&Isometry3::identity());
//! let mut crate_box = Shape::cuboid(Vector3::repeat(0.5), 2.0).unwrap();
//! crate_box.provide_transformation(&Isometry3::translation(0.0, 0.49, 0.0));
//!
//! let manifolds = dispatcher.manifolds(&ground, &crate_box);
//! let contact = manifolds[0].primary().unwrap();
//! assert!((contact.depth - 0.01).abs() < 1e-9);
//! assert!((contact.normal.y - 1.0).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-contact/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::module_name_repetitions
)]

pub mod clipping;
mod collector;
mod debug;
mod dispatcher;
mod manifold;
mod solver;

pub use clipping::{collide_capsule_hull, collide_hulls, CONTACT_BIAS};
pub use collector::{Collision, CollisionCollector};
pub use debug::{DebugColor, DebugLineSink, RecordingSink};
pub use dispatcher::{CollisionDispatcher, CollisionHandler};
pub use manifold::{CollisionManifold, ContactPoint, MANIFOLD_CAPACITY, REDUCED_CONTACTS};
pub use solver::{ContactImpulse, ContactSolver, SolverBody};

// Re-export types needed to drive the solver
pub use sim_types::{BodyHandle, SolverConfig};
