//! Geometry for the rigid-body physics core.
//!
//! This crate owns everything that is pure geometry:
//!
//! - [`primitives`] - AABBs, planes, segments, closest-point routines, polygon clipping
//! - [`ConvexHull`] - Winged-edge convex polyhedron with SAT face and edge queries
//! - [`Shape`] - The six collision shapes (sphere, box, capsule, convex,
//!   triangle geometry, plane) with mass properties, bounding boxes and ray tests
//! - [`ray`] - Segment ray tests per primitive
//!
//! # Example
//!
//! ```
//! use sim_geometry::{Segment, Shape};
//! use nalgebra::{Isometry3, Point3};
//!
//! let mut ball = Shape::sphere(0.5, 1.0).unwrap();
//! ball.provide_transformation(&Isometry3::translation(0.0, 2.0, 0.0));
//!
//! let down = Segment::new(Point3::new(0.0, 10.0, 0.0), Point3::new(0.0, 0.0, 0.0));
//! let hits = ball.test_ray(&down);
//! assert_eq!(hits.len(), 2);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::module_name_repetitions,   // ConvexHull in hull module is fine
)]

pub mod hull;
pub mod primitives;
pub mod ray;
pub mod shape;

pub use hull::{ConvexHull, EdgeQuery, FaceQuery, HullEdge, HullPolygon, MAX_POLYGON_VERTICES};
pub use primitives::{
    clip_polygon, closest_point_on_segment, closest_point_on_triangle, closest_points_segments,
    normalized_perpendicular, Aabb, Plane, Segment, GEOM_EPSILON,
};
pub use ray::RayHit;
pub use shape::{
    BoxShape, CapsuleShape, ConvexShape, PlaneShape, Shape, ShapeType, SphereShape,
    TriangleGeometry,
};
