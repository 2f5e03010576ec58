//! Contact manifolds.
//!
//! A [`CollisionManifold`] is a fixed-capacity buffer of contact points for
//! one body pair in one substep. Narrow-phase routines push up to
//! [`MANIFOLD_CAPACITY`] points; anything beyond that is dropped. The solver
//! reads the primary (first) point, so the narrow-phase routines and the
//! reduction leave the deepest point in front.

use nalgebra::{Point3, Vector3};
use sim_geometry::{normalized_perpendicular, GEOM_EPSILON};
use smallvec::SmallVec;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of points one manifold holds.
pub const MANIFOLD_CAPACITY: usize = 8;

/// Number of points [`CollisionManifold::reduce_contacts`] keeps.
pub const REDUCED_CONTACTS: usize = 4;

/// A single contact between body A and body B.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// Deepest point of A inside B (or the touching point on A).
    pub point_a: Point3<f64>,
    /// Deepest point of B inside A (or the touching point on B).
    pub point_b: Point3<f64>,
    /// Penetration depth (positive when overlapping).
    pub depth: f64,
    /// Unit normal pointing from A toward B: the direction B must move to
    /// separate.
    pub normal: Vector3<f64>,
}

impl ContactPoint {
    /// Create a new contact point.
    #[must_use]
    pub const fn new(
        point_a: Point3<f64>,
        point_b: Point3<f64>,
        depth: f64,
        normal: Vector3<f64>,
    ) -> Self {
        Self {
            point_a,
            point_b,
            depth,
            normal,
        }
    }

    fn zeroed() -> Self {
        Self::new(Point3::origin(), Point3::origin(), 0.0, Vector3::zeros())
    }

    /// Midpoint between the two contact points.
    #[must_use]
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.point_a, &self.point_b)
    }

    /// The same contact seen from the other body.
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            point_a: self.point_b,
            point_b: self.point_a,
            depth: self.depth,
            normal: -self.normal,
        }
    }
}

/// Fixed-capacity contact buffer for one body pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionManifold {
    points: [ContactPoint; MANIFOLD_CAPACITY],
    len: usize,
}

impl Default for CollisionManifold {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionManifold {
    /// Create an empty manifold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            points: [ContactPoint::zeroed(); MANIFOLD_CAPACITY],
            len: 0,
        }
    }

    /// Manifold holding exactly one point.
    #[must_use]
    pub fn single(point: ContactPoint) -> Self {
        let mut manifold = Self::new();
        manifold.push(point);
        manifold
    }

    /// Append a point. Returns `false` (and drops the point) when full.
    pub fn push(&mut self, point: ContactPoint) -> bool {
        if self.len == MANIFOLD_CAPACITY {
            debug!(depth = point.depth, "contact manifold full, dropping point");
            return false;
        }
        self.points[self.len] = point;
        self.len += 1;
        true
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the manifold holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The points.
    #[must_use]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.len]
    }

    /// The point the solver works on.
    #[must_use]
    pub fn primary(&self) -> Option<&ContactPoint> {
        self.points().first()
    }

    /// Largest penetration depth, `None` when empty.
    #[must_use]
    pub fn max_depth(&self) -> Option<f64> {
        self.points().iter().map(|p| p.depth).reduce(f64::max)
    }

    /// Swap the roles of A and B in every point.
    pub fn flip(&mut self) {
        for point in &mut self.points[..self.len] {
            *point = point.flipped();
        }
    }

    /// Move the deepest point to the front, leaving the rest in place.
    pub fn deepest_first(&mut self) {
        let deepest = self.deepest_index();
        self.points.swap(0, deepest);
    }

    fn deepest_index(&self) -> usize {
        let mut best = 0;
        for (i, p) in self.points().iter().enumerate() {
            if p.depth > self.points[best].depth {
                best = i;
            }
        }
        best
    }

    /// Shrink the manifold to at most [`REDUCED_CONTACTS`] points.
    ///
    /// Keeps the deepest point first, then the extreme points along two
    /// tangent axes of its normal, then fills up with the points furthest
    /// from those already kept. Manifolds with four points or fewer are left
    /// untouched. Returns the new length.
    pub fn reduce_contacts(&mut self) -> usize {
        if self.len <= REDUCED_CONTACTS {
            return self.len;
        }

        let deepest = self.deepest_index();
        let normal = self.points[deepest].normal;
        let t1 = normalized_perpendicular(&normal);
        let t2 = normal.cross(&t1);

        let mut kept: SmallVec<[usize; REDUCED_CONTACTS]> = SmallVec::new();
        kept.push(deepest);

        let project = |i: usize, axis: &Vector3<f64>| self.points[i].midpoint().coords.dot(axis);
        for (axis, sign) in [(t1, 1.0), (t1, -1.0), (t2, 1.0), (t2, -1.0)] {
            if kept.len() == REDUCED_CONTACTS {
                break;
            }
            let axis = axis * sign;
            let extreme = (0..self.len)
                .max_by(|&i, &j| project(i, &axis).total_cmp(&project(j, &axis)))
                .unwrap_or(deepest);
            if !kept.contains(&extreme) {
                kept.push(extreme);
            }
        }

        while kept.len() < REDUCED_CONTACTS {
            let spread = |i: usize| {
                kept.iter()
                    .map(|&k| (self.points[i].midpoint() - self.points[k].midpoint()).norm_squared())
                    .fold(f64::INFINITY, f64::min)
            };
            let Some(next) = (0..self.len)
                .filter(|i| !kept.contains(i))
                .max_by(|&i, &j| spread(i).total_cmp(&spread(j)))
            else {
                break;
            };
            kept.push(next);
        }

        let reduced: SmallVec<[ContactPoint; REDUCED_CONTACTS]> =
            kept.iter().map(|&i| self.points[i]).collect();
        self.len = 0;
        for point in reduced {
            self.push(point);
        }
        self.len
    }

    /// Collapse every point into one depth-weighted contact.
    ///
    /// Points and normals are averaged with weights proportional to depth
    /// (uniform when no point penetrates); the depth is the maximum.
    pub fn combine_into_one(&mut self) {
        if self.len <= 1 {
            return;
        }

        let points = self.points();
        let total: f64 = points.iter().map(|p| p.depth.max(0.0)).sum();
        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0 / points.len() as f64;
        let weight = |p: &ContactPoint| {
            if total > GEOM_EPSILON {
                p.depth.max(0.0) / total
            } else {
                uniform
            }
        };

        let mut point_a = Vector3::zeros();
        let mut point_b = Vector3::zeros();
        let mut normal = Vector3::zeros();
        for p in points {
            let w = weight(p);
            point_a += p.point_a.coords * w;
            point_b += p.point_b.coords * w;
            normal += p.normal * w;
        }

        let deepest = self.points[self.deepest_index()];
        let combined = ContactPoint::new(
            Point3::from(point_a),
            Point3::from(point_b),
            deepest.depth,
            normal.try_normalize(GEOM_EPSILON).unwrap_or(deepest.normal),
        );
        self.points[0] = combined;
        self.len = 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn contact(x: f64, z: f64, depth: f64) -> ContactPoint {
        ContactPoint::new(
            Point3::new(x, -depth, z),
            Point3::new(x, 0.0, z),
            depth,
            Vector3::y(),
        )
    }

    #[test]
    fn test_push_until_full() {
        let mut manifold = CollisionManifold::new();
        let mut x = 0.0;
        for _ in 0..MANIFOLD_CAPACITY {
            assert!(manifold.push(contact(x, 0.0, 0.1)));
            x += 1.0;
        }
        assert!(!manifold.push(contact(100.0, 0.0, 0.1)));
        assert_eq!(manifold.len(), MANIFOLD_CAPACITY);
    }

    #[test]
    fn test_flip() {
        let mut manifold = CollisionManifold::single(contact(1.0, 2.0, 0.25));
        manifold.flip();
        let p = manifold.primary().unwrap();
        assert_relative_eq!(p.normal, -Vector3::y());
        assert_relative_eq!(p.point_a, Point3::new(1.0, 0.0, 2.0));
        assert_relative_eq!(p.depth, 0.25);
    }

    #[test]
    fn test_reduce_small_manifold_untouched() {
        let mut manifold = CollisionManifold::new();
        assert_eq!(manifold.reduce_contacts(), 0);

        for i in 0..3 {
            manifold.push(contact(f64::from(i), 0.0, 0.1));
        }
        let before = manifold;
        assert_eq!(manifold.reduce_contacts(), 3);
        assert_eq!(manifold, before);
    }

    #[test]
    fn test_reduce_keeps_deepest_and_corners() {
        // A 3x3 grid of contacts; the center is the deepest.
        let mut manifold = CollisionManifold::new();
        for x in [-1.0, 0.0, 1.0] {
            for z in [-1.0, 0.0, 1.0] {
                let depth = if x == 0.0 && z == 0.0 { 0.5 } else { 0.1 };
                manifold.push(contact(x, z, depth));
            }
        }
        assert_eq!(manifold.len(), MANIFOLD_CAPACITY);

        assert_eq!(manifold.reduce_contacts(), REDUCED_CONTACTS);
        let points = manifold.points();
        assert_relative_eq!(points[0].depth, 0.5);

        // The remaining three points all lie on the boundary of the grid.
        for p in &points[1..] {
            assert!(p.point_b.x.abs() == 1.0 || p.point_b.z.abs() == 1.0);
        }
    }

    #[test]
    fn test_reduce_fills_up_when_extremes_repeat() {
        // Five points on a line: the tangent extremes repeat, so the
        // remaining slots are filled by spread.
        let mut manifold = CollisionManifold::new();
        for i in 0..5 {
            manifold.push(contact(f64::from(i), 0.0, 0.1 + f64::from(i) * 0.01));
        }
        assert_eq!(manifold.reduce_contacts(), REDUCED_CONTACTS);
        assert_relative_eq!(manifold.points()[0].point_b.x, 4.0);
    }

    #[test]
    fn test_deepest_first_swaps_only_the_front() {
        let mut manifold = CollisionManifold::new();
        manifold.push(contact(0.0, 0.0, 0.1));
        manifold.push(contact(1.0, 0.0, 0.2));
        manifold.push(contact(2.0, 0.0, 0.4));
        manifold.deepest_first();

        let xs: Vec<f64> = manifold.points().iter().map(|p| p.point_b.x).collect();
        assert_eq!(xs, vec![2.0, 1.0, 0.0]);
        assert_relative_eq!(manifold.primary().unwrap().depth, 0.4);

        let mut empty = CollisionManifold::new();
        empty.deepest_first();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_combine_into_one_weights_by_depth() {
        let mut manifold = CollisionManifold::new();
        manifold.push(contact(0.0, 0.0, 0.3));
        manifold.push(contact(4.0, 0.0, 0.1));
        manifold.combine_into_one();

        assert_eq!(manifold.len(), 1);
        let p = manifold.primary().unwrap();
        assert_relative_eq!(p.point_b.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.depth, 0.3);
        assert_relative_eq!(p.normal, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_combine_touching_points_is_uniform() {
        let mut manifold = CollisionManifold::new();
        manifold.push(contact(-1.0, 0.0, 0.0));
        manifold.push(contact(1.0, 0.0, 0.0));
        manifold.combine_into_one();
        assert_relative_eq!(manifold.primary().unwrap().point_b.x, 0.0, epsilon = 1e-12);
    }
}
