//! Single-pass contact resolution.
//!
//! Each manifold is resolved once per substep, on its primary contact only:
//!
//! 1. **Position correction**: a fixed fraction of the penetration depth is
//!    removed by moving the bodies apart directly (split evenly when both
//!    move).
//! 2. **Normal impulse**: cancels the approach velocity at the contact,
//!    with restitution applied above a speed threshold.
//! 3. **Friction impulses**: along two tangents, bounded by the normal
//!    impulse times the combined friction coefficient.
//!
//! Every impulse is clamped to [`SolverConfig::max_impulse`]. There are no
//! iterations and no warm starting; the same inputs always give the same
//! outputs.

use nalgebra::{Matrix3, Point3, Vector3};
use sim_geometry::normalized_perpendicular;
use sim_types::SolverConfig;

use crate::manifold::CollisionManifold;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The part of a body's state the solver reads and writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBody {
    /// World position of the center of mass.
    pub position: Point3<f64>,
    /// Linear velocity.
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity (world frame).
    pub angular_velocity: Vector3<f64>,
    /// Inverse mass (zero for immovable bodies).
    pub inverse_mass: f64,
    /// World-frame inverse inertia tensor.
    pub inverse_inertia: Matrix3<f64>,
    /// Friction coefficient.
    pub friction: f64,
    /// Restitution coefficient.
    pub restitution: f64,
    /// Whether the solver may change this body.
    pub dynamic: bool,
}

impl SolverBody {
    /// An immovable body at `position`.
    #[must_use]
    pub fn fixed(position: Point3<f64>) -> Self {
        Self {
            position,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            inverse_mass: 0.0,
            inverse_inertia: Matrix3::zeros(),
            friction: 0.5,
            restitution: 0.0,
            dynamic: false,
        }
    }

    /// A movable body at `position` at rest.
    #[must_use]
    pub fn dynamic(position: Point3<f64>, inverse_mass: f64, inverse_inertia: Matrix3<f64>) -> Self {
        Self {
            inverse_mass,
            inverse_inertia,
            dynamic: true,
            ..Self::fixed(position)
        }
    }

    /// Set both velocities.
    #[must_use]
    pub fn with_velocity(mut self, linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// Set friction and restitution.
    #[must_use]
    pub fn with_material(mut self, friction: f64, restitution: f64) -> Self {
        self.friction = friction;
        self.restitution = restitution;
        self
    }

    /// Velocity of the material point at offset `r` from the center.
    #[must_use]
    pub fn velocity_at(&self, r: &Vector3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    fn inverse_mass_along(&self, r: &Vector3<f64>, axis: &Vector3<f64>) -> f64 {
        if !self.dynamic {
            return 0.0;
        }
        let rn = r.cross(axis);
        self.inverse_mass + rn.dot(&(self.inverse_inertia * rn))
    }

    fn apply_impulse(&mut self, r: &Vector3<f64>, impulse: &Vector3<f64>) {
        if !self.dynamic {
            return;
        }
        self.linear_velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.inverse_inertia * r.cross(impulse);
    }
}

/// Impulses applied by one [`ContactSolver::solve`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactImpulse {
    /// Impulse along the contact normal.
    pub normal: f64,
    /// Impulses along the two tangents.
    pub tangent: [f64; 2],
}

impl ContactImpulse {
    /// Whether nothing was applied.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.normal == 0.0 && self.tangent == [0.0; 2]
    }
}

/// The contact solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactSolver {
    config: SolverConfig,
}

impl ContactSolver {
    /// Create a solver.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Solver configuration.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Resolve one manifold between `a` and `b` (normal from A to B).
    pub fn solve(
        &self,
        a: &mut SolverBody,
        b: &mut SolverBody,
        manifold: &CollisionManifold,
    ) -> ContactImpulse {
        let Some(contact) = manifold.primary() else {
            return ContactImpulse::default();
        };
        if !a.dynamic && !b.dynamic {
            return ContactImpulse::default();
        }
        let n = contact.normal;

        let ra = contact.midpoint() - a.position;
        let rb = contact.midpoint() - b.position;

        let correction = n * (contact.depth.max(0.0) * self.config.position_correction);
        match (a.dynamic, b.dynamic) {
            (true, true) => {
                a.position -= correction * 0.5;
                b.position += correction * 0.5;
            }
            (true, false) => a.position -= correction,
            _ => b.position += correction,
        }

        let vn = (b.velocity_at(&rb) - a.velocity_at(&ra)).dot(&n);
        if vn > 0.0 {
            return ContactImpulse::default();
        }

        let restitution = a.restitution.max(b.restitution);
        let bias = if restitution > 0.0 && -vn > self.config.restitution_threshold {
            restitution * vn
        } else {
            0.0
        };

        let limit = self.config.max_impulse;
        let normal = self.solve_axis(a, b, &ra, &rb, &n, bias, -limit, limit);

        let t1 = normalized_perpendicular(&n);
        let t2 = n.cross(&t1);
        let friction = (a.friction * b.friction).max(0.0).sqrt();
        let bound = (friction * normal.abs()).min(limit);
        let tangent = [
            self.solve_axis(a, b, &ra, &rb, &t1, 0.0, -bound, bound),
            self.solve_axis(a, b, &ra, &rb, &t2, 0.0, -bound, bound),
        ];

        ContactImpulse { normal, tangent }
    }

    /// Apply the impulse that zeroes the relative velocity (plus `bias`)
    /// along `axis`, clamped to `[min, max]`. Returns the impulse applied.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_axis(
        &self,
        a: &mut SolverBody,
        b: &mut SolverBody,
        ra: &Vector3<f64>,
        rb: &Vector3<f64>,
        axis: &Vector3<f64>,
        bias: f64,
        min: f64,
        max: f64,
    ) -> f64 {
        let k = a.inverse_mass_along(ra, axis) + b.inverse_mass_along(rb, axis);
        if k <= f64::EPSILON {
            return 0.0;
        }
        let jv = (b.velocity_at(rb) - a.velocity_at(ra)).dot(axis);
        let lambda = (-(jv + bias) / k).clamp(min, max);
        if lambda == 0.0 {
            return 0.0;
        }

        let impulse = axis * lambda;
        a.apply_impulse(ra, &-impulse);
        b.apply_impulse(rb, &impulse);
        lambda
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::manifold::ContactPoint;
    use approx::assert_relative_eq;

    fn floor_contact(depth: f64) -> CollisionManifold {
        // A is the floor, B the body resting on it.
        CollisionManifold::single(ContactPoint::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, -depth, 0.0),
            depth,
            Vector3::y(),
        ))
    }

    fn ball(y: f64) -> SolverBody {
        // Unit-mass sphere of radius 0.5.
        SolverBody::dynamic(Point3::new(0.0, y, 0.0), 1.0, Matrix3::identity() * 10.0)
    }

    #[test]
    fn test_resting_contact_is_idempotent() {
        let solver = ContactSolver::default();
        let mut floor = SolverBody::fixed(Point3::origin());
        let mut body = ball(0.5);

        for _ in 0..10 {
            let impulse = solver.solve(&mut floor, &mut body, &floor_contact(0.0));
            assert!(impulse.is_zero());
        }
        assert_eq!(body.linear_velocity, Vector3::zeros());
        assert_eq!(body.angular_velocity, Vector3::zeros());
        assert_eq!(body.position, Point3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn test_inelastic_impact_stops_approach() {
        let solver = ContactSolver::default();
        let mut floor = SolverBody::fixed(Point3::origin());
        let mut body = ball(0.5).with_velocity(Vector3::new(0.0, -1.0, 0.0), Vector3::zeros());

        let impulse = solver.solve(&mut floor, &mut body, &floor_contact(0.0));
        assert_relative_eq!(impulse.normal, 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.linear_velocity.y, 0.0, epsilon = 1e-12);
        assert_eq!(floor.linear_velocity, Vector3::zeros());
    }

    #[test]
    fn test_restitution_bounces() {
        let solver = ContactSolver::default();
        let mut floor = SolverBody::fixed(Point3::origin()).with_material(0.5, 0.0);
        let mut body = ball(0.5)
            .with_velocity(Vector3::new(0.0, -0.5, 0.0), Vector3::zeros())
            .with_material(0.5, 0.8);

        solver.solve(&mut floor, &mut body, &floor_contact(0.0));
        assert_relative_eq!(body.linear_velocity.y, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_slow_approach_ignores_restitution() {
        let solver = ContactSolver::default();
        let mut floor = SolverBody::fixed(Point3::origin());
        let mut body = ball(0.5)
            .with_velocity(Vector3::new(0.0, -0.05, 0.0), Vector3::zeros())
            .with_material(0.5, 1.0);

        solver.solve(&mut floor, &mut body, &floor_contact(0.0));
        assert_relative_eq!(body.linear_velocity.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_impulse_clamped() {
        let solver = ContactSolver::default();
        let mut floor = SolverBody::fixed(Point3::origin());
        let mut body = ball(0.5).with_velocity(Vector3::new(0.0, -10.0, 0.0), Vector3::zeros());

        let impulse = solver.solve(&mut floor, &mut body, &floor_contact(0.0));
        assert_relative_eq!(impulse.normal, 3.4);
        assert_relative_eq!(body.linear_velocity.y, -6.6, epsilon = 1e-12);
    }

    #[test]
    fn test_position_correction_split() {
        let solver = ContactSolver::default();
        let mut a = ball(0.0);
        let mut b = ball(0.9);
        let manifold = CollisionManifold::single(ContactPoint::new(
            Point3::new(0.0, 0.5, 0.0),
            Point3::new(0.0, 0.4, 0.0),
            0.1,
            Vector3::y(),
        ));

        solver.solve(&mut a, &mut b, &manifold);
        assert_relative_eq!(a.position.y, -0.03, epsilon = 1e-12);
        assert_relative_eq!(b.position.y, 0.93, epsilon = 1e-12);
    }

    #[test]
    fn test_separating_contact_only_corrects_position() {
        let solver = ContactSolver::default();
        let mut floor = SolverBody::fixed(Point3::origin());
        let mut body = ball(0.5).with_velocity(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros());

        let impulse = solver.solve(&mut floor, &mut body, &floor_contact(0.1));
        assert!(impulse.is_zero());
        assert_relative_eq!(body.position.y, 0.56, epsilon = 1e-12);
        assert_relative_eq!(body.linear_velocity.y, 1.0);
    }

    #[test]
    fn test_friction_bounded_by_normal_impulse() {
        let solver = ContactSolver::default();
        let mut floor = SolverBody::fixed(Point3::origin()).with_material(1.0, 0.0);
        let mut body = ball(0.5)
            .with_velocity(Vector3::new(2.0, -0.5, 0.0), Vector3::zeros())
            .with_material(0.25, 0.0);

        let impulse = solver.solve(&mut floor, &mut body, &floor_contact(0.0));
        // mu = sqrt(1.0 * 0.25) = 0.5, normal impulse 0.5.
        let tangential = impulse.tangent[0].hypot(impulse.tangent[1]);
        assert!(tangential <= 0.5 * impulse.normal + 1e-12);
        assert!(body.linear_velocity.x < 2.0);
        assert!(body.linear_velocity.x > 0.0);
    }

    #[test]
    fn test_static_pair_untouched() {
        let solver = ContactSolver::default();
        let mut a = SolverBody::fixed(Point3::origin());
        let mut b = SolverBody::fixed(Point3::new(0.0, 1.0, 0.0));
        assert!(solver.solve(&mut a, &mut b, &floor_contact(0.2)).is_zero());
        assert_eq!(b.position, Point3::new(0.0, 1.0, 0.0));
    }
}
