//! Semi-implicit Euler integration.
//!
//! Velocities are advanced first from accumulated forces and gravity
//! ([`integrate_velocity`]), the contact solver then adjusts them, and the
//! new velocities move the pose ([`integrate_pose`]):
//!
//! ```text
//! v(t+dt) = v(t) + (g * gravity_scale + F / m) * dt
//! w(t+dt) = w(t) + I⁻¹ * tau * dt
//! x(t+dt) = x(t) + v(t+dt) * dt
//! q(t+dt) = normalize(q(t) + 0.5 * dt * [w, 0] ⊗ q(t))
//! ```
//!
//! # Example
//!
//! ```
//! use sim_core::integrators::integrate_pose;
//! use sim_types::Pose;
//! use nalgebra::Vector3;
//!
//! let mut pose = Pose::identity();
//! integrate_pose(&mut pose, &Vector3::new(1.0, 0.0, 0.0), &Vector3::zeros(), 0.5);
//! assert_eq!(pose.position.x, 0.5);
//! ```

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use sim_types::{Pose, Twist};

use crate::body::Motion;

/// Advance velocities by one step of gravity and accumulated force/torque,
/// then apply damping.
pub fn integrate_velocity(motion: &mut Motion, gravity: &Vector3<f64>, dt: f64) {
    let linear_accel = gravity * motion.gravity_scale + motion.force * motion.inverse_mass;
    let angular_accel = motion.inverse_inertia * motion.torque;

    motion.linear_velocity += linear_accel * dt;
    motion.angular_velocity += angular_accel * dt;

    if motion.linear_damping > 0.0 || motion.angular_damping > 0.0 {
        let damped = apply_damping(
            &Twist::new(motion.linear_velocity, motion.angular_velocity),
            motion.linear_damping,
            motion.angular_damping,
            dt,
        );
        motion.linear_velocity = damped.linear;
        motion.angular_velocity = damped.angular;
    }
}

/// Move a pose by the given velocities.
pub fn integrate_pose(pose: &mut Pose, linear: &Vector3<f64>, angular: &Vector3<f64>, dt: f64) {
    pose.position += linear * dt;
    integrate_rotation(&mut pose.rotation, angular, dt);
}

/// First-order quaternion update, renormalized.
fn integrate_rotation(rotation: &mut UnitQuaternion<f64>, omega: &Vector3<f64>, dt: f64) {
    if omega.norm_squared() < 1e-20 {
        return;
    }
    let q = rotation.into_inner();
    let spin = Quaternion::from_imag(*omega) * q * (0.5 * dt);
    *rotation = UnitQuaternion::new_normalize(q + spin);
}

/// Exponential velocity damping.
#[must_use]
pub fn apply_damping(twist: &Twist, linear_damping: f64, angular_damping: f64, dt: f64) -> Twist {
    let linear_factor = (-linear_damping * dt).exp();
    let angular_factor = (-angular_damping * dt).exp();

    Twist::new(twist.linear * linear_factor, twist.angular * angular_factor)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use sim_types::MassProperties;
    use std::f64::consts::FRAC_PI_2;

    fn unit_ball() -> Motion {
        Motion::new(&MassProperties::sphere(2.0, 0.5), &UnitQuaternion::identity()).unwrap()
    }

    #[test]
    fn test_gravity_then_position() {
        let mut motion = unit_ball();
        let mut pose = Pose::from_position(Point3::new(0.0, 10.0, 0.0));
        let gravity = Vector3::new(0.0, -10.0, 0.0);

        integrate_velocity(&mut motion, &gravity, 0.1);
        assert_relative_eq!(motion.linear_velocity.y, -1.0, epsilon = 1e-12);

        integrate_pose(&mut pose, &motion.linear_velocity, &motion.angular_velocity, 0.1);
        assert_relative_eq!(pose.position.y, 9.9, epsilon = 1e-12);
    }

    #[test]
    fn test_force_and_gravity_scale() {
        let mut motion = unit_ball();
        motion.gravity_scale = 0.0;
        motion.force = Vector3::new(4.0, 0.0, 0.0);

        integrate_velocity(&mut motion, &Vector3::new(0.0, -10.0, 0.0), 0.5);
        assert_relative_eq!(motion.linear_velocity, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_stays_normalized() {
        let mut pose = Pose::identity();
        let omega = Vector3::new(0.0, FRAC_PI_2, 0.0);
        for _ in 0..1000 {
            integrate_pose(&mut pose, &Vector3::zeros(), &omega, 0.001);
        }
        assert_relative_eq!(pose.rotation.quaternion().norm(), 1.0, epsilon = 1e-12);
        // A quarter turn about Y, within first-order error.
        assert_relative_eq!(pose.rotation.angle(), FRAC_PI_2, epsilon = 1e-2);
        let x = pose.rotation * Vector3::x();
        assert_relative_eq!(x, -Vector3::z(), epsilon = 1e-2);
    }

    #[test]
    fn test_damping() {
        let twist = Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 2.0, 0.0));
        let damped = apply_damping(&twist, 1.0, 0.0, 0.1);
        assert_relative_eq!(damped.linear.x, (-0.1f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(damped.angular.y, 2.0);
    }
}
