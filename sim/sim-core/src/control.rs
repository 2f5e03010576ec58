//! Thread-safe handle to one body's dynamic state.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use parking_lot::Mutex;
use sim_types::{BodyHandle, Pose};

use crate::body::BodyState;

/// Cloneable handle for driving a body from outside the world.
///
/// Every call takes the body's own mutex, so controls may be used from any
/// thread, including from inside [`BodyOwner`](crate::BodyOwner) callbacks,
/// while the world steps. All quantities are in simulation units.
///
/// Any mutator wakes a sleeping body. Velocity and force mutators on a static
/// body do nothing.
///
/// # Example
///
/// ```
/// use sim_core::PhysicsWorld;
/// use sim_geometry::Shape;
/// use sim_types::PhysicsConfig;
/// use nalgebra::Vector3;
///
/// let mut world = PhysicsWorld::new(PhysicsConfig::default().max_threads(1)).unwrap();
/// let ball = world.create_dynamic_body(Shape::sphere(0.5, 1.0).unwrap(), None).unwrap();
///
/// let control = world.control(ball).unwrap();
/// std::thread::spawn(move || control.set_linear_velocity(Vector3::x()))
///     .join()
///     .unwrap();
/// assert_eq!(world.body(ball).unwrap().linear_velocity(), Vector3::x());
/// ```
#[derive(Clone)]
pub struct BodyControl {
    handle: BodyHandle,
    state: Arc<Mutex<BodyState>>,
}

impl std::fmt::Debug for BodyControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyControl")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl BodyControl {
    pub(crate) fn new(handle: BodyHandle, state: Arc<Mutex<BodyState>>) -> Self {
        Self { handle, state }
    }

    /// Handle of the controlled body.
    #[must_use]
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// Shift the body by `offset`.
    pub fn translate(&self, offset: Vector3<f64>) {
        let mut state = self.state.lock();
        state.pose.position += offset;
        state.moved = true;
        state.owner_stale = true;
        state.wake();
    }

    /// Teleport the body.
    pub fn set_pose(&self, pose: Pose) {
        let mut state = self.state.lock();
        state.pose = pose;
        state.moved = true;
        state.owner_stale = true;
        state.wake();
    }

    /// Replace the linear velocity.
    pub fn set_linear_velocity(&self, velocity: Vector3<f64>) {
        self.with_motion(|state| {
            if let Some(m) = state.motion.as_mut() {
                m.linear_velocity = velocity;
            }
        });
    }

    /// Add to the linear velocity.
    pub fn add_linear_velocity(&self, delta: Vector3<f64>) {
        self.with_motion(|state| {
            if let Some(m) = state.motion.as_mut() {
                m.linear_velocity += delta;
            }
        });
    }

    /// Replace the angular velocity.
    pub fn set_angular_velocity(&self, velocity: Vector3<f64>) {
        self.with_motion(|state| {
            if let Some(m) = state.motion.as_mut() {
                m.angular_velocity = velocity;
            }
        });
    }

    /// Add to the angular velocity.
    pub fn add_angular_velocity(&self, delta: Vector3<f64>) {
        self.with_motion(|state| {
            if let Some(m) = state.motion.as_mut() {
                m.angular_velocity += delta;
            }
        });
    }

    /// Accumulate a force through the center of mass until the next
    /// integration.
    pub fn apply_force(&self, force: Vector3<f64>) {
        self.with_motion(|state| {
            if let Some(m) = state.motion.as_mut() {
                m.force += force;
            }
        });
    }

    /// Accumulate a torque until the next integration.
    pub fn apply_torque(&self, torque: Vector3<f64>) {
        self.with_motion(|state| {
            if let Some(m) = state.motion.as_mut() {
                m.torque += torque;
            }
        });
    }

    /// Apply an instantaneous impulse at a world point.
    pub fn apply_impulse_at_point(&self, impulse: Vector3<f64>, point: Point3<f64>) {
        self.with_motion(|state| {
            let r = point - state.pose.position;
            if let Some(m) = state.motion.as_mut() {
                m.linear_velocity += impulse * m.inverse_mass;
                m.angular_velocity += m.inverse_inertia * r.cross(&impulse);
            }
        });
    }

    /// Wake the body without changing anything else.
    pub fn force_wake(&self) {
        self.state.lock().wake();
    }

    /// Set the friction coefficient.
    pub fn set_friction(&self, friction: f64) {
        self.state.lock().friction = friction.max(0.0);
    }

    /// Set the restitution coefficient.
    pub fn set_restitution(&self, restitution: f64) {
        self.state.lock().restitution = restitution.max(0.0);
    }

    /// Mark the body for the next [`remove_destroyed`](crate::PhysicsWorld::remove_destroyed)
    /// sweep. It stops colliding immediately.
    pub fn destroy(&self) {
        self.state.lock().destroyed = true;
    }

    /// Current pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.state.lock().pose
    }

    /// Current linear velocity.
    #[must_use]
    pub fn linear_velocity(&self) -> Vector3<f64> {
        self.state.lock().twist().linear
    }

    /// Current angular velocity.
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.state.lock().twist().angular
    }

    /// Whether the body is asleep.
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.state.lock().sleeping
    }

    /// Whether the body is dynamic.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.state.lock().motion.is_some()
    }

    /// Whether the body is marked for removal.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn with_motion(&self, f: impl FnOnce(&mut BodyState)) {
        let mut state = self.state.lock();
        if state.motion.is_none() {
            return;
        }
        f(&mut state);
        state.wake();
    }
}
