//! The callback surface between a body and whatever owns it.

use nalgebra::Point3;
use sim_types::{BodyHandle, Pose};

/// The external object a body belongs to (an actor, an entity, a test
/// probe).
///
/// Poses and points crossing this boundary are in owner units; the world
/// multiplies by its `sim_scale` on the way in and divides on the way out.
///
/// Every method may be called from a worker thread while the world is
/// stepping. Implementations must not call back into the world itself, but
/// may use [`BodyControl`](crate::BodyControl) handles freely.
pub trait BodyOwner: Send + Sync {
    /// Current pose as the owner sees it.
    ///
    /// Read at the start of every substep; a change since the last
    /// [`set_pose`](Self::set_pose) teleports the body and wakes it.
    fn pose(&self) -> Pose;

    /// Receive the pose after integration.
    fn set_pose(&self, pose: Pose);

    /// First contact with `other`.
    fn on_collide(&self, other: BodyHandle, point: Point3<f64>) {
        let _ = (other, point);
    }

    /// Contact with `other` observed again.
    fn on_collide_persisted(&self, other: BodyHandle, point: Point3<f64>) {
        let _ = (other, point);
    }

    /// Contact with `other` has not been observed for longer than the
    /// collision window, or `other` was removed.
    fn on_collide_stopped(&self, other: BodyHandle) {
        let _ = other;
    }
}
