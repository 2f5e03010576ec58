//! Physics bodies: shape, optional motion, constraints, collision records.
//!
//! A body is **static** (no [`Motion`]) or **dynamic** (has one). Dynamic
//! bodies additionally carry a sleeping flag: a sleeping body skips force and
//! pose integration but stays in the broad phase.
//!
//! The mutable part of a body (pose, motion, material, sleep) lives behind a
//! per-body mutex shared with every [`BodyControl`], so game logic may push
//! velocities from any thread while the world is stepping.

use std::sync::Arc;

use hashbrown::HashSet;
use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use parking_lot::{Mutex, MutexGuard};
use sim_geometry::{Aabb, Shape};
use sim_types::{
    world_inverse_inertia, BodyHandle, MassProperties, Pose, Result, SimError, SleepConfig, Twist,
};
use smallvec::SmallVec;
use tracing::debug;

use crate::broad_phase::BroadPhaseProxy;
use crate::control::BodyControl;
use crate::integrators::integrate_pose;
use crate::owner::BodyOwner;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of partners a body tracks collisions against at once.
///
/// Contacts with further partners are still solved; they just produce no
/// start/persist/stop notifications.
pub const MAX_COLLISION_RECORDS: usize = 8;

/// Owner poses closer than this to the last exchanged pose count as
/// unchanged.
const POSE_TOLERANCE: f64 = 1e-9;

/// A constraint owned by a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Constraint {
    /// Suppress motion along (or about) the flagged world axes.
    AxisLock {
        /// Locked translation axes (X, Y, Z).
        linear: [bool; 3],
        /// Locked rotation axes (X, Y, Z).
        angular: [bool; 3],
    },
}

impl Constraint {
    /// Forbid any rotation. Handy for upright characters.
    #[must_use]
    pub const fn lock_rotation() -> Self {
        Self::AxisLock {
            linear: [false; 3],
            angular: [true; 3],
        }
    }

    /// Keep the body in the plane perpendicular to Z, rotating only about Z.
    #[must_use]
    pub const fn planar_xy() -> Self {
        Self::AxisLock {
            linear: [false, false, true],
            angular: [true, true, false],
        }
    }

    /// Zero the locked velocity components.
    pub fn apply(&self, linear: &mut Vector3<f64>, angular: &mut Vector3<f64>) {
        match self {
            Self::AxisLock {
                linear: lin_mask,
                angular: ang_mask,
            } => {
                for axis in 0..3 {
                    if lin_mask[axis] {
                        linear[axis] = 0.0;
                    }
                    if ang_mask[axis] {
                        angular[axis] = 0.0;
                    }
                }
            }
        }
    }
}

/// Dynamic state of a movable body.
#[derive(Debug, Clone, PartialEq)]
pub struct Motion {
    /// Linear velocity (sim units per second).
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity in the world frame.
    pub angular_velocity: Vector3<f64>,
    /// Force accumulated since the last integration.
    pub force: Vector3<f64>,
    /// Torque accumulated since the last integration.
    pub torque: Vector3<f64>,
    /// Inverse mass.
    pub inverse_mass: f64,
    /// Inertia tensor in body axes.
    pub local_inertia: Matrix3<f64>,
    /// Inverse inertia tensor in body axes.
    pub local_inverse_inertia: Matrix3<f64>,
    /// Inverse inertia tensor in world axes, refreshed from the orientation
    /// after every integration.
    pub inverse_inertia: Matrix3<f64>,
    /// Exponential linear damping rate (1/s).
    pub linear_damping: f64,
    /// Exponential angular damping rate (1/s).
    pub angular_damping: f64,
    /// Multiplier on world gravity.
    pub gravity_scale: f64,
}

impl Motion {
    /// Motion at rest for a shape with the given mass properties.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidMassProperties`] unless the mass is
    /// positive and finite and the inertia is positive definite.
    pub fn new(props: &MassProperties, rotation: &UnitQuaternion<f64>) -> Result<Self> {
        props.validate()?;
        let local_inverse_inertia = props
            .inverse_inertia()
            .ok_or_else(|| SimError::invalid_mass("inertia tensor is singular"))?;

        Ok(Self {
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            inverse_mass: props.inverse_mass(),
            local_inertia: props.inertia,
            local_inverse_inertia,
            inverse_inertia: world_inverse_inertia(&local_inverse_inertia, rotation),
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
        })
    }

    /// Rotate the inverse inertia into world axes for `rotation`.
    pub fn update_world_inertia(&mut self, rotation: &UnitQuaternion<f64>) {
        self.inverse_inertia = world_inverse_inertia(&self.local_inverse_inertia, rotation);
    }

    /// Linear plus rotational kinetic energy at orientation `rotation`.
    #[must_use]
    pub fn kinetic_energy(&self, rotation: &UnitQuaternion<f64>) -> f64 {
        let r = rotation.to_rotation_matrix();
        let world_inertia = r.matrix() * self.local_inertia * r.matrix().transpose();
        self.twist().kinetic_energy(1.0 / self.inverse_mass, &world_inertia)
    }

    /// Kinetic energy divided by mass.
    ///
    /// Mass-independent so one sleep threshold fits pebbles and crates.
    #[must_use]
    pub fn kinetic_energy_per_mass(&self, rotation: &UnitQuaternion<f64>) -> f64 {
        self.kinetic_energy(rotation) * self.inverse_mass
    }

    /// Both velocities.
    #[must_use]
    pub fn twist(&self) -> Twist {
        Twist::new(self.linear_velocity, self.angular_velocity)
    }

    /// Reset accumulated force and torque.
    pub fn clear_accumulators(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    /// Zero both velocities.
    pub fn stop(&mut self) {
        self.linear_velocity = Vector3::zeros();
        self.angular_velocity = Vector3::zeros();
    }
}

/// Lock-protected state shared between a body and its controls.
#[derive(Debug)]
pub(crate) struct BodyState {
    /// Pose in simulation units.
    pub pose: Pose,
    pub motion: Option<Motion>,
    pub friction: f64,
    pub restitution: f64,
    pub sleeping: bool,
    /// Seconds spent below the sleep threshold.
    pub sleep_timer: f64,
    pub destroyed: bool,
    /// Pose changed outside integration; the shape needs a new transform.
    pub moved: bool,
    /// Pose set through a control and not yet pushed to the owner.
    pub owner_stale: bool,
}

impl BodyState {
    pub fn new(pose: Pose, friction: f64, restitution: f64) -> Self {
        Self {
            pose,
            motion: None,
            friction,
            restitution,
            sleeping: false,
            sleep_timer: 0.0,
            destroyed: false,
            moved: true,
            owner_stale: false,
        }
    }

    /// Dynamic and awake.
    pub fn is_active(&self) -> bool {
        self.motion.is_some() && !self.sleeping && !self.destroyed
    }

    pub fn wake(&mut self) {
        if self.sleeping {
            debug!("body woken");
        }
        self.sleeping = false;
        self.sleep_timer = 0.0;
    }

    pub fn twist(&self) -> Twist {
        self.motion.as_ref().map_or_else(Twist::zero, Motion::twist)
    }
}

/// An ongoing collision against another body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionRecord {
    /// The partner.
    pub other: BodyHandle,
    /// Last contact point (sim units).
    pub point: Point3<f64>,
    /// Seconds since the contact was last observed.
    pub age: f64,
}

/// A shape placed in the world, owned by the world's body arena.
pub struct PhysicsBody {
    handle: BodyHandle,
    pub(crate) shape: Shape,
    owner: Option<Arc<dyn BodyOwner>>,
    pub(crate) state: Arc<Mutex<BodyState>>,
    constraints: Vec<Constraint>,
    collision_group: u32,
    collision_mask: u32,
    pub(crate) records: SmallVec<[CollisionRecord; MAX_COLLISION_RECORDS]>,
    /// Last pose exchanged with the owner, owner units.
    pub(crate) synced_pose: Option<Pose>,
}

impl std::fmt::Debug for PhysicsBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsBody")
            .field("handle", &self.handle)
            .field("shape", &self.shape.shape_type())
            .field("has_owner", &self.owner.is_some())
            .field("state", &*self.state.lock())
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl PhysicsBody {
    pub(crate) fn new(
        handle: BodyHandle,
        mut shape: Shape,
        owner: Option<Arc<dyn BodyOwner>>,
        pose: Pose,
        friction: f64,
        restitution: f64,
    ) -> Self {
        shape.provide_transformation(&pose.to_isometry());
        let mut state = BodyState::new(pose, friction, restitution);
        state.moved = false;
        Self {
            handle,
            shape,
            owner,
            state: Arc::new(Mutex::new(state)),
            constraints: Vec::new(),
            collision_group: 1,
            collision_mask: u32::MAX,
            records: SmallVec::new(),
            synced_pose: None,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BodyState> {
        self.state.lock()
    }

    /// Arena handle of this body.
    #[must_use]
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// Collision shape, transformed to the pose of the last substep.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The object this body belongs to, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&Arc<dyn BodyOwner>> {
        self.owner.as_ref()
    }

    /// A thread-safe handle for pushing velocities, forces and poses.
    #[must_use]
    pub fn control(&self) -> BodyControl {
        BodyControl::new(self.handle, Arc::clone(&self.state))
    }

    /// Pose in simulation units.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.lock().pose
    }

    /// Center of mass in simulation units.
    #[must_use]
    pub fn center_of_mass(&self) -> Point3<f64> {
        self.lock().pose.position
    }

    /// Orientation.
    #[must_use]
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.lock().pose.rotation
    }

    /// Linear velocity, zero for static bodies.
    #[must_use]
    pub fn linear_velocity(&self) -> Vector3<f64> {
        self.lock().twist().linear
    }

    /// Angular velocity, zero for static bodies.
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.lock().twist().angular
    }

    /// Mass of the shape (infinite for planes).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.shape.mass_properties().mass
    }

    /// Inverse mass, zero for static bodies.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        self.lock().motion.as_ref().map_or(0.0, |m| m.inverse_mass)
    }

    /// World-frame inverse inertia, zero for static bodies.
    #[must_use]
    pub fn inverse_inertia(&self) -> Matrix3<f64> {
        self.lock()
            .motion
            .as_ref()
            .map_or_else(Matrix3::zeros, |m| m.inverse_inertia)
    }

    /// Friction coefficient.
    #[must_use]
    pub fn friction(&self) -> f64 {
        self.lock().friction
    }

    /// Restitution coefficient.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.lock().restitution
    }

    /// Whether the body has a [`Motion`].
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.lock().motion.is_some()
    }

    /// Whether the body is dynamic but asleep.
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.lock().sleeping
    }

    /// Whether the body is marked for the next removal sweep.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    /// World bounding box, sim units.
    #[must_use]
    pub fn aabb(&self) -> &Aabb {
        self.shape.aabb()
    }

    /// Partners currently in collision with this body.
    pub fn touching(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.records.iter().map(|r| r.other)
    }

    /// Tracked collision records.
    #[must_use]
    pub fn collision_records(&self) -> &[CollisionRecord] {
        &self.records
    }

    /// Make the body dynamic, computing motion from the shape's mass
    /// properties. Already-dynamic bodies keep their motion.
    ///
    /// # Errors
    ///
    /// Fails for shapes without a finite positive mass (planes) or with a
    /// singular inertia tensor.
    pub fn set_dynamic(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.motion.is_none() {
            state.motion = Some(Motion::new(self.shape.mass_properties(), &state.pose.rotation)?);
        }
        state.wake();
        Ok(())
    }

    /// Make the body static, discarding its motion.
    pub fn set_static(&mut self) {
        let mut state = self.state.lock();
        state.motion = None;
        state.sleeping = false;
        state.sleep_timer = 0.0;
    }

    /// Set the collision group bits and the mask of groups this body
    /// collides with.
    pub fn set_collision_filter(&mut self, group: u32, mask: u32) {
        self.collision_group = group;
        self.collision_mask = mask;
    }

    /// Collision group bits.
    #[must_use]
    pub fn collision_group(&self) -> u32 {
        self.collision_group
    }

    /// Groups this body collides with.
    #[must_use]
    pub fn collision_mask(&self) -> u32 {
        self.collision_mask
    }

    /// Whether the filters of both bodies admit a collision.
    #[must_use]
    pub fn can_collide_with(&self, other: &Self) -> bool {
        filters_match(
            self.collision_group,
            self.collision_mask,
            other.collision_group,
            other.collision_mask,
        )
    }

    /// Attach a constraint.
    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Remove every constraint.
    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    /// Attached constraints.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Set exponential damping rates. Returns `false` on a static body.
    pub fn set_damping(&mut self, linear: f64, angular: f64) -> bool {
        match self.state.lock().motion.as_mut() {
            Some(motion) => {
                motion.linear_damping = linear.max(0.0);
                motion.angular_damping = angular.max(0.0);
                true
            }
            None => false,
        }
    }

    /// Set the gravity multiplier. Returns `false` on a static body.
    pub fn set_gravity_scale(&mut self, scale: f64) -> bool {
        match self.state.lock().motion.as_mut() {
            Some(motion) => {
                motion.gravity_scale = scale;
                true
            }
            None => false,
        }
    }

    /// Broad-phase snapshot of the current state.
    #[must_use]
    pub fn proxy(&self) -> BroadPhaseProxy {
        let state = self.state.lock();
        self.proxy_for(&state)
    }

    fn proxy_for(&self, state: &BodyState) -> BroadPhaseProxy {
        BroadPhaseProxy {
            aabb: *self.shape.aabb(),
            active: state.is_active(),
            destroyed: state.destroyed,
            group: self.collision_group,
            mask: self.collision_mask,
        }
    }

    /// Pull the owner's pose (teleporting and waking the body if it moved
    /// since the last exchange), refresh the shape transform if needed and
    /// snapshot the body for the broad phase.
    pub(crate) fn prepare_substep(&mut self, sim_scale: f64) -> BroadPhaseProxy {
        // Read before locking: the owner may use a control on this body.
        let owner_pose = self.owner.as_ref().map(|owner| owner.pose());

        let mut state = self.state.lock();
        if let Some(pose) = owner_pose {
            let changed = self
                .synced_pose
                .map_or(true, |synced| pose.differs_from(&synced, POSE_TOLERANCE));
            if changed && pose.is_finite() {
                state.pose = pose.scaled(sim_scale);
                state.moved = true;
                if state.motion.is_some() {
                    state.wake();
                }
                self.synced_pose = Some(pose);
            }
        }
        if state.moved {
            self.shape.provide_transformation(&state.pose.to_isometry());
            state.moved = false;
        }
        self.proxy_for(&state)
    }

    /// Constrain and integrate an active body, update its sleep timer,
    /// refresh the shape and push the pose to the owner.
    ///
    /// Returns whether the body is asleep afterwards.
    pub(crate) fn finish_substep(&mut self, dt: f64, sleep: &SleepConfig, sim_scale: f64) -> bool {
        let mut state = self.state.lock();
        if state.destroyed {
            return false;
        }
        let mut moved = state.moved;

        if state.is_active() {
            let BodyState {
                pose,
                motion,
                sleeping,
                sleep_timer,
                ..
            } = &mut *state;
            if let Some(motion) = motion.as_mut() {
                for constraint in &self.constraints {
                    constraint.apply(&mut motion.linear_velocity, &mut motion.angular_velocity);
                }
                integrate_pose(pose, &motion.linear_velocity, &motion.angular_velocity, dt);
                motion.update_world_inertia(&pose.rotation);

                if sleep.enabled {
                    if motion.kinetic_energy_per_mass(&pose.rotation) < sleep.energy_threshold {
                        *sleep_timer += dt;
                        if *sleep_timer > sleep.time_to_sleep {
                            motion.stop();
                            *sleeping = true;
                            debug!(handle = %self.handle, "body fell asleep");
                        }
                    } else {
                        *sleep_timer = 0.0;
                    }
                }
            }
            moved = true;
        }

        if moved {
            self.shape.provide_transformation(&state.pose.to_isometry());
            state.moved = false;
        }
        let push = moved || state.owner_stale;
        state.owner_stale = false;
        let pose = state.pose;
        let asleep = state.sleeping;
        drop(state);

        if push {
            if let Some(owner) = &self.owner {
                let owner_pose = pose.scaled(1.0 / sim_scale);
                owner.set_pose(owner_pose);
                self.synced_pose = Some(owner_pose);
            }
        }
        asleep
    }

    /// Age every record by `dt` where `ages(other)` says so.
    pub(crate) fn age_records(&mut self, dt: f64, ages: impl Fn(BodyHandle) -> bool) {
        for record in &mut self.records {
            if ages(record.other) {
                record.age += dt;
            }
        }
    }

    /// Note a contact with `other` observed this substep.
    pub(crate) fn track_contact(&mut self, other: BodyHandle, point: Point3<f64>) -> ContactEvent {
        if let Some(record) = self.records.iter_mut().find(|r| r.other == other) {
            record.age = 0.0;
            record.point = point;
            return ContactEvent::Persisted;
        }
        if self.records.len() >= MAX_COLLISION_RECORDS {
            debug!(
                handle = %self.handle,
                %other,
                "collision record set full, contact not tracked"
            );
            return ContactEvent::Untracked;
        }
        self.records.push(CollisionRecord {
            other,
            point,
            age: 0.0,
        });
        ContactEvent::Started
    }

    /// Drop records not seen for longer than `window`, returning the
    /// partners they referred to.
    pub(crate) fn expire_records(
        &mut self,
        window: f64,
    ) -> SmallVec<[BodyHandle; MAX_COLLISION_RECORDS]> {
        let mut expired = SmallVec::new();
        self.records.retain(|record| {
            let keep = record.age <= window;
            if !keep {
                expired.push(record.other);
            }
            keep
        });
        expired
    }

    /// Drop records referring to any of `gone`, returning the partners
    /// removed.
    pub(crate) fn detach(
        &mut self,
        gone: &HashSet<BodyHandle>,
    ) -> SmallVec<[BodyHandle; MAX_COLLISION_RECORDS]> {
        let mut detached = SmallVec::new();
        self.records.retain(|record| {
            let keep = !gone.contains(&record.other);
            if !keep {
                detached.push(record.other);
            }
            keep
        });
        detached
    }
}

/// Outcome of [`PhysicsBody::track_contact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContactEvent {
    Started,
    Persisted,
    /// The record set was full.
    Untracked,
}

/// Symmetric group/mask test.
#[must_use]
pub fn filters_match(group_a: u32, mask_a: u32, group_b: u32, mask_b: u32) -> bool {
    (group_a & mask_b) != 0 && (group_b & mask_a) != 0
}
