//! The physics world: body arena, fixed-substep pipeline, queries.
//!
//! [`PhysicsWorld::process`] converts elapsed time into fixed substeps. Each
//! substep runs six phases in strict sequence, the parallel ones on the
//! world's own worker pool:
//!
//! 1. **prepare** - pull owner poses, refresh moved shapes, snapshot bodies
//! 2. **forces** - gravity and accumulated force/torque into velocities
//! 3. **broad** - bounding-box pairs ([`crate::broad_phase`])
//! 4. **narrow** - shape-pair dispatch into the collision collector
//! 5. **solve** - one impulse pass per manifold, in conflict-free batches
//! 6. **finish** - collision bookkeeping and callbacks, then constraints,
//!    pose integration, sleep and owner pose push
//!
//! Only active bodies (dynamic and awake) integrate. Sleeping bodies keep
//! their shape in the broad phase and wake when touched by a moving one.

use std::sync::Arc;

use hashbrown::HashSet;
use nalgebra::Point3;
use parking_lot::Mutex;
use rayon::prelude::*;
use sim_contact::{
    Collision, CollisionCollector, CollisionDispatcher, ContactSolver, DebugLineSink, SolverBody,
};
use sim_geometry::{Segment, Shape};
use sim_types::{BodyHandle, PhysicsConfig, Pose, Result, SimError};
use slotmap::SlotMap;
use tracing::{debug, trace_span};

use crate::body::{BodyState, ContactEvent, PhysicsBody};
use crate::broad_phase::{chunk_size, find_pairs, segment_candidates, BroadPhaseProxy};
use crate::control::BodyControl;
use crate::integrators::integrate_velocity;
use crate::owner::BodyOwner;

/// One crossing of a [`PhysicsWorld::cast_ray`] segment with a body.
#[derive(Clone)]
pub struct RaycastHit {
    /// Body hit.
    pub body: BodyHandle,
    /// Owner of the body, if any.
    pub owner: Option<Arc<dyn BodyOwner>>,
    /// Hit point, owner units.
    pub point: Point3<f64>,
    /// Distance from the ray start, owner units.
    pub distance: f64,
}

impl std::fmt::Debug for RaycastHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaycastHit")
            .field("body", &self.body)
            .field("has_owner", &self.owner.is_some())
            .field("point", &self.point)
            .field("distance", &self.distance)
            .finish()
    }
}

/// Counters from the most recent substep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Pairs that reached the narrow phase.
    pub pairs_tested: usize,
    /// Manifolds produced by the narrow phase.
    pub manifolds: usize,
    /// Dynamic bodies asleep after the substep.
    pub bodies_asleep: usize,
}

/// A collision callback waiting to be delivered.
enum Notification {
    Collide(Arc<dyn BodyOwner>, BodyHandle, Point3<f64>),
    Persisted(Arc<dyn BodyOwner>, BodyHandle, Point3<f64>),
    Stopped(Arc<dyn BodyOwner>, BodyHandle),
}

impl Notification {
    fn deliver(self) {
        match self {
            Self::Collide(owner, other, point) => owner.on_collide(other, point),
            Self::Persisted(owner, other, point) => owner.on_collide_persisted(other, point),
            Self::Stopped(owner, other) => owner.on_collide_stopped(other),
        }
    }
}

/// Rigid-body world.
///
/// # Example
///
/// ```
/// use sim_core::PhysicsWorld;
/// use sim_geometry::Shape;
/// use sim_types::{PhysicsConfig, Pose};
/// use nalgebra::Point3;
///
/// let mut world = PhysicsWorld::new(PhysicsConfig::default().max_threads(2)).unwrap();
/// let ball = world.create_dynamic_body(Shape::sphere(0.5, 1.0).unwrap(), None).unwrap();
/// world
///     .control(ball)
///     .unwrap()
///     .set_pose(Pose::from_position(Point3::new(0.0, 10.0, 0.0)));
///
/// let steps = world.process(0.5);
/// assert!((59..=60).contains(&steps));
/// assert!(world.body(ball).unwrap().center_of_mass().y < 10.0);
/// ```
pub struct PhysicsWorld {
    config: PhysicsConfig,
    bodies: SlotMap<BodyHandle, PhysicsBody>,
    dispatcher: CollisionDispatcher,
    solver: ContactSolver,
    collector: CollisionCollector,
    pool: rayon::ThreadPool,
    threads: usize,
    accumulator: f64,
    time: f64,
    step_count: u64,
    last_stats: StepStats,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("config", &self.config)
            .field("bodies", &self.bodies.len())
            .field("threads", &self.threads)
            .field("time", &self.time)
            .field("step_count", &self.step_count)
            .field("last_stats", &self.last_stats)
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// Create an empty world.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the worker pool
    /// cannot be started.
    pub fn new(config: PhysicsConfig) -> Result<Self> {
        Self::with_dispatcher(config, CollisionDispatcher::new())
    }

    /// Create an empty world whose contact generation draws into `sink`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_debug_sink(config: PhysicsConfig, sink: Arc<dyn DebugLineSink>) -> Result<Self> {
        Self::with_dispatcher(config, CollisionDispatcher::with_debug_sink(sink))
    }

    fn with_dispatcher(config: PhysicsConfig, dispatcher: CollisionDispatcher) -> Result<Self> {
        config.validate()?;
        let threads = config.effective_max_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("physics-{i}"))
            .build()
            .map_err(|e| SimError::ThreadPool {
                reason: e.to_string(),
            })?;
        debug!(threads, substep = config.substep, "physics world created");

        Ok(Self {
            solver: ContactSolver::new(config.solver),
            config,
            bodies: SlotMap::with_key(),
            dispatcher,
            collector: CollisionCollector::new(),
            pool,
            threads,
            accumulator: 0.0,
            time: 0.0,
            step_count: 0,
            last_stats: StepStats::default(),
        })
    }

    /// World configuration.
    #[must_use]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    /// Add a static body. Its initial pose is the owner's pose (scaled into
    /// simulation units), or the identity without an owner.
    pub fn create_physics_body(
        &mut self,
        shape: Shape,
        owner: Option<Arc<dyn BodyOwner>>,
    ) -> BodyHandle {
        let synced = owner.as_ref().map(|o| o.pose()).filter(Pose::is_finite);
        let pose = synced.map_or_else(Pose::identity, |p| p.scaled(self.config.sim_scale));
        let shape_type = shape.shape_type();
        let friction = self.config.default_friction;
        let restitution = self.config.default_restitution;

        let handle = self.bodies.insert_with_key(|handle| {
            let mut body = PhysicsBody::new(handle, shape, owner, pose, friction, restitution);
            body.synced_pose = synced;
            body
        });
        debug!(%handle, ?shape_type, "created physics body");
        handle
    }

    /// Add a body and make it dynamic.
    ///
    /// # Errors
    ///
    /// Fails (adding nothing) if the shape cannot move, see
    /// [`PhysicsBody::set_dynamic`].
    pub fn create_dynamic_body(
        &mut self,
        shape: Shape,
        owner: Option<Arc<dyn BodyOwner>>,
    ) -> Result<BodyHandle> {
        shape.mass_properties().validate()?;
        let handle = self.create_physics_body(shape, owner);
        if let Some(body) = self.bodies.get_mut(handle) {
            if let Err(e) = body.set_dynamic() {
                self.bodies.remove(handle);
                return Err(e);
            }
        }
        Ok(handle)
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&PhysicsBody> {
        self.bodies.get(handle)
    }

    /// Look up a body mutably.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut PhysicsBody> {
        self.bodies.get_mut(handle)
    }

    /// Thread-safe control handle for a body.
    #[must_use]
    pub fn control(&self, handle: BodyHandle) -> Option<BodyControl> {
        self.bodies.get(handle).map(PhysicsBody::control)
    }

    /// All bodies, in arena order.
    pub fn bodies(&self) -> impl Iterator<Item = &PhysicsBody> {
        self.bodies.values()
    }

    /// Number of bodies, including ones marked destroyed but not yet swept.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Remove every body marked destroyed.
    ///
    /// Bodies that were tracking a collision against a removed body get an
    /// [`on_collide_stopped`](BodyOwner::on_collide_stopped) for it. Returns
    /// the number of bodies removed.
    pub fn remove_destroyed(&mut self) -> usize {
        let doomed: HashSet<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.is_destroyed())
            .map(|(handle, _)| handle)
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        for &handle in &doomed {
            self.bodies.remove(handle);
            debug!(%handle, "removed destroyed body");
        }

        let mut notifications = Vec::new();
        for body in self.bodies.values_mut() {
            let detached = body.detach(&doomed);
            if let Some(owner) = body.owner() {
                notifications.extend(
                    detached
                        .into_iter()
                        .map(|other| Notification::Stopped(Arc::clone(owner), other)),
                );
            }
        }
        for notification in notifications {
            notification.deliver();
        }
        doomed.len()
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Advance by as many whole substeps as `delta` seconds (plus leftover
    /// time from earlier calls) covers. Returns the number of substeps run.
    ///
    /// Non-finite or non-positive deltas are ignored.
    pub fn process(&mut self, delta: f64) -> usize {
        if !delta.is_finite() || delta <= 0.0 {
            return 0;
        }
        self.accumulator += delta;

        let mut steps = 0;
        while self.accumulator >= self.config.substep {
            self.accumulator -= self.config.substep;
            self.step();
            steps += 1;
        }
        steps
    }

    /// Run exactly one substep.
    pub fn step(&mut self) {
        let dt = self.config.substep;
        let _step = trace_span!("physics_step", step = self.step_count).entered();

        let (handles, proxies) = self.prepare();
        let moving = self.moving_bodies();
        self.apply_forces(dt);
        let pairs = {
            let _span = trace_span!("broad").entered();
            let threads = self.threads;
            self.pool.install(|| find_pairs(&proxies, threads))
        };
        let collisions = self.narrow_phase(&pairs);
        let manifolds = collisions.len();
        self.solve(&collisions, &handles, &proxies);
        let bodies_asleep = self.finish(&collisions, &moving, dt);

        self.last_stats = StepStats {
            pairs_tested: pairs.len(),
            manifolds,
            bodies_asleep,
        };
        self.time += dt;
        self.step_count += 1;
    }

    fn prepare(&mut self) -> (Vec<BodyHandle>, Vec<BroadPhaseProxy>) {
        let _span = trace_span!("prepare").entered();
        let scale = self.config.sim_scale;
        let handles: Vec<BodyHandle> = self.bodies.keys().collect();
        let mut bodies: Vec<&mut PhysicsBody> = self.bodies.values_mut().collect();
        let chunk = chunk_size(bodies.len(), self.threads);

        let proxies = self.pool.install(|| {
            bodies
                .par_chunks_mut(chunk)
                .map(|chunk| {
                    chunk
                        .iter_mut()
                        .map(|body| body.prepare_substep(scale))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        });
        (handles, proxies.concat())
    }

    fn apply_forces(&self, dt: f64) {
        let _span = trace_span!("forces").entered();
        let gravity = self.config.gravity.acceleration;
        let bodies: Vec<&PhysicsBody> = self.bodies.values().collect();
        let chunk = chunk_size(bodies.len(), self.threads);

        self.pool.install(|| {
            bodies.par_chunks(chunk).for_each(|chunk| {
                for body in chunk {
                    let mut state = body.lock();
                    if !state.is_active() {
                        continue;
                    }
                    if let Some(motion) = state.motion.as_mut() {
                        integrate_velocity(motion, &gravity, dt);
                        motion.clear_accumulators();
                    }
                }
            });
        });
    }

    fn narrow_phase(&self, pairs: &[(usize, usize)]) -> Vec<Collision> {
        let _span = trace_span!("narrow", pairs = pairs.len()).entered();
        let bodies: Vec<&PhysicsBody> = self.bodies.values().collect();
        let combine = self.config.combine_manifold_points;
        let chunk = chunk_size(pairs.len(), self.threads);

        self.pool.install(|| {
            pairs.par_chunks(chunk).for_each(|chunk| {
                let mut manifolds = Vec::new();
                for &(i, j) in chunk {
                    let (a, b) = (bodies[i], bodies[j]);
                    if self.dispatcher.collide(a.shape(), b.shape(), &mut manifolds) == 0 {
                        continue;
                    }
                    if combine {
                        for manifold in &mut manifolds {
                            manifold.combine_into_one();
                        }
                    }
                    self.collector.extend(a.handle(), b.handle(), manifolds.drain(..));
                }
            });
        });

        let mut collisions = self.collector.drain();
        // Stable: manifolds of one pair keep their generation order.
        collisions.sort_by_key(|c| (c.body_a, c.body_b));
        collisions
    }

    fn solve(
        &self,
        collisions: &[Collision],
        handles: &[BodyHandle],
        proxies: &[BroadPhaseProxy],
    ) {
        let _span = trace_span!("solve", manifolds = collisions.len()).entered();
        let active: HashSet<BodyHandle> = handles
            .iter()
            .zip(proxies)
            .filter(|(_, proxy)| proxy.active)
            .map(|(&handle, _)| handle)
            .collect();

        for batch in solve_batches(collisions, &active) {
            let chunk = chunk_size(batch.len(), self.threads);
            self.pool.install(|| {
                batch.par_chunks(chunk).for_each(|chunk| {
                    for &k in chunk {
                        let collision = &collisions[k];
                        if let (Some(a), Some(b)) = (
                            self.bodies.get(collision.body_a),
                            self.bodies.get(collision.body_b),
                        ) {
                            solve_pair(&self.solver, a, b, collision);
                        }
                    }
                });
            });
        }
    }

    /// Active bodies above the sleep energy threshold, sampled before
    /// gravity is applied so resting bodies do not count.
    fn moving_bodies(&self) -> HashSet<BodyHandle> {
        let threshold = self.config.sleep.energy_threshold;
        self.bodies
            .iter()
            .filter(|(_, body)| {
                let state = body.lock();
                state.is_active() && energy_per_mass(&state) > threshold
            })
            .map(|(handle, _)| handle)
            .collect()
    }

    fn finish(
        &mut self,
        collisions: &[Collision],
        moving: &HashSet<BodyHandle>,
        dt: f64,
    ) -> usize {
        let _span = trace_span!("finish").entered();
        self.track_collisions(collisions, moving, dt);

        let scale = self.config.sim_scale;
        let sleep = self.config.sleep;
        let mut bodies: Vec<&mut PhysicsBody> = self.bodies.values_mut().collect();
        let chunk = chunk_size(bodies.len(), self.threads);

        self.pool.install(|| {
            bodies
                .par_chunks_mut(chunk)
                .map(|chunk| {
                    chunk
                        .iter_mut()
                        .map(|body| usize::from(body.finish_substep(dt, &sleep, scale)))
                        .sum::<usize>()
                })
                .sum::<usize>()
        })
    }

    /// Start/persist/stop bookkeeping. Serial; callbacks run after every
    /// record is updated and with no body lock held.
    fn track_collisions(
        &mut self,
        collisions: &[Collision],
        moving: &HashSet<BodyHandle>,
        dt: f64,
    ) {
        let active: HashSet<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.lock().is_active())
            .map(|(handle, _)| handle)
            .collect();

        // Records only age while one side can move; a resting pair that fell
        // asleep keeps its contact.
        for (handle, body) in &mut self.bodies {
            let self_active = active.contains(&handle);
            body.age_records(dt, |other| self_active || active.contains(&other));
        }

        let scale = self.config.sim_scale;
        let mut notifications = Vec::new();
        let mut seen = HashSet::new();
        for collision in collisions {
            let (a, b) = (collision.body_a, collision.body_b);
            if !seen.insert((a, b)) {
                continue;
            }
            let Some(contact) = collision.manifold.primary() else {
                continue;
            };
            let point = contact.midpoint();
            let owner_point = Point3::from(point.coords / scale);

            for (this, other) in [(a, b), (b, a)] {
                let Some(body) = self.bodies.get_mut(this) else {
                    continue;
                };
                if moving.contains(&other) {
                    let mut state = body.lock();
                    if state.sleeping {
                        state.wake();
                    }
                }
                let event = body.track_contact(other, point);
                if let Some(owner) = body.owner() {
                    let owner = Arc::clone(owner);
                    match event {
                        ContactEvent::Started => {
                            notifications.push(Notification::Collide(owner, other, owner_point));
                        }
                        ContactEvent::Persisted => {
                            notifications.push(Notification::Persisted(owner, other, owner_point));
                        }
                        ContactEvent::Untracked => {}
                    }
                }
            }
        }

        let window = self.config.collision_window;
        for body in self.bodies.values_mut() {
            let expired = body.expire_records(window);
            if let Some(owner) = body.owner() {
                notifications.extend(
                    expired
                        .into_iter()
                        .map(|other| Notification::Stopped(Arc::clone(owner), other)),
                );
            }
        }

        for notification in notifications {
            notification.deliver();
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every crossing of the segment `from -> to` (owner units) with a live
    /// body, nearest first.
    #[must_use]
    pub fn cast_ray(&self, from: Point3<f64>, to: Point3<f64>) -> Vec<RaycastHit> {
        let scale = self.config.sim_scale;
        let segment = Segment::new(from, to).scaled(scale);
        let bodies: Vec<&PhysicsBody> = self.bodies.values().collect();
        let proxies: Vec<BroadPhaseProxy> = bodies.iter().map(|body| body.proxy()).collect();
        let threads = self.threads;

        let hits = Mutex::new(Vec::new());
        self.pool.install(|| {
            let candidates = segment_candidates(&proxies, &segment, threads);
            candidates
                .par_chunks(chunk_size(candidates.len(), threads))
                .for_each(|chunk| {
                    for &i in chunk {
                        let body = bodies[i];
                        let found = body.shape().test_ray(&segment);
                        if found.is_empty() {
                            continue;
                        }
                        let mut hits = hits.lock();
                        hits.extend(found.into_iter().map(|hit| RaycastHit {
                            body: body.handle(),
                            owner: body.owner().cloned(),
                            point: Point3::from(hit.point.coords / scale),
                            distance: hit.distance / scale,
                        }));
                    }
                });
        });

        let mut hits = hits.into_inner();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Simulated time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Substeps run so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Counters from the last substep.
    #[must_use]
    pub fn last_stats(&self) -> StepStats {
        self.last_stats
    }

    /// Sum of the kinetic energy of all dynamic bodies (simulation units).
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies
            .values()
            .map(|body| {
                let state = body.lock();
                state
                    .motion
                    .as_ref()
                    .map_or(0.0, |m| m.kinetic_energy(&state.pose.rotation))
            })
            .sum()
    }
}

fn energy_per_mass(state: &BodyState) -> f64 {
    state
        .motion
        .as_ref()
        .map_or(0.0, |m| m.kinetic_energy_per_mass(&state.pose.rotation))
}

/// Split collisions into batches in which no active body appears twice, so
/// each batch can be solved in parallel. Inactive bodies are never written
/// and may repeat.
fn solve_batches(collisions: &[Collision], active: &HashSet<BodyHandle>) -> Vec<Vec<usize>> {
    let mut pending: Vec<usize> = (0..collisions.len()).collect();
    let mut batches = Vec::new();

    while !pending.is_empty() {
        let mut claimed = HashSet::new();
        let mut batch = Vec::new();
        let mut deferred = Vec::new();

        for k in pending {
            let c = &collisions[k];
            let writes: [Option<BodyHandle>; 2] = [
                active.contains(&c.body_a).then_some(c.body_a),
                active.contains(&c.body_b).then_some(c.body_b),
            ];
            if writes.iter().flatten().any(|h| claimed.contains(h)) {
                deferred.push(k);
            } else {
                claimed.extend(writes.into_iter().flatten());
                batch.push(k);
            }
        }

        batches.push(batch);
        pending = deferred;
    }
    batches
}

/// Lock both bodies (lower handle first) and run the solver on one manifold.
fn solve_pair(solver: &ContactSolver, a: &PhysicsBody, b: &PhysicsBody, collision: &Collision) {
    let (mut state_a, mut state_b) = if a.handle() < b.handle() {
        let state_a = a.lock();
        (state_a, b.lock())
    } else {
        let state_b = b.lock();
        (a.lock(), state_b)
    };

    let mut body_a = solver_body(&state_a);
    let mut body_b = solver_body(&state_b);
    solver.solve(&mut body_a, &mut body_b, &collision.manifold);
    write_back(&mut state_a, &body_a);
    write_back(&mut state_b, &body_b);
}

fn solver_body(state: &BodyState) -> SolverBody {
    let position = state.pose.position;
    let body = match state.motion.as_ref() {
        Some(m) if state.is_active() => {
            SolverBody::dynamic(position, m.inverse_mass, m.inverse_inertia)
                .with_velocity(m.linear_velocity, m.angular_velocity)
        }
        _ => SolverBody::fixed(position),
    };
    body.with_material(state.friction, state.restitution)
}

fn write_back(state: &mut BodyState, body: &SolverBody) {
    if !body.dynamic {
        return;
    }
    state.pose.position = body.position;
    if let Some(m) = state.motion.as_mut() {
        m.linear_velocity = body.linear_velocity;
        m.angular_velocity = body.angular_velocity;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use sim_contact::{CollisionManifold, ContactPoint};
    use sim_types::Gravity;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig::default().max_threads(2)).unwrap()
    }

    fn place(world: &PhysicsWorld, handle: BodyHandle, x: f64, y: f64, z: f64) {
        world
            .control(handle)
            .unwrap()
            .set_pose(Pose::from_position(Point3::new(x, y, z)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PhysicsConfig::with_substep(-1.0);
        assert!(matches!(
            PhysicsWorld::new(config),
            Err(SimError::InvalidTimestep(_))
        ));
    }

    #[test]
    fn test_process_counts_substeps() {
        let mut w = world();
        assert_eq!(w.process(1.0 / 120.0 * 2.5), 2);
        assert_eq!(w.process(1.0 / 120.0 * 0.6), 1);
        assert_eq!(w.process(f64::NAN), 0);
        assert_eq!(w.process(-1.0), 0);
        assert_eq!(w.step_count(), 3);
        assert_relative_eq!(w.time(), 3.0 / 120.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_fall() {
        let mut w = world();
        let ball = w
            .create_dynamic_body(Shape::sphere(0.5, 1.0).unwrap(), None)
            .unwrap();
        place(&w, ball, 0.0, 100.0, 0.0);

        for _ in 0..120 {
            w.step();
        }
        let v = w.body(ball).unwrap().linear_velocity();
        assert_relative_eq!(v.y, -9.81, epsilon = 1e-9);
        // Semi-implicit Euler: y = 100 - g * dt^2 * n(n+1)/2
        let dt = 1.0 / 120.0;
        let expected = 100.0 - 9.81 * dt * dt * 120.0 * 121.0 / 2.0;
        assert_relative_eq!(w.body(ball).unwrap().center_of_mass().y, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_plane_cannot_be_dynamic() {
        let mut w = world();
        let plane = Shape::plane(Vector3::y(), 0.0).unwrap();
        assert!(w.create_dynamic_body(plane, None).is_err());
        assert_eq!(w.body_count(), 0);
    }

    #[test]
    fn test_sphere_rests_on_ground() {
        let mut w = world();
        w.create_physics_body(Shape::plane(Vector3::y(), 0.0).unwrap(), None);
        let ball = w
            .create_dynamic_body(Shape::sphere(0.5, 1.0).unwrap(), None)
            .unwrap();
        place(&w, ball, 0.0, 0.49, 0.0);

        for _ in 0..240 {
            w.step();
        }
        let y = w.body(ball).unwrap().center_of_mass().y;
        assert!((0.45..0.51).contains(&y), "ball sank or bounced to {y}");
        assert!(w.body(ball).unwrap().linear_velocity().norm() < 0.1);
        assert!(w.last_stats().pairs_tested <= 1);
    }

    #[test]
    fn test_solve_batches_separate_shared_bodies() {
        let mut arena: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let (a, b, c, ground) = (
            arena.insert(()),
            arena.insert(()),
            arena.insert(()),
            arena.insert(()),
        );
        let manifold = CollisionManifold::single(ContactPoint::new(
            Point3::origin(),
            Point3::origin(),
            0.0,
            Vector3::y(),
        ));
        let collision = |body_a, body_b| Collision {
            body_a,
            body_b,
            manifold,
        };
        let collisions = [
            collision(ground, a),
            collision(ground, b),
            collision(a, b),
            collision(b, c),
        ];
        let active: HashSet<_> = [a, b, c].into_iter().collect();

        let batches = solve_batches(&collisions, &active);
        assert_eq!(batches, vec![vec![0, 1], vec![2], vec![3]]);
    }

    #[test]
    fn test_solve_pair_pushes_dynamic_only() {
        let mut w = world();
        let ground = w.create_physics_body(Shape::plane(Vector3::y(), 0.0).unwrap(), None);
        let ball = w
            .create_dynamic_body(Shape::sphere(0.5, 1.0).unwrap(), None)
            .unwrap();
        place(&w, ball, 0.0, 0.4, 0.0);
        w.control(ball)
            .unwrap()
            .set_linear_velocity(Vector3::new(0.0, -1.0, 0.0));

        let collision = Collision {
            body_a: ground,
            body_b: ball,
            manifold: CollisionManifold::single(ContactPoint::new(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, -0.1, 0.0),
                0.1,
                Vector3::y(),
            )),
        };
        solve_pair(
            &w.solver,
            w.body(ground).unwrap(),
            w.body(ball).unwrap(),
            &collision,
        );

        let ball_body = w.body(ball).unwrap();
        assert_relative_eq!(ball_body.center_of_mass().y, 0.46, epsilon = 1e-12);
        assert_relative_eq!(ball_body.linear_velocity().y, 0.0, epsilon = 1e-12);
        assert_eq!(w.body(ground).unwrap().center_of_mass(), Point3::origin());
    }

    #[test]
    fn test_zero_gravity_ball_keeps_drifting() {
        let mut w = PhysicsWorld::new(
            PhysicsConfig::default()
                .gravity(Gravity::zero())
                .max_threads(1),
        )
        .unwrap();
        let ball = w
            .create_dynamic_body(Shape::sphere(0.5, 1.0).unwrap(), None)
            .unwrap();
        w.control(ball).unwrap().set_linear_velocity(Vector3::x());

        for _ in 0..120 {
            w.step();
        }
        assert_relative_eq!(w.body(ball).unwrap().center_of_mass().x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(w.total_kinetic_energy(), 0.5, epsilon = 1e-9);
    }
}
