//! Shared fixtures for the world integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use parking_lot::Mutex;
use sim_core::{BodyHandle, BodyOwner, PhysicsConfig, PhysicsWorld, Pose, Shape};

/// A collision callback as seen by an owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Collide(BodyHandle, Point3<f64>),
    Persisted(BodyHandle, Point3<f64>),
    Stopped(BodyHandle),
}

impl Event {
    pub fn other(&self) -> BodyHandle {
        match *self {
            Self::Collide(other, _) | Self::Persisted(other, _) | Self::Stopped(other) => other,
        }
    }
}

/// Owner that stores the pose it is given and logs every callback.
#[derive(Debug)]
pub struct RecordingOwner {
    pose: Mutex<Pose>,
    events: Mutex<Vec<Event>>,
}

impl RecordingOwner {
    pub fn at(x: f64, y: f64, z: f64) -> Arc<Self> {
        Arc::new(Self {
            pose: Mutex::new(Pose::from_position(Point3::new(x, y, z))),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Move the owner-side transform, as game logic would.
    pub fn teleport(&self, pose: Pose) {
        *self.pose.lock() = pose;
    }

    pub fn position(&self) -> Point3<f64> {
        self.pose.lock().position
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matches(e)).count()
    }

    pub fn collides(&self) -> usize {
        self.count(|e| matches!(e, Event::Collide(..)))
    }

    pub fn persisted(&self) -> usize {
        self.count(|e| matches!(e, Event::Persisted(..)))
    }

    pub fn stops(&self) -> usize {
        self.count(|e| matches!(e, Event::Stopped(_)))
    }

    /// Type-erased handle for `create_*_body`.
    pub fn handle(self: &Arc<Self>) -> Option<Arc<dyn BodyOwner>> {
        let owner: Arc<dyn BodyOwner> = Arc::clone(self) as Arc<dyn BodyOwner>;
        Some(owner)
    }
}

impl BodyOwner for RecordingOwner {
    fn pose(&self) -> Pose {
        *self.pose.lock()
    }

    fn set_pose(&self, pose: Pose) {
        *self.pose.lock() = pose;
    }

    fn on_collide(&self, other: BodyHandle, point: Point3<f64>) {
        self.events.lock().push(Event::Collide(other, point));
    }

    fn on_collide_persisted(&self, other: BodyHandle, point: Point3<f64>) {
        self.events.lock().push(Event::Persisted(other, point));
    }

    fn on_collide_stopped(&self, other: BodyHandle) {
        self.events.lock().push(Event::Stopped(other));
    }
}

/// Route `tracing` output through the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn world(config: PhysicsConfig) -> PhysicsWorld {
    init_tracing();
    PhysicsWorld::new(config.max_threads(3)).expect("world")
}

pub fn ground(world: &mut PhysicsWorld) -> BodyHandle {
    world.create_physics_body(Shape::plane(Vector3::y(), 0.0).expect("plane"), None)
}

pub fn run(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.step();
    }
}
