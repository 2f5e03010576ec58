//! Thread-safe sink for narrow-phase results.

use parking_lot::Mutex;
use sim_types::BodyHandle;

use crate::manifold::CollisionManifold;

/// One manifold between two bodies, normal pointing from `body_a` to
/// `body_b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    /// First body.
    pub body_a: BodyHandle,
    /// Second body.
    pub body_b: BodyHandle,
    /// Contact points.
    pub manifold: CollisionManifold,
}

/// Collects collisions from the narrow-phase workers.
///
/// Workers append concurrently; the solve phase drains the whole list once
/// they have joined.
#[derive(Debug, Default)]
pub struct CollisionCollector {
    collisions: Mutex<Vec<Collision>>,
}

impl CollisionCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one collision.
    pub fn push(&self, collision: Collision) {
        self.collisions.lock().push(collision);
    }

    /// Record every manifold of one body pair under a single lock.
    pub fn extend(
        &self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        manifolds: impl IntoIterator<Item = CollisionManifold>,
    ) {
        self.collisions
            .lock()
            .extend(manifolds.into_iter().map(|manifold| Collision {
                body_a,
                body_b,
                manifold,
            }));
    }

    /// Take everything collected so far.
    pub fn drain(&self) -> Vec<Collision> {
        std::mem::take(&mut *self.collisions.lock())
    }

    /// Number of collisions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collisions.lock().len()
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collisions.lock().is_empty()
    }
}
