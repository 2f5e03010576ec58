//! Brute-force broad phase, split across the worker pool.
//!
//! Every pair `(i, j)` with `i < j` is tested once. The outer index range is
//! cut into contiguous chunks, one per worker; each worker pushes the pairs
//! it finds into a shared list behind a single mutex.
//!
//! A pair is a candidate when:
//! - neither body is destroyed,
//! - at least one body is active (dynamic and awake),
//! - both collision filters admit the other body,
//! - their bounding boxes overlap.
//!
//! Pairs come back sorted so the rest of the step does not depend on how the
//! workers interleaved.
//!
//! # Example
//!
//! ```
//! use sim_core::broad_phase::{find_pairs, BroadPhaseProxy};
//! use sim_geometry::Aabb;
//! use nalgebra::{Point3, Vector3};
//!
//! let proxy = |x: f64, active: bool| BroadPhaseProxy {
//!     aabb: Aabb::from_center(Point3::new(x, 0.0, 0.0), Vector3::repeat(0.5)),
//!     active,
//!     ..BroadPhaseProxy::default()
//! };
//! let proxies = [proxy(0.0, true), proxy(0.8, false), proxy(5.0, true)];
//!
//! assert_eq!(find_pairs(&proxies, 2), vec![(0, 1)]);
//! ```

use nalgebra::Point3;
use parking_lot::Mutex;
use rayon::prelude::*;
use sim_geometry::{Aabb, Segment};

use crate::body::filters_match;

/// What the broad phase needs to know about one body, snapshotted once per
/// substep so the pair loop takes no locks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadPhaseProxy {
    /// World bounding box.
    pub aabb: Aabb,
    /// Dynamic and awake.
    pub active: bool,
    /// Marked for removal.
    pub destroyed: bool,
    /// Collision group bits.
    pub group: u32,
    /// Groups this body collides with.
    pub mask: u32,
}

impl Default for BroadPhaseProxy {
    fn default() -> Self {
        Self {
            aabb: Aabb::new(Point3::origin(), Point3::origin()),
            active: false,
            destroyed: false,
            group: 1,
            mask: u32::MAX,
        }
    }
}

impl BroadPhaseProxy {
    /// Whether the pair should reach the narrow phase.
    #[must_use]
    pub fn pairs_with(&self, other: &Self) -> bool {
        !self.destroyed
            && !other.destroyed
            && (self.active || other.active)
            && filters_match(self.group, self.mask, other.group, other.mask)
            && self.aabb.overlaps(&other.aabb)
    }
}

/// Contiguous chunk length that splits `len` items over `threads` workers.
#[must_use]
pub fn chunk_size(len: usize, threads: usize) -> usize {
    len.div_ceil(threads.max(1)).max(1)
}

/// All candidate pairs as sorted `(i, j)` index pairs with `i < j`.
///
/// Runs on the current rayon pool; call it inside
/// [`ThreadPool::install`](rayon::ThreadPool::install) to pin the worker
/// count.
#[must_use]
pub fn find_pairs(proxies: &[BroadPhaseProxy], threads: usize) -> Vec<(usize, usize)> {
    let pairs = Mutex::new(Vec::new());
    let indices: Vec<usize> = (0..proxies.len()).collect();

    indices
        .par_chunks(chunk_size(indices.len(), threads))
        .for_each(|chunk| {
            for &i in chunk {
                let a = &proxies[i];
                if a.destroyed {
                    continue;
                }
                for (j, b) in proxies.iter().enumerate().skip(i + 1) {
                    if a.pairs_with(b) {
                        pairs.lock().push((i, j));
                    }
                }
            }
        });

    let mut pairs = pairs.into_inner();
    pairs.sort_unstable();
    pairs
}

/// Indices of live proxies whose bounding box the segment crosses, sorted.
#[must_use]
pub fn segment_candidates(
    proxies: &[BroadPhaseProxy],
    segment: &Segment,
    threads: usize,
) -> Vec<usize> {
    let hits = Mutex::new(Vec::new());
    let indices: Vec<usize> = (0..proxies.len()).collect();

    indices
        .par_chunks(chunk_size(indices.len(), threads))
        .for_each(|chunk| {
            for &i in chunk {
                let proxy = &proxies[i];
                if !proxy.destroyed && proxy.aabb.intersects_segment(segment) {
                    hits.lock().push(i);
                }
            }
        });

    let mut hits = hits.into_inner();
    hits.sort_unstable();
    hits
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use rand::{Rng, SeedableRng};

    fn proxy_at(x: f64, y: f64, active: bool) -> BroadPhaseProxy {
        BroadPhaseProxy {
            aabb: Aabb::from_center(Point3::new(x, y, 0.0), Vector3::repeat(0.5)),
            active,
            ..BroadPhaseProxy::default()
        }
    }

    fn brute_force(proxies: &[BroadPhaseProxy]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..proxies.len() {
            for j in (i + 1)..proxies.len() {
                if proxies[i].pairs_with(&proxies[j]) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(10, 3), 4);
        assert_eq!(chunk_size(0, 4), 1);
        assert_eq!(chunk_size(5, 0), 5);
    }

    #[test]
    fn test_skips_inactive_pairs() {
        let proxies = [proxy_at(0.0, 0.0, false), proxy_at(0.5, 0.0, false)];
        assert!(find_pairs(&proxies, 2).is_empty());
    }

    #[test]
    fn test_skips_destroyed() {
        let mut proxies = [proxy_at(0.0, 0.0, true), proxy_at(0.5, 0.0, true)];
        assert_eq!(find_pairs(&proxies, 1), vec![(0, 1)]);
        proxies[1].destroyed = true;
        assert!(find_pairs(&proxies, 1).is_empty());
    }

    #[test]
    fn test_respects_filters() {
        let mut proxies = [proxy_at(0.0, 0.0, true), proxy_at(0.5, 0.0, true)];
        proxies[0].group = 0b10;
        proxies[1].mask = 0b01;
        assert!(find_pairs(&proxies, 1).is_empty());
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let proxies: Vec<_> = (0..200)
            .map(|_| {
                proxy_at(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_bool(0.7),
                )
            })
            .collect();

        let expected = brute_force(&proxies);
        assert!(!expected.is_empty());
        for threads in [1, 3, 8] {
            assert_eq!(find_pairs(&proxies, threads), expected);
        }
    }

    #[test]
    fn test_segment_candidates() {
        let proxies = [
            proxy_at(0.0, 0.0, false),
            proxy_at(3.0, 0.0, true),
            proxy_at(0.0, 3.0, true),
        ];
        let ray = Segment::new(Point3::new(-2.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0));
        assert_eq!(segment_candidates(&proxies, &ray, 2), vec![0, 1]);
    }
}
