//! Segment ray tests against the primitive shapes.
//!
//! Rays are finite segments. Every routine appends all surface crossings that
//! lie on the segment (entry and exit where both exist) to `hits`; distances
//! are measured from the segment start in the segment's own units. Hits are
//! not sorted.

// Allow many_single_char_names - standard notation for Möller-Trumbore algorithm
// Allow suspicious_operation_groupings - false positive for quadratic discriminant formula b*b - a*c
#![allow(clippy::many_single_char_names, clippy::suspicious_operation_groupings)]

use nalgebra::{Isometry3, Point3, Vector3};

use crate::hull::ConvexHull;
use crate::primitives::{Plane, Segment, GEOM_EPSILON};

/// One crossing of a ray with a shape surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Hit point.
    pub point: Point3<f64>,
    /// Distance from the segment start to the hit point.
    pub distance: f64,
}

impl RayHit {
    /// Create a new ray hit.
    #[must_use]
    pub const fn new(point: Point3<f64>, distance: f64) -> Self {
        Self { point, distance }
    }
}

/// Unit direction and length of a segment, `None` for a zero-length segment.
fn unit_direction(segment: &Segment) -> Option<(Vector3<f64>, f64)> {
    let dir = segment.direction();
    let length = dir.norm();
    (length > GEOM_EPSILON).then(|| (dir / length, length))
}

fn push_if_on_segment(
    hits: &mut Vec<RayHit>,
    segment: &Segment,
    dir: &Vector3<f64>,
    length: f64,
    t: f64,
) {
    if t.is_finite() && (0.0..=length).contains(&t) {
        hits.push(RayHit::new(segment.start + dir * t, t));
    }
}

/// Ray against a sphere: both roots of the quadratic.
pub fn ray_sphere(segment: &Segment, center: &Point3<f64>, radius: f64, hits: &mut Vec<RayHit>) {
    let Some((dir, length)) = unit_direction(segment) else {
        return;
    };
    let m = segment.start - center;
    let b = m.dot(&dir);
    let c = m.dot(&m) - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return;
    }

    let sq = discriminant.sqrt();
    push_if_on_segment(hits, segment, &dir, length, -b - sq);
    if sq > GEOM_EPSILON {
        push_if_on_segment(hits, segment, &dir, length, -b + sq);
    }
}

/// Ray against an oriented box given by its transform and half-extents.
pub fn ray_box(
    segment: &Segment,
    transform: &Isometry3<f64>,
    half_extents: &Vector3<f64>,
    hits: &mut Vec<RayHit>,
) {
    let Some((dir, length)) = unit_direction(segment) else {
        return;
    };
    let local_start = transform.inverse_transform_point(&segment.start);
    let local_dir = transform.inverse_transform_vector(&dir);

    let mut t_enter = f64::NEG_INFINITY;
    let mut t_exit = f64::INFINITY;
    for i in 0..3 {
        if local_dir[i].abs() < GEOM_EPSILON {
            if local_start[i].abs() > half_extents[i] {
                return;
            }
            continue;
        }
        let inv = 1.0 / local_dir[i];
        let mut t1 = (-half_extents[i] - local_start[i]) * inv;
        let mut t2 = (half_extents[i] - local_start[i]) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_enter = t_enter.max(t1);
        t_exit = t_exit.min(t2);
        if t_enter > t_exit {
            return;
        }
    }

    push_if_on_segment(hits, segment, &dir, length, t_enter);
    if t_exit - t_enter > GEOM_EPSILON {
        push_if_on_segment(hits, segment, &dir, length, t_exit);
    }
}

/// Ray against a convex hull (Cyrus–Beck clipping against every face plane).
pub fn ray_convex(segment: &Segment, hull: &ConvexHull, hits: &mut Vec<RayHit>) {
    let Some((dir, length)) = unit_direction(segment) else {
        return;
    };

    let mut t_enter = f64::NEG_INFINITY;
    let mut t_exit = f64::INFINITY;
    for p in 0..hull.polygons().len() {
        let plane = hull.polygon_plane(p);
        let denom = plane.normal.dot(&dir);
        let num = -plane.signed_distance(&segment.start);

        if denom.abs() < GEOM_EPSILON {
            if num < 0.0 {
                return;
            }
            continue;
        }
        let t = num / denom;
        if denom < 0.0 {
            t_enter = t_enter.max(t);
        } else {
            t_exit = t_exit.min(t);
        }
        if t_enter > t_exit {
            return;
        }
    }

    push_if_on_segment(hits, segment, &dir, length, t_enter);
    if t_exit - t_enter > GEOM_EPSILON {
        push_if_on_segment(hits, segment, &dir, length, t_exit);
    }
}

/// Ray against a capsule: the open cylinder around `a`-`b` plus the two cap
/// spheres, each cap only beyond its end of the axis.
pub fn ray_capsule(
    segment: &Segment,
    a: &Point3<f64>,
    b: &Point3<f64>,
    radius: f64,
    hits: &mut Vec<RayHit>,
) {
    let axis = b - a;
    let h2 = axis.norm_squared();
    if h2 < GEOM_EPSILON {
        ray_sphere(segment, a, radius, hits);
        return;
    }
    let Some((dir, length)) = unit_direction(segment) else {
        return;
    };

    let m = segment.start - a;
    let md = m.dot(&axis);
    let nd = dir.dot(&axis);
    let dir_perp = dir - axis * (nd / h2);
    let m_perp = m - axis * (md / h2);

    let qa = dir_perp.norm_squared();
    if qa > GEOM_EPSILON {
        let qb = m_perp.dot(&dir_perp);
        let qc = m_perp.norm_squared() - radius * radius;
        let discriminant = qb * qb - qa * qc;
        if discriminant >= 0.0 {
            let sq = discriminant.sqrt();
            for t in [(-qb - sq) / qa, (-qb + sq) / qa] {
                let s = (md + t * nd) / h2;
                if (0.0..=1.0).contains(&s) {
                    push_if_on_segment(hits, segment, &dir, length, t);
                }
            }
        }
    }

    let mut cap_hits = Vec::new();
    ray_sphere(segment, a, radius, &mut cap_hits);
    hits.extend(cap_hits.drain(..).filter(|hit| (hit.point - a).dot(&axis) < 0.0));
    ray_sphere(segment, b, radius, &mut cap_hits);
    hits.extend(cap_hits.drain(..).filter(|hit| (hit.point - a).dot(&axis) > h2));
}

/// Ray against a two-sided triangle (Möller–Trumbore).
pub fn ray_triangle(
    segment: &Segment,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    hits: &mut Vec<RayHit>,
) {
    let Some((dir, length)) = unit_direction(segment) else {
        return;
    };
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < GEOM_EPSILON {
        return;
    }

    let inv_det = 1.0 / det;
    let s = segment.start - a;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return;
    }
    let q = s.cross(&e1);
    let v = dir.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return;
    }

    push_if_on_segment(hits, segment, &dir, length, e2.dot(&q) * inv_det);
}

/// Ray against a plane surface.
pub fn ray_plane(segment: &Segment, plane: &Plane, hits: &mut Vec<RayHit>) {
    let Some((dir, length)) = unit_direction(segment) else {
        return;
    };
    let denom = plane.normal.dot(&dir);
    if denom.abs() < GEOM_EPSILON {
        return;
    }
    let t = -plane.signed_distance(&segment.start) / denom;
    push_if_on_segment(hits, segment, &dir, length, t);
}
