//! Geometric primitives: bounding boxes, planes, segments and closest-point
//! routines.
//!
//! Everything here is pure math on world-space (or local-space) values and
//! carries no simulation state.

// Allow many_single_char_names - standard notation for the closest-point algorithms
// Allow suspicious_operation_groupings - false positive for determinant a*e - b*b
#![allow(clippy::many_single_char_names, clippy::suspicious_operation_groupings)]

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Threshold below which lengths and determinants count as zero.
pub const GEOM_EPSILON: f64 = 1e-10;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest AABB containing every point, `None` for an empty iterator.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(Self::new(first, first), |aabb, p| aabb.including(p)))
    }

    /// Grow the box so it contains `point`.
    #[must_use]
    pub fn including(&self, point: &Point3<f64>) -> Self {
        Self {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    /// Smallest AABB containing both boxes.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Check if this AABB overlaps with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check if a point lies inside (or on) the box.
    #[must_use]
    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let margin = Vector3::repeat(margin);
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half the size of the box along each axis.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        (self.max - self.min) * 0.5
    }

    /// Slab test of a segment against the box.
    #[must_use]
    pub fn intersects_segment(&self, segment: &Segment) -> bool {
        let dir = segment.direction();
        let mut t_min: f64 = 0.0;
        let mut t_max: f64 = 1.0;

        for i in 0..3 {
            if dir[i].abs() < GEOM_EPSILON {
                if segment.start[i] < self.min[i] || segment.start[i] > self.max[i] {
                    return false;
                }
            } else {
                let inv = 1.0 / dir[i];
                let mut t1 = (self.min[i] - segment.start[i]) * inv;
                let mut t2 = (self.max[i] - segment.start[i]) * inv;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return false;
                }
            }
        }
        true
    }
}

/// A plane `dot(normal, x) = offset` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Plane {
    /// Unit normal. Points on the positive side are "in front".
    pub normal: Vector3<f64>,
    /// Distance of the plane from the origin along the normal.
    pub offset: f64,
}

impl Plane {
    /// Create a plane from a unit normal and an offset.
    #[must_use]
    pub const fn new(normal: Vector3<f64>, offset: f64) -> Self {
        Self { normal, offset }
    }

    /// Plane through `point` with the given (not necessarily unit) normal.
    ///
    /// Returns `None` if the normal has zero length.
    #[must_use]
    pub fn from_point_normal(point: &Point3<f64>, normal: &Vector3<f64>) -> Option<Self> {
        let normal = normal.try_normalize(GEOM_EPSILON)?;
        Some(Self {
            normal,
            offset: normal.dot(&point.coords),
        })
    }

    /// Signed distance from the plane; positive in front.
    #[must_use]
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) - self.offset
    }

    /// Orthogonal projection of a point onto the plane.
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        point - self.normal * self.signed_distance(point)
    }

    /// The plane with its normal flipped.
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            offset: -self.offset,
        }
    }
}

/// A line segment, also used as a finite ray.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    /// Start point.
    pub start: Point3<f64>,
    /// End point.
    pub end: Point3<f64>,
}

impl Segment {
    /// Create a new segment.
    #[must_use]
    pub const fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    /// Unnormalized direction `end - start`.
    #[must_use]
    pub fn direction(&self) -> Vector3<f64> {
        self.end - self.start
    }

    /// Length of the segment.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.direction().norm()
    }

    /// Point at parameter `t` (0 = start, 1 = end).
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.start + self.direction() * t
    }

    /// Both endpoints multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            start: Point3::from(self.start.coords * factor),
            end: Point3::from(self.end.coords * factor),
        }
    }

    /// Bounding box of the segment.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.start.inf(&self.end), self.start.sup(&self.end))
    }

    /// Part of the segment behind (or on) `plane`, `None` if all of it is in
    /// front.
    #[must_use]
    pub fn clipped(&self, plane: &Plane) -> Option<Self> {
        let da = plane.signed_distance(&self.start);
        let db = plane.signed_distance(&self.end);

        match (da <= 0.0, db <= 0.0) {
            (true, true) => Some(*self),
            (false, false) => None,
            (true, false) => Some(Self::new(self.start, self.point_at(da / (da - db)))),
            (false, true) => Some(Self::new(self.point_at(da / (da - db)), self.end)),
        }
    }
}

/// A unit vector perpendicular to `v`.
///
/// The component of `v` with the smallest magnitude is dropped so the result
/// never degenerates for non-zero input. A zero input yields the X axis.
#[must_use]
pub fn normalized_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let candidate = if v.x.abs() > v.z.abs() {
        Vector3::new(-v.y, v.x, 0.0)
    } else {
        Vector3::new(0.0, -v.z, v.y)
    };
    candidate
        .try_normalize(GEOM_EPSILON)
        .unwrap_or_else(Vector3::x)
}

/// Closest point to `p` on segment `a`-`b`, with its parameter in `[0, 1]`.
#[must_use]
pub fn closest_point_on_segment(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
) -> (Point3<f64>, f64) {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < GEOM_EPSILON {
        return (*a, 0.0);
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t, t)
}

/// Closest points between segments `p1`-`q1` and `p2`-`q2`.
///
/// Returns the point on the first segment and the point on the second.
#[must_use]
pub fn closest_points_segments(
    p1: &Point3<f64>,
    q1: &Point3<f64>,
    p2: &Point3<f64>,
    q2: &Point3<f64>,
) -> (Point3<f64>, Point3<f64>) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;

    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let f = d2.dot(&r);

    // Degenerate segments
    if a < GEOM_EPSILON && e < GEOM_EPSILON {
        return (*p1, *p2);
    }
    if a < GEOM_EPSILON {
        let t = (f / e).clamp(0.0, 1.0);
        return (*p1, p2 + d2 * t);
    }
    if e < GEOM_EPSILON {
        let s = (-d1.dot(&r) / a).clamp(0.0, 1.0);
        return (p1 + d1 * s, *p2);
    }

    let b = d1.dot(&d2);
    let c = d1.dot(&r);
    let denom = a * e - b * b;

    let (mut s, mut t) = if denom.abs() < GEOM_EPSILON {
        // Parallel segments
        (0.0, f / e)
    } else {
        let s_val = (b * f - c * e) / denom;
        (s_val, (b * s_val + f) / e)
    };

    if s < 0.0 {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else if s > 1.0 {
        s = 1.0;
        t = ((b + f) / e).clamp(0.0, 1.0);
    }

    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }

    (p1 + d1 * s, p2 + d2 * t)
}

/// Closest point to `p` on triangle `a`, `b`, `c` (Voronoi region walk).
#[must_use]
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Clip a convex polygon against a plane, keeping the part behind it
/// (Sutherland–Hodgman, one plane).
#[must_use]
pub fn clip_polygon(polygon: &[Point3<f64>], plane: &Plane) -> Vec<Point3<f64>> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    let Some(&last) = polygon.last() else {
        return out;
    };

    let mut prev = last;
    let mut prev_dist = plane.signed_distance(&prev);
    for &current in polygon {
        let dist = plane.signed_distance(&current);
        match (prev_dist <= 0.0, dist <= 0.0) {
            (true, true) => out.push(current),
            (true, false) => out.push(prev + (current - prev) * (prev_dist / (prev_dist - dist))),
            (false, true) => {
                out.push(prev + (current - prev) * (prev_dist / (prev_dist - dist)));
                out.push(current);
            }
            (false, false) => {}
        }
        prev = current;
        prev_dist = dist;
    }
    out
}
