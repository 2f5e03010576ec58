//! Shape-pair collision dispatch.
//!
//! [`CollisionDispatcher`] holds a fixed `ShapeType::COUNT`² table of
//! narrow-phase handlers. Each pair is implemented once; the mirrored cell
//! calls the same handler with the arguments swapped and flips the produced
//! manifolds, so every manifold's normal points from the first shape passed
//! to [`CollisionDispatcher::collide`] toward the second.
//!
//! Pairs without a handler (triangle geometry against triangle geometry or a
//! plane, plane against plane) produce nothing and are logged.

use std::sync::Arc;

use hashbrown::HashSet;
use nalgebra::{Point3, Vector3};
use parking_lot::Mutex;
use sim_geometry::{
    closest_point_on_segment, closest_point_on_triangle, closest_points_segments,
    normalized_perpendicular, Aabb, ConvexHull, Shape, ShapeType, GEOM_EPSILON,
};
use tracing::{trace, warn};

use crate::clipping::{collide_capsule_hull, collide_hulls};
use crate::debug::{DebugColor, DebugLineSink};
use crate::manifold::{CollisionManifold, ContactPoint};

/// Narrow-phase routine: appends zero or more manifolds (normal from the
/// first shape to the second).
pub type CollisionHandler =
    fn(&Shape, &Shape, &mut Vec<CollisionManifold>, Option<&dyn DebugLineSink>);

#[derive(Clone, Copy)]
struct Entry {
    handler: Option<CollisionHandler>,
    swapped: bool,
}

const EMPTY: Entry = Entry {
    handler: None,
    swapped: false,
};

/// Routes a shape pair to its narrow-phase handler.
pub struct CollisionDispatcher {
    table: [[Entry; ShapeType::COUNT]; ShapeType::COUNT],
    sink: Option<Arc<dyn DebugLineSink>>,
    reported: Mutex<HashSet<(ShapeType, ShapeType)>>,
}

impl std::fmt::Debug for CollisionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionDispatcher")
            .field("debug_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for CollisionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionDispatcher {
    /// Dispatcher with every implemented pair registered and no debug sink.
    #[must_use]
    pub fn new() -> Self {
        use ShapeType::{Box, Capsule, Convex, Plane, Sphere, TriangleGeometry};

        let mut dispatcher = Self {
            table: [[EMPTY; ShapeType::COUNT]; ShapeType::COUNT],
            sink: None,
            reported: Mutex::new(HashSet::new()),
        };

        dispatcher.register(Sphere, Sphere, sphere_sphere);
        dispatcher.register(Sphere, Box, sphere_box);
        dispatcher.register(Sphere, Capsule, sphere_capsule);
        dispatcher.register(Sphere, Convex, sphere_convex);
        dispatcher.register(Sphere, TriangleGeometry, sphere_triangles);
        dispatcher.register(Sphere, Plane, sphere_plane);

        dispatcher.register(Box, Box, hull_hull);
        dispatcher.register(Capsule, Box, capsule_hull);
        dispatcher.register(Box, Convex, hull_hull);
        dispatcher.register(Box, TriangleGeometry, hull_triangles);
        dispatcher.register(Box, Plane, hull_plane);

        dispatcher.register(Capsule, Capsule, capsule_capsule);
        dispatcher.register(Capsule, Convex, capsule_hull);
        dispatcher.register(Capsule, TriangleGeometry, capsule_triangles);
        dispatcher.register(Capsule, Plane, capsule_plane);

        dispatcher.register(Convex, Convex, hull_hull);
        dispatcher.register(Convex, TriangleGeometry, hull_triangles);
        dispatcher.register(Convex, Plane, hull_plane);

        dispatcher
    }

    /// Dispatcher that draws clipping diagnostics into `sink`.
    #[must_use]
    pub fn with_debug_sink(sink: Arc<dyn DebugLineSink>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.sink = Some(sink);
        dispatcher
    }

    fn register(&mut self, a: ShapeType, b: ShapeType, handler: CollisionHandler) {
        self.table[a.index()][b.index()] = Entry {
            handler: Some(handler),
            swapped: false,
        };
        if a != b {
            self.table[b.index()][a.index()] = Entry {
                handler: Some(handler),
                swapped: true,
            };
        }
    }

    /// Whether a handler exists for the pair (in either order).
    #[must_use]
    pub fn is_implemented(&self, a: ShapeType, b: ShapeType) -> bool {
        self.table[a.index()][b.index()].handler.is_some()
    }

    /// Run the narrow phase for `a` against `b`, appending manifolds to
    /// `out`. Returns the number of manifolds appended.
    pub fn collide(&self, a: &Shape, b: &Shape, out: &mut Vec<CollisionManifold>) -> usize {
        let (ta, tb) = (a.shape_type(), b.shape_type());
        let entry = self.table[ta.index()][tb.index()];
        let Some(handler) = entry.handler else {
            self.report_missing(ta, tb);
            return 0;
        };

        let start = out.len();
        let sink = self.sink.as_deref();
        if entry.swapped {
            handler(b, a, out, sink);
            for manifold in &mut out[start..] {
                manifold.flip();
            }
        } else {
            handler(a, b, out, sink);
        }

        if let Some(sink) = sink {
            if out.len() > start {
                sink.draw_aabb(a.aabb(), DebugColor::Aabb);
                sink.draw_aabb(b.aabb(), DebugColor::Aabb);
            }
        }
        out.len() - start
    }

    /// Convenience wrapper around [`collide`](Self::collide).
    #[must_use]
    pub fn manifolds(&self, a: &Shape, b: &Shape) -> Vec<CollisionManifold> {
        let mut out = Vec::new();
        self.collide(a, b, &mut out);
        out
    }

    fn report_missing(&self, a: ShapeType, b: ShapeType) {
        let key = if a <= b { (a, b) } else { (b, a) };
        if self.reported.lock().insert(key) {
            warn!(first = %a, second = %b, "collision pair not implemented");
        } else {
            trace!(first = %a, second = %b, "collision pair not implemented");
        }
    }
}

fn hull_of(shape: &Shape) -> Option<&ConvexHull> {
    match shape {
        Shape::Box(s) => Some(s.hull()),
        Shape::Convex(s) => Some(s.hull()),
        _ => None,
    }
}

/// Unit direction from `from` to `to`, or `fallback` when they coincide.
fn direction_or(from: &Point3<f64>, to: &Point3<f64>, fallback: Vector3<f64>) -> (Vector3<f64>, f64) {
    let d = to - from;
    let distance = d.norm();
    if distance > GEOM_EPSILON {
        (d / distance, distance)
    } else {
        (fallback, distance)
    }
}

fn sphere_sphere(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Sphere(a), Shape::Sphere(b)) = (a, b) else {
        return;
    };
    let (ca, cb) = (a.center(), b.center());
    let (normal, distance) = direction_or(&ca, &cb, Vector3::y());
    let depth = a.radius() + b.radius() - distance;
    if depth < 0.0 {
        return;
    }
    out.push(CollisionManifold::single(ContactPoint::new(
        ca + normal * a.radius(),
        cb - normal * b.radius(),
        depth,
        normal,
    )));
}

fn sphere_box(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Sphere(sphere), Shape::Box(cuboid)) = (a, b) else {
        return;
    };
    let center = sphere.center();
    let radius = sphere.radius();
    let closest = cuboid.closest_point(&center);
    let offset = center - closest;
    let distance = offset.norm();

    let contact = if distance > GEOM_EPSILON {
        if distance > radius {
            return;
        }
        let normal = -offset / distance;
        ContactPoint::new(center + normal * radius, closest, radius - distance, normal)
    } else {
        // Center inside the box: push out through the nearest face.
        let local = cuboid.transform().inverse_transform_point(&center);
        let half = cuboid.half_extents();
        let (axis, gap) = (0..3)
            .map(|i| (i, half[i] - local[i].abs()))
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .unwrap_or((1, half.y));
        let mut local_normal = Vector3::zeros();
        local_normal[axis] = if local[axis] < 0.0 { -1.0 } else { 1.0 };
        let outward = cuboid.transform().rotation * local_normal;
        ContactPoint::new(
            center - outward * radius,
            center + outward * gap,
            radius + gap,
            -outward,
        )
    };
    out.push(CollisionManifold::single(contact));
}

fn sphere_capsule(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Sphere(sphere), Shape::Capsule(capsule)) = (a, b) else {
        return;
    };
    let center = sphere.center();
    let segment = capsule.segment();
    let (on_segment, _) = closest_point_on_segment(&center, &segment.start, &segment.end);
    let fallback = normalized_perpendicular(&segment.direction());
    let (normal, distance) = direction_or(&center, &on_segment, fallback);
    let depth = sphere.radius() + capsule.radius() - distance;
    if depth < 0.0 {
        return;
    }
    out.push(CollisionManifold::single(ContactPoint::new(
        center + normal * sphere.radius(),
        on_segment - normal * capsule.radius(),
        depth,
        normal,
    )));
}

fn sphere_convex(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Sphere(sphere), Shape::Convex(convex)) = (a, b) else {
        return;
    };
    let hull = convex.hull();
    let center = sphere.center();
    let radius = sphere.radius();

    let contact = if hull.contains_point(&center) {
        let (face, distance) = hull.nearest_face(&center);
        let face_normal = hull.polygons()[face].normal;
        ContactPoint::new(
            center - face_normal * radius,
            center - face_normal * distance,
            radius - distance,
            -face_normal,
        )
    } else {
        let surface = hull.closest_surface_point(&center);
        let (normal, distance) = direction_or(&center, &surface, Vector3::y());
        if distance > radius {
            return;
        }
        ContactPoint::new(center + normal * radius, surface, radius - distance, normal)
    };
    out.push(CollisionManifold::single(contact));
}

fn sphere_triangles(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Sphere(sphere), Shape::TriangleGeometry(soup)) = (a, b) else {
        return;
    };
    let center = sphere.center();
    let radius = sphere.radius();
    let bounds = Aabb::from_center(center, Vector3::repeat(radius));

    for i in 0..soup.len() {
        if !soup.triangle_aabb(i).overlaps(&bounds) {
            continue;
        }
        let [p, q, r] = soup.triangle(i);
        let closest = closest_point_on_triangle(&center, &p, &q, &r);
        let fallback = -soup.hulls()[i].polygons()[0].normal;
        let (normal, distance) = direction_or(&center, &closest, fallback);
        if distance > radius {
            continue;
        }
        out.push(CollisionManifold::single(ContactPoint::new(
            center + normal * radius,
            closest,
            radius - distance,
            normal,
        )));
    }
}

fn sphere_plane(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Sphere(sphere), Shape::Plane(plane)) = (a, b) else {
        return;
    };
    let plane = plane.plane();
    let center = sphere.center();
    let radius = sphere.radius();
    let distance = plane.signed_distance(&center);
    if distance > radius {
        return;
    }
    out.push(CollisionManifold::single(ContactPoint::new(
        center - plane.normal * radius,
        center - plane.normal * distance,
        radius - distance,
        -plane.normal,
    )));
}

fn hull_hull(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    sink: Option<&dyn DebugLineSink>,
) {
    let (Some(ha), Some(hb)) = (hull_of(a), hull_of(b)) else {
        return;
    };
    if let Some(manifold) = collide_hulls(ha, hb, sink) {
        out.push(manifold);
    }
}

fn capsule_hull(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Capsule(capsule), Some(hull)) = (a, hull_of(b)) else {
        return;
    };
    if let Some(manifold) = collide_capsule_hull(capsule, hull, sink) {
        out.push(manifold);
    }
}

fn hull_triangles(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    sink: Option<&dyn DebugLineSink>,
) {
    let (Some(hull), Shape::TriangleGeometry(soup)) = (hull_of(a), b) else {
        return;
    };
    let bounds = a.aabb();
    for (i, triangle) in soup.hulls().iter().enumerate() {
        if !soup.triangle_aabb(i).overlaps(bounds) {
            continue;
        }
        if let Some(manifold) = collide_hulls(hull, triangle, sink) {
            out.push(manifold);
        }
    }
}

fn capsule_triangles(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Capsule(capsule), Shape::TriangleGeometry(soup)) = (a, b) else {
        return;
    };
    let bounds = a.aabb();
    for (i, triangle) in soup.hulls().iter().enumerate() {
        if !soup.triangle_aabb(i).overlaps(bounds) {
            continue;
        }
        if let Some(manifold) = collide_capsule_hull(capsule, triangle, sink) {
            out.push(manifold);
        }
    }
}

fn capsule_capsule(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Capsule(a), Shape::Capsule(b)) = (a, b) else {
        return;
    };
    let (sa, sb) = (a.segment(), b.segment());
    let (on_a, on_b) = closest_points_segments(&sa.start, &sa.end, &sb.start, &sb.end);
    let fallback = normalized_perpendicular(&sa.direction());
    let (normal, distance) = direction_or(&on_a, &on_b, fallback);
    let depth = a.radius() + b.radius() - distance;
    if depth < 0.0 {
        return;
    }
    out.push(CollisionManifold::single(ContactPoint::new(
        on_a + normal * a.radius(),
        on_b - normal * b.radius(),
        depth,
        normal,
    )));
}

fn capsule_plane(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Shape::Capsule(capsule), Shape::Plane(plane)) = (a, b) else {
        return;
    };
    let plane = plane.plane();
    let radius = capsule.radius();
    let segment = capsule.segment();

    let mut manifold = CollisionManifold::new();
    for end in [segment.start, segment.end] {
        let distance = plane.signed_distance(&end);
        if distance <= radius {
            manifold.push(ContactPoint::new(
                end - plane.normal * radius,
                end - plane.normal * distance,
                radius - distance,
                -plane.normal,
            ));
        }
    }
    if !manifold.is_empty() {
        manifold.deepest_first();
        out.push(manifold);
    }
}

fn hull_plane(
    a: &Shape,
    b: &Shape,
    out: &mut Vec<CollisionManifold>,
    _sink: Option<&dyn DebugLineSink>,
) {
    let (Some(hull), Shape::Plane(plane)) = (hull_of(a), b) else {
        return;
    };
    let plane = plane.plane();

    let mut manifold = CollisionManifold::new();
    for vertex in hull.vertices() {
        let distance = plane.signed_distance(vertex);
        if distance <= 0.0 {
            manifold.push(ContactPoint::new(
                *vertex,
                plane.project(vertex),
                -distance,
                -plane.normal,
            ));
        }
    }
    if manifold.is_empty() {
        return;
    }
    manifold.combine_into_one();
    out.push(manifold);
}
