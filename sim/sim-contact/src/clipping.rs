//! SAT contact generation for convex hulls.
//!
//! [`collide_hulls`] runs both face queries and the edge query. Any positive
//! separation means the hulls are disjoint. Otherwise the axis with the
//! largest separation wins, with face axes preferred over the edge axis (and
//! A's faces over B's) unless the alternative is better by
//! [`CONTACT_BIAS`]:
//!
//! - face axis: the most anti-parallel face of the other hull is clipped
//!   against the side planes of the reference face and every clipped point
//!   behind the reference face becomes a contact;
//! - edge axis: one contact between the closest points of the two edges.
//!
//! Capsules reuse the same queries against their two-point core hull, see
//! [`collide_capsule_hull`].

use nalgebra::{Point3, Vector3};
use sim_geometry::{
    clip_polygon, closest_points_segments, CapsuleShape, ConvexHull, EdgeQuery, FaceQuery, Plane,
    Segment, GEOM_EPSILON,
};

use crate::debug::{DebugColor, DebugLineSink};
use crate::manifold::{CollisionManifold, ContactPoint, REDUCED_CONTACTS};

/// Margin by which an axis must beat the preferred one to be chosen, and the
/// tolerance on clipped point depths.
pub const CONTACT_BIAS: f64 = 1e-3;

/// Relative length below which an edge/segment cross product is ignored.
const PARALLEL_TOLERANCE: f64 = 0.05;

const DEBUG_POINT_SIZE: f64 = 0.02;

/// Contact manifold between two convex hulls, normal pointing from `a` to
/// `b`. `None` if they do not touch.
#[must_use]
pub fn collide_hulls(
    a: &ConvexHull,
    b: &ConvexHull,
    sink: Option<&dyn DebugLineSink>,
) -> Option<CollisionManifold> {
    let face_a = a.query_face_direction(b);
    if face_a.separation > 0.0 {
        return None;
    }
    let face_b = b.query_face_direction(a);
    if face_b.separation > 0.0 {
        return None;
    }
    let edge = a.query_edge_direction(b);
    if edge.separation > 0.0 {
        return None;
    }

    let best_face = face_a.separation.max(face_b.separation);
    if edge.is_valid() && edge.separation > best_face + CONTACT_BIAS {
        return Some(edge_contact(a, b, &edge, sink));
    }

    if face_b.separation > face_a.separation + CONTACT_BIAS {
        let mut manifold = face_contact(b, a, &face_b, sink)?;
        manifold.flip();
        Some(manifold)
    } else {
        face_contact(a, b, &face_a, sink)
    }
}

fn face_contact(
    reference: &ConvexHull,
    incident: &ConvexHull,
    query: &FaceQuery,
    sink: Option<&dyn DebugLineSink>,
) -> Option<CollisionManifold> {
    let reference_plane = reference.polygon_plane(query.polygon);
    let normal = reference_plane.normal;

    let incident_face = (0..incident.polygons().len()).min_by(|&i, &j| {
        let di = incident.polygons()[i].normal.dot(&normal);
        let dj = incident.polygons()[j].normal.dot(&normal);
        di.total_cmp(&dj)
    })?;

    let reference_points = reference.polygon_points(query.polygon);
    let mut clipped: Vec<Point3<f64>> = incident.polygon_points(incident_face).to_vec();
    for (k, p) in reference_points.iter().enumerate() {
        let q = reference_points[(k + 1) % reference_points.len()];
        let Some(side) = Plane::from_point_normal(p, &(q - p).cross(&normal)) else {
            continue;
        };
        clipped = clip_polygon(&clipped, &side);
        if clipped.is_empty() {
            return None;
        }
    }

    if let Some(sink) = sink {
        sink.draw_polygon(&reference_points, DebugColor::ReferenceFace);
        sink.draw_polygon(&clipped, DebugColor::IncidentFace);
    }

    let mut manifold = CollisionManifold::new();
    for point in clipped {
        let distance = reference_plane.signed_distance(&point);
        if distance <= 0.0 && distance >= query.separation - CONTACT_BIAS {
            let on_reference = point - normal * distance;
            manifold.push(ContactPoint::new(on_reference, point, -distance, normal));
        }
    }
    if manifold.is_empty() {
        return None;
    }
    if manifold.len() > REDUCED_CONTACTS {
        manifold.reduce_contacts();
    } else {
        manifold.deepest_first();
    }

    draw_contacts(&manifold, sink);
    Some(manifold)
}

fn edge_contact(
    a: &ConvexHull,
    b: &ConvexHull,
    query: &EdgeQuery,
    sink: Option<&dyn DebugLineSink>,
) -> CollisionManifold {
    let (p1, q1) = a.edge_points(query.edge_a);
    let (p2, q2) = b.edge_points(query.edge_b);
    let (on_a, on_b) = closest_points_segments(&p1, &q1, &p2, &q2);

    let manifold = CollisionManifold::single(ContactPoint::new(
        on_a,
        on_b,
        -query.separation,
        query.axis,
    ));
    draw_contacts(&manifold, sink);
    manifold
}

fn draw_contacts(manifold: &CollisionManifold, sink: Option<&dyn DebugLineSink>) {
    let Some(sink) = sink else {
        return;
    };
    for contact in manifold.points() {
        sink.draw_point(contact.point_b, DEBUG_POINT_SIZE, DebugColor::Contact);
        sink.draw_line(
            contact.point_b,
            contact.point_b + contact.normal * contact.depth.max(DEBUG_POINT_SIZE),
            DebugColor::Normal,
        );
    }
}

/// Contact manifold between a capsule (A) and a convex hull (B), normal
/// pointing from the capsule to the hull.
///
/// Candidate axes are the hull's face normals (against the capsule's core
/// segment) and the cross products of hull edges with the segment direction.
/// Separations are compared against the capsule radius.
#[must_use]
pub fn collide_capsule_hull(
    capsule: &CapsuleShape,
    hull: &ConvexHull,
    sink: Option<&dyn DebugLineSink>,
) -> Option<CollisionManifold> {
    let radius = capsule.radius();
    let segment = capsule.segment();

    let face = hull.query_face_direction(capsule.hull());
    if face.separation > radius {
        return None;
    }
    let edge = capsule_edge_query(hull, segment);
    if edge.separation > radius {
        return None;
    }

    let mut manifold = if edge.is_valid() && edge.separation > face.separation + CONTACT_BIAS {
        let (p, q) = hull.edge_points(edge.edge_a);
        let (on_hull, on_segment) = closest_points_segments(&p, &q, &segment.start, &segment.end);
        CollisionManifold::single(ContactPoint::new(
            on_segment - edge.axis * radius,
            on_hull,
            radius - edge.separation,
            -edge.axis,
        ))
    } else {
        capsule_face_contact(hull, &face, segment, radius)?
    };

    if manifold.len() > REDUCED_CONTACTS {
        manifold.reduce_contacts();
    } else {
        manifold.deepest_first();
    }
    draw_contacts(&manifold, sink);
    Some(manifold)
}

/// Edge query of a hull against a segment; the axis points away from the
/// hull.
fn capsule_edge_query(hull: &ConvexHull, segment: &Segment) -> EdgeQuery {
    let direction = segment.direction();
    let mut best = EdgeQuery {
        edge_a: 0,
        edge_b: 0,
        axis: Vector3::zeros(),
        separation: f64::NEG_INFINITY,
    };

    for (i, edge) in hull.edges().iter().enumerate() {
        if edge.twin < i {
            continue;
        }
        let (u, v) = hull.edge_normals(i);
        if u.dot(&direction) * v.dot(&direction) >= 0.0 {
            continue;
        }

        let (p, q) = hull.edge_points(i);
        let e = q - p;
        let cross = e.cross(&direction);
        if cross.norm() < PARALLEL_TOLERANCE * e.norm() * direction.norm() {
            continue;
        }
        let mut axis = cross.normalize();
        if axis.dot(&(p - hull.center())) < 0.0 {
            axis = -axis;
        }

        let separation = axis.dot(&(segment.start - p));
        if separation > best.separation {
            best = EdgeQuery {
                edge_a: i,
                edge_b: 0,
                axis,
                separation,
            };
        }
    }
    best
}

fn capsule_face_contact(
    hull: &ConvexHull,
    face: &FaceQuery,
    segment: &Segment,
    radius: f64,
) -> Option<CollisionManifold> {
    if !face.is_valid() {
        return None;
    }
    let plane = hull.polygon_plane(face.polygon);
    let normal = plane.normal;
    let face_points = hull.polygon_points(face.polygon);

    let mut clipped = Some(*segment);
    for (k, p) in face_points.iter().enumerate() {
        let q = face_points[(k + 1) % face_points.len()];
        let Some(side) = Plane::from_point_normal(p, &(q - p).cross(&normal)) else {
            continue;
        };
        clipped = clipped.and_then(|s| s.clipped(&side));
    }

    let mut manifold = CollisionManifold::new();
    match clipped {
        Some(clipped) => {
            let ends = if clipped.length() < GEOM_EPSILON {
                &[clipped.start][..]
            } else {
                &[clipped.start, clipped.end][..]
            };
            for point in ends {
                let distance = plane.signed_distance(point);
                if distance <= radius {
                    manifold.push(ContactPoint::new(
                        point - normal * radius,
                        point - normal * distance,
                        radius - distance,
                        -normal,
                    ));
                }
            }
        }
        None => {
            // The segment misses the face prism: use the nearest face
            // boundary edge instead.
            let mut best: Option<(Point3<f64>, Point3<f64>, f64)> = None;
            for (k, p) in face_points.iter().enumerate() {
                let q = face_points[(k + 1) % face_points.len()];
                let (on_face, on_segment) =
                    closest_points_segments(p, &q, &segment.start, &segment.end);
                let distance = (on_segment - on_face).norm();
                if best.map_or(true, |(_, _, d)| distance < d) {
                    best = Some((on_face, on_segment, distance));
                }
            }
            let (on_face, on_segment, distance) = best?;
            if distance > radius {
                return None;
            }
            let outward = (on_segment - on_face)
                .try_normalize(GEOM_EPSILON)
                .unwrap_or(normal);
            manifold.push(ContactPoint::new(
                on_segment - outward * radius,
                on_face,
                radius - distance,
                -outward,
            ));
        }
    }

    (!manifold.is_empty()).then_some(manifold)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::debug::RecordingSink;
    use sim_geometry::Shape;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_4;

    fn cube_at(x: f64, y: f64, z: f64, rotation: UnitQuaternion<f64>) -> ConvexHull {
        let mut hull = ConvexHull::cuboid(Vector3::repeat(0.5)).unwrap();
        hull.provide_transformation(&Isometry3::from_parts(Translation3::new(x, y, z), rotation));
        hull
    }

    #[test]
    fn test_separated_cubes() {
        let a = cube_at(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let b = cube_at(1.2, 0.0, 0.0, UnitQuaternion::identity());
        assert!(collide_hulls(&a, &b, None).is_none());
    }

    #[test]
    fn test_stacked_cubes_face_contact() {
        let a = cube_at(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let b = cube_at(0.1, 0.9, 0.1, UnitQuaternion::identity());
        let manifold = collide_hulls(&a, &b, None).unwrap();

        assert_eq!(manifold.len(), 4);
        for contact in manifold.points() {
            assert_relative_eq!(contact.normal, Vector3::y(), epsilon = 1e-12);
            assert_relative_eq!(contact.depth, 0.1, epsilon = 1e-9);
            assert_relative_eq!(contact.point_a.y, 0.5, epsilon = 1e-9);
            assert_relative_eq!(contact.point_b.y, 0.4, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_reference_on_b_keeps_a_to_b_normal() {
        // A sits on top of B: the normal points from A down into B.
        let mut big = ConvexHull::cuboid(Vector3::new(2.0, 0.5, 2.0)).unwrap();
        big.provide_transformation(&Isometry3::identity());
        let small = cube_at(0.0, 0.95, 0.0, UnitQuaternion::from_euler_angles(0.0, 0.3, 0.0));

        let manifold = collide_hulls(&small, &big, None).unwrap();
        for contact in manifold.points() {
            assert_relative_eq!(contact.normal, -Vector3::y(), epsilon = 1e-9);
            assert_relative_eq!(contact.depth, 0.05, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_tilted_face_contact_puts_deepest_first() {
        let a = cube_at(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let b = cube_at(0.0, 0.9, 0.0, UnitQuaternion::from_euler_angles(0.05, 0.0, 0.1));

        let manifold = collide_hulls(&a, &b, None).unwrap();
        assert!(manifold.len() >= 2);
        let depths: Vec<f64> = manifold.points().iter().map(|p| p.depth).collect();
        let shallowest = depths.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(manifold.max_depth().unwrap() - shallowest > 0.01);
        assert_eq!(manifold.primary().unwrap().depth, manifold.max_depth().unwrap());
    }

    #[test]
    fn test_crossed_edges_single_contact() {
        let a = cube_at(0.0, 0.0, 0.0, UnitQuaternion::from_euler_angles(FRAC_PI_4, 0.0, 0.0));
        let b = cube_at(0.0, 1.35, 0.0, UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_4));

        let manifold = collide_hulls(&a, &b, None).unwrap();
        assert_eq!(manifold.len(), 1);
        let contact = manifold.primary().unwrap();
        assert_relative_eq!(contact.normal, Vector3::y(), epsilon = 1e-9);
        assert_relative_eq!(contact.depth, 2f64.sqrt() - 1.35, epsilon = 1e-9);
        assert_relative_eq!(contact.point_a, Point3::new(0.0, FRAC_PI_4.sin(), 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_debug_sink_receives_faces() {
        let sink = RecordingSink::new();
        let a = cube_at(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let b = cube_at(0.1, 0.9, 0.1, UnitQuaternion::identity());
        collide_hulls(&a, &b, Some(&sink)).unwrap();

        assert_eq!(sink.count(DebugColor::ReferenceFace), 4);
        assert_eq!(sink.count(DebugColor::Normal), 4);
        assert!(sink.count(DebugColor::IncidentFace) >= 4);
    }

    #[test]
    fn test_capsule_lying_on_box() {
        let mut shape = Shape::capsule(0.25, 0.3, 1.0).unwrap();
        shape.provide_transformation(&Isometry3::from_parts(
            Translation3::new(0.0, 0.7, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        ));
        let Shape::Capsule(capsule) = shape else {
            unreachable!()
        };
        let cube = cube_at(0.0, 0.0, 0.0, UnitQuaternion::identity());

        let manifold = collide_capsule_hull(&capsule, &cube, None).unwrap();
        assert_eq!(manifold.len(), 2);
        for contact in manifold.points() {
            assert_relative_eq!(contact.normal, -Vector3::y(), epsilon = 1e-9);
            assert_relative_eq!(contact.depth, 0.05, epsilon = 1e-9);
            assert_relative_eq!(contact.point_b.y, 0.5, epsilon = 1e-9);
        }
    }
}
