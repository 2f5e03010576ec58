//! Convex hulls with a winged edge list and SAT queries.
//!
//! A hull keeps two index-parallel vertex arrays: the local geometry it was
//! built from and an absolute (world-space) copy refreshed by
//! [`ConvexHull::provide_transformation`]. Polygons and edges are fixed after
//! construction. Every physical edge is stored twice, once per adjacent
//! polygon, and each copy knows its twin; the edge query uses the two
//! adjacent face normals to cull edge pairs that cannot form a face of the
//! Minkowski difference.
//!
//! # Example
//!
//! ```
//! use sim_geometry::ConvexHull;
//! use nalgebra::{Isometry3, Vector3};
//!
//! let a = ConvexHull::cuboid(Vector3::repeat(0.5)).unwrap();
//! let mut b = a.clone();
//! b.provide_transformation(&Isometry3::translation(2.0, 0.0, 0.0));
//!
//! // One unit of empty space between the two cubes.
//! let query = a.query_face_direction(&b);
//! assert!((query.separation - 1.0).abs() < 1e-9);
//! ```

use hashbrown::HashMap;
use nalgebra::{Isometry3, Matrix3, Point3, Vector3};
use sim_types::{MassProperties, Result, SimError};
use smallvec::SmallVec;

use crate::primitives::{closest_point_on_triangle, Aabb, Plane, GEOM_EPSILON};

/// Maximum number of vertices in one hull polygon.
pub const MAX_POLYGON_VERTICES: usize = 7;

/// How far (in length units) a vertex may sit in front of one of its hull's
/// face planes before the hull counts as non-convex.
pub const CONVEXITY_TOLERANCE: f64 = 1e-6;

/// Relative length below which the cross product of two edge directions is
/// treated as "parallel edges, no valid axis".
pub const EDGE_PARALLEL_TOLERANCE: f64 = 0.05;

/// Vertex indices of one polygon, counter-clockwise seen from outside.
pub type PolygonIndices = SmallVec<[usize; MAX_POLYGON_VERTICES]>;

/// A planar face of a hull.
#[derive(Debug, Clone, PartialEq)]
pub struct HullPolygon {
    /// Vertex indices, counter-clockwise seen from outside the hull.
    pub indices: PolygonIndices,
    /// Outward unit normal in local space.
    pub local_normal: Vector3<f64>,
    /// Outward unit normal in world space.
    pub normal: Vector3<f64>,
}

/// A directed edge owned by one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HullEdge {
    /// Start vertex index.
    pub from: usize,
    /// End vertex index.
    pub to: usize,
    /// Polygon that owns this directed edge.
    pub polygon: usize,
    /// Index of the oppositely directed copy owned by the adjacent polygon.
    pub twin: usize,
}

/// Result of a face-direction query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceQuery {
    /// Polygon of the querying hull with the largest separation.
    pub polygon: usize,
    /// Signed separation along that polygon's normal; positive means a gap.
    pub separation: f64,
}

impl FaceQuery {
    fn none() -> Self {
        Self {
            polygon: 0,
            separation: f64::NEG_INFINITY,
        }
    }

    /// Whether the query found any candidate face.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.separation > f64::NEG_INFINITY
    }
}

/// Result of an edge-direction query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeQuery {
    /// Edge of the querying hull.
    pub edge_a: usize,
    /// Edge of the foreign hull.
    pub edge_b: usize,
    /// Unit separating axis, pointing away from the querying hull.
    pub axis: Vector3<f64>,
    /// Signed separation along `axis`; positive means a gap.
    pub separation: f64,
}

impl EdgeQuery {
    fn none() -> Self {
        Self {
            edge_a: 0,
            edge_b: 0,
            axis: Vector3::zeros(),
            separation: f64::NEG_INFINITY,
        }
    }

    /// Whether the query found any valid edge pair.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.separation > f64::NEG_INFINITY
    }
}

/// A convex polyhedron with cached world-space geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    local_vertices: Vec<Point3<f64>>,
    vertices: Vec<Point3<f64>>,
    polygons: Vec<HullPolygon>,
    edges: Vec<HullEdge>,
    local_center: Point3<f64>,
    center: Point3<f64>,
}

impl ConvexHull {
    /// Build a hull from vertices and polygons.
    ///
    /// Polygons must have 3 to [`MAX_POLYGON_VERTICES`] vertices. Windings
    /// pointing into the solid are flipped; the polygons must close the
    /// surface (every edge shared by exactly two polygons) and the result
    /// must pass [`ConvexHull::check_convexity`].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidGeometry`] for malformed input and
    /// [`SimError::NonConvexHull`] for concave input.
    pub fn new<P: AsRef<[usize]>>(
        vertices: Vec<Point3<f64>>,
        polygons: impl IntoIterator<Item = P>,
    ) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(SimError::invalid_geometry(
                "a hull needs at least 3 vertices",
            ));
        }
        if vertices
            .iter()
            .any(|v| !v.coords.iter().all(|x| x.is_finite()))
        {
            return Err(SimError::invalid_geometry("hull vertex is not finite"));
        }

        let local_center = centroid(vertices.iter());
        let mut built = Vec::new();

        for (p, polygon) in polygons.into_iter().enumerate() {
            let polygon = polygon.as_ref();
            if polygon.len() < 3 || polygon.len() > MAX_POLYGON_VERTICES {
                return Err(SimError::invalid_geometry(format!(
                    "polygon {p} has {} vertices (expected 3 to {MAX_POLYGON_VERTICES})",
                    polygon.len()
                )));
            }
            if let Some(&bad) = polygon.iter().find(|&&i| i >= vertices.len()) {
                return Err(SimError::invalid_geometry(format!(
                    "polygon {p} references vertex {bad} of {}",
                    vertices.len()
                )));
            }

            let mut indices: PolygonIndices = polygon.iter().copied().collect();
            let mut normal = newell_normal(&vertices, &indices).ok_or_else(|| {
                SimError::invalid_geometry(format!("polygon {p} has zero area"))
            })?;

            let face_center = centroid(indices.iter().map(|&i| &vertices[i]));
            if normal.dot(&(face_center - local_center)) < -CONVEXITY_TOLERANCE {
                indices.reverse();
                normal = -normal;
            }

            built.push(HullPolygon {
                indices,
                local_normal: normal,
                normal,
            });
        }

        if built.is_empty() {
            return Err(SimError::invalid_geometry(
                "a hull needs at least one polygon",
            ));
        }

        let edges = build_edges(&built)?;
        let hull = Self {
            vertices: vertices.clone(),
            local_vertices: vertices,
            polygons: built,
            edges,
            local_center,
            center: local_center,
        };
        hull.check_convexity()?;
        Ok(hull)
    }

    /// A degenerate two-vertex hull (a segment) with no polygons or edges.
    ///
    /// It only serves as a support-point source for face queries run by
    /// other hulls against it; its own queries report no candidate.
    #[must_use]
    pub fn segment(a: Point3<f64>, b: Point3<f64>) -> Self {
        let local_vertices = vec![a, b];
        let local_center = nalgebra::center(&a, &b);
        Self {
            vertices: local_vertices.clone(),
            local_vertices,
            polygons: Vec::new(),
            edges: Vec::new(),
            local_center,
            center: local_center,
        }
    }

    /// Axis-aligned box centered on the origin.
    ///
    /// # Errors
    ///
    /// Returns an error if any half-extent is not positive and finite.
    pub fn cuboid(half_extents: Vector3<f64>) -> Result<Self> {
        if half_extents.iter().any(|&h| !(h > 0.0 && h.is_finite())) {
            return Err(SimError::invalid_geometry(
                "box half-extents must be positive and finite",
            ));
        }
        let (x, y, z) = (half_extents.x, half_extents.y, half_extents.z);
        let vertices = vec![
            Point3::new(-x, -y, -z),
            Point3::new(x, -y, -z),
            Point3::new(x, y, -z),
            Point3::new(-x, y, -z),
            Point3::new(-x, -y, z),
            Point3::new(x, -y, z),
            Point3::new(x, y, z),
            Point3::new(-x, y, z),
        ];
        let polygons: [[usize; 4]; 6] = [
            [4, 5, 6, 7], // +Z
            [0, 3, 2, 1], // -Z
            [1, 2, 6, 5], // +X
            [0, 4, 7, 3], // -X
            [3, 7, 6, 2], // +Y
            [0, 1, 5, 4], // -Y
        ];
        Self::new(vertices, polygons)
    }

    /// A flat, two-sided triangle: one polygon per side.
    ///
    /// # Errors
    ///
    /// Returns an error if the triangle has zero area.
    pub fn triangle(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Result<Self> {
        Self::new(vec![a, b, c], [[0, 1, 2], [0, 2, 1]])
    }

    /// A tetrahedron from four points in any order.
    ///
    /// # Errors
    ///
    /// Returns an error if the points are coplanar.
    pub fn tetrahedron(
        a: Point3<f64>,
        b: Point3<f64>,
        c: Point3<f64>,
        d: Point3<f64>,
    ) -> Result<Self> {
        let volume = (b - a).cross(&(c - a)).dot(&(d - a));
        if volume.abs() < GEOM_EPSILON {
            return Err(SimError::invalid_geometry(
                "tetrahedron vertices are coplanar",
            ));
        }
        Self::new(
            vec![a, b, c, d],
            [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]],
        )
    }

    /// Verify that no vertex lies in front of any polygon plane by more than
    /// [`CONVEXITY_TOLERANCE`].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NonConvexHull`] naming the first violation.
    pub fn check_convexity(&self) -> Result<()> {
        for (p, polygon) in self.polygons.iter().enumerate() {
            let origin = self.local_vertices[polygon.indices[0]];
            for (v, vertex) in self.local_vertices.iter().enumerate() {
                let distance = polygon.local_normal.dot(&(vertex - origin));
                if distance > CONVEXITY_TOLERANCE {
                    return Err(SimError::NonConvexHull {
                        polygon: p,
                        vertex: v,
                        distance,
                    });
                }
            }
        }
        Ok(())
    }

    /// Recompute the world-space vertices, normals and center.
    pub fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        for (world, local) in self.vertices.iter_mut().zip(&self.local_vertices) {
            *world = transform * local;
        }
        for polygon in &mut self.polygons {
            polygon.normal = transform.rotation * polygon.local_normal;
        }
        self.center = transform * self.local_center;
    }

    /// World-space vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Local-space vertices.
    #[must_use]
    pub fn local_vertices(&self) -> &[Point3<f64>] {
        &self.local_vertices
    }

    /// Polygons.
    #[must_use]
    pub fn polygons(&self) -> &[HullPolygon] {
        &self.polygons
    }

    /// Directed edges (each physical edge twice).
    #[must_use]
    pub fn edges(&self) -> &[HullEdge] {
        &self.edges
    }

    /// World-space vertex centroid.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    /// World-space plane of a polygon.
    #[must_use]
    pub fn polygon_plane(&self, polygon: usize) -> Plane {
        let face = &self.polygons[polygon];
        let origin = self.vertices[face.indices[0]];
        Plane::new(face.normal, face.normal.dot(&origin.coords))
    }

    /// World-space vertices of a polygon, in winding order.
    #[must_use]
    pub fn polygon_points(&self, polygon: usize) -> SmallVec<[Point3<f64>; MAX_POLYGON_VERTICES]> {
        self.polygons[polygon]
            .indices
            .iter()
            .map(|&i| self.vertices[i])
            .collect()
    }

    /// World-space endpoints of a directed edge.
    #[must_use]
    pub fn edge_points(&self, edge: usize) -> (Point3<f64>, Point3<f64>) {
        let e = &self.edges[edge];
        (self.vertices[e.from], self.vertices[e.to])
    }

    /// World-space normals of the owning polygon and of the twin's polygon.
    #[must_use]
    pub fn edge_normals(&self, edge: usize) -> (Vector3<f64>, Vector3<f64>) {
        let e = &self.edges[edge];
        let twin = &self.edges[e.twin];
        (
            self.polygons[e.polygon].normal,
            self.polygons[twin.polygon].normal,
        )
    }

    /// Index of the vertex with the largest projection onto `direction`.
    #[must_use]
    pub fn support_index(&self, direction: &Vector3<f64>) -> usize {
        let mut best = 0;
        let mut best_dot = f64::NEG_INFINITY;
        for (i, v) in self.vertices.iter().enumerate() {
            let d = direction.dot(&v.coords);
            if d > best_dot {
                best_dot = d;
                best = i;
            }
        }
        best
    }

    /// World-space vertex furthest along `direction`.
    #[must_use]
    pub fn find_furthest_point(&self, direction: &Vector3<f64>) -> Point3<f64> {
        self.vertices[self.support_index(direction)]
    }

    /// Bounding box of the world-space vertices.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.vertices).unwrap_or(Aabb::new(self.center, self.center))
    }

    /// Face query: for every polygon of `self`, the signed distance from its
    /// plane to the deepest point of `other`. Returns the maximum.
    #[must_use]
    pub fn query_face_direction(&self, other: &Self) -> FaceQuery {
        let mut best = FaceQuery::none();
        for (p, polygon) in self.polygons.iter().enumerate() {
            let support = other.find_furthest_point(&-polygon.normal);
            let origin = self.vertices[polygon.indices[0]];
            let separation = polygon.normal.dot(&(support - origin));
            if separation > best.separation {
                best = FaceQuery {
                    polygon: p,
                    separation,
                };
            }
        }
        best
    }

    /// Edge query: for every pair of edges that builds a face of the
    /// Minkowski difference, the separation along their cross product
    /// (oriented away from `self`). Returns the maximum.
    ///
    /// Near-parallel edge pairs are skipped.
    #[must_use]
    pub fn query_edge_direction(&self, other: &Self) -> EdgeQuery {
        let mut best = EdgeQuery::none();

        for (i, edge_a) in self.edges.iter().enumerate() {
            if edge_a.twin < i {
                continue;
            }
            let (p1, q1) = self.edge_points(i);
            let e1 = q1 - p1;
            let (u1, v1) = self.edge_normals(i);

            for (j, edge_b) in other.edges.iter().enumerate() {
                if edge_b.twin < j {
                    continue;
                }
                let (p2, q2) = other.edge_points(j);
                let e2 = q2 - p2;
                let (u2, v2) = other.edge_normals(j);

                if !is_minkowski_face(&u1, &v1, &-e1, &-u2, &-v2, &-e2) {
                    continue;
                }

                let Some((axis, separation)) = edge_separation(&p1, &e1, &p2, &e2, &self.center)
                else {
                    continue;
                };
                if separation > best.separation {
                    best = EdgeQuery {
                        edge_a: i,
                        edge_b: j,
                        axis,
                        separation,
                    };
                }
            }
        }
        best
    }

    /// Whether a world-space point is inside (or on) the hull.
    #[must_use]
    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        !self.polygons.is_empty()
            && (0..self.polygons.len())
                .all(|p| self.polygon_plane(p).signed_distance(point) <= 0.0)
    }

    /// Polygon whose plane is nearest in front of `point` (largest signed
    /// distance) and that distance.
    #[must_use]
    pub fn nearest_face(&self, point: &Point3<f64>) -> (usize, f64) {
        let mut best = (0, f64::NEG_INFINITY);
        for p in 0..self.polygons.len() {
            let distance = self.polygon_plane(p).signed_distance(point);
            if distance > best.1 {
                best = (p, distance);
            }
        }
        best
    }

    /// Closest point to `point` on the hull surface.
    #[must_use]
    pub fn closest_surface_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let mut best = self.vertices[0];
        let mut best_dist = f64::INFINITY;
        for polygon in &self.polygons {
            let a = self.vertices[polygon.indices[0]];
            for k in 1..polygon.indices.len() - 1 {
                let b = self.vertices[polygon.indices[k]];
                let c = self.vertices[polygon.indices[k + 1]];
                let candidate = closest_point_on_triangle(point, &a, &b, &c);
                let dist = (candidate - point).norm_squared();
                if dist < best_dist {
                    best_dist = dist;
                    best = candidate;
                }
            }
        }
        best
    }

    /// Enclosed volume of the local geometry.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.fan_tetrahedra()
            .map(|m| m.determinant() / 6.0)
            .sum()
    }

    /// Centroid of the enclosed solid in local space. `None` if the hull
    /// encloses no volume.
    #[must_use]
    pub fn volume_centroid(&self) -> Option<Point3<f64>> {
        let mut volume = 0.0;
        let mut moment = Vector3::zeros();
        for m in self.fan_tetrahedra() {
            let v = m.determinant() / 6.0;
            volume += v;
            // The fan apex is the origin, so each centroid is (a + b + c) / 4.
            moment += (m.column(0) + m.column(1) + m.column(2)) * (v / 4.0);
        }
        (volume > GEOM_EPSILON).then(|| Point3::from(moment / volume))
    }

    /// Mass and inertia of the solid hull with uniform density, about its
    /// volume centroid. `None` if the hull encloses no volume.
    #[must_use]
    pub fn mass_properties(&self, mass: f64) -> Option<MassProperties> {
        let canonical = Matrix3::new(2.0, 1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0, 2.0) / 120.0;

        let mut volume = 0.0;
        let mut covariance = Matrix3::zeros();
        for m in self.fan_tetrahedra() {
            let det = m.determinant();
            volume += det / 6.0;
            covariance += m * canonical * m.transpose() * det;
        }
        if volume <= GEOM_EPSILON {
            return None;
        }
        let centroid = self.volume_centroid()?.coords;

        // Second moment about the origin, then shifted to the centroid.
        covariance *= mass / volume;
        covariance -= centroid * centroid.transpose() * mass;
        let inertia = Matrix3::identity() * covariance.trace() - covariance;
        Some(MassProperties::new(mass, inertia))
    }

    /// Move the local geometry by `offset`. World-space copies are reset to
    /// the new local geometry until the next transformation.
    pub fn translate_local(&mut self, offset: &Vector3<f64>) {
        for vertex in &mut self.local_vertices {
            *vertex += offset;
        }
        self.local_center += offset;
        self.provide_transformation(&Isometry3::identity());
    }

    /// Columns are the three non-origin corners of each tetrahedron in a fan
    /// decomposition of the local surface against the local origin.
    fn fan_tetrahedra(&self) -> impl Iterator<Item = Matrix3<f64>> + '_ {
        self.polygons.iter().flat_map(move |polygon| {
            let a = self.local_vertices[polygon.indices[0]].coords;
            (1..polygon.indices.len() - 1).map(move |k| {
                let b = self.local_vertices[polygon.indices[k]].coords;
                let c = self.local_vertices[polygon.indices[k + 1]].coords;
                Matrix3::from_columns(&[a, b, c])
            })
        })
    }
}

/// Arc-intersection test on the Gauss map: do the arcs `a`-`b` and `c`-`d`
/// (with precomputed plane normals `b_x_a` and `d_x_c`) cross?
fn is_minkowski_face(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    b_x_a: &Vector3<f64>,
    c: &Vector3<f64>,
    d: &Vector3<f64>,
    d_x_c: &Vector3<f64>,
) -> bool {
    let cba = c.dot(b_x_a);
    let dba = d.dot(b_x_a);
    let adc = a.dot(d_x_c);
    let bdc = b.dot(d_x_c);

    cba * dba < 0.0 && adc * bdc < 0.0 && cba * bdc > 0.0
}

fn edge_separation(
    p1: &Point3<f64>,
    e1: &Vector3<f64>,
    p2: &Point3<f64>,
    e2: &Vector3<f64>,
    center: &Point3<f64>,
) -> Option<(Vector3<f64>, f64)> {
    let cross = e1.cross(e2);
    let limit = EDGE_PARALLEL_TOLERANCE * (e1.norm_squared() * e2.norm_squared()).sqrt();
    if cross.norm() < limit {
        return None;
    }

    let mut axis = cross.normalize();
    if axis.dot(&(p1 - center)) < 0.0 {
        axis = -axis;
    }
    Some((axis, axis.dot(&(p2 - p1))))
}

fn newell_normal(vertices: &[Point3<f64>], indices: &[usize]) -> Option<Vector3<f64>> {
    let mut n = Vector3::zeros();
    for k in 0..indices.len() {
        let cur = vertices[indices[k]];
        let next = vertices[indices[(k + 1) % indices.len()]];
        n.x += (cur.y - next.y) * (cur.z + next.z);
        n.y += (cur.z - next.z) * (cur.x + next.x);
        n.z += (cur.x - next.x) * (cur.y + next.y);
    }
    n.try_normalize(GEOM_EPSILON)
}

#[allow(clippy::cast_precision_loss)]
fn centroid<'a>(points: impl Iterator<Item = &'a Point3<f64>>) -> Point3<f64> {
    let (sum, count) = points.fold((Vector3::zeros(), 0usize), |(sum, count), p| {
        (sum + p.coords, count + 1)
    });
    if count == 0 {
        Point3::origin()
    } else {
        Point3::from(sum / count as f64)
    }
}

fn build_edges(polygons: &[HullPolygon]) -> Result<Vec<HullEdge>> {
    let mut edges = Vec::new();
    let mut lookup: HashMap<(usize, usize), usize> = HashMap::new();

    for (p, polygon) in polygons.iter().enumerate() {
        let n = polygon.indices.len();
        for k in 0..n {
            let from = polygon.indices[k];
            let to = polygon.indices[(k + 1) % n];
            if lookup.insert((from, to), edges.len()).is_some() {
                return Err(SimError::invalid_geometry(format!(
                    "edge {from}->{to} is used twice with the same direction"
                )));
            }
            edges.push(HullEdge {
                from,
                to,
                polygon: p,
                twin: usize::MAX,
            });
        }
    }

    for i in 0..edges.len() {
        let HullEdge { from, to, .. } = edges[i];
        let twin = lookup.get(&(to, from)).copied().ok_or_else(|| {
            SimError::invalid_geometry(format!(
                "edge {from}->{to} has no twin, the hull is not closed"
            ))
        })?;
        edges[i].twin = twin;
    }

    Ok(edges)
}
