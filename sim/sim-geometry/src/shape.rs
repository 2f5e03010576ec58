//! Collision shapes.
//!
//! A [`Shape`] owns immutable local geometry plus the mass properties
//! computed at construction. [`Shape::provide_transformation`] is the only
//! place absolute (world-space) geometry and the bounding box change; every
//! query afterwards reads the cached absolute state.
//!
//! All lengths are simulation units.

use nalgebra::{Isometry3, Point3, Vector3};
use sim_types::{MassProperties, Result, SimError};

use crate::hull::ConvexHull;
use crate::primitives::{closest_point_on_triangle, Aabb, Plane, Segment, GEOM_EPSILON};
use crate::ray::{ray_box, ray_capsule, ray_convex, ray_plane, ray_sphere, ray_triangle, RayHit};

/// Discriminant of a [`Shape`], used to index the collision dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeType {
    /// [`SphereShape`]
    Sphere = 0,
    /// [`BoxShape`]
    Box = 1,
    /// [`CapsuleShape`]
    Capsule = 2,
    /// [`ConvexShape`]
    Convex = 3,
    /// [`TriangleGeometry`]
    TriangleGeometry = 4,
    /// [`PlaneShape`]
    Plane = 5,
}

impl ShapeType {
    /// Number of shape types.
    pub const COUNT: usize = 6;

    /// Every shape type in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Sphere,
        Self::Box,
        Self::Capsule,
        Self::Convex,
        Self::TriangleGeometry,
        Self::Plane,
    ];

    /// Row/column of this type in a dispatch table.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sphere => "sphere",
            Self::Box => "box",
            Self::Capsule => "capsule",
            Self::Convex => "convex",
            Self::TriangleGeometry => "triangle geometry",
            Self::Plane => "plane",
        }
    }
}

impl std::fmt::Display for ShapeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn validate_mass(mass: f64) -> Result<()> {
    if mass.is_finite() && mass > 0.0 {
        Ok(())
    } else {
        Err(SimError::invalid_mass(format!(
            "shape mass must be positive and finite, got {mass}"
        )))
    }
}

fn validate_length(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::invalid_geometry(format!(
            "{what} must be positive and finite, got {value}"
        )))
    }
}

/// A solid sphere centered on the body origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereShape {
    radius: f64,
    mass_properties: MassProperties,
    transform: Isometry3<f64>,
    aabb: Aabb,
}

impl SphereShape {
    /// Create a sphere.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive radius or mass.
    pub fn new(radius: f64, mass: f64) -> Result<Self> {
        validate_length("sphere radius", radius)?;
        validate_mass(mass)?;
        Ok(Self {
            radius,
            mass_properties: MassProperties::sphere(mass, radius),
            transform: Isometry3::identity(),
            aabb: Aabb::from_center(Point3::origin(), Vector3::repeat(radius)),
        })
    }

    /// Radius.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// World-space center.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        Point3::from(self.transform.translation.vector)
    }

    fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        self.transform = *transform;
        self.aabb = Aabb::from_center(self.center(), Vector3::repeat(self.radius));
    }
}

/// An oriented box, backed by an 8-vertex, 6-polygon hull.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxShape {
    half_extents: Vector3<f64>,
    hull: ConvexHull,
    mass_properties: MassProperties,
    transform: Isometry3<f64>,
    aabb: Aabb,
}

impl BoxShape {
    /// Create a box from its half-extents.
    ///
    /// # Errors
    ///
    /// Returns an error for non-positive half-extents or mass.
    pub fn new(half_extents: Vector3<f64>, mass: f64) -> Result<Self> {
        validate_mass(mass)?;
        let hull = ConvexHull::cuboid(half_extents)?;
        let aabb = hull.aabb();
        Ok(Self {
            half_extents,
            hull,
            mass_properties: MassProperties::cuboid(mass, half_extents),
            transform: Isometry3::identity(),
            aabb,
        })
    }

    /// Half-extents along the local axes.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        self.half_extents
    }

    /// Backing hull (world-space after the last transformation).
    #[must_use]
    pub fn hull(&self) -> &ConvexHull {
        &self.hull
    }

    /// Current world transform.
    #[must_use]
    pub fn transform(&self) -> &Isometry3<f64> {
        &self.transform
    }

    /// Closest point inside (or on) the box to a world-space point, found by
    /// clamping in local space. Points inside map to themselves.
    #[must_use]
    pub fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let local = self.transform.inverse_transform_point(point);
        let clamped = Point3::new(
            local.x.clamp(-self.half_extents.x, self.half_extents.x),
            local.y.clamp(-self.half_extents.y, self.half_extents.y),
            local.z.clamp(-self.half_extents.z, self.half_extents.z),
        );
        self.transform * clamped
    }

    fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        self.transform = *transform;
        self.hull.provide_transformation(transform);
        self.aabb = self.hull.aabb();
    }
}

/// A capsule: a segment along the local Y axis swept by a sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct CapsuleShape {
    radius: f64,
    half_height: f64,
    hull: ConvexHull,
    segment: Segment,
    mass_properties: MassProperties,
    aabb: Aabb,
}

impl CapsuleShape {
    /// Create a capsule. `half_height` is half the length of the inner
    /// segment (caps excluded) and may be zero.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive radius or mass, or a negative
    /// half-height.
    pub fn new(radius: f64, half_height: f64, mass: f64) -> Result<Self> {
        validate_length("capsule radius", radius)?;
        if !(half_height.is_finite() && half_height >= 0.0) {
            return Err(SimError::invalid_geometry(format!(
                "capsule half-height must be non-negative and finite, got {half_height}"
            )));
        }
        validate_mass(mass)?;

        let top = Point3::new(0.0, half_height, 0.0);
        let bottom = Point3::new(0.0, -half_height, 0.0);
        let segment = Segment::new(bottom, top);
        Ok(Self {
            radius,
            half_height,
            hull: ConvexHull::segment(bottom, top),
            segment,
            mass_properties: MassProperties::capsule(mass, radius, half_height),
            aabb: segment.aabb().expanded(radius),
        })
    }

    /// Radius.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Half the length of the inner segment.
    #[must_use]
    pub fn half_height(&self) -> f64 {
        self.half_height
    }

    /// World-space inner segment (bottom to top).
    #[must_use]
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Degenerate two-point hull of the segment endpoints.
    #[must_use]
    pub fn hull(&self) -> &ConvexHull {
        &self.hull
    }

    fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        self.hull.provide_transformation(transform);
        let v = self.hull.vertices();
        self.segment = Segment::new(v[0], v[1]);
        self.aabb = self.segment.aabb().expanded(self.radius);
    }
}

/// A general convex hull.
///
/// The hull is re-centred on its volume centroid at construction, so the
/// shape's local origin (and the body pose) is the center of mass.
/// Absolute geometry is only rebuilt when the transform actually changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexShape {
    hull: ConvexHull,
    centroid: Vector3<f64>,
    mass_properties: MassProperties,
    transform: Isometry3<f64>,
    dirty: bool,
    aabb: Aabb,
}

impl ConvexShape {
    /// Wrap a hull as a solid of the given mass.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive mass or a hull without volume.
    pub fn new(mut hull: ConvexHull, mass: f64) -> Result<Self> {
        validate_mass(mass)?;
        let centroid = hull
            .volume_centroid()
            .ok_or_else(|| SimError::invalid_geometry("convex shape encloses no volume"))?
            .coords;
        hull.translate_local(&-centroid);
        let mass_properties = hull
            .mass_properties(mass)
            .ok_or_else(|| SimError::invalid_geometry("convex shape encloses no volume"))?;
        let aabb = hull.aabb();
        Ok(Self {
            hull,
            centroid,
            mass_properties,
            transform: Isometry3::identity(),
            dirty: true,
            aabb,
        })
    }

    /// Where the centroid sat in the frame the hull was built in. A body
    /// placed at `p` with rotation `r` puts that frame's origin at
    /// `p - r * centroid`.
    #[must_use]
    pub fn centroid(&self) -> Vector3<f64> {
        self.centroid
    }

    /// Hull (world-space after the last transformation).
    #[must_use]
    pub fn hull(&self) -> &ConvexHull {
        &self.hull
    }

    /// Whether absolute geometry has never been built.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        if !self.dirty && self.transform == *transform {
            return;
        }
        self.transform = *transform;
        self.hull.provide_transformation(transform);
        self.aabb = self.hull.aabb();
        self.dirty = false;
    }
}

/// An arbitrary (non-convex) triangle soup, each triangle a flat two-sided
/// hull.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleGeometry {
    hulls: Vec<ConvexHull>,
    triangle_aabbs: Vec<Aabb>,
    mass_properties: MassProperties,
    transform: Isometry3<f64>,
    dirty: bool,
    aabb: Aabb,
}

impl TriangleGeometry {
    /// Build from local-space triangles.
    ///
    /// Mass properties approximate the soup by its local bounding box.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty soup, a degenerate triangle, or a
    /// non-positive mass.
    pub fn new(triangles: &[[Point3<f64>; 3]], mass: f64) -> Result<Self> {
        validate_mass(mass)?;
        if triangles.is_empty() {
            return Err(SimError::invalid_geometry("empty triangle soup"));
        }

        let hulls = triangles
            .iter()
            .enumerate()
            .map(|(i, [a, b, c])| {
                ConvexHull::triangle(*a, *b, *c).map_err(|_| {
                    SimError::invalid_geometry(format!("triangle {i} has zero area"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let triangle_aabbs: Vec<Aabb> = hulls.iter().map(ConvexHull::aabb).collect();
        let aabb = merged(&triangle_aabbs);
        let half = aabb.half_extents().map(|h| h.max(GEOM_EPSILON));

        Ok(Self {
            hulls,
            triangle_aabbs,
            mass_properties: MassProperties::cuboid(mass, half),
            transform: Isometry3::identity(),
            dirty: true,
            aabb,
        })
    }

    /// Number of triangles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hulls.len()
    }

    /// Always `false`; construction rejects empty soups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hulls.is_empty()
    }

    /// Per-triangle hulls (world-space after the last transformation).
    #[must_use]
    pub fn hulls(&self) -> &[ConvexHull] {
        &self.hulls
    }

    /// World-space bounding box of one triangle.
    #[must_use]
    pub fn triangle_aabb(&self, index: usize) -> &Aabb {
        &self.triangle_aabbs[index]
    }

    /// World-space corners of one triangle.
    #[must_use]
    pub fn triangle(&self, index: usize) -> [Point3<f64>; 3] {
        let v = self.hulls[index].vertices();
        [v[0], v[1], v[2]]
    }

    /// Closest point on the soup to `point`, with the triangle it lies on.
    #[must_use]
    pub fn closest_point(&self, point: &Point3<f64>) -> (Point3<f64>, usize) {
        let mut best = (self.triangle(0)[0], 0);
        let mut best_dist = f64::INFINITY;
        for i in 0..self.hulls.len() {
            let [a, b, c] = self.triangle(i);
            let candidate = closest_point_on_triangle(point, &a, &b, &c);
            let dist = (candidate - point).norm_squared();
            if dist < best_dist {
                best_dist = dist;
                best = (candidate, i);
            }
        }
        best
    }

    fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        if !self.dirty && self.transform == *transform {
            return;
        }
        self.transform = *transform;
        for (hull, aabb) in self.hulls.iter_mut().zip(&mut self.triangle_aabbs) {
            hull.provide_transformation(transform);
            *aabb = hull.aabb();
        }
        self.aabb = merged(&self.triangle_aabbs);
        self.dirty = false;
    }
}

fn merged(aabbs: &[Aabb]) -> Aabb {
    aabbs
        .iter()
        .skip(1)
        .fold(aabbs[0], |acc, aabb| acc.merged(aabb))
}

/// An infinite half-space. The solid lies behind the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneShape {
    local: Plane,
    plane: Plane,
    mass_properties: MassProperties,
    aabb: Aabb,
}

impl PlaneShape {
    /// Extent of the bounding box along directions the plane spans.
    pub const AABB_EXTENT: f64 = 1e6;
    /// Thickness of the bounding box in front of an axis-aligned surface.
    pub const AABB_MARGIN: f64 = 0.01;

    /// Create a plane `dot(normal, x) = offset` in local space.
    ///
    /// # Errors
    ///
    /// Returns an error if `normal` has zero length.
    pub fn new(normal: Vector3<f64>, offset: f64) -> Result<Self> {
        if !offset.is_finite() {
            return Err(SimError::invalid_geometry("plane offset must be finite"));
        }
        let point = Point3::from(normal * offset);
        let local = Plane::from_point_normal(&point, &normal)
            .ok_or_else(|| SimError::invalid_geometry("plane normal has zero length"))?;
        let local = Plane::new(local.normal, offset);
        Ok(Self {
            local,
            plane: local,
            mass_properties: MassProperties::immovable(),
            aabb: Self::bounding_box(&local),
        })
    }

    /// World-space surface.
    #[must_use]
    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    /// Huge in every direction the plane spans; along an axis-aligned normal
    /// it ends a small margin in front of the surface.
    fn bounding_box(plane: &Plane) -> Aabb {
        let surface = Point3::from(plane.normal * plane.offset);
        let mut min = Point3::from(Vector3::repeat(-Self::AABB_EXTENT));
        let mut max = Point3::from(Vector3::repeat(Self::AABB_EXTENT));
        for i in 0..3 {
            if plane.normal[i] > 0.9 {
                max[i] = surface[i] + Self::AABB_MARGIN;
            } else if plane.normal[i] < -0.9 {
                min[i] = surface[i] - Self::AABB_MARGIN;
            }
        }
        Aabb::new(min, max)
    }

    fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        let normal = transform.rotation * self.local.normal;
        let point = transform * Point3::from(self.local.normal * self.local.offset);
        self.plane = Plane::new(normal, normal.dot(&point.coords));
        self.aabb = Self::bounding_box(&self.plane);
    }
}

/// A collision shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Sphere.
    Sphere(SphereShape),
    /// Oriented box.
    Box(BoxShape),
    /// Capsule along local Y.
    Capsule(CapsuleShape),
    /// General convex hull.
    Convex(ConvexShape),
    /// Triangle soup.
    TriangleGeometry(TriangleGeometry),
    /// Infinite half-space.
    Plane(PlaneShape),
}

impl Shape {
    /// Sphere of the given radius and mass.
    ///
    /// # Errors
    ///
    /// See [`SphereShape::new`].
    pub fn sphere(radius: f64, mass: f64) -> Result<Self> {
        SphereShape::new(radius, mass).map(Self::Sphere)
    }

    /// Box of the given half-extents and mass.
    ///
    /// # Errors
    ///
    /// See [`BoxShape::new`].
    pub fn cuboid(half_extents: Vector3<f64>, mass: f64) -> Result<Self> {
        BoxShape::new(half_extents, mass).map(Self::Box)
    }

    /// Capsule along local Y.
    ///
    /// # Errors
    ///
    /// See [`CapsuleShape::new`].
    pub fn capsule(radius: f64, half_height: f64, mass: f64) -> Result<Self> {
        CapsuleShape::new(radius, half_height, mass).map(Self::Capsule)
    }

    /// Convex hull solid.
    ///
    /// # Errors
    ///
    /// See [`ConvexShape::new`].
    pub fn convex(hull: ConvexHull, mass: f64) -> Result<Self> {
        ConvexShape::new(hull, mass).map(Self::Convex)
    }

    /// Triangle soup.
    ///
    /// # Errors
    ///
    /// See [`TriangleGeometry::new`].
    pub fn triangle_geometry(triangles: &[[Point3<f64>; 3]], mass: f64) -> Result<Self> {
        TriangleGeometry::new(triangles, mass).map(Self::TriangleGeometry)
    }

    /// Half-space `dot(normal, x) <= offset`.
    ///
    /// # Errors
    ///
    /// See [`PlaneShape::new`].
    pub fn plane(normal: Vector3<f64>, offset: f64) -> Result<Self> {
        PlaneShape::new(normal, offset).map(Self::Plane)
    }

    /// Discriminant.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Sphere(_) => ShapeType::Sphere,
            Self::Box(_) => ShapeType::Box,
            Self::Capsule(_) => ShapeType::Capsule,
            Self::Convex(_) => ShapeType::Convex,
            Self::TriangleGeometry(_) => ShapeType::TriangleGeometry,
            Self::Plane(_) => ShapeType::Plane,
        }
    }

    /// Mass and local inertia tensor.
    #[must_use]
    pub fn mass_properties(&self) -> &MassProperties {
        match self {
            Self::Sphere(s) => &s.mass_properties,
            Self::Box(s) => &s.mass_properties,
            Self::Capsule(s) => &s.mass_properties,
            Self::Convex(s) => &s.mass_properties,
            Self::TriangleGeometry(s) => &s.mass_properties,
            Self::Plane(s) => &s.mass_properties,
        }
    }

    /// World-space bounding box as of the last transformation.
    #[must_use]
    pub fn aabb(&self) -> &Aabb {
        match self {
            Self::Sphere(s) => &s.aabb,
            Self::Box(s) => &s.aabb,
            Self::Capsule(s) => &s.aabb,
            Self::Convex(s) => &s.aabb,
            Self::TriangleGeometry(s) => &s.aabb,
            Self::Plane(s) => &s.aabb,
        }
    }

    /// Recompute absolute geometry and bounding box for a new world
    /// transform.
    pub fn provide_transformation(&mut self, transform: &Isometry3<f64>) {
        match self {
            Self::Sphere(s) => s.provide_transformation(transform),
            Self::Box(s) => s.provide_transformation(transform),
            Self::Capsule(s) => s.provide_transformation(transform),
            Self::Convex(s) => s.provide_transformation(transform),
            Self::TriangleGeometry(s) => s.provide_transformation(transform),
            Self::Plane(s) => s.provide_transformation(transform),
        }
    }

    /// All crossings of `segment` with the shape surface, unsorted.
    #[must_use]
    pub fn test_ray(&self, segment: &Segment) -> Vec<RayHit> {
        let mut hits = Vec::new();
        match self {
            Self::Sphere(s) => ray_sphere(segment, &s.center(), s.radius, &mut hits),
            Self::Box(s) => ray_box(segment, &s.transform, &s.half_extents, &mut hits),
            Self::Capsule(s) => {
                ray_capsule(segment, &s.segment.start, &s.segment.end, s.radius, &mut hits);
            }
            Self::Convex(s) => ray_convex(segment, &s.hull, &mut hits),
            Self::TriangleGeometry(s) => {
                for i in 0..s.len() {
                    if s.triangle_aabbs[i].intersects_segment(segment) {
                        let [a, b, c] = s.triangle(i);
                        ray_triangle(segment, &a, &b, &c, &mut hits);
                    }
                }
            }
            Self::Plane(s) => ray_plane(segment, &s.plane, &mut hits),
        }
        hits
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn at(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::translation(x, y, z)
    }

    #[test]
    fn test_shape_type_table_order() {
        for (i, ty) in ShapeType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), i);
        }
        assert_eq!(ShapeType::TriangleGeometry.to_string(), "triangle geometry");
    }

    #[test]
    fn test_constructors_validate() {
        assert!(Shape::sphere(0.0, 1.0).is_err());
        assert!(Shape::sphere(1.0, 0.0).is_err());
        assert!(Shape::sphere(1.0, f64::INFINITY).is_err());
        assert!(Shape::cuboid(Vector3::new(1.0, -1.0, 1.0), 1.0).is_err());
        assert!(Shape::capsule(0.5, -0.1, 1.0).is_err());
        assert!(Shape::capsule(0.5, 0.0, 1.0).is_ok());
        assert!(Shape::plane(Vector3::zeros(), 0.0).is_err());
        assert!(Shape::triangle_geometry(&[], 1.0).is_err());

        let flat = ConvexHull::triangle(
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert!(Shape::convex(flat, 1.0).is_err());
    }

    #[test]
    fn test_sphere_aabb_follows_transform() {
        let mut shape = Shape::sphere(0.5, 1.0).unwrap();
        shape.provide_transformation(&at(1.0, 2.0, 3.0));
        assert_eq!(shape.shape_type(), ShapeType::Sphere);
        assert_relative_eq!(shape.aabb().min, Point3::new(0.5, 1.5, 2.5));
        assert_relative_eq!(shape.aabb().max, Point3::new(1.5, 2.5, 3.5));
    }

    #[test]
    fn test_box_closest_point() {
        let mut b = BoxShape::new(Vector3::new(1.0, 0.5, 0.5), 1.0).unwrap();
        b.provide_transformation(&Isometry3::from_parts(
            Translation3::new(0.0, 1.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        ));

        // After a quarter turn about Z the long axis points along Y.
        let p = b.closest_point(&Point3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 2.0, 0.0), epsilon = 1e-12);

        let inside = Point3::new(0.1, 1.2, 0.0);
        assert_relative_eq!(b.closest_point(&inside), inside, epsilon = 1e-12);
    }

    #[test]
    fn test_capsule_segment_rotates() {
        let mut shape = Shape::capsule(0.5, 1.0, 1.0).unwrap();
        shape.provide_transformation(&Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(std::f64::consts::FRAC_PI_2, 0.0, 0.0),
        ));
        let Shape::Capsule(capsule) = &shape else {
            panic!("not a capsule");
        };

        // Rolling a quarter turn about X lays the Y axis along Z.
        let seg = capsule.segment();
        assert_relative_eq!(seg.direction().normalize().z.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(shape.aabb().max.z, 1.5, epsilon = 1e-12);
        assert_relative_eq!(shape.aabb().max.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_convex_rebuilds_only_on_change() {
        let hull = ConvexHull::cuboid(Vector3::repeat(0.5)).unwrap();
        let mut convex = ConvexShape::new(hull, 2.0).unwrap();
        assert!(convex.is_dirty());

        convex.provide_transformation(&at(3.0, 0.0, 0.0));
        assert!(!convex.is_dirty());
        assert_relative_eq!(convex.hull().center().x, 3.0, epsilon = 1e-12);

        convex.provide_transformation(&at(3.0, 0.0, 0.0));
        assert_relative_eq!(convex.aabb.min.x, 2.5, epsilon = 1e-12);

        convex.provide_transformation(&at(-1.0, 0.0, 0.0));
        assert_relative_eq!(convex.aabb.max.x, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_convex_is_recentred_on_centroid() {
        let corner = ConvexHull::tetrahedron(
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        )
        .unwrap();
        let mut convex = ConvexShape::new(corner, 1.0).unwrap();
        assert_relative_eq!(convex.centroid(), Vector3::repeat(0.25), epsilon = 1e-12);
        assert_relative_eq!(
            convex.hull().volume_centroid().unwrap(),
            Point3::origin(),
            epsilon = 1e-12
        );

        convex.provide_transformation(&at(2.0, 0.0, 0.0));
        assert_relative_eq!(convex.hull().vertices()[0], Point3::new(1.75, -0.25, -0.25), epsilon = 1e-12);
    }

    #[test]
    fn test_plane_aabb_is_thin_in_front() {
        let mut shape = Shape::plane(Vector3::new(0.0, 2.0, 0.0), 0.0).unwrap();
        shape.provide_transformation(&at(0.0, 1.0, 0.0));

        let Shape::Plane(plane) = &shape else {
            panic!("not a plane");
        };
        assert_relative_eq!(plane.plane().offset, 1.0, epsilon = 1e-12);
        assert_relative_eq!(shape.aabb().max.y, 1.01, epsilon = 1e-12);
        assert_relative_eq!(shape.aabb().min.y, -PlaneShape::AABB_EXTENT);
        assert!(shape.mass_properties().mass.is_infinite());
    }

    #[test]
    fn test_triangle_geometry_queries() {
        let floor = [
            [
                Point3::new(-1.0, 0.0, -1.0),
                Point3::new(1.0, 0.0, 1.0),
                Point3::new(1.0, 0.0, -1.0),
            ],
            [
                Point3::new(-1.0, 0.0, -1.0),
                Point3::new(-1.0, 0.0, 1.0),
                Point3::new(1.0, 0.0, 1.0),
            ],
        ];
        let mut shape = Shape::triangle_geometry(&floor, 10.0).unwrap();
        shape.provide_transformation(&at(0.0, -1.0, 0.0));

        let Shape::TriangleGeometry(soup) = &shape else {
            panic!("not triangle geometry");
        };
        assert_eq!(soup.len(), 2);
        let (closest, _) = soup.closest_point(&Point3::new(0.3, 4.0, -0.2));
        assert_relative_eq!(closest, Point3::new(0.3, -1.0, -0.2), epsilon = 1e-12);

        let ray = Segment::new(Point3::new(0.5, 3.0, -0.3), Point3::new(0.5, -3.0, -0.3));
        let hits = shape.test_ray(&ray);
        assert_eq!(hits.len(), 1);
        assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_dispatch() {
        let mut shape = Shape::cuboid(Vector3::repeat(0.5), 1.0).unwrap();
        shape.provide_transformation(&at(0.0, 0.0, 2.0));
        let ray = Segment::new(Point3::origin(), Point3::new(0.0, 0.0, 10.0));

        let mut distances: Vec<f64> = shape.test_ray(&ray).iter().map(|h| h.distance).collect();
        distances.sort_by(f64::total_cmp);
        assert_eq!(distances.len(), 2);
        assert_relative_eq!(distances[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(distances[1], 2.5, epsilon = 1e-12);
    }
}
