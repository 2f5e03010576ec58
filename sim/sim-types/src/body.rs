//! Rigid body state types.
//!
//! Handles, poses, velocities and mass properties shared by every crate of
//! the physics core.

use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

slotmap::new_key_type! {
    /// Generation-checked handle to a body stored in the world arena.
    ///
    /// A handle whose body has been removed never aliases a newer body, so
    /// cross-references held by other bodies stay safe to look up.
    pub struct BodyHandle;
}

impl std::fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({:?})", slotmap::Key::data(self))
    }
}

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create an identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Convert to an isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.rotation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Scale the position by `factor`, leaving the rotation untouched.
    ///
    /// Used to move between owner units and simulation units.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            position: Point3::from(self.position.coords * factor),
            rotation: self.rotation,
        }
    }

    /// Whether two poses differ by more than `tolerance` in position or in
    /// rotation angle.
    #[must_use]
    pub fn differs_from(&self, other: &Self, tolerance: f64) -> bool {
        (self.position - other.position).norm() > tolerance
            || self.rotation.angle_to(&other.rotation) > tolerance
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity in world coordinates (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Create a twist with specified linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Create a zero twist (at rest).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Kinetic energy given mass and world-space inertia tensor.
    #[must_use]
    pub fn kinetic_energy(&self, mass: f64, inertia: &Matrix3<f64>) -> f64 {
        let linear_ke = 0.5 * mass * self.linear.norm_squared();
        let angular_ke = 0.5 * self.angular.dot(&(inertia * self.angular));
        linear_ke + angular_ke
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Mass and local-space inertia tensor of a shape.
///
/// The inertia is expressed about the shape's local origin, which is also the
/// body's center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass in kg. `f64::INFINITY` marks shapes that can never move.
    pub mass: f64,
    /// Inertia tensor in local coordinates (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Create mass properties with given values.
    #[must_use]
    pub const fn new(mass: f64, inertia: Matrix3<f64>) -> Self {
        Self { mass, inertia }
    }

    /// Mass properties of something that can never move (infinite planes).
    #[must_use]
    pub fn immovable() -> Self {
        Self {
            mass: f64::INFINITY,
            inertia: Matrix3::zeros(),
        }
    }

    /// Uniform solid sphere: I = (2/5) * m * r²
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            inertia: Matrix3::from_diagonal(&Vector3::new(i, i, i)),
        }
    }

    /// Uniform solid box with the given half-extents.
    ///
    /// - Ixx = (1/12) * m * (y² + z²)
    /// - Iyy = (1/12) * m * (x² + z²)
    /// - Izz = (1/12) * m * (x² + y²)
    #[must_use]
    pub fn cuboid(mass: f64, half_extents: Vector3<f64>) -> Self {
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;

        let ixx = mass * (y2 + z2) / 12.0;
        let iyy = mass * (x2 + z2) / 12.0;
        let izz = mass * (x2 + y2) / 12.0;

        Self {
            mass,
            inertia: Matrix3::from_diagonal(&Vector3::new(ixx, iyy, izz)),
        }
    }

    /// Uniform solid capsule aligned with the local Y axis.
    ///
    /// The mass is split between the cylinder and the two hemispherical caps
    /// in proportion to their volumes; each cap contributes its own inertia
    /// plus the parallel-axis term for its offset from the center.
    #[must_use]
    pub fn capsule(mass: f64, radius: f64, half_height: f64) -> Self {
        let r2 = radius * radius;
        let h = 2.0 * half_height;

        let cylinder_volume = std::f64::consts::PI * r2 * h;
        let caps_volume = 4.0 / 3.0 * std::f64::consts::PI * r2 * radius;
        let total = cylinder_volume + caps_volume;
        if total <= 0.0 {
            return Self::sphere(mass, 0.0);
        }
        let m_cyl = mass * cylinder_volume / total;
        let m_caps = mass * caps_volume / total;

        let axial = m_cyl * r2 * 0.5 + m_caps * 0.4 * r2;
        let lateral = m_cyl * (h * h / 12.0 + r2 * 0.25)
            + m_caps * (0.4 * r2 + h * h * 0.25 + 3.0 * h * radius / 8.0);

        Self {
            mass,
            inertia: Matrix3::from_diagonal(&Vector3::new(lateral, axial, lateral)),
        }
    }

    /// Get the inverse mass (0 if mass is infinite or non-positive).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.mass <= 0.0 || self.mass.is_infinite() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Get the local inverse inertia tensor, `None` if singular.
    #[must_use]
    pub fn inverse_inertia(&self) -> Option<Matrix3<f64>> {
        self.inertia.try_inverse()
    }

    /// Validate that the mass properties can back a dynamic body.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.mass.is_finite() {
            return Err(crate::SimError::invalid_mass("mass must be finite"));
        }
        if self.mass <= 0.0 {
            return Err(crate::SimError::invalid_mass("mass must be positive"));
        }

        let eigenvalues = self.inertia.symmetric_eigenvalues();
        if eigenvalues.iter().any(|&e| e <= 0.0 || !e.is_finite()) {
            return Err(crate::SimError::invalid_mass(
                "inertia tensor must be positive definite",
            ));
        }

        Ok(())
    }
}

/// Rotate a local inverse inertia tensor into world space: R * I⁻¹ * Rᵀ.
#[must_use]
pub fn world_inverse_inertia(
    local_inverse: &Matrix3<f64>,
    rotation: &UnitQuaternion<f64>,
) -> Matrix3<f64> {
    let r = rotation.to_rotation_matrix();
    r.matrix() * local_inverse * r.matrix().transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    #[test]
    fn test_body_handle_generations() {
        let mut arena: SlotMap<BodyHandle, u32> = SlotMap::with_key();
        let first = arena.insert(1);
        arena.remove(first);
        let second = arena.insert(2);

        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert!(second.to_string().starts_with("Body("));
    }

    #[test]
    fn test_pose_scaled() {
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let scaled = pose.scaled(2.0);

        assert_relative_eq!(scaled.position.coords, Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(scaled.rotation, pose.rotation);
    }

    #[test]
    fn test_pose_differs_from() {
        let a = Pose::from_position(Point3::new(0.0, 0.0, 0.0));
        let b = Pose::from_position(Point3::new(0.0, 1e-9, 0.0));
        let c = Pose::from_position(Point3::new(0.0, 0.5, 0.0));

        assert!(!a.differs_from(&b, 1e-6));
        assert!(a.differs_from(&c, 1e-6));
    }

    #[test]
    fn test_twist_kinetic_energy() {
        let twist = Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
        let ke = twist.kinetic_energy(2.0, &Matrix3::identity());
        assert_relative_eq!(ke, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_mass_properties_sphere() {
        let props = MassProperties::sphere(1.0, 1.0);
        assert_relative_eq!(props.inertia[(0, 0)], 0.4, epsilon = 1e-10);
        assert_relative_eq!(props.inertia[(2, 2)], 0.4, epsilon = 1e-10);
    }

    #[test]
    fn test_mass_properties_cuboid() {
        let props = MassProperties::cuboid(12.0, Vector3::new(0.5, 0.5, 0.5));
        // (1/12) * 12 * (1 + 1) = 2
        assert_relative_eq!(props.inertia[(0, 0)], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_capsule_degenerates_to_sphere() {
        let capsule = MassProperties::capsule(3.0, 0.5, 0.0);
        let sphere = MassProperties::sphere(3.0, 0.5);
        assert_relative_eq!(capsule.inertia, sphere.inertia, epsilon = 1e-10);
    }

    #[test]
    fn test_capsule_is_longer_than_wide() {
        let capsule = MassProperties::capsule(1.0, 0.25, 1.0);
        // Spinning about the long axis is easier than tumbling end over end.
        assert!(capsule.inertia[(1, 1)] < capsule.inertia[(0, 0)]);
        assert_relative_eq!(capsule.inertia[(0, 0)], capsule.inertia[(2, 2)]);
    }

    #[test]
    fn test_mass_properties_validation() {
        assert!(MassProperties::sphere(1.0, 1.0).validate().is_ok());
        assert!(MassProperties::immovable().validate().is_err());
        assert!(MassProperties::new(-1.0, Matrix3::identity()).validate().is_err());
    }

    #[test]
    fn test_world_inverse_inertia_rotates_axes() {
        let local = Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, 3.0));
        let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let world = world_inverse_inertia(&local, &rotation);

        // A quarter turn about Z swaps the X and Y entries.
        assert_relative_eq!(world[(0, 0)], 2.0, epsilon = 1e-10);
        assert_relative_eq!(world[(1, 1)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(world[(2, 2)], 3.0, epsilon = 1e-10);
    }
}
