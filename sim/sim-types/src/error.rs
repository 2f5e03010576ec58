//! Error types for the physics core.

use thiserror::Error;

/// Errors that can occur while building or configuring a simulation.
///
/// Nothing inside a running substep produces one of these; they are only
/// returned from construction and configuration calls.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A body handle that does not (or no longer) refers to a live body.
    #[error("invalid body handle: {0}")]
    InvalidBodyHandle(String),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Geometry that cannot back a shape (empty, degenerate, too many vertices).
    #[error("invalid geometry: {reason}")]
    InvalidGeometry {
        /// Description of what's wrong.
        reason: String,
    },

    /// A hull vertex lies in front of one of the hull's own face planes.
    #[error("hull is not convex: vertex {vertex} is {distance} in front of polygon {polygon}")]
    NonConvexHull {
        /// Polygon whose plane is violated.
        polygon: usize,
        /// Offending vertex index.
        vertex: usize,
        /// Signed distance of the vertex from the polygon plane.
        distance: f64,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {reason}")]
    ThreadPool {
        /// Error reported by the pool builder.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid geometry error.
    #[must_use]
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::InvalidTimestep(_))
    }

    /// Check if this is a geometry error.
    #[must_use]
    pub fn is_geometry_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidGeometry { .. } | Self::NonConvexHull { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidTimestep(-1.0);
        assert!(err.to_string().contains("-1"));

        let err = SimError::NonConvexHull {
            polygon: 3,
            vertex: 7,
            distance: 0.25,
        };
        let text = err.to_string();
        assert!(text.contains("vertex 7"));
        assert!(text.contains("polygon 3"));

        let err = SimError::invalid_geometry("empty triangle soup");
        assert!(err.to_string().contains("triangle soup"));
    }

    #[test]
    fn test_error_predicates() {
        let err = SimError::invalid_config("bad value");
        assert!(err.is_config_error());
        assert!(!err.is_geometry_error());

        let err = SimError::invalid_geometry("radius");
        assert!(err.is_geometry_error());
        assert!(!err.is_config_error());
    }
}
