//! Debug line output.
//!
//! Contact generation can describe what it did as a set of colored line
//! segments: reference and incident faces, contact points, normals. Whoever
//! renders them implements [`DebugLineSink`] and hands it in explicitly; the
//! physics core never draws on its own.

use nalgebra::{Point3, Vector3};
use parking_lot::Mutex;
use sim_geometry::Aabb;

/// What a debug line depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugColor {
    /// Outline of the reference face in a face contact.
    ReferenceFace,
    /// Outline of the clipped incident face.
    IncidentFace,
    /// Marker at a contact point.
    Contact,
    /// Contact normal.
    Normal,
    /// Bounding box.
    Aabb,
}

/// Receiver for debug line segments.
///
/// Implementations must be callable from worker threads.
pub trait DebugLineSink: Send + Sync {
    /// Draw one line segment.
    fn draw_line(&self, from: Point3<f64>, to: Point3<f64>, color: DebugColor);

    /// Draw a closed polyline.
    fn draw_polygon(&self, points: &[Point3<f64>], color: DebugColor) {
        for (i, p) in points.iter().enumerate() {
            self.draw_line(*p, points[(i + 1) % points.len()], color);
        }
    }

    /// Draw a small three-axis cross at `point`.
    fn draw_point(&self, point: Point3<f64>, size: f64, color: DebugColor) {
        for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
            self.draw_line(point - axis * size, point + axis * size, color);
        }
    }

    /// Draw the twelve edges of a bounding box.
    fn draw_aabb(&self, aabb: &Aabb, color: DebugColor) {
        let corner = |i: usize| {
            Point3::new(
                if i & 1 == 0 { aabb.min.x } else { aabb.max.x },
                if i & 2 == 0 { aabb.min.y } else { aabb.max.y },
                if i & 4 == 0 { aabb.min.z } else { aabb.max.z },
            )
        };
        for i in 0..8 {
            for bit in [1, 2, 4] {
                if i & bit == 0 {
                    self.draw_line(corner(i), corner(i | bit), color);
                }
            }
        }
    }
}

/// A sink that records every line, for tests and offline inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Point3<f64>, Point3<f64>, DebugColor)>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every line recorded so far.
    pub fn take(&self) -> Vec<(Point3<f64>, Point3<f64>, DebugColor)> {
        std::mem::take(&mut *self.lines.lock())
    }

    /// Number of recorded lines of one color.
    #[must_use]
    pub fn count(&self, color: DebugColor) -> usize {
        self.lines.lock().iter().filter(|(_, _, c)| *c == color).count()
    }
}

impl DebugLineSink for RecordingSink {
    fn draw_line(&self, from: Point3<f64>, to: Point3<f64>, color: DebugColor) {
        self.lines.lock().push((from, to, color));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_has_twelve_edges() {
        let sink = RecordingSink::new();
        let aabb = Aabb::new(Point3::origin(), Point3::new(1.0, 2.0, 3.0));
        sink.draw_aabb(&aabb, DebugColor::Aabb);

        let lines = sink.take();
        assert_eq!(lines.len(), 12);
        for (from, to, _) in &lines {
            // Every edge runs along exactly one axis.
            let d = to - from;
            assert_eq!(d.iter().filter(|c| c.abs() > 0.0).count(), 1);
        }
        assert_eq!(sink.count(DebugColor::Aabb), 0);
    }

    #[test]
    fn test_polygon_is_closed() {
        let sink = RecordingSink::new();
        let triangle = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        sink.draw_polygon(&triangle, DebugColor::ReferenceFace);
        assert_eq!(sink.count(DebugColor::ReferenceFace), 3);
    }
}
