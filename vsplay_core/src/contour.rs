//! Analyst-drawn contours.

use crate::geometry::{self, Polygon};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContourType {
    Annotation,
    Tripwire,
    Selector,
    Filter,
}

impl ContourType {
    /// Types whose polygon must be a closed loop.
    pub fn is_loop_type(&self) -> bool {
        matches!(
            self,
            ContourType::Tripwire | ContourType::Selector | ContourType::Filter
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub id: i32,
    pub name: String,
    pub kind: ContourType,
    /// Stabilized coordinates
    pub points: Polygon,
}

impl Contour {
    pub fn new(id: i32, name: impl Into<String>, kind: ContourType, points: Polygon) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            points,
        }
    }

    pub fn is_closed(&self) -> bool {
        geometry::is_closed(&self.points)
    }

    /// Appends the first point if the contour is open.
    ///
    /// Returns false (leaving the contour untouched) when there are fewer
    /// than three points.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return true;
        }
        if self.points.len() < 3 {
            return false;
        }
        let first = self.points[0];
        self.points.push(first);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn test_close_requires_three_points() {
        let mut c = Contour::new(
            1,
            "wire",
            ContourType::Annotation,
            vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)],
        );
        assert!(!c.close());
        assert_eq!(c.points.len(), 2);

        c.points.push(Point2::new(1.0, 1.0));
        assert!(c.close());
        assert!(c.is_closed());
        assert_eq!(c.points.len(), 4);
        // Already closed: no-op
        assert!(c.close());
        assert_eq!(c.points.len(), 4);
    }

    #[test]
    fn test_loop_types() {
        assert!(!ContourType::Annotation.is_loop_type());
        assert!(ContourType::Tripwire.is_loop_type());
        assert!(ContourType::Selector.is_loop_type());
        assert!(ContourType::Filter.is_loop_type());
    }
}
