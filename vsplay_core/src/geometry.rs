//! Planar geometry helpers for stabilized-space polygons and segments.

use nalgebra::Point2;

/// An ordered list of vertices. Closed when the last vertex repeats the first.
pub type Polygon = Vec<Point2<f64>>;

/// True when the polygon explicitly repeats its first vertex at the end.
/// A single point has nothing to close and counts as open, so
/// [`open_vertices`] never strips it.
pub fn is_closed(points: &[Point2<f64>]) -> bool {
    points.len() >= 2 && points.first() == points.last()
}

/// Returns the vertices without the closing duplicate (if any).
pub fn open_vertices(points: &[Point2<f64>]) -> &[Point2<f64>] {
    if is_closed(points) {
        &points[..points.len() - 1]
    } else {
        points
    }
}

fn cross(o: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Intersection of segments `p0-p1` and `q0-q1`.
///
/// Returns the parameter `t` along `p0-p1` (0..=1) and the crossing point.
/// Collinear overlaps are not reported.
pub fn segment_intersection(
    p0: &Point2<f64>,
    p1: &Point2<f64>,
    q0: &Point2<f64>,
    q1: &Point2<f64>,
) -> Option<(f64, Point2<f64>)> {
    let r = p1 - p0;
    let s = q1 - q0;
    let denom = r.x * s.y - r.y * s.x;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let qp = q0 - p0;
    let t = (qp.x * s.y - qp.y * s.x) / denom;
    let u = (qp.x * r.y - qp.y * r.x) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((t, p0 + r * t))
    } else {
        None
    }
}

/// Even-odd point-in-polygon test. Accepts open or closed vertex lists.
pub fn contains_point(polygon: &[Point2<f64>], p: &Point2<f64>) -> bool {
    let verts = open_vertices(polygon);
    if verts.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let (a, b) = (&verts[i], &verts[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Edges of a polyline; when `closed`, includes the edge back to the start.
pub fn edges(points: &[Point2<f64>], closed: bool) -> Vec<(Point2<f64>, Point2<f64>)> {
    let verts = open_vertices(points);
    let mut out: Vec<_> = verts.windows(2).map(|w| (w[0], w[1])).collect();
    if closed && verts.len() >= 3 {
        out.push((verts[verts.len() - 1], verts[0]));
    }
    out
}

/// Signed area (positive for counter-clockwise winding).
pub fn signed_area(polygon: &[Point2<f64>]) -> f64 {
    let verts = open_vertices(polygon);
    if verts.len() < 3 {
        return 0.0;
    }
    let origin = verts[0];
    verts
        .windows(2)
        .skip(1)
        .map(|w| cross(&origin, &w[0], &w[1]))
        .sum::<f64>()
        * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> Polygon {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
            Point2::new(0.0, 0.0),
        ]
    }

    #[test]
    fn test_closed_detection() {
        let sq = square();
        assert!(is_closed(&sq));
        assert_eq!(open_vertices(&sq).len(), 4);
        assert!(!is_closed(&sq[..3]));
        // One point is open and survives open_vertices
        assert!(!is_closed(&sq[..1]));
        assert_eq!(open_vertices(&sq[..1]), &sq[..1]);
        assert!(!is_closed(&[]));
    }

    #[test]
    fn test_segment_intersection() {
        let hit = segment_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(10.0, 10.0),
            &Point2::new(0.0, 10.0),
            &Point2::new(10.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(hit.0, 0.5);
        assert_relative_eq!(hit.1.x, 5.0);

        assert!(segment_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(1.0, 0.0),
            &Point2::new(0.0, 1.0),
            &Point2::new(1.0, 1.0),
        )
        .is_none());
    }

    #[test]
    fn test_contains_point() {
        let sq = square();
        assert!(contains_point(&sq, &Point2::new(5.0, 5.0)));
        assert!(!contains_point(&sq, &Point2::new(15.0, 5.0)));
    }

    #[test]
    fn test_edges_and_area() {
        let sq = square();
        assert_eq!(edges(&sq, true).len(), 4);
        assert_eq!(edges(&sq, false).len(), 3);
        assert_relative_eq!(signed_area(&sq), 100.0);
    }
}
