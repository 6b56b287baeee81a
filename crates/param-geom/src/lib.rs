#![warn(missing_docs)]

//! 2D/3D geometry utilities used by the mesh kernel and the energy kernels:
//! areas, centroids, circumcircles, ear-clipping triangulation, and the
//! point-in-triangle predicate.
//!
//! All operations here are numeric and total — none of them fail on valid
//! finite input, matching the "no hidden failure modes" contract for this
//! layer.

use log::trace;
use param_math::{Point2, Point3, Tolerance, Vec2, Vec3};

/// Epsilon used by [`point_in_triangle_2d`] and the reflex-vertex test during
/// ear clipping.
pub const BARYCENTRIC_EPS: f64 = 1e-6;

/// Signed area of the 2D triangle `(a, b, c)` (positive if counter-clockwise).
pub fn triangle_area_signed_2d(a: Point2, b: Point2, c: Point2) -> f64 {
    0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))
}

/// Twice the signed area of the 2D triangle, i.e. the cross-product term used
/// directly by the energy kernels (`det(J_T)` scale).
pub fn triangle_area_signed_x2(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Area of a simple polygon given as ordered 2D points, via a fan from
/// vertex 0.
pub fn polygon_area_2d(pts: &[Point2]) -> f64 {
    if pts.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 1..pts.len() - 1 {
        area += triangle_area_signed_2d(pts[0], pts[i], pts[i + 1]);
    }
    area
}

/// Centroid (arithmetic mean) of a point set.
pub fn centroid_2d(pts: &[Point2]) -> Point2 {
    let n = pts.len().max(1) as f64;
    let sum = pts
        .iter()
        .fold(Vec2::zeros(), |acc, p| acc + p.coords);
    Point2::from(sum / n)
}

/// Centroid of a 3D point set.
pub fn centroid_3d(pts: &[Point3]) -> Point3 {
    let n = pts.len().max(1) as f64;
    let sum = pts
        .iter()
        .fold(Vec3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / n)
}

/// Circumcenter and circumradius of triangle `(a, b, c)` in 2D.
///
/// Returns `None` if the three points are collinear (the circumcircle is
/// degenerate).
pub fn circumcircle_2d(a: Point2, b: Point2, c: Point2) -> Option<(Point2, f64)> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < 1e-14 {
        return None;
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = Point2::new(ux, uy);
    let radius = (center - a).norm();
    Some((center, radius))
}

/// Barycentric-sign-test point-in-triangle predicate (2D), tolerant to
/// `BARYCENTRIC_EPS`.
///
/// Mirrors the reference implementation's `E0`/`E1`/`Q` barycentric formula:
/// a point is inside (or on the boundary, within tolerance) when both
/// barycentric coordinates are non-negative and their sum does not exceed 1.
pub fn point_in_triangle_2d(p: Point2, a: Point2, b: Point2, c: Point2) -> bool {
    let e0 = c - a;
    let e1 = b - a;
    let q = p - a;
    let e00 = e0.dot(&e0);
    let e01 = e0.dot(&e1);
    let e11 = e1.dot(&e1);
    let q0 = e0.dot(&q);
    let q1 = e1.dot(&q);
    let delta = e00 * e11 - e01 * e01;
    if delta.abs() < 1e-14 {
        return false;
    }
    let s0 = (e11 * q0 - e01 * q1) / delta;
    let s1 = (e00 * q1 - e01 * q0) / delta;
    s0 >= -BARYCENTRIC_EPS && s1 >= -BARYCENTRIC_EPS && (s0 + s1) <= 1.0 + BARYCENTRIC_EPS
}

/// Signed area of the 3D triangle `(a, b, c)`, as a vector (its magnitude is
/// twice the area, its direction the face normal).
pub fn triangle_normal_x2(a: Point3, b: Point3, c: Point3) -> Vec3 {
    (b - a).cross(&(c - a))
}

/// `true` if the polygon vertex at `i` (with neighbors `prev`/`next`) is
/// reflex with respect to the polygon normal `n`: the interior angle exceeds
/// a straight angle.
pub fn is_reflex_vertex(prev: Point3, v: Point3, next: Point3, n: Vec3, eps: f64) -> bool {
    let cross = (prev - v).cross(&(next - v));
    cross.dot(&n) < -eps
}

/// Ear-clipping triangulation of a simple (possibly non-convex) polygon given
/// as indices into `pts_2d`.
///
/// `reversed` flips the convexity test, matching the orientation convention
/// of the caller's polygon winding. Falls back to fan triangulation of any
/// residual ring that can't be ear-clipped (near-degenerate input).
pub fn ear_clip_triangulate(pts_2d: &[Point2], indices: &[usize], reversed: bool) -> Vec<[usize; 3]> {
    let mut out = Vec::new();
    if indices.len() < 3 {
        return out;
    }
    let mut remaining: Vec<usize> = indices.to_vec();

    while remaining.len() > 3 {
        let n = remaining.len();
        let mut found_ear = false;

        for i in 0..n {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;

            let a = pts_2d[remaining[prev]];
            let b = pts_2d[remaining[i]];
            let c = pts_2d[remaining[next]];

            let cross = triangle_area_signed_x2(a, b, c);
            let is_convex = if reversed { cross < 0.0 } else { cross > 0.0 };
            if !is_convex {
                continue;
            }

            let mut is_ear = true;
            for (j, &idx) in remaining.iter().enumerate() {
                if j == prev || j == i || j == next {
                    continue;
                }
                if point_in_triangle_2d(pts_2d[idx], a, b, c) {
                    is_ear = false;
                    break;
                }
            }
            if !is_ear {
                continue;
            }

            out.push([remaining[prev], remaining[i], remaining[next]]);
            remaining.remove(i);
            found_ear = true;
            break;
        }

        if !found_ear {
            trace!("ear_clip_triangulate: no ear found, falling back to fan for remainder");
            break;
        }
    }

    if remaining.len() >= 3 {
        for i in 1..remaining.len() - 1 {
            out.push([remaining[0], remaining[i], remaining[i + 1]]);
        }
    }

    out
}

/// Euclidean distance between two 2D points.
pub fn distance_2d(a: Point2, b: Point2) -> f64 {
    (a - b).norm()
}

/// Squared Euclidean distance between two 2D points (avoids the `sqrt` when
/// only ordering matters).
pub fn distance_sq_2d(a: Point2, b: Point2) -> f64 {
    (a - b).norm_squared()
}

/// Tolerance-aware zero test, re-exported for callers that only depend on
/// `param-geom`.
pub fn is_zero(x: f64, tol: &Tolerance) -> bool {
    tol.is_zero(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_area_ccw_positive() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        let c = Point2::new(0.0, 1.0);
        assert!(triangle_area_signed_2d(a, b, c) > 0.0);
    }

    #[test]
    fn point_in_triangle_center_is_inside() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(2.0, 0.0);
        let c = Point2::new(0.0, 2.0);
        let centroid = centroid_2d(&[a, b, c]);
        assert!(point_in_triangle_2d(centroid, a, b, c));
    }

    #[test]
    fn point_in_triangle_outside_point_rejected() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        let c = Point2::new(0.0, 1.0);
        assert!(!point_in_triangle_2d(Point2::new(5.0, 5.0), a, b, c));
    }

    #[test]
    fn circumcircle_of_right_triangle() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(2.0, 0.0);
        let c = Point2::new(0.0, 2.0);
        let (center, radius) = circumcircle_2d(a, b, c).unwrap();
        assert!((center.x - 1.0).abs() < 1e-9);
        assert!((center.y - 1.0).abs() < 1e-9);
        assert!((radius - 2.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn collinear_points_have_no_circumcircle() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        let c = Point2::new(2.0, 0.0);
        assert!(circumcircle_2d(a, b, c).is_none());
    }

    #[test]
    fn ear_clip_triangulates_convex_quad() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let tris = ear_clip_triangulate(&pts, &[0, 1, 2, 3], false);
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn ear_clip_handles_reflex_polygon() {
        // An "L" shaped hexagon, counter-clockwise.
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        let tris = ear_clip_triangulate(&pts, &[0, 1, 2, 3, 4, 5], false);
        assert_eq!(tris.len(), 4);
        let total_area: f64 = tris
            .iter()
            .map(|&[i, j, k]| triangle_area_signed_2d(pts[i], pts[j], pts[k]).abs())
            .sum();
        assert!((total_area - 3.0).abs() < 1e-9);
    }
}
