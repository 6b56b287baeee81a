#![warn(missing_docs)]

//! Scalar, point, and vector aliases shared by every crate in the
//! parameterization engine.
//!
//! Thin wrappers around `nalgebra` so the rest of the workspace names types
//! by domain role (`Point3`, `Point2`, `Vec2`, ...) rather than by the
//! underlying linear-algebra crate.

use nalgebra::{Vector2, Vector3};

/// A point on the input mesh surface, in 3D.
pub type Point3 = nalgebra::Point3<f64>;

/// A displacement vector in 3D.
pub type Vec3 = Vector3<f64>;

/// A point in the 2D parameter domain, i.e. a vertex's `(u, v)`.
pub type Point2 = nalgebra::Point2<f64>;

/// A displacement vector in the 2D parameter domain.
pub type Vec2 = Vector2<f64>;

/// Tolerances used throughout the engine for near-zero and near-equal tests.
///
/// Mirrors the magnitudes the reference implementation used for its
/// `zero_tol`/residual thresholds: geometric predicates default to `1e-6`,
/// the untangler's damping-floor/progress tests use a tighter `1e-12`.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// General geometric zero tolerance (point-in-triangle, area tests, ...).
    pub geometric: f64,
    /// Tolerance used for numerical-progress comparisons in the solver.
    pub numerical: f64,
}

impl Tolerance {
    /// Default tolerances: `1e-6` geometric, `1e-12` numerical.
    pub const DEFAULT: Self = Self {
        geometric: 1e-6,
        numerical: 1e-12,
    };

    /// Check if a scalar is effectively zero under the geometric tolerance.
    pub fn is_zero(&self, x: f64) -> bool {
        x.abs() < self.geometric
    }

    /// Check if two scalars are effectively equal under the numerical tolerance.
    pub fn numerically_equal(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.numerical
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tolerance_values() {
        let tol = Tolerance::DEFAULT;
        assert!(tol.is_zero(1e-9));
        assert!(!tol.is_zero(1e-3));
    }

    #[test]
    fn point_and_vec_aliases_interoperate() {
        let p = Point2::new(1.0, 2.0);
        let v = Vec2::new(0.5, -0.5);
        let q = p + v;
        assert!((q.x - 1.5).abs() < 1e-12);
        assert!((q.y - 1.5).abs() < 1e-12);
    }
}
