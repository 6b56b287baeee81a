#![warn(missing_docs)]

//! Per-triangle (and per-quad) distortion energy and analytical gradient
//! kernels: the MIPS/isometric blend family and the Knupp volumetric
//! quality family, both built on a shared smoothed-positivity barrier that
//! the untangler's delta parameter controls.

use log::warn;
use param_math::Vec2;

/// Which energy family a [`TriangleConstants`]/evaluation call uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergyKind {
    /// Pure MIPS (θ = 0).
    Mips,
    /// MIPS/isometric blend with blend factor θ ∈ (0, 1].
    Isometric {
        /// Blend factor; `1.0` is the fully isometric term.
        theta: f64,
    },
    /// Knupp volumetric-quality energy (the CLI's `type=smooth`).
    Knupp,
}

/// Precomputed per-triangle constants derived from the 3D reference
/// triangle: reference cotangents at each vertex and twice the reference
/// area (`A0`, in the spec's own "twice-reference-area" convention).
#[derive(Debug, Clone, Copy)]
pub struct TriangleConstants {
    /// Cotangent of the reference angle at vertex `a`.
    pub cot_alpha: f64,
    /// Cotangent of the reference angle at vertex `b`.
    pub cot_beta: f64,
    /// Cotangent of the reference angle at vertex `c`.
    pub cot_gamma: f64,
    /// Twice the reference triangle's area.
    pub area0_x2: f64,
}

impl TriangleConstants {
    /// Precompute constants from the 3D reference positions of a triangle.
    pub fn from_reference(a: param_math::Point3, b: param_math::Point3, c: param_math::Point3) -> Self {
        let cot_alpha = cotangent_at_3d(a, b, c);
        let cot_beta = cotangent_at_3d(b, c, a);
        let cot_gamma = cotangent_at_3d(c, a, b);
        let area0_x2 = (b - a).cross(&(c - a)).norm();
        Self {
            cot_alpha,
            cot_beta,
            cot_gamma,
            area0_x2,
        }
    }
}

fn cotangent_at_3d(apex: param_math::Point3, p: param_math::Point3, q: param_math::Point3) -> f64 {
    let u = p - apex;
    let v = q - apex;
    let cos_theta = u.dot(&v);
    let sin_theta = u.cross(&v).norm();
    if sin_theta.abs() < 1e-14 {
        0.0
    } else {
        cos_theta / sin_theta
    }
}

/// `rot90_cw((x, y)) = (y, -x)`, the gradient kernel for a 2D cross product.
fn rot_cw(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// The smoothed-positivity barrier `h(x) = (x + sqrt(x^2 + 4d^2)) / 2` used
/// to keep energy denominators positive while a triangle is inverted
/// (`d > 0` while untangling is in force; `d == 0` makes `h` the identity on
/// `x > 0`).
fn barrier(x: f64, d: f64) -> f64 {
    (x + (x * x + 4.0 * d * d).sqrt()) / 2.0
}

/// `d(barrier)/dx`.
fn barrier_derivative(x: f64, d: f64) -> f64 {
    (1.0 + x / (x * x + 4.0 * d * d).sqrt()) / 2.0
}

/// Per-triangle energy and gradient output: the scalar cost and the
/// per-vertex `(du, dv)` contributions in the same order as the input
/// vertices, ready to be scattered into a per-vertex gather.
#[derive(Debug, Clone, Copy)]
pub struct TriangleResult {
    /// The scalar per-triangle energy `f_T`.
    pub value: f64,
    /// Gradient contribution for each of the 3 input vertices.
    pub grad: [Vec2; 3],
}

/// Raw (unscaled) signed doubled area of triangle `(a, b, c)` in the
/// parameter domain — the Jacobian determinant `det(J_T)` in the same units
/// as [`TriangleConstants::area0_x2`].
fn det_raw(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

fn grad_det_raw(a: Vec2, b: Vec2, c: Vec2) -> [Vec2; 3] {
    [rot_cw(b - c), rot_cw(c - a), rot_cw(a - b)]
}

/// Evaluate the MIPS/isometric-family energy and its analytical gradient for
/// one triangle with parameter-domain positions `(a, b, c)`.
///
/// `delta` is the untangler's smoothing parameter (§4.7); pass `0.0` once
/// the mesh is untangled.
pub fn evaluate_triangle(
    a: Vec2,
    b: Vec2,
    c: Vec2,
    consts: &TriangleConstants,
    kind: EnergyKind,
    delta: f64,
) -> TriangleResult {
    let theta = match kind {
        EnergyKind::Mips => 0.0,
        EnergyKind::Isometric { theta } => theta,
        EnergyKind::Knupp => {
            warn!("evaluate_triangle called with EnergyKind::Knupp; use evaluate_knupp_triangle instead");
            0.0
        }
    };

    let dab = a - b;
    let dbc = b - c;
    let dca = c - a;
    let dirichlet = consts.cot_alpha * dab.dot(&dab)
        + consts.cot_beta * dbc.dot(&dbc)
        + consts.cot_gamma * dca.dot(&dca);

    let grad_l = [
        dab * (2.0 * consts.cot_alpha) - dca * (2.0 * consts.cot_gamma),
        dbc * (2.0 * consts.cot_beta) - dab * (2.0 * consts.cot_alpha),
        dca * (2.0 * consts.cot_gamma) - dbc * (2.0 * consts.cot_beta),
    ];

    let d = det_raw(a, b, c);
    let grad_d = grad_det_raw(a, b, c);
    let hd = barrier(d, delta);
    let hd_prime = barrier_derivative(d, delta);

    let f_mips = dirichlet / (2.0 * hd);
    let grad_mips: [Vec2; 3] = std::array::from_fn(|i| {
        grad_l[i] / (2.0 * hd) - grad_d[i] * (dirichlet * hd_prime / (2.0 * hd * hd))
    });

    if theta <= 0.0 {
        return TriangleResult {
            value: f_mips,
            grad: grad_mips,
        };
    }

    let area0 = consts.area0_x2.max(1e-14);
    let dd_scaled = delta / area0;
    let det_scaled = d / area0;
    let hs = barrier(det_scaled, dd_scaled);
    let hs_prime = barrier_derivative(det_scaled, dd_scaled);

    let f_iso = (hs + 1.0 / hs) / 2.0;
    let df_iso_d_scaled = hs_prime * (1.0 - 1.0 / (hs * hs)) / 2.0;
    let grad_iso: [Vec2; 3] = std::array::from_fn(|i| grad_d[i] * (df_iso_d_scaled / area0));

    let value = (1.0 - theta) * f_mips + theta * f_iso;
    let grad: [Vec2; 3] = std::array::from_fn(|i| grad_mips[i] * (1.0 - theta) + grad_iso[i] * theta);

    TriangleResult { value, grad }
}

/// Per-corner Knupp quality measure and its gradient with respect to the
/// corner's three participating points, returned as `[d/dprev, d/dv, d/dnext]`.
fn corner_quality(prev: Vec2, v: Vec2, next: Vec2, delta: f64) -> (f64, [Vec2; 3]) {
    let e1 = prev - v;
    let e2 = next - v;
    let sq_len = e1.dot(&e1) + e2.dot(&e2);
    let grad_sq_prev = e1 * 2.0;
    let grad_sq_v = (e1 + e2) * -2.0;
    let grad_sq_next = e2 * 2.0;

    let q = det_raw(v, prev, next); // == cross(prev - v, next - v)
    let dq = grad_det_raw(v, prev, next); // [dq/dv, dq/dprev, dq/dnext]

    let hq = barrier(q, delta);
    let hq_prime = barrier_derivative(q, delta);

    let value = sq_len / hq;
    let coeff = sq_len * hq_prime / (hq * hq);
    let grad_prev = grad_sq_prev / hq - dq[1] * coeff;
    let grad_v = grad_sq_v / hq - dq[0] * coeff;
    let grad_next = grad_sq_next / hq - dq[2] * coeff;

    (value, [grad_prev, grad_v, grad_next])
}

/// Evaluate the Knupp energy and gradient for a triangle (3 corners,
/// averaged).
pub fn evaluate_knupp_triangle(a: Vec2, b: Vec2, c: Vec2, delta: f64) -> TriangleResult {
    let corners = [(c, a, b), (a, b, c), (b, c, a)];
    let mut value = 0.0;
    let mut grad = [Vec2::zeros(); 3];
    for (i, &(prev, v, next)) in corners.iter().enumerate() {
        let (cv, cg) = corner_quality(prev, v, next, delta);
        value += cv;
        // cg is [d/dprev, d/dv, d/dnext]; prev/v/next map back to vertex
        // indices (i-1, i, i+1) mod 3.
        let iv = i;
        let iprev = (i + 3 - 1) % 3;
        let inext = (i + 1) % 3;
        grad[iprev] += cg[0];
        grad[iv] += cg[1];
        grad[inext] += cg[2];
    }
    let n = 3.0;
    TriangleResult {
        value: value / n,
        grad: grad.map(|g| g / n),
    }
}

/// Evaluate the Knupp energy and gradient for a planar quad (4 corners,
/// `a, b, c, d` in traversal order, averaged over 4).
pub fn evaluate_knupp_quad(a: Vec2, b: Vec2, c: Vec2, d: Vec2, delta: f64) -> (f64, [Vec2; 4]) {
    let verts = [a, b, c, d];
    let mut value = 0.0;
    let mut grad = [Vec2::zeros(); 4];
    for i in 0..4 {
        let prev = verts[(i + 3) % 4];
        let v = verts[i];
        let next = verts[(i + 1) % 4];
        let (cv, cg) = corner_quality(prev, v, next, delta);
        value += cv;
        let iprev = (i + 3) % 4;
        let inext = (i + 1) % 4;
        grad[iprev] += cg[0];
        grad[i] += cg[1];
        grad[inext] += cg[2];
    }
    let n = 4.0;
    (value / n, grad.map(|g| g / n))
}

/// Central-difference derivative checker: perturb each coordinate of `a`,
/// `b`, `c` by `h` and compare against the analytical gradient, returning
/// the entries whose absolute difference exceeds `tol`.
pub fn check_triangle_gradient<F>(
    a: Vec2,
    b: Vec2,
    c: Vec2,
    eval: F,
    h: f64,
    tol: f64,
) -> Vec<(usize, usize, f64)>
where
    F: Fn(Vec2, Vec2, Vec2) -> TriangleResult,
{
    let mut mismatches = Vec::new();
    let analytical = eval(a, b, c);
    let verts = [a, b, c];
    for vi in 0..3 {
        for comp in 0..2 {
            let mut plus = verts;
            let mut minus = verts;
            if comp == 0 {
                plus[vi].x += h;
                minus[vi].x -= h;
            } else {
                plus[vi].y += h;
                minus[vi].y -= h;
            }
            let f_plus = eval(plus[0], plus[1], plus[2]).value;
            let f_minus = eval(minus[0], minus[1], minus[2]).value;
            let numerical = (f_plus - f_minus) / (2.0 * h);
            let got = if comp == 0 {
                analytical.grad[vi].x
            } else {
                analytical.grad[vi].y
            };
            if (got - numerical).abs() > tol {
                mismatches.push((vi, comp, got - numerical));
            }
        }
    }
    mismatches
}

/// Assemble the scaled-problem global cost for the MIPS/isometric family:
/// `(1/N_T) * sum(f_T) - 1`. `0.0` for an empty mesh.
pub fn global_cost_mips_isometric(triangle_values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = triangle_values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64 - 1.0
    }
}

/// Assemble the global cost for the Knupp family:
/// `(1/N_T)*sum(f_T) + (1/(4*N_Q))*sum(f_Q) - (N_T>0) - (N_Q>0)`.
pub fn global_cost_knupp(triangle_values: &[f64], quad_values: &[f64]) -> f64 {
    let mut cost = 0.0;
    if !triangle_values.is_empty() {
        cost += triangle_values.iter().sum::<f64>() / triangle_values.len() as f64 - 1.0;
    }
    if !quad_values.is_empty() {
        cost += quad_values.iter().sum::<f64>() / (4.0 * quad_values.len() as f64) - 1.0;
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use param_math::Point3;

    fn equilateral_reference() -> (Point3, Point3, Point3) {
        (
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 3f64.sqrt() / 2.0, 0.0),
        )
    }

    #[test]
    fn mips_is_one_at_isometric_identity_map() {
        let (a3, b3, c3) = equilateral_reference();
        let consts = TriangleConstants::from_reference(a3, b3, c3);
        let a = Vec2::new(a3.x, a3.y);
        let b = Vec2::new(b3.x, b3.y);
        let c = Vec2::new(c3.x, c3.y);
        let result = evaluate_triangle(a, b, c, &consts, EnergyKind::Mips, 0.0);
        assert!((result.value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn isometric_blend_is_one_at_isometric_identity_map() {
        let (a3, b3, c3) = equilateral_reference();
        let consts = TriangleConstants::from_reference(a3, b3, c3);
        let a = Vec2::new(a3.x, a3.y);
        let b = Vec2::new(b3.x, b3.y);
        let c = Vec2::new(c3.x, c3.y);
        let result = evaluate_triangle(a, b, c, &consts, EnergyKind::Isometric { theta: 1.0 }, 0.0);
        assert!((result.value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mips_gradient_matches_central_difference() {
        let (a3, b3, c3) = equilateral_reference();
        let consts = TriangleConstants::from_reference(a3, b3, c3);
        let a = Vec2::new(0.1, -0.2);
        let b = Vec2::new(1.3, 0.05);
        let c = Vec2::new(0.4, 1.1);
        let eval = |a: Vec2, b: Vec2, c: Vec2| evaluate_triangle(a, b, c, &consts, EnergyKind::Mips, 0.0);
        let mismatches = check_triangle_gradient(a, b, c, eval, 1e-6, 1e-4);
        assert!(mismatches.is_empty(), "gradient mismatches: {mismatches:?}");
    }

    #[test]
    fn isometric_gradient_matches_central_difference() {
        let (a3, b3, c3) = equilateral_reference();
        let consts = TriangleConstants::from_reference(a3, b3, c3);
        let a = Vec2::new(0.1, -0.2);
        let b = Vec2::new(1.3, 0.05);
        let c = Vec2::new(0.4, 1.1);
        let eval = |a: Vec2, b: Vec2, c: Vec2| {
            evaluate_triangle(a, b, c, &consts, EnergyKind::Isometric { theta: 0.6 }, 0.0)
        };
        let mismatches = check_triangle_gradient(a, b, c, eval, 1e-6, 1e-4);
        assert!(mismatches.is_empty(), "gradient mismatches: {mismatches:?}");
    }

    #[test]
    fn knupp_gradient_matches_central_difference() {
        let a = Vec2::new(0.1, -0.2);
        let b = Vec2::new(1.3, 0.05);
        let c = Vec2::new(0.4, 1.1);
        let eval = |a: Vec2, b: Vec2, c: Vec2| evaluate_knupp_triangle(a, b, c, 0.0);
        let mismatches = check_triangle_gradient(a, b, c, eval, 1e-6, 1e-3);
        assert!(mismatches.is_empty(), "gradient mismatches: {mismatches:?}");
    }

    #[test]
    fn global_cost_is_zero_when_every_triangle_is_isometric() {
        let values = [1.0, 1.0, 1.0];
        assert!((global_cost_mips_isometric(values) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn global_cost_knupp_combines_triangle_and_quad_terms() {
        let cost = global_cost_knupp(&[1.0, 1.0], &[4.0]);
        assert!((cost - 0.0).abs() < 1e-12);
    }

    #[test]
    fn barrier_smooths_negative_determinant() {
        let d = 0.1;
        let h = barrier(-1.0, d);
        assert!(h > 0.0);
        // At delta = 0 the barrier is the positive-part identity on x > 0.
        assert!((barrier(2.0, 0.0) - 2.0).abs() < 1e-12);
    }
}
