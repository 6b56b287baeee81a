#![warn(missing_docs)]

//! Scalar step-length search along a descent direction: Brent's combined
//! parabolic-interpolation / golden-section method, with a Wolfe-style
//! sufficient-decrease fast path and adaptive step bounds carried across
//! outer iterations.
//!
//! The search itself knows nothing about vertices or gradients — callers
//! supply a closure `f(alpha) -> merit` that evaluates the optimizer's cost
//! at `x + alpha * d` for the current search direction `d`.

use log::{debug, warn};

const ZEPS: f64 = 1.0e-12;
const CGOLD: f64 = 0.3819660;
const GOLDEN_R: f64 = 0.61803399;
const GOLDEN_C: f64 = 1.0 - GOLDEN_R;

fn sign(magnitude: f64, sign_of: f64) -> f64 {
    if sign_of >= 0.0 {
        magnitude.abs()
    } else {
        -magnitude.abs()
    }
}

/// The outcome of a [`LineSearch::search`] call.
#[derive(Debug, Clone, Copy)]
pub struct SearchResult {
    /// The step length that minimized the merit function.
    pub alpha: f64,
    /// The merit function's value at `alpha`.
    pub fmin: f64,
}

/// A 1D step-length search with adaptive bracket bounds and a 3-entry
/// step-length history, restartable between outer CG cycles.
#[derive(Debug, Clone)]
pub struct LineSearch {
    lower_limit: f64,
    upper_limit: f64,
    init_lower: f64,
    init_upper: f64,
    alpha_history: [f64; 3],
    fmin: f64,
}

impl LineSearch {
    /// A new search bracketing `[lower_limit, upper_limit]` around 0.
    pub fn new(lower_limit: f64, upper_limit: f64) -> Self {
        Self {
            lower_limit,
            upper_limit,
            init_lower: lower_limit,
            init_upper: upper_limit,
            alpha_history: [-1.0; 3],
            fmin: 0.0,
        }
    }

    /// Reset the bracket bounds and step history to their initial values;
    /// the optimizer calls this after a restart or a rescale.
    pub fn restart(&mut self) {
        self.lower_limit = self.init_lower;
        self.upper_limit = self.init_upper;
        self.alpha_history = [-1.0; 3];
        self.fmin = 0.0;
    }

    /// Search for the step length minimizing `f`, with a Wolfe-style
    /// sufficient-decrease check at `alpha = -1.0` tried first.
    ///
    /// `wolfe_acc` is `c1 * <gradient, direction>`; pass `0.0` to disable the
    /// fast path and always bracket-search.
    pub fn search<F: FnMut(f64) -> f64>(
        &mut self,
        mut f: F,
        tol: f64,
        max_iters: usize,
        wolfe_acc: f64,
    ) -> SearchResult {
        let probe = f(-1.0);
        if probe.is_finite() && probe <= self.fmin - wolfe_acc {
            self.fmin = probe;
            return SearchResult {
                alpha: -1.0,
                fmin: probe,
            };
        }

        let a = self.lower_limit;
        let b = 0.0;
        let c = self.upper_limit;
        let (alpha, fmin) = self.brent(&mut f, a, b, c, tol, max_iters);
        self.fmin = fmin;
        self.update_history(alpha);
        SearchResult { alpha, fmin }
    }

    /// Brent's method: combined parabolic interpolation and golden-section
    /// search for the minimum of `f` bracketed by `(a, c)` with `b` an
    /// interior point already evaluated at the caller's current best guess.
    pub fn brent<F: FnMut(f64) -> f64>(
        &self,
        f: &mut F,
        ax: f64,
        bx: f64,
        cx: f64,
        tol: f64,
        max_iters: usize,
    ) -> (f64, f64) {
        let mut a = ax.min(cx);
        let mut b = ax.max(cx);
        let mut x = bx;
        let mut w = bx;
        let mut v = bx;
        let mut fx = if self.fmin == 0.0 { f(bx) } else { self.fmin };
        let mut fw = fx;
        let mut fv = fx;
        let mut e = 0.0_f64;
        let mut d = 0.0_f64;

        for _ in 0..max_iters {
            let xm = 0.5 * (a + b);
            let tol1 = tol * x.abs() + ZEPS;
            let tol2 = 2.0 * tol1;
            if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
                return (x, fx);
            }

            if e.abs() > tol1 {
                let r = (x - w) * (fx - fv);
                let mut q = (x - v) * (fx - fw);
                let mut p = (x - v) * q - (x - w) * r;
                q = 2.0 * (q - r);
                if q > 0.0 {
                    p = -p;
                }
                q = q.abs();
                let etemp = e;
                e = d;
                if p.abs() >= (0.5 * q * etemp).abs() || p <= q * (a - x) || p >= q * (b - x) {
                    e = if x >= xm { a - x } else { b - x };
                    d = CGOLD * e;
                } else {
                    d = p / q;
                    let u = x + d;
                    if u - a < tol2 || b - u < tol2 {
                        d = sign(tol1, xm - x);
                    }
                }
            } else {
                e = if x >= xm { a - x } else { b - x };
                d = CGOLD * e;
            }

            let u = if d.abs() >= tol1 {
                x + d
            } else {
                x + sign(tol1, d)
            };
            let fu = f(u);

            if fu <= fx {
                if u >= x {
                    a = x;
                } else {
                    b = x;
                }
                v = w;
                w = x;
                x = u;
                fv = fw;
                fw = fx;
                fx = fu;
            } else {
                if u < x {
                    a = u;
                } else {
                    b = u;
                }
                if fu <= fw || w == x {
                    v = w;
                    w = u;
                    fv = fw;
                    fw = fu;
                } else if fu <= fv || v == x || v == w {
                    v = u;
                    fv = fu;
                }
            }
        }
        debug!("brent line search exhausted {max_iters} iterations without converging to tol {tol}");
        (x, fx)
    }

    /// Golden-section search, used as a fallback bracket search when the
    /// merit function is not smooth enough for Brent's parabolic step to
    /// make progress.
    pub fn golden<F: FnMut(f64) -> f64>(
        &self,
        f: &mut F,
        ax: f64,
        bx: f64,
        cx: f64,
        tol: f64,
        max_iters: usize,
    ) -> (f64, f64) {
        let x0 = ax;
        let x3 = cx;
        let (mut x1, mut x2);
        if (cx - bx).abs() > (bx - ax).abs() {
            x1 = bx;
            x2 = bx + GOLDEN_C * (cx - bx);
        } else {
            x2 = bx;
            x1 = bx - GOLDEN_C * (bx - ax);
        }
        let mut f1 = f(x1);
        let mut f2 = f(x2);

        let mut lo = x0;
        let mut hi = x3;
        let mut iters = 0;
        while (hi - lo).abs() > tol * (x1.abs() + x2.abs()) && iters < max_iters {
            iters += 1;
            if f2.is_finite() && f2 < f1 {
                lo = x1;
                x1 = x2;
                x2 = GOLDEN_R * x1 + GOLDEN_C * hi;
                f1 = f2;
                f2 = f(x2);
            } else {
                hi = x2;
                x2 = x1;
                x1 = GOLDEN_R * x2 + GOLDEN_C * lo;
                f2 = f1;
                f1 = f(x1);
            }
        }

        if iters >= max_iters {
            warn!("golden-section search exhausted {max_iters} iterations");
        }

        if f1 < f2 {
            (x1, f1)
        } else {
            (x2, f2)
        }
    }

    /// Record a converged step length and widen/tighten the search bracket
    /// based on the running average of the last 3 accepted steps.
    fn update_history(&mut self, new_alpha: f64) {
        self.alpha_history = [self.alpha_history[1], self.alpha_history[2], new_alpha];
        let avg: f64 = self.alpha_history.iter().sum::<f64>() / 3.0;
        if avg < 0.5 * self.lower_limit {
            self.lower_limit = (self.lower_limit * 3.0).max(-100.0);
        } else if avg > 0.25 * self.lower_limit {
            self.lower_limit = (self.lower_limit / 2.0).min(-1e-6);
        }
    }
}

impl Default for LineSearch {
    /// A search bracketing `[-1.0, 1e-13]`, the solver's default initial
    /// step bracket around the unit descent step.
    fn default() -> Self {
        Self::new(-1.0, 1e-13)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brent_finds_minimum_of_a_parabola() {
        let ls = LineSearch::default();
        let mut f = |x: f64| (x - 0.2) * (x - 0.2) + 1.0;
        let (alpha, fmin) = ls.brent(&mut f, -5.0, 0.0, 5.0, 1e-10, 100);
        assert!((alpha - 0.2).abs() < 1e-6, "alpha = {alpha}");
        assert!((fmin - 1.0).abs() < 1e-9);
    }

    #[test]
    fn golden_finds_minimum_of_a_parabola() {
        let ls = LineSearch::default();
        let mut f = |x: f64| (x + 1.5) * (x + 1.5);
        let (alpha, fmin) = ls.golden(&mut f, -5.0, 0.0, 5.0, 1e-8, 200);
        assert!((alpha + 1.5).abs() < 1e-3, "alpha = {alpha}");
        assert!(fmin < 1e-4);
    }

    #[test]
    fn search_accepts_unit_step_when_it_already_satisfies_wolfe() {
        let mut ls = LineSearch::default();
        // f(-1.0) is the best possible value; the Wolfe fast path should
        // short-circuit the bracket search entirely.
        let result = ls.search(|alpha| (alpha + 1.0).abs() + alpha, 1e-6, 8, 0.0);
        assert_eq!(result.alpha, -1.0);
    }

    #[test]
    fn restart_resets_bounds_and_history() {
        let mut ls = LineSearch::new(-2.0, 1.0);
        ls.update_history(-1.9);
        ls.update_history(-1.9);
        ls.update_history(-1.9);
        assert_ne!(ls.lower_limit, -2.0);
        ls.restart();
        assert_eq!(ls.lower_limit, -2.0);
        assert_eq!(ls.alpha_history, [-1.0; 3]);
    }

    #[test]
    fn search_brackets_a_nontrivial_minimum() {
        let mut ls = LineSearch::new(-10.0, 10.0);
        let result = ls.search(|x| (x - 3.0).powi(2), 1e-8, 100, 0.0);
        assert!((result.alpha - 3.0).abs() < 1e-3, "alpha = {}", result.alpha);
    }
}
