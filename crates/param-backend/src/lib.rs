#![warn(missing_docs)]

//! Vector-primitives layer: `copy`, `scal`, `axpy`, `xmy`, `dot`, `sum`,
//! `avg`, `amax`, `amin` over dense `f64` buffers, dispatched through a
//! [`Backend`] trait so the solver can run on a CPU thread pool today and a
//! GPU-style kernel dispatcher later without changing callers.
//!
//! Reductions (`dot`/`sum`/`avg`) use compensated (Kahan) summation with
//! 4-way partial accumulators, matching the bit-reproducibility and error
//! bound the solver's correctness contract requires.

use rayon::prelude::*;
use thiserror::Error;

/// Errors a compute backend can raise. Per the vector-primitives contract,
/// every operation is total on valid input; the only failure mode is
/// backend resource exhaustion.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend failed to allocate a buffer of the requested length.
    #[error("backend failed to allocate a buffer of length {0}")]
    AllocationFailed(usize),
}

/// Number of elements reduced per workgroup before a final host-side Kahan
/// sweep (or, above 4096 partials, a recursive reduction).
pub const DEFAULT_WORKGROUP: usize = 512;

/// Partial count above which the final sweep recurses into another
/// reduction pass instead of summing directly.
pub const MAX_HOST_PARTIALS: usize = 4096;

/// A compute backend capable of dispatching the vector-primitive batch
/// operations over its own buffer representation.
///
/// Implementations own buffer allocation; the driver never inspects buffer
/// contents directly, only through these dispatch methods, so that a future
/// GPU backend can keep data device-resident across calls.
pub trait Backend {
    /// Opaque handle to a device/backend-resident buffer of `f64`.
    type Buffer: Clone + Send + Sync;

    /// Allocate a buffer initialized from host data.
    fn alloc(&self, data: &[f64]) -> Result<Self::Buffer, BackendError>;

    /// Read a buffer's contents back to the host.
    fn read(&self, buf: &Self::Buffer) -> Vec<f64>;

    /// `y <- x`.
    fn copy(&self, x: &Self::Buffer, y: &mut Self::Buffer);

    /// `x <- alpha * x`. No-op fast path when `alpha == 1.0`.
    fn scal(&self, alpha: f64, x: &mut Self::Buffer);

    /// `y <- y + alpha * x`. No-op fast path when `alpha == 0.0`.
    fn axpy(&self, alpha: f64, x: &Self::Buffer, y: &mut Self::Buffer);

    /// `z <- x - y`.
    fn xmy(&self, x: &Self::Buffer, y: &Self::Buffer, z: &mut Self::Buffer);

    /// `<x, y>`, Kahan-compensated.
    fn dot(&self, x: &Self::Buffer, y: &Self::Buffer) -> f64;

    /// `sum(x)`, Kahan-compensated.
    fn sum(&self, x: &Self::Buffer) -> f64;

    /// `sum(x) / len(x)`.
    fn avg(&self, x: &Self::Buffer) -> f64;

    /// `max(|x_i|)`.
    fn amax(&self, x: &Self::Buffer) -> f64;

    /// `min(|x_i|)`.
    fn amin(&self, x: &Self::Buffer) -> f64;
}

/// Single-threaded-dispatch, Rayon-parallel-workgroup CPU reference backend.
///
/// Buffers are plain `Vec<f64>`; batch operations within one dispatch are
/// independent per element and may run in parallel, but the driver awaits
/// each dispatch before issuing the next (program-order semantics, §5).
#[derive(Debug, Clone, Copy)]
pub struct CpuBackend {
    /// Elements reduced per workgroup before the host-side Kahan sweep.
    pub workgroup: usize,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self {
            workgroup: DEFAULT_WORKGROUP,
        }
    }
}

impl CpuBackend {
    /// A backend with the given workgroup size (§6.1's `workgroup` option).
    pub fn with_workgroup(workgroup: usize) -> Self {
        Self {
            workgroup: workgroup.max(1),
        }
    }
}

impl Backend for CpuBackend {
    type Buffer = Vec<f64>;

    fn alloc(&self, data: &[f64]) -> Result<Self::Buffer, BackendError> {
        Ok(data.to_vec())
    }

    fn read(&self, buf: &Self::Buffer) -> Vec<f64> {
        buf.clone()
    }

    fn copy(&self, x: &Self::Buffer, y: &mut Self::Buffer) {
        y.clear();
        y.extend_from_slice(x);
    }

    fn scal(&self, alpha: f64, x: &mut Self::Buffer) {
        if alpha == 1.0 {
            return;
        }
        x.par_iter_mut().for_each(|v| *v *= alpha);
    }

    fn axpy(&self, alpha: f64, x: &Self::Buffer, y: &mut Self::Buffer) {
        if alpha == 0.0 {
            return;
        }
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(yi, xi)| *yi += alpha * xi);
    }

    fn xmy(&self, x: &Self::Buffer, y: &Self::Buffer, z: &mut Self::Buffer) {
        z.clear();
        z.extend(x.iter().zip(y.iter()).map(|(a, b)| a - b));
    }

    fn dot(&self, x: &Self::Buffer, y: &Self::Buffer) -> f64 {
        let products: Vec<f64> = x.iter().zip(y.iter()).map(|(a, b)| a * b).collect();
        kahan_sum(&products, self.workgroup)
    }

    fn sum(&self, x: &Self::Buffer) -> f64 {
        kahan_sum(x, self.workgroup)
    }

    fn avg(&self, x: &Self::Buffer) -> f64 {
        if x.is_empty() {
            0.0
        } else {
            kahan_sum(x, self.workgroup) / x.len() as f64
        }
    }

    fn amax(&self, x: &Self::Buffer) -> f64 {
        x.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
    }

    fn amin(&self, x: &Self::Buffer) -> f64 {
        x.iter().fold(f64::INFINITY, |acc, v| acc.min(v.abs()))
    }
}

/// Kahan-compensated sum of `x`, reduced in `workgroup`-sized chunks (each
/// chunk accumulated with 4 interleaved partial accumulators), then swept
/// together on the host — recursively, if the number of chunk partials
/// exceeds [`MAX_HOST_PARTIALS`].
pub fn kahan_sum(x: &[f64], workgroup: usize) -> f64 {
    let workgroup = workgroup.max(1);
    if x.len() <= workgroup {
        return kahan_sweep_4way(x);
    }
    let partials: Vec<f64> = x.chunks(workgroup).map(kahan_sweep_4way).collect();
    if partials.len() <= MAX_HOST_PARTIALS {
        kahan_sweep(&partials)
    } else {
        kahan_sum(&partials, workgroup)
    }
}

/// Reduce one workgroup-sized chunk using 4 interleaved Kahan accumulators
/// (reduces dependency-chain latency), then combine the 4 lanes with a final
/// Kahan sweep.
fn kahan_sweep_4way(chunk: &[f64]) -> f64 {
    let mut acc = [0.0f64; 4];
    let mut c = [0.0f64; 4];
    for (i, &v) in chunk.iter().enumerate() {
        let lane = i & 3;
        let y = v - c[lane];
        let t = acc[lane] + y;
        c[lane] = (t - acc[lane]) - y;
        acc[lane] = t;
    }
    kahan_sweep(&acc)
}

/// Plain Kahan summation over a small buffer (the host-side final sweep).
fn kahan_sweep(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut c = 0.0;
    for &v in x {
        let y = v - c;
        let t = sum + y;
        c = (t - sum) - y;
        sum = t;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_of_zero_vector_is_zero_and_nonneg() {
        let backend = CpuBackend::default();
        let x = backend.alloc(&[0.0; 16]).unwrap();
        assert_eq!(backend.dot(&x, &x), 0.0);
    }

    #[test]
    fn dot_self_is_nonnegative() {
        let backend = CpuBackend::default();
        let x = backend.alloc(&[1.0, -2.0, 3.5, -4.25]).unwrap();
        assert!(backend.dot(&x, &x) > 0.0);
    }

    #[test]
    fn axpy_matches_scalar_multiply_on_zero_y() {
        let backend = CpuBackend::default();
        let x = backend.alloc(&[1.0, 2.0, 3.0]).unwrap();
        let mut y = backend.alloc(&[0.0, 0.0, 0.0]).unwrap();
        backend.axpy(2.5, &x, &mut y);
        let got = backend.read(&y);
        assert!((got[0] - 2.5).abs() < 1e-12);
        assert!((got[1] - 5.0).abs() < 1e-12);
        assert!((got[2] - 7.5).abs() < 1e-12);
    }

    #[test]
    fn kahan_sum_is_permutation_invariant() {
        let mut values: Vec<f64> = (0..10_000).map(|i| (i as f64).sin()).collect();
        let a = kahan_sum(&values, 512);
        values.reverse();
        let b = kahan_sum(&values, 512);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn kahan_sum_beats_naive_for_ill_conditioned_input() {
        let mut values = vec![1.0e16, 1.0, -1.0e16];
        let naive: f64 = values.iter().sum();
        let compensated = kahan_sum(&values, 512);
        assert!((compensated - 1.0).abs() < 1e-9);
        values.rotate_left(1);
        assert_eq!(naive, 0.0); // naive summation loses the 1.0 entirely
    }

    #[test]
    fn amax_amin_identity_on_single_element() {
        let backend = CpuBackend::default();
        let x = backend.alloc(&[-7.0]).unwrap();
        assert_eq!(backend.amax(&x), 7.0);
        assert_eq!(backend.amin(&x), 7.0);
    }

    #[test]
    fn amax_is_monotone_as_elements_are_appended() {
        let backend = CpuBackend::default();
        let mut data = vec![1.0, -2.0];
        let first = backend.amax(&backend.alloc(&data).unwrap());
        data.push(10.0);
        let second = backend.amax(&backend.alloc(&data).unwrap());
        assert!(second >= first);
    }

    #[test]
    fn scal_one_is_noop() {
        let backend = CpuBackend::default();
        let mut x = backend.alloc(&[1.0, 2.0, 3.0]).unwrap();
        let before = x.clone();
        backend.scal(1.0, &mut x);
        assert_eq!(x, before);
    }
}
