//! Vector kernels shared by the operators and solvers
//!
//! Elementwise updates run in parallel with rayon. Reductions split the input
//! into fixed-size chunks, sum each chunk with a 4-wide accumulator, and then
//! combine the chunk sums sequentially in index order. The chunking never
//! depends on the thread count, so a dot product is bit-identical no matter how
//! many workers rayon uses.

use num_complex::Complex64;
use rayon::prelude::*;

/// Number of samples per reduction chunk.
pub const REDUCTION_CHUNK: usize = 4096;

/// Samples per parallel task for elementwise updates.
const ELEMENTWISE_CHUNK: usize = 8192;

// ============================================================================
// Reductions
// ============================================================================

/// Sum one chunk of `conj(a[i]) * b[i]` with four independent accumulators.
#[inline]
fn dot_chunk(a: &[Complex64], b: &[Complex64]) -> Complex64 {
    let zero = Complex64::new(0.0, 0.0);
    let (mut acc0, mut acc1, mut acc2, mut acc3) = (zero, zero, zero, zero);

    let chunks = a.len() / 4;
    for c in 0..chunks {
        let j = c * 4;
        acc0 += a[j].conj() * b[j];
        acc1 += a[j + 1].conj() * b[j + 1];
        acc2 += a[j + 2].conj() * b[j + 2];
        acc3 += a[j + 3].conj() * b[j + 3];
    }
    for j in chunks * 4..a.len() {
        acc0 += a[j].conj() * b[j];
    }

    (acc0 + acc1) + (acc2 + acc3)
}

#[inline]
fn norm_squared_chunk(a: &[Complex64]) -> f64 {
    let (mut acc0, mut acc1, mut acc2, mut acc3) = (0.0, 0.0, 0.0, 0.0);

    let chunks = a.len() / 4;
    for c in 0..chunks {
        let j = c * 4;
        acc0 += a[j].norm_sqr();
        acc1 += a[j + 1].norm_sqr();
        acc2 += a[j + 2].norm_sqr();
        acc3 += a[j + 3].norm_sqr();
    }
    for j in chunks * 4..a.len() {
        acc0 += a[j].norm_sqr();
    }

    (acc0 + acc1) + (acc2 + acc3)
}

/// Complex inner product `<a, b> = sum(conj(a[i]) * b[i])`.
pub fn dot(a: &[Complex64], b: &[Complex64]) -> Complex64 {
    assert_eq!(a.len(), b.len(), "dot: length mismatch");

    let partials: Vec<Complex64> = a
        .par_chunks(REDUCTION_CHUNK)
        .zip(b.par_chunks(REDUCTION_CHUNK))
        .map(|(ca, cb)| dot_chunk(ca, cb))
        .collect();

    partials
        .into_iter()
        .fold(Complex64::new(0.0, 0.0), |acc, p| acc + p)
}

/// Squared Euclidean norm `sum(|a[i]|^2)`.
pub fn norm_squared(a: &[Complex64]) -> f64 {
    let partials: Vec<f64> = a
        .par_chunks(REDUCTION_CHUNK)
        .map(norm_squared_chunk)
        .collect();

    partials.into_iter().fold(0.0, |acc, p| acc + p)
}

// ============================================================================
// Elementwise updates
// ============================================================================

/// `y = y + alpha * x`
pub fn axpy(y: &mut [Complex64], alpha: f64, x: &[Complex64]) {
    assert_eq!(x.len(), y.len(), "axpy: length mismatch");
    y.par_chunks_mut(ELEMENTWISE_CHUNK)
        .zip(x.par_chunks(ELEMENTWISE_CHUNK))
        .for_each(|(yc, xc)| {
            for (yi, &xi) in yc.iter_mut().zip(xc) {
                *yi += xi * alpha;
            }
        });
}

/// `y = x + beta * y`
pub fn xpby(y: &mut [Complex64], x: &[Complex64], beta: f64) {
    assert_eq!(x.len(), y.len(), "xpby: length mismatch");
    y.par_chunks_mut(ELEMENTWISE_CHUNK)
        .zip(x.par_chunks(ELEMENTWISE_CHUNK))
        .for_each(|(yc, xc)| {
            for (yi, &xi) in yc.iter_mut().zip(xc) {
                *yi = xi + *yi * beta;
            }
        });
}

/// `out = a - b`
pub fn sub_into(out: &mut [Complex64], a: &[Complex64], b: &[Complex64]) {
    assert_eq!(a.len(), b.len(), "sub_into: length mismatch");
    assert_eq!(a.len(), out.len(), "sub_into: length mismatch");
    out.par_iter_mut()
        .zip(a.par_iter().zip(b.par_iter()))
        .for_each(|(o, (&ai, &bi))| *o = ai - bi);
}

/// `x = alpha * x`
pub fn scale(x: &mut [Complex64], alpha: f64) {
    x.par_iter_mut().for_each(|v| *v *= alpha);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, phase: f64) -> Vec<Complex64> {
        (0..n)
            .map(|i| Complex64::new((i as f64 * 0.37 + phase).sin(), (i as f64 * 0.11).cos()))
            .collect()
    }

    #[test]
    fn test_dot_is_conjugate_linear_in_first_argument() {
        let a = vec![Complex64::new(0.0, 1.0)];
        let b = vec![Complex64::new(0.0, 1.0)];
        // conj(i) * i = 1
        let d = dot(&a, &b);
        assert!((d.re - 1.0).abs() < 1e-15 && d.im.abs() < 1e-15);
    }

    #[test]
    fn test_dot_matches_sequential_sum() {
        let a = ramp(10_007, 0.3);
        let b = ramp(10_007, 1.1);
        let expected: Complex64 = a.iter().zip(&b).map(|(x, y)| x.conj() * y).sum();
        let got = dot(&a, &b);
        assert!((got - expected).norm() < 1e-9 * expected.norm().max(1.0));
    }

    #[test]
    fn test_reductions_independent_of_thread_count() {
        let a = ramp(3 * REDUCTION_CHUNK + 17, 0.0);
        let b = ramp(3 * REDUCTION_CHUNK + 17, 2.0);

        let one = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let four = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();

        let (d1, n1) = one.install(|| (dot(&a, &b), norm_squared(&a)));
        let (d4, n4) = four.install(|| (dot(&a, &b), norm_squared(&a)));

        assert_eq!(d1.re.to_bits(), d4.re.to_bits());
        assert_eq!(d1.im.to_bits(), d4.im.to_bits());
        assert_eq!(n1.to_bits(), n4.to_bits());
    }

    #[test]
    fn test_axpy_and_xpby() {
        let x = vec![Complex64::new(1.0, 2.0); 5];
        let mut y = vec![Complex64::new(0.5, 0.0); 5];
        axpy(&mut y, 2.0, &x);
        assert!(y.iter().all(|v| (*v - Complex64::new(2.5, 4.0)).norm() < 1e-15));

        xpby(&mut y, &x, 0.0);
        assert_eq!(y, x);
    }

    #[test]
    fn test_norms() {
        let a = vec![Complex64::new(3.0, 4.0), Complex64::new(0.0, -5.0)];
        assert!((norm_squared(&a) - 50.0).abs() < 1e-12);
    }
}
