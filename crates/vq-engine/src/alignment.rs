//! Global time alignment by cross-correlation
//!
//! The correlation is accumulated block by block over the reference, each
//! block against the stretch of the degraded signal it can reach within the
//! lag window. Memory stays proportional to the lag window, not to the
//! signal length.

use log::debug;
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Smallest reference block correlated per FFT
const MIN_BLOCK: usize = 4096;

/// Lag (samples) by which `degraded` trails `reference`, searched within
/// `±max_lag`.
///
/// Positive lag means the degraded signal starts late. Returns 0 for silent
/// inputs, when nothing correlates positively, or on ties with zero lag.
pub fn estimate_lag(reference: &[f64], degraded: &[f64], max_lag: usize) -> isize {
    let n = reference.len().min(degraded.len());
    if n < 2 || max_lag == 0 {
        return 0;
    }
    let max_lag = max_lag.min(n - 1);
    let corr = cross_correlation(&reference[..n], &degraded[..n], max_lag);
    let at = |lag: isize| corr[(lag + max_lag as isize) as usize];

    let mut best_lag = 0isize;
    let mut best = at(0);
    for offset in 1..=max_lag as isize {
        for lag in [offset, -offset] {
            let value = at(lag);
            if value > best {
                best = value;
                best_lag = lag;
            }
        }
    }

    if best <= 0.0 {
        return 0;
    }

    debug!("Global lag estimate: {} samples", best_lag);
    best_lag
}

/// `r[k + max_lag] = Σ x[i]·y[i + k]` for `k` in `±max_lag`, over the indices
/// where both signals exist. `x` and `y` have equal length.
fn cross_correlation(x: &[f64], y: &[f64], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    let span = 2 * max_lag;
    let block = span.max(MIN_BLOCK);
    let size = (block + span).next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut acc = vec![0.0; span + 1];
    let mut xa = vec![Complex64::new(0.0, 0.0); size];
    let mut ya = vec![Complex64::new(0.0, 0.0); size];

    for start in (0..n).step_by(block) {
        let len = block.min(n - start);

        for (i, slot) in xa.iter_mut().enumerate() {
            let value = if i < len { x[start + i] } else { 0.0 };
            *slot = Complex64::new(value, 0.0);
        }
        // ya[j] holds y[start - max_lag + j]
        for (j, slot) in ya.iter_mut().enumerate() {
            let index = (start + j).checked_sub(max_lag);
            let value = match index {
                Some(index) if j < len + span && index < n => y[index],
                _ => 0.0,
            };
            *slot = Complex64::new(value, 0.0);
        }

        forward.process(&mut xa);
        forward.process(&mut ya);
        for (a, b) in xa.iter_mut().zip(&ya) {
            *a = a.conj() * b;
        }
        inverse.process(&mut xa);

        // Indices stay below `size`, so the circular result has no wrap
        for (sum, value) in acc.iter_mut().zip(&xa) {
            *sum += value.re;
        }
    }

    let scale = 1.0 / size as f64;
    acc.iter_mut().for_each(|v| *v *= scale);
    acc
}

/// Trim both signals so that they line up under `lag`
pub fn apply_lag<'a>(reference: &'a [f64], degraded: &'a [f64], lag: isize) -> (&'a [f64], &'a [f64]) {
    let shift = lag.unsigned_abs();
    let (reference, degraded) = if lag >= 0 {
        (reference, &degraded[shift.min(degraded.len())..])
    } else {
        (&reference[shift.min(reference.len())..], degraded)
    };
    let len = reference.len().min(degraded.len());
    (&reference[..len], &degraded[..len])
}
