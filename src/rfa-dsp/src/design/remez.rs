// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Parks-McClellan equiripple FIR design (Remez exchange).
//!
//! The design runs on a dense grid over `[0, 0.5]` cycles per sample. Each
//! pass fits the barycentric interpolant through the current extremal set,
//! evaluates the weighted error on the grid and moves the extremals to the
//! new error peaks. The taps are recovered from the final response by
//! inverse frequency sampling.

use std::f64::consts::PI;

use crate::error::{ConvergenceError, DspError, DspResult};

/// Smallest accepted grid density (grid points per extremal).
pub const DEFAULT_GRID_DENSITY: usize = 16;

/// Exchange passes before giving up.
pub const MAX_ITERATIONS: usize = 40;

const CONVERGENCE_RATIO: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemezKind {
    /// Multi-band filter, even impulse-response symmetry.
    Bandpass,
    /// Differentiator, odd symmetry, weights scaled by 1/f in bands with a
    /// non-zero response.
    Differentiator,
    /// Hilbert transformer, odd symmetry.
    Hilbert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symmetry {
    Positive,
    Negative,
}

/// Design an `order + 1` tap equiripple filter.
///
/// `bands` holds band edge pairs normalised to `[0, 1]` (1 = Nyquist),
/// `amplitudes` the desired response at each edge and `weights` one error
/// weight per band.
pub fn remez(
    order: usize,
    bands: &[f64],
    amplitudes: &[f64],
    weights: &[f64],
    kind: RemezKind,
    grid_density: usize,
) -> DspResult<Vec<f64>> {
    let numtaps = order + 1;
    if numtaps < 4 {
        return Err(DspError::invalid(format!(
            "remez needs order >= 3 (got {})",
            order
        )));
    }
    if bands.is_empty() || bands.len() % 2 != 0 {
        return Err(DspError::invalid(format!(
            "remez needs an even number of band edges (got {})",
            bands.len()
        )));
    }
    if let Some(&edge) = bands.iter().find(|b| !(0.0..=1.0).contains(*b)) {
        return Err(DspError::invalid(format!(
            "band edge {} outside [0, 1]",
            edge
        )));
    }
    if bands.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(DspError::invalid("band edges must be non-decreasing"));
    }
    if amplitudes.len() != bands.len() {
        return Err(DspError::invalid(format!(
            "expected {} amplitudes, got {}",
            bands.len(),
            amplitudes.len()
        )));
    }
    let numband = bands.len() / 2;
    if weights.len() != numband {
        return Err(DspError::invalid(format!(
            "expected {} weights (one per band), got {}",
            numband,
            weights.len()
        )));
    }
    if grid_density < DEFAULT_GRID_DENSITY {
        return Err(DspError::invalid(format!(
            "grid density must be >= {} (got {})",
            DEFAULT_GRID_DENSITY, grid_density
        )));
    }

    let bands: Vec<f64> = bands.iter().map(|b| b / 2.0).collect();
    let symmetry = match kind {
        RemezKind::Bandpass => Symmetry::Positive,
        RemezKind::Differentiator | RemezKind::Hilbert => Symmetry::Negative,
    };

    let mut r = numtaps / 2;
    if numtaps % 2 == 1 && symmetry == Symmetry::Positive {
        r += 1;
    }

    let mut grid = DenseGrid::new(r, numtaps, &bands, amplitudes, weights, symmetry, grid_density)?;

    if kind == RemezKind::Differentiator {
        for ((w, &d), &f) in grid.weight.iter_mut().zip(&grid.desired).zip(&grid.freq) {
            if d > 0.0001 {
                *w /= f;
            }
        }
    }
    grid.adjust_for_symmetry(numtaps, symmetry);

    let gridsize = grid.len();
    let mut ext: Vec<usize> = (0..=r).map(|i| i * (gridsize - 1) / r).collect();
    let mut interp = Interpolant::new(r);
    let mut error = vec![0.0; gridsize];

    let mut converged = false;
    for _ in 0..MAX_ITERATIONS {
        interp.fit(&ext, &grid);
        for (i, e) in error.iter_mut().enumerate() {
            *e = grid.weight[i] * (grid.desired[i] - interp.eval(grid.freq[i]));
        }
        search(r, &mut ext, &error)?;
        if is_converged(&ext, &error) {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(ConvergenceError::DidNotConverge {
            iterations: MAX_ITERATIONS,
        }
        .into());
    }

    interp.fit(&ext, &grid);
    let n = numtaps as f64;
    let response: Vec<f64> = (0..=numtaps / 2)
        .map(|i| {
            let i = i as f64;
            let c = match (symmetry, numtaps % 2 == 1) {
                (Symmetry::Positive, true) => 1.0,
                (Symmetry::Positive, false) => (PI * i / n).cos(),
                (Symmetry::Negative, true) => (2.0 * PI * i / n).sin(),
                (Symmetry::Negative, false) => (PI * i / n).sin(),
            };
            interp.eval(i / n) * c
        })
        .collect();

    Ok(frequency_sample(numtaps, &response, symmetry))
}

// ============================================================================
// Dense grid
// ============================================================================

struct DenseGrid {
    freq: Vec<f64>,
    desired: Vec<f64>,
    weight: Vec<f64>,
}

impl DenseGrid {
    fn new(
        r: usize,
        numtaps: usize,
        bands: &[f64],
        amplitudes: &[f64],
        weights: &[f64],
        symmetry: Symmetry,
        grid_density: usize,
    ) -> DspResult<Self> {
        let delf = 0.5 / (grid_density * r) as f64;
        let grid0 = if symmetry == Symmetry::Negative && delf > bands[0] {
            delf
        } else {
            bands[0]
        };

        let mut grid = DenseGrid {
            freq: Vec::new(),
            desired: Vec::new(),
            weight: Vec::new(),
        };

        for band in 0..bands.len() / 2 {
            let mut lowf = if band == 0 { grid0 } else { bands[2 * band] };
            let highf = bands[2 * band + 1];
            let mut k = ((highf - lowf) / delf + 0.5) as usize;
            if band == 0 && symmetry == Symmetry::Negative {
                k = k.saturating_sub(1);
            }
            if k == 0 {
                return Err(DspError::invalid(format!(
                    "band {} [{}, {}] is too narrow for the grid",
                    band,
                    2.0 * bands[2 * band],
                    2.0 * highf
                )));
            }
            let (a0, a1) = (amplitudes[2 * band], amplitudes[2 * band + 1]);
            for i in 0..k {
                let desired = if k > 1 {
                    a0 + i as f64 * (a1 - a0) / (k - 1) as f64
                } else {
                    a0
                };
                grid.freq.push(lowf);
                grid.desired.push(desired);
                grid.weight.push(weights[band]);
                lowf += delf;
            }
            if let Some(last) = grid.freq.last_mut() {
                *last = highf;
            }
        }

        // With odd symmetry and an odd tap count the response is forced to
        // zero at 0.5, so keep the last point just below it.
        if symmetry == Symmetry::Negative && numtaps % 2 == 1 {
            if let Some(last) = grid.freq.last_mut() {
                if *last > 0.5 - delf {
                    *last = 0.5 - delf;
                }
            }
        }

        if grid.len() < r + 1 {
            return Err(DspError::invalid(format!(
                "dense grid has {} points, need at least {}",
                grid.len(),
                r + 1
            )));
        }
        Ok(grid)
    }

    fn len(&self) -> usize {
        self.freq.len()
    }

    /// Fold the fixed trigonometric factor of the symmetry case into the
    /// desired response and the weights.
    fn adjust_for_symmetry(&mut self, numtaps: usize, symmetry: Symmetry) {
        let odd = numtaps % 2 == 1;
        if symmetry == Symmetry::Positive && odd {
            return;
        }
        for i in 0..self.len() {
            let f = self.freq[i];
            let c = match symmetry {
                Symmetry::Positive => (PI * f).cos(),
                Symmetry::Negative if odd => (2.0 * PI * f).sin(),
                Symmetry::Negative => (PI * f).sin(),
            };
            self.desired[i] /= c;
            self.weight[i] *= c;
        }
    }
}

// ============================================================================
// Barycentric interpolation through the extremal set
// ============================================================================

struct Interpolant {
    ad: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Interpolant {
    fn new(r: usize) -> Self {
        Self {
            ad: vec![0.0; r + 1],
            x: vec![0.0; r + 1],
            y: vec![0.0; r + 1],
        }
    }

    fn fit(&mut self, ext: &[usize], grid: &DenseGrid) {
        let r = ext.len() - 1;
        for (x, &e) in self.x.iter_mut().zip(ext) {
            *x = (2.0 * PI * grid.freq[e]).cos();
        }

        // Products are taken in interleaved strides to keep them in range.
        let ld = (r - 1) / 15 + 1;
        for i in 0..=r {
            let xi = self.x[i];
            let mut denom = 1.0;
            for j in 0..ld {
                for k in (j..=r).step_by(ld) {
                    if k != i {
                        denom *= 2.0 * (xi - self.x[k]);
                    }
                }
            }
            if denom.abs() < 0.00001 {
                denom = 0.00001;
            }
            self.ad[i] = 1.0 / denom;
        }

        let mut numer = 0.0;
        let mut denom = 0.0;
        let mut sign = 1.0;
        for i in 0..=r {
            numer += self.ad[i] * grid.desired[ext[i]];
            denom += sign * self.ad[i] / grid.weight[ext[i]];
            sign = -sign;
        }
        let delta = numer / denom;

        let mut sign = 1.0;
        for i in 0..=r {
            self.y[i] = grid.desired[ext[i]] - sign * delta / grid.weight[ext[i]];
            sign = -sign;
        }
    }

    /// Response at `freq` (cycles per sample).
    fn eval(&self, freq: f64) -> f64 {
        let xc = (2.0 * PI * freq).cos();
        let mut numer = 0.0;
        let mut denom = 0.0;
        for ((&ad, &x), &y) in self.ad.iter().zip(&self.x).zip(&self.y) {
            let c = xc - x;
            if c.abs() < 1.0e-7 {
                return y;
            }
            let c = ad / c;
            denom += c;
            numer += c * y;
        }
        numer / denom
    }
}

// ============================================================================
// Extremal search
// ============================================================================

/// Locate the error extrema and keep the `r + 1` that best alternate.
fn search(r: usize, ext: &mut [usize], error: &[f64]) -> Result<(), ConvergenceError> {
    let gridsize = error.len();
    let mut found: Vec<usize> = Vec::with_capacity(2 * r);
    let add = |found: &mut Vec<usize>, i: usize| {
        if found.len() >= 2 * r {
            return Err(ConvergenceError::TooManyExtremals);
        }
        found.push(i);
        Ok(())
    };

    let e = error;
    if (e[0] > 0.0 && e[0] > e[1]) || (e[0] < 0.0 && e[0] < e[1]) {
        add(&mut found, 0)?;
    }
    for i in 1..gridsize - 1 {
        if (e[i] >= e[i - 1] && e[i] > e[i + 1] && e[i] > 0.0)
            || (e[i] <= e[i - 1] && e[i] < e[i + 1] && e[i] < 0.0)
        {
            add(&mut found, i)?;
        }
    }
    let j = gridsize - 1;
    if (e[j] > 0.0 && e[j] > e[j - 1]) || (e[j] < 0.0 && e[j] < e[j - 1]) {
        add(&mut found, j)?;
    }

    if found.len() < r + 1 {
        return Err(ConvergenceError::InsufficientExtremals);
    }

    let mut extra = found.len() - (r + 1);
    while extra > 0 {
        let k = found.len();
        let mut up = e[found[0]] > 0.0;
        let mut smallest = 0;
        let mut alternating = true;
        for j in 1..k {
            if e[found[j]].abs() < e[found[smallest]].abs() {
                smallest = j;
            }
            if up && e[found[j]] < 0.0 {
                up = false;
            } else if !up && e[found[j]] > 0.0 {
                up = true;
            } else {
                // Two neighbours of the same sign: drop the smallest seen so far.
                alternating = false;
                break;
            }
        }

        if alternating && extra == 1 {
            smallest = if e[found[k - 1]].abs() < e[found[0]].abs() {
                k - 1
            } else {
                0
            };
        }

        found.remove(smallest);
        extra -= 1;
    }

    ext.copy_from_slice(&found[..=r]);
    Ok(())
}

fn is_converged(ext: &[usize], error: &[f64]) -> bool {
    let (min, max) = ext.iter().map(|&i| error[i].abs()).fold(
        (f64::INFINITY, 0.0_f64),
        |(min, max), v| (min.min(v), max.max(v)),
    );
    (max - min) / max < CONVERGENCE_RATIO
}

// ============================================================================
// Tap recovery
// ============================================================================

/// Inverse frequency sampling for the four symmetry/parity cases.
fn frequency_sample(numtaps: usize, a: &[f64], symmetry: Symmetry) -> Vec<f64> {
    let n_f = numtaps as f64;
    let m = (n_f - 1.0) / 2.0;
    let odd = numtaps % 2 == 1;
    let last_k = if odd { (numtaps - 1) / 2 } else { numtaps / 2 - 1 };

    (0..numtaps)
        .map(|n| {
            let offset = n as f64 - m;
            let x = 2.0 * PI * offset / n_f;
            let mut val = match (symmetry, odd) {
                (Symmetry::Positive, _) => a[0],
                (Symmetry::Negative, true) => 0.0,
                (Symmetry::Negative, false) => a[numtaps / 2] * (PI * offset).sin(),
            };
            for (k, &ak) in a.iter().enumerate().take(last_k + 1).skip(1) {
                let kx = x * k as f64;
                val += 2.0
                    * ak
                    * match symmetry {
                        Symmetry::Positive => kx.cos(),
                        Symmetry::Negative => kx.sin(),
                    };
            }
            val / n_f
        })
        .collect()
}
