// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Equiripple designs from ripple/attenuation specs.
//!
//! The order is estimated with the Herrmann (single transition) or
//! Mintzer-Liu formulas, which tend to come out slightly low, so callers pad
//! the order with a few extra taps before running the exchange. Low-pass
//! designs also measure the finished stop band and keep raising the order
//! until it reaches the requested attenuation.

use std::f64::consts::PI;

use num_complex::Complex;
use tracing::debug;

use super::firdes::rotate;
use super::remez::{remez, RemezKind, DEFAULT_GRID_DENSITY};
use crate::error::{DspError, DspResult};

/// Taps added on top of the estimated order.
pub const DEFAULT_EXTRA_TAPS: usize = 2;

/// Low-pass order increment while the stop band misses its attenuation.
const ORDER_STEP: usize = 2;
/// Redesigns attempted before giving up on the attenuation.
const MAX_ORDER_STEPS: usize = 16;
/// Longest filter handed to the exchange; longer specs go to the window
/// method.
const MAX_TAPS: usize = 2048;

/// Arguments for [`remez`] derived from a band specification.
#[derive(Debug, Clone, PartialEq)]
pub struct RemezParams {
    pub order: usize,
    /// Band edges normalised to `[0, 1]`, starting at 0 and ending at 1.
    pub bands: Vec<f64>,
    pub amplitudes: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Linear deviation for a pass-band ripple given in dB.
pub fn passband_ripple_to_dev(ripple_db: f64) -> f64 {
    let r = 10f64.powf(ripple_db / 20.0);
    (r - 1.0) / (r + 1.0)
}

/// Linear deviation for a stop-band attenuation given in dB.
pub fn stopband_attenuation_to_dev(attenuation_db: f64) -> f64 {
    10f64.powf(-attenuation_db / 20.0)
}

/// Estimate the filter order and build the [`remez`] arguments.
///
/// `freqs` holds the transition band edges in Hz (two per transition),
/// `mags` the desired magnitude of each band and `devs` the maximum
/// deviation allowed in each band.
pub fn remezord(freqs: &[f64], mags: &[f64], devs: &[f64], sampling_freq: f64) -> DspResult<RemezParams> {
    if !(sampling_freq > 0.0) {
        return Err(DspError::invalid(format!(
            "sampling frequency must be > 0 (got {})",
            sampling_freq
        )));
    }
    let nbands = mags.len();
    if nbands < 2 {
        return Err(DspError::invalid("remezord needs at least two bands"));
    }
    if devs.len() != nbands {
        return Err(DspError::invalid(format!(
            "got {} magnitudes but {} deviations",
            nbands,
            devs.len()
        )));
    }
    if freqs.len() != 2 * (nbands - 1) {
        return Err(DspError::invalid(format!(
            "{} bands need {} edge frequencies, got {}",
            nbands,
            2 * (nbands - 1),
            freqs.len()
        )));
    }
    if let Some(&dev) = devs.iter().find(|d| !(**d > 0.0)) {
        return Err(DspError::invalid(format!("deviation must be > 0 (got {})", dev)));
    }

    let fcuts: Vec<f64> = freqs.iter().map(|f| f / sampling_freq).collect();
    let devs: Vec<f64> = devs
        .iter()
        .zip(mags)
        .map(|(&d, &m)| if m != 0.0 { d / m } else { d })
        .collect();

    let pass: Vec<f64> = fcuts.iter().step_by(2).copied().collect();
    let stop: Vec<f64> = fcuts.iter().skip(1).step_by(2).copied().collect();

    let length = if nbands == 2 {
        let mut n = 0;
        let mut min_delta = 2.0;
        for i in 0..pass.len() {
            if stop[i] - pass[i] < min_delta {
                n = i;
                min_delta = stop[i] - pass[i];
            }
        }
        lporder(pass[n], stop[n], devs[0], devs[1])
    } else {
        // Longest of the per-transition band-pass estimates.
        (0..nbands - 1).fold(0.0_f64, |l, i| {
            let (delta_p, delta_s) = if mags[i] != 0.0 {
                (devs[i], devs[i + 1])
            } else {
                (devs[i + 1], devs[i])
            };
            l.max(bporder(pass[i], stop[i], delta_p, delta_s))
        })
    };

    let order = (length.ceil() as i64 - 1).max(0) as usize;

    let mut bands = Vec::with_capacity(fcuts.len() + 2);
    bands.push(0.0);
    bands.extend(fcuts.iter().map(|f| f * 2.0));
    bands.push(1.0);

    let amplitudes = mags.iter().flat_map(|&m| [m, m]).collect();

    let max_dev = devs.iter().copied().fold(f64::MIN, f64::max);
    let weights = devs.iter().map(|d| max_dev / d).collect();

    Ok(RemezParams {
        order,
        bands,
        amplitudes,
        weights,
    })
}

/// Herrmann's filter length estimate for a low-pass with edges in cycles
/// per sample.
pub fn lporder(freq1: f64, freq2: f64, delta_p: f64, delta_s: f64) -> f64 {
    const A1: f64 = 5.309e-3;
    const A2: f64 = 7.114e-2;
    const A3: f64 = -4.761e-1;
    const A4: f64 = -2.66e-3;
    const A5: f64 = -5.941e-1;
    const A6: f64 = -4.278e-1;
    const B1: f64 = 11.01217;
    const B2: f64 = 0.5124401;

    let df = (freq2 - freq1).abs();
    let ddp = delta_p.log10();
    let dds = delta_s.log10();

    let dinf = (A1 * ddp * ddp + A2 * ddp + A3) * dds + (A4 * ddp * ddp + A5 * ddp + A6);
    let ff = B1 + B2 * (ddp - dds);
    dinf / df - ff * df + 1.0
}

/// Mintzer-Liu filter length estimate for a band-pass transition.
pub fn bporder(freq1: f64, freq2: f64, delta_p: f64, delta_s: f64) -> f64 {
    const A1: f64 = 0.01201;
    const A2: f64 = 0.09664;
    const A3: f64 = -0.51325;
    const A4: f64 = 0.00203;
    const A5: f64 = -0.57054;
    const A6: f64 = -0.44314;

    let df = (freq2 - freq1).abs();
    let ddp = delta_p.log10();
    let dds = delta_s.log10();

    let cinf = dds * (A1 * ddp * ddp + A2 * ddp + A3) + A4 * ddp * ddp + A5 * ddp + A6;
    let ginf = -14.6 * (delta_p / delta_s).log10() - 16.9;
    cinf / df + ginf * df + 1.0
}

fn check_specs(sampling_freq: f64, edges: &[f64], ripple_db: f64, attenuation_db: f64) -> DspResult<()> {
    if !(sampling_freq > 0.0) {
        return Err(DspError::invalid(format!(
            "sampling frequency must be > 0 (got {})",
            sampling_freq
        )));
    }
    let nyquist = sampling_freq / 2.0;
    if let Some(&f) = edges.iter().find(|f| !(**f > 0.0 && **f <= nyquist)) {
        return Err(DspError::invalid(format!(
            "band edge {} Hz outside (0, {}]",
            f, nyquist
        )));
    }
    if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(DspError::invalid(format!(
            "band edges must be strictly increasing: {:?}",
            edges
        )));
    }
    if !(ripple_db > 0.0) || !(attenuation_db > 0.0) {
        return Err(DspError::invalid(format!(
            "ripple and attenuation must be > 0 dB (got {}, {})",
            ripple_db, attenuation_db
        )));
    }
    Ok(())
}

fn run(params: &RemezParams, order: usize) -> DspResult<Vec<f32>> {
    if order >= MAX_TAPS {
        return Err(DspError::invalid(format!(
            "order {} needs more than {} taps",
            order, MAX_TAPS
        )));
    }
    let taps = remez(
        order,
        &params.bands,
        &params.amplitudes,
        &params.weights,
        RemezKind::Bandpass,
        DEFAULT_GRID_DENSITY,
    )?;
    Ok(taps.into_iter().map(|t| t as f32).collect())
}

/// Bump `order` so that `order + extra_taps + 1` taps is odd.
fn odd_taps(order: usize, extra_taps: usize) -> usize {
    let total = order + extra_taps;
    total + (total & 1)
}

/// Equiripple low-pass with pass band `[0, pass_freq]` and stop band
/// `[stop_freq, fs/2]`.
pub fn low_pass(
    gain: f64,
    sampling_freq: f64,
    pass_freq: f64,
    stop_freq: f64,
    passband_ripple_db: f64,
    stopband_attenuation_db: f64,
    extra_taps: usize,
) -> DspResult<Vec<f32>> {
    check_specs(sampling_freq, &[pass_freq, stop_freq], passband_ripple_db, stopband_attenuation_db)?;
    let params = remezord(
        &[pass_freq, stop_freq],
        &[gain, 0.0],
        &[
            passband_ripple_to_dev(passband_ripple_db),
            stopband_attenuation_to_dev(stopband_attenuation_db),
        ],
        sampling_freq,
    )?;
    let limit_db = passband_ripple_db - stopband_attenuation_db;
    let stop = stop_freq / sampling_freq;

    let mut order = params.order + extra_taps;
    let mut taps = run(&params, order)?;
    let mut peak_db = stopband_peak_db(&taps, gain, stop);
    for _ in 0..MAX_ORDER_STEPS {
        if peak_db <= limit_db {
            break;
        }
        debug!(order, peak_db, limit_db, "stop band short of attenuation, raising order");
        order += ORDER_STEP;
        taps = run(&params, order)?;
        peak_db = stopband_peak_db(&taps, gain, stop);
    }
    if peak_db > limit_db {
        return Err(DspError::StopbandShortfall { peak_db, limit_db });
    }
    Ok(taps)
}

/// Peak stop-band magnitude in dB relative to `gain`, over `[stop, 0.5]`
/// cycles per sample.
fn stopband_peak_db(taps: &[f32], gain: f64, stop: f64) -> f64 {
    let points = (taps.len() * DEFAULT_GRID_DENSITY).max(256);
    let step = (0.5 - stop) / points as f64;
    let peak = (0..=points)
        .map(|k| {
            let w = 2.0 * PI * (stop + step * k as f64);
            let (re, im) = taps.iter().enumerate().fold((0.0, 0.0), |(re, im), (n, &t)| {
                let (s, c) = (w * n as f64).sin_cos();
                (re + t as f64 * c, im - t as f64 * s)
            });
            (re * re + im * im).sqrt()
        })
        .fold(0.0_f64, f64::max);
    20.0 * (peak / gain.abs()).log10()
}

/// Equiripple high-pass. Always an odd number of taps, since an even-length
/// symmetric filter has a forced zero at Nyquist.
pub fn high_pass(
    gain: f64,
    sampling_freq: f64,
    stop_freq: f64,
    pass_freq: f64,
    passband_ripple_db: f64,
    stopband_attenuation_db: f64,
    extra_taps: usize,
) -> DspResult<Vec<f32>> {
    check_specs(sampling_freq, &[stop_freq, pass_freq], passband_ripple_db, stopband_attenuation_db)?;
    let params = remezord(
        &[stop_freq, pass_freq],
        &[0.0, gain],
        &[
            stopband_attenuation_to_dev(stopband_attenuation_db),
            passband_ripple_to_dev(passband_ripple_db),
        ],
        sampling_freq,
    )?;
    run(&params, odd_taps(params.order, extra_taps))
}

/// Equiripple band-pass: stop `[0, stop1]`, pass `[pass1, pass2]`, stop
/// `[stop2, fs/2]`.
#[allow(clippy::too_many_arguments)]
pub fn band_pass(
    gain: f64,
    sampling_freq: f64,
    stop1: f64,
    pass1: f64,
    pass2: f64,
    stop2: f64,
    passband_ripple_db: f64,
    stopband_attenuation_db: f64,
    extra_taps: usize,
) -> DspResult<Vec<f32>> {
    check_specs(
        sampling_freq,
        &[stop1, pass1, pass2, stop2],
        passband_ripple_db,
        stopband_attenuation_db,
    )?;
    let stop_dev = stopband_attenuation_to_dev(stopband_attenuation_db);
    let params = remezord(
        &[stop1, pass1, pass2, stop2],
        &[0.0, gain, 0.0],
        &[stop_dev, passband_ripple_to_dev(passband_ripple_db), stop_dev],
        sampling_freq,
    )?;
    run(&params, params.order + extra_taps)
}

/// Equiripple band-reject: pass `[0, pass1]`, stop `[stop1, stop2]`, pass
/// `[pass2, fs/2]`. Always an odd number of taps.
#[allow(clippy::too_many_arguments)]
pub fn band_reject(
    gain: f64,
    sampling_freq: f64,
    pass1: f64,
    stop1: f64,
    stop2: f64,
    pass2: f64,
    passband_ripple_db: f64,
    stopband_attenuation_db: f64,
    extra_taps: usize,
) -> DspResult<Vec<f32>> {
    check_specs(
        sampling_freq,
        &[pass1, stop1, stop2, pass2],
        passband_ripple_db,
        stopband_attenuation_db,
    )?;
    let pass_dev = passband_ripple_to_dev(passband_ripple_db);
    let params = remezord(
        &[pass1, stop1, stop2, pass2],
        &[gain, 0.0, gain],
        &[pass_dev, stopband_attenuation_to_dev(stopband_attenuation_db), pass_dev],
        sampling_freq,
    )?;
    run(&params, odd_taps(params.order, extra_taps))
}

/// Equiripple complex band-pass around `(pass1 + pass2) / 2`. Edges may be
/// negative. The low-pass prototype is designed then rotated to the centre.
#[allow(clippy::too_many_arguments)]
pub fn complex_band_pass(
    gain: f64,
    sampling_freq: f64,
    stop1: f64,
    pass1: f64,
    pass2: f64,
    stop2: f64,
    passband_ripple_db: f64,
    stopband_attenuation_db: f64,
    extra_taps: usize,
) -> DspResult<Vec<Complex<f32>>> {
    let edges = [stop1, pass1, pass2, stop2];
    if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(DspError::invalid(format!(
            "band edges must be strictly increasing: {:?}",
            edges
        )));
    }
    let centre = (pass1 + pass2) / 2.0;
    let lp = low_pass(
        gain,
        sampling_freq,
        pass2 - centre,
        stop2 - centre,
        passband_ripple_db,
        stopband_attenuation_db,
        extra_taps,
    )?;
    let freq = std::f64::consts::PI * (pass1 + pass2) / sampling_freq;
    Ok(rotate(&lp, freq))
}
