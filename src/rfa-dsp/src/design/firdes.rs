// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Window-method FIR design.
//!
//! Every design builds the truncated ideal impulse response around the
//! centre tap, multiplies it by the chosen window and normalises the gain at
//! the band's reference frequency. Tap counts are always odd.

use std::f64::consts::PI;

use num_complex::Complex;

use super::window::{taps_count, WindowSpec};
use crate::error::{DspError, DspResult};

// ============================================================================
// Parameter checks
// ============================================================================

fn check_rate(sampling_freq: f64) -> DspResult<()> {
    if !(sampling_freq > 0.0) {
        return Err(DspError::invalid(format!(
            "sampling frequency must be > 0 (got {})",
            sampling_freq
        )));
    }
    Ok(())
}

fn check_edge(name: &str, freq: f64, sampling_freq: f64) -> DspResult<()> {
    if !(freq > 0.0 && freq <= sampling_freq / 2.0) {
        return Err(DspError::invalid(format!(
            "{} {} Hz outside (0, {}]",
            name,
            freq,
            sampling_freq / 2.0
        )));
    }
    Ok(())
}

fn check_transition(transition_width: f64) -> DspResult<()> {
    if !(transition_width > 0.0) {
        return Err(DspError::invalid(format!(
            "transition width must be > 0 (got {})",
            transition_width
        )));
    }
    Ok(())
}

fn check_order(low: f64, high: f64) -> DspResult<()> {
    if low >= high {
        return Err(DspError::invalid(format!(
            "low cutoff {} must be below high cutoff {}",
            low, high
        )));
    }
    Ok(())
}

fn check_one(sampling_freq: f64, cutoff: f64, transition_width: f64) -> DspResult<()> {
    check_rate(sampling_freq)?;
    check_edge("cutoff", cutoff, sampling_freq)?;
    check_transition(transition_width)
}

fn check_two(sampling_freq: f64, low: f64, high: f64, transition_width: f64) -> DspResult<()> {
    check_rate(sampling_freq)?;
    check_edge("low cutoff", low, sampling_freq)?;
    check_edge("high cutoff", high, sampling_freq)?;
    check_order(low, high)?;
    check_transition(transition_width)
}

fn design_window(
    sampling_freq: f64,
    transition_width: f64,
    attenuation_db: Option<f64>,
    window: WindowSpec,
) -> DspResult<Vec<f64>> {
    let atten = attenuation_db.unwrap_or_else(|| window.max_attenuation());
    if !(atten > 0.0) {
        return Err(DspError::invalid(format!(
            "attenuation must be > 0 dB (got {})",
            atten
        )));
    }
    window.build(taps_count(sampling_freq, transition_width, atten))
}

fn scale(taps: Vec<f64>, factor: f64) -> Vec<f32> {
    taps.into_iter().map(|t| (t * factor) as f32).collect()
}

// ============================================================================
// Real designs
// ============================================================================

/// Low-pass with unity-times-`gain` response at DC.
///
/// `attenuation_db` of `None` sizes the filter for the window's best
/// attenuation.
pub fn low_pass(
    gain: f64,
    sampling_freq: f64,
    cutoff_freq: f64,
    transition_width: f64,
    attenuation_db: Option<f64>,
    window: WindowSpec,
) -> DspResult<Vec<f32>> {
    check_one(sampling_freq, cutoff_freq, transition_width)?;
    let w = design_window(sampling_freq, transition_width, attenuation_db, window)?;
    let m = (w.len() - 1) / 2;
    let fw_t0 = 2.0 * PI * cutoff_freq / sampling_freq;

    let mut taps = vec![0.0; w.len()];
    taps[m] = fw_t0 / PI * w[m];
    for n in 1..=m {
        let v = (n as f64 * fw_t0).sin() / (n as f64 * PI);
        taps[m + n] = v * w[m + n];
        taps[m - n] = v * w[m - n];
    }

    let fmax = taps[m] + 2.0 * (1..=m).map(|n| taps[m + n]).sum::<f64>();
    Ok(scale(taps, gain / fmax))
}

/// High-pass normalised at Nyquist.
pub fn high_pass(
    gain: f64,
    sampling_freq: f64,
    cutoff_freq: f64,
    transition_width: f64,
    attenuation_db: Option<f64>,
    window: WindowSpec,
) -> DspResult<Vec<f32>> {
    check_one(sampling_freq, cutoff_freq, transition_width)?;
    let w = design_window(sampling_freq, transition_width, attenuation_db, window)?;
    let m = (w.len() - 1) / 2;
    let fw_t0 = 2.0 * PI * cutoff_freq / sampling_freq;

    let mut taps = vec![0.0; w.len()];
    taps[m] = (1.0 - fw_t0 / PI) * w[m];
    for n in 1..=m {
        let v = -(n as f64 * fw_t0).sin() / (n as f64 * PI);
        taps[m + n] = v * w[m + n];
        taps[m - n] = v * w[m - n];
    }

    let fmax = taps[m]
        + 2.0
            * (1..=m)
                .map(|n| taps[m + n] * (n as f64 * PI).cos())
                .sum::<f64>();
    Ok(scale(taps, gain / fmax))
}

/// Band-pass normalised at the band centre.
pub fn band_pass(
    gain: f64,
    sampling_freq: f64,
    low_cutoff: f64,
    high_cutoff: f64,
    transition_width: f64,
    attenuation_db: Option<f64>,
    window: WindowSpec,
) -> DspResult<Vec<f32>> {
    check_two(sampling_freq, low_cutoff, high_cutoff, transition_width)?;
    let w = design_window(sampling_freq, transition_width, attenuation_db, window)?;
    let m = (w.len() - 1) / 2;
    let fw_t0 = 2.0 * PI * low_cutoff / sampling_freq;
    let fw_t1 = 2.0 * PI * high_cutoff / sampling_freq;

    let mut taps = vec![0.0; w.len()];
    taps[m] = (fw_t1 - fw_t0) / PI * w[m];
    for n in 1..=m {
        let nf = n as f64;
        let v = ((nf * fw_t1).sin() - (nf * fw_t0).sin()) / (nf * PI);
        taps[m + n] = v * w[m + n];
        taps[m - n] = v * w[m - n];
    }

    let centre = (fw_t0 + fw_t1) * 0.5;
    let fmax = taps[m]
        + 2.0
            * (1..=m)
                .map(|n| taps[m + n] * (n as f64 * centre).cos())
                .sum::<f64>();
    Ok(scale(taps, gain / fmax))
}

/// Band-reject normalised at DC.
pub fn band_reject(
    gain: f64,
    sampling_freq: f64,
    low_cutoff: f64,
    high_cutoff: f64,
    transition_width: f64,
    attenuation_db: Option<f64>,
    window: WindowSpec,
) -> DspResult<Vec<f32>> {
    check_two(sampling_freq, low_cutoff, high_cutoff, transition_width)?;
    let w = design_window(sampling_freq, transition_width, attenuation_db, window)?;
    let m = (w.len() - 1) / 2;
    let fw_t0 = 2.0 * PI * low_cutoff / sampling_freq;
    let fw_t1 = 2.0 * PI * high_cutoff / sampling_freq;

    let mut taps = vec![0.0; w.len()];
    taps[m] = (1.0 + (fw_t0 - fw_t1) / PI) * w[m];
    for n in 1..=m {
        let nf = n as f64;
        let v = ((nf * fw_t0).sin() - (nf * fw_t1).sin()) / (nf * PI);
        taps[m + n] = v * w[m + n];
        taps[m - n] = v * w[m - n];
    }

    let fmax = taps[m] + 2.0 * (1..=m).map(|n| taps[m + n]).sum::<f64>();
    Ok(scale(taps, gain / fmax))
}

/// Complex band-pass for `[low_cutoff, high_cutoff]`, which may straddle
/// DC (`-fs/2 <= f <= fs/2`). Designed as a low-pass of half the band width
/// and rotated to the band centre.
pub fn complex_band_pass(
    gain: f64,
    sampling_freq: f64,
    low_cutoff: f64,
    high_cutoff: f64,
    transition_width: f64,
    attenuation_db: Option<f64>,
    window: WindowSpec,
) -> DspResult<Vec<Complex<f32>>> {
    check_rate(sampling_freq)?;
    let nyquist = sampling_freq / 2.0;
    for (name, f) in [("low cutoff", low_cutoff), ("high cutoff", high_cutoff)] {
        if !(-nyquist..=nyquist).contains(&f) {
            return Err(DspError::invalid(format!(
                "{} {} Hz outside [{}, {}]",
                name, f, -nyquist, nyquist
            )));
        }
    }
    check_order(low_cutoff, high_cutoff)?;
    check_transition(transition_width)?;

    let lp = low_pass(
        gain,
        sampling_freq,
        (high_cutoff - low_cutoff) / 2.0,
        transition_width,
        attenuation_db,
        window,
    )?;
    let freq = PI * (high_cutoff + low_cutoff) / sampling_freq;
    Ok(rotate(&lp, freq))
}

/// Shift a real low-pass prototype to `freq` radians per sample, keeping
/// the phase reference on the centre tap.
pub(crate) fn rotate(taps: &[f32], freq: f64) -> Vec<Complex<f32>> {
    let len = taps.len();
    let mut phase = if len % 2 == 1 {
        -freq * (len >> 1) as f64
    } else {
        -freq / 2.0 * len as f64
    };
    taps.iter()
        .map(|&t| {
            let t = t as f64;
            let c = Complex::new((t * phase.cos()) as f32, (t * phase.sin()) as f32);
            phase += freq;
            c
        })
        .collect()
}

/// Hilbert transformer. `ntaps` must be odd and at least 3.
pub fn hilbert(ntaps: usize, window: WindowSpec) -> DspResult<Vec<f32>> {
    if ntaps < 3 || ntaps % 2 == 0 {
        return Err(DspError::invalid(format!(
            "hilbert needs an odd number of taps >= 3 (got {})",
            ntaps
        )));
    }
    let w = window.build(ntaps)?;
    let h = (ntaps - 1) / 2;
    let mut taps = vec![0.0; ntaps];
    let mut gain = 0.0;
    for i in (1..=h).step_by(2) {
        let x = 1.0 / i as f64;
        taps[h + i] = x * w[h + i];
        taps[h - i] = -x * w[h - i];
        gain = taps[h + i] - gain;
    }
    let gain = 2.0 * f64::abs(gain);
    Ok(scale(taps, 1.0 / gain))
}

/// Gaussian pulse-shaping filter (GMSK style), `bt` is the bandwidth-time
/// product and `samples_per_symbol` the oversampling.
pub fn gaussian(gain: f64, samples_per_symbol: f64, bt: f64, ntaps: usize) -> DspResult<Vec<f32>> {
    if ntaps == 0 {
        return Err(DspError::invalid("gaussian needs at least one tap"));
    }
    if !(samples_per_symbol > 0.0) || !(bt > 0.0) {
        return Err(DspError::invalid(format!(
            "gaussian needs positive samples per symbol and BT (got {}, {})",
            samples_per_symbol, bt
        )));
    }
    let dt = 1.0 / samples_per_symbol;
    let s = 1.0 / (f64::ln(2.0).sqrt() / (2.0 * PI * bt));
    let mut t0 = -0.5 * ntaps as f64;
    let mut taps = Vec::with_capacity(ntaps);
    for _ in 0..ntaps {
        t0 += 1.0;
        let ts = s * dt * t0;
        taps.push((-0.5 * ts * ts).exp());
    }
    let sum: f64 = taps.iter().sum();
    Ok(scale(taps, gain / sum))
}

/// Root-raised-cosine pulse-shaping filter. An even `ntaps` is bumped to
/// the next odd count.
pub fn root_raised_cosine(
    gain: f64,
    sampling_freq: f64,
    symbol_rate: f64,
    alpha: f64,
    ntaps: usize,
) -> DspResult<Vec<f32>> {
    if ntaps == 0 {
        return Err(DspError::invalid("root raised cosine needs at least one tap"));
    }
    check_rate(sampling_freq)?;
    if !(symbol_rate > 0.0) {
        return Err(DspError::invalid(format!(
            "symbol rate must be > 0 (got {})",
            symbol_rate
        )));
    }
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(DspError::invalid(format!(
            "roll-off alpha must be in (0, 1] (got {})",
            alpha
        )));
    }

    let ntaps = ntaps | 1;
    let spb = sampling_freq / symbol_rate;
    let mut taps = vec![0.0; ntaps];
    let mut total = 0.0;

    for (i, tap) in taps.iter_mut().enumerate() {
        let xindx = i as f64 - (ntaps / 2) as f64;
        let x1 = PI * xindx / spb;
        let x2 = 4.0 * alpha * xindx / spb;
        let x3 = x2 * x2 - 1.0;

        let (num, den) = if x3.abs() >= 1e-6 {
            let num = if i != ntaps / 2 {
                ((1.0 + alpha) * x1).cos() + ((1.0 - alpha) * x1).sin() / (4.0 * alpha * xindx / spb)
            } else {
                ((1.0 + alpha) * x1).cos() + (1.0 - alpha) * PI / (4.0 * alpha)
            };
            (num, x3 * PI)
        } else {
            if alpha == 1.0 {
                *tap = -1.0;
                continue;
            }
            let x3 = (1.0 - alpha) * x1;
            let x2 = (1.0 + alpha) * x1;
            let num = x2.sin() * (1.0 + alpha) * PI
                - x3.cos() * ((1.0 - alpha) * PI * spb) / (4.0 * alpha * xindx)
                + x3.sin() * spb * spb / (4.0 * alpha * xindx * xindx);
            (num, -32.0 * PI * alpha * alpha * xindx / spb)
        };

        *tap = 4.0 * alpha * num / den;
        total += *tap;
    }

    Ok(scale(taps, gain / total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::window::WindowType;

    fn response(taps: &[f32], freq: f64, sampling_freq: f64) -> f64 {
        let w = 2.0 * PI * freq / sampling_freq;
        let (re, im) = taps.iter().enumerate().fold((0.0, 0.0), |(re, im), (n, &t)| {
            let t = t as f64;
            (re + t * (w * n as f64).cos(), im - t * (w * n as f64).sin())
        });
        (re * re + im * im).sqrt()
    }

    #[test]
    fn low_pass_dc_gain_matches_requested_gain() {
        for gain in [1.0, 2.5] {
            let taps = low_pass(gain, 48_000.0, 5_000.0, 1_000.0, None, WindowSpec::default())
                .unwrap();
            assert_eq!(taps.len() % 2, 1, "tap count must be odd");
            let dc: f64 = taps.iter().map(|&t| t as f64).sum();
            assert!((dc - gain).abs() < 1e-5, "DC gain {} != {}", dc, gain);
        }
    }

    #[test]
    fn low_pass_tap_count_uses_window_attenuation() {
        let taps = low_pass(1.0, 1000.0, 100.0, 100.0, None, WindowSpec::new(WindowType::Hann))
            .unwrap();
        assert_eq!(taps.len(), 21);
        let taps = low_pass(1.0, 1000.0, 100.0, 100.0, Some(66.0), WindowSpec::default()).unwrap();
        assert_eq!(taps.len(), 31);
    }

    #[test]
    fn low_pass_attenuates_stop_band() {
        let fs = 48_000.0;
        let taps = low_pass(1.0, fs, 4_000.0, 1_000.0, None, WindowSpec::new(WindowType::Blackman))
            .unwrap();
        assert!(response(&taps, 1_000.0, fs) > 0.95);
        assert!(response(&taps, 8_000.0, fs) < 1e-3);
    }

    #[test]
    fn high_pass_normalised_at_nyquist() {
        let fs = 8_000.0;
        let taps = high_pass(1.0, fs, 2_000.0, 400.0, None, WindowSpec::default()).unwrap();
        assert!((response(&taps, fs / 2.0, fs) - 1.0).abs() < 1e-4);
        assert!(response(&taps, 0.0, fs) < 1e-2);
    }

    #[test]
    fn band_pass_normalised_at_centre() {
        let fs = 48_000.0;
        let taps = band_pass(1.0, fs, 6_000.0, 10_000.0, 1_000.0, None, WindowSpec::default())
            .unwrap();
        assert!((response(&taps, 8_000.0, fs) - 1.0).abs() < 1e-2);
        assert!(response(&taps, 0.0, fs) < 1e-2);
    }

    #[test]
    fn band_reject_passes_dc_and_nulls_band() {
        let fs = 48_000.0;
        let taps = band_reject(1.0, fs, 6_000.0, 10_000.0, 1_000.0, None, WindowSpec::default())
            .unwrap();
        let dc: f64 = taps.iter().map(|&t| t as f64).sum();
        assert!((dc - 1.0).abs() < 1e-5);
        assert!(response(&taps, 8_000.0, fs) < 1e-2);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let w = WindowSpec::default();
        assert!(low_pass(1.0, 0.0, 100.0, 10.0, None, w).is_err(), "fs = 0");
        assert!(low_pass(1.0, 1000.0, 0.0, 10.0, None, w).is_err(), "cutoff = 0");
        assert!(low_pass(1.0, 1000.0, 600.0, 10.0, None, w).is_err(), "cutoff > fs/2");
        assert!(low_pass(1.0, 1000.0, 100.0, 0.0, None, w).is_err(), "tw = 0");
        assert!(band_pass(1.0, 1000.0, 300.0, 200.0, 10.0, None, w).is_err(), "low > high");
        assert!(band_reject(1.0, 1000.0, 200.0, 200.0, 10.0, None, w).is_err(), "low == high");
        assert!(
            complex_band_pass(1.0, 1000.0, -600.0, 100.0, 10.0, None, w).is_err(),
            "low < -fs/2"
        );
    }

    #[test]
    fn complex_band_pass_is_shifted() {
        let fs = 48_000.0;
        let w = WindowSpec::default();
        let taps = complex_band_pass(1.0, fs, 4_000.0, 8_000.0, 1_000.0, None, w).unwrap();
        let resp = |f: f64| {
            let omega = 2.0 * PI * f / fs;
            taps.iter()
                .enumerate()
                .map(|(n, t)| {
                    let t = Complex::new(t.re as f64, t.im as f64);
                    t * Complex::from_polar(1.0, -omega * n as f64)
                })
                .sum::<Complex<f64>>()
                .norm()
        };
        assert!((resp(6_000.0) - 1.0).abs() < 1e-2, "centre {}", resp(6_000.0));
        assert!(resp(-6_000.0) < 1e-2, "image {}", resp(-6_000.0));
    }

    #[test]
    fn hilbert_requires_odd_taps() {
        assert!(hilbert(10, WindowSpec::default()).is_err());
        assert!(hilbert(1, WindowSpec::default()).is_err());
    }

    #[test]
    fn hilbert_is_antisymmetric() {
        let taps = hilbert(11, WindowSpec::new(WindowType::Rectangular)).unwrap();
        assert_eq!(taps[5], 0.0, "centre tap");
        assert_eq!(taps[7], 0.0, "even offsets are zero");
        assert_eq!(taps[3], 0.0, "even offsets are zero");
        for i in 1..=5 {
            assert!((taps[5 + i] + taps[5 - i]).abs() < 1e-7, "offset {}", i);
        }
        assert!(taps[6] > 0.0);
    }

    #[test]
    fn gaussian_sums_to_gain() {
        let taps = gaussian(1.5, 4.0, 0.35, 33).unwrap();
        let sum: f64 = taps.iter().map(|&t| t as f64).sum();
        assert!((sum - 1.5).abs() < 1e-5);
        assert!(gaussian(1.0, 4.0, 0.35, 0).is_err());
    }

    #[test]
    fn rrc_is_odd_and_normalised() {
        let taps = root_raised_cosine(1.0, 48_000.0, 4_800.0, 0.35, 100).unwrap();
        assert_eq!(taps.len(), 101);
        let sum: f64 = taps.iter().map(|&t| t as f64).sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..50 {
            assert!((taps[i] - taps[100 - i]).abs() < 1e-6, "RRC must be symmetric");
        }
        assert!(root_raised_cosine(1.0, 48_000.0, 4_800.0, 0.0, 11).is_err());
    }
}
