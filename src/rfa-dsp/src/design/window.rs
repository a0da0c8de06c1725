// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Window functions for the window-method FIR designer.

use std::f64::consts::PI;

use crate::error::{DspError, DspResult};

const BLACKMAN_TERMS: [f64; 5] = [0.084037, -0.29145, 0.375696, -0.20762, 0.041194];

const BLACKMAN_HARRIS_61: [f64; 3] = [0.42323, -0.49755, 0.07922];
const BLACKMAN_HARRIS_67: [f64; 3] = [0.44959, -0.49364, 0.05677];
const BLACKMAN_HARRIS_74: [f64; 4] = [0.40271, -0.49703, 0.09392, -0.00183];
const BLACKMAN_HARRIS_92: [f64; 4] = [0.35875, -0.48829, 0.14128, -0.01168];

const FLATTOP_SCALE: f64 = 4.63867;
const FLATTOP_TERMS: [f64; 5] = [
    1.0 / FLATTOP_SCALE,
    1.93 / FLATTOP_SCALE,
    1.29 / FLATTOP_SCALE,
    0.388 / FLATTOP_SCALE,
    0.028 / FLATTOP_SCALE,
];

const IZERO_EPSILON: f64 = 1e-21;

/// Default Kaiser beta (about 70 dB of stop-band attenuation).
pub const DEFAULT_KAISER_BETA: f64 = 6.76;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowType {
    /// Max attenuation 53 dB.
    Hamming,
    /// Max attenuation 44 dB.
    Hann,
    /// Max attenuation 74 dB.
    Blackman,
    /// Max attenuation 21 dB.
    Rectangular,
    /// Max attenuation depends on beta.
    Kaiser,
    /// Max attenuation 92 dB.
    BlackmanHarris,
    /// Triangular, max attenuation 27 dB.
    Bartlett,
    /// Max attenuation 93 dB.
    Flattop,
}

impl WindowType {
    /// Best stop-band attenuation (dB) reachable with this window.
    pub fn max_attenuation(self, beta: f64) -> f64 {
        match self {
            WindowType::Hamming => 53.0,
            WindowType::Hann => 44.0,
            WindowType::Blackman => 74.0,
            WindowType::Rectangular => 21.0,
            WindowType::Kaiser => beta / 0.1102 + 8.7,
            WindowType::BlackmanHarris => 92.0,
            WindowType::Bartlett => 27.0,
            WindowType::Flattop => 93.0,
        }
    }

    /// Build an `ntaps` long window. `beta` is only used by Kaiser.
    pub fn build(self, ntaps: usize, beta: f64) -> DspResult<Vec<f64>> {
        if ntaps <= 1 {
            return Ok(vec![1.0; ntaps]);
        }
        let m = (ntaps - 1) as f64;
        let taps = match self {
            WindowType::Hamming => (0..ntaps)
                .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / m).cos())
                .collect(),
            WindowType::Hann => (0..ntaps)
                .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / m).cos())
                .collect(),
            WindowType::Blackman => coswindow(ntaps, &BLACKMAN_TERMS),
            WindowType::Rectangular => vec![1.0; ntaps],
            WindowType::Kaiser => kaiser(ntaps, beta)?,
            WindowType::BlackmanHarris => blackman_harris(ntaps, 92)?,
            WindowType::Bartlett => (0..ntaps)
                .map(|n| {
                    let x = 2.0 * n as f64 / m;
                    if n < ntaps / 2 {
                        x
                    } else {
                        2.0 - x
                    }
                })
                .collect(),
            WindowType::Flattop => coswindow(ntaps, &FLATTOP_TERMS),
        };
        Ok(taps)
    }
}

/// A window type together with its shape parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSpec {
    pub kind: WindowType,
    /// Kaiser beta; ignored by the other windows.
    pub beta: f64,
}

impl WindowSpec {
    pub fn new(kind: WindowType) -> Self {
        Self {
            kind,
            beta: DEFAULT_KAISER_BETA,
        }
    }

    pub fn kaiser(beta: f64) -> Self {
        Self {
            kind: WindowType::Kaiser,
            beta,
        }
    }

    pub fn max_attenuation(&self) -> f64 {
        self.kind.max_attenuation(self.beta)
    }

    pub fn build(&self, ntaps: usize) -> DspResult<Vec<f64>> {
        self.kind.build(ntaps, self.beta)
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self::new(WindowType::Hamming)
    }
}

/// Generalised cosine window: `sum(poly[k] * cos(k * phase))` with the
/// phase stepping `2π / (ntaps - 1)` per tap.
pub fn coswindow(ntaps: usize, poly: &[f64]) -> Vec<f64> {
    let step = if ntaps > 1 {
        2.0 * PI / (ntaps - 1) as f64
    } else {
        0.0
    };
    (0..ntaps)
        .map(|index| {
            let phase = step * index as f64;
            poly.iter()
                .enumerate()
                .map(|(k, &c)| c * (k as f64 * phase).cos())
                .sum()
        })
        .collect()
}

/// Blackman-Harris window for one of the tabulated attenuation variants
/// (61, 67, 74 or 92 dB).
pub fn blackman_harris(ntaps: usize, attenuation_db: u32) -> DspResult<Vec<f64>> {
    let poly: &[f64] = match attenuation_db {
        61 => &BLACKMAN_HARRIS_61,
        67 => &BLACKMAN_HARRIS_67,
        74 => &BLACKMAN_HARRIS_74,
        92 => &BLACKMAN_HARRIS_92,
        other => {
            return Err(DspError::invalid(format!(
                "no Blackman-Harris variant for {} dB (available: 61, 67, 74, 92)",
                other
            )))
        }
    };
    Ok(coswindow(ntaps, poly))
}

fn kaiser(ntaps: usize, beta: f64) -> DspResult<Vec<f64>> {
    if beta < 0.0 {
        return Err(DspError::invalid("kaiser window beta must be >= 0"));
    }
    let inv_izero_beta = 1.0 / izero(beta);
    let inm1 = 1.0 / (ntaps - 1) as f64;
    Ok((0..ntaps)
        .map(|i| {
            let temp = 2.0 * i as f64 * inm1 - 1.0;
            izero(beta * (1.0 - temp * temp).sqrt()) * inv_izero_beta
        })
        .collect())
}

/// Zeroth-order modified Bessel function of the first kind (series form).
pub fn izero(x: f64) -> f64 {
    let half_x = x / 2.0;
    let mut sum = 1.0;
    let mut u = 1.0;
    let mut n = 1.0;
    loop {
        let temp = half_x / n;
        n += 1.0;
        u *= temp * temp;
        sum += u;
        if u < IZERO_EPSILON * sum {
            break;
        }
    }
    sum
}

/// Number of taps needed for `attenuation_db` over a transition band of
/// `transition_width` Hz at `sampling_freq`, forced odd
/// (fred harris' rule of thumb).
pub fn taps_count(sampling_freq: f64, transition_width: f64, attenuation_db: f64) -> usize {
    let ntaps = (attenuation_db * sampling_freq / (22.0 * transition_width)) as usize;
    ntaps | 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_symmetric(w: &[f64]) {
        let n = w.len();
        for i in 0..n / 2 {
            assert!(
                (w[i] - w[n - 1 - i]).abs() < 1e-12,
                "window not symmetric at {}: {} vs {}",
                i,
                w[i],
                w[n - 1 - i]
            );
        }
    }

    #[test]
    fn windows_are_symmetric() {
        for kind in [
            WindowType::Hamming,
            WindowType::Hann,
            WindowType::Blackman,
            WindowType::Rectangular,
            WindowType::Kaiser,
            WindowType::BlackmanHarris,
            WindowType::Bartlett,
            WindowType::Flattop,
        ] {
            let w = kind.build(31, DEFAULT_KAISER_BETA).unwrap();
            assert_eq!(w.len(), 31);
            assert_symmetric(&w);
        }
    }

    #[test]
    fn hamming_endpoints_and_peak() {
        let w = WindowType::Hamming.build(21, 0.0).unwrap();
        assert!((w[0] - 0.08).abs() < 1e-12);
        assert!((w[10] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kaiser_peak_is_unity() {
        let w = WindowType::Kaiser.build(51, 5.0).unwrap();
        assert!((w[25] - 1.0).abs() < 1e-12);
        assert!(w[0] < w[25]);
    }

    #[test]
    fn kaiser_rejects_negative_beta() {
        assert!(matches!(
            WindowType::Kaiser.build(11, -1.0),
            Err(DspError::InvalidParameter(_))
        ));
    }

    #[test]
    fn blackman_harris_variant_lookup() {
        assert!(blackman_harris(15, 74).is_ok());
        assert!(blackman_harris(15, 80).is_err());
    }

    #[test]
    fn izero_matches_known_values() {
        assert!((izero(0.0) - 1.0).abs() < 1e-15);
        // I0(1) = 1.2660658777520082
        assert!((izero(1.0) - 1.266_065_877_752_008_2).abs() < 1e-12);
    }

    #[test]
    fn taps_count_is_odd() {
        assert_eq!(taps_count(1000.0, 100.0, 44.0), 21);
        // 60 * 48000 / (22 * 1000) = 130.9 -> 130 -> 131
        assert_eq!(taps_count(48_000.0, 1000.0, 60.0), 131);
    }

    #[test]
    fn tiny_windows() {
        assert!(WindowType::Hann.build(0, 0.0).unwrap().is_empty());
        assert_eq!(WindowType::Hann.build(1, 0.0).unwrap(), vec![1.0]);
    }
}
