// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f32::consts::PI;
use std::sync::Arc;

use rfa_core::SampleBuffer;
use rustfft::num_complex::Complex as FftComplex;
use rustfft::{Fft, FftPlanner};

use crate::error::{DspError, DspResult};

/// Floor for magnitudes before taking the logarithm.
const MIN_MAGNITUDE: f32 = 1e-10;

/// One spectrum snapshot, bins ordered from `-fs/2` to `+fs/2` around
/// `frequency`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    pub sample_rate: u32,
    pub frequency: i64,
    /// Magnitude per bin in dB (20·log10 of the normalized magnitude).
    pub bins: Vec<f32>,
}

impl SpectrumFrame {
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.bins.len().max(1) as f64
    }

    /// Absolute centre frequency of bin `k`.
    pub fn bin_frequency(&self, k: usize) -> f64 {
        let half = (self.bins.len() / 2) as f64;
        self.frequency as f64 + (k as f64 - half) * self.bin_width()
    }

    /// Mean power over the bins whose centre lies in `[low_hz, high_hz]`,
    /// averaged in the linear domain. `None` when the band holds no bin.
    pub fn band_power_db(&self, low_hz: f64, high_hz: f64) -> Option<f32> {
        let (sum, count) = (0..self.bins.len())
            .filter(|&k| {
                let f = self.bin_frequency(k);
                f >= low_hz && f <= high_hz
            })
            .fold((0.0f64, 0usize), |(sum, count), k| {
                (sum + 10f64.powf(self.bins[k] as f64 / 10.0), count + 1)
            });
        (count > 0).then(|| (10.0 * (sum / count as f64).log10()) as f32)
    }
}

/// Hann-windowed FFT over the first `fft_size` samples of a buffer.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    hann_window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<FftComplex<f32>>,
    /// Exponential smoothing factor in `(0, 1]`; 1 disables averaging.
    averaging: f32,
    averaged: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize) -> DspResult<Self> {
        if fft_size < 2 {
            return Err(DspError::invalid(format!("fft size must be >= 2 (got {})", fft_size)));
        }
        let hann_window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (fft_size - 1) as f32).cos()))
            .collect();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            fft_size,
            hann_window,
            fft,
            scratch: vec![FftComplex::new(0.0, 0.0); fft_size],
            averaging: 1.0,
            averaged: Vec::new(),
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Set the smoothing factor applied across frames.
    pub fn set_averaging(&mut self, factor: f32) -> DspResult<()> {
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(DspError::invalid(format!(
                "averaging factor must be in (0, 1] (got {})",
                factor
            )));
        }
        self.averaging = factor;
        self.averaged.clear();
        Ok(())
    }

    /// Transform `samples`. Short buffers are zero padded.
    pub fn process(&mut self, samples: &SampleBuffer) -> SpectrumFrame {
        let take = samples.size().min(self.fft_size);
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            *slot = if i < take {
                let w = self.hann_window[i];
                FftComplex::new(samples.re()[i] * w, samples.im()[i] * w)
            } else {
                FftComplex::new(0.0, 0.0)
            };
        }
        self.fft.process(&mut self.scratch);

        let half = self.fft_size / 2;
        let n = self.fft_size as f32;
        let bins: Vec<f32> = self.scratch[half..]
            .iter()
            .chain(self.scratch[..half].iter())
            .map(|value| 20.0 * (value.norm() / n).max(MIN_MAGNITUDE).log10())
            .collect();

        let bins = if self.averaging < 1.0 && self.averaged.len() == bins.len() {
            for (avg, new) in self.averaged.iter_mut().zip(&bins) {
                *avg += self.averaging * (new - *avg);
            }
            self.averaged.clone()
        } else {
            self.averaged = bins.clone();
            bins
        };

        SpectrumFrame {
            sample_rate: samples.sample_rate(),
            frequency: samples.frequency(),
            bins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, rate: u32, offset_hz: f64) -> SampleBuffer {
        let mut buf = SampleBuffer::new(len);
        for n in 0..len {
            let phase = 2.0 * std::f64::consts::PI * offset_hz * n as f64 / rate as f64;
            buf.push(phase.cos() as f32, phase.sin() as f32);
        }
        buf.set_sample_rate(rate);
        buf.set_frequency(100_000_000);
        buf
    }

    fn peak(frame: &SpectrumFrame) -> usize {
        frame
            .bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap()
    }

    #[test]
    fn tone_lands_in_shifted_bin() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        // 12 bins above centre.
        let frame = analyzer.process(&tone(1024, 1_024_000, 12_000.0));
        assert_eq!(frame.bins.len(), 1024);
        assert_eq!(peak(&frame), 512 + 12);
        assert!((frame.bin_frequency(524) - 100_012_000.0).abs() < 1e-6);
        assert_eq!(frame.frequency, 100_000_000);

        let frame = analyzer.process(&tone(1024, 1_024_000, -100_000.0));
        assert_eq!(peak(&frame), 512 - 100);
    }

    #[test]
    fn band_power_sees_tone() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        let frame = analyzer.process(&tone(1024, 1_024_000, 12_000.0));
        let on = frame.band_power_db(100_010_000.0, 100_014_000.0).unwrap();
        let off = frame.band_power_db(100_200_000.0, 100_300_000.0).unwrap();
        assert!(on - off > 40.0, "tone {} dB vs noise {} dB", on, off);
        assert!(frame.band_power_db(0.0, 1.0).is_none());
    }

    #[test]
    fn short_buffer_is_zero_padded() {
        let mut analyzer = SpectrumAnalyzer::new(256).unwrap();
        let frame = analyzer.process(&SampleBuffer::new(16));
        assert_eq!(frame.bins.len(), 256);
        assert!(frame.bins.iter().all(|&b| b <= 20.0 * MIN_MAGNITUDE.log10() + 1e-3));
    }

    #[test]
    fn averaging_smooths_frames() {
        let mut analyzer = SpectrumAnalyzer::new(256).unwrap();
        analyzer.set_averaging(0.5).unwrap();
        let loud = tone(256, 256_000, 0.0);
        let first = analyzer.process(&loud);
        let second = analyzer.process(&SampleBuffer::new(256));
        let centre = 128;
        let floor = 20.0 * MIN_MAGNITUDE.log10();
        let expected = first.bins[centre] + 0.5 * (floor - first.bins[centre]);
        assert!((second.bins[centre] - expected).abs() < 1e-3);
        assert!(analyzer.set_averaging(0.0).is_err());
        assert!(analyzer.set_averaging(1.5).is_err());
    }

    #[test]
    fn rejects_tiny_fft() {
        assert!(SpectrumAnalyzer::new(0).is_err());
        assert!(SpectrumAnalyzer::new(1).is_err());
    }
}
