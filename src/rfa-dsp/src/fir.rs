// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Decimating FIR filters.
//!
//! Three engines cover the tap/sample domains. Each keeps a circular delay
//! line, a write index and a decimation phase across calls, so a block that
//! was cut short by a full output buffer resumes exactly where it stopped.

mod chain;

use num_complex::Complex;
use rfa_core::SampleBuffer;

use crate::design::DesignParams;
use crate::error::{DspError, DspResult};

pub use chain::FilterChain;

// ============================================================================
// Engines
// ============================================================================

fn check_engine(ntaps: usize, decimation: usize) -> DspResult<()> {
    if ntaps == 0 {
        return Err(DspError::invalid("filter needs at least one tap"));
    }
    if decimation == 0 {
        return Err(DspError::invalid("decimation must be >= 1"));
    }
    Ok(())
}

/// Dot product of `taps` with a real delay line, newest sample at `index`
/// and walking backwards.
#[inline]
fn dot_real(taps: &[f32], delay: &[f32], index: usize) -> f32 {
    let (head, tail) = taps.split_at(index + 1);
    let newer: f32 = head
        .iter()
        .zip(delay[..=index].iter().rev())
        .map(|(t, d)| t * d)
        .sum();
    let older: f32 = tail
        .iter()
        .zip(delay[index + 1..].iter().rev())
        .map(|(t, d)| t * d)
        .sum();
    newer + older
}

/// Real taps against an interleaved complex delay line.
#[inline]
fn dot_real_complex(taps: &[f32], delay: &[f32], index: usize) -> (f32, f32) {
    let (head, tail) = taps.split_at(index + 1);
    let newer = delay[..2 * (index + 1)].chunks_exact(2);
    let older = delay[2 * (index + 1)..].chunks_exact(2);
    let mut re = 0.0;
    let mut im = 0.0;
    for (t, d) in head.iter().zip(newer.rev()).chain(tail.iter().zip(older.rev())) {
        re += t * d[0];
        im += t * d[1];
    }
    (re, im)
}

/// Complex taps against an interleaved complex delay line.
#[inline]
fn dot_complex(taps: &[Complex<f32>], delay: &[f32], index: usize) -> (f32, f32) {
    let (head, tail) = taps.split_at(index + 1);
    let newer = delay[..2 * (index + 1)].chunks_exact(2);
    let older = delay[2 * (index + 1)..].chunks_exact(2);
    let mut re = 0.0;
    let mut im = 0.0;
    for (t, d) in head.iter().zip(newer.rev()).chain(tail.iter().zip(older.rev())) {
        re += t.re * d[0] - t.im * d[1];
        im += t.re * d[1] + t.im * d[0];
    }
    (re, im)
}

/// Real taps over real samples.
#[derive(Debug, Clone)]
pub struct RealFir {
    taps: Vec<f32>,
    delay: Vec<f32>,
    index: usize,
    decimation: usize,
    phase: usize,
}

impl RealFir {
    pub fn new(taps: Vec<f32>, decimation: usize) -> DspResult<Self> {
        check_engine(taps.len(), decimation)?;
        Ok(Self {
            delay: vec![0.0; taps.len()],
            taps,
            index: 0,
            decimation,
            phase: 0,
        })
    }

    /// Filter `input` into `output`. Returns `(consumed, produced)`; stops
    /// before the first input sample whose output would not fit.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> (usize, usize) {
        let len = self.taps.len();
        let mut produced = 0;
        for (i, &x) in input.iter().enumerate() {
            if self.phase == 0 && produced == output.len() {
                return (i, produced);
            }
            self.delay[self.index] = x;
            if self.phase == 0 {
                output[produced] = dot_real(&self.taps, &self.delay, self.index);
                produced += 1;
            }
            self.index = (self.index + 1) % len;
            self.phase = (self.phase + 1) % self.decimation;
        }
        (input.len(), produced)
    }

    pub fn reset(&mut self) {
        self.delay.fill(0.0);
        self.index = 0;
        self.phase = 0;
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }
}

/// Real taps over complex samples. The delay line interleaves re/im and is
/// twice the tap count.
#[derive(Debug, Clone)]
pub struct RealTapsComplexFir {
    taps: Vec<f32>,
    delay: Vec<f32>,
    index: usize,
    decimation: usize,
    phase: usize,
}

impl RealTapsComplexFir {
    pub fn new(taps: Vec<f32>, decimation: usize) -> DspResult<Self> {
        check_engine(taps.len(), decimation)?;
        Ok(Self {
            delay: vec![0.0; 2 * taps.len()],
            taps,
            index: 0,
            decimation,
            phase: 0,
        })
    }

    pub fn process(
        &mut self,
        in_re: &[f32],
        in_im: &[f32],
        out_re: &mut [f32],
        out_im: &mut [f32],
    ) -> (usize, usize) {
        let len = self.taps.len();
        let capacity = out_re.len().min(out_im.len());
        let count = in_re.len().min(in_im.len());
        let mut produced = 0;
        for i in 0..count {
            if self.phase == 0 && produced == capacity {
                return (i, produced);
            }
            self.delay[2 * self.index] = in_re[i];
            self.delay[2 * self.index + 1] = in_im[i];
            if self.phase == 0 {
                let (re, im) = dot_real_complex(&self.taps, &self.delay, self.index);
                out_re[produced] = re;
                out_im[produced] = im;
                produced += 1;
            }
            self.index = (self.index + 1) % len;
            self.phase = (self.phase + 1) % self.decimation;
        }
        (count, produced)
    }

    pub fn reset(&mut self) {
        self.delay.fill(0.0);
        self.index = 0;
        self.phase = 0;
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }
}

/// Complex taps over complex samples.
#[derive(Debug, Clone)]
pub struct ComplexFir {
    taps: Vec<Complex<f32>>,
    delay: Vec<f32>,
    index: usize,
    decimation: usize,
    phase: usize,
}

impl ComplexFir {
    pub fn new(taps: Vec<Complex<f32>>, decimation: usize) -> DspResult<Self> {
        check_engine(taps.len(), decimation)?;
        Ok(Self {
            delay: vec![0.0; 2 * taps.len()],
            taps,
            index: 0,
            decimation,
            phase: 0,
        })
    }

    pub fn process(
        &mut self,
        in_re: &[f32],
        in_im: &[f32],
        out_re: &mut [f32],
        out_im: &mut [f32],
    ) -> (usize, usize) {
        let len = self.taps.len();
        let capacity = out_re.len().min(out_im.len());
        let count = in_re.len().min(in_im.len());
        let mut produced = 0;
        for i in 0..count {
            if self.phase == 0 && produced == capacity {
                return (i, produced);
            }
            self.delay[2 * self.index] = in_re[i];
            self.delay[2 * self.index + 1] = in_im[i];
            if self.phase == 0 {
                let (re, im) = dot_complex(&self.taps, &self.delay, self.index);
                out_re[produced] = re;
                out_im[produced] = im;
                produced += 1;
            }
            self.index = (self.index + 1) % len;
            self.phase = (self.phase + 1) % self.decimation;
        }
        (count, produced)
    }

    pub fn reset(&mut self) {
        self.delay.fill(0.0);
        self.index = 0;
        self.phase = 0;
    }

    pub fn taps(&self) -> &[Complex<f32>] {
        &self.taps
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Declared pass-band gain and, when known, the design the taps came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterInfo {
    pub gain: f64,
    pub design: Option<DesignParams>,
}

impl FilterInfo {
    pub fn new(gain: f64) -> Self {
        Self { gain, design: None }
    }

    pub fn designed(gain: f64, design: DesignParams) -> Self {
        Self {
            gain,
            design: Some(design),
        }
    }
}

impl Default for FilterInfo {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// A decimating FIR filter, one variant per tap/sample domain.
///
/// The domain is fixed when the filter is built, so `apply` dispatches once
/// per call and the per-sample loop never branches on it.
#[derive(Debug, Clone)]
pub enum Filter {
    RealTapsRealSamples { engine: RealFir, info: FilterInfo },
    RealTapsComplexSamples { engine: RealTapsComplexFir, info: FilterInfo },
    ComplexTapsComplexSamples { engine: ComplexFir, info: FilterInfo },
}

impl Filter {
    pub fn real(taps: Vec<f32>, decimation: usize, info: FilterInfo) -> DspResult<Self> {
        Ok(Filter::RealTapsRealSamples {
            engine: RealFir::new(taps, decimation)?,
            info,
        })
    }

    pub fn real_taps_complex(taps: Vec<f32>, decimation: usize, info: FilterInfo) -> DspResult<Self> {
        Ok(Filter::RealTapsComplexSamples {
            engine: RealTapsComplexFir::new(taps, decimation)?,
            info,
        })
    }

    pub fn complex(
        taps: Vec<Complex<f32>>,
        decimation: usize,
        info: FilterInfo,
    ) -> DspResult<Self> {
        Ok(Filter::ComplexTapsComplexSamples {
            engine: ComplexFir::new(taps, decimation)?,
            info,
        })
    }

    pub fn info(&self) -> &FilterInfo {
        match self {
            Filter::RealTapsRealSamples { info, .. }
            | Filter::RealTapsComplexSamples { info, .. }
            | Filter::ComplexTapsComplexSamples { info, .. } => info,
        }
    }

    pub fn decimation(&self) -> usize {
        match self {
            Filter::RealTapsRealSamples { engine, .. } => engine.decimation,
            Filter::RealTapsComplexSamples { engine, .. } => engine.decimation,
            Filter::ComplexTapsComplexSamples { engine, .. } => engine.decimation,
        }
    }

    pub fn ntaps(&self) -> usize {
        match self {
            Filter::RealTapsRealSamples { engine, .. } => engine.taps.len(),
            Filter::RealTapsComplexSamples { engine, .. } => engine.taps.len(),
            Filter::ComplexTapsComplexSamples { engine, .. } => engine.taps.len(),
        }
    }

    /// Clear the delay line and the decimation phase.
    pub fn reset(&mut self) {
        match self {
            Filter::RealTapsRealSamples { engine, .. } => engine.reset(),
            Filter::RealTapsComplexSamples { engine, .. } => engine.reset(),
            Filter::ComplexTapsComplexSamples { engine, .. } => engine.reset(),
        }
    }

    /// Filter `input[offset..size]`, appending to `output` at its current
    /// size. Stops when `output` is full and returns the number of input
    /// samples consumed. The output is tagged with the decimated rate and
    /// the input's centre frequency.
    pub fn apply(&mut self, input: &SampleBuffer, offset: usize, output: &mut SampleBuffer) -> usize {
        let offset = offset.min(input.size());
        output.set_sample_rate(input.sample_rate() / self.decimation() as u32);
        output.set_frequency(input.frequency());
        self.apply_slices(&input.re()[offset..], &input.im()[offset..], output)
    }

    /// Same as [`apply`](Self::apply) over raw slices, without tagging.
    pub(crate) fn apply_slices(&mut self, re: &[f32], im: &[f32], output: &mut SampleBuffer) -> usize {
        let (consumed, produced) = {
            let (out_re, out_im) = output.spare_mut();
            match self {
                Filter::RealTapsRealSamples { engine, .. } => {
                    let (consumed, produced) = engine.process(re, out_re);
                    out_im[..produced].fill(0.0);
                    (consumed, produced)
                }
                Filter::RealTapsComplexSamples { engine, .. } => {
                    engine.process(re, im, out_re, out_im)
                }
                Filter::ComplexTapsComplexSamples { engine, .. } => {
                    engine.process(re, im, out_re, out_im)
                }
            }
        };
        output.commit(produced);
        consumed
    }
}
