// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Decimation planning.
//!
//! Picks an integer ratio that brings the input rate into the requested
//! output band and builds the matching cascade of low-pass stages.

mod factorization;

use tracing::{debug, warn};

use crate::design::window::WindowSpec;
use crate::design::{firdes, optimal, DesignMethod, DesignParams};
use crate::error::{DspError, DspResult};
use crate::fir::{Filter, FilterChain, FilterInfo};

pub use factorization::{least_sum_factorization, next_factor, Factorization};

/// Share of the pre-stage rate used as pass band.
const PASS_BAND_FRACTION: f64 = 0.48;
/// Share of the pre-stage rate used as transition band.
const TRANSITION_FRACTION: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimation {
    factorization: Factorization,
    decimation: usize,
    input_rate: u32,
    output_rate: u32,
}

impl Decimation {
    /// Plan the decimation of `input_rate` into `[min_out, max_out]`,
    /// preferring ratios close to `input_rate / optimal_out` that factor into
    /// few, mostly equal stages.
    pub fn optimal(min_out: u32, optimal_out: u32, max_out: u32, input_rate: u32) -> DspResult<Self> {
        if min_out == 0 || max_out == 0 || input_rate == 0 {
            return Err(DspError::invalid("rates must be positive"));
        }
        if min_out > optimal_out || optimal_out > max_out {
            return Err(DspError::invalid(format!(
                "output rate bounds must satisfy min <= optimal <= max (got {} / {} / {})",
                min_out, optimal_out, max_out
            )));
        }
        if input_rate < min_out {
            return Err(DspError::invalid(format!(
                "input rate {} is below the minimum output rate {}; upsampling is not supported",
                input_rate, min_out
            )));
        }

        if input_rate <= max_out {
            return Self::with_factorization(input_rate, Factorization::optimal(1)?);
        }

        let input = input_rate as usize;
        let lowest = input.div_ceil(max_out as usize);
        let highest = input / min_out as usize;
        let ideal = input_rate as f64 / optimal_out as f64;

        let mut selected: Option<(f64, Factorization)> = None;
        for ratio in lowest..=highest {
            let f = Factorization::optimal(ratio)?;
            let weight = weight(&f, ratio, ideal);
            if selected.as_ref().map_or(true, |(best, _)| weight <= *best) {
                selected = Some((weight, f));
            }
        }

        let (_, factorization) = selected.ok_or_else(|| {
            DspError::invalid(format!(
                "no integer ratio brings {} Hz into [{}, {}] Hz",
                input_rate, min_out, max_out
            ))
        })?;
        let plan = Self::with_factorization(input_rate, factorization)?;
        debug!(
            "Decimation plan {} Hz -> {} Hz: ratio {} as {:?}",
            input_rate,
            plan.output_rate,
            plan.decimation,
            plan.factors()
        );
        Ok(plan)
    }

    fn with_factorization(input_rate: u32, factorization: Factorization) -> DspResult<Self> {
        let decimation = factorization.product();
        let output_rate = u32::try_from(decimation)
            .map(|d| input_rate / d)
            .map_err(|_| DspError::invalid(format!("decimation {} out of range", decimation)))?;
        Ok(Self {
            factorization,
            decimation,
            input_rate,
            output_rate,
        })
    }

    pub fn factorization(&self) -> &Factorization {
        &self.factorization
    }

    /// Stage factors, largest first.
    pub fn factors(&self) -> &[usize] {
        self.factorization.factors()
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn is_identity(&self) -> bool {
        self.decimation == 1
    }

    /// Build one low-pass stage per factor. An identity plan yields an
    /// empty (copying) chain.
    pub fn chain(
        &self,
        attenuation_db: f64,
        passband_ripple_db: f64,
        window: WindowSpec,
        block_capacity: usize,
    ) -> DspResult<FilterChain> {
        if !(attenuation_db > 0.0) || !(passband_ripple_db > 0.0) {
            return Err(DspError::invalid(format!(
                "attenuation and ripple must be > 0 dB (got {}, {})",
                attenuation_db, passband_ripple_db
            )));
        }
        if self.is_identity() {
            return Ok(FilterChain::passthrough(block_capacity));
        }

        let mut rate = self.input_rate as f64;
        let mut stages = Vec::with_capacity(self.factors().len());
        for &factor in self.factors() {
            stages.push(stage_filter(
                rate,
                factor,
                attenuation_db,
                passband_ripple_db,
                window,
            )?);
            rate /= factor as f64;
        }
        Ok(FilterChain::new(stages, block_capacity))
    }
}

/// Stage count times distinct stage count times the relative distance from
/// the ideal ratio.
fn weight(f: &Factorization, ratio: usize, ideal: f64) -> f64 {
    (f.factors().len() * f.distinct()) as f64 * (ratio as f64 - ideal).abs() / ratio as f64
}

/// Anti-aliasing low-pass for one stage: equiripple when the exchange
/// converges, window method otherwise.
fn stage_filter(
    rate: f64,
    decimation: usize,
    attenuation_db: f64,
    passband_ripple_db: f64,
    window: WindowSpec,
) -> DspResult<Filter> {
    let transition = rate * TRANSITION_FRACTION / decimation as f64;
    let pass = rate * PASS_BAND_FRACTION / decimation as f64;

    match optimal::low_pass(
        1.0,
        rate,
        pass,
        pass + transition,
        passband_ripple_db,
        attenuation_db,
        optimal::DEFAULT_EXTRA_TAPS,
    ) {
        Ok(taps) => {
            let design = DesignParams::low_pass(
                DesignMethod::Equiripple,
                rate,
                pass,
                transition,
                attenuation_db,
                Some(passband_ripple_db),
            );
            Filter::real_taps_complex(taps, decimation, FilterInfo::designed(1.0, design))
        }
        Err(e) => {
            warn!(
                "Equiripple design for /{} stage at {} Hz failed ({}), using window method",
                decimation, rate, e
            );
            let taps = firdes::low_pass(1.0, rate, pass, transition, Some(attenuation_db), window)?;
            let design = DesignParams::low_pass(
                DesignMethod::Window(window),
                rate,
                pass,
                transition,
                attenuation_db,
                None,
            );
            Filter::real_taps_complex(taps, decimation, FilterInfo::designed(1.0, design))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfa_core::SampleBuffer;

    #[test]
    fn plans_closest_ratio_for_two_megasamples() {
        let plan = Decimation::optimal(48_000, 96_000, 384_000, 2_000_000).unwrap();
        assert_eq!(plan.factors(), &[7, 3]);
        assert_eq!(plan.decimation(), 21);
        assert_eq!(plan.output_rate(), 95_238);
        assert!((48_000..=384_000).contains(&plan.output_rate()));
    }

    #[test]
    fn other_input_rates_land_in_band() {
        for (input, factors) in [
            (1_000_000, vec![11]),
            (2_400_000, vec![5, 5]),
            (3_200_000, vec![11, 3]),
        ] {
            let plan = Decimation::optimal(48_000, 96_000, 384_000, input).unwrap();
            assert_eq!(plan.factors(), &factors[..], "input {}", input);
            assert!((48_000..=384_000).contains(&plan.output_rate()));
        }
    }

    #[test]
    fn in_band_input_is_identity() {
        for input in [48_000, 192_000, 384_000] {
            let plan = Decimation::optimal(48_000, 96_000, 384_000, input).unwrap();
            assert!(plan.is_identity(), "input {}", input);
            assert_eq!(plan.factors(), &[1]);
            assert_eq!(plan.output_rate(), input);
            let chain = plan.chain(60.0, 0.5, WindowSpec::default(), 1024).unwrap();
            assert!(chain.is_empty());
        }
    }

    #[test]
    fn rejects_invalid_bounds() {
        assert!(Decimation::optimal(0, 96_000, 384_000, 2_000_000).is_err());
        assert!(Decimation::optimal(48_000, 96_000, 384_000, 0).is_err());
        assert!(Decimation::optimal(100_000, 96_000, 384_000, 2_000_000).is_err());
        assert!(Decimation::optimal(48_000, 400_000, 384_000, 2_000_000).is_err());
        assert!(Decimation::optimal(48_000, 96_000, 384_000, 24_000).is_err());
    }

    #[test]
    fn chain_decimates_and_keeps_dc() {
        let plan = Decimation::optimal(8_000, 12_000, 16_000, 48_000).unwrap();
        assert_eq!(plan.factors(), &[2, 2]);

        let mut chain = plan.chain(60.0, 0.5, WindowSpec::default(), 1024).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.decimation(), 4);
        for stage in chain.stages() {
            let design = stage.info().design.expect("stage records its design");
            assert_eq!(design.method, DesignMethod::Equiripple);
        }

        let mut input = SampleBuffer::new(4000);
        while input.push(1.0, 0.0) {}
        input.set_sample_rate(48_000);
        let mut output = SampleBuffer::new(1100);
        assert_eq!(chain.process(&input, 0, &mut output), 4000);
        assert_eq!(output.size(), 1000);
        assert_eq!(output.sample_rate(), 12_000);
        for s in output.iter().skip(900) {
            assert!((s.re - 1.0).abs() < 0.1, "settled DC {}", s.re);
            assert!(s.im.abs() < 1e-6);
        }
    }

    #[test]
    fn wide_ratio_stage_falls_back_to_window_design() {
        let plan = Decimation::optimal(48_000, 96_000, 384_000, 10_000_000).unwrap();
        assert_eq!(plan.factors(), &[103]);
        assert_eq!(plan.output_rate(), 97_087);

        let mut chain = plan.chain(60.0, 0.5, WindowSpec::default(), 4096).unwrap();
        assert_eq!(chain.len(), 1);
        let design = chain.stages()[0].info().design.expect("stage records its design");
        assert!(
            matches!(design.method, DesignMethod::Window(_)),
            "expected window fallback, got {:?}",
            design.method
        );
        assert!(design.ripple_db.is_none());

        let mut input = SampleBuffer::new(103 * 400);
        while input.push(1.0, 0.0) {}
        input.set_sample_rate(10_000_000);
        let mut output = SampleBuffer::new(410);
        assert_eq!(chain.process(&input, 0, &mut output), 103 * 400);
        assert_eq!(output.size(), 400);
        assert_eq!(output.sample_rate(), 97_087);
        for s in output.iter().skip(200) {
            assert!((s.re - 1.0).abs() < 0.05, "settled DC {}", s.re);
            assert!(s.im.abs() < 1e-6);
        }
    }

    #[test]
    fn chain_rejects_bad_specs() {
        let plan = Decimation::optimal(8_000, 12_000, 16_000, 48_000).unwrap();
        assert!(plan.chain(0.0, 0.5, WindowSpec::default(), 1024).is_err());
        assert!(plan.chain(60.0, -1.0, WindowSpec::default(), 1024).is_err());
    }
}
