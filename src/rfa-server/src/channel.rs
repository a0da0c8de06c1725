// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel consumer: decimates mixed buffers down to the channel rate and
//! isolates the channel bandwidth.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use num_complex::Complex;
use rfa_core::{DynResult, SampleBuffer};
use rfa_dsp::design::{firdes, DesignMethod, DesignParams, WindowSpec};
use rfa_dsp::fir::FilterInfo;
use rfa_dsp::{Decimation, DspResult, Filter, FilterChain, Scheduler};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

const BUFFER_TIMEOUT: Duration = Duration::from_millis(200);
/// Channel filter transition width relative to the half bandwidth.
const CHANNEL_TRANSITION: f64 = 0.25;

/// Decimated channel samples around 0 Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct BasebandBlock {
    pub sample_rate: u32,
    /// Channel centre frequency (Hz).
    pub frequency: i64,
    pub samples: Vec<Complex<f32>>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    pub min_rate: u32,
    pub optimal_rate: u32,
    pub max_rate: u32,
    pub half_bandwidth_hz: u32,
    pub attenuation_db: f64,
    pub passband_ripple_db: f64,
}

/// Filters planned for one input rate.
struct Pipeline {
    input_rate: u32,
    chain: FilterChain,
    channel_filter: Filter,
    decimated: SampleBuffer,
    filtered: SampleBuffer,
}

pub struct ChannelProcessor {
    settings: ChannelSettings,
    pipeline: Option<Pipeline>,
}

impl ChannelProcessor {
    pub fn new(settings: ChannelSettings) -> Self {
        Self {
            settings,
            pipeline: None,
        }
    }

    /// Output rate of the current plan, if one was built.
    pub fn output_rate(&self) -> Option<u32> {
        self.pipeline.as_ref().map(|p| p.input_rate / p.chain.decimation() as u32)
    }

    fn build(&self, input_rate: u32, block: usize) -> DspResult<Pipeline> {
        let s = &self.settings;
        let plan = Decimation::optimal(s.min_rate, s.optimal_rate, s.max_rate, input_rate)?;
        let chain = plan.chain(s.attenuation_db, s.passband_ripple_db, WindowSpec::default(), block)?;

        let out_rate = plan.output_rate() as f64;
        let cutoff = s.half_bandwidth_hz as f64;
        let transition = cutoff * CHANNEL_TRANSITION;
        let window = WindowSpec::default();
        let taps = firdes::low_pass(1.0, out_rate, cutoff, transition, Some(s.attenuation_db), window)?;
        let design = DesignParams::low_pass(
            DesignMethod::Window(window),
            out_rate,
            cutoff,
            transition,
            s.attenuation_db,
            None,
        );
        let channel_filter = Filter::real_taps_complex(taps, 1, FilterInfo::designed(1.0, design))?;

        info!(
            "Channel plan {} Hz -> {} Hz, stages {:?}, channel filter {} taps",
            input_rate,
            plan.output_rate(),
            plan.factors(),
            channel_filter.ntaps()
        );
        let capacity = block / plan.decimation() + chain.len() + 1;
        Ok(Pipeline {
            input_rate,
            chain,
            channel_filter,
            decimated: SampleBuffer::new(capacity),
            filtered: SampleBuffer::new(capacity),
        })
    }

    /// Run one mixed buffer through the plan, rebuilding it when the input
    /// rate changed.
    pub fn process(&mut self, input: &SampleBuffer) -> DspResult<BasebandBlock> {
        if self.pipeline.as_ref().map(|p| p.input_rate) != Some(input.sample_rate()) {
            let block = input.capacity().max(1);
            self.pipeline = Some(self.build(input.sample_rate(), block)?);
        }
        let mut samples = Vec::new();
        let mut sample_rate = 0;
        if let Some(p) = self.pipeline.as_mut() {
            let mut offset = 0;
            while offset < input.size() {
                p.decimated.clear();
                let consumed = p.chain.process(input, offset, &mut p.decimated);
                if consumed == 0 {
                    break;
                }
                offset += consumed;

                p.filtered.clear();
                p.channel_filter.apply(&p.decimated, 0, &mut p.filtered);
                samples.extend(p.filtered.iter());
                sample_rate = p.filtered.sample_rate();
            }
        }
        Ok(BasebandBlock {
            sample_rate,
            frequency: input.frequency(),
            samples,
        })
    }
}

/// Spawn the `rfa-channel` thread. It exits once the scheduler has stopped
/// and no channel buffer is left.
pub fn spawn_channel_worker(
    scheduler: Arc<Scheduler>,
    settings: ChannelSettings,
    blocks: broadcast::Sender<Arc<BasebandBlock>>,
) -> DynResult<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("rfa-channel".to_string())
        .spawn(move || {
            info!("Channel worker started");
            let queues = scheduler.demod_queues().clone();
            let mut processor = ChannelProcessor::new(settings);
            loop {
                let Some(buf) = queues.output.poll_timeout(BUFFER_TIMEOUT) else {
                    if !scheduler.is_running() {
                        break;
                    }
                    continue;
                };
                let result = processor.process(&buf);
                let _ = queues.ret.offer(buf);
                match result {
                    Ok(block) => {
                        if blocks.send(Arc::new(block)).is_err() {
                            debug!("No baseband subscribers");
                        }
                    }
                    Err(e) => {
                        error!("Channel processing failed: {}; disabling demodulation", e);
                        scheduler.set_demodulation_active(false);
                    }
                }
            }
            info!("Channel worker exited");
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            min_rate: 8_000,
            optimal_rate: 12_000,
            max_rate: 16_000,
            half_bandwidth_hz: 1_000,
            attenuation_db: 60.0,
            passband_ripple_db: 0.5,
        }
    }

    fn tone(len: usize, rate: u32, offset_hz: f64) -> SampleBuffer {
        let mut buf = SampleBuffer::new(len);
        for n in 0..len {
            let phase = 2.0 * std::f64::consts::PI * offset_hz * n as f64 / rate as f64;
            buf.push(phase.cos() as f32, phase.sin() as f32);
        }
        buf.set_sample_rate(rate);
        buf.set_frequency(145_500_000);
        buf
    }

    fn settled_rms(samples: &[Complex<f32>]) -> f32 {
        let tail = &samples[samples.len() / 2..];
        (tail.iter().map(|s| s.norm_sqr()).sum::<f32>() / tail.len() as f32).sqrt()
    }

    #[test]
    fn in_channel_tone_passes_decimated() {
        let mut processor = ChannelProcessor::new(settings());
        let block = processor.process(&tone(8192, 48_000, 200.0)).unwrap();
        assert_eq!(processor.output_rate(), Some(12_000));
        assert_eq!(block.sample_rate, 12_000);
        assert_eq!(block.frequency, 145_500_000);
        assert_eq!(block.samples.len(), 2048);
        let rms = settled_rms(&block.samples);
        assert!((rms - 1.0).abs() < 0.1, "in-band rms {}", rms);
    }

    #[test]
    fn out_of_channel_tone_is_rejected() {
        let mut processor = ChannelProcessor::new(settings());
        let block = processor.process(&tone(8192, 48_000, 4_000.0)).unwrap();
        let rms = settled_rms(&block.samples);
        assert!(rms < 0.01, "out-of-band rms {}", rms);
    }

    #[test]
    fn plan_follows_input_rate() {
        let mut processor = ChannelProcessor::new(settings());
        processor.process(&tone(4096, 48_000, 0.0)).unwrap();
        assert_eq!(processor.output_rate(), Some(12_000));
        processor.process(&tone(4096, 16_000, 0.0)).unwrap();
        assert_eq!(processor.output_rate(), Some(16_000), "in-band input is not decimated");
    }

    #[test]
    fn input_below_minimum_rate_fails() {
        let mut processor = ChannelProcessor::new(settings());
        assert!(processor.process(&tone(64, 4_000, 0.0)).is_err());
    }
}
