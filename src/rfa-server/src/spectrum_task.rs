// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Spectrum consumer thread.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rfa_core::DynResult;
use rfa_dsp::{Scheduler, SpectrumAnalyzer, SpectrumFrame};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// How long the worker waits for a buffer before re-checking shutdown.
const BUFFER_TIMEOUT: Duration = Duration::from_millis(200);

/// Opens the squelch while the channel band power is at or above the
/// threshold.
#[derive(Debug, Clone)]
pub struct SquelchGate {
    threshold_db: f32,
    half_bandwidth_hz: f64,
    open: bool,
}

impl SquelchGate {
    pub fn new(threshold_db: f32, half_bandwidth_hz: u32) -> Self {
        Self {
            threshold_db,
            half_bandwidth_hz: half_bandwidth_hz as f64,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Measure the channel in `frame`. Returns the new state when it changed.
    pub fn update(&mut self, frame: &SpectrumFrame, channel_frequency: i64) -> Option<bool> {
        let centre = channel_frequency as f64;
        let power = frame.band_power_db(centre - self.half_bandwidth_hz, centre + self.half_bandwidth_hz)?;
        let open = power >= self.threshold_db;
        if open == self.open {
            return None;
        }
        self.open = open;
        info!(
            "Squelch {} ({:.1} dB, threshold {:.1} dB)",
            if open { "open" } else { "closed" },
            power,
            self.threshold_db
        );
        Some(open)
    }
}

pub struct SpectrumWorkerConfig {
    pub fft_size: usize,
    pub averaging: f32,
    pub half_bandwidth_hz: u32,
    /// `None` keeps the squelch open.
    pub squelch_db: Option<f32>,
}

/// Spawn the `rfa-spectrum` thread. It exits once the scheduler has stopped
/// and no spectrum buffer is left.
pub fn spawn_spectrum_worker(
    scheduler: Arc<Scheduler>,
    config: SpectrumWorkerConfig,
    frames: broadcast::Sender<Arc<SpectrumFrame>>,
) -> DynResult<JoinHandle<()>> {
    let mut analyzer = SpectrumAnalyzer::new(config.fft_size)?;
    analyzer.set_averaging(config.averaging)?;
    let mut squelch = config
        .squelch_db
        .map(|threshold| SquelchGate::new(threshold, config.half_bandwidth_hz));
    if squelch.is_some() {
        scheduler.set_squelch_open(false);
    }

    let handle = std::thread::Builder::new()
        .name("rfa-spectrum".to_string())
        .spawn(move || {
            info!("Spectrum worker started ({} bins)", analyzer.fft_size());
            let queues = scheduler.spectrum_queues().clone();
            loop {
                let Some(buf) = queues.output.poll_timeout(BUFFER_TIMEOUT) else {
                    if !scheduler.is_running() {
                        break;
                    }
                    continue;
                };
                let frame = analyzer.process(&buf);
                let _ = queues.ret.offer(buf);

                if let Some(gate) = squelch.as_mut() {
                    if let Some(open) = gate.update(&frame, scheduler.channel_frequency()) {
                        scheduler.set_squelch_open(open);
                    }
                }
                if frames.send(Arc::new(frame)).is_err() {
                    debug!("No spectrum subscribers");
                }
            }
            info!("Spectrum worker exited");
        })?;
    Ok(handle)
}
