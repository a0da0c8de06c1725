// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sample scheduler.
//!
//! One dedicated thread pulls raw packets from a [`Source`] and fans them
//! out to the recording sink, the demodulation queues and the spectrum
//! queues. Every queue operation is a non-blocking poll or offer: a consumer
//! that falls behind loses samples, it never stalls the source.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use rfa_core::{QueuePair, RawPacket, RecordingSink, SampleBuffer, Source, SourceError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::convert::IqConverter;

/// Spectrum path double buffering.
pub const SPECTRUM_QUEUE_DEPTH: usize = 2;
/// Demodulation path depth, absorbs consumer jitter.
pub const DEMOD_QUEUE_DEPTH: usize = 20;
/// Longest wait for the next raw packet.
pub const PACKET_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Samples per spectrum buffer.
    pub fft_size: usize,
    /// Channel centre frequency the demodulation path is mixed to (Hz).
    pub channel_frequency: i64,
    /// Feed the demodulation queues.
    pub demodulation: bool,
    /// Initial squelch gate state.
    pub squelch_open: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            channel_frequency: 0,
            demodulation: false,
            squelch_open: true,
        }
    }
}

/// Snapshot of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub packets_processed: u64,
    /// Samples that found no free spectrum buffer.
    pub spectrum_samples_dropped: u64,
    pub spectrum_buffers_delivered: u64,
    pub demod_buffers_delivered: u64,
    /// Times the demodulation backlog was flushed back into the pool.
    pub demod_backlog_flushes: u64,
    pub recording_bytes_written: u64,
}

#[derive(Default)]
struct Counters {
    packets_processed: AtomicU64,
    spectrum_samples_dropped: AtomicU64,
    spectrum_buffers_delivered: AtomicU64,
    demod_buffers_delivered: AtomicU64,
    demod_backlog_flushes: AtomicU64,
    recording_bytes_written: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            spectrum_samples_dropped: self.spectrum_samples_dropped.load(Ordering::Relaxed),
            spectrum_buffers_delivered: self.spectrum_buffers_delivered.load(Ordering::Relaxed),
            demod_buffers_delivered: self.demod_buffers_delivered.load(Ordering::Relaxed),
            demod_backlog_flushes: self.demod_backlog_flushes.load(Ordering::Relaxed),
            recording_bytes_written: self.recording_bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the control handle and the scheduler thread.
struct Shared {
    running: AtomicBool,
    channel_frequency: AtomicI64,
    demodulation: AtomicBool,
    squelch_open: AtomicBool,
    recording: Mutex<Option<Box<dyn RecordingSink>>>,
    counters: Counters,
}

impl Shared {
    fn recording(&self) -> MutexGuard<'_, Option<Box<dyn RecordingSink>>> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn close_sink(mut sink: Box<dyn RecordingSink>) -> io::Result<()> {
    let result = sink.close();
    match &result {
        Ok(()) => info!("Recording stopped"),
        Err(e) => error!("Failed to close recording: {}", e),
    }
    result
}

/// Control handle of the scheduler thread. All methods take `&self`, so the
/// handle can be shared through an `Arc` and stopped from any thread.
pub struct Scheduler {
    source: Arc<dyn Source>,
    shared: Arc<Shared>,
    spectrum: QueuePair,
    demod: QueuePair,
    fft_size: usize,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Allocate the buffer pools. The scheduler starts out stopped.
    pub fn new(source: Arc<dyn Source>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        if config.fft_size == 0 {
            return Err(SchedulerError::InvalidConfig("fft_size must be > 0".to_string()));
        }
        let spectrum = QueuePair::with_buffers(SPECTRUM_QUEUE_DEPTH, config.fft_size);
        let demod = QueuePair::with_buffers(DEMOD_QUEUE_DEPTH, source.sampled_packet_size());
        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            channel_frequency: AtomicI64::new(config.channel_frequency),
            demodulation: AtomicBool::new(config.demodulation),
            squelch_open: AtomicBool::new(config.squelch_open),
            recording: Mutex::new(None),
            counters: Counters::default(),
        });
        Ok(Self {
            source,
            shared,
            spectrum,
            demod,
            fft_size: config.fft_size,
            handle: Mutex::new(None),
        })
    }

    /// Start sampling and spawn the `rfa-scheduler` thread.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() || self.shared.running.load(Ordering::Acquire) {
            return Err(SchedulerError::AlreadyStarted);
        }

        self.source.start_sampling()?;
        self.shared.running.store(true, Ordering::Release);

        let worker = Worker {
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
            spectrum: self.spectrum.clone(),
            demod: self.demod.clone(),
            converter: IqConverter::new(self.source.format()),
            held: None,
        };
        let spawned = std::thread::Builder::new()
            .name("rfa-scheduler".to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(h) => {
                *handle = Some(h);
                info!(
                    "Scheduler started: source '{}', {} Hz, {} byte packets",
                    self.source.name(),
                    self.source.sample_rate(),
                    self.source.packet_size()
                );
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                self.source.stop_sampling();
                Err(SchedulerError::Spawn(e))
            }
        }
    }

    /// Ask the scheduler thread to exit after the current packet and stop
    /// the source. Idempotent.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!("Stopping scheduler");
            self.source.stop_sampling();
        }
    }

    /// Wait for the scheduler thread to exit.
    pub fn join(&self) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn channel_frequency(&self) -> i64 {
        self.shared.channel_frequency.load(Ordering::Relaxed)
    }

    pub fn set_channel_frequency(&self, frequency: i64) {
        self.shared.channel_frequency.store(frequency, Ordering::Relaxed);
    }

    pub fn is_demodulation_active(&self) -> bool {
        self.shared.demodulation.load(Ordering::Relaxed)
    }

    pub fn set_demodulation_active(&self, active: bool) {
        self.shared.demodulation.store(active, Ordering::Relaxed);
    }

    pub fn is_squelch_open(&self) -> bool {
        self.shared.squelch_open.load(Ordering::Relaxed)
    }

    pub fn set_squelch_open(&self, open: bool) {
        self.shared.squelch_open.store(open, Ordering::Relaxed);
    }

    /// Append every following raw packet to `sink`. A sink already in use
    /// is closed first.
    pub fn start_recording(&self, sink: Box<dyn RecordingSink>) {
        let previous = self.shared.recording().replace(sink);
        if let Some(previous) = previous {
            let _ = close_sink(previous);
        }
        info!("Recording started");
    }

    /// Close the current sink, if any.
    pub fn stop_recording(&self) -> io::Result<()> {
        let sink = self.shared.recording().take();
        match sink {
            Some(sink) => close_sink(sink),
            None => Ok(()),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording().is_some()
    }

    /// Full spectrum buffers in `output`, empties go back through `ret`.
    pub fn spectrum_queues(&self) -> &QueuePair {
        &self.spectrum
    }

    /// Mixed channel buffers in `output`, empties go back through `ret`.
    pub fn demod_queues(&self) -> &QueuePair {
        &self.demod
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

/// Everything owned by the scheduler thread.
struct Worker {
    source: Arc<dyn Source>,
    shared: Arc<Shared>,
    spectrum: QueuePair,
    demod: QueuePair,
    converter: IqConverter,
    /// Spectrum buffer being filled.
    held: Option<SampleBuffer>,
}

impl Worker {
    fn run(mut self) {
        debug!("Scheduler thread running");
        while self.shared.running.load(Ordering::Acquire) {
            let Some(packet) = self.source.get_packet(PACKET_TIMEOUT) else {
                if self.shared.running.swap(false, Ordering::AcqRel) {
                    error!("Source '{}' delivered no more packets, stopping", self.source.name());
                    self.source.stop_sampling();
                }
                break;
            };
            self.process(&packet);
            self.source.return_packet(packet);
        }

        self.shared.running.store(false, Ordering::Release);
        let sink = self.shared.recording().take();
        if let Some(sink) = sink {
            let _ = close_sink(sink);
        }
        info!("Scheduler stopped");
    }

    fn process(&mut self, packet: &RawPacket) {
        let counters = &self.shared.counters;
        Counters::add(&counters.packets_processed, 1);
        self.converter.set_sample_rate(self.source.sample_rate());
        self.converter.set_frequency(self.source.frequency());

        self.record(packet);

        if self.shared.demodulation.load(Ordering::Relaxed)
            && self.shared.squelch_open.load(Ordering::Relaxed)
        {
            self.feed_demod(packet);
        }

        self.feed_spectrum(packet);
    }

    fn record(&self, packet: &RawPacket) {
        let mut recording = self.shared.recording();
        let Some(sink) = recording.as_mut() else {
            return;
        };
        match sink.write(packet) {
            Ok(()) => Counters::add(
                &self.shared.counters.recording_bytes_written,
                packet.len() as u64,
            ),
            Err(e) => {
                error!("Recording write failed: {}; stopping recording", e);
                if let Some(sink) = recording.take() {
                    let _ = close_sink(sink);
                }
            }
        }
    }

    fn feed_demod(&mut self, packet: &RawPacket) {
        let counters = &self.shared.counters;
        match self.demod.ret.poll() {
            Some(mut buf) => {
                buf.clear();
                let channel = self.shared.channel_frequency.load(Ordering::Relaxed);
                self.converter.mix(packet, &mut buf, channel);
                match self.demod.output.offer(buf) {
                    Ok(()) => Counters::add(&counters.demod_buffers_delivered, 1),
                    Err(buf) => {
                        let _ = self.demod.ret.offer(buf);
                    }
                }
            }
            None => {
                let flushed = self.demod.output.drain_into(&self.demod.ret);
                debug!("Demodulator lagging, flushed {} queued buffers", flushed);
                Counters::add(&counters.demod_backlog_flushes, 1);
            }
        }
    }

    fn feed_spectrum(&mut self, packet: &RawPacket) {
        let counters = &self.shared.counters;
        let bytes_per_sample = self.converter.format().bytes_per_sample();
        let total = self.converter.format().samples_in(packet.len());
        let mut done = 0;

        while done < total {
            if self.held.is_none() {
                self.held = self.spectrum.ret.poll().map(|mut buf| {
                    buf.clear();
                    buf
                });
            }
            let Some(buf) = self.held.as_mut() else {
                Counters::add(&counters.spectrum_samples_dropped, (total - done) as u64);
                return;
            };

            done += self.converter.fill(&packet[done * bytes_per_sample..], buf);
            if buf.is_full() {
                if let Some(full) = self.held.take() {
                    if let Err(mut full) = self.spectrum.output.offer(full) {
                        warn!("Spectrum queue full, discarding {} samples", full.size());
                        Counters::add(&counters.spectrum_samples_dropped, full.size() as u64);
                        full.clear();
                        self.held = Some(full);
                    } else {
                        Counters::add(&counters.spectrum_buffers_delivered, 1);
                    }
                }
            }
        }
    }
}
