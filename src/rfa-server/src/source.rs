// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sample sources of the daemon.
//!
//! Both sources run a producer on their own acquisition thread. Packets
//! circulate through a fixed pool: the worker takes an empty packet, fills
//! it and hands it to the consumer, which gives it back with
//! `return_packet`.

mod file;
mod tone;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use rfa_core::{IqFormat, RawPacket, SourceError};
use tracing::{debug, error, info};

pub use file::FileSource;
pub use tone::ToneSource;

/// Packets in flight per source.
const POOL_SIZE: usize = 8;
/// Granularity of the stop-flag checks while waiting.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Stream parameters shared by every source kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceSettings {
    pub format: IqFormat,
    pub sample_rate: u32,
    pub frequency: i64,
    pub packet_size: usize,
    /// Pace packets to the sample rate.
    pub realtime: bool,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
}

impl SourceSettings {
    pub fn new(format: IqFormat, sample_rate: u32, frequency: i64, packet_size: usize) -> Self {
        Self {
            format,
            sample_rate,
            frequency,
            packet_size,
            realtime: false,
            min_sample_rate: sample_rate,
            max_sample_rate: sample_rate,
        }
    }

    /// Time it takes the hardware to produce one packet.
    pub fn packet_duration(&self) -> Duration {
        let samples = self.format.samples_in(self.packet_size) as f64;
        Duration::from_secs_f64(samples / self.sample_rate.max(1) as f64)
    }
}

/// What a producer did with a packet.
pub(crate) enum Produced {
    Packet,
    /// No more data; the worker stops.
    Exhausted,
}

/// Fills packets on the acquisition thread.
pub(crate) trait PacketProducer: Send + 'static {
    fn produce(&mut self, packet: &mut [u8]) -> io::Result<Produced>;
}

/// Packet pool plus the acquisition worker feeding it.
pub(crate) struct PacketPump {
    name: String,
    settings: SourceSettings,
    filled_tx: Sender<RawPacket>,
    filled_rx: Receiver<RawPacket>,
    free_tx: Sender<RawPacket>,
    free_rx: Receiver<RawPacket>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PacketPump {
    pub(crate) fn new(name: impl Into<String>, settings: SourceSettings) -> Self {
        let (filled_tx, filled_rx) = bounded(POOL_SIZE);
        let (free_tx, free_rx) = bounded(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            let _ = free_tx.try_send(vec![0; settings.packet_size]);
        }
        Self {
            name: name.into(),
            settings,
            filled_tx,
            filled_rx,
            free_tx,
            free_rx,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Spawn the worker thread driving `producer`.
    pub(crate) fn start(&self, producer: Box<dyn PacketProducer>) -> Result<(), SourceError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(SourceError::Start(
                self.name.clone(),
                "already sampling".to_string(),
            ));
        }
        self.running.store(true, Ordering::Release);

        let ctx = WorkerContext {
            name: self.name.clone(),
            settings: self.settings,
            filled: self.filled_tx.clone(),
            free: self.free_rx.clone(),
            running: Arc::clone(&self.running),
        };
        let handle = std::thread::Builder::new()
            .name(format!("rfa-{}-source", self.name))
            .spawn(move || ctx.run(producer))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                SourceError::Start(self.name.clone(), e.to_string())
            })?;
        *worker = Some(handle);
        info!("Source '{}' sampling", self.name);
        Ok(())
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // The worker may be the one calling, via the scheduler's stop.
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                error!("Source '{}' worker panicked", self.name);
            }
        }
    }

    /// Next filled packet. Packets produced before a stop are still handed
    /// out; afterwards `None`.
    pub(crate) fn get_packet(&self, timeout: Duration) -> Option<RawPacket> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(packet) = self.filled_rx.try_recv() {
                return Some(packet);
            }
            if !self.running.load(Ordering::Acquire) {
                // The worker clears the flag after its last send.
                return self.filled_rx.try_recv().ok();
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if let Ok(packet) = self.filled_rx.recv_timeout((deadline - now).min(POLL_SLICE)) {
                return Some(packet);
            }
        }
    }

    pub(crate) fn return_packet(&self, packet: RawPacket) {
        if packet.len() == self.settings.packet_size {
            let _ = self.free_tx.try_send(packet);
        }
    }
}

impl Drop for PacketPump {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    name: String,
    settings: SourceSettings,
    filled: Sender<RawPacket>,
    free: Receiver<RawPacket>,
    running: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run(self, mut producer: Box<dyn PacketProducer>) {
        let period = self.settings.packet_duration();
        let mut next = Instant::now();

        while self.running.load(Ordering::Acquire) {
            let mut packet = match self.free.recv_timeout(POLL_SLICE) {
                Ok(packet) => packet,
                // Consumer holds every packet.
                Err(_) => continue,
            };
            match producer.produce(&mut packet) {
                Ok(Produced::Packet) => {}
                Ok(Produced::Exhausted) => {
                    info!("Source '{}' exhausted", self.name);
                    break;
                }
                Err(e) => {
                    error!("Source '{}' read failed: {}", self.name, e);
                    break;
                }
            }

            if self.settings.realtime {
                next += period;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    next = now;
                }
            }
            if self.filled.try_send(packet).is_err() {
                debug!("Source '{}' queue full, packet dropped", self.name);
            }
        }
        self.running.store(false, Ordering::Release);
        debug!("Source '{}' worker exited", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        next: u8,
        limit: u8,
    }

    impl PacketProducer for Counter {
        fn produce(&mut self, packet: &mut [u8]) -> io::Result<Produced> {
            if self.next == self.limit {
                return Ok(Produced::Exhausted);
            }
            packet.fill(self.next);
            self.next += 1;
            Ok(Produced::Packet)
        }
    }

    fn pump() -> PacketPump {
        PacketPump::new("test", SourceSettings::new(IqFormat::Unsigned8, 48_000, 0, 16))
    }

    #[test]
    fn packets_arrive_in_order_then_stream_ends() {
        let pump = pump();
        pump.start(Box::new(Counter { next: 0, limit: 20 })).unwrap();
        let mut seen = Vec::new();
        while let Some(packet) = pump.get_packet(Duration::from_secs(1)) {
            assert_eq!(packet.len(), 16);
            seen.push(packet[0]);
            pump.return_packet(packet);
        }
        assert_eq!(seen, (0..20).collect::<Vec<u8>>());
    }

    #[test]
    fn held_packets_pause_the_worker() {
        let pump = pump();
        pump.start(Box::new(Counter { next: 0, limit: 200 })).unwrap();
        let held: Vec<_> = (0..POOL_SIZE)
            .map(|_| pump.get_packet(Duration::from_secs(1)).unwrap())
            .collect();
        assert!(pump.get_packet(Duration::from_millis(100)).is_none());
        for packet in held {
            pump.return_packet(packet);
        }
        assert!(pump.get_packet(Duration::from_secs(1)).is_some());
        pump.stop();
    }

    #[test]
    fn double_start_is_rejected() {
        let pump = pump();
        pump.start(Box::new(Counter { next: 0, limit: 1 })).unwrap();
        assert!(pump.start(Box::new(Counter { next: 0, limit: 1 })).is_err());
        pump.stop();
    }

    #[test]
    fn packet_duration_follows_rate() {
        let settings = SourceSettings::new(IqFormat::Signed16, 1_000_000, 0, 40_000);
        assert_eq!(settings.packet_duration(), Duration::from_millis(10));
    }
}
