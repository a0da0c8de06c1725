// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod channel;
mod config;
mod recording;
mod source;
mod spectrum_task;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use rfa_app::{init_logging, ConfigFile};
use rfa_core::{DynResult, IqFormat, Source};
use rfa_dsp::{Scheduler, SchedulerConfig, SpectrumFrame};

use channel::{spawn_channel_worker, BasebandBlock, ChannelSettings};
use config::{ServerConfig, SourceKind};
use recording::FileRecordingSink;
use source::{FileSource, SourceSettings, ToneSource};
use spectrum_task::{spawn_spectrum_worker, SpectrumWorkerConfig};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - RF sample pipeline daemon");
const BROADCAST_CAPACITY: usize = 16;
const STATS_INTERVAL: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Play back a raw IQ recording (implies a file source)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<PathBuf>,
    /// Raw sample format (u8, s8, s16, s24, u24)
    #[arg(short = 'f', long = "format")]
    format: Option<IqFormat>,
    /// Source sample rate (Hz)
    #[arg(short = 's', long = "sample-rate")]
    sample_rate: Option<u32>,
    /// Source centre frequency (Hz)
    #[arg(short = 'F', long = "frequency")]
    frequency: Option<i64>,
    /// Channel centre frequency (Hz); enables the channel path
    #[arg(short = 'c', long = "channel", value_name = "HZ")]
    channel: Option<i64>,
    /// Record raw packets to FILE
    #[arg(short = 'r', long = "record", value_name = "FILE")]
    record: Option<PathBuf>,
}

/// Overlay command line values on the file configuration.
fn apply_cli(cli: &Cli, cfg: &mut ServerConfig) {
    if let Some(ref input) = cli.input {
        cfg.source.kind = SourceKind::File;
        cfg.source.path = Some(input.clone());
    }
    if let Some(format) = cli.format {
        cfg.source.format = format;
    }
    if let Some(rate) = cli.sample_rate {
        cfg.source.sample_rate = rate;
    }
    if let Some(freq) = cli.frequency {
        cfg.source.frequency_hz = freq;
    }
    if let Some(channel) = cli.channel {
        cfg.channel.enabled = true;
        cfg.channel.frequency_hz = Some(channel);
    }
    if let Some(ref record) = cli.record {
        cfg.recording.path = Some(record.clone());
    }
}

fn build_source(cfg: &ServerConfig) -> DynResult<Arc<dyn Source>> {
    let src = &cfg.source;
    let settings = SourceSettings {
        realtime: src.realtime,
        min_sample_rate: src.min_sample_rate.unwrap_or(src.sample_rate),
        max_sample_rate: src.max_sample_rate.unwrap_or(src.sample_rate),
        ..SourceSettings::new(src.format, src.sample_rate, src.frequency_hz, src.packet_size)
    };
    match src.kind {
        SourceKind::File => {
            let path = src.path.as_ref().ok_or("[source].path is not set")?;
            info!(
                "Playing {} ({}, {} Hz, loop: {})",
                path.display(),
                src.format,
                src.sample_rate,
                src.loop_playback
            );
            Ok(Arc::new(FileSource::open(path, settings, src.loop_playback)?))
        }
        SourceKind::Tone => {
            info!(
                "Synthesizing tone at {:+} Hz ({}, {} Hz)",
                src.tone_offset_hz, src.format, src.sample_rate
            );
            Ok(Arc::new(ToneSource::new(settings, src.tone_offset_hz, src.tone_amplitude)))
        }
    }
}

/// Resolve once the scheduler has stopped on its own.
async fn wait_for_scheduler(scheduler: Arc<Scheduler>) {
    let mut interval = tokio::time::interval(STOP_POLL_INTERVAL);
    while scheduler.is_running() {
        interval.tick().await;
    }
}

fn join_worker(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("{} worker panicked", name);
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = ServerConfig::load(cli.config.as_deref())?;
    apply_cli(&cli, &mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let source = build_source(&cfg)?;
    let squelch_db = cfg.channel.squelch_db.filter(|_| cfg.channel.enabled);
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&source),
        SchedulerConfig {
            fft_size: cfg.spectrum.fft_size,
            channel_frequency: cfg.channel_frequency(),
            demodulation: cfg.channel.enabled,
            squelch_open: squelch_db.is_none(),
        },
    )?);

    if let Some(ref path) = cfg.recording.path {
        let sink = FileRecordingSink::create(path)
            .map_err(|e| format!("Cannot create recording {}: {}", path.display(), e))?;
        info!("Recording raw packets to {}", sink.path().display());
        scheduler.start_recording(Box::new(sink));
    }

    // Consumers exit once the scheduler is no longer running.
    scheduler.start()?;

    let (spectrum_tx, mut spectrum_rx) = broadcast::channel::<Arc<SpectrumFrame>>(BROADCAST_CAPACITY);
    let (baseband_tx, mut baseband_rx) = broadcast::channel::<Arc<BasebandBlock>>(BROADCAST_CAPACITY);

    let spectrum_worker = spawn_spectrum_worker(
        Arc::clone(&scheduler),
        SpectrumWorkerConfig {
            fft_size: cfg.spectrum.fft_size,
            averaging: cfg.spectrum.averaging,
            half_bandwidth_hz: cfg.channel.half_bandwidth_hz,
            squelch_db,
        },
        spectrum_tx,
    )?;
    let channel_worker = if cfg.channel.enabled {
        info!(
            "Channel at {} Hz, +/- {} Hz",
            cfg.channel_frequency(),
            cfg.channel.half_bandwidth_hz
        );
        Some(spawn_channel_worker(
            Arc::clone(&scheduler),
            ChannelSettings {
                min_rate: cfg.channel.min_rate,
                optimal_rate: cfg.channel.optimal_rate,
                max_rate: cfg.channel.max_rate,
                half_bandwidth_hz: cfg.channel.half_bandwidth_hz,
                attenuation_db: cfg.channel.attenuation_db,
                passband_ripple_db: cfg.channel.passband_ripple_db,
            },
            baseband_tx,
        )?)
    } else {
        None
    };

    // Stand-in subscribers until a front-end attaches.
    tokio::spawn(async move {
        loop {
            match spectrum_rx.recv().await {
                Ok(frame) => {
                    let peak = frame
                        .bins
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.total_cmp(b.1));
                    if let Some((k, db)) = peak {
                        debug!("Spectrum peak {:.1} dB at {:.0} Hz", db, frame.bin_frequency(k));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Spectrum subscriber lagged, {} frames skipped", n);
                }
                Err(_) => break,
            }
        }
    });
    tokio::spawn(async move {
        loop {
            match baseband_rx.recv().await {
                Ok(block) => debug!(
                    "Baseband block: {} samples at {} Hz",
                    block.samples.len(),
                    block.sample_rate
                ),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Baseband subscriber lagged, {} blocks skipped", n);
                }
                Err(_) => break,
            }
        }
    });

    let stats_scheduler = Arc::clone(&scheduler);
    let stats_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = stats_scheduler.stats();
            info!(
                "packets {}, spectrum {} (dropped {} samples), channel {} (flushes {}), recorded {} bytes",
                stats.packets_processed,
                stats.spectrum_buffers_delivered,
                stats.spectrum_samples_dropped,
                stats.demod_buffers_delivered,
                stats.demod_backlog_flushes,
                stats.recording_bytes_written
            );
        }
    });

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Ctrl+C received, shutting down");
        }
        _ = wait_for_scheduler(Arc::clone(&scheduler)) => {
            info!("Sampling ended, shutting down");
        }
    }
    stats_task.abort();

    let final_scheduler = Arc::clone(&scheduler);
    tokio::task::spawn_blocking(move || {
        final_scheduler.stop();
        final_scheduler.join();
        join_worker("Spectrum", spectrum_worker);
        if let Some(handle) = channel_worker {
            join_worker("Channel", handle);
        }
    })
    .await?;

    let stats = scheduler.stats();
    info!(
        "Processed {} packets, {} spectrum samples dropped",
        stats.packets_processed, stats.spectrum_samples_dropped
    );
    Ok(())
}
