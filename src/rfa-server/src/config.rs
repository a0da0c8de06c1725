// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for rfa-server.
//!
//! Config is loaded from the `[rfa-server]` section of `rfa.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./rfa.toml`
//! 3. `~/.config/rfa/rfa.toml`
//! 4. `/etc/rfa/rfa.toml`

use std::path::PathBuf;

use rfa_app::ConfigFile;
use rfa_core::IqFormat;
use serde::{Deserialize, Serialize};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Sample source
    pub source: SourceConfig,
    /// Spectrum consumer
    pub spectrum: SpectrumConfig,
    /// Channel (demodulation) path
    pub channel: ChannelConfig,
    /// Raw recording
    pub recording: RecordingConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Play back a raw IQ recording.
    File,
    /// Synthesize a single complex tone.
    #[default]
    Tone,
}

/// Sample source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Recording to play back (file sources)
    pub path: Option<PathBuf>,
    /// Raw sample encoding
    pub format: IqFormat,
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Centre frequency the samples were taken at (Hz)
    pub frequency_hz: i64,
    /// Bytes per raw packet
    pub packet_size: usize,
    /// Restart file playback at end of file
    pub loop_playback: bool,
    /// Pace packets to the sample rate
    pub realtime: bool,
    /// Tone offset from the centre frequency (Hz)
    pub tone_offset_hz: f64,
    /// Tone amplitude, full scale = 1.0
    pub tone_amplitude: f32,
    /// Advertised sample rate range; defaults to `sample_rate`
    pub min_sample_rate: Option<u32>,
    pub max_sample_rate: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Tone,
            path: None,
            format: IqFormat::Unsigned8,
            sample_rate: 2_000_000,
            frequency_hz: 100_000_000,
            packet_size: 16_384,
            loop_playback: false,
            realtime: true,
            tone_offset_hz: 250_000.0,
            tone_amplitude: 0.5,
            min_sample_rate: None,
            max_sample_rate: None,
        }
    }
}

/// Spectrum consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Samples per FFT, power of two
    pub fft_size: usize,
    /// Exponential smoothing factor in (0, 1]; 1 disables averaging
    pub averaging: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            averaging: 1.0,
        }
    }
}

/// Channel path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Feed the demodulation path
    pub enabled: bool,
    /// Channel centre frequency (Hz); defaults to the source frequency
    pub frequency_hz: Option<i64>,
    /// Channel half bandwidth (Hz)
    pub half_bandwidth_hz: u32,
    /// Decimated output rate bounds (Hz)
    pub min_rate: u32,
    pub optimal_rate: u32,
    pub max_rate: u32,
    /// Squelch threshold on the channel band power (dB); unset keeps the
    /// squelch open
    pub squelch_db: Option<f32>,
    /// Decimation filter stop band attenuation (dB)
    pub attenuation_db: f64,
    /// Decimation filter pass band ripple (dB)
    pub passband_ripple_db: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency_hz: None,
            half_bandwidth_hz: 12_500,
            min_rate: 48_000,
            optimal_rate: 96_000,
            max_rate: 384_000,
            squelch_db: None,
            attenuation_db: 60.0,
            passband_ripple_db: 0.5,
        }
    }
}

/// Raw recording configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Append raw packets to this file
    pub path: Option<PathBuf>,
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "rfa-server"
    }
}

impl ServerConfig {
    /// Channel centre frequency, falling back to the source frequency.
    pub fn channel_frequency(&self) -> i64 {
        self.channel.frequency_hz.unwrap_or(self.source.frequency_hz)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        self.validate_source()?;

        let fft_size = self.spectrum.fft_size;
        if fft_size < 64 || !fft_size.is_power_of_two() {
            return Err("[spectrum].fft_size must be a power of two >= 64".to_string());
        }
        if !(self.spectrum.averaging > 0.0 && self.spectrum.averaging <= 1.0) {
            return Err("[spectrum].averaging must be in range (0, 1]".to_string());
        }

        self.validate_channel()
    }

    fn validate_source(&self) -> Result<(), String> {
        let src = &self.source;
        if src.kind == SourceKind::File && src.path.is_none() {
            return Err("[source].path is required when kind = \"file\"".to_string());
        }
        if src.sample_rate == 0 {
            return Err("[source].sample_rate must be > 0".to_string());
        }
        let bytes_per_sample = src.format.bytes_per_sample();
        if src.packet_size == 0 || src.packet_size % bytes_per_sample != 0 {
            return Err(format!(
                "[source].packet_size must be a positive multiple of {} for format {}",
                bytes_per_sample, src.format
            ));
        }
        let min = src.min_sample_rate.unwrap_or(src.sample_rate);
        let max = src.max_sample_rate.unwrap_or(src.sample_rate);
        if !(min <= src.sample_rate && src.sample_rate <= max) {
            return Err(
                "[source].min_sample_rate <= sample_rate <= max_sample_rate must hold".to_string(),
            );
        }
        if src.kind == SourceKind::Tone {
            if !(src.tone_amplitude > 0.0 && src.tone_amplitude <= 1.0) {
                return Err("[source].tone_amplitude must be in range (0, 1]".to_string());
            }
            if src.tone_offset_hz.abs() >= src.sample_rate as f64 / 2.0 {
                return Err("[source].tone_offset_hz must be within +/- sample_rate / 2".to_string());
            }
        }
        Ok(())
    }

    fn validate_channel(&self) -> Result<(), String> {
        let ch = &self.channel;
        if !ch.enabled {
            return Ok(());
        }
        if ch.min_rate == 0 || ch.min_rate > ch.optimal_rate || ch.optimal_rate > ch.max_rate {
            return Err(
                "[channel] rates must satisfy 0 < min_rate <= optimal_rate <= max_rate".to_string(),
            );
        }
        if self.source.sample_rate < ch.min_rate {
            return Err("[channel].min_rate must not exceed [source].sample_rate".to_string());
        }
        if ch.half_bandwidth_hz == 0 || ch.half_bandwidth_hz as f64 >= ch.min_rate as f64 * 0.48 {
            return Err("[channel].half_bandwidth_hz must be in range (0, 0.48 * min_rate)".to_string());
        }
        if ch.attenuation_db <= 0.0 || ch.passband_ripple_db <= 0.0 {
            return Err("[channel].attenuation_db and passband_ripple_db must be > 0".to_string());
        }
        let offset = (self.channel_frequency() - self.source.frequency_hz).abs();
        if offset as f64 >= self.source.sample_rate as f64 / 2.0 {
            return Err("[channel].frequency_hz must lie within the source bandwidth".to_string());
        }
        Ok(())
    }

    /// Generate an example configuration wrapped under the `[rfa-server]`
    /// section header.
    pub fn example_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "rfa-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            source: SourceConfig {
                kind: SourceKind::File,
                path: Some(PathBuf::from("/var/lib/rfa/capture-100M-2M.u8")),
                loop_playback: true,
                ..SourceConfig::default()
            },
            spectrum: SpectrumConfig::default(),
            channel: ChannelConfig {
                enabled: true,
                frequency_hz: Some(100_250_000),
                squelch_db: Some(-60.0),
                ..ChannelConfig::default()
            },
            recording: RecordingConfig::default(),
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.source.kind, SourceKind::Tone);
        assert_eq!(config.source.format, IqFormat::Unsigned8);
        assert_eq!(config.source.sample_rate, 2_000_000);
        assert_eq!(config.spectrum.fft_size, 4096);
        assert!(!config.channel.enabled);
        assert_eq!(config.channel.optimal_rate, 96_000);
        assert_eq!(config.channel_frequency(), 100_000_000);
        assert!(config.recording.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[source]
kind = "file"
path = "/tmp/capture.s16"
format = "s16"
sample_rate = 2400000
"#;

        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.source.kind, SourceKind::File);
        assert_eq!(config.source.format, IqFormat::Signed16);
        assert_eq!(config.source.sample_rate, 2_400_000);
        assert_eq!(config.source.packet_size, 16_384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[source]
kind = "tone"
format = "s8"
sample_rate = 1000000
frequency_hz = 433920000
packet_size = 8192
tone_offset_hz = -125000.0
tone_amplitude = 0.25

[spectrum]
fft_size = 1024
averaging = 0.3

[channel]
enabled = true
frequency_hz = 433800000
half_bandwidth_hz = 5000
min_rate = 24000
optimal_rate = 48000
max_rate = 96000
squelch_db = -55.0

[recording]
path = "/tmp/out.s8"
"#;

        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.source.format, IqFormat::Signed8);
        assert_eq!(config.source.tone_offset_hz, -125_000.0);
        assert_eq!(config.spectrum.fft_size, 1024);
        assert!(config.channel.enabled);
        assert_eq!(config.channel_frequency(), 433_800_000);
        assert_eq!(config.channel.squelch_db, Some(-55.0));
        assert_eq!(config.channel.attenuation_db, 60.0);
        assert_eq!(config.recording.path, Some(PathBuf::from("/tmp/out.s8")));
        assert!(config.validate().is_ok(), "{:?}", config.validate());
    }

    #[test]
    fn test_example_toml_parses() {
        let example = ServerConfig::example_toml();
        let config = ServerConfig::load_from_str(&example).unwrap();
        assert_eq!(config.source.kind, SourceKind::File);
        assert!(config.channel.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_file_without_path() {
        let mut config = ServerConfig::default();
        config.source.kind = SourceKind::File;
        let err = config.validate().unwrap_err();
        assert!(err.contains("[source].path"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_ragged_packet_size() {
        let mut config = ServerConfig::default();
        config.source.format = IqFormat::Signed24;
        config.source.packet_size = 16_384;
        assert!(config.validate().is_err(), "16384 is not a multiple of 6");
        config.source.packet_size = 6 * 2048;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fft_size() {
        let mut config = ServerConfig::default();
        config.spectrum.fft_size = 1000;
        assert!(config.validate().is_err());
        config.spectrum.fft_size = 32;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_channel_rates() {
        let mut config = ServerConfig::default();
        config.channel.enabled = true;
        config.channel.min_rate = 100_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_channel_outside_band() {
        let mut config = ServerConfig::default();
        config.channel.enabled = true;
        config.channel.frequency_hz = Some(101_500_000);
        let err = config.validate().unwrap_err();
        assert!(err.contains("source bandwidth"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = ServerConfig::default();
        config.general.log_level = Some("loud".to_string());
        assert!(config.validate().is_err());
    }
}
