// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Raw sample source abstraction.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One block of raw interleaved I/Q bytes as delivered by a source.
pub type RawPacket = Vec<u8>;

/// On-the-wire encoding of interleaved I/Q samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IqFormat {
    /// Unsigned 8-bit, offset binary (RTL-SDR style).
    #[serde(rename = "u8")]
    Unsigned8,
    /// Signed 8-bit two's complement (HackRF style).
    #[serde(rename = "s8")]
    Signed8,
    /// Signed 16-bit little-endian.
    #[serde(rename = "s16")]
    Signed16,
    /// Signed 24-bit little-endian.
    #[serde(rename = "s24")]
    Signed24,
    /// Unsigned 24-bit little-endian, offset binary.
    #[serde(rename = "u24")]
    Unsigned24,
}

impl IqFormat {
    /// Bytes used by one I or Q component.
    pub fn bytes_per_component(self) -> usize {
        match self {
            IqFormat::Unsigned8 | IqFormat::Signed8 => 1,
            IqFormat::Signed16 => 2,
            IqFormat::Signed24 | IqFormat::Unsigned24 => 3,
        }
    }

    /// Bytes used by one complex sample (I and Q).
    pub fn bytes_per_sample(self) -> usize {
        2 * self.bytes_per_component()
    }

    /// Number of whole complex samples in `bytes` raw bytes.
    pub fn samples_in(self, bytes: usize) -> usize {
        bytes / self.bytes_per_sample()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IqFormat::Unsigned8 => "u8",
            IqFormat::Signed8 => "s8",
            IqFormat::Signed16 => "s16",
            IqFormat::Signed24 => "s24",
            IqFormat::Unsigned24 => "u24",
        }
    }
}

impl fmt::Display for IqFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IqFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "u8" => Ok(IqFormat::Unsigned8),
            "s8" => Ok(IqFormat::Signed8),
            "s16" => Ok(IqFormat::Signed16),
            "s24" => Ok(IqFormat::Signed24),
            "u24" => Ok(IqFormat::Unsigned24),
            other => Err(format!(
                "unknown IQ format '{}' (expected one of: u8, s8, s16, s24, u24)",
                other
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{0}' failed to open: {1}")]
    Open(String, String),

    #[error("source '{0}' failed to start sampling: {1}")]
    Start(String, String),
}

/// Anything that produces raw I/Q packets.
///
/// Sources run their own acquisition worker and own their packet pool;
/// consumers borrow packets with [`get_packet`](Source::get_packet) and hand
/// them back with [`return_packet`](Source::return_packet). All methods take
/// `&self` so a source can be stopped from any thread while another thread
/// is blocked in `get_packet`.
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    fn format(&self) -> IqFormat;

    /// Size of every packet in bytes.
    fn packet_size(&self) -> usize;

    /// Complex samples contained in one packet.
    fn sampled_packet_size(&self) -> usize {
        self.format().samples_in(self.packet_size())
    }

    /// Wait at most `timeout` for the next packet. `None` means the source
    /// has no more data (stopped, exhausted, or timed out).
    fn get_packet(&self, timeout: Duration) -> Option<RawPacket>;

    /// Give a packet back to the source's pool.
    fn return_packet(&self, packet: RawPacket);

    fn start_sampling(&self) -> Result<(), SourceError>;

    fn stop_sampling(&self);

    fn sample_rate(&self) -> u32;

    fn min_sample_rate(&self) -> u32 {
        self.sample_rate()
    }

    fn max_sample_rate(&self) -> u32 {
        self.sample_rate()
    }

    /// Tuned centre frequency (Hz).
    fn frequency(&self) -> i64;

    fn min_frequency(&self) -> i64 {
        self.frequency()
    }

    fn max_frequency(&self) -> i64 {
        self.frequency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_sizes() {
        assert_eq!(IqFormat::Unsigned8.bytes_per_sample(), 2);
        assert_eq!(IqFormat::Signed16.bytes_per_sample(), 4);
        assert_eq!(IqFormat::Signed24.bytes_per_sample(), 6);
        assert_eq!(IqFormat::Unsigned24.samples_in(16_384), 2730);
    }

    #[test]
    fn format_parses_and_displays() {
        for fmt in [
            IqFormat::Unsigned8,
            IqFormat::Signed8,
            IqFormat::Signed16,
            IqFormat::Signed24,
            IqFormat::Unsigned24,
        ] {
            assert_eq!(fmt.to_string().parse::<IqFormat>(), Ok(fmt));
        }
        assert_eq!(" S8 ".parse::<IqFormat>(), Ok(IqFormat::Signed8));
        assert!("f32".parse::<IqFormat>().is_err());
    }
}
