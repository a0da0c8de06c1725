// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Synthetic single-tone source.

use std::f64::consts::TAU;
use std::io;
use std::time::Duration;

use rfa_core::{IqFormat, RawPacket, Source, SourceError};

use super::{PacketProducer, PacketPump, Produced, SourceSettings};

const FULL_SCALE_24: f64 = 8_388_608.0;

/// Encode one normalized component into `out` (1, 2 or 3 bytes).
pub fn encode_component(format: IqFormat, value: f32, out: &mut [u8]) {
    let v = value as f64;
    match format {
        IqFormat::Unsigned8 => out[0] = (v * 128.0 + 127.4).round().clamp(0.0, 255.0) as u8,
        IqFormat::Signed8 => out[0] = (v * 128.0).round().clamp(-128.0, 127.0) as i8 as u8,
        IqFormat::Signed16 => {
            let s = (v * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16;
            out[..2].copy_from_slice(&s.to_le_bytes());
        }
        IqFormat::Signed24 => {
            let s = (v * FULL_SCALE_24).round().clamp(-FULL_SCALE_24, FULL_SCALE_24 - 1.0) as i32;
            out[..3].copy_from_slice(&s.to_le_bytes()[..3]);
        }
        IqFormat::Unsigned24 => {
            let s = (v * FULL_SCALE_24 + FULL_SCALE_24 - 1.0)
                .round()
                .clamp(0.0, 2.0 * FULL_SCALE_24 - 1.0) as u32;
            out[..3].copy_from_slice(&s.to_le_bytes()[..3]);
        }
    }
}

/// Emits `amplitude * exp(j 2π offset t)` encoded in the configured format.
/// Never runs dry.
pub struct ToneSource {
    offset_hz: f64,
    amplitude: f32,
    pump: PacketPump,
}

impl ToneSource {
    pub fn new(settings: SourceSettings, offset_hz: f64, amplitude: f32) -> Self {
        Self {
            offset_hz,
            amplitude,
            pump: PacketPump::new("tone", settings),
        }
    }

    pub fn offset_hz(&self) -> f64 {
        self.offset_hz
    }
}

pub(crate) struct ToneGenerator {
    format: IqFormat,
    phase: f64,
    step: f64,
    amplitude: f32,
}

impl ToneGenerator {
    pub(crate) fn new(format: IqFormat, sample_rate: u32, offset_hz: f64, amplitude: f32) -> Self {
        Self {
            format,
            phase: 0.0,
            step: TAU * offset_hz / sample_rate.max(1) as f64,
            amplitude,
        }
    }
}

impl PacketProducer for ToneGenerator {
    fn produce(&mut self, packet: &mut [u8]) -> io::Result<Produced> {
        let width = self.format.bytes_per_component();
        for sample in packet.chunks_exact_mut(2 * width) {
            let (s, c) = self.phase.sin_cos();
            let (i, q) = sample.split_at_mut(width);
            encode_component(self.format, self.amplitude * c as f32, i);
            encode_component(self.format, self.amplitude * s as f32, q);
            self.phase = (self.phase + self.step).rem_euclid(TAU);
        }
        Ok(Produced::Packet)
    }
}

impl Source for ToneSource {
    fn name(&self) -> &str {
        self.pump.name()
    }

    fn format(&self) -> IqFormat {
        self.pump.settings().format
    }

    fn packet_size(&self) -> usize {
        self.pump.settings().packet_size
    }

    fn get_packet(&self, timeout: Duration) -> Option<RawPacket> {
        self.pump.get_packet(timeout)
    }

    fn return_packet(&self, packet: RawPacket) {
        self.pump.return_packet(packet);
    }

    fn start_sampling(&self) -> Result<(), SourceError> {
        let settings = self.pump.settings();
        self.pump.start(Box::new(ToneGenerator::new(
            settings.format,
            settings.sample_rate,
            self.offset_hz,
            self.amplitude,
        )))
    }

    fn stop_sampling(&self) {
        self.pump.stop();
    }

    fn sample_rate(&self) -> u32 {
        self.pump.settings().sample_rate
    }

    fn min_sample_rate(&self) -> u32 {
        self.pump.settings().min_sample_rate
    }

    fn max_sample_rate(&self) -> u32 {
        self.pump.settings().max_sample_rate
    }

    fn frequency(&self) -> i64 {
        self.pump.settings().frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfa_core::SampleBuffer;
    use rfa_dsp::IqConverter;

    #[test]
    fn encoded_tone_decodes_back() {
        for (format, tolerance) in [
            (IqFormat::Unsigned8, 1e-2),
            (IqFormat::Signed8, 1e-2),
            (IqFormat::Signed16, 1e-4),
            (IqFormat::Signed24, 1e-6),
            (IqFormat::Unsigned24, 1e-6),
        ] {
            let mut generator = ToneGenerator::new(format, 48_000, 1_000.0, 0.5);
            let mut packet = vec![0u8; 48 * format.bytes_per_sample()];
            generator.produce(&mut packet).unwrap();

            let mut converter = IqConverter::new(format);
            converter.set_sample_rate(48_000);
            let mut buf = SampleBuffer::new(48);
            assert_eq!(converter.fill(&packet, &mut buf), 48);
            for (n, s) in buf.iter().enumerate() {
                let phase = TAU * n as f64 / 48.0;
                let expected_re = 0.5 * phase.cos() as f32;
                let expected_im = 0.5 * phase.sin() as f32;
                assert!(
                    (s.re - expected_re).abs() < tolerance && (s.im - expected_im).abs() < tolerance,
                    "{} sample {}: {}",
                    format,
                    n,
                    s
                );
            }
        }
    }

    #[test]
    fn encoding_saturates() {
        let mut out = [0u8; 3];
        encode_component(IqFormat::Signed16, 2.0, &mut out);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), i16::MAX);
        encode_component(IqFormat::Signed8, -2.0, &mut out);
        assert_eq!(out[0] as i8, i8::MIN);
        encode_component(IqFormat::Unsigned8, 2.0, &mut out);
        assert_eq!(out[0], 255);
        encode_component(IqFormat::Signed24, -1.0, &mut out);
        assert_eq!(out, [0x00, 0x00, 0x80]);
    }

    #[test]
    fn tone_source_streams_until_stopped() {
        let mut settings = SourceSettings::new(IqFormat::Signed16, 1_000_000, 433_920_000, 4096);
        settings.realtime = true;
        let source = ToneSource::new(settings, 100_000.0, 0.5);
        source.start_sampling().unwrap();
        for _ in 0..3 {
            let packet = source.get_packet(Duration::from_secs(1)).unwrap();
            assert_eq!(packet.len(), 4096);
            source.return_packet(packet);
        }
        source.stop_sampling();
        assert_eq!(source.frequency(), 433_920_000);
    }
}
