// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Raw IQ conversion and mixing.
//!
//! Turns raw interleaved I/Q packets into normalized complex samples, either
//! as-is ([`IqConverter::fill`]) or shifted so that a channel frequency lands
//! at 0 Hz ([`IqConverter::mix`]).

use std::f64::consts::TAU;

use rfa_core::{IqFormat, SampleBuffer};

/// Upper bound for the oscillator table length (samples).
pub const MAX_MIXER_LENGTH: usize = 500;

/// Offset of unsigned 8-bit samples (RTL-SDR DC bias).
const U8_OFFSET: f32 = 127.4;
const SCALE_8: f32 = 128.0;
const SCALE_16: f32 = 32_768.0;
const SCALE_24: f32 = 8_388_608.0;

/// Oscillator table for one `(sample_rate, mix_frequency)` pair.
///
/// 8-bit formats additionally keep `cos`/`sin` premultiplied by every
/// possible component value, one row of 256 per table position.
#[derive(Debug, Clone)]
struct MixerTable {
    sample_rate: u32,
    mix_frequency: i64,
    cos: Vec<f32>,
    sin: Vec<f32>,
    cos_values: Vec<f32>,
    sin_values: Vec<f32>,
    index: usize,
}

impl MixerTable {
    fn new(sample_rate: u32, mix_frequency: i64, values: Option<&[f32]>) -> Self {
        let len = optimal_mixer_length(sample_rate, mix_frequency);
        let (sin, cos): (Vec<f32>, Vec<f32>) = (0..len)
            .map(|t| {
                let (s, c) = (TAU * mix_frequency as f64 * t as f64 / sample_rate as f64).sin_cos();
                (s as f32, c as f32)
            })
            .unzip();

        let (cos_values, sin_values) = match values {
            Some(values) => (
                cos.iter().flat_map(|&c| values.iter().map(move |&v| c * v)).collect(),
                sin.iter().flat_map(|&s| values.iter().map(move |&v| s * v)).collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        Self {
            sample_rate,
            mix_frequency,
            cos,
            sin,
            cos_values,
            sin_values,
            index: 0,
        }
    }

    fn matches(&self, sample_rate: u32, mix_frequency: i64) -> bool {
        self.sample_rate == sample_rate && self.mix_frequency == mix_frequency
    }

    fn len(&self) -> usize {
        self.cos.len()
    }

    fn advance(&mut self) -> usize {
        let t = self.index;
        self.index = (self.index + 1) % self.len();
        t
    }
}

/// Shift a zero or very low mixing frequency up by one sample-rate period
/// so that its oscillator table stays short.
pub fn alias_mix_frequency(sample_rate: u32, mix_frequency: i64) -> i64 {
    let fs = sample_rate as i64;
    if mix_frequency == 0 || fs / mix_frequency.abs() > MAX_MIXER_LENGTH as i64 {
        mix_frequency + fs
    } else {
        mix_frequency
    }
}

/// Table length whose repeated cycles come closest to closing exactly,
/// trying every cycle count that fits below [`MAX_MIXER_LENGTH`].
pub fn optimal_mixer_length(sample_rate: u32, mix_frequency: i64) -> usize {
    if mix_frequency == 0 {
        return 1;
    }
    let cycle = sample_rate as f64 / (mix_frequency as f64).abs();
    let mut best = cycle as usize;
    let mut best_error = (best as f64 - cycle).abs();
    let mut i = 1;
    while (i as f64) * cycle < MAX_MIXER_LENGTH as f64 {
        let length = i as f64 * cycle;
        if (length - length.trunc()).abs() < best_error {
            best = length as usize;
            best_error = (best as f64 - length).abs();
        }
        i += 1;
    }
    best.max(1)
}

/// Converts raw packets of one [`IqFormat`] into complex samples.
#[derive(Debug, Clone)]
pub struct IqConverter {
    format: IqFormat,
    sample_rate: u32,
    frequency: i64,
    /// Component value lookup, indexed by the raw 8- or 16-bit pattern.
    /// Empty for 24-bit formats, which decode directly.
    values: Vec<f32>,
    mixer: Option<MixerTable>,
}

impl IqConverter {
    pub fn new(format: IqFormat) -> Self {
        let values: Vec<f32> = match format {
            IqFormat::Unsigned8 => (0..256).map(|i| (i as f32 - U8_OFFSET) / SCALE_8).collect(),
            IqFormat::Signed8 => (0..256u32).map(|i| (i as u8 as i8) as f32 / SCALE_8).collect(),
            IqFormat::Signed16 => (0..65_536u32)
                .map(|i| (i as u16 as i16) as f32 / SCALE_16)
                .collect(),
            IqFormat::Signed24 | IqFormat::Unsigned24 => Vec::new(),
        };
        Self {
            format,
            sample_rate: 0,
            frequency: 0,
            values,
            mixer: None,
        }
    }

    pub fn format(&self) -> IqFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    /// Source centre frequency (Hz).
    pub fn frequency(&self) -> i64 {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: i64) {
        self.frequency = frequency;
    }

    /// Length of the cached oscillator table, 0 before the first `mix`.
    pub fn mixer_table_len(&self) -> usize {
        self.mixer.as_ref().map_or(0, MixerTable::len)
    }

    fn is_8bit(&self) -> bool {
        matches!(self.format, IqFormat::Unsigned8 | IqFormat::Signed8)
    }

    /// Raw pattern of component `n` (0 = I, 1 = Q of sample 0, ...), used to
    /// index the value table.
    fn pattern(&self, packet: &[u8], n: usize) -> usize {
        match self.format {
            IqFormat::Unsigned8 | IqFormat::Signed8 => packet[n] as usize,
            _ => u16::from_le_bytes([packet[2 * n], packet[2 * n + 1]]) as usize,
        }
    }

    /// Normalized value of component `n`.
    fn component(&self, packet: &[u8], n: usize) -> f32 {
        match self.format {
            IqFormat::Signed24 => {
                let raw = read_u24(packet, n);
                // Sign-extend the 24-bit value.
                (((raw << 8) as i32) >> 8) as f32 / SCALE_24
            }
            IqFormat::Unsigned24 => {
                let raw = read_u24(packet, n) as i32;
                (raw - (SCALE_24 as i32 - 1)) as f32 / SCALE_24
            }
            _ => self.values[self.pattern(packet, n)],
        }
    }

    /// Append the samples of `packet` to `out` without frequency shift.
    ///
    /// Stops when `out` is full; returns the number of samples written. The
    /// buffer is tagged with the converter's sample rate and the source
    /// frequency.
    pub fn fill(&self, packet: &[u8], out: &mut SampleBuffer) -> usize {
        let count = self.format.samples_in(packet.len()).min(out.remaining());
        {
            let (re, im) = out.spare_mut();
            for k in 0..count {
                re[k] = self.component(packet, 2 * k);
                im[k] = self.component(packet, 2 * k + 1);
            }
        }
        out.set_sample_rate(self.sample_rate);
        out.set_frequency(self.frequency);
        out.commit(count)
    }

    /// Append the samples of `packet` to `out`, shifted so that
    /// `channel_frequency` ends up at 0 Hz.
    ///
    /// The oscillator phase carries over between calls as long as the sample
    /// rate and mixing frequency stay the same. Stops when `out` is full;
    /// returns the number of samples written. The buffer is tagged with the
    /// converter's sample rate and `channel_frequency`.
    pub fn mix(&mut self, packet: &[u8], out: &mut SampleBuffer, channel_frequency: i64) -> usize {
        if self.sample_rate == 0 {
            return 0;
        }
        let mix_frequency = alias_mix_frequency(self.sample_rate, self.frequency - channel_frequency);
        if !self
            .mixer
            .as_ref()
            .is_some_and(|m| m.matches(self.sample_rate, mix_frequency))
        {
            let values = self.is_8bit().then_some(self.values.as_slice());
            self.mixer = Some(MixerTable::new(self.sample_rate, mix_frequency, values));
        }
        let Some(mut mixer) = self.mixer.take() else {
            return 0;
        };

        let count = self.format.samples_in(packet.len()).min(out.remaining());
        {
            let (re, im) = out.spare_mut();
            if self.is_8bit() {
                for k in 0..count {
                    let row = mixer.advance() * 256;
                    let i = row + packet[2 * k] as usize;
                    let q = row + packet[2 * k + 1] as usize;
                    re[k] = mixer.cos_values[i] - mixer.sin_values[q];
                    im[k] = mixer.cos_values[q] + mixer.sin_values[i];
                }
            } else {
                for k in 0..count {
                    let t = mixer.advance();
                    let i = self.component(packet, 2 * k);
                    let q = self.component(packet, 2 * k + 1);
                    re[k] = mixer.cos[t] * i - mixer.sin[t] * q;
                    im[k] = mixer.cos[t] * q + mixer.sin[t] * i;
                }
            }
        }
        self.mixer = Some(mixer);

        out.set_sample_rate(self.sample_rate);
        out.set_frequency(channel_frequency);
        out.commit(count)
    }
}

fn read_u24(packet: &[u8], n: usize) -> u32 {
    let b = &packet[3 * n..3 * n + 3];
    b[0] as u32 | (b[1] as u32) << 8 | (b[2] as u32) << 16
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FORMATS: [IqFormat; 5] = [
        IqFormat::Unsigned8,
        IqFormat::Signed8,
        IqFormat::Signed16,
        IqFormat::Signed24,
        IqFormat::Unsigned24,
    ];

    fn converter(format: IqFormat, sample_rate: u32, frequency: i64) -> IqConverter {
        let mut conv = IqConverter::new(format);
        conv.set_sample_rate(sample_rate);
        conv.set_frequency(frequency);
        conv
    }

    fn s16_packet(samples: &[(i16, i16)]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|&(i, q)| {
                let mut b = i.to_le_bytes().to_vec();
                b.extend_from_slice(&q.to_le_bytes());
                b
            })
            .collect()
    }

    #[test]
    fn scales_8bit_formats() {
        let conv = converter(IqFormat::Unsigned8, 1000, 0);
        let mut buf = SampleBuffer::new(4);
        assert_eq!(conv.fill(&[0, 255, 127, 128], &mut buf), 2);
        assert!((buf.re()[0] - (-127.4 / 128.0)).abs() < 1e-6);
        assert!((buf.im()[0] - (127.6 / 128.0)).abs() < 1e-6);
        assert!((buf.re()[1] - (-0.4 / 128.0)).abs() < 1e-6);

        let conv = converter(IqFormat::Signed8, 1000, 0);
        let mut buf = SampleBuffer::new(4);
        assert_eq!(conv.fill(&[0x80, 0x7f, 0x00, 0xff], &mut buf), 2);
        assert_eq!(buf.re(), &[-1.0, 0.0]);
        assert_eq!(buf.im(), &[127.0 / 128.0, -1.0 / 128.0]);
    }

    #[test]
    fn scales_wide_formats() {
        let conv = converter(IqFormat::Signed16, 1000, 0);
        let mut buf = SampleBuffer::new(2);
        conv.fill(&s16_packet(&[(i16::MIN, 16_384)]), &mut buf);
        assert_eq!(buf.re(), &[-1.0]);
        assert_eq!(buf.im(), &[0.5]);

        let conv = converter(IqFormat::Signed24, 1000, 0);
        let mut buf = SampleBuffer::new(2);
        // I = -2^23, Q = 2^22
        conv.fill(&[0x00, 0x00, 0x80, 0x00, 0x00, 0x40], &mut buf);
        assert_eq!(buf.re(), &[-1.0]);
        assert_eq!(buf.im(), &[0.5]);

        let conv = converter(IqFormat::Unsigned24, 1000, 0);
        let mut buf = SampleBuffer::new(2);
        // I = 2^23 - 1 (zero), Q = 0
        conv.fill(&[0xff, 0xff, 0x7f, 0x00, 0x00, 0x00], &mut buf);
        assert_eq!(buf.re(), &[0.0]);
        assert!((buf.im()[0] - (-(SCALE_24 - 1.0) / SCALE_24)).abs() < 1e-6);
    }

    #[test]
    fn fill_stops_at_capacity_and_tags() {
        let conv = converter(IqFormat::Unsigned8, 2_000_000, 100_000_000);
        let mut buf = SampleBuffer::new(5);
        buf.push(0.0, 0.0);
        assert_eq!(conv.fill(&[128u8; 20], &mut buf), 4);
        assert!(buf.is_full());
        assert_eq!(buf.sample_rate(), 2_000_000);
        assert_eq!(buf.frequency(), 100_000_000);
        assert_eq!(conv.fill(&[128u8; 20], &mut buf), 0);
    }

    #[test]
    fn mixing_at_source_frequency_matches_fill() {
        let packet: Vec<u8> = (0..600u32).map(|i| (i * 37 % 256) as u8).collect();
        for format in ALL_FORMATS {
            let mut conv = converter(format, 48_000, 433_920_000);
            let mut plain = SampleBuffer::new(400);
            let mut mixed = SampleBuffer::new(400);
            conv.fill(&packet, &mut plain);
            conv.mix(&packet, &mut mixed, 433_920_000);
            assert_eq!(plain.size(), mixed.size(), "{}", format);
            for (a, b) in plain.iter().zip(mixed.iter()) {
                assert!((a - b).norm() < 1e-5, "{}: {} vs {}", format, a, b);
            }
            assert_eq!(mixed.frequency(), 433_920_000);
        }
    }

    #[test]
    fn mixing_shifts_by_quarter_rate() {
        let mut conv = converter(IqFormat::Signed16, 48_000, 100_012_000);
        let packet = s16_packet(&[(16_384, 0); 8]);
        let mut buf = SampleBuffer::new(8);
        assert_eq!(conv.mix(&packet, &mut buf, 100_000_000), 8);
        assert_eq!(conv.mixer_table_len(), 4);
        let expected = [(0.5, 0.0), (0.0, 0.5), (-0.5, 0.0), (0.0, -0.5)];
        for (n, s) in buf.iter().enumerate() {
            let (re, im) = expected[n % 4];
            assert!((s.re - re).abs() < 1e-6 && (s.im - im).abs() < 1e-6, "sample {}: {}", n, s);
        }
        assert_eq!(buf.frequency(), 100_000_000);
    }

    #[test]
    fn table_is_cached_and_phase_continues() {
        let mut conv = converter(IqFormat::Unsigned8, 48_000, 7_000);
        let packet = [200u8; 10];

        let mut first = SampleBuffer::new(5);
        conv.mix(&packet, &mut first, 0);
        assert_eq!(conv.mixer_table_len(), 48);
        let mut second = SampleBuffer::new(5);
        conv.mix(&packet, &mut second, 0);
        assert!(
            (first.get(0).unwrap() - second.get(0).unwrap()).norm() > 1e-3,
            "phase must carry over between packets"
        );

        // A different frequency rebuilds the table; switching back restarts
        // the oscillator at phase zero.
        let mut other = SampleBuffer::new(5);
        conv.mix(&packet, &mut other, 1_000);
        let mut again = SampleBuffer::new(5);
        conv.mix(&packet, &mut again, 0);
        assert_eq!(first.re(), again.re());
        assert_eq!(first.im(), again.im());
    }

    #[test]
    fn low_mix_frequencies_are_aliased() {
        assert_eq!(alias_mix_frequency(48_000, 0), 48_000);
        assert_eq!(alias_mix_frequency(48_000, 50), 48_050);
        assert_eq!(alias_mix_frequency(48_000, -12_000), -12_000);
        assert_eq!(optimal_mixer_length(48_000, 48_050), 499);
        assert_eq!(optimal_mixer_length(48_000, 48_000), 1);
        assert_eq!(optimal_mixer_length(2_000_000, -333_333), 6);
        assert_eq!(optimal_mixer_length(2_000_000, 250_000), 8);
    }

    #[test]
    fn mix_without_sample_rate_is_noop() {
        let mut conv = IqConverter::new(IqFormat::Unsigned8);
        let mut buf = SampleBuffer::new(4);
        assert_eq!(conv.mix(&[1, 2, 3, 4], &mut buf, 0), 0);
        assert!(buf.is_empty());
    }
}
