// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Fixed-capacity complex sample buffer passed between pipeline workers.

use num_complex::Complex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("size {size} exceeds buffer capacity {capacity}")]
    SizeExceedsCapacity { size: usize, capacity: usize },
}

/// Complex samples stored as separate real and imaginary arrays.
///
/// Both arrays are allocated once with `capacity` entries. `size` counts the
/// valid leading samples; readers only ever see `[..size]` and writers only
/// ever get `[size..capacity]`, so `size <= capacity` holds at all times.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    re: Vec<f32>,
    im: Vec<f32>,
    size: usize,
    /// Sample rate of the contained samples (Hz).
    sample_rate: u32,
    /// Centre frequency of the contained samples (Hz).
    frequency: i64,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            re: vec![0.0; capacity],
            im: vec![0.0; capacity],
            size: 0,
            sample_rate: 0,
            frequency: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.re.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Free slots left before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.size
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Mark the buffer as empty. Storage is kept.
    pub fn clear(&mut self) {
        self.size = 0;
    }

    pub fn set_size(&mut self, size: usize) -> Result<(), BufferError> {
        if size > self.capacity() {
            return Err(BufferError::SizeExceedsCapacity {
                size,
                capacity: self.capacity(),
            });
        }
        self.size = size;
        Ok(())
    }

    pub fn re(&self) -> &[f32] {
        &self.re[..self.size]
    }

    pub fn im(&self) -> &[f32] {
        &self.im[..self.size]
    }

    /// Writable tail `[size..capacity]` of both arrays.
    ///
    /// Pair with [`commit`](Self::commit) once samples have been written.
    pub fn spare_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let size = self.size;
        (&mut self.re[size..], &mut self.im[size..])
    }

    /// Extend `size` by `written` samples, bounded by the spare length.
    /// Returns the number of samples actually committed.
    pub fn commit(&mut self, written: usize) -> usize {
        let written = written.min(self.remaining());
        self.size += written;
        written
    }

    /// Append one sample. Returns `false` when the buffer is full.
    pub fn push(&mut self, re: f32, im: f32) -> bool {
        if self.is_full() {
            return false;
        }
        self.re[self.size] = re;
        self.im[self.size] = im;
        self.size += 1;
        true
    }

    pub fn get(&self, index: usize) -> Option<Complex<f32>> {
        (index < self.size).then(|| Complex::new(self.re[index], self.im[index]))
    }

    pub fn iter(&self) -> impl Iterator<Item = Complex<f32>> + '_ {
        self.re()
            .iter()
            .zip(self.im())
            .map(|(&re, &im)| Complex::new(re, im))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    pub fn frequency(&self) -> i64 {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: i64) {
        self.frequency = frequency;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let buf = SampleBuffer::new(16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.size(), 0);
        assert!(buf.is_empty());
        assert!(buf.re().is_empty());
    }

    #[test]
    fn set_size_rejects_overflow() {
        let mut buf = SampleBuffer::new(4);
        assert!(buf.set_size(4).is_ok());
        assert_eq!(
            buf.set_size(5),
            Err(BufferError::SizeExceedsCapacity {
                size: 5,
                capacity: 4
            })
        );
        assert_eq!(buf.size(), 4, "failed set_size must not touch size");
    }

    #[test]
    fn commit_is_bounded_by_capacity() {
        let mut buf = SampleBuffer::new(8);
        {
            let (re, im) = buf.spare_mut();
            assert_eq!(re.len(), 8);
            re[..3].copy_from_slice(&[1.0, 2.0, 3.0]);
            im[..3].copy_from_slice(&[-1.0, -2.0, -3.0]);
        }
        assert_eq!(buf.commit(3), 3);
        assert_eq!(buf.re(), &[1.0, 2.0, 3.0]);
        assert_eq!(buf.spare_mut().0.len(), 5);
        assert_eq!(buf.commit(100), 5);
        assert!(buf.is_full());
        assert_eq!(buf.commit(1), 0);
    }

    #[test]
    fn push_stops_at_capacity() {
        let mut buf = SampleBuffer::new(2);
        assert!(buf.push(1.0, 0.5));
        assert!(buf.push(2.0, 1.5));
        assert!(!buf.push(3.0, 2.5));
        assert_eq!(buf.get(1), Some(Complex::new(2.0, 1.5)));
        assert_eq!(buf.get(2), None);
        let samples: Vec<_> = buf.iter().collect();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn clear_keeps_tags_and_capacity() {
        let mut buf = SampleBuffer::new(4);
        buf.push(1.0, 1.0);
        buf.set_sample_rate(48_000);
        buf.set_frequency(100_000_000);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.sample_rate(), 48_000);
        assert_eq!(buf.frequency(), 100_000_000);
    }
}
