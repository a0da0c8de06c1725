// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use rfa_core::SampleBuffer;

use super::Filter;

/// Cascade of decimating filters run as one.
///
/// Input is pushed through in chunks small enough that no intermediate stage
/// can overflow its scratch buffer and the last stage cannot overflow the
/// caller's output, so every stage always consumes its whole input and the
/// chunk boundary is the only resume point.
#[derive(Debug, Clone)]
pub struct FilterChain {
    stages: Vec<Filter>,
    front: SampleBuffer,
    back: SampleBuffer,
}

impl FilterChain {
    /// `block_capacity` bounds the samples handed to the first stage per
    /// chunk.
    pub fn new(stages: Vec<Filter>, block_capacity: usize) -> Self {
        let block_capacity = block_capacity.max(1);
        Self {
            stages,
            front: SampleBuffer::new(block_capacity),
            back: SampleBuffer::new(block_capacity),
        }
    }

    /// A chain without stages; `process` copies.
    pub fn passthrough(block_capacity: usize) -> Self {
        Self::new(Vec::new(), block_capacity)
    }

    pub fn stages(&self) -> &[Filter] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Overall decimation factor.
    pub fn decimation(&self) -> usize {
        self.stages.iter().map(Filter::decimation).product()
    }

    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(Filter::reset);
    }

    /// Filter `input[offset..size]` into `output`, appending at its current
    /// size. Returns the number of input samples consumed; anything left
    /// over did not fit into `output` and should be passed again.
    pub fn process(&mut self, input: &SampleBuffer, offset: usize, output: &mut SampleBuffer) -> usize {
        let decimation = self.decimation();
        output.set_sample_rate(input.sample_rate() / decimation as u32);
        output.set_frequency(input.frequency());

        let offset = offset.min(input.size());
        let (re, im) = (&input.re()[offset..], &input.im()[offset..]);

        if self.stages.is_empty() {
            let n = re.len().min(output.remaining());
            let (out_re, out_im) = output.spare_mut();
            out_re[..n].copy_from_slice(&re[..n]);
            out_im[..n].copy_from_slice(&im[..n]);
            return output.commit(n);
        }

        let mut consumed = 0;
        while consumed < re.len() {
            // Each stage emits at most one sample more than in / D.
            let room = output.remaining().saturating_sub(self.stages.len()) * decimation;
            let chunk = (re.len() - consumed).min(self.front.capacity()).min(room);
            if chunk == 0 {
                break;
            }
            self.run_chunk(
                &re[consumed..consumed + chunk],
                &im[consumed..consumed + chunk],
                output,
            );
            consumed += chunk;
        }
        consumed
    }

    fn run_chunk(&mut self, re: &[f32], im: &[f32], output: &mut SampleBuffer) {
        let last = self.stages.len() - 1;
        let mut front = &mut self.front;
        let mut back = &mut self.back;
        for (i, stage) in self.stages.iter_mut().enumerate() {
            let (src_re, src_im) = if i == 0 {
                (re, im)
            } else {
                (front.re(), front.im())
            };
            if i == last {
                stage.apply_slices(src_re, src_im, output);
            } else {
                back.clear();
                stage.apply_slices(src_re, src_im, back);
                std::mem::swap(&mut front, &mut back);
            }
        }
    }
}
