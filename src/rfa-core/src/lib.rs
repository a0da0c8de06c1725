// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod buffer;
pub mod queue;
pub mod sink;
pub mod source;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use buffer::{BufferError, SampleBuffer};
pub use queue::{BufferQueue, QueuePair};
pub use sink::RecordingSink;
pub use source::{IqFormat, RawPacket, Source, SourceError};
