// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::io;

/// Append-only byte sink receiving raw packets verbatim.
pub trait RecordingSink: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush and release the sink. Called exactly once.
    fn close(&mut self) -> io::Result<()>;
}
