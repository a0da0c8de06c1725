// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Failure modes of the Remez exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvergenceError {
    #[error("too many extremals, cannot continue")]
    TooManyExtremals,

    #[error("insufficient extremals, cannot continue")]
    InsufficientExtremals,

    #[error("did not converge after {iterations} iterations")]
    DidNotConverge { iterations: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DspError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("remez: {0}")]
    Convergence(#[from] ConvergenceError),

    #[error("stop band peaks at {peak_db:.2} dB, limit is {limit_db:.2} dB")]
    StopbandShortfall { peak_db: f64, limit_db: f64 },
}

impl DspError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DspError::InvalidParameter(msg.into())
    }
}

pub type DspResult<T> = Result<T, DspError>;
