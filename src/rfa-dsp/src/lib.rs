// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sample pipeline DSP: FIR design and application, decimation planning,
//! raw IQ conversion and mixing, spectrum analysis and the scheduler that
//! fans samples out to consumers.

pub mod convert;
pub mod decimation;
pub mod design;
pub mod error;
pub mod fir;
pub mod scheduler;
pub mod spectrum;

pub use convert::IqConverter;
pub use decimation::{Decimation, Factorization};
pub use error::{ConvergenceError, DspError, DspResult};
pub use fir::{Filter, FilterChain};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, SchedulerStats};
pub use spectrum::{SpectrumAnalyzer, SpectrumFrame};
