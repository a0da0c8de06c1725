// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! FIR filter design.
//!
//! [`firdes`] implements the closed-form window method, [`optimal`] the
//! equiripple designs built on the Parks-McClellan exchange in [`remez`].

pub mod firdes;
pub mod optimal;
pub mod remez;
pub mod window;

pub use window::{WindowSpec, WindowType};

/// How a set of taps was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DesignMethod {
    Window(WindowSpec),
    Equiripple,
}

/// Parameters a tap array was designed from. Kept alongside the taps so a
/// filter can describe itself and be re-designed for another rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignParams {
    pub method: DesignMethod,
    pub sample_rate: f64,
    /// Lower cutoff or pass-band edge (Hz). Equal to `high_cutoff` for
    /// single-edge designs.
    pub low_cutoff: f64,
    pub high_cutoff: f64,
    pub transition_width: f64,
    pub attenuation_db: f64,
    /// Pass-band ripple, only meaningful for equiripple designs.
    pub ripple_db: Option<f64>,
}

impl DesignParams {
    pub fn low_pass(
        method: DesignMethod,
        sample_rate: f64,
        cutoff: f64,
        transition_width: f64,
        attenuation_db: f64,
        ripple_db: Option<f64>,
    ) -> Self {
        Self {
            method,
            sample_rate,
            low_cutoff: cutoff,
            high_cutoff: cutoff,
            transition_width,
            attenuation_db,
            ripple_db,
        }
    }
}
