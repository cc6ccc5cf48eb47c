//! Validated time-ordered input.
//!
//! The engine only ever borrows the caller's samples; nothing here copies or
//! retains them beyond the lifetime of one pipeline call.

use crate::error::{Result, TodError};

/// An evenly-sampled, single-channel series of finite samples.
#[derive(Clone, Copy, Debug)]
pub struct TimeSeries<'a> {
    samples: &'a [f64],
    sample_rate: f64,
}

impl<'a> TimeSeries<'a> {
    /// Rejects empty input, non-finite samples and a non-positive sample rate.
    pub fn new(samples: &'a [f64], sample_rate: f64) -> Result<Self> {
        if samples.is_empty() {
            return Err(TodError::Input("empty series".into()));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(TodError::Input(format!(
                "sample_rate must be finite and > 0 (got {sample_rate})"
            )));
        }
        if let Some((idx, x)) = samples.iter().enumerate().find(|(_, x)| !x.is_finite()) {
            return Err(TodError::Input(format!("non-finite sample {x} at index {idx}")));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &'a [f64] {
        self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed series; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total duration in seconds.
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }
}
