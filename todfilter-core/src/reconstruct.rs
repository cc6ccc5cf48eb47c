//! Inverse transform back to the time domain.
//!
//! The half spectrum is mirrored into all N coefficients and inverted with a
//! full complex FFT. For a correctly built Hermitian spectrum the imaginary
//! part of the result is rounding noise; anything larger means DC or
//! Nyquist picked up an imaginary component, or the mirror was built
//! wrong, and is reported instead of being dropped.

use rustfft::FftPlanner;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::common::max_abs;
use crate::error::{Result, TodError};
use crate::spectrum::{FrequencySpectrum, half_len};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructConfig {
    /// Largest accepted max|Im| relative to max|Re| of the inverse.
    pub imag_tolerance: f64,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            imag_tolerance: 1e-9,
        }
    }
}

/// Invert a half spectrum into `n` real samples.
///
/// `n` is required because ⌊N/2⌋+1 bins fit both N = 2k and N = 2k+1.
pub fn reconstruct(
    spectrum: &FrequencySpectrum,
    n: usize,
    cfg: &ReconstructConfig,
) -> Result<Vec<f64>> {
    if n == 0 {
        return Err(TodError::Input("cannot reconstruct zero samples".into()));
    }
    if spectrum.len() != half_len(n) {
        return Err(TodError::Input(format!(
            "half spectrum of {} bins cannot describe {n} samples",
            spectrum.len()
        )));
    }
    if spectrum.sample_count() != n {
        return Err(TodError::Input(format!(
            "spectrum was built for {} samples, asked for {n}",
            spectrum.sample_count()
        )));
    }
    reconstruct_full(&spectrum.to_full(), cfg)
}

/// Invert an explicit N-point spectrum, checking it was Hermitian.
pub fn reconstruct_full(full: &[Complex64], cfg: &ReconstructConfig) -> Result<Vec<f64>> {
    let n = full.len();
    if n == 0 {
        return Err(TodError::Input("cannot reconstruct zero samples".into()));
    }
    let mut buf = full.to_vec();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(n).process(&mut buf);

    let scale = 1.0 / n as f64;
    let re: Vec<f64> = buf.iter().map(|c| c.re * scale).collect();
    let residue = buf.iter().fold(0.0f64, |acc, c| acc.max((c.im * scale).abs()));
    let amplitude = max_abs(&re);
    if !residue.is_finite() || residue > cfg.imag_tolerance * amplitude.max(f64::MIN_POSITIVE) {
        return Err(TodError::NumericalInstability(format!(
            "inverse transform left imaginary residue {residue:.3e} at amplitude {amplitude:.3e}"
        )));
    }
    if re.iter().any(|x| !x.is_finite()) {
        return Err(TodError::NumericalInstability("non-finite reconstructed sample".into()));
    }
    log::trace!("reconstructed {n} samples, imaginary residue {residue:.2e}");
    Ok(re)
}
