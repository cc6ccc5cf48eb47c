//! Real per-frequency transfer coefficients.

use serde::Serialize;

use crate::error::{Result, TodError};
use crate::spectrum::FrequencySpectrum;

/// One real coefficient per half-spectrum bin.
///
/// Real coefficients scale magnitude and leave phase untouched, so a real
/// response applied to a Hermitian half spectrum keeps DC and Nyquist real.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterResponse {
    coefficients: Vec<f64>,
}

impl FilterResponse {
    pub fn new(coefficients: Vec<f64>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(TodError::Input("empty filter response".into()));
        }
        if let Some((k, h)) = coefficients.iter().enumerate().find(|(_, h)| !h.is_finite()) {
            return Err(TodError::NumericalInstability(format!(
                "filter coefficient {h} at bin {k} is not finite"
            )));
        }
        Ok(Self { coefficients })
    }

    /// All-pass response for a spectrum with `len` bins.
    pub fn identity(len: usize) -> Result<Self> {
        Self::new(vec![1.0; len])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Mean coefficient over `range`, e.g. the filtered (non-DC) bins.
    pub fn mean_over(&self, range: std::ops::Range<usize>) -> f64 {
        let slice = &self.coefficients[range];
        if slice.is_empty() {
            return 1.0;
        }
        slice.iter().sum::<f64>() / slice.len() as f64
    }

    /// Scale every bin of `spectrum` by its coefficient.
    pub fn apply(&self, spectrum: &FrequencySpectrum) -> Result<FrequencySpectrum> {
        if self.len() != spectrum.len() {
            return Err(TodError::Input(format!(
                "response has {} coefficients, spectrum has {} bins",
                self.len(),
                spectrum.len()
            )));
        }
        let bins = spectrum
            .bins()
            .iter()
            .zip(&self.coefficients)
            .map(|(&x, &h)| x * h)
            .collect();
        spectrum.with_bins(bins)
    }
}
