//! Real-input forward transform and half-spectrum bookkeeping.
//!
//! A series of N real samples is described completely by its ⌊N/2⌋+1
//! non-negative-frequency coefficients (Hermitian symmetry). Bin 0 is DC;
//! when N is even the last bin is the Nyquist coefficient, which has no
//! distinct negative-frequency partner.
//!
//! The transform is unnormalized: `forward` followed by an inverse that
//! scales by 1/N returns the input.

use std::ops::Range;

use realfft::RealFftPlanner;
use realfft::num_complex::Complex64;

use crate::error::{Result, TodError};
use crate::series::TimeSeries;

/// Half spectrum of a real series of `n` samples taken at `sample_rate` Hz.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencySpectrum {
    n: usize,
    sample_rate: f64,
    freqs: Vec<f64>,
    bins: Vec<Complex64>,
}

/// Number of half-spectrum bins for a real series of length `n`.
#[inline]
pub fn half_len(n: usize) -> usize {
    n / 2 + 1
}

/// Forward real-to-complex transform of a validated series.
pub fn forward(series: &TimeSeries<'_>) -> Result<FrequencySpectrum> {
    let n = series.len();
    let samples = series.samples();

    let mut bins = if n == 1 {
        vec![Complex64::new(samples[0], 0.0)]
    } else {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(n);
        let mut in_buf = r2c.make_input_vec();
        in_buf.copy_from_slice(samples);
        let mut spec_buf = r2c.make_output_vec();
        r2c.process(&mut in_buf, &mut spec_buf)
            .map_err(|e| TodError::NumericalInstability(format!("forward FFT error: {e}")))?;
        spec_buf
    };

    // DC (and Nyquist for even n) are real for real input; anything else is rounding.
    bins[0].im = 0.0;
    if n % 2 == 0 {
        bins[n / 2].im = 0.0;
    }

    log::trace!("forward transform: n={n}, bins={}", bins.len());
    FrequencySpectrum::from_parts(n, series.sample_rate(), bins)
}

impl FrequencySpectrum {
    /// Build a spectrum from explicit half-spectrum coefficients.
    pub fn from_parts(n: usize, sample_rate: f64, bins: Vec<Complex64>) -> Result<Self> {
        if n == 0 {
            return Err(TodError::Input("spectrum of an empty series".into()));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(TodError::Input(format!(
                "sample_rate must be finite and > 0 (got {sample_rate})"
            )));
        }
        if bins.len() != half_len(n) {
            return Err(TodError::Input(format!(
                "half spectrum for {n} samples needs {} bins, got {}",
                half_len(n),
                bins.len()
            )));
        }
        if bins.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
            return Err(TodError::Input("non-finite spectral coefficient".into()));
        }
        let df = sample_rate / n as f64;
        let freqs = (0..bins.len()).map(|k| k as f64 * df).collect();
        Ok(Self {
            n,
            sample_rate,
            freqs,
            bins,
        })
    }

    /// Same geometry, new coefficients.
    pub fn with_bins(&self, bins: Vec<Complex64>) -> Result<Self> {
        Self::from_parts(self.n, self.sample_rate, bins)
    }

    /// Length N of the time series this spectrum describes.
    pub fn sample_count(&self) -> usize {
        self.n
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Frequency spacing fs/N in Hz.
    pub fn resolution(&self) -> f64 {
        self.sample_rate / self.n as f64
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn bins(&self) -> &[Complex64] {
        &self.bins
    }

    pub fn dc(&self) -> Complex64 {
        self.bins[0]
    }

    /// Index of the Nyquist bin; only present for even N.
    pub fn nyquist_index(&self) -> Option<usize> {
        (self.n % 2 == 0).then_some(self.n / 2)
    }

    pub fn magnitudes(&self) -> Vec<f64> {
        self.bins.iter().map(|c| c.norm()).collect()
    }

    pub fn phases(&self) -> Vec<f64> {
        self.bins.iter().map(|c| c.arg()).collect()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.bins.iter().map(|c| c.norm_sqr()).collect()
    }

    /// Mean power over all N coefficients, Σ|X_k|²/N, which equals Σx²
    /// of the source series. A DC offset enters as offset²·N.
    pub fn energy(&self) -> f64 {
        let positive = self.positive_indices();
        let total: f64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let weight = if positive.contains(&k) { 2.0 } else { 1.0 };
                weight * c.norm_sqr()
            })
            .sum();
        total / self.n as f64
    }

    /// Frequencies used for model fitting: everything except DC.
    pub fn working_freqs(&self) -> &[f64] {
        &self.freqs[1..]
    }

    /// Magnitudes aligned with [`Self::working_freqs`].
    pub fn working_magnitudes(&self) -> Vec<f64> {
        self.bins[1..].iter().map(|c| c.norm()).collect()
    }

    /// Strictly positive frequencies that have a distinct negative partner:
    /// DC and Nyquist excluded.
    pub fn positive_indices(&self) -> Range<usize> {
        let end = if self.n % 2 == 0 {
            self.n / 2
        } else {
            self.bins.len()
        };
        1..end.max(1)
    }

    /// All N coefficients, with the negative half mirrored as X[N-k] = conj(X[k]).
    pub fn to_full(&self) -> Vec<Complex64> {
        let n = self.n;
        let mut full = vec![Complex64::new(0.0, 0.0); n];
        full[..self.bins.len()].copy_from_slice(&self.bins);
        for k in 1..self.bins.len() {
            if n - k != k {
                full[n - k] = self.bins[k].conj();
            }
        }
        full
    }
}
