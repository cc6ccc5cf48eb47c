//! Logarithmic-frequency aggregation of a spectrum.
//!
//! FFT bins are linearly spaced, so a raw fit is dominated by the upper
//! decades. Averaging inside equal-width log10 intervals gives every
//! populated interval one centroid of equal weight, and averages down the
//! per-bin variance of the periodogram at high frequency.

use serde::Serialize;

use crate::error::{Result, TodError};

/// Centroids of a log-binned spectrum. Empty intervals are omitted.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BinnedSpectrum {
    /// Mean member frequency per populated interval (Hz), strictly increasing.
    pub freqs: Vec<f64>,
    /// Mean member magnitude per populated interval.
    pub magnitudes: Vec<f64>,
    /// Number of spectral bins behind each centroid.
    pub counts: Vec<usize>,
    /// The `bin_count + 1` log10(frequency) interval edges.
    pub log10_edges: Vec<f64>,
}

impl BinnedSpectrum {
    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }
}

/// Bin `(freqs, magnitudes)` into `bin_count` equal log10 intervals spanning
/// [min log10 f, max log10 f]. DC must already be excluded.
pub fn bin_log_spectrum(
    freqs: &[f64],
    magnitudes: &[f64],
    bin_count: usize,
) -> Result<BinnedSpectrum> {
    if bin_count == 0 {
        return Err(TodError::Input("bin_count must be >= 1".into()));
    }
    if freqs.len() != magnitudes.len() {
        return Err(TodError::Input(format!(
            "frequency/magnitude length mismatch: {} vs {}",
            freqs.len(),
            magnitudes.len()
        )));
    }
    if freqs.is_empty() {
        return Err(TodError::Input("nothing to bin (empty working set)".into()));
    }
    if let Some(f) = freqs.iter().find(|f| !f.is_finite() || **f <= 0.0) {
        return Err(TodError::Input(format!(
            "log binning needs finite positive frequencies (got {f}); exclude DC first"
        )));
    }

    let log_f: Vec<f64> = freqs.iter().map(|f| f.log10()).collect();
    let lo = log_f.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = log_f.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / bin_count as f64;
    let log10_edges: Vec<f64> = (0..=bin_count).map(|i| lo + i as f64 * width).collect();

    let mut f_sum = vec![0.0f64; bin_count];
    let mut m_sum = vec![0.0f64; bin_count];
    let mut counts = vec![0usize; bin_count];
    for ((&lf, &f), &m) in log_f.iter().zip(freqs).zip(magnitudes) {
        let idx = if width > 0.0 {
            (((lf - lo) / width) as usize).min(bin_count - 1)
        } else {
            0
        };
        f_sum[idx] += f;
        m_sum[idx] += m;
        counts[idx] += 1;
    }

    let mut out = BinnedSpectrum {
        log10_edges,
        ..Default::default()
    };
    for i in 0..bin_count {
        if counts[i] == 0 {
            continue;
        }
        let c = counts[i] as f64;
        out.freqs.push(f_sum[i] / c);
        out.magnitudes.push(m_sum[i] / c);
        out.counts.push(counts[i]);
    }

    log::debug!(
        "log binning: {} points -> {} of {} intervals populated",
        freqs.len(),
        out.len(),
        bin_count
    );
    Ok(out)
}
