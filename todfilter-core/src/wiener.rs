//! Wiener filtering against a fitted 1/f noise floor.
//!
//! The top `1 − cutoff_fraction` of positive frequencies is assumed to be
//! noise only. A pure power law N(f) = c/f fitted there is extrapolated
//! over the whole band, the signal power is estimated as
//! S(f) = max(0, P(f) − N(f)), and every positive-frequency bin is scaled by
//!
//! ```text
//! H(f) = S(f) / (S(f) + N(f) + ε)  ∈ [0, 1)
//! ```
//!
//! The negative half of the spectrum is the conjugate mirror of the filtered
//! positive half, so the inverse is real. DC and Nyquist pass through.

use serde::{Deserialize, Serialize};

use crate::diagnostics::SeriesSummary;
use crate::error::{Result, TodError};
use crate::fit::{FitConfig, FitDiagnostics, Observations, fit_noise_model};
use crate::model::{NoiseModel, NoiseModelKind};
use crate::reconstruct::{ReconstructConfig, reconstruct_full};
use crate::response::FilterResponse;
use crate::series::TimeSeries;
use crate::spectrum::{FrequencySpectrum, forward};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WienerConfig {
    /// Fraction of positive frequencies below the noise-fit tail, in (0, 1).
    pub cutoff_fraction: f64,
    /// Sample rate for the frequency axis. 1.0 gives cycles/sample, in
    /// which unit `c` is then reported.
    pub sample_rate: f64,
    /// Guard added to the gain denominator.
    pub epsilon: f64,
    /// Starting c; derived from the tail when `None`.
    pub initial_guess: Option<f64>,
    pub fit: FitConfig,
    pub reconstruct: ReconstructConfig,
}

impl Default for WienerConfig {
    fn default() -> Self {
        Self {
            cutoff_fraction: 0.8,
            sample_rate: 1.0,
            epsilon: 1e-12,
            initial_guess: None,
            fit: FitConfig::default(),
            reconstruct: ReconstructConfig::default(),
        }
    }
}

/// Filtered half spectrum plus the per-frequency estimates behind it.
#[derive(Clone, Debug)]
pub struct WienerSpectrum {
    pub spectrum: FrequencySpectrum,
    /// Fitted 1/f amplitude.
    pub c: f64,
    /// Gain per half-spectrum bin (DC and Nyquist = 1).
    pub gain: FilterResponse,
    /// N(f) on the positive frequencies, aligned with `positive_freqs`.
    pub noise_power: Vec<f64>,
    /// S(f) on the positive frequencies.
    pub signal_power: Vec<f64>,
    pub positive_freqs: Vec<f64>,
    pub fit_range: (f64, f64),
    pub fit: FitDiagnostics,
}

#[derive(Clone, Debug, Serialize)]
pub struct WienerDiagnostics {
    pub gain: FilterResponse,
    pub positive_freqs: Vec<f64>,
    pub noise_power: Vec<f64>,
    pub signal_power: Vec<f64>,
    pub fit_range: (f64, f64),
    pub fit: FitDiagnostics,
    pub output: SeriesSummary,
}

#[derive(Clone, Debug, Serialize)]
pub struct WienerResult {
    pub filtered: Vec<f64>,
    pub c: f64,
    pub diagnostics: WienerDiagnostics,
}

/// Soft gain for one frequency; `None` when the denominator is unusable.
#[inline]
pub fn wiener_gain(signal_power: f64, noise_power: f64, epsilon: f64) -> Option<f64> {
    let denom = signal_power + noise_power + epsilon;
    (denom.is_finite() && denom > 0.0).then(|| signal_power / denom)
}

/// Fit the noise floor on the spectrum's tail and apply the gain.
pub fn apply_wiener(spectrum: &FrequencySpectrum, cfg: &WienerConfig) -> Result<WienerSpectrum> {
    if !(cfg.cutoff_fraction > 0.0 && cfg.cutoff_fraction < 1.0) {
        return Err(TodError::Input(format!(
            "cutoff_fraction must lie in (0, 1) (got {})",
            cfg.cutoff_fraction
        )));
    }
    if !cfg.epsilon.is_finite() || cfg.epsilon < 0.0 {
        return Err(TodError::Input(format!(
            "epsilon must be finite and >= 0 (got {})",
            cfg.epsilon
        )));
    }

    let positive = spectrum.positive_indices();
    let count = positive.len();
    if count == 0 {
        return Err(TodError::DegenerateSpectrum(format!(
            "{} samples leave no positive frequencies to filter",
            spectrum.sample_count()
        )));
    }
    let freqs = &spectrum.freqs()[positive.clone()];
    let power: Vec<f64> = spectrum.bins()[positive.clone()]
        .iter()
        .map(|x| x.norm_sqr())
        .collect();

    let cutoff = (cfg.cutoff_fraction * count as f64).floor() as usize;
    let obs = Observations::new(&freqs[cutoff..], &power[cutoff..])
        .with_reference_scale(spectrum.energy());
    let guess = cfg.initial_guess.map(|c| [c]);
    let fitted = fit_noise_model(
        &obs,
        NoiseModelKind::PurePinkLaw,
        guess.as_ref().map(|g| g.as_slice()),
        &cfg.fit,
    )?;
    let NoiseModel::PurePinkLaw { c } = fitted.model else {
        return Err(TodError::Input(format!(
            "expected a PurePinkLaw fit, got {:?}",
            fitted.model.kind()
        )));
    };
    if !(c > 0.0) {
        return Err(TodError::DegenerateSpectrum(format!(
            "fitted 1/f amplitude c = {c} is not positive"
        )));
    }
    log::debug!(
        "wiener: c={c:.4e} from {} tail bins (cutoff index {cutoff} of {count})",
        count - cutoff
    );

    let mut gains = vec![1.0f64; spectrum.len()];
    let mut noise_power = Vec::with_capacity(count);
    let mut signal_power = Vec::with_capacity(count);
    for ((k, &f), &p) in positive.clone().zip(freqs).zip(&power) {
        let n_f = fitted.model.evaluate(f);
        let s_f = (p - n_f).max(0.0);
        gains[k] = wiener_gain(s_f, n_f, cfg.epsilon).ok_or_else(|| {
            TodError::NumericalInstability(format!(
                "gain denominator at {f} Hz is unusable (S={s_f:.3e}, N={n_f:.3e})"
            ))
        })?;
        noise_power.push(n_f);
        signal_power.push(s_f);
    }

    let gain = FilterResponse::new(gains)?;
    let filtered = gain.apply(spectrum)?;
    Ok(WienerSpectrum {
        spectrum: filtered,
        c,
        gain,
        noise_power,
        signal_power,
        positive_freqs: freqs.to_vec(),
        fit_range: fitted.freq_range,
        fit: fitted.diagnostics,
    })
}

/// Wiener-filter `samples`.
pub fn wiener_filter(samples: &[f64], cfg: &WienerConfig) -> Result<WienerResult> {
    let series = TimeSeries::new(samples, cfg.sample_rate)?;
    let spectrum = forward(&series)?;
    let ws = apply_wiener(&spectrum, cfg)?;

    // Filtered positive half plus its conjugate mirror.
    let full = ws.spectrum.to_full();
    let filtered = reconstruct_full(&full, &cfg.reconstruct)?;
    let output = SeriesSummary::of(&filtered);
    let positive = spectrum.positive_indices();
    log::info!(
        "wiener-filtered {} samples: c={:.3e}, mean gain {:.3}",
        filtered.len(),
        ws.c,
        ws.gain.mean_over(positive)
    );

    Ok(WienerResult {
        filtered,
        c: ws.c,
        diagnostics: WienerDiagnostics {
            gain: ws.gain,
            positive_freqs: ws.positive_freqs,
            noise_power: ws.noise_power,
            signal_power: ws.signal_power,
            fit_range: ws.fit_range,
            fit: ws.fit,
            output,
        },
    })
}
