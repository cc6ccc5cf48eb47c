//! Whitening: flatten the noise floor of a white + 1/f spectrum.
//!
//! Fit M(f) = sqrt(a + b/f) to the magnitude spectrum (raw or log-binned),
//! then rescale every non-DC bin to
//!
//! ```text
//! quotient(f) = sqrt(a) · |X(f)| / M(f),   X'(f) = quotient(f) · e^{i·arg X(f)}
//! ```
//!
//! so the output noise sits at the white floor sqrt(a) at all frequencies
//! and phases are untouched. DC is copied verbatim (the model has a pole at
//! f = 0). The Nyquist bin of an even-length series gets the same quotient
//! written back as a real number with the sign of the original coefficient.

use realfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::binning::{BinnedSpectrum, bin_log_spectrum};
use crate::diagnostics::SeriesSummary;
use crate::error::{Result, TodError};
use crate::fit::{FitConfig, FitDiagnostics, Observations, fit_noise_model};
use crate::model::{NoiseModel, NoiseModelKind};
use crate::reconstruct::{ReconstructConfig, reconstruct};
use crate::response::FilterResponse;
use crate::series::TimeSeries;
use crate::spectrum::{FrequencySpectrum, forward};

/// Level the whitened noise floor is normalized to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhiteningScale {
    /// Keep physical units: the floor sits at sqrt(a).
    #[default]
    NoiseFloor,
    /// Dimensionless quotient |X| / M(f); the floor sits at 1.
    Unit,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitenConfig {
    /// Fit on `bin_count` log-frequency centroids when set, on every
    /// non-DC bin otherwise.
    pub bin_count: Option<usize>,
    /// Starting (a, b); derived from the data when `None`.
    pub initial_guess: Option<[f64; 2]>,
    pub scale: WhiteningScale,
    pub fit: FitConfig,
    pub reconstruct: ReconstructConfig,
}

/// Everything `whiten` learned along the way.
#[derive(Clone, Debug, Serialize)]
pub struct WhitenDiagnostics {
    /// Frequencies the model was fit on (centroids when binned).
    pub fit_freqs: Vec<f64>,
    /// Magnitudes the model was fit on.
    pub fit_magnitudes: Vec<f64>,
    /// Model M(f) at `fit_freqs`.
    pub model_magnitudes: Vec<f64>,
    /// Present when fitting used log binning.
    pub binned: Option<BinnedSpectrum>,
    /// Closed frequency interval of the fit (Hz).
    pub fit_range: (f64, f64),
    pub fit: FitDiagnostics,
    /// Per-bin real gain actually applied (DC = 1).
    pub response: FilterResponse,
    pub output: SeriesSummary,
}

#[derive(Clone, Debug, Serialize)]
pub struct WhitenResult {
    pub filtered: Vec<f64>,
    pub a: f64,
    pub b: f64,
    pub diagnostics: WhitenDiagnostics,
}

/// Quotient for one bin of observed magnitude `m` at frequency `f`.
///
/// When `m` equals M(f) exactly the result is exactly the floor level.
pub fn whitening_quotient(
    model: &NoiseModel,
    f: f64,
    m: f64,
    scale: WhiteningScale,
) -> Result<f64> {
    let floor = floor_level(model, scale)?;
    let fitted = model.evaluate(f);
    if !fitted.is_finite() || fitted <= 0.0 {
        return Err(TodError::NumericalInstability(format!(
            "noise model amplitude {fitted} at {f} Hz cannot be divided by"
        )));
    }
    Ok(floor * (m / fitted))
}

fn floor_level(model: &NoiseModel, scale: WhiteningScale) -> Result<f64> {
    let NoiseModel::WhitePlusPink { a, .. } = *model else {
        return Err(TodError::Input(format!(
            "whitening needs a WhitePlusPink model, got {:?}",
            model.kind()
        )));
    };
    if !a.is_finite() || a <= 0.0 {
        return Err(TodError::DegenerateSpectrum(format!(
            "fitted white-noise level a = {a} is not positive"
        )));
    }
    Ok(match scale {
        WhiteningScale::NoiseFloor => a.sqrt(),
        WhiteningScale::Unit => 1.0,
    })
}

/// Whiten an (unbinned) spectrum with a fitted `WhitePlusPink` model.
///
/// Returns the modified spectrum and the equivalent real response.
pub fn apply_whitening(
    spectrum: &FrequencySpectrum,
    model: &NoiseModel,
    scale: WhiteningScale,
) -> Result<(FrequencySpectrum, FilterResponse)> {
    let floor = floor_level(model, scale)?;
    let nyquist = spectrum.nyquist_index();
    let freqs = spectrum.freqs();

    let mut bins = Vec::with_capacity(spectrum.len());
    let mut gains = Vec::with_capacity(spectrum.len());
    bins.push(spectrum.dc());
    gains.push(1.0);

    for (k, x) in spectrum.bins().iter().enumerate().skip(1) {
        let f = freqs[k];
        let q = whitening_quotient(model, f, x.norm(), scale)?;
        let out = if Some(k) == nyquist {
            Complex64::new(if x.re < 0.0 { -q } else { q }, 0.0)
        } else {
            Complex64::from_polar(q, x.arg())
        };
        bins.push(out);
        gains.push(floor / model.evaluate(f));
    }

    Ok((spectrum.with_bins(bins)?, FilterResponse::new(gains)?))
}

/// Whiten `samples` taken at `sample_rate` Hz.
pub fn whiten(samples: &[f64], sample_rate: f64, cfg: &WhitenConfig) -> Result<WhitenResult> {
    let series = TimeSeries::new(samples, sample_rate)?;
    let spectrum = forward(&series)?;

    let working_freqs = spectrum.working_freqs();
    let working_mags = spectrum.working_magnitudes();
    let binned = match cfg.bin_count {
        Some(bins) => Some(bin_log_spectrum(working_freqs, &working_mags, bins)?),
        None => None,
    };
    let (fit_freqs, fit_magnitudes) = match &binned {
        Some(b) => (b.freqs.clone(), b.magnitudes.clone()),
        None => (working_freqs.to_vec(), working_mags),
    };

    // rms bin magnitude, not the DC peak.
    let obs = Observations::new(&fit_freqs, &fit_magnitudes)
        .with_reference_scale(spectrum.energy().sqrt());
    let fitted = fit_noise_model(
        &obs,
        NoiseModelKind::WhitePlusPink,
        cfg.initial_guess.as_ref().map(|g| g.as_slice()),
        &cfg.fit,
    )?;
    let NoiseModel::WhitePlusPink { a, b } = fitted.model else {
        return Err(TodError::Input(format!(
            "expected a WhitePlusPink fit, got {:?}",
            fitted.model.kind()
        )));
    };
    log::debug!(
        "whiten: fitted a={a:.4e}, b={b:.4e} on {} points ({})",
        fit_freqs.len(),
        if binned.is_some() { "binned" } else { "raw" }
    );

    let (whitened, response) = apply_whitening(&spectrum, &fitted.model, cfg.scale)?;
    let filtered = reconstruct(&whitened, series.len(), &cfg.reconstruct)?;
    let output = SeriesSummary::of(&filtered);
    log::info!(
        "whitened {} samples: a={a:.3e}, b={b:.3e}, output mean {:.3e}, std {:.3e}",
        filtered.len(),
        output.mean,
        output.std
    );

    let model_magnitudes = fit_freqs.iter().map(|&f| fitted.model.evaluate(f)).collect();
    Ok(WhitenResult {
        filtered,
        a,
        b,
        diagnostics: WhitenDiagnostics {
            fit_freqs,
            fit_magnitudes,
            model_magnitudes,
            binned,
            fit_range: fitted.freq_range,
            fit: fitted.diagnostics,
            response,
            output,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    use super::*;

    /// Series whose spectrum magnitudes are exactly sqrt(a + b/f) with random phases.
    fn series_with_model_spectrum(n: usize, fs: f64, a: f64, b: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let df = fs / n as f64;
        let mut bins: Vec<Complex64> = (0..n / 2 + 1)
            .map(|k| {
                if k == 0 {
                    return Complex64::new(0.0, 0.0);
                }
                let m = (a + b / (k as f64 * df)).sqrt();
                Complex64::from_polar(m, rng.random_range(-PI..PI))
            })
            .collect();
        if n % 2 == 0 {
            let last = bins.len() - 1;
            bins[last] = Complex64::new(bins[last].norm(), 0.0);
        }
        let s = FrequencySpectrum::from_parts(n, fs, bins).unwrap();
        reconstruct(&s, n, &ReconstructConfig::default()).unwrap()
    }

    fn white_noise(n: usize, variance: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, variance.sqrt()).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn quotient_equals_floor_where_data_matches_model() {
        let model = NoiseModel::WhitePlusPink { a: 2.0, b: 7.5 };
        for f in [0.1, 1.0, 3.7, 250.0] {
            let m = model.evaluate(f);
            assert_eq!(
                whitening_quotient(&model, f, m, WhiteningScale::NoiseFloor).unwrap(),
                2.0f64.sqrt()
            );
            assert_eq!(whitening_quotient(&model, f, m, WhiteningScale::Unit).unwrap(), 1.0);
        }
    }

    #[test]
    fn quotient_rejects_wrong_model_and_bad_floor() {
        let pink = NoiseModel::PurePinkLaw { c: 1.0 };
        assert!(matches!(
            whitening_quotient(&pink, 1.0, 1.0, WhiteningScale::NoiseFloor),
            Err(TodError::Input(_))
        ));
        let negative = NoiseModel::WhitePlusPink { a: -1.0, b: 5.0 };
        assert!(matches!(
            whitening_quotient(&negative, 1.0, 1.0, WhiteningScale::NoiseFloor),
            Err(TodError::DegenerateSpectrum(_))
        ));
        let pole = NoiseModel::WhitePlusPink { a: 1.0, b: -2.0 };
        assert!(matches!(
            whitening_quotient(&pole, 1.0, 1.0, WhiteningScale::NoiseFloor),
            Err(TodError::NumericalInstability(_))
        ));
    }

    #[test]
    fn dc_bit_identical_phase_kept_nyquist_real() {
        let xs: Vec<f64> = (0..64).map(|i| 3.0 + ((i * 13 % 7) as f64) * 0.7).collect();
        let s = forward(&TimeSeries::new(&xs, 100.0).unwrap()).unwrap();
        let model = NoiseModel::WhitePlusPink { a: 1.3, b: 4.0 };
        let (w, response) = apply_whitening(&s, &model, WhiteningScale::NoiseFloor).unwrap();

        assert_eq!(w.dc().re.to_bits(), s.dc().re.to_bits());
        assert_eq!(w.dc().im.to_bits(), s.dc().im.to_bits());
        assert_eq!(response.coefficients()[0], 1.0);

        let ny = s.nyquist_index().unwrap();
        assert_eq!(w.bins()[ny].im, 0.0);
        assert_eq!(w.bins()[ny].re.signum(), s.bins()[ny].re.signum());

        for k in 1..ny {
            if s.bins()[k].norm() > 1e-9 {
                let d = (w.bins()[k].arg() - s.bins()[k].arg()).abs();
                assert!(d < 1e-9 || (d - 2.0 * PI).abs() < 1e-9, "phase moved at bin {k}");
            }
        }
    }

    #[test]
    fn odd_length_has_no_nyquist_special_case() {
        let xs: Vec<f64> = (0..63).map(|i| ((i * 29 % 17) as f64) - 8.0).collect();
        let s = forward(&TimeSeries::new(&xs, 1.0).unwrap()).unwrap();
        assert_eq!(s.nyquist_index(), None);
        let model = NoiseModel::WhitePlusPink { a: 2.0, b: 0.1 };
        let (w, _) = apply_whitening(&s, &model, WhiteningScale::NoiseFloor).unwrap();
        let last = s.len() - 1;
        let (f, m) = (s.freqs()[last], s.bins()[last].norm());
        let q = whitening_quotient(&model, f, m, WhiteningScale::NoiseFloor).unwrap();
        let expected = Complex64::from_polar(q, s.bins()[last].arg());
        assert!((w.bins()[last] - expected).norm() < 1e-12);
        let out = reconstruct(&w, 63, &ReconstructConfig::default()).unwrap();
        assert_eq!(out.len(), 63);
    }

    #[test]
    fn exact_model_spectrum_is_recovered_and_flattened() {
        let (n, fs, a, b) = (4096, 1000.0, 4.0, 40.0);
        let xs = series_with_model_spectrum(n, fs, a, b, 7);
        let res = whiten(&xs, fs, &WhitenConfig::default()).unwrap();
        assert!((res.a - a).abs() < 1e-6 * a, "a = {}", res.a);
        assert!((res.b - b).abs() < 1e-6 * b, "b = {}", res.b);
        assert_eq!(res.filtered.len(), n);

        let out = forward(&TimeSeries::new(&res.filtered, fs).unwrap()).unwrap();
        for m in out.working_magnitudes() {
            assert!((m - a.sqrt()).abs() < 1e-6, "whitened magnitude {m}");
        }
    }

    #[test]
    fn binned_fit_tracks_model_spectrum() {
        let (n, fs, a, b) = (4096, 1000.0, 4.0, 40.0);
        let xs = series_with_model_spectrum(n, fs, a, b, 11);
        let cfg = WhitenConfig {
            bin_count: Some(20),
            ..Default::default()
        };
        let res = whiten(&xs, fs, &cfg).unwrap();
        assert!((res.a - a).abs() < 0.1 * a, "a = {}", res.a);
        assert!((res.b - b).abs() < 0.1 * b, "b = {}", res.b);
        let binned = res.diagnostics.binned.as_ref().unwrap();
        assert!(binned.len() <= 20);
        assert_eq!(res.diagnostics.fit_freqs, binned.freqs);
    }

    #[test]
    fn white_noise_gives_flat_model() {
        let (n, fs, variance) = (4096, 1000.0, 2.0);
        let xs = white_noise(n, variance, 2024);
        let res = whiten(&xs, fs, &WhitenConfig::default()).unwrap();
        // Least squares on Rayleigh |X| (E|X|² = N·σ²) converges to
        // (E|X|)² = π/4 · N · σ².
        let expected_a = PI / 4.0 * n as f64 * variance;
        assert!((res.a / expected_a - 1.0).abs() < 0.1, "a = {} vs {expected_a}", res.a);
        // 1/f term below 10% of the white floor from 10 Hz up.
        assert!(res.b.abs() / 10.0 < 0.1 * res.a, "b = {}", res.b);
        assert_eq!(res.filtered.len(), n);
    }

    #[test]
    fn large_dc_offset_does_not_mask_the_noise() {
        let (n, fs, variance) = (4096, 1000.0, 2.0);
        let noise = white_noise(n, variance, 2024);
        let offset = 1e8;
        let xs: Vec<f64> = noise.iter().map(|x| x + offset).collect();

        let plain = whiten(&noise, fs, &WhitenConfig::default()).unwrap();
        let res = whiten(&xs, fs, &WhitenConfig::default()).unwrap();
        // Only DC differs, so the fit matches the offset-free one.
        assert!((res.a / plain.a - 1.0).abs() < 1e-4, "a = {} vs {}", res.a, plain.a);
        assert!((res.b - plain.b).abs() < 1e-3 * plain.a, "b = {} vs {}", res.b, plain.b);
        // DC passes through, so the mean survives.
        let mean_in = xs.iter().sum::<f64>() / n as f64;
        assert!((res.diagnostics.output.mean / mean_in - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unit_scale_output_is_dimensionless() {
        let (n, fs) = (2048, 100.0);
        let xs = series_with_model_spectrum(n, fs, 9.0, 3.0, 3);
        let cfg = WhitenConfig {
            scale: WhiteningScale::Unit,
            ..Default::default()
        };
        let res = whiten(&xs, fs, &cfg).unwrap();
        let out = forward(&TimeSeries::new(&res.filtered, fs).unwrap()).unwrap();
        for m in out.working_magnitudes() {
            assert!((m - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn constant_signal_is_degenerate() {
        let xs = vec![5.0; 1000];
        assert!(matches!(
            whiten(&xs, 1000.0, &WhitenConfig::default()),
            Err(TodError::DegenerateSpectrum(_))
        ));
        let binned = WhitenConfig {
            bin_count: Some(50),
            ..Default::default()
        };
        assert!(matches!(whiten(&xs, 1000.0, &binned), Err(TodError::DegenerateSpectrum(_))));
    }

    #[test]
    fn rejects_bad_input() {
        let cfg = WhitenConfig::default();
        assert!(matches!(whiten(&[], 1000.0, &cfg), Err(TodError::Input(_))));
        assert!(matches!(whiten(&[1.0, f64::NAN], 1000.0, &cfg), Err(TodError::Input(_))));
        assert!(matches!(whiten(&[1.0, 2.0, 3.0], 0.0, &cfg), Err(TodError::Input(_))));
        let bad_guess = WhitenConfig {
            initial_guess: Some([0.0, 1.0]),
            ..Default::default()
        };
        let xs = white_noise(256, 1.0, 1);
        assert!(matches!(whiten(&xs, 10.0, &bad_guess), Err(TodError::Input(_))));
    }

    #[test]
    fn original_unit_guess_still_converges() {
        let xs = series_with_model_spectrum(1024, 50.0, 16.0, 8.0, 5);
        let cfg = WhitenConfig {
            initial_guess: Some([1.0, 1.0]),
            ..Default::default()
        };
        let res = whiten(&xs, 50.0, &cfg).unwrap();
        assert!((res.a - 16.0).abs() < 1e-5);
        assert!((res.b - 8.0).abs() < 1e-5);
    }
}
