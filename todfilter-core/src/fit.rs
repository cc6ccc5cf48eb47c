//! Nonlinear least-squares fit of a [`NoiseModelKind`] to spectral data.
//!
//! Levenberg–Marquardt with Marquardt's diagonal scaling:
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr,   r_i = model(f_i; p) − y_i
//! ```
//!
//! An accepted step divides λ by 10, a rejected one multiplies it by 10.
//! Trial points whose residuals are not finite (e.g. a + b/f < 0 for the
//! amplitude model) are rejected like any cost increase, which keeps the
//! iterate inside the model's domain without explicit bounds.
//!
//! Every trial step counts against `max_iterations`; running out is an
//! error, never a silent best-effort result.

use serde::{Deserialize, Serialize};

use crate::common::{invert_small, mean, solve_small, std_dev, sum_squares};
use crate::error::{Result, TodError};
use crate::model::{FittedNoiseModel, NoiseModel, NoiseModelKind};

/// Solver settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Hard cap on trial steps.
    pub max_iterations: usize,
    /// Converged when an accepted step reduces the cost by at most `ftol * cost`.
    pub ftol: f64,
    /// Converged when ‖δ‖ <= xtol * (‖p‖ + xtol).
    pub xtol: f64,
    /// Starting damping λ.
    pub initial_damping: f64,
    /// Observations are degenerate when std <= rtol * max(|mean|, reference scale).
    pub degenerate_rtol: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            ftol: 1e-10,
            xtol: 1e-10,
            initial_damping: 1e-3,
            degenerate_rtol: 1e-9,
        }
    }
}

/// (frequency, value) pairs to fit, plus an optional scale of the series
/// they came from.
#[derive(Clone, Copy, Debug)]
pub struct Observations<'a> {
    pub freqs: &'a [f64],
    pub values: &'a [f64],
    /// Scale of the source series in the units of `values`, e.g.
    /// [`FrequencySpectrum::energy`] for powers. Lets a numerically-zero
    /// off-DC spectrum register as degenerate even though its own mean is
    /// also ~0.
    ///
    /// [`FrequencySpectrum::energy`]: crate::spectrum::FrequencySpectrum::energy
    pub reference_scale: Option<f64>,
}

impl<'a> Observations<'a> {
    pub fn new(freqs: &'a [f64], values: &'a [f64]) -> Self {
        Self {
            freqs,
            values,
            reference_scale: None,
        }
    }

    pub fn with_reference_scale(mut self, scale: f64) -> Self {
        self.reference_scale = Some(scale);
        self
    }
}

/// How the fit went.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FitDiagnostics {
    /// Trial steps taken.
    pub iterations: usize,
    /// Final sum of squared residuals.
    pub cost: f64,
    /// sqrt(cost / points).
    pub rms_residual: f64,
    /// Coefficient of determination against the observations' mean.
    pub r_squared: f64,
    /// One-sigma parameter errors from s²·(JᵀJ)⁻¹; `None` when the fit has
    /// no residual degrees of freedom or JᵀJ is singular.
    pub std_errors: Option<Vec<f64>>,
    /// Number of fitted observations.
    pub points: usize,
    /// Mean of the observed values, the scale `rms_residual` is judged against.
    pub mean_observed: f64,
}

/// Fit `kind` to `obs`. `initial_guess = None` derives a start from the data.
pub fn fit_noise_model(
    obs: &Observations<'_>,
    kind: NoiseModelKind,
    initial_guess: Option<&[f64]>,
    cfg: &FitConfig,
) -> Result<FittedNoiseModel> {
    validate_observations(obs)?;
    if let Some(guess) = initial_guess {
        validate_guess(kind, guess)?;
    }
    check_degenerate(obs, kind, cfg)?;

    let freqs = obs.freqs;
    let values = obs.values;
    let n_params = kind.param_count();
    let mut params = match initial_guess {
        Some(g) => g.to_vec(),
        None => kind.initial_guess(freqs, values),
    };

    let mut residuals = residuals_at(kind, &params, freqs, values).ok_or_else(|| {
        TodError::NumericalInstability(format!(
            "model {kind:?} is not finite at the initial guess {params:?}"
        ))
    })?;
    let mut cost = sum_squares(&residuals);
    let negligible_cost = (f64::EPSILON * f64::EPSILON) * sum_squares(values);
    let mut lambda = cfg.initial_damping;
    let mut iterations = 0usize;
    let mut converged = cost <= negligible_cost;

    while !converged {
        if iterations >= cfg.max_iterations {
            log::debug!("fit {kind:?} gave up after {iterations} steps, cost {cost:.3e}");
            return Err(TodError::FitConvergence { iterations, cost });
        }
        iterations += 1;

        let (jtj, jtr) = normal_equations(kind, &params, freqs, &residuals);
        let mut damped = jtj.clone();
        for (i, row) in damped.iter_mut().enumerate() {
            row[i] += lambda * jtj[i][i].max(f64::MIN_POSITIVE);
        }
        let rhs: Vec<f64> = jtr.iter().map(|g| -g).collect();
        let Some(step) = solve_small(&damped, &rhs) else {
            lambda *= 10.0;
            continue;
        };

        let step_norm = sum_squares(&step).sqrt();
        let param_norm = sum_squares(&params).sqrt();
        let step_small = step_norm <= cfg.xtol * (param_norm + cfg.xtol);
        let trial: Vec<f64> = params.iter().zip(&step).map(|(p, d)| p + d).collect();

        match residuals_at(kind, &trial, freqs, values) {
            Some(r) if sum_squares(&r) < cost => {
                let new_cost = sum_squares(&r);
                let reduction = cost - new_cost;
                converged =
                    reduction <= cfg.ftol * cost || step_small || new_cost <= negligible_cost;
                params = trial;
                residuals = r;
                cost = new_cost;
                lambda = (lambda / 10.0).max(1e-15);
                log::trace!("lm step {iterations}: accepted, cost {cost:.6e}, λ {lambda:.1e}");
            }
            _ => {
                // Nothing better within reach of a vanishing step: at the minimum.
                converged = step_small;
                lambda *= 10.0;
                log::trace!("lm step {iterations}: rejected, λ {lambda:.1e}");
            }
        }
    }

    let points = values.len();
    let (jtj, _) = normal_equations(kind, &params, freqs, &residuals);
    let std_errors = (points > n_params)
        .then(|| invert_small(&jtj))
        .flatten()
        .map(|inv| {
            let s2 = cost / (points - n_params) as f64;
            (0..n_params).map(|i| (s2 * inv[i][i]).max(0.0).sqrt()).collect()
        });
    let y_bar = mean(values);
    let ss_tot: f64 = values.iter().map(|y| (y - y_bar) * (y - y_bar)).sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - cost / ss_tot } else { 1.0 };

    let f_lo = freqs.iter().copied().fold(f64::INFINITY, f64::min);
    let f_hi = freqs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let model = NoiseModel::from_params(kind, &params)?;
    log::debug!(
        "fit {kind:?} converged in {iterations} steps: {model:?}, R² {r_squared:.4}, {points} pts"
    );

    Ok(FittedNoiseModel {
        model,
        freq_range: (f_lo, f_hi),
        diagnostics: FitDiagnostics {
            iterations,
            cost,
            rms_residual: (cost / points as f64).sqrt(),
            r_squared,
            std_errors,
            points,
            mean_observed: y_bar,
        },
    })
}

fn validate_observations(obs: &Observations<'_>) -> Result<()> {
    if obs.freqs.len() != obs.values.len() {
        return Err(TodError::Input(format!(
            "frequency/value length mismatch: {} vs {}",
            obs.freqs.len(),
            obs.values.len()
        )));
    }
    if obs.freqs.is_empty() {
        return Err(TodError::Input("no observations to fit".into()));
    }
    if let Some(f) = obs.freqs.iter().find(|f| !f.is_finite() || **f <= 0.0) {
        return Err(TodError::Input(format!(
            "fit frequencies must be finite and > 0 (got {f})"
        )));
    }
    if obs.values.iter().any(|y| !y.is_finite()) {
        return Err(TodError::Input("non-finite observed value".into()));
    }
    Ok(())
}

fn validate_guess(kind: NoiseModelKind, guess: &[f64]) -> Result<()> {
    if guess.len() != kind.param_count() {
        return Err(TodError::Input(format!(
            "{kind:?} takes {} initial values, got {}",
            kind.param_count(),
            guess.len()
        )));
    }
    for (name, g) in kind.param_names().iter().zip(guess) {
        if !g.is_finite() || *g <= 0.0 {
            return Err(TodError::Input(format!(
                "initial guess for `{name}` must be finite and > 0 (got {g})"
            )));
        }
    }
    Ok(())
}

fn check_degenerate(obs: &Observations<'_>, kind: NoiseModelKind, cfg: &FitConfig) -> Result<()> {
    let n = obs.values.len();
    if n < kind.param_count() {
        return Err(TodError::DegenerateSpectrum(format!(
            "{n} points cannot constrain {} parameters",
            kind.param_count()
        )));
    }
    let spread = std_dev(obs.values);
    let scale = mean(obs.values)
        .abs()
        .max(obs.reference_scale.unwrap_or(0.0).abs());
    if spread <= cfg.degenerate_rtol * scale {
        return Err(TodError::DegenerateSpectrum(format!(
            "observed spread {spread:.3e} is negligible against scale {scale:.3e}"
        )));
    }
    Ok(())
}

fn residuals_at(
    kind: NoiseModelKind,
    p: &[f64],
    freqs: &[f64],
    values: &[f64],
) -> Option<Vec<f64>> {
    let r: Vec<f64> = freqs
        .iter()
        .zip(values)
        .map(|(&f, &y)| kind.evaluate(p, f) - y)
        .collect();
    r.iter().all(|x| x.is_finite()).then_some(r)
}

fn normal_equations(
    kind: NoiseModelKind,
    p: &[f64],
    freqs: &[f64],
    residuals: &[f64],
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = kind.param_count();
    let mut jtj = vec![vec![0.0f64; n]; n];
    let mut jtr = vec![0.0f64; n];
    let mut g = vec![0.0f64; n];
    for (&f, &r) in freqs.iter().zip(residuals) {
        kind.gradient(p, f, &mut g);
        for i in 0..n {
            jtr[i] += g[i] * r;
            for j in 0..n {
                jtj[i][j] += g[i] * g[j];
            }
        }
    }
    (jtj, jtr)
}
