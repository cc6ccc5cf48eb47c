//! Parametric noise models.
//!
//! `WhitePlusPink` describes spectral *amplitude*, sqrt(a + b/f): a white
//! floor `a` plus a 1/f term `b`, both in power units. `PurePinkLaw`
//! describes spectral *power*, c/f. Both share one evaluation and gradient
//! routine so the fitter never needs per-model closures.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TodError};
use crate::fit::FitDiagnostics;

/// Functional form of a noise model, selected before fitting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseModelKind {
    /// Amplitude model sqrt(a + b/f).
    WhitePlusPink,
    /// Power model c/f.
    PurePinkLaw,
}

impl NoiseModelKind {
    pub fn param_count(self) -> usize {
        match self {
            NoiseModelKind::WhitePlusPink => 2,
            NoiseModelKind::PurePinkLaw => 1,
        }
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            NoiseModelKind::WhitePlusPink => &["a", "b"],
            NoiseModelKind::PurePinkLaw => &["c"],
        }
    }

    /// Model value at `f` for raw parameters `p`. NaN outside the model's domain.
    #[inline]
    pub fn evaluate(self, p: &[f64], f: f64) -> f64 {
        match self {
            NoiseModelKind::WhitePlusPink => {
                let v = p[0] + p[1] / f;
                if v >= 0.0 { v.sqrt() } else { f64::NAN }
            }
            NoiseModelKind::PurePinkLaw => p[0] / f,
        }
    }

    /// Partial derivatives of the model at `f` with respect to each parameter.
    #[inline]
    pub fn gradient(self, p: &[f64], f: f64, out: &mut [f64]) {
        match self {
            NoiseModelKind::WhitePlusPink => {
                let m = self.evaluate(p, f);
                let d = 0.5 / m;
                out[0] = d;
                out[1] = d / f;
            }
            NoiseModelKind::PurePinkLaw => {
                out[0] = 1.0 / f;
            }
        }
    }

    /// Starting point derived from the observations themselves.
    ///
    /// Non-positive components fall back to 1.0.
    pub fn initial_guess(self, freqs: &[f64], values: &[f64]) -> Vec<f64> {
        let n = values.len().max(1) as f64;
        let guess = match self {
            NoiseModelKind::WhitePlusPink => {
                let level = values.iter().sum::<f64>() / n;
                let f_min = freqs.iter().copied().fold(f64::INFINITY, f64::min);
                let a = level * level;
                vec![a, a * f_min]
            }
            NoiseModelKind::PurePinkLaw => {
                let c = freqs.iter().zip(values).map(|(f, y)| f * y).sum::<f64>() / n;
                vec![c]
            }
        };
        guess
            .into_iter()
            .map(|g| if g.is_finite() && g > 0.0 { g } else { 1.0 })
            .collect()
    }
}

/// A noise model with concrete parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum NoiseModel {
    WhitePlusPink { a: f64, b: f64 },
    PurePinkLaw { c: f64 },
}

impl NoiseModel {
    pub fn from_params(kind: NoiseModelKind, p: &[f64]) -> Result<Self> {
        if p.len() != kind.param_count() {
            return Err(TodError::Input(format!(
                "{kind:?} takes {} parameters, got {}",
                kind.param_count(),
                p.len()
            )));
        }
        Ok(match kind {
            NoiseModelKind::WhitePlusPink => NoiseModel::WhitePlusPink { a: p[0], b: p[1] },
            NoiseModelKind::PurePinkLaw => NoiseModel::PurePinkLaw { c: p[0] },
        })
    }

    pub fn kind(&self) -> NoiseModelKind {
        match self {
            NoiseModel::WhitePlusPink { .. } => NoiseModelKind::WhitePlusPink,
            NoiseModel::PurePinkLaw { .. } => NoiseModelKind::PurePinkLaw,
        }
    }

    pub fn params(&self) -> Vec<f64> {
        match *self {
            NoiseModel::WhitePlusPink { a, b } => vec![a, b],
            NoiseModel::PurePinkLaw { c } => vec![c],
        }
    }

    #[inline]
    pub fn evaluate(&self, f: f64) -> f64 {
        self.kind().evaluate(&self.params(), f)
    }

    /// Frequency where the white and 1/f terms are equal (b/a), if defined.
    pub fn knee_frequency(&self) -> Option<f64> {
        match *self {
            NoiseModel::WhitePlusPink { a, b } if a > 0.0 && b > 0.0 => Some(b / a),
            _ => None,
        }
    }
}

/// Outcome of a fit: the model, where it was fit, and how well.
#[derive(Clone, Debug, Serialize)]
pub struct FittedNoiseModel {
    pub model: NoiseModel,
    /// Closed frequency interval covered by the fitted observations (Hz).
    pub freq_range: (f64, f64),
    pub diagnostics: FitDiagnostics,
}
