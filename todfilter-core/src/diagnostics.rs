//! Quality control and diagnostics
//!
//! Flags low-confidence filter runs and renders a compact text report.
//!
//! Heuristics (configurable):
//! - Poor fit: rms residual / mean observation > max_relative_rms
//! - Few fit points: fitted observations < min_fit_points
//! - Knee above range: the whitening model's 1/f knee (b/a) lies above the
//!   highest fitted frequency, so the white floor was never observed
//! - Heavy suppression: mean gain over the filtered bins < min_mean_gain

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::common::{mean, std_dev};
use crate::fit::FitDiagnostics;
use crate::whitening::WhitenResult;
use crate::wiener::WienerResult;

/// Summary statistics of a series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesSummary {
    pub fn of(xs: &[f64]) -> Self {
        if xs.is_empty() {
            return Self::default();
        }
        Self {
            mean: mean(xs),
            std: std_dev(xs),
            min: xs.iter().copied().fold(f64::INFINITY, f64::min),
            max: xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Largest acceptable rms residual relative to the mean observation.
    pub max_relative_rms: f64,
    /// Minimum number of points the noise model was fitted on.
    pub min_fit_points: usize,
    /// Smallest acceptable mean gain over the filtered bins.
    pub min_mean_gain: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_relative_rms: 2.0,
            min_fit_points: 8,
            min_mean_gain: 0.05,
        }
    }
}

/// Flags indicating potential quality issues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QualityFlags {
    pub poor_fit: bool,
    pub few_fit_points: bool,
    pub knee_above_range: bool,
    pub heavy_suppression: bool,
}

impl QualityFlags {
    pub fn any(&self) -> bool {
        self.poor_fit || self.few_fit_points || self.knee_above_range || self.heavy_suppression
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct QualityReport {
    pub strategy: &'static str,
    pub flags: QualityFlags,
    /// Fitted parameters by name.
    pub params: Vec<(&'static str, f64)>,
    pub relative_rms: f64,
    pub r_squared: f64,
    pub fit_points: usize,
    pub fit_range: (f64, f64),
    pub knee_hz: Option<f64>,
    pub mean_gain: f64,
    pub output: SeriesSummary,
}

fn relative_rms(fit: &FitDiagnostics) -> f64 {
    let scale = fit.mean_observed.abs();
    if scale > 0.0 {
        fit.rms_residual / scale
    } else {
        f64::INFINITY
    }
}

fn warn_flags(report: &QualityReport, cfg: &QualityConfig) {
    let f = &report.flags;
    if f.poor_fit {
        log::warn!(
            "{}: noise fit residual is {:.2}x the mean observation (limit {:.2})",
            report.strategy,
            report.relative_rms,
            cfg.max_relative_rms
        );
    }
    if f.few_fit_points {
        log::warn!(
            "{}: noise model fitted on only {} points (< {})",
            report.strategy,
            report.fit_points,
            cfg.min_fit_points
        );
    }
    if f.knee_above_range {
        log::warn!(
            "{}: 1/f knee {:.3e} Hz lies above the fitted range (max {:.3e} Hz)",
            report.strategy,
            report.knee_hz.unwrap_or(f64::NAN),
            report.fit_range.1
        );
    }
    if f.heavy_suppression {
        log::warn!(
            "{}: mean gain {:.3} is below {:.3}",
            report.strategy,
            report.mean_gain,
            cfg.min_mean_gain
        );
    }
}

/// Quality checks for a whitening run.
pub fn assess_whitening(res: &WhitenResult, cfg: &QualityConfig) -> QualityReport {
    let d = &res.diagnostics;
    let rel = relative_rms(&d.fit);
    let knee_hz = (res.a > 0.0 && res.b > 0.0).then(|| res.b / res.a);
    let mean_gain = d.response.mean_over(1.min(d.response.len())..d.response.len());
    let report = QualityReport {
        strategy: "whiten",
        flags: QualityFlags {
            poor_fit: !(rel <= cfg.max_relative_rms),
            few_fit_points: d.fit.points < cfg.min_fit_points,
            knee_above_range: knee_hz.is_some_and(|k| k > d.fit_range.1),
            heavy_suppression: mean_gain < cfg.min_mean_gain,
        },
        params: vec![("a", res.a), ("b", res.b)],
        relative_rms: rel,
        r_squared: d.fit.r_squared,
        fit_points: d.fit.points,
        fit_range: d.fit_range,
        knee_hz,
        mean_gain,
        output: d.output,
    };
    warn_flags(&report, cfg);
    report
}

/// Quality checks for a Wiener run.
pub fn assess_wiener(res: &WienerResult, cfg: &QualityConfig) -> QualityReport {
    let d = &res.diagnostics;
    let rel = relative_rms(&d.fit);
    // Positive bins start right after DC.
    let end = (1 + d.positive_freqs.len()).min(d.gain.len());
    let mean_gain = d.gain.mean_over(1.min(end)..end);
    let report = QualityReport {
        strategy: "wiener",
        flags: QualityFlags {
            poor_fit: !(rel <= cfg.max_relative_rms),
            few_fit_points: d.fit.points < cfg.min_fit_points,
            knee_above_range: false,
            heavy_suppression: mean_gain < cfg.min_mean_gain,
        },
        params: vec![("c", res.c)],
        relative_rms: rel,
        r_squared: d.fit.r_squared,
        fit_points: d.fit.points,
        fit_range: d.fit_range,
        knee_hz: None,
        mean_gain,
        output: d.output,
    };
    warn_flags(&report, cfg);
    report
}

/// Compact multi-line text report.
pub fn format_report(report: &QualityReport) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "== {} ==", report.strategy);
    for (name, v) in &report.params {
        let _ = writeln!(s, "  {name:>2} = {v:.6e}");
    }
    let _ = writeln!(
        s,
        "Fit: {} points over {:.4e}..{:.4e} Hz, R²={:.3}, rel. rms {:.3}{}",
        report.fit_points,
        report.fit_range.0,
        report.fit_range.1,
        report.r_squared,
        report.relative_rms,
        if report.flags.poor_fit { "  [POOR]" } else { "" }
    );
    if let Some(k) = report.knee_hz {
        let _ = writeln!(
            s,
            "1/f knee: {k:.4e} Hz{}",
            if report.flags.knee_above_range { "  [ABOVE RANGE]" } else { "" }
        );
    }
    let _ = writeln!(
        s,
        "Mean gain: {:.4}{}",
        report.mean_gain,
        if report.flags.heavy_suppression { "  [LOW]" } else { "" }
    );
    let o = &report.output;
    let _ = writeln!(
        s,
        "Output: mean {:.4e}, std {:.4e}, range [{:.4e}, {:.4e}]",
        o.mean, o.std, o.min, o.max
    );
    if report.flags.any() {
        let _ = writeln!(s, "QUALITY WARNINGS:");
        if report.flags.few_fit_points {
            let _ = writeln!(s, " - Noise model fitted on few points ({}).", report.fit_points);
        }
        if report.flags.poor_fit {
            let _ = writeln!(s, " - Noise model fits the observations poorly.");
        }
        if report.flags.knee_above_range {
            let _ = writeln!(s, " - White floor not reached within the fitted band.");
        }
        if report.flags.heavy_suppression {
            let _ = writeln!(s, " - Filter suppresses most of the band.");
        }
    } else {
        let _ = writeln!(s, "All quality checks passed.");
    }
    s
}
