//! Whitening and Wiener filtering of time-ordered data (TOD) whose noise is
//! a white floor plus a 1/f component.
//!
//! Both strategies take a real series to the frequency domain, fit a
//! parametric noise model, scale each bin by a real gain and invert:
//!
//! - [`whiten`] divides out a fitted amplitude model sqrt(a + b/f) so the
//!   result has a flat spectrum.
//! - [`wiener_filter`] fits c/f on the high-frequency tail and applies the
//!   soft gain S/(S + N).

pub mod binning;
pub mod common;
pub mod diagnostics;
pub mod error;
pub mod fit;
pub mod model;
pub mod reconstruct;
pub mod response;
pub mod series;
pub mod spectrum;
pub mod whitening;
pub mod wiener;

pub use diagnostics::{
    QualityConfig, QualityReport, SeriesSummary, assess_whitening, assess_wiener, format_report,
};
pub use error::{Result, TodError};
pub use model::{NoiseModel, NoiseModelKind};
pub use whitening::{WhitenConfig, WhitenResult, WhiteningScale, whiten};
pub use wiener::{WienerConfig, WienerResult, wiener_filter};
