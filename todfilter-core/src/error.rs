//! Error taxonomy shared by every stage of the engine.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TodError {
    /// Empty or non-finite input, bad sample rate, bad configuration values.
    #[error("input: {0}")]
    Input(String),
    /// The observed spectrum cannot support a meaningful fit.
    #[error("degenerate-spectrum: {0}")]
    DegenerateSpectrum(String),
    /// The least-squares solver ran out of iterations.
    #[error("fit-convergence: no convergence after {iterations} iterations (cost {cost:.3e})")]
    FitConvergence { iterations: usize, cost: f64 },
    /// Reconstruction residue or a filter denominator went out of range.
    #[error("numerical-instability: {0}")]
    NumericalInstability(String),
}

pub type Result<T> = std::result::Result<T, TodError>;
