//! Error taxonomy of the continuation engine.
//!
//! Only construction-time problems and collaborator failures surface as
//! `Err`; the recoverable conditions (`CorrectorDivergence`,
//! `UnresolvedEvent`, `AmbiguousClassification`, single-direction
//! `StepAdaptationFailure`) are recorded as [`Diagnostic`]s on the solution.
//! `Solution::ensure_classified` turns the first unlabeled event back into
//! an error for callers that need every event resolved.

use crate::continuation::types::{Diagnostic, PointType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContinuationError {
    #[error("initial point is outside the problem domain (coordinate {index}: {value} not in [{lower}, {upper}])")]
    Domain {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("corrector failed to converge in {iterations} iterations (residual norm {residual_norm:e})")]
    CorrectorDivergence {
        iterations: usize,
        residual_norm: f64,
    },

    #[error("no admissible step size in [{h_min:e}, {h_max:e}] after {retries} retries")]
    StepAdaptationFailure {
        h_min: f64,
        h_max: f64,
        retries: usize,
    },

    #[error("sign change of {test} could not be localized within tolerance")]
    UnresolvedEvent { test: String },

    #[error("ambiguous classification between {candidates:?}")]
    AmbiguousClassification { candidates: Vec<PointType> },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot switch branches from {0}")]
    UnsupportedSwitch(String),

    #[error(transparent)]
    Problem(#[from] anyhow::Error),
}

impl From<&Diagnostic> for ContinuationError {
    fn from(diagnostic: &Diagnostic) -> Self {
        match diagnostic {
            Diagnostic::CorrectorDivergence {
                iterations,
                residual_norm,
                ..
            } => ContinuationError::CorrectorDivergence {
                iterations: *iterations,
                residual_norm: *residual_norm,
            },
            Diagnostic::StepAdaptationFailure {
                h_min,
                h_max,
                retries,
                ..
            } => ContinuationError::StepAdaptationFailure {
                h_min: *h_min,
                h_max: *h_max,
                retries: *retries,
            },
            Diagnostic::UnresolvedEvent { test, .. } => ContinuationError::UnresolvedEvent {
                test: test.to_string(),
            },
            Diagnostic::AmbiguousClassification { candidates, .. } => {
                ContinuationError::AmbiguousClassification {
                    candidates: candidates.clone(),
                }
            }
        }
    }
}
