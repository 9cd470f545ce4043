//! Damped Newton corrector confined to a hyperplane.
//!
//! Solves [J; tᵀ] Δ = [−H; 0] so every correction is orthogonal to the
//! prediction direction t. All iterates live in a [`CorrectorWorkspace`];
//! the caller's committed state is only replaced after convergence.

use anyhow::Result;
use log::trace;
use nalgebra::{DMatrix, DVector};

use super::problem::ContinuationProblem;
use super::types::ContinuationSettings;

/// Trial buffers of the corrector.
#[derive(Debug, Clone)]
pub struct CorrectorWorkspace {
    pub u: DVector<f64>,
    pub residual: DVector<f64>,
    pub jacobian: DMatrix<f64>,
    candidate: DVector<f64>,
    candidate_residual: DVector<f64>,
    bordered: DMatrix<f64>,
    rhs: DVector<f64>,
}

impl CorrectorWorkspace {
    /// Buffers for a problem with `dim` equations.
    pub fn new(dim: usize) -> Self {
        Self {
            u: DVector::zeros(dim + 1),
            residual: DVector::zeros(dim),
            jacobian: DMatrix::zeros(dim, dim + 1),
            candidate: DVector::zeros(dim + 1),
            candidate_residual: DVector::zeros(dim),
            bordered: DMatrix::zeros(dim + 1, dim + 1),
            rhs: DVector::zeros(dim + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrectorOutcome {
    Converged {
        iterations: usize,
        residual_norm: f64,
    },
    Diverged {
        iterations: usize,
        residual_norm: f64,
    },
    /// Converged, but to a point outside the problem domain.
    OutOfDomain { iterations: usize },
}

impl CorrectorOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, CorrectorOutcome::Converged { .. })
    }
}

/// Corrects `u_pred` onto the curve within the hyperplane through `u_pred`
/// orthogonal to `tangent`. On success the converged point, its residual and
/// Jacobian are left in `ws`.
pub fn correct<P: ContinuationProblem>(
    problem: &P,
    cache: &mut P::Cache,
    ws: &mut CorrectorWorkspace,
    u_pred: &DVector<f64>,
    tangent: &DVector<f64>,
    settings: &ContinuationSettings,
) -> Result<CorrectorOutcome> {
    let dim = problem.dimension();
    ws.u.copy_from(u_pred);
    problem.residual_jacobian(&ws.u, cache, &mut ws.residual, &mut ws.jacobian)?;
    let mut norm = ws.residual.norm();
    let mut iterations = 0;

    while norm.is_finite() && norm >= settings.residual_tolerance {
        if iterations >= settings.max_corrector_iterations {
            break;
        }
        iterations += 1;

        ws.bordered
            .view_mut((0, 0), (dim, dim + 1))
            .copy_from(&ws.jacobian);
        ws.bordered.row_mut(dim).copy_from(&tangent.transpose());
        ws.rhs.rows_mut(0, dim).copy_from(&(-&ws.residual));
        ws.rhs[dim] = 0.0;

        let delta = match ws.bordered.clone().lu().solve(&ws.rhs) {
            Some(delta) if delta.iter().all(|v| v.is_finite()) => delta,
            _ => {
                return Ok(CorrectorOutcome::Diverged {
                    iterations,
                    residual_norm: norm,
                })
            }
        };

        // Halve the damping while the residual does not decrease.
        let mut damping = 1.0;
        let mut candidate_norm;
        loop {
            ws.candidate.copy_from(&ws.u);
            ws.candidate.axpy(damping, &delta, 1.0);
            problem.residual(&ws.candidate, cache, &mut ws.candidate_residual)?;
            candidate_norm = ws.candidate_residual.norm();
            if candidate_norm.is_finite() && candidate_norm < norm {
                break;
            }
            if damping * 0.5 < settings.min_damping {
                break;
            }
            damping *= 0.5;
        }
        if !candidate_norm.is_finite() {
            return Ok(CorrectorOutcome::Diverged {
                iterations,
                residual_norm: norm,
            });
        }

        trace!(
            "corrector iteration {}: |H| {:.3e} -> {:.3e} (damping {})",
            iterations,
            norm,
            candidate_norm,
            damping
        );
        std::mem::swap(&mut ws.u, &mut ws.candidate);
        problem.residual_jacobian(&ws.u, cache, &mut ws.residual, &mut ws.jacobian)?;
        norm = ws.residual.norm();
    }

    if !(norm < settings.residual_tolerance) {
        return Ok(CorrectorOutcome::Diverged {
            iterations,
            residual_norm: norm,
        });
    }
    if !problem.in_domain(&ws.u) {
        return Ok(CorrectorOutcome::OutOfDomain { iterations });
    }
    Ok(CorrectorOutcome::Converged {
        iterations,
        residual_norm: norm,
    })
}
