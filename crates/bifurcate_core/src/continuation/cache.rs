use nalgebra::{DMatrix, DVector};

use super::corrector::CorrectorWorkspace;
use super::problem::ContinuationProblem;
use super::types::Direction;

/// Step state of one live sweep.
///
/// Owns the problem scratch cache, so two sweeps never share buffers. The
/// committed fields only change through [`ContinuationCache::commit_trial`]
/// after a successful correction.
pub struct ContinuationCache<C> {
    pub u: DVector<f64>,
    pub residual: DVector<f64>,
    pub jacobian: DMatrix<f64>,
    /// Unit tangent at `u`, oriented in the direction of travel.
    pub tangent: DVector<f64>,
    pub test_values: Vec<f64>,
    pub step_size: f64,
    pub direction: Direction,
    pub corrector_success: bool,
    pub adaptation_success: bool,
    /// A test function changed sign over the last accepted step.
    pub simple_bifurcation: bool,
    pub problem: C,
    pub trial: CorrectorWorkspace,
}

impl<C> ContinuationCache<C> {
    pub fn new<P>(problem: &P, u: DVector<f64>, step_size: f64, direction: Direction) -> Self
    where
        P: ContinuationProblem<Cache = C>,
    {
        let dim = problem.dimension();
        Self {
            u,
            residual: DVector::zeros(dim),
            jacobian: DMatrix::zeros(dim, dim + 1),
            tangent: DVector::zeros(dim + 1),
            test_values: vec![0.0; problem.test_functions().len()],
            step_size,
            direction,
            corrector_success: true,
            adaptation_success: true,
            simple_bifurcation: false,
            problem: problem.new_cache(),
            trial: CorrectorWorkspace::new(dim),
        }
    }

    /// Adopts the converged trial point as the current point.
    pub fn commit_trial(&mut self) {
        std::mem::swap(&mut self.u, &mut self.trial.u);
        std::mem::swap(&mut self.residual, &mut self.trial.residual);
        std::mem::swap(&mut self.jacobian, &mut self.trial.jacobian);
    }
}
