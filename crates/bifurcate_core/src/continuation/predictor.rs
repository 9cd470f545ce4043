use anyhow::Result;
use nalgebra::{DMatrix, DVector};

use super::types::ContinuationSettings;
use super::util::{compute_nullspace_tangent, orient_tangent};

/// Unit null vector of `jac` oriented along `reference`.
pub fn oriented_tangent(jac: &DMatrix<f64>, reference: &DVector<f64>) -> Result<DVector<f64>> {
    let mut tangent = compute_nullspace_tangent(jac)?;
    orient_tangent(&mut tangent, reference);
    Ok(tangent)
}

/// Euler predictor u + h·t.
pub fn predict(u: &DVector<f64>, tangent: &DVector<f64>, step_size: f64) -> DVector<f64> {
    u + tangent * step_size
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDecision {
    Accept { next_step: f64 },
    /// The step turned too sharply; retry from the same point.
    Reject { next_step: f64 },
}

/// Step-size policy driven by the tangent angle and corrector effort.
#[derive(Debug, Clone, Copy)]
pub struct StepController {
    nominal_angle: f64,
    h_min: f64,
    h_max: f64,
    growth: f64,
    shrink: f64,
    fast_iterations: usize,
    max_retries: usize,
}

impl StepController {
    pub fn new(settings: &ContinuationSettings) -> Self {
        Self {
            nominal_angle: settings.nominal_angle_rad,
            h_min: settings.h_min,
            h_max: settings.h_max,
            growth: settings.step_growth,
            shrink: settings.step_shrink,
            fast_iterations: settings.fast_corrector_iterations,
            max_retries: settings.max_retries,
        }
    }

    /// Decision after the corrector converged with a tangent turning by
    /// `angle`. Growth is suppressed right after a test function changed sign.
    pub fn after_convergence(
        &self,
        step_size: f64,
        angle: f64,
        iterations: usize,
        near_event: bool,
    ) -> StepDecision {
        let shrunk = (step_size * self.shrink).max(self.h_min);
        if angle > 2.0 * self.nominal_angle && step_size > self.h_min {
            return StepDecision::Reject { next_step: shrunk };
        }
        let next_step = if angle > self.nominal_angle {
            shrunk
        } else if angle < 0.5 * self.nominal_angle
            && iterations <= self.fast_iterations
            && !near_event
        {
            (step_size * self.growth).min(self.h_max)
        } else {
            step_size
        };
        StepDecision::Accept { next_step }
    }

    /// Halved step after a corrector failure, or `None` once the step would
    /// drop below `h_min` or `retries` rejections have been spent.
    pub fn after_failure(&self, step_size: f64, retries: usize) -> Option<f64> {
        let next = 0.5 * step_size;
        if next < self.h_min || retries >= self.max_retries {
            None
        } else {
            Some(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> StepController {
        StepController::new(&ContinuationSettings {
            nominal_angle_rad: 0.1,
            h_min: 1e-3,
            h_max: 0.2,
            step_growth: 2.0,
            step_shrink: 0.5,
            fast_corrector_iterations: 3,
            max_retries: 5,
            ..ContinuationSettings::default()
        })
    }

    #[test]
    fn smooth_fast_steps_grow_up_to_h_max() {
        let c = controller();
        assert_eq!(
            c.after_convergence(0.05, 0.01, 2, false),
            StepDecision::Accept { next_step: 0.1 }
        );
        assert_eq!(
            c.after_convergence(0.15, 0.01, 2, false),
            StepDecision::Accept { next_step: 0.2 }
        );
        assert_eq!(
            c.after_convergence(0.05, 0.01, 2, true),
            StepDecision::Accept { next_step: 0.05 }
        );
        assert_eq!(
            c.after_convergence(0.05, 0.01, 6, false),
            StepDecision::Accept { next_step: 0.05 }
        );
    }

    #[test]
    fn sharp_turns_shrink_or_reject() {
        let c = controller();
        assert_eq!(
            c.after_convergence(0.05, 0.15, 2, false),
            StepDecision::Accept { next_step: 0.025 }
        );
        assert_eq!(
            c.after_convergence(0.05, 0.3, 2, false),
            StepDecision::Reject { next_step: 0.025 }
        );
        // at h_min a sharp turn is accepted rather than looping
        assert_eq!(
            c.after_convergence(1e-3, 0.3, 2, false),
            StepDecision::Accept { next_step: 1e-3 }
        );
    }

    #[test]
    fn failures_halve_until_bounds_are_hit() {
        let c = controller();
        assert_eq!(c.after_failure(0.04, 0), Some(0.02));
        assert_eq!(c.after_failure(1.5e-3, 0), None);
        assert_eq!(c.after_failure(0.04, 5), None);
    }

    #[test]
    fn predictor_moves_along_tangent() {
        let jac = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
        let reference = DVector::from_vec(vec![-1.0, -0.5]);
        let t = oriented_tangent(&jac, &reference).expect("tangent");
        assert!(t[0] < 0.0 && t[1] < 0.0);
        let u = predict(&DVector::from_vec(vec![1.0, 1.0]), &t, 2.0f64.sqrt());
        assert!((u[0]).abs() < 1e-12 && (u[1]).abs() < 1e-12);
    }
}
