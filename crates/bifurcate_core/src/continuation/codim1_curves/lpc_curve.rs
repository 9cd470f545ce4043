//! Fold of limit cycles (LPC) continuation in two parameters.
//!
//! # Defining system
//!
//! ```text
//! G(x0, T, p1, p2)            = 0      (n + 1 shooting equations)
//! G_y(x0, T, p1, p2) w        = 0      (n + 1 equations)
//! ⟨c, w⟩ − 1                  = 0
//! ```
//!
//! where y = (x0, T) and G is the shooting map of [`Shooting`]. Unknowns are
//! (x0, T, w, p1, p2). G_y w is one dual-number integration along w.

use std::f64::consts::PI;
use std::sync::Arc;

use anyhow::Result;
use nalgebra::{DMatrix, DVector};

use super::ParamPlane;
use crate::continuation::limit_cycle::{
    hopf_displacement, monodromy_from_jacobian, Shooting, ShootingCache,
};
use crate::continuation::problem::{ContinuationProblem, DomainBox};
use crate::continuation::types::{AuxiliaryValues, Codimension};
use crate::continuation::util::{
    compute_eigenvalues, finite_difference_jacobian, smallest_singular_vector,
};
use crate::error::ContinuationError;
use crate::traits::VectorField;

pub struct FoldLimitCycleCurveProblem<S: VectorField> {
    shooting: Shooting<S>,
    params: Vec<f64>,
    plane: ParamPlane,
    x0: Vec<f64>,
    period: f64,
    w0: Vec<f64>,
    border: Vec<f64>,
    domain: DomainBox,
    seed_direction: Option<DVector<f64>>,
}

pub struct FoldLimitCycleCurveCache {
    shooting: ShootingCache,
    params: Vec<f64>,
    zero_params: Vec<f64>,
    jac_y: DMatrix<f64>,
}

impl<S: VectorField> FoldLimitCycleCurveProblem<S> {
    /// Seeds the curve at a fold of cycles through `x0` with `period`.
    pub fn new(
        system: Arc<S>,
        params: Vec<f64>,
        plane: ParamPlane,
        x0: Vec<f64>,
        period: f64,
        steps: usize,
    ) -> Result<Self, ContinuationError> {
        let n = system.dimension();
        if x0.len() != n {
            return Err(ContinuationError::DimensionMismatch {
                expected: n,
                actual: x0.len(),
            });
        }
        plane.check(&params)?;
        if !(period > 0.0) {
            return Err(ContinuationError::InvalidSettings(format!(
                "period must be positive, got {period}"
            )));
        }
        let shooting = Shooting::new(system, steps, x0.clone(), &params)?;
        let mut cache = shooting.new_cache();
        let mut jac_y = DMatrix::zeros(n + 1, n + 1);
        shooting.jacobian(&x0, period, &params, &[], &mut cache, &mut jac_y);
        let w0 = smallest_singular_vector(&jac_y)?;
        let w0: Vec<f64> = w0.iter().copied().collect();
        let domain = plane.domain(2 * n + 4).with_bounds(n, 0.0, f64::INFINITY);
        Ok(Self {
            shooting,
            params,
            plane,
            x0,
            period,
            border: w0.clone(),
            w0,
            domain,
            seed_direction: None,
        })
    }

    /// Seeds the curve at a Bautin point `(x_star, params)` with frequency
    /// `omega`: a small cycle of radius `amplitude` along the critical
    /// eigenvector, whose amplitude is held fixed while snapping.
    #[allow(clippy::too_many_arguments)]
    pub fn from_bautin(
        system: Arc<S>,
        params: Vec<f64>,
        plane: ParamPlane,
        x_star: &[f64],
        jac_x: &DMatrix<f64>,
        omega: f64,
        amplitude: f64,
        steps: usize,
    ) -> Result<Self, ContinuationError> {
        if !(amplitude > 0.0) || !(omega > 0.0) {
            return Err(ContinuationError::InvalidSettings(format!(
                "Bautin seed needs positive amplitude and frequency, got {amplitude} and {omega}"
            )));
        }
        let n = x_star.len();
        let direction = hopf_displacement(jac_x, omega)?;
        let x0 = x_star
            .iter()
            .zip(direction.iter())
            .map(|(x, d)| x + amplitude * d)
            .collect();
        let mut problem = Self::new(system, params, plane, x0, 2.0 * PI / omega, steps)?;
        let mut seed = DVector::zeros(2 * n + 4);
        seed.rows_mut(0, n).copy_from(&direction);
        problem.seed_direction = Some(seed);
        Ok(problem)
    }

    pub fn state_dim(&self) -> usize {
        self.x0.len()
    }

    pub fn shooting(&self) -> &Shooting<S> {
        &self.shooting
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn plane(&self) -> &ParamPlane {
        &self.plane
    }

    pub fn params_at(&self, u: &DVector<f64>) -> Vec<f64> {
        let mut params = self.params.clone();
        self.plane.apply(u, &mut params);
        params
    }
}

impl<S: VectorField> ContinuationProblem for FoldLimitCycleCurveProblem<S> {
    type Cache = FoldLimitCycleCurveCache;

    fn dimension(&self) -> usize {
        2 * self.state_dim() + 3
    }

    fn codimension(&self) -> Codimension {
        Codimension::Two
    }

    fn initial_point(&self) -> DVector<f64> {
        let n = self.state_dim();
        let mut u = DVector::zeros(2 * n + 4);
        u.rows_mut(0, n).copy_from_slice(&self.x0);
        u[n] = self.period;
        u.rows_mut(n + 1, n + 1).copy_from_slice(&self.w0);
        u[2 * n + 2] = self.params[self.plane.first.index];
        u[2 * n + 3] = self.params[self.plane.second.index];
        u
    }

    fn domain(&self) -> &DomainBox {
        &self.domain
    }

    fn new_cache(&self) -> FoldLimitCycleCurveCache {
        let n = self.state_dim();
        FoldLimitCycleCurveCache {
            shooting: self.shooting.new_cache(),
            params: self.params.clone(),
            zero_params: vec![0.0; self.params.len()],
            jac_y: DMatrix::zeros(n + 1, n + 1),
        }
    }

    fn residual(
        &self,
        u: &DVector<f64>,
        cache: &mut FoldLimitCycleCurveCache,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        let n = self.state_dim();
        self.plane.apply(u, &mut cache.params);
        let x0 = &u.as_slice()[..n];
        let period = u[n];
        let w = &u.as_slice()[n + 1..2 * n + 2];
        let out = out.as_mut_slice();
        self.shooting
            .residual(x0, period, &cache.params, &mut cache.shooting, &mut out[..n + 1]);
        self.shooting.directional(
            x0,
            period,
            &cache.params,
            &w[..n],
            w[n],
            &cache.zero_params,
            &mut cache.shooting,
            &mut out[n + 1..2 * n + 2],
        );
        out[2 * n + 2] = self.border.iter().zip(w).map(|(c, w)| c * w).sum::<f64>() - 1.0;
        Ok(())
    }

    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        cache: &mut FoldLimitCycleCurveCache,
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()> {
        self.residual(u, cache, out)?;
        finite_difference_jacobian(|v, o| self.residual(v, cache, o), u, jac)
    }

    fn auxiliary(
        &self,
        u: &DVector<f64>,
        _tangent: &DVector<f64>,
        _jac: &DMatrix<f64>,
        cache: &mut FoldLimitCycleCurveCache,
    ) -> Result<AuxiliaryValues> {
        let n = self.state_dim();
        self.plane.apply(u, &mut cache.params);
        self.shooting.jacobian(
            &u.as_slice()[..n],
            u[n],
            &cache.params,
            &[],
            &mut cache.shooting,
            &mut cache.jac_y,
        );
        Ok(AuxiliaryValues {
            eigenvalues: compute_eigenvalues(&monodromy_from_jacobian(&cache.jac_y, n))?,
            ..AuxiliaryValues::default()
        })
    }

    fn seed_direction(&self) -> Option<DVector<f64>> {
        self.seed_direction.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::limit_cycle::DEFAULT_SHOOTING_STEPS;
    use crate::continuation::problem::ParamAxis;
    use crate::continuation::test_systems::BautinNormalForm;

    fn plane() -> ParamPlane {
        ParamPlane::new(
            ParamAxis::new(0, "beta1").with_range(-1.0, 1.0),
            ParamAxis::new(1, "beta2").with_range(-1.0, 1.0),
        )
        .expect("plane")
    }

    #[test]
    fn seed_at_exact_cycle_fold_has_small_residual() {
        // with β2 = 1/2 the cycles r² satisfy β1 = r⁴ − r²/2, folding at r = 1/2
        let problem = FoldLimitCycleCurveProblem::new(
            Arc::new(BautinNormalForm),
            vec![-0.0625, 0.5],
            plane(),
            vec![0.5, 0.0],
            2.0 * PI,
            DEFAULT_SHOOTING_STEPS,
        )
        .expect("problem");
        let u = problem.initial_point();
        assert_eq!(u.len(), 8);
        assert_eq!(problem.dimension(), 7);
        let residual = problem
            .residual_vec(&u, &mut problem.new_cache())
            .expect("residual");
        assert!(residual.norm() < 1e-5, "residual {residual}");
        assert!(problem.test_functions().is_empty());

        let aux = problem
            .auxiliary(&u, &DVector::zeros(8), &DMatrix::zeros(7, 8), &mut problem.new_cache())
            .expect("multipliers");
        // both multipliers sit at one at a fold of cycles
        for z in aux.eigenvalues {
            assert!((z.re - 1.0).abs() < 1e-2);
        }
    }

    #[test]
    fn bautin_seed_keeps_amplitude_direction() {
        let jac = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]);
        let problem = FoldLimitCycleCurveProblem::from_bautin(
            Arc::new(BautinNormalForm),
            vec![0.0, 0.0],
            plane(),
            &[0.0, 0.0],
            &jac,
            1.0,
            0.1,
            DEFAULT_SHOOTING_STEPS,
        )
        .expect("seed");
        let u = problem.initial_point();
        assert!(((u[0] * u[0] + u[1] * u[1]).sqrt() - 0.1).abs() < 1e-12);
        let residual = problem
            .residual_vec(&u, &mut problem.new_cache())
            .expect("residual");
        assert!(residual.norm() < 1e-2);
        let seed = problem.seed_direction().expect("seed direction");
        assert!((seed.rows(0, 2).norm() - 1.0).abs() < 1e-12);
        assert!(seed.rows(2, 6).norm() < 1e-15);
    }
}
