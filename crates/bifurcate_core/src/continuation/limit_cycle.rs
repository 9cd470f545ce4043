//! Periodic orbits by single shooting.
//!
//! The orbit is represented by a point x0 on it and its period T; the
//! residual is φ_T(x0) − x0 together with a Poincaré phase condition
//! ⟨n, x0 − x_ref⟩ = 0. Derivatives of the flow come from integrating
//! dual numbers through the same RK4 scheme.

use std::f64::consts::PI;
use std::sync::Arc;

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use num_traits::Zero;

use super::problem::{ContinuationProblem, DomainBox, ParamAxis};
use super::types::{AuxiliaryValues, Codimension, TestFunction};
use super::util::{compute_eigenvalues, complex_eigenvector};
use crate::autodiff::Dual;
use crate::error::ContinuationError;
use crate::solvers::RK4;
use crate::traits::VectorField;

/// Default number of RK4 steps per period.
pub const DEFAULT_SHOOTING_STEPS: usize = 400;

/// Shooting map G(x0, T, p) = (φ_T(x0) − x0, ⟨n, x0 − x_ref⟩).
pub struct Shooting<S: VectorField> {
    system: Arc<S>,
    steps: usize,
    reference: Vec<f64>,
    normal: Vec<f64>,
}

pub struct ShootingCache {
    rk: RK4<f64>,
    rk_dual: RK4<Dual>,
    state: Vec<f64>,
    dual_state: Vec<Dual>,
    dual_params: Vec<Dual>,
}

impl<S: VectorField> Shooting<S> {
    /// The phase condition is anchored at `reference`, normal to the flow there.
    pub fn new(system: Arc<S>, steps: usize, reference: Vec<f64>, params: &[f64]) -> Result<Self> {
        if steps == 0 {
            bail!("Shooting requires at least one integration step");
        }
        let mut flow = vec![0.0; reference.len()];
        system.evaluate(0.0, &reference, params, &mut flow);
        let norm = flow.iter().map(|v| v * v).sum::<f64>().sqrt();
        if !(norm > 0.0) || !norm.is_finite() {
            bail!("Phase reference must not be an equilibrium");
        }
        let normal = flow.iter().map(|v| v / norm).collect();
        Ok(Self {
            system,
            steps,
            reference,
            normal,
        })
    }

    pub fn state_dim(&self) -> usize {
        self.reference.len()
    }

    pub fn system(&self) -> &Arc<S> {
        &self.system
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn new_cache(&self) -> ShootingCache {
        let n = self.state_dim();
        ShootingCache {
            rk: RK4::new(n),
            rk_dual: RK4::new(n),
            state: vec![0.0; n],
            dual_state: vec![Dual::zero(); n],
            dual_params: Vec::new(),
        }
    }

    fn phase(&self, x0: &[f64]) -> f64 {
        self.normal
            .iter()
            .zip(x0.iter().zip(&self.reference))
            .map(|(n, (x, r))| n * (x - r))
            .sum()
    }

    /// Writes the n + 1 shooting residuals into `out`.
    pub fn residual(
        &self,
        x0: &[f64],
        period: f64,
        params: &[f64],
        cache: &mut ShootingCache,
        out: &mut [f64],
    ) {
        let n = self.state_dim();
        cache.state.copy_from_slice(x0);
        cache
            .rk
            .integrate(self.system.as_ref(), params, &mut cache.state, period, self.steps);
        for i in 0..n {
            out[i] = cache.state[i] - x0[i];
        }
        out[n] = self.phase(x0);
    }

    /// Directional derivative of G along (dx0, dT, dp), written into `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn directional(
        &self,
        x0: &[f64],
        period: f64,
        params: &[f64],
        dx0: &[f64],
        dperiod: f64,
        dparams: &[f64],
        cache: &mut ShootingCache,
        out: &mut [f64],
    ) {
        let n = self.state_dim();
        for i in 0..n {
            cache.dual_state[i] = Dual::new(x0[i], dx0[i]);
        }
        cache.dual_params.clear();
        cache
            .dual_params
            .extend(params.iter().zip(dparams).map(|(&p, &dp)| Dual::new(p, dp)));
        cache.rk_dual.integrate(
            self.system.as_ref(),
            &cache.dual_params,
            &mut cache.dual_state,
            Dual::new(period, dperiod),
            self.steps,
        );
        for i in 0..n {
            out[i] = cache.dual_state[i].eps - dx0[i];
        }
        out[n] = self.phase_linear(dx0);
    }

    fn phase_linear(&self, dx0: &[f64]) -> f64 {
        self.normal.iter().zip(dx0).map(|(n, d)| n * d).sum()
    }

    /// Jacobian of G with respect to (x0, T) followed by the listed
    /// parameter indices, one dual integration per column.
    pub fn jacobian(
        &self,
        x0: &[f64],
        period: f64,
        params: &[f64],
        param_indices: &[usize],
        cache: &mut ShootingCache,
        jac: &mut DMatrix<f64>,
    ) {
        let n = self.state_dim();
        let mut dx0 = vec![0.0; n];
        let mut dparams = vec![0.0; params.len()];
        let mut column = vec![0.0; n + 1];
        for j in 0..n + 1 + param_indices.len() {
            let mut dperiod = 0.0;
            if j < n {
                dx0[j] = 1.0;
            } else if j == n {
                dperiod = 1.0;
            } else {
                dparams[param_indices[j - n - 1]] = 1.0;
            }
            self.directional(x0, period, params, &dx0, dperiod, &dparams, cache, &mut column);
            for i in 0..=n {
                jac[(i, j)] = column[i];
            }
            dx0.iter_mut().for_each(|v| *v = 0.0);
            dparams.iter_mut().for_each(|v| *v = 0.0);
        }
    }
}

/// Unit displacement from a Hopf point towards the emerging cycle: the real
/// part of the eigenvector for iω, or its imaginary part if that vanishes.
pub fn hopf_displacement(jac_x: &DMatrix<f64>, omega: f64) -> Result<DVector<f64>> {
    let q = complex_eigenvector(jac_x, Complex::new(0.0, omega))?;
    let mut direction: DVector<f64> = q.map(|z| z.re);
    if direction.norm() < 1e-8 {
        direction = q.map(|z| z.im);
    }
    let norm = direction.norm();
    if norm == 0.0 {
        bail!("Hopf eigenvector is degenerate");
    }
    Ok(direction / norm)
}

/// Monodromy matrix M = ∂φ_T/∂x0 from the state block of a shooting
/// Jacobian, whose entries are M − I.
pub fn monodromy_from_jacobian(jac: &DMatrix<f64>, n: usize) -> DMatrix<f64> {
    jac.view((0, 0), (n, n)).into_owned() + DMatrix::identity(n, n)
}

/// Periodic orbits of a flow continued in one parameter.
pub struct LimitCycleProblem<S: VectorField> {
    shooting: Shooting<S>,
    params: Vec<f64>,
    axis: ParamAxis,
    x0: Vec<f64>,
    period: f64,
    domain: DomainBox,
    seed_direction: Option<DVector<f64>>,
}

pub struct LimitCycleCache {
    shooting: ShootingCache,
    params: Vec<f64>,
}

impl<S: VectorField> LimitCycleProblem<S> {
    pub fn new(
        system: Arc<S>,
        params: Vec<f64>,
        axis: ParamAxis,
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
        if axis.index >= params.len() {
            return Err(ContinuationError::DimensionMismatch {
                expected: params.len(),
                actual: axis.index + 1,
            });
        }
        if !(period > 0.0) {
            return Err(ContinuationError::InvalidSettings(format!(
                "period must be positive, got {period}"
            )));
        }
        let shooting = Shooting::new(system, steps, x0.clone(), &params)?;
        let domain = DomainBox::unbounded(n + 2)
            .with_bounds(n, 0.0, f64::INFINITY)
            .with_bounds(n + 1, axis.lower, axis.upper);
        Ok(Self {
            shooting,
            params,
            axis,
            x0,
            period,
            domain,
            seed_direction: None,
        })
    }

    /// Seeds a cycle near a Hopf point `(x_star, params)` with frequency
    /// `omega`, displaced by `amplitude` along the real part of the critical
    /// eigenvector, with period 2π/ω. Snapping the seed keeps the amplitude
    /// component fixed so the corrector does not fall back onto the
    /// equilibrium.
    #[allow(clippy::too_many_arguments)]
    pub fn from_hopf(
        system: Arc<S>,
        params: Vec<f64>,
        axis: ParamAxis,
        x_star: &[f64],
        jac_x: &DMatrix<f64>,
        omega: f64,
        amplitude: f64,
        steps: usize,
    ) -> Result<Self, ContinuationError> {
        if !(amplitude > 0.0) {
            return Err(ContinuationError::InvalidSettings(
                "amplitude must be positive".to_string(),
            ));
        }
        if !(omega > 0.0) {
            return Err(ContinuationError::InvalidSettings(
                "Hopf frequency must be positive".to_string(),
            ));
        }
        let n = x_star.len();
        let direction = hopf_displacement(jac_x, omega)?;
        let x0: Vec<f64> = x_star
            .iter()
            .zip(direction.iter())
            .map(|(x, d)| x + amplitude * d)
            .collect();
        let mut problem = Self::new(system, params, axis, x0, 2.0 * PI / omega, steps)?;
        let mut seed = DVector::zeros(n + 2);
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

    pub fn axis(&self) -> &ParamAxis {
        &self.axis
    }

    /// Full parameter vector at a point `u` of this problem.
    pub fn params_at(&self, u: &DVector<f64>) -> Vec<f64> {
        let mut params = self.params.clone();
        params[self.axis.index] = u[self.state_dim() + 1];
        params
    }
}

impl<S: VectorField> ContinuationProblem for LimitCycleProblem<S> {
    type Cache = LimitCycleCache;

    fn dimension(&self) -> usize {
        self.state_dim() + 1
    }

    fn codimension(&self) -> Codimension {
        Codimension::One
    }

    fn initial_point(&self) -> DVector<f64> {
        let n = self.state_dim();
        let mut u = DVector::zeros(n + 2);
        u.rows_mut(0, n).copy_from_slice(&self.x0);
        u[n] = self.period;
        u[n + 1] = self.params[self.axis.index];
        u
    }

    fn domain(&self) -> &DomainBox {
        &self.domain
    }

    fn new_cache(&self) -> LimitCycleCache {
        LimitCycleCache {
            shooting: self.shooting.new_cache(),
            params: self.params.clone(),
        }
    }

    fn residual(
        &self,
        u: &DVector<f64>,
        cache: &mut LimitCycleCache,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        let n = self.state_dim();
        cache.params[self.axis.index] = u[n + 1];
        self.shooting.residual(
            &u.as_slice()[..n],
            u[n],
            &cache.params,
            &mut cache.shooting,
            out.as_mut_slice(),
        );
        Ok(())
    }

    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        cache: &mut LimitCycleCache,
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()> {
        self.residual(u, cache, out)?;
        let n = self.state_dim();
        self.shooting.jacobian(
            &u.as_slice()[..n],
            u[n],
            &cache.params,
            &[self.axis.index],
            &mut cache.shooting,
            jac,
        );
        Ok(())
    }

    fn test_functions(&self) -> Vec<TestFunction> {
        vec![TestFunction::CycleFold, TestFunction::PeriodDoubling]
    }

    fn evaluate_tests(
        &self,
        _u: &DVector<f64>,
        tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        _cache: &mut LimitCycleCache,
        out: &mut [f64],
    ) -> Result<()> {
        let n = self.state_dim();
        out[0] = tangent[n + 1];
        let shifted = monodromy_from_jacobian(jac, n) + DMatrix::identity(n, n);
        out[1] = shifted.determinant();
        Ok(())
    }

    fn auxiliary(
        &self,
        _u: &DVector<f64>,
        _tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        _cache: &mut LimitCycleCache,
    ) -> Result<AuxiliaryValues> {
        let n = self.state_dim();
        Ok(AuxiliaryValues {
            eigenvalues: compute_eigenvalues(&monodromy_from_jacobian(jac, n))?,
            ..AuxiliaryValues::default()
        })
    }

    fn seed_direction(&self) -> Option<DVector<f64>> {
        self.seed_direction.clone()
    }
}
