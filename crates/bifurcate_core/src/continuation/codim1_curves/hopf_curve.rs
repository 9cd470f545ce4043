//! Hopf curve continuation in two parameters.
//!
//! # Defining system
//!
//! ```text
//! f(x, p1, p2)          = 0      (n equations)
//! (A² + κ I) v          = 0      (n equations)
//! ⟨c, v⟩ − 1            = 0
//! ⟨c, A v⟩              = 0
//! ```
//!
//! Unknowns are (x, v, κ, p1, p2). On the Hopf side κ = ω² > 0; the same
//! curve continues through κ < 0 as a neutral saddle curve. κ changing sign
//! marks a Bogdanov–Takens point and the first Lyapunov coefficient changing
//! sign marks a Bautin point.

use std::sync::Arc;

use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

use super::ParamPlane;
use crate::autodiff::jacobian_vector_product;
use crate::continuation::normal_form::first_lyapunov_coefficient;
use crate::continuation::problem::{ContinuationProblem, DomainBox};
use crate::continuation::types::{AuxiliaryValues, Codimension, TestFunction};
use crate::continuation::util::{
    complex_eigenvector, compute_eigenvalues, finite_difference_jacobian,
};
use crate::error::ContinuationError;
use crate::traits::VectorField;

pub struct HopfCurveProblem<S: VectorField> {
    system: Arc<S>,
    params: Vec<f64>,
    plane: ParamPlane,
    x0: Vec<f64>,
    v0: Vec<f64>,
    kappa0: f64,
    border: Vec<f64>,
    domain: DomainBox,
}

pub struct HopfCurveCache {
    params: Vec<f64>,
    zero_params: Vec<f64>,
    av: Vec<f64>,
    jac_x: DMatrix<f64>,
}

impl<S: VectorField> HopfCurveProblem<S> {
    /// Seeds the curve at a Hopf point `(x0, params)` with frequency `omega`.
    ///
    /// The seed vector is the combination of Re q and Im q orthogonal to its
    /// own image under A, so both border conditions hold exactly.
    pub fn new(
        system: Arc<S>,
        params: Vec<f64>,
        plane: ParamPlane,
        x0: Vec<f64>,
        omega: f64,
    ) -> Result<Self, ContinuationError> {
        let n = system.dimension();
        if x0.len() != n {
            return Err(ContinuationError::DimensionMismatch {
                expected: n,
                actual: x0.len(),
            });
        }
        plane.check(&params)?;
        if !(omega > 0.0) {
            return Err(ContinuationError::InvalidSettings(format!(
                "Hopf frequency must be positive, got {omega}"
            )));
        }
        let mut jac_x = DMatrix::zeros(n, n);
        system.state_jacobian(&x0, &params, &mut jac_x);
        let q = complex_eigenvector(&jac_x, Complex::new(0.0, omega))?;
        let a: DVector<f64> = q.map(|z| z.re);
        let b: DVector<f64> = q.map(|z| z.im);
        let theta = 0.5 * (2.0 * a.dot(&b)).atan2(a.norm_squared() - b.norm_squared());
        let v = a * theta.cos() + b * theta.sin();
        let border = &v / v.norm_squared();
        Self::with_vectors(
            system,
            params,
            plane,
            x0,
            v.iter().copied().collect(),
            omega * omega,
            border.iter().copied().collect(),
        )
    }

    /// Seeds the curve at a Bogdanov–Takens point, where κ = 0 and `v` is
    /// the null vector of A. The border is v/|v|², so both border
    /// conditions hold there.
    pub fn from_bogdanov_takens(
        system: Arc<S>,
        params: Vec<f64>,
        plane: ParamPlane,
        x0: Vec<f64>,
        v: Vec<f64>,
    ) -> Result<Self, ContinuationError> {
        let n = system.dimension();
        if x0.len() != n || v.len() != n {
            return Err(ContinuationError::DimensionMismatch {
                expected: n,
                actual: if x0.len() != n { x0.len() } else { v.len() },
            });
        }
        plane.check(&params)?;
        let norm_sq: f64 = v.iter().map(|c| c * c).sum();
        if !(norm_sq > 0.0) {
            return Err(ContinuationError::InvalidSettings(
                "Bogdanov-Takens null vector is zero".to_string(),
            ));
        }
        let border = v.iter().map(|c| c / norm_sq).collect();
        Self::with_vectors(system, params, plane, x0, v, 0.0, border)
    }

    fn with_vectors(
        system: Arc<S>,
        params: Vec<f64>,
        plane: ParamPlane,
        x0: Vec<f64>,
        v0: Vec<f64>,
        kappa0: f64,
        border: Vec<f64>,
    ) -> Result<Self, ContinuationError> {
        let n = x0.len();
        let domain = plane.domain(2 * n + 3);
        Ok(Self {
            system,
            params,
            plane,
            x0,
            v0,
            kappa0,
            border,
            domain,
        })
    }

    pub fn state_dim(&self) -> usize {
        self.x0.len()
    }

    pub fn system(&self) -> &Arc<S> {
        &self.system
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

    fn lyapunov(&self, u: &DVector<f64>, cache: &mut HopfCurveCache) -> Option<f64> {
        let n = self.state_dim();
        let kappa = u[2 * n];
        if !(kappa > 0.0) {
            return None;
        }
        self.plane.apply(u, &mut cache.params);
        let x = &u.as_slice()[..n];
        self.system.state_jacobian(x, &cache.params, &mut cache.jac_x);
        first_lyapunov_coefficient(
            self.system.as_ref(),
            x,
            &cache.params,
            &cache.jac_x,
            kappa.sqrt(),
        )
        .ok()
    }
}

impl<S: VectorField> ContinuationProblem for HopfCurveProblem<S> {
    type Cache = HopfCurveCache;

    fn dimension(&self) -> usize {
        2 * self.state_dim() + 2
    }

    fn codimension(&self) -> Codimension {
        Codimension::Two
    }

    fn initial_point(&self) -> DVector<f64> {
        let n = self.state_dim();
        let mut u = DVector::zeros(2 * n + 3);
        u.rows_mut(0, n).copy_from_slice(&self.x0);
        u.rows_mut(n, n).copy_from_slice(&self.v0);
        u[2 * n] = self.kappa0;
        u[2 * n + 1] = self.params[self.plane.first.index];
        u[2 * n + 2] = self.params[self.plane.second.index];
        u
    }

    fn domain(&self) -> &DomainBox {
        &self.domain
    }

    fn new_cache(&self) -> HopfCurveCache {
        let n = self.state_dim();
        HopfCurveCache {
            params: self.params.clone(),
            zero_params: vec![0.0; self.params.len()],
            av: vec![0.0; n],
            jac_x: DMatrix::zeros(n, n),
        }
    }

    fn residual(
        &self,
        u: &DVector<f64>,
        cache: &mut HopfCurveCache,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        let n = self.state_dim();
        self.plane.apply(u, &mut cache.params);
        let x = &u.as_slice()[..n];
        let v = &u.as_slice()[n..2 * n];
        let kappa = u[2 * n];
        let out = out.as_mut_slice();
        let HopfCurveCache {
            params,
            zero_params,
            av,
            ..
        } = cache;

        self.system.evaluate(0.0, x, params.as_slice(), &mut out[..n]);
        jacobian_vector_product(self.system.as_ref(), x, v, params, zero_params, av);
        jacobian_vector_product(
            self.system.as_ref(),
            x,
            av,
            params,
            zero_params,
            &mut out[n..2 * n],
        );
        for i in 0..n {
            out[n + i] += kappa * v[i];
        }
        out[2 * n] = self.border.iter().zip(v).map(|(c, v)| c * v).sum::<f64>() - 1.0;
        out[2 * n + 1] = self.border.iter().zip(av.iter()).map(|(c, a)| c * a).sum();
        Ok(())
    }

    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        cache: &mut HopfCurveCache,
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()> {
        self.residual(u, cache, out)?;
        finite_difference_jacobian(|w, o| self.residual(w, cache, o), u, jac)
    }

    fn test_functions(&self) -> Vec<TestFunction> {
        vec![TestFunction::BogdanovTakens, TestFunction::Bautin]
    }

    fn evaluate_tests(
        &self,
        u: &DVector<f64>,
        _tangent: &DVector<f64>,
        _jac: &DMatrix<f64>,
        cache: &mut HopfCurveCache,
        out: &mut [f64],
    ) -> Result<()> {
        out[0] = u[2 * self.state_dim()];
        out[1] = self.lyapunov(u, cache).unwrap_or(f64::NAN);
        Ok(())
    }

    fn auxiliary(
        &self,
        u: &DVector<f64>,
        _tangent: &DVector<f64>,
        _jac: &DMatrix<f64>,
        cache: &mut HopfCurveCache,
    ) -> Result<AuxiliaryValues> {
        let n = self.state_dim();
        let kappa = u[2 * n];
        let lyapunov_coefficient = self.lyapunov(u, cache);
        self.plane.apply(u, &mut cache.params);
        self.system
            .state_jacobian(&u.as_slice()[..n], &cache.params, &mut cache.jac_x);
        Ok(AuxiliaryValues {
            eigenvalues: compute_eigenvalues(&cache.jac_x)?,
            omega: (kappa > 0.0).then(|| kappa.sqrt()),
            kappa: Some(kappa),
            lyapunov_coefficient,
            ..AuxiliaryValues::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::problem::ParamAxis;
    use crate::continuation::test_systems::{BautinNormalForm, BogdanovTakensNormalForm};

    fn plane() -> ParamPlane {
        ParamPlane::new(
            ParamAxis::new(0, "beta1").with_range(-1.0, 1.0),
            ParamAxis::new(1, "beta2").with_range(-1.0, 1.0),
        )
        .expect("plane")
    }

    fn tests_at<S: VectorField>(problem: &HopfCurveProblem<S>, u: &DVector<f64>) -> Vec<f64> {
        let mut cache = problem.new_cache();
        let mut values = vec![0.0; 2];
        let tangent = DVector::zeros(u.len());
        let jac = DMatrix::zeros(problem.dimension(), u.len());
        problem
            .evaluate_tests(u, &tangent, &jac, &mut cache, &mut values)
            .expect("tests");
        values
    }

    #[test]
    fn seed_satisfies_both_border_conditions() {
        // Hopf of the Bogdanov–Takens normal form at x = −1/2, β = (−1/4, −1/2)
        let problem = HopfCurveProblem::new(
            Arc::new(BogdanovTakensNormalForm),
            vec![-0.25, -0.5],
            plane(),
            vec![-0.5, 0.0],
            1.0,
        )
        .expect("problem");
        let u = problem.initial_point();
        assert_eq!(u.len(), 7);
        assert_eq!(problem.dimension(), 6);
        let residual = problem
            .residual_vec(&u, &mut problem.new_cache())
            .expect("residual");
        assert!(residual.norm() < 1e-10, "residual {residual}");
        assert!((tests_at(&problem, &u)[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lyapunov_test_changes_sign_at_bautin_point() {
        let problem = HopfCurveProblem::new(
            Arc::new(BautinNormalForm),
            vec![0.0, 0.5],
            plane(),
            vec![0.0, 0.0],
            1.0,
        )
        .expect("problem");
        let mut u = problem.initial_point();
        let above = tests_at(&problem, &u);
        u[6] = -0.5;
        let below = tests_at(&problem, &u);
        // l1 = 2β2/ω for this normal form
        assert!((above[1] - 1.0).abs() < 1e-4);
        assert!((below[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn lyapunov_test_is_undefined_on_neutral_saddle_side() {
        let problem = HopfCurveProblem::new(
            Arc::new(BautinNormalForm),
            vec![0.0, 0.5],
            plane(),
            vec![0.0, 0.0],
            1.0,
        )
        .expect("problem");
        let mut u = problem.initial_point();
        u[4] = -0.2;
        let values = tests_at(&problem, &u);
        assert_eq!(values[0], -0.2);
        assert!(values[1].is_nan());
    }
}
