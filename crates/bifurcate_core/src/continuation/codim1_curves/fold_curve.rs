//! Saddle-node curve continuation in two parameters.
//!
//! # Defining system
//!
//! ```text
//! f(x, p1, p2)      = 0      (n equations)
//! A(x, p1, p2) v    = 0      (n equations)
//! ⟨c, v⟩ − 1        = 0      (1 equation)
//! ```
//!
//! where A = f_x and c is the null vector found at the seed. Unknowns are
//! (x, v, p1, p2), so the curve lives in R^(2n+2).
//!
//! Codim-2 tests along the curve: the coefficient Σᵢ∏_{j≠i}λⱼ vanishes when
//! the zero eigenvalue becomes double (Bogdanov–Takens), and wᵀB(v, v) with
//! Aᵀw = 0 vanishes at a cusp. The adjoint w is normalized against its value
//! at the seed rather than against v, since w ⟂ v at a Bogdanov–Takens point.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use nalgebra::{DMatrix, DVector};

use super::ParamPlane;
use crate::autodiff::jacobian_vector_product;
use crate::continuation::normal_form::Multilinear;
use crate::continuation::problem::{ContinuationProblem, DomainBox};
use crate::continuation::types::{AuxiliaryValues, Codimension, TestFunction};
use crate::continuation::util::{
    compute_eigenvalues, finite_difference_jacobian, simple_zero_test_function,
    smallest_singular_vector,
};
use crate::error::ContinuationError;
use crate::traits::VectorField;

pub struct SaddleNodeCurveProblem<S: VectorField> {
    system: Arc<S>,
    params: Vec<f64>,
    plane: ParamPlane,
    x0: Vec<f64>,
    v0: Vec<f64>,
    border: Vec<f64>,
    /// Left null vector of A at the seed, oriented along `v0`.
    adjoint: Vec<f64>,
    domain: DomainBox,
}

pub struct SaddleNodeCurveCache {
    params: Vec<f64>,
    zero_params: Vec<f64>,
    jac_x: DMatrix<f64>,
}

impl<S: VectorField> SaddleNodeCurveProblem<S> {
    /// Seeds the curve at a saddle-node `(x0, params)`; the null vector of
    /// f_x there fixes the border.
    pub fn new(
        system: Arc<S>,
        params: Vec<f64>,
        plane: ParamPlane,
        x0: Vec<f64>,
    ) -> Result<Self, ContinuationError> {
        let n = system.dimension();
        if x0.len() != n {
            return Err(ContinuationError::DimensionMismatch {
                expected: n,
                actual: x0.len(),
            });
        }
        plane.check(&params)?;
        let mut jac_x = DMatrix::zeros(n, n);
        system.state_jacobian(&x0, &params, &mut jac_x);
        let v0 = smallest_singular_vector(&jac_x)?;
        let mut adjoint = smallest_singular_vector(&jac_x.transpose())?;
        if adjoint.dot(&v0) < 0.0 {
            adjoint.neg_mut();
        }
        let v0: Vec<f64> = v0.iter().copied().collect();
        let domain = plane.domain(2 * n + 2);
        Ok(Self {
            system,
            params,
            plane,
            x0,
            border: v0.clone(),
            v0,
            adjoint: adjoint.iter().copied().collect(),
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

    /// wᵀB(v, v) with w solving the bordered adjoint system
    /// [Aᵀ v; w0ᵀ 0] [w; s] = [0; 1], w0 the seed adjoint.
    fn cusp_coefficient(
        &self,
        x: &[f64],
        v: &[f64],
        params: &[f64],
        jac_x: &DMatrix<f64>,
    ) -> Result<f64> {
        let n = self.state_dim();
        let mut bordered = DMatrix::zeros(n + 1, n + 1);
        bordered
            .view_mut((0, 0), (n, n))
            .copy_from(&jac_x.transpose());
        for i in 0..n {
            bordered[(i, n)] = v[i];
            bordered[(n, i)] = self.adjoint[i];
        }
        let mut rhs = DVector::zeros(n + 1);
        rhs[n] = 1.0;
        let solution = bordered
            .lu()
            .solve(&rhs)
            .ok_or_else(|| anyhow!("Bordered adjoint system is singular"))?;
        let b_vv = Multilinear::new(self.system.as_ref(), x, params).bilinear(v, v);
        Ok(solution.rows(0, n).dot(&b_vv))
    }

    fn load_jacobian(&self, u: &DVector<f64>, cache: &mut SaddleNodeCurveCache) {
        let n = self.state_dim();
        self.plane.apply(u, &mut cache.params);
        self.system
            .state_jacobian(&u.as_slice()[..n], &cache.params, &mut cache.jac_x);
    }
}

impl<S: VectorField> ContinuationProblem for SaddleNodeCurveProblem<S> {
    type Cache = SaddleNodeCurveCache;

    fn dimension(&self) -> usize {
        2 * self.state_dim() + 1
    }

    fn codimension(&self) -> Codimension {
        Codimension::Two
    }

    fn initial_point(&self) -> DVector<f64> {
        let n = self.state_dim();
        let mut u = DVector::zeros(2 * n + 2);
        u.rows_mut(0, n).copy_from_slice(&self.x0);
        u.rows_mut(n, n).copy_from_slice(&self.v0);
        u[2 * n] = self.params[self.plane.first.index];
        u[2 * n + 1] = self.params[self.plane.second.index];
        u
    }

    fn domain(&self) -> &DomainBox {
        &self.domain
    }

    fn new_cache(&self) -> SaddleNodeCurveCache {
        let n = self.state_dim();
        SaddleNodeCurveCache {
            params: self.params.clone(),
            zero_params: vec![0.0; self.params.len()],
            jac_x: DMatrix::zeros(n, n),
        }
    }

    fn residual(
        &self,
        u: &DVector<f64>,
        cache: &mut SaddleNodeCurveCache,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        let n = self.state_dim();
        self.plane.apply(u, &mut cache.params);
        let x = &u.as_slice()[..n];
        let v = &u.as_slice()[n..2 * n];
        let out = out.as_mut_slice();
        self.system.evaluate(0.0, x, &cache.params, &mut out[..n]);
        jacobian_vector_product(
            self.system.as_ref(),
            x,
            v,
            &cache.params,
            &cache.zero_params,
            &mut out[n..2 * n],
        );
        out[2 * n] = self.border.iter().zip(v).map(|(c, v)| c * v).sum::<f64>() - 1.0;
        Ok(())
    }

    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        cache: &mut SaddleNodeCurveCache,
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()> {
        self.residual(u, cache, out)?;
        finite_difference_jacobian(|w, o| self.residual(w, cache, o), u, jac)
    }

    fn test_functions(&self) -> Vec<TestFunction> {
        vec![TestFunction::BogdanovTakens, TestFunction::Cusp]
    }

    fn evaluate_tests(
        &self,
        u: &DVector<f64>,
        _tangent: &DVector<f64>,
        _jac: &DMatrix<f64>,
        cache: &mut SaddleNodeCurveCache,
        out: &mut [f64],
    ) -> Result<()> {
        let n = self.state_dim();
        self.load_jacobian(u, cache);
        out[0] = compute_eigenvalues(&cache.jac_x)
            .map_or(f64::NAN, |eigs| simple_zero_test_function(&eigs));
        out[1] = self
            .cusp_coefficient(
                &u.as_slice()[..n],
                &u.as_slice()[n..2 * n],
                &cache.params,
                &cache.jac_x,
            )
            .unwrap_or(f64::NAN);
        Ok(())
    }

    fn auxiliary(
        &self,
        u: &DVector<f64>,
        _tangent: &DVector<f64>,
        _jac: &DMatrix<f64>,
        cache: &mut SaddleNodeCurveCache,
    ) -> Result<AuxiliaryValues> {
        let n = self.state_dim();
        self.load_jacobian(u, cache);
        let eigenvalues = compute_eigenvalues(&cache.jac_x)?;
        let bogdanov_takens_test = Some(simple_zero_test_function(&eigenvalues));
        let cusp_coefficient = self
            .cusp_coefficient(
                &u.as_slice()[..n],
                &u.as_slice()[n..2 * n],
                &cache.params,
                &cache.jac_x,
            )
            .ok();
        Ok(AuxiliaryValues {
            eigenvalues,
            cusp_coefficient,
            bogdanov_takens_test,
            ..AuxiliaryValues::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::problem::ParamAxis;
    use crate::continuation::test_systems::{BogdanovTakensNormalForm, CuspNormalForm};

    fn plane() -> ParamPlane {
        ParamPlane::new(
            ParamAxis::new(0, "beta1").with_range(-5.0, 5.0),
            ParamAxis::new(1, "beta2").with_range(-5.0, 5.0),
        )
        .expect("plane")
    }

    fn tests_at<S: VectorField>(problem: &SaddleNodeCurveProblem<S>, u: &DVector<f64>) -> Vec<f64> {
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
    fn seed_satisfies_defining_system() {
        // saddle-node of the cusp normal form at x = 1, β = (−2, 3)
        let problem = SaddleNodeCurveProblem::new(
            Arc::new(CuspNormalForm),
            vec![-2.0, 3.0],
            plane(),
            vec![1.0],
        )
        .expect("problem");
        let u = problem.initial_point();
        assert_eq!(u.len(), 4);
        assert_eq!(problem.dimension(), 3);
        let mut cache = problem.new_cache();
        let residual = problem.residual_vec(&u, &mut cache).expect("residual");
        assert!(residual.norm() < 1e-12);

        let mut out = DVector::zeros(3);
        let mut jac = DMatrix::zeros(3, 4);
        problem
            .residual_jacobian(&u, &mut cache, &mut out, &mut jac)
            .expect("jacobian");
        // row of f: (β2 − 3x², 0, 1, x)
        assert!(jac[(0, 0)].abs() < 1e-8);
        assert!((jac[(0, 2)] - 1.0).abs() < 1e-8);
        assert!((jac[(0, 3)] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn cusp_test_changes_sign_through_the_cusp() {
        let problem = SaddleNodeCurveProblem::new(
            Arc::new(CuspNormalForm),
            vec![-2.0, 3.0],
            plane(),
            vec![1.0],
        )
        .expect("problem");
        let v = problem.initial_point()[1];
        // the curve is β1 = −2x³, β2 = 3x²
        let on_curve = |x: f64| DVector::from_vec(vec![x, v, -2.0 * x.powi(3), 3.0 * x * x]);
        let right = tests_at(&problem, &on_curve(0.5));
        let left = tests_at(&problem, &on_curve(-0.5));
        // n = 1: w = 1/w0 with w0 = v, so wᵀB(v, v) = −6xv
        assert!((right[1] + 3.0 * v).abs() < 1e-6);
        assert!(right[1] * left[1] < 0.0);
        // a single eigenvalue leaves an empty product
        assert!((right[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bogdanov_takens_test_follows_the_trace() {
        let problem = SaddleNodeCurveProblem::new(
            Arc::new(BogdanovTakensNormalForm),
            vec![0.0, 0.3],
            plane(),
            vec![0.0, 0.0],
        )
        .expect("problem");
        let mut u = problem.initial_point();
        assert!(u[2].abs() > 0.99 && u[3].abs() < 1e-12);
        let above = tests_at(&problem, &u);
        u[5] = -0.3;
        let below = tests_at(&problem, &u);
        assert!((above[0] - 0.3).abs() < 1e-10);
        assert!((below[0] + 0.3).abs() < 1e-10);
        // the cusp test stays finite and keeps its sign through the double zero
        assert!(above[1].is_finite() && below[1].is_finite());
        assert!(above[1] * below[1] > 0.0);
    }
}
