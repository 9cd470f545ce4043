use std::sync::Arc;

use anyhow::Result;
use nalgebra::{DMatrix, DVector};

use super::homotopy::augmented_determinant;
use super::normal_form::first_lyapunov_coefficient;
use super::problem::{ContinuationProblem, DomainBox, ParamAxis};
use super::types::{AuxiliaryValues, Codimension, TestFunction};
use super::util::{
    bialternate_test_function, compute_eigenvalues, critical_sum_pair,
    multiplier_product_test_function,
};
use crate::error::ContinuationError;
use crate::traits::{SystemKind, VectorField};

/// Minimum |Im λ| for computing a Lyapunov coefficient at a localized point.
const HOPF_FREQUENCY_FLOOR: f64 = 1e-8;

/// Equilibria of a flow, f(x, p) = 0, or fixed points of a map,
/// f(x, p) − x = 0, continued in one parameter.
pub struct FixedPointProblem<S: VectorField> {
    system: Arc<S>,
    kind: SystemKind,
    params: Vec<f64>,
    axis: ParamAxis,
    x0: Vec<f64>,
    domain: DomainBox,
}

pub struct FixedPointCache {
    params: Vec<f64>,
    jac_x: DMatrix<f64>,
    dparam: DVector<f64>,
}

impl<S: VectorField> FixedPointProblem<S> {
    /// `params` holds every model parameter; `axis` selects the one varied
    /// and its admissible range. The seed parameter value is
    /// `params[axis.index]`.
    pub fn new(
        system: Arc<S>,
        kind: SystemKind,
        params: Vec<f64>,
        axis: ParamAxis,
        x0: Vec<f64>,
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
        let domain = DomainBox::unbounded(n + 1).with_bounds(n, axis.lower, axis.upper);
        Ok(Self {
            system,
            kind,
            params,
            axis,
            x0,
            domain,
        })
    }

    /// Bounds on the state variables.
    pub fn with_phase_space(mut self, lower: &[f64], upper: &[f64]) -> Self {
        let n = self.state_dim();
        for i in 0..n.min(lower.len()).min(upper.len()) {
            self.domain = self.domain.with_bounds(i, lower[i], upper[i]);
        }
        self
    }

    pub fn state_dim(&self) -> usize {
        self.x0.len()
    }

    pub fn system(&self) -> &Arc<S> {
        &self.system
    }

    pub fn kind(&self) -> SystemKind {
        self.kind
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
        params[self.axis.index] = u[self.state_dim()];
        params
    }

    fn with_param<'c>(&self, u: &DVector<f64>, cache: &'c mut FixedPointCache) -> &'c [f64] {
        cache.params[self.axis.index] = u[self.state_dim()];
        &cache.params
    }

    /// Jacobian of f itself (the map, not the residual), for eigenvalues.
    fn system_jacobian(&self, jac: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.state_dim();
        let mut jx = jac.columns(0, n).into_owned();
        if self.kind.is_map() {
            for i in 0..n {
                jx[(i, i)] += 1.0;
            }
        }
        jx
    }
}

impl<S: VectorField> ContinuationProblem for FixedPointProblem<S> {
    type Cache = FixedPointCache;

    fn dimension(&self) -> usize {
        self.state_dim()
    }

    fn codimension(&self) -> Codimension {
        Codimension::One
    }

    fn initial_point(&self) -> DVector<f64> {
        let n = self.state_dim();
        let mut u = DVector::zeros(n + 1);
        u.rows_mut(0, n).copy_from_slice(&self.x0);
        u[n] = self.params[self.axis.index];
        u
    }

    fn domain(&self) -> &DomainBox {
        &self.domain
    }

    fn new_cache(&self) -> FixedPointCache {
        let n = self.state_dim();
        FixedPointCache {
            params: self.params.clone(),
            jac_x: DMatrix::zeros(n, n),
            dparam: DVector::zeros(n),
        }
    }

    fn residual(
        &self,
        u: &DVector<f64>,
        cache: &mut FixedPointCache,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        let n = self.state_dim();
        let params = self.with_param(u, cache);
        let x = &u.as_slice()[..n];
        self.system.evaluate(0.0, x, params, out.as_mut_slice());
        if self.kind.is_map() {
            for i in 0..n {
                out[i] -= x[i];
            }
        }
        Ok(())
    }

    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        cache: &mut FixedPointCache,
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()> {
        self.residual(u, cache, out)?;
        let n = self.state_dim();
        let x = &u.as_slice()[..n];
        let FixedPointCache {
            params,
            jac_x,
            dparam,
        } = cache;
        self.system.state_jacobian(x, params, jac_x);
        self.system
            .param_derivative(x, params, self.axis.index, dparam);
        jac.view_mut((0, 0), (n, n)).copy_from(jac_x);
        if self.kind.is_map() {
            for i in 0..n {
                jac[(i, i)] -= 1.0;
            }
        }
        jac.column_mut(n).copy_from(dparam);
        Ok(())
    }

    fn test_functions(&self) -> Vec<TestFunction> {
        let mut tests = vec![TestFunction::Fold, TestFunction::BranchPoint];
        match self.kind {
            SystemKind::Flow if self.state_dim() >= 2 => tests.push(TestFunction::Bialternate),
            SystemKind::Map => {
                tests.push(TestFunction::PeriodDoubling);
                if self.state_dim() >= 2 {
                    tests.push(TestFunction::NeimarkSacker);
                }
            }
            _ => {}
        }
        tests
    }

    fn evaluate_tests(
        &self,
        _u: &DVector<f64>,
        tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        _cache: &mut FixedPointCache,
        out: &mut [f64],
    ) -> Result<()> {
        let n = self.state_dim();
        out[0] = tangent[n];
        out[1] = augmented_determinant(jac, tangent);
        if out.len() == 2 {
            return Ok(());
        }
        let jx = self.system_jacobian(jac);
        let eigenvalues = compute_eigenvalues(&jx).ok();
        match self.kind {
            SystemKind::Flow => {
                out[2] = eigenvalues
                    .as_deref()
                    .map_or(f64::NAN, bialternate_test_function);
            }
            SystemKind::Map => {
                let shifted = &jx + DMatrix::identity(n, n);
                out[2] = shifted.determinant();
                if out.len() > 3 {
                    out[3] = eigenvalues
                        .as_deref()
                        .map_or(f64::NAN, multiplier_product_test_function);
                }
            }
        }
        Ok(())
    }

    fn auxiliary(
        &self,
        u: &DVector<f64>,
        _tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        cache: &mut FixedPointCache,
    ) -> Result<AuxiliaryValues> {
        let n = self.state_dim();
        let jx = self.system_jacobian(jac);
        let eigenvalues = compute_eigenvalues(&jx)?;
        let mut aux = AuxiliaryValues {
            eigenvalues,
            ..AuxiliaryValues::default()
        };
        if self.kind == SystemKind::Flow {
            if let Some((a, _)) = critical_sum_pair(&aux.eigenvalues) {
                let omega = a.im.abs();
                if omega > HOPF_FREQUENCY_FLOOR {
                    aux.omega = Some(omega);
                    let params = self.with_param(u, cache).to_vec();
                    aux.lyapunov_coefficient = first_lyapunov_coefficient(
                        self.system.as_ref(),
                        &u.as_slice()[..n],
                        &params,
                        &jx,
                        omega,
                    )
                    .ok();
                }
            }
        }
        Ok(aux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Scalar;

    /// ẋ = p − x², ẏ = −10 y.
    struct Fold2;

    impl VectorField for Fold2 {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate<T: Scalar>(&self, _t: T, x: &[T], p: &[T], out: &mut [T]) {
            out[0] = p[0] - x[0] * x[0];
            out[1] = T::from_f64(-10.0) * x[1];
        }
    }

    /// Logistic map x ↦ r x (1 − x).
    struct Logistic;

    impl VectorField for Logistic {
        fn dimension(&self) -> usize {
            1
        }

        fn evaluate<T: Scalar>(&self, _t: T, x: &[T], p: &[T], out: &mut [T]) {
            out[0] = p[0] * x[0] * (T::one() - x[0]);
        }
    }

    fn tests_at<S: VectorField>(problem: &FixedPointProblem<S>, u: DVector<f64>) -> Vec<f64> {
        let n = problem.dimension();
        let mut cache = problem.new_cache();
        let mut out = DVector::zeros(n);
        let mut jac = DMatrix::zeros(n, n + 1);
        problem
            .residual_jacobian(&u, &mut cache, &mut out, &mut jac)
            .expect("jacobian");
        let mut tangent = DVector::zeros(n + 1);
        tangent[n] = 1.0;
        let mut values = vec![0.0; problem.test_functions().len()];
        problem
            .evaluate_tests(&u, &tangent, &jac, &mut cache, &mut values)
            .expect("tests");
        values
    }

    #[test]
    fn extended_jacobian_puts_parameter_last() {
        let problem = FixedPointProblem::new(
            Arc::new(Fold2),
            SystemKind::Flow,
            vec![0.25],
            ParamAxis::new(0, "p"),
            vec![0.5, 0.0],
        )
        .expect("problem");
        let u = problem.initial_point();
        assert_eq!(u.as_slice(), &[0.5, 0.0, 0.25]);

        let mut cache = problem.new_cache();
        let mut out = DVector::zeros(2);
        let mut jac = DMatrix::zeros(2, 3);
        problem
            .residual_jacobian(&u, &mut cache, &mut out, &mut jac)
            .expect("jacobian");
        assert!(out.norm() < 1e-15);
        let expected = DMatrix::from_row_slice(2, 3, &[-1.0, 0.0, 1.0, 0.0, -10.0, 0.0]);
        assert!((jac - expected).abs().max() < 1e-14);
        assert_eq!(
            problem.test_functions(),
            vec![
                TestFunction::Fold,
                TestFunction::BranchPoint,
                TestFunction::Bialternate
            ]
        );
    }

    #[test]
    fn rejects_mismatched_seed() {
        let err = FixedPointProblem::new(
            Arc::new(Fold2),
            SystemKind::Flow,
            vec![0.25],
            ParamAxis::new(0, "p"),
            vec![0.5],
        )
        .err()
        .expect("dimension error");
        assert!(matches!(
            err,
            ContinuationError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn map_period_doubling_test_changes_sign_at_r_three() {
        let problem = FixedPointProblem::new(
            Arc::new(Logistic),
            SystemKind::Map,
            vec![2.9],
            ParamAxis::new(0, "r"),
            vec![1.0 - 1.0 / 2.9],
        )
        .expect("problem");
        assert_eq!(
            problem.test_functions(),
            vec![
                TestFunction::Fold,
                TestFunction::BranchPoint,
                TestFunction::PeriodDoubling
            ]
        );
        let below = tests_at(&problem, DVector::from_vec(vec![1.0 - 1.0 / 2.9, 2.9]));
        let above = tests_at(&problem, DVector::from_vec(vec![1.0 - 1.0 / 3.1, 3.1]));
        // multiplier 2 − r, so det(Df + I) = 3 − r
        assert!((below[2] - 0.1).abs() < 1e-12);
        assert!((above[2] + 0.1).abs() < 1e-12);
    }
}
