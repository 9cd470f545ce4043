//! Closure-backed homotopy H(x, t) = 0.
//!
//! The user supplies H either in mutate-in-place or in returning form; both
//! are normalized to the buffer-mutating contract of
//! [`ContinuationProblem`]. Without an explicit Jacobian, central finite
//! differences are used.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};

use super::problem::{ContinuationProblem, DomainBox};
use super::types::{AuxiliaryValues, Codimension, TestFunction};
use super::util::{compute_eigenvalues, finite_difference_jacobian};
use crate::error::ContinuationError;

type InPlaceFn = dyn Fn(&[f64], f64, &mut [f64]) -> Result<()> + Send + Sync;
type ReturningFn = dyn Fn(&[f64], f64) -> Result<Vec<f64>> + Send + Sync;
type JacobianFn = dyn Fn(&[f64], f64, &mut DMatrix<f64>) -> Result<()> + Send + Sync;

enum Residual {
    InPlace(Box<InPlaceFn>),
    Returning(Box<ReturningFn>),
}

pub struct HomotopyProblem {
    dim: usize,
    residual: Residual,
    jacobian: Option<Box<JacobianFn>>,
    x0: Vec<f64>,
    t0: f64,
    domain: DomainBox,
}

impl HomotopyProblem {
    /// H given as `f(x, t, out)`.
    pub fn in_place<F>(x0: Vec<f64>, t0: f64, f: F) -> Self
    where
        F: Fn(&[f64], f64, &mut [f64]) -> Result<()> + Send + Sync + 'static,
    {
        Self::build(x0, t0, Residual::InPlace(Box::new(f)))
    }

    /// H given as `f(x, t) -> value`.
    pub fn returning<F>(x0: Vec<f64>, t0: f64, f: F) -> Self
    where
        F: Fn(&[f64], f64) -> Result<Vec<f64>> + Send + Sync + 'static,
    {
        Self::build(x0, t0, Residual::Returning(Box::new(f)))
    }

    fn build(x0: Vec<f64>, t0: f64, residual: Residual) -> Self {
        let dim = x0.len();
        Self {
            dim,
            residual,
            jacobian: None,
            x0,
            t0,
            domain: DomainBox::unbounded(dim + 1),
        }
    }

    /// Analytic Jacobian written as an n × (n+1) matrix over (x, t).
    pub fn with_jacobian<J>(mut self, jacobian: J) -> Self
    where
        J: Fn(&[f64], f64, &mut DMatrix<f64>) -> Result<()> + Send + Sync + 'static,
    {
        self.jacobian = Some(Box::new(jacobian));
        self
    }

    pub fn with_phase_space(
        mut self,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Result<Self, ContinuationError> {
        if let Some(bad) = [lower.len(), upper.len()].into_iter().find(|&l| l != self.dim) {
            return Err(ContinuationError::DimensionMismatch {
                expected: self.dim,
                actual: bad,
            });
        }
        for i in 0..self.dim {
            self.domain = self.domain.with_bounds(i, lower[i], upper[i]);
        }
        Ok(self)
    }

    pub fn with_t_domain(mut self, lower: f64, upper: f64) -> Self {
        self.domain = self.domain.with_bounds(self.dim, lower, upper);
        self
    }

    fn evaluate(&self, u: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
        let (x, t) = (&u.as_slice()[..self.dim], u[self.dim]);
        match &self.residual {
            Residual::InPlace(f) => f(x, t, out.as_mut_slice()),
            Residual::Returning(f) => {
                let value = f(x, t)?;
                if value.len() != self.dim {
                    bail!(
                        "Homotopy returned {} components, expected {}",
                        value.len(),
                        self.dim
                    );
                }
                out.as_mut_slice().copy_from_slice(&value);
                Ok(())
            }
        }
    }
}

impl ContinuationProblem for HomotopyProblem {
    type Cache = ();

    fn dimension(&self) -> usize {
        self.dim
    }

    fn codimension(&self) -> Codimension {
        Codimension::One
    }

    fn initial_point(&self) -> DVector<f64> {
        let mut u = DVector::zeros(self.dim + 1);
        u.rows_mut(0, self.dim).copy_from_slice(&self.x0);
        u[self.dim] = self.t0;
        u
    }

    fn domain(&self) -> &DomainBox {
        &self.domain
    }

    fn new_cache(&self) {}

    fn residual(&self, u: &DVector<f64>, _cache: &mut (), out: &mut DVector<f64>) -> Result<()> {
        self.evaluate(u, out)
    }

    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        _cache: &mut (),
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()> {
        self.evaluate(u, out)?;
        match &self.jacobian {
            Some(j) => j(&u.as_slice()[..self.dim], u[self.dim], jac),
            None => finite_difference_jacobian(|v, o| self.evaluate(v, o), u, jac),
        }
    }

    fn test_functions(&self) -> Vec<TestFunction> {
        vec![TestFunction::Fold, TestFunction::BranchPoint]
    }

    fn evaluate_tests(
        &self,
        _u: &DVector<f64>,
        tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        _cache: &mut (),
        out: &mut [f64],
    ) -> Result<()> {
        out[0] = tangent[self.dim];
        out[1] = augmented_determinant(jac, tangent);
        Ok(())
    }

    fn auxiliary(
        &self,
        _u: &DVector<f64>,
        _tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        _cache: &mut (),
    ) -> Result<AuxiliaryValues> {
        let jx = jac.columns(0, self.dim).into_owned();
        Ok(AuxiliaryValues {
            eigenvalues: compute_eigenvalues(&jx).unwrap_or_default(),
            ..AuxiliaryValues::default()
        })
    }
}

/// det([J; tᵀ]); changes sign at simple branch points.
pub fn augmented_determinant(jac: &DMatrix<f64>, tangent: &DVector<f64>) -> f64 {
    let n = jac.nrows();
    let mut bordered = DMatrix::zeros(n + 1, n + 1);
    bordered.view_mut((0, 0), (n, n + 1)).copy_from(jac);
    bordered.row_mut(n).copy_from(&tangent.transpose());
    bordered.determinant()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calling_conventions_agree() {
        let in_place = HomotopyProblem::in_place(vec![0.5], 0.2, |x, t, out| {
            out[0] = x[0] * x[0] + t * t - 1.0;
            Ok(())
        });
        let returning =
            HomotopyProblem::returning(vec![0.5], 0.2, |x, t| Ok(vec![x[0] * x[0] + t * t - 1.0]));
        let u = in_place.initial_point();
        let a = in_place.residual_vec(&u, &mut ()).expect("in-place");
        let b = returning.residual_vec(&u, &mut ()).expect("returning");
        assert_eq!(a, b);
        assert!((a[0] - (0.25 + 0.04 - 1.0)).abs() < 1e-15);
    }

    #[test]
    fn finite_difference_jacobian_matches_supplied_one() {
        let f = |x: &[f64], t: f64| -> Result<Vec<f64>> { Ok(vec![x[0] * t - x[1], x[1] * x[1] + t]) };
        let fd = HomotopyProblem::returning(vec![1.0, 2.0], 0.5, f);
        let exact = HomotopyProblem::returning(vec![1.0, 2.0], 0.5, f).with_jacobian(
            |x: &[f64], t: f64, jac: &mut DMatrix<f64>| {
                jac.copy_from(&DMatrix::from_row_slice(
                    2,
                    3,
                    &[t, -1.0, x[0], 0.0, 2.0 * x[1], 1.0],
                ));
                Ok(())
            },
        );
        let u = fd.initial_point();
        let mut out = DVector::zeros(2);
        let mut j_fd = DMatrix::zeros(2, 3);
        let mut j_exact = DMatrix::zeros(2, 3);
        fd.residual_jacobian(&u, &mut (), &mut out, &mut j_fd)
            .expect("fd jacobian");
        exact
            .residual_jacobian(&u, &mut (), &mut out, &mut j_exact)
            .expect("exact jacobian");
        assert!((j_fd - j_exact).abs().max() < 1e-8);
    }

    #[test]
    fn returning_form_checks_length() {
        let problem = HomotopyProblem::returning(vec![0.0, 0.0], 0.0, |_, _| Ok(vec![1.0]));
        let u = problem.initial_point();
        assert!(problem.residual_vec(&u, &mut ()).is_err());
    }

    #[test]
    fn domain_covers_phase_space_and_t() {
        let problem = HomotopyProblem::in_place(vec![0.0], 0.5, |_, _, out| {
            out[0] = 0.0;
            Ok(())
        })
        .with_phase_space(vec![-1.0], vec![1.0])
        .expect("bounds")
        .with_t_domain(0.0, 1.0);
        assert!(problem.in_domain(&problem.initial_point()));
        assert!(!problem.in_domain(&DVector::from_vec(vec![0.0, 1.5])));
        assert!(!problem.in_domain(&DVector::from_vec(vec![-2.0, 0.5])));
    }
}
