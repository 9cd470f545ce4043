use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::types::{AuxiliaryValues, Codimension, TestFunction};
use crate::error::ContinuationError;

/// Component-wise box bounding the continuation variables.
///
/// Unbounded directions use infinite limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainBox {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl DomainBox {
    pub fn unbounded(dim: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; dim],
            upper: vec![f64::INFINITY; dim],
        }
    }

    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, ContinuationError> {
        if lower.len() != upper.len() {
            return Err(ContinuationError::DimensionMismatch {
                expected: lower.len(),
                actual: upper.len(),
            });
        }
        Ok(Self { lower, upper })
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    /// Restricts one coordinate to `[lower, upper]`.
    pub fn with_bounds(mut self, index: usize, lower: f64, upper: f64) -> Self {
        if index < self.lower.len() {
            self.lower[index] = lower;
            self.upper[index] = upper;
        }
        self
    }

    /// First coordinate outside the box, as `(index, value, lower, upper)`.
    pub fn first_violation(&self, u: &[f64]) -> Option<(usize, f64, f64, f64)> {
        u.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .enumerate()
            .find(|(_, (&v, (&lo, &hi)))| !(v >= lo && v <= hi))
            .map(|(i, (&v, (&lo, &hi)))| (i, v, lo, hi))
    }

    pub fn contains(&self, u: &[f64]) -> bool {
        u.len() == self.lower.len() && self.first_violation(u).is_none()
    }
}

/// A model parameter selected for continuation.
///
/// Replaces named-field lenses: the axis is an index into the parameter
/// vector plus a display name and an admissible range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamAxis {
    pub index: usize,
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

impl ParamAxis {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn with_range(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Core interface implemented by any system that can be continued.
///
/// A problem describes H: R^(n+1) → R^n whose zero set is the traced curve.
/// The continuation variables are laid out as `u = (state, auxiliaries,
/// active parameters)` with the active parameters last. Problems are
/// immutable; all scratch storage lives in the associated [`Self::Cache`],
/// one instance per sweep.
pub trait ContinuationProblem {
    type Cache;

    /// Number of equations (the length of `u` is one more).
    fn dimension(&self) -> usize;

    fn codimension(&self) -> Codimension;

    fn initial_point(&self) -> DVector<f64>;

    fn domain(&self) -> &DomainBox;

    fn in_domain(&self, u: &DVector<f64>) -> bool {
        self.domain().contains(u.as_slice())
    }

    fn new_cache(&self) -> Self::Cache;

    /// Evaluate the residual H(u) into `out`.
    fn residual(&self, u: &DVector<f64>, cache: &mut Self::Cache, out: &mut DVector<f64>)
        -> Result<()>;

    /// Evaluate H(u) and its n × (n+1) Jacobian.
    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        cache: &mut Self::Cache,
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()>;

    /// Test functions monitored along the curve, in evaluation order.
    fn test_functions(&self) -> Vec<TestFunction> {
        Vec::new()
    }

    /// Evaluate the test functions at a converged point. `tangent` is the
    /// unit tangent oriented in the direction of travel.
    fn evaluate_tests(
        &self,
        _u: &DVector<f64>,
        _tangent: &DVector<f64>,
        _jac: &DMatrix<f64>,
        _cache: &mut Self::Cache,
        _out: &mut [f64],
    ) -> Result<()> {
        Ok(())
    }

    /// Type-specific scalars at a localized special point.
    fn auxiliary(
        &self,
        _u: &DVector<f64>,
        _tangent: &DVector<f64>,
        _jac: &DMatrix<f64>,
        _cache: &mut Self::Cache,
    ) -> Result<AuxiliaryValues> {
        Ok(AuxiliaryValues::default())
    }

    /// Preferred normal of the hyperplane used when snapping the seed onto
    /// the curve, and orientation of the initial forward tangent.
    fn seed_direction(&self) -> Option<DVector<f64>> {
        None
    }

    /// Allocating convenience form of [`ContinuationProblem::residual`].
    fn residual_vec(&self, u: &DVector<f64>, cache: &mut Self::Cache) -> Result<DVector<f64>> {
        let mut out = DVector::zeros(self.dimension());
        self.residual(u, cache, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_box_reports_first_violation() {
        let domain = DomainBox::unbounded(3).with_bounds(2, -1.0, 2.0);
        assert!(domain.contains(&[10.0, -4.0, 0.5]));
        assert_eq!(
            domain.first_violation(&[0.0, 0.0, 2.5]),
            Some((2, 2.5, -1.0, 2.0))
        );
        assert!(!domain.contains(&[0.0, f64::NAN, 0.0]));
        assert!(!domain.contains(&[0.0, 0.0]));
    }

    #[test]
    fn domain_box_rejects_mismatched_bounds() {
        let err = DomainBox::new(vec![0.0], vec![1.0, 2.0]).expect_err("mismatch");
        assert!(matches!(
            err,
            ContinuationError::DimensionMismatch {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn param_axis_range_is_inclusive() {
        let axis = ParamAxis::new(1, "beta").with_range(-1.0, 2.0);
        assert!(axis.contains(-1.0));
        assert!(axis.contains(2.0));
        assert!(!axis.contains(2.0 + 1e-12));
        assert_eq!(axis.name, "beta");
    }
}
