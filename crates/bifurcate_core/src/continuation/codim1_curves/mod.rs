//! Codim-1 bifurcation curve continuation (two-parameter continuation).
//!
//! Each problem augments the underlying equilibrium or cycle condition with
//! the defining equations of the bifurcation, so that the curve in the
//! plane of two active parameters is again one equation short. The active
//! parameters are the last two coordinates of `u`.

mod fold_curve;
mod hopf_curve;
mod lpc_curve;

pub use fold_curve::{SaddleNodeCurveCache, SaddleNodeCurveProblem};
pub use hopf_curve::{HopfCurveCache, HopfCurveProblem};
pub use lpc_curve::{FoldLimitCycleCurveCache, FoldLimitCycleCurveProblem};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::problem::{DomainBox, ParamAxis};
use crate::error::ContinuationError;

/// The two active parameters of a codim-1 curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamPlane {
    pub first: ParamAxis,
    pub second: ParamAxis,
}

impl ParamPlane {
    pub fn new(first: ParamAxis, second: ParamAxis) -> Result<Self, ContinuationError> {
        if first.index == second.index {
            return Err(ContinuationError::InvalidSettings(format!(
                "both active parameters refer to index {}",
                first.index
            )));
        }
        Ok(Self { first, second })
    }

    pub fn check(&self, params: &[f64]) -> Result<(), ContinuationError> {
        let needed = self.first.index.max(self.second.index) + 1;
        if needed > params.len() {
            return Err(ContinuationError::DimensionMismatch {
                expected: params.len(),
                actual: needed,
            });
        }
        Ok(())
    }

    /// Writes the trailing two coordinates of `u` into `params`.
    pub fn apply(&self, u: &DVector<f64>, params: &mut [f64]) {
        let len = u.len();
        params[self.first.index] = u[len - 2];
        params[self.second.index] = u[len - 1];
    }

    /// Domain over `dim` continuation variables with the two parameter
    /// ranges in the last coordinates.
    pub fn domain(&self, dim: usize) -> DomainBox {
        DomainBox::unbounded(dim)
            .with_bounds(dim - 2, self.first.lower, self.first.upper)
            .with_bounds(dim - 1, self.second.lower, self.second.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_maps_trailing_coordinates() {
        let plane = ParamPlane::new(
            ParamAxis::new(2, "b").with_range(-1.0, 1.0),
            ParamAxis::new(0, "a"),
        )
        .expect("plane");
        let mut params = vec![0.0; 3];
        plane.apply(&DVector::from_vec(vec![9.0, 0.5, -3.0]), &mut params);
        assert_eq!(params, vec![-3.0, 0.0, 0.5]);

        let domain = plane.domain(3);
        assert!(domain.contains(&[100.0, 0.5, 1e6]));
        assert!(!domain.contains(&[0.0, 1.5, 0.0]));
        assert!(plane.check(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn plane_rejects_repeated_axis() {
        assert!(ParamPlane::new(ParamAxis::new(1, "a"), ParamAxis::new(1, "b")).is_err());
    }
}
