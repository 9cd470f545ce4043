use crate::autodiff;
use nalgebra::{DMatrix, DVector};
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A trait for types that can be used as scalars in our dynamical systems.
///
/// Implemented for `f64` and for the forward-mode [`Dual`](crate::autodiff::Dual) number, so a single
/// generic [`VectorField::evaluate`] yields both values and derivatives.
pub trait Scalar:
    Copy
    + Debug
    + PartialOrd
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Lifts a constant into the scalar type.
    fn from_f64(value: f64) -> Self;
    /// Real value (the primal part for dual numbers).
    fn value(self) -> f64;

    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;
    fn tanh(self) -> Self;
    fn cosh(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn abs(self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
    fn value(self) -> f64 {
        self
    }
    fn sin(self) -> Self {
        f64::sin(self)
    }
    fn cos(self) -> Self {
        f64::cos(self)
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn tanh(self) -> Self {
        f64::tanh(self)
    }
    fn cosh(self) -> Self {
        f64::cosh(self)
    }
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// Whether the vector field is a continuous flow or a discrete map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SystemKind {
    Flow,
    Map,
}

impl SystemKind {
    pub fn is_map(&self) -> bool {
        matches!(self, SystemKind::Map)
    }
}

/// Represents a dynamical system (flow or map) with a parameter vector.
///
/// This is the pluggable collaborator the continuation problems are built on:
/// given a state and the model parameters it returns the derivative (flows)
/// or the image (maps). Implementations only write `evaluate`; Jacobians
/// default to forward-mode differentiation through [`Dual`](crate::autodiff::Dual).
pub trait VectorField {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field or map at `(t, x)` with parameters `params`,
    /// writing the result into `out`.
    fn evaluate<T: Scalar>(&self, t: T, x: &[T], params: &[T], out: &mut [T]);

    /// Jacobian with respect to the state, written into `jac` (n × n).
    fn state_jacobian(&self, x: &[f64], params: &[f64], jac: &mut DMatrix<f64>) {
        autodiff::state_jacobian(self, x, params, jac);
    }

    /// Derivative of the vector field with respect to `params[index]`.
    fn param_derivative(&self, x: &[f64], params: &[f64], index: usize, out: &mut DVector<f64>) {
        autodiff::param_derivative(self, x, params, index, out);
    }
}
