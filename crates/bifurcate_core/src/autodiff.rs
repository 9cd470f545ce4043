use crate::traits::{Scalar, VectorField};
use nalgebra::{DMatrix, DVector};
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    /// Applies a scalar function with known derivative `df` at `self.val`.
    fn chain(self, f: f64, df: f64) -> Self {
        Self::new(f, df * self.eps)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }
    fn value(self) -> f64 {
        self.val
    }
    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }
    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }
    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }
    fn ln(self) -> Self {
        self.chain(self.val.ln(), 1.0 / self.val)
    }
    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.chain(s, 0.5 / s)
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, 1.0 - t * t)
    }
    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }
    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        self.chain(self.val.powi(n), n as f64 * self.val.powi(n - 1))
    }
    fn abs(self) -> Self {
        if self.val < 0.0 {
            -self
        } else {
            self
        }
    }
}

/// Seeds a dual vector with primal values `x` and tangent direction `dx`.
pub fn seed(x: &[f64], dx: &[f64]) -> Vec<Dual> {
    x.iter().zip(dx).map(|(&v, &e)| Dual::new(v, e)).collect()
}

/// Lifts plain values into constant duals.
pub fn lift(x: &[f64]) -> Vec<Dual> {
    x.iter().copied().map(Dual::constant).collect()
}

/// Directional derivative of the vector field:
/// `out = Df(x, p)·[dx; dp]` (at `t = 0`).
pub fn jacobian_vector_product<S: VectorField + ?Sized>(
    system: &S,
    x: &[f64],
    dx: &[f64],
    params: &[f64],
    dparams: &[f64],
    out: &mut [f64],
) {
    let n = x.len();
    let dual_x = seed(x, dx);
    let dual_p = seed(params, dparams);
    let mut dual_out = vec![Dual::zero(); n];
    system.evaluate(Dual::zero(), &dual_x, &dual_p, &mut dual_out);
    for (o, d) in out.iter_mut().zip(&dual_out) {
        *o = d.eps;
    }
}

/// State Jacobian by one forward sweep per column.
pub fn state_jacobian<S: VectorField + ?Sized>(
    system: &S,
    x: &[f64],
    params: &[f64],
    jac: &mut DMatrix<f64>,
) {
    let n = x.len();
    let dual_p = lift(params);
    let mut dual_x = lift(x);
    let mut dual_out = vec![Dual::zero(); n];
    for j in 0..n {
        dual_x[j].eps = 1.0;
        system.evaluate(Dual::zero(), &dual_x, &dual_p, &mut dual_out);
        for i in 0..n {
            jac[(i, j)] = dual_out[i].eps;
        }
        dual_x[j].eps = 0.0;
    }
}

/// Derivative with respect to a single parameter.
pub fn param_derivative<S: VectorField + ?Sized>(
    system: &S,
    x: &[f64],
    params: &[f64],
    index: usize,
    out: &mut DVector<f64>,
) {
    let n = x.len();
    let dual_x = lift(x);
    let mut dual_p = lift(params);
    dual_p[index].eps = 1.0;
    let mut dual_out = vec![Dual::zero(); n];
    system.evaluate(Dual::zero(), &dual_x, &dual_p, &mut dual_out);
    for i in 0..n {
        out[i] = dual_out[i].eps;
    }
}
