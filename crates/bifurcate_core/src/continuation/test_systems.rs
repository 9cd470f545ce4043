//! Normal forms shared by the scenario tests.

use crate::traits::{Scalar, VectorField};

/// ẋ = β1 + β2 x − x³.
pub struct CuspNormalForm;

impl VectorField for CuspNormalForm {
    fn dimension(&self) -> usize {
        1
    }

    fn evaluate<T: Scalar>(&self, _t: T, x: &[T], p: &[T], out: &mut [T]) {
        out[0] = p[0] + p[1] * x[0] - x[0] * x[0] * x[0];
    }
}

/// ẋ = y, ẏ = β1 + β2 y + x² − x y.
pub struct BogdanovTakensNormalForm;

impl VectorField for BogdanovTakensNormalForm {
    fn dimension(&self) -> usize {
        2
    }

    fn evaluate<T: Scalar>(&self, _t: T, x: &[T], p: &[T], out: &mut [T]) {
        out[0] = x[1];
        out[1] = p[0] + p[1] * x[1] + x[0] * x[0] - x[0] * x[1];
    }
}

/// ẋ = β1 x − y + β2 x r² − x r⁴, ẏ = x + β1 y + β2 y r² − y r⁴.
pub struct BautinNormalForm;

impl VectorField for BautinNormalForm {
    fn dimension(&self) -> usize {
        2
    }

    fn evaluate<T: Scalar>(&self, _t: T, x: &[T], p: &[T], out: &mut [T]) {
        let r2 = x[0] * x[0] + x[1] * x[1];
        let radial = p[0] + p[1] * r2 - r2 * r2;
        out[0] = radial * x[0] - x[1];
        out[1] = x[0] + radial * x[1];
    }
}
