//! Utility functions for continuation analysis.
//!
//! Tangent extraction, eigenvalue analysis, eigenvalue-based test functions
//! and finite-difference helpers shared by the concrete problems.

use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector, Schur, QR, SVD};
use num_complex::Complex;

const SCHUR_MAX_ITERATIONS: usize = 10_000;

/// Unit tangent spanning the null space of an n × (n+1) Jacobian.
///
/// Uses the QR factorization of Jᵀ padded to a square matrix, whose last
/// orthogonal column spans the null space, falling back to a bordered
/// linear solve if that fails.
pub fn compute_nullspace_tangent(jac: &DMatrix<f64>) -> Result<DVector<f64>> {
    let dim = jac.nrows();
    if dim == 0 {
        bail!("Failed to compute tangent: zero-dimensional system");
    }
    if jac.ncols() != dim + 1 {
        bail!(
            "Failed to compute tangent: expected {} columns, got {}",
            dim + 1,
            jac.ncols()
        );
    }
    if jac.iter().any(|v| !v.is_finite()) {
        bail!("Failed to compute tangent: non-finite Jacobian");
    }
    if let Some(vec) = try_qr_nullspace(jac) {
        return Ok(vec);
    }
    let vec = compute_tangent_linear_solve(jac)?;
    let norm = vec.norm();
    Ok(vec / norm)
}

fn try_qr_nullspace(jac: &DMatrix<f64>) -> Option<DVector<f64>> {
    let dim = jac.nrows();
    let mut padded = DMatrix::zeros(dim + 1, dim + 1);
    padded
        .view_mut((0, 0), (dim + 1, dim))
        .copy_from(&jac.transpose());
    let q = QR::new(padded).q();
    let vec = q.column(dim).into_owned();
    let norm = vec.norm();
    if !norm.is_finite() || norm == 0.0 {
        return None;
    }
    let vec = vec / norm;

    let scale = jac.norm().max(1.0);
    let residual = (jac * &vec).norm();
    if residual > 1e-8 * scale {
        return None;
    }
    Some(vec)
}

/// Computes the tangent via bordered linear system solve.
fn compute_tangent_linear_solve(jac: &DMatrix<f64>) -> Result<DVector<f64>> {
    let dim = jac.nrows();
    let mut a = DMatrix::zeros(dim + 1, dim + 1);
    a.view_mut((0, 0), (dim, dim + 1)).copy_from(jac);
    let mut rhs = DVector::zeros(dim + 1);
    rhs[dim] = 1.0;

    for col in (0..=dim).rev() {
        for j in 0..=dim {
            a[(dim, j)] = 0.0;
        }
        a[(dim, col)] = 1.0;

        if let Some(solution) = a.clone().lu().solve(&rhs) {
            if solution.iter().all(|v| v.is_finite()) && solution.norm_squared() != 0.0 {
                return Ok(solution);
            }
        }
    }

    bail!("Failed to compute tangent: all bordered solves singular")
}

/// Flips `tangent` so that it has a non-negative dot product with `reference`.
pub fn orient_tangent(tangent: &mut DVector<f64>, reference: &DVector<f64>) {
    if tangent.dot(reference) < 0.0 {
        tangent.neg_mut();
    }
}

/// Angle between two unit vectors.
pub fn tangent_angle(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

/// Computes eigenvalues from a matrix.
pub fn compute_eigenvalues(mat: &DMatrix<f64>) -> Result<Vec<Complex<f64>>> {
    if mat.nrows() == 0 {
        return Ok(Vec::new());
    }
    if mat.iter().any(|v| !v.is_finite()) {
        bail!("Cannot compute eigenvalues of a non-finite matrix");
    }
    let schur = Schur::try_new(mat.clone(), f64::EPSILON, SCHUR_MAX_ITERATIONS)
        .ok_or_else(|| anyhow!("Schur decomposition did not converge"))?;
    Ok(schur.complex_eigenvalues().iter().cloned().collect())
}

/// Bialternate-product test: ∏_{i<j} (λᵢ + λⱼ).
///
/// Vanishes when a complex pair crosses the imaginary axis (Hopf) or two real
/// eigenvalues sum to zero (neutral saddle). The product over a
/// conjugation-closed spectrum is real.
pub fn bialternate_test_function(eigenvalues: &[Complex<f64>]) -> f64 {
    let mut product = Complex::new(1.0, 0.0);
    for i in 0..eigenvalues.len() {
        for j in (i + 1)..eigenvalues.len() {
            product *= eigenvalues[i] + eigenvalues[j];
        }
    }
    product.re
}

/// Pair of eigenvalues whose sum is closest to zero.
pub fn critical_sum_pair(eigenvalues: &[Complex<f64>]) -> Option<(Complex<f64>, Complex<f64>)> {
    closest_pair(eigenvalues, |a, b| (a + b).norm())
}

/// Multiplier test for maps: ∏_{i<j} (μᵢ μⱼ − 1).
pub fn multiplier_product_test_function(multipliers: &[Complex<f64>]) -> f64 {
    let mut product = Complex::new(1.0, 0.0);
    for i in 0..multipliers.len() {
        for j in (i + 1)..multipliers.len() {
            product *= multipliers[i] * multipliers[j] - 1.0;
        }
    }
    product.re
}

/// Pair of multipliers whose product is closest to one.
pub fn critical_product_pair(
    multipliers: &[Complex<f64>],
) -> Option<(Complex<f64>, Complex<f64>)> {
    closest_pair(multipliers, |a, b| (a * b - 1.0).norm())
}

fn closest_pair(
    values: &[Complex<f64>],
    distance: impl Fn(Complex<f64>, Complex<f64>) -> f64,
) -> Option<(Complex<f64>, Complex<f64>)> {
    let mut best: Option<(f64, Complex<f64>, Complex<f64>)> = None;
    for i in 0..values.len() {
        for j in (i + 1)..values.len() {
            let d = distance(values[i], values[j]);
            if best.map_or(true, |(b, _, _)| d < b) {
                best = Some((d, values[i], values[j]));
            }
        }
    }
    best.map(|(_, a, b)| (a, b))
}

/// Coefficient of λ in the characteristic polynomial up to sign:
/// Σᵢ ∏_{j≠i} λⱼ. With one zero eigenvalue it is the product of the others,
/// so it vanishes when the zero eigenvalue becomes double.
pub fn simple_zero_test_function(eigenvalues: &[Complex<f64>]) -> f64 {
    let mut sum = Complex::new(0.0, 0.0);
    for i in 0..eigenvalues.len() {
        let mut product = Complex::new(1.0, 0.0);
        for (j, &value) in eigenvalues.iter().enumerate() {
            if j != i {
                product *= value;
            }
        }
        sum += product;
    }
    sum.re
}

/// Central finite-difference Jacobian of `f` at `u`, written into `jac`.
pub fn finite_difference_jacobian<F>(mut f: F, u: &DVector<f64>, jac: &mut DMatrix<f64>) -> Result<()>
where
    F: FnMut(&DVector<f64>, &mut DVector<f64>) -> Result<()>,
{
    let rows = jac.nrows();
    let mut probe = u.clone();
    let mut plus = DVector::zeros(rows);
    let mut minus = DVector::zeros(rows);
    for j in 0..u.len() {
        let h = 1e-6 * u[j].abs().max(1.0);
        probe[j] = u[j] + h;
        f(&probe, &mut plus)?;
        probe[j] = u[j] - h;
        f(&probe, &mut minus)?;
        probe[j] = u[j];
        for i in 0..rows {
            jac[(i, j)] = (plus[i] - minus[i]) / (2.0 * h);
        }
    }
    Ok(())
}

/// Null vector of a complex square matrix via SVD.
pub fn complex_null_vector(mat: &DMatrix<Complex<f64>>) -> Result<DVector<Complex<f64>>> {
    if mat.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
        bail!("Cannot compute a null vector of a non-finite matrix");
    }
    let svd = SVD::new(mat.clone(), false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow!("Failed to compute complex null vector"))?;
    let (row, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(bi, bv), (i, &v)| {
            if v < bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });
    Ok(v_t.row(row).transpose().map(|z| z.conj()))
}

/// Complex eigenvector of a real matrix for the given eigenvalue,
/// normalized to unit length.
pub fn complex_eigenvector(
    mat: &DMatrix<f64>,
    eigenvalue: Complex<f64>,
) -> Result<DVector<Complex<f64>>> {
    let mut shifted = mat.map(|v| Complex::new(v, 0.0));
    for i in 0..mat.nrows() {
        shifted[(i, i)] -= eigenvalue;
    }
    let vec = complex_null_vector(&shifted)?;
    let norm = vec.norm();
    if norm == 0.0 {
        bail!("Degenerate complex eigenvector");
    }
    Ok(vec.unscale(norm))
}

/// Right singular vector for the smallest singular value of a real matrix.
///
/// Wide matrices are padded with zero rows so the kernel is represented.
pub fn smallest_singular_vector(mat: &DMatrix<f64>) -> Result<DVector<f64>> {
    if mat.iter().any(|v| !v.is_finite()) {
        bail!("Cannot decompose a non-finite matrix");
    }
    let cols = mat.ncols();
    let square = if mat.nrows() < cols {
        let mut padded = DMatrix::zeros(cols, cols);
        padded.view_mut((0, 0), (mat.nrows(), cols)).copy_from(mat);
        padded
    } else {
        mat.clone()
    };
    let svd = SVD::new(square, false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow!("Failed to compute singular vectors"))?;
    let mut index = 0;
    for (i, &value) in svd.singular_values.iter().enumerate() {
        if value < svd.singular_values[index] {
            index = i;
        }
    }
    Ok(v_t.row(index).transpose())
}

/// Unit null direction of `jac` orthogonal to `tangent`.
///
/// At a simple branch point the n × (n+1) Jacobian has a two-dimensional
/// kernel; the two smallest right singular vectors span it and the one with
/// the largest component off `tangent` gives the secondary branch.
pub fn secondary_direction(jac: &DMatrix<f64>, tangent: &DVector<f64>) -> Result<DVector<f64>> {
    if jac.iter().any(|v| !v.is_finite()) {
        bail!("Cannot decompose a non-finite matrix");
    }
    let cols = jac.ncols();
    if tangent.len() != cols || jac.nrows() >= cols {
        bail!(
            "Secondary direction expects an n x (n+1) Jacobian, got {}x{}",
            jac.nrows(),
            cols
        );
    }
    let mut square = DMatrix::zeros(cols, cols);
    square.view_mut((0, 0), (jac.nrows(), cols)).copy_from(jac);
    let svd = SVD::new(square, false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow!("Failed to compute singular vectors"))?;
    let mut order: Vec<usize> = (0..cols).collect();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));

    let mut best: Option<DVector<f64>> = None;
    for &i in order.iter().take(2) {
        let v = v_t.row(i).transpose();
        let off = &v - tangent * tangent.dot(&v);
        if best.as_ref().map_or(true, |b| off.norm() > b.norm()) {
            best = Some(off);
        }
    }
    let direction = best.ok_or_else(|| anyhow!("Jacobian has no columns"))?;
    let norm = direction.norm();
    if norm < 1e-8 {
        bail!("No kernel direction independent of the tangent");
    }
    Ok(direction / norm)
}
