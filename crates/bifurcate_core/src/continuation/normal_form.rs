//! Normal-form coefficients at equilibria.
//!
//! The multilinear forms B and C of the vector field are obtained by central
//! differences of exact (dual-number) Jacobian-vector products; complex
//! arguments are expanded over their real and imaginary parts.

use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

use super::util::complex_eigenvector;
use crate::autodiff::jacobian_vector_product;
use crate::traits::VectorField;

const BILINEAR_STEP: f64 = 1e-4;
const TRILINEAR_STEP: f64 = 1e-3;

/// Evaluation point of the multilinear forms.
pub struct Multilinear<'a, S: VectorField> {
    system: &'a S,
    x: &'a [f64],
    params: &'a [f64],
}

impl<'a, S: VectorField> Multilinear<'a, S> {
    pub fn new(system: &'a S, x: &'a [f64], params: &'a [f64]) -> Self {
        Self { system, x, params }
    }

    fn jvp_at(&self, x: &[f64], direction: &[f64]) -> DVector<f64> {
        let n = x.len();
        let mut out = vec![0.0; n];
        let dparams = vec![0.0; self.params.len()];
        jacobian_vector_product(self.system, x, direction, self.params, &dparams, &mut out);
        DVector::from_vec(out)
    }

    fn shifted(x: &[f64], direction: &[f64], scale: f64) -> Vec<f64> {
        x.iter().zip(direction).map(|(v, d)| v + scale * d).collect()
    }

    fn bilinear_at(&self, x: &[f64], a: &[f64], b: &[f64]) -> DVector<f64> {
        let plus = self.jvp_at(&Self::shifted(x, b, BILINEAR_STEP), a);
        let minus = self.jvp_at(&Self::shifted(x, b, -BILINEAR_STEP), a);
        (plus - minus) / (2.0 * BILINEAR_STEP)
    }

    /// B(a, b) = D²f(x)[a, b].
    pub fn bilinear(&self, a: &[f64], b: &[f64]) -> DVector<f64> {
        self.bilinear_at(self.x, a, b)
    }

    /// C(a, b, c) = D³f(x)[a, b, c].
    pub fn trilinear(&self, a: &[f64], b: &[f64], c: &[f64]) -> DVector<f64> {
        let plus = self.bilinear_at(&Self::shifted(self.x, c, TRILINEAR_STEP), a, b);
        let minus = self.bilinear_at(&Self::shifted(self.x, c, -TRILINEAR_STEP), a, b);
        (plus - minus) / (2.0 * TRILINEAR_STEP)
    }

    pub fn complex_bilinear(
        &self,
        a: &DVector<Complex<f64>>,
        b: &DVector<Complex<f64>>,
    ) -> DVector<Complex<f64>> {
        self.complex_form(&[a, b])
    }

    pub fn complex_trilinear(
        &self,
        a: &DVector<Complex<f64>>,
        b: &DVector<Complex<f64>>,
        c: &DVector<Complex<f64>>,
    ) -> DVector<Complex<f64>> {
        self.complex_form(&[a, b, c])
    }

    /// Expands a real multilinear form over the real/imaginary split of each
    /// argument; bit k of `mask` selects the imaginary part of argument k.
    fn complex_form(&self, args: &[&DVector<Complex<f64>>]) -> DVector<Complex<f64>> {
        let n = self.x.len();
        let parts: Vec<(Vec<f64>, Vec<f64>)> = args
            .iter()
            .map(|a| {
                (
                    a.iter().map(|z| z.re).collect(),
                    a.iter().map(|z| z.im).collect(),
                )
            })
            .collect();
        let mut result = DVector::from_element(n, Complex::new(0.0, 0.0));
        for mask in 0..(1usize << args.len()) {
            let pick = |k: usize| -> &[f64] {
                if mask & (1 << k) != 0 {
                    &parts[k].1
                } else {
                    &parts[k].0
                }
            };
            if (0..args.len()).all(|k| pick(k).iter().all(|v| *v == 0.0)) {
                continue;
            }
            let real = match args.len() {
                2 => self.bilinear(pick(0), pick(1)),
                _ => self.trilinear(pick(0), pick(1), pick(2)),
            };
            let factor = Complex::i().powu(mask.count_ones());
            for i in 0..n {
                result[i] += factor * real[i];
            }
        }
        result
    }
}

/// First Lyapunov coefficient of an equilibrium with eigenvalues ±iω.
///
/// With Aq = iωq, Aᵀp = −iωp, ⟨q,q⟩ = 1 and ⟨p,q⟩ = 1:
/// l1 = 1/(2ω) Re[⟨p, C(q,q,q̄)⟩ − 2⟨p, B(q, A⁻¹B(q,q̄))⟩
///              + ⟨p, B(q̄, (2iωI − A)⁻¹B(q,q))⟩].
pub fn first_lyapunov_coefficient<S: VectorField>(
    system: &S,
    x: &[f64],
    params: &[f64],
    jac: &DMatrix<f64>,
    omega: f64,
) -> Result<f64> {
    if !(omega > 0.0) {
        bail!("First Lyapunov coefficient requires a positive frequency, got {omega}");
    }
    let n = jac.nrows();
    let q = complex_eigenvector(jac, Complex::new(0.0, omega))?;
    let mut p = complex_eigenvector(&jac.transpose(), Complex::new(0.0, -omega))?;
    let pq = p.dotc(&q);
    if pq.norm() < 1e-12 {
        bail!("Degenerate Hopf eigenvectors");
    }
    p /= pq.conj();

    let forms = Multilinear::new(system, x, params);
    let q_bar = q.map(|z| z.conj());

    let b_qq = forms.complex_bilinear(&q, &q);
    let b_qqbar = forms.complex_bilinear(&q, &q_bar).map(|z| z.re);
    let h11 = jac
        .clone()
        .lu()
        .solve(&b_qqbar)
        .ok_or_else(|| anyhow!("Jacobian is singular at the Hopf point"))?;

    let mut shifted = jac.map(|v| Complex::new(-v, 0.0));
    for i in 0..n {
        shifted[(i, i)] += Complex::new(0.0, 2.0 * omega);
    }
    let h20 = shifted
        .lu()
        .solve(&b_qq)
        .ok_or_else(|| anyhow!("2iω is an eigenvalue at the Hopf point"))?;

    let h11_c = h11.map(|v| Complex::new(v, 0.0));
    let c_term = p.dotc(&forms.complex_trilinear(&q, &q, &q_bar));
    let b_h11 = p.dotc(&forms.complex_bilinear(&q, &h11_c));
    let b_h20 = p.dotc(&forms.complex_bilinear(&q_bar, &h20));

    Ok((c_term - b_h11 * 2.0 + b_h20).re / (2.0 * omega))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Scalar;

    /// ẋ = β x − ω y + s x r², ẏ = ω x + β y + s y r², params = (β, ω, s).
    struct HopfNormalForm;

    impl VectorField for HopfNormalForm {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate<T: Scalar>(&self, _t: T, x: &[T], p: &[T], out: &mut [T]) {
            let r2 = x[0] * x[0] + x[1] * x[1];
            out[0] = p[0] * x[0] - p[1] * x[1] + p[2] * x[0] * r2;
            out[1] = p[1] * x[0] + p[0] * x[1] + p[2] * x[1] * r2;
        }
    }

    struct Quadratic;

    impl VectorField for Quadratic {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate<T: Scalar>(&self, _t: T, x: &[T], _p: &[T], out: &mut [T]) {
            out[0] = x[0] * x[1];
            out[1] = x[0] * x[0] - x[1] * x[1] * T::from_f64(3.0);
        }
    }

    fn jacobian<S: VectorField>(system: &S, x: &[f64], params: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(x.len(), x.len());
        system.state_jacobian(x, params, &mut jac);
        jac
    }

    #[test]
    fn bilinear_form_of_quadratic_field_is_exact() {
        let forms = Multilinear::new(&Quadratic, &[0.3, -0.2], &[]);
        let b = forms.bilinear(&[1.0, 2.0], &[-1.0, 0.5]);
        // B(a,b) = (a0 b1 + a1 b0, 2 a0 b0 - 6 a1 b1)
        assert!((b[0] - (0.5 - 2.0)).abs() < 1e-9);
        assert!((b[1] - (-2.0 - 6.0)).abs() < 1e-9);
        assert!(forms.trilinear(&[1.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]).norm() < 1e-6);
    }

    #[test]
    fn complex_bilinear_expands_real_and_imaginary_parts() {
        let forms = Multilinear::new(&Quadratic, &[0.0, 0.0], &[]);
        let a = DVector::from_vec(vec![Complex::new(1.0, 1.0), Complex::new(0.0, 0.0)]);
        let out = forms.complex_bilinear(&a, &a);
        // first component vanishes, second is 2 a0² = 2 (1 + i)² = 4i
        assert!(out[0].norm() < 1e-9);
        assert!((out[1] - Complex::new(0.0, 4.0)).norm() < 1e-8);
    }

    #[test]
    fn lyapunov_coefficient_matches_normal_form() {
        // unit-norm q rescales z = x + iy by √2, so the cubic coefficient s
        // appears as l1 = 2s/ω
        for &(omega, s) in &[(1.0, -1.0), (1.0, 1.0), (2.0, -1.0)] {
            let params = [0.0, omega, s];
            let x = [0.0, 0.0];
            let jac = jacobian(&HopfNormalForm, &x, &params);
            let l1 = first_lyapunov_coefficient(&HopfNormalForm, &x, &params, &jac, omega)
                .expect("lyapunov coefficient");
            assert!((l1 - 2.0 * s / omega).abs() < 1e-5, "omega {omega}, s {s}: got {l1}");
        }
    }

    #[test]
    fn lyapunov_coefficient_rejects_non_positive_frequency() {
        let params = [0.0, 1.0, -1.0];
        let jac = jacobian(&HopfNormalForm, &[0.0, 0.0], &params);
        assert!(first_lyapunov_coefficient(&HopfNormalForm, &[0.0, 0.0], &params, &jac, 0.0).is_err());
    }
}
