pub mod autodiff;
pub mod continuation;
pub mod error;
pub mod solvers;
/// The `bifurcate_core` crate is a numerical continuation engine for
/// dynamical systems. It traces solution curves of H(u) = 0, detects and
/// classifies bifurcations along them, and switches onto the curves that
/// emanate from the detected points.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction) and `VectorField` (flows and maps).
/// - **Autodiff**: Dual numbers for exact Jacobian columns and Jacobian-vector products.
/// - **Solvers**: The RK4 integrator behind the shooting problems.
/// - **Continuation**: Problems, the predictor-corrector driver, event detection,
///   classification and branch switching.
pub mod traits;

pub use error::ContinuationError;
