//! Branch switching from detected special points.
//!
//! A [`SpecialPointSnapshot`] freezes a special point together with the
//! vector field, the full parameter vector at the point and the active
//! axes. It holds no reference to the solver that produced it, so a new
//! problem can be seeded from it at any time. Switched problems are
//! returned as the tagged [`BifurcationProblem`], which itself implements
//! [`ContinuationProblem`] and can be handed to a fresh
//! [`Solver`](super::driver::Solver).

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use log::info;
use nalgebra::{DMatrix, DVector};

use super::codim1_curves::{
    FoldLimitCycleCurveCache, FoldLimitCycleCurveProblem, HopfCurveCache, HopfCurveProblem,
    ParamPlane, SaddleNodeCurveCache, SaddleNodeCurveProblem,
};
use super::fixed_point::{FixedPointCache, FixedPointProblem};
use super::limit_cycle::{LimitCycleCache, LimitCycleProblem, DEFAULT_SHOOTING_STEPS};
use super::problem::{ContinuationProblem, DomainBox, ParamAxis};
use super::types::{AuxiliaryValues, Codimension, PointType, SpecialPoint, TestFunction};
use crate::error::ContinuationError;
use crate::traits::{SystemKind, VectorField};

/// The kind of curve a problem traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    FixedPoint,
    LimitCycle,
    SaddleNodeCurve,
    HopfCurve,
    FoldLimitCycleCurve,
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CurveKind::FixedPoint => "fixed-point branch",
            CurveKind::LimitCycle => "limit-cycle branch",
            CurveKind::SaddleNodeCurve => "saddle-node curve",
            CurveKind::HopfCurve => "hopf curve",
            CurveKind::FoldLimitCycleCurve => "fold-of-limit-cycle curve",
        };
        f.write_str(name)
    }
}

/// Continuation problems reachable by branch switching.
pub enum BifurcationProblem<S: VectorField> {
    FixedPoint(FixedPointProblem<S>),
    LimitCycle(LimitCycleProblem<S>),
    SaddleNodeCurve(SaddleNodeCurveProblem<S>),
    HopfCurve(HopfCurveProblem<S>),
    FoldLimitCycleCurve(FoldLimitCycleCurveProblem<S>),
}

pub enum BifurcationCache {
    FixedPoint(FixedPointCache),
    LimitCycle(LimitCycleCache),
    SaddleNodeCurve(SaddleNodeCurveCache),
    HopfCurve(HopfCurveCache),
    FoldLimitCycleCurve(FoldLimitCycleCurveCache),
}

/// Applies `$body` to the wrapped problem.
macro_rules! each_problem {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            BifurcationProblem::FixedPoint($p) => $body,
            BifurcationProblem::LimitCycle($p) => $body,
            BifurcationProblem::SaddleNodeCurve($p) => $body,
            BifurcationProblem::HopfCurve($p) => $body,
            BifurcationProblem::FoldLimitCycleCurve($p) => $body,
        }
    };
}

/// Applies `$body` to the wrapped problem and its matching cache.
macro_rules! with_cache {
    ($self:expr, $cache:expr, $p:ident, $c:ident => $body:expr) => {
        match ($self, $cache) {
            (BifurcationProblem::FixedPoint($p), BifurcationCache::FixedPoint($c)) => $body,
            (BifurcationProblem::LimitCycle($p), BifurcationCache::LimitCycle($c)) => $body,
            (BifurcationProblem::SaddleNodeCurve($p), BifurcationCache::SaddleNodeCurve($c)) => {
                $body
            }
            (BifurcationProblem::HopfCurve($p), BifurcationCache::HopfCurve($c)) => $body,
            (
                BifurcationProblem::FoldLimitCycleCurve($p),
                BifurcationCache::FoldLimitCycleCurve($c),
            ) => $body,
            (problem, _) => bail!("Cache does not belong to the {}", problem.kind()),
        }
    };
}

impl<S: VectorField> BifurcationProblem<S> {
    pub fn kind(&self) -> CurveKind {
        match self {
            BifurcationProblem::FixedPoint(_) => CurveKind::FixedPoint,
            BifurcationProblem::LimitCycle(_) => CurveKind::LimitCycle,
            BifurcationProblem::SaddleNodeCurve(_) => CurveKind::SaddleNodeCurve,
            BifurcationProblem::HopfCurve(_) => CurveKind::HopfCurve,
            BifurcationProblem::FoldLimitCycleCurve(_) => CurveKind::FoldLimitCycleCurve,
        }
    }

    /// Full model parameter vector at a point `u` of this problem.
    pub fn params_at(&self, u: &DVector<f64>) -> Vec<f64> {
        each_problem!(self, p => p.params_at(u))
    }

    /// Active parameter axes, in the order they trail `u`.
    pub fn axes(&self) -> Vec<ParamAxis> {
        match self {
            BifurcationProblem::FixedPoint(p) => vec![p.axis().clone()],
            BifurcationProblem::LimitCycle(p) => vec![p.axis().clone()],
            BifurcationProblem::SaddleNodeCurve(p) => plane_axes(p.plane()),
            BifurcationProblem::HopfCurve(p) => plane_axes(p.plane()),
            BifurcationProblem::FoldLimitCycleCurve(p) => plane_axes(p.plane()),
        }
    }

    fn system(&self) -> &Arc<S> {
        match self {
            BifurcationProblem::FixedPoint(p) => p.system(),
            BifurcationProblem::LimitCycle(p) => p.shooting().system(),
            BifurcationProblem::SaddleNodeCurve(p) => p.system(),
            BifurcationProblem::HopfCurve(p) => p.system(),
            BifurcationProblem::FoldLimitCycleCurve(p) => p.shooting().system(),
        }
    }

    fn system_kind(&self) -> SystemKind {
        match self {
            BifurcationProblem::FixedPoint(p) => p.kind(),
            _ => SystemKind::Flow,
        }
    }

    fn shooting_steps(&self) -> Option<usize> {
        match self {
            BifurcationProblem::LimitCycle(p) => Some(p.shooting().steps()),
            BifurcationProblem::FoldLimitCycleCurve(p) => Some(p.shooting().steps()),
            _ => None,
        }
    }

    /// Freezes `point`, found on this problem's curve, for branch switching.
    pub fn snapshot(&self, point: &SpecialPoint) -> SpecialPointSnapshot<S> {
        let u = DVector::from_column_slice(&point.u);
        SpecialPointSnapshot {
            point: point.clone(),
            source: self.kind(),
            system: Arc::clone(self.system()),
            system_kind: self.system_kind(),
            params: self.params_at(&u),
            axes: self.axes(),
            shooting_steps: self.shooting_steps(),
        }
    }
}

fn plane_axes(plane: &ParamPlane) -> Vec<ParamAxis> {
    vec![plane.first.clone(), plane.second.clone()]
}

impl<S: VectorField> From<FixedPointProblem<S>> for BifurcationProblem<S> {
    fn from(problem: FixedPointProblem<S>) -> Self {
        BifurcationProblem::FixedPoint(problem)
    }
}

impl<S: VectorField> From<LimitCycleProblem<S>> for BifurcationProblem<S> {
    fn from(problem: LimitCycleProblem<S>) -> Self {
        BifurcationProblem::LimitCycle(problem)
    }
}

impl<S: VectorField> From<SaddleNodeCurveProblem<S>> for BifurcationProblem<S> {
    fn from(problem: SaddleNodeCurveProblem<S>) -> Self {
        BifurcationProblem::SaddleNodeCurve(problem)
    }
}

impl<S: VectorField> From<HopfCurveProblem<S>> for BifurcationProblem<S> {
    fn from(problem: HopfCurveProblem<S>) -> Self {
        BifurcationProblem::HopfCurve(problem)
    }
}

impl<S: VectorField> From<FoldLimitCycleCurveProblem<S>> for BifurcationProblem<S> {
    fn from(problem: FoldLimitCycleCurveProblem<S>) -> Self {
        BifurcationProblem::FoldLimitCycleCurve(problem)
    }
}

impl<S: VectorField> ContinuationProblem for BifurcationProblem<S> {
    type Cache = BifurcationCache;

    fn dimension(&self) -> usize {
        each_problem!(self, p => p.dimension())
    }

    fn codimension(&self) -> Codimension {
        each_problem!(self, p => p.codimension())
    }

    fn initial_point(&self) -> DVector<f64> {
        each_problem!(self, p => p.initial_point())
    }

    fn domain(&self) -> &DomainBox {
        each_problem!(self, p => p.domain())
    }

    fn new_cache(&self) -> BifurcationCache {
        match self {
            BifurcationProblem::FixedPoint(p) => BifurcationCache::FixedPoint(p.new_cache()),
            BifurcationProblem::LimitCycle(p) => BifurcationCache::LimitCycle(p.new_cache()),
            BifurcationProblem::SaddleNodeCurve(p) => {
                BifurcationCache::SaddleNodeCurve(p.new_cache())
            }
            BifurcationProblem::HopfCurve(p) => BifurcationCache::HopfCurve(p.new_cache()),
            BifurcationProblem::FoldLimitCycleCurve(p) => {
                BifurcationCache::FoldLimitCycleCurve(p.new_cache())
            }
        }
    }

    fn residual(
        &self,
        u: &DVector<f64>,
        cache: &mut BifurcationCache,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        with_cache!(self, cache, p, c => p.residual(u, c, out))
    }

    fn residual_jacobian(
        &self,
        u: &DVector<f64>,
        cache: &mut BifurcationCache,
        out: &mut DVector<f64>,
        jac: &mut DMatrix<f64>,
    ) -> Result<()> {
        with_cache!(self, cache, p, c => p.residual_jacobian(u, c, out, jac))
    }

    fn test_functions(&self) -> Vec<TestFunction> {
        each_problem!(self, p => p.test_functions())
    }

    fn evaluate_tests(
        &self,
        u: &DVector<f64>,
        tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        cache: &mut BifurcationCache,
        out: &mut [f64],
    ) -> Result<()> {
        with_cache!(self, cache, p, c => p.evaluate_tests(u, tangent, jac, c, out))
    }

    fn auxiliary(
        &self,
        u: &DVector<f64>,
        tangent: &DVector<f64>,
        jac: &DMatrix<f64>,
        cache: &mut BifurcationCache,
    ) -> Result<AuxiliaryValues> {
        with_cache!(self, cache, p, c => p.auxiliary(u, tangent, jac, c))
    }

    fn seed_direction(&self) -> Option<DVector<f64>> {
        each_problem!(self, p => p.seed_direction())
    }
}

/// What to continue from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchTarget {
    /// The same codim-1 bifurcation in the plane of the current axis and
    /// `second`.
    Curve { second: ParamAxis },
    /// The family of cycles born at a Hopf point, seeded at radius
    /// `amplitude`.
    LimitCycle { amplitude: f64 },
    /// The other codim-1 curve through a codim-2 point, in the same plane.
    /// `amplitude` is the radius of the seed cycle at a Bautin point and is
    /// otherwise unused.
    Companion { amplitude: f64 },
}

/// A special point with the context needed to seed new problems from it.
pub struct SpecialPointSnapshot<S: VectorField> {
    point: SpecialPoint,
    source: CurveKind,
    system: Arc<S>,
    system_kind: SystemKind,
    params: Vec<f64>,
    axes: Vec<ParamAxis>,
    shooting_steps: Option<usize>,
}

impl<S: VectorField> Clone for SpecialPointSnapshot<S> {
    fn clone(&self) -> Self {
        Self {
            point: self.point.clone(),
            source: self.source,
            system: Arc::clone(&self.system),
            system_kind: self.system_kind,
            params: self.params.clone(),
            axes: self.axes.clone(),
            shooting_steps: self.shooting_steps,
        }
    }
}

impl<S: VectorField> SpecialPointSnapshot<S> {
    pub fn point(&self) -> &SpecialPoint {
        &self.point
    }

    pub fn source(&self) -> CurveKind {
        self.source
    }

    /// Full model parameter vector at the point.
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn axes(&self) -> &[ParamAxis] {
        &self.axes
    }

    fn state_dim(&self) -> usize {
        self.system.dimension()
    }

    fn state(&self) -> &[f64] {
        &self.point.u[..self.state_dim()]
    }

    fn steps(&self) -> usize {
        self.shooting_steps.unwrap_or(DEFAULT_SHOOTING_STEPS)
    }

    fn unsupported(&self, kind: Option<PointType>, target: &SwitchTarget) -> ContinuationError {
        let label = kind.map_or_else(|| "unclassified point".to_string(), |k| k.to_string());
        ContinuationError::UnsupportedSwitch(format!("{label} on a {} to {target:?}", self.source))
    }

    fn plane_with(&self, second: &ParamAxis) -> Result<ParamPlane, ContinuationError> {
        let first = self.axes.first().cloned().ok_or_else(|| {
            ContinuationError::InvalidSettings("snapshot has no active parameter".to_string())
        })?;
        ParamPlane::new(first, second.clone())
    }

    fn same_plane(&self) -> Result<ParamPlane, ContinuationError> {
        match self.axes.as_slice() {
            [first, second] => ParamPlane::new(first.clone(), second.clone()),
            _ => Err(ContinuationError::DimensionMismatch {
                expected: 2,
                actual: self.axes.len(),
            }),
        }
    }

    fn state_jacobian(&self) -> DMatrix<f64> {
        let n = self.state_dim();
        let mut jac = DMatrix::zeros(n, n);
        self.system.state_jacobian(self.state(), &self.params, &mut jac);
        jac
    }

    fn omega(&self) -> Result<f64, ContinuationError> {
        self.point
            .aux
            .omega
            .filter(|w| *w > 0.0)
            .ok_or_else(|| {
                ContinuationError::InvalidSettings(
                    "Hopf point carries no positive frequency".to_string(),
                )
            })
    }

    /// Builds the problem continuing `target` from this point.
    pub fn switch(&self, target: &SwitchTarget) -> Result<BifurcationProblem<S>, ContinuationError> {
        let kind = self.point.point_type();
        let flow = self.system_kind == SystemKind::Flow;
        let n = self.state_dim();
        let system = Arc::clone(&self.system);
        let params = self.params.clone();
        let x = self.state().to_vec();

        let problem: BifurcationProblem<S> = match (kind, self.source, target) {
            (Some(PointType::SaddleNode), CurveKind::FixedPoint, SwitchTarget::Curve { second })
                if flow =>
            {
                SaddleNodeCurveProblem::new(system, params, self.plane_with(second)?, x)?.into()
            }
            (Some(PointType::Hopf), CurveKind::FixedPoint, SwitchTarget::Curve { second })
                if flow =>
            {
                HopfCurveProblem::new(system, params, self.plane_with(second)?, x, self.omega()?)?
                    .into()
            }
            (
                Some(PointType::Hopf),
                CurveKind::FixedPoint,
                SwitchTarget::LimitCycle { amplitude },
            ) if flow => LimitCycleProblem::from_hopf(
                system,
                params,
                self.axes[0].clone(),
                &x,
                &self.state_jacobian(),
                self.omega()?,
                *amplitude,
                self.steps(),
            )?
            .into(),
            (
                Some(PointType::FoldLimitCycle),
                CurveKind::LimitCycle,
                SwitchTarget::Curve { second },
            ) => FoldLimitCycleCurveProblem::new(
                system,
                params,
                self.plane_with(second)?,
                x,
                self.point.u[n],
                self.steps(),
            )?
            .into(),
            (
                Some(PointType::BogdanovTakens),
                CurveKind::SaddleNodeCurve,
                SwitchTarget::Companion { .. },
            ) => {
                let v = self.point.u[n..2 * n].to_vec();
                HopfCurveProblem::from_bogdanov_takens(system, params, self.same_plane()?, x, v)?
                    .into()
            }
            (
                Some(PointType::BogdanovTakens),
                CurveKind::HopfCurve,
                SwitchTarget::Companion { .. },
            ) => SaddleNodeCurveProblem::new(system, params, self.same_plane()?, x)?.into(),
            (Some(PointType::Bautin), CurveKind::HopfCurve, SwitchTarget::Companion { amplitude }) => {
                let kappa = self.point.u[2 * n];
                if !(kappa > 0.0) {
                    return Err(ContinuationError::InvalidSettings(format!(
                        "Bautin point needs a positive frequency, got kappa = {kappa}"
                    )));
                }
                FoldLimitCycleCurveProblem::from_bautin(
                    system,
                    params,
                    self.same_plane()?,
                    &x,
                    &self.state_jacobian(),
                    kappa.sqrt(),
                    *amplitude,
                    self.steps(),
                )?
                .into()
            }
            _ => return Err(self.unsupported(kind, target)),
        };
        info!(
            "switched from {} on a {} to a {}",
            kind.map_or_else(|| "unclassified point".to_string(), |k| k.to_string()),
            self.source,
            problem.kind()
        );
        Ok(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::driver::Solver;
    use crate::continuation::test_systems::{
        BautinNormalForm, BogdanovTakensNormalForm, CuspNormalForm,
    };
    use crate::continuation::types::{ContinuationSettings, Solution};
    use std::f64::consts::PI;

    fn snapped() -> ContinuationSettings {
        ContinuationSettings {
            start_from_nearest_root: true,
            ..ContinuationSettings::default()
        }
    }

    fn solve<S: VectorField>(
        problem: BifurcationProblem<S>,
        settings: ContinuationSettings,
    ) -> (Solver<BifurcationProblem<S>>, Solution) {
        let solver = Solver::new(problem, settings).expect("solver");
        let solution = solver.solve().expect("solution");
        (solver, solution)
    }

    fn seed_residual<S: VectorField>(solver: &Solver<BifurcationProblem<S>>) -> f64 {
        let problem = solver.problem();
        problem
            .residual_vec(solver.initial_point(), &mut problem.new_cache())
            .expect("residual")
            .norm()
    }

    fn only<'a>(solution: &'a Solution, kind: PointType) -> &'a SpecialPoint {
        let points = solution.special_points_of(kind);
        assert_eq!(points.len(), 1, "expected one {kind}, got {}", points.len());
        points[0]
    }

    /// Equilibria of the Bogdanov–Takens normal form at β2 = −1/2, in β1.
    fn bogdanov_takens_branch() -> (Solver<BifurcationProblem<BogdanovTakensNormalForm>>, Solution) {
        let problem = FixedPointProblem::new(
            Arc::new(BogdanovTakensNormalForm),
            SystemKind::Flow,
            vec![-1.0, -0.5],
            ParamAxis::new(0, "beta1").with_range(-2.0, 1.0),
            vec![-1.0, 0.0],
        )
        .expect("problem");
        solve(BifurcationProblem::FixedPoint(problem), ContinuationSettings::default())
    }

    fn beta2_axis(lower: f64, upper: f64) -> ParamAxis {
        ParamAxis::new(1, "beta2").with_range(lower, upper)
    }

    #[test]
    fn equilibrium_branch_of_bogdanov_takens_form_has_hopf_and_fold() {
        let (_, solution) = bogdanov_takens_branch();
        // equilibria x = ±√(−β1); trace β2 − x vanishes at x = β2
        let hopf = only(&solution, PointType::Hopf);
        assert!((hopf.u[0] + 0.5).abs() < 1e-4);
        assert!((hopf.u[2] + 0.25).abs() < 1e-4);
        assert!((hopf.aux.omega.expect("omega") - 1.0).abs() < 1e-3);
        let fold = only(&solution, PointType::SaddleNode);
        assert!(fold.u[0].abs() < 1e-4 && fold.u[2].abs() < 1e-6);
    }

    #[test]
    fn hopf_curve_ends_in_bogdanov_takens_point() {
        let (solver, solution) = bogdanov_takens_branch();
        let snapshot = solver
            .problem()
            .snapshot(only(&solution, PointType::Hopf));
        assert_eq!(snapshot.params(), &[snapshot.point().u[2], -0.5]);
        let problem = snapshot
            .switch(&SwitchTarget::Curve {
                second: beta2_axis(-1.0, 0.5),
            })
            .expect("hopf curve");
        assert_eq!(problem.kind(), CurveKind::HopfCurve);

        let (solver, curve) = solve(problem, snapped());
        assert!(seed_residual(&solver) < 1e-8);
        // the curve is x = β2, β1 = −β2², with κ = −2β2
        for point in curve.merged_points() {
            let (x, kappa, beta1, beta2) = (point.u[0], point.u[4], point.u[5], point.u[6]);
            assert!((x - beta2).abs() < 1e-5);
            assert!((beta1 + beta2 * beta2).abs() < 1e-5);
            assert!((kappa + 2.0 * beta2).abs() < 1e-5);
        }
        let bt = only(&curve, PointType::BogdanovTakens);
        assert!(bt.u[5].abs() < 1e-4 && bt.u[6].abs() < 1e-4);
        assert!(curve.special_points_of(PointType::Bautin).is_empty());

        // back onto the saddle-node curve through the same point
        let fold_curve = solver
            .problem()
            .snapshot(bt)
            .switch(&SwitchTarget::Companion { amplitude: 0.0 })
            .expect("saddle-node curve");
        assert_eq!(fold_curve.kind(), CurveKind::SaddleNodeCurve);
        let solver = Solver::new(fold_curve, snapped()).expect("solver");
        assert!(seed_residual(&solver) < 1e-8);
    }

    #[test]
    fn saddle_node_curve_meets_bogdanov_takens_point() {
        let (solver, solution) = bogdanov_takens_branch();
        let problem = solver
            .problem()
            .snapshot(only(&solution, PointType::SaddleNode))
            .switch(&SwitchTarget::Curve {
                second: beta2_axis(-1.0, 1.0),
            })
            .expect("saddle-node curve");

        let (solver, curve) = solve(problem, snapped());
        assert!(seed_residual(&solver) < 1e-8);
        // the curve is x = 0, β1 = 0; the second eigenvalue β2 crosses zero
        for point in curve.merged_points() {
            assert!(point.u[0].abs() < 1e-6 && point.u[4].abs() < 1e-6);
        }
        let bt = only(&curve, PointType::BogdanovTakens);
        assert!(bt.u[5].abs() < 1e-5);
        assert!(curve.special_points_of(PointType::Cusp).is_empty());

        let hopf_curve = solver
            .problem()
            .snapshot(bt)
            .switch(&SwitchTarget::Companion { amplitude: 0.0 })
            .expect("hopf curve");
        assert_eq!(hopf_curve.kind(), CurveKind::HopfCurve);
        let solver = Solver::new(hopf_curve, snapped()).expect("solver");
        assert!(seed_residual(&solver) < 1e-8);
    }

    #[test]
    fn saddle_node_curve_of_cusp_form_passes_the_cusp() {
        let problem = FixedPointProblem::new(
            Arc::new(CuspNormalForm),
            SystemKind::Flow,
            vec![0.0, 3.0],
            ParamAxis::new(0, "beta1").with_range(-5.0, 5.0),
            vec![0.0],
        )
        .expect("problem");
        let (solver, solution) = solve(
            BifurcationProblem::FixedPoint(problem),
            ContinuationSettings::default(),
        );
        // β1 = x³ − 3x folds at x = ±1
        let folds = solution.special_points_of(PointType::SaddleNode);
        assert_eq!(folds.len(), 2);
        let fold = folds
            .into_iter()
            .find(|p| p.u[0] > 0.0)
            .expect("fold at x = 1");
        assert!((fold.u[0] - 1.0).abs() < 1e-4);
        assert!((fold.u[1] + 2.0).abs() < 1e-6);

        let problem = solver
            .problem()
            .snapshot(fold)
            .switch(&SwitchTarget::Curve {
                second: beta2_axis(-1.0, 4.0),
            })
            .expect("saddle-node curve");
        let (solver, curve) = solve(problem, snapped());
        assert!(seed_residual(&solver) < 1e-8);
        // β1 = −2x³, β2 = 3x²
        for point in curve.merged_points() {
            let (x, beta1, beta2) = (point.u[0], point.u[2], point.u[3]);
            assert!((beta1 + 2.0 * x.powi(3)).abs() < 1e-6);
            assert!((beta2 - 3.0 * x * x).abs() < 1e-6);
        }
        let cusp = only(&curve, PointType::Cusp);
        assert!(cusp.u[0].abs() < 1e-4);
        assert!(cusp.u[3].abs() < 1e-6);
        assert!(curve.special_points_of(PointType::BogdanovTakens).is_empty());
    }

    /// Equilibrium at the origin of the Bautin normal form, in β1.
    fn bautin_origin_branch(beta2: f64) -> (Solver<BifurcationProblem<BautinNormalForm>>, Solution) {
        let problem = FixedPointProblem::new(
            Arc::new(BautinNormalForm),
            SystemKind::Flow,
            vec![-0.2, beta2],
            ParamAxis::new(0, "beta1").with_range(-0.5, 0.5),
            vec![0.0, 0.0],
        )
        .expect("problem");
        solve(BifurcationProblem::FixedPoint(problem), ContinuationSettings::default())
    }

    #[test]
    fn hopf_point_seeds_cycle_family() {
        let (solver, solution) = bautin_origin_branch(-0.3);
        let hopf = only(&solution, PointType::Hopf);
        assert!(hopf.u[2].abs() < 1e-6);
        let snapshot = solver.problem().snapshot(hopf);
        let problem = snapshot
            .switch(&SwitchTarget::LimitCycle { amplitude: 0.1 })
            .expect("cycles");
        assert_eq!(problem.kind(), CurveKind::LimitCycle);

        let settings = ContinuationSettings {
            bidirectional_first_sweep: false,
            max_samples: 8,
            ..snapped()
        };
        let (solver, cycles) = solve(problem, settings);
        assert!(seed_residual(&solver) < 1e-8);
        // cycles of radius r sit at β1 = r⁴ − β2 r² with period 2π
        for point in cycles.merged_points() {
            let r2 = point.u[0] * point.u[0] + point.u[1] * point.u[1];
            assert!((point.u[3] - (r2 * r2 + 0.3 * r2)).abs() < 1e-5);
            assert!((point.u[2] - 2.0 * PI).abs() < 1e-4);
        }
    }

    #[test]
    fn hopf_curve_of_bautin_form_finds_bautin_point() {
        let (solver, solution) = bautin_origin_branch(-0.3);
        let problem = solver
            .problem()
            .snapshot(only(&solution, PointType::Hopf))
            .switch(&SwitchTarget::Curve {
                second: beta2_axis(-1.0, 1.0),
            })
            .expect("hopf curve");
        let (solver, curve) = solve(problem, snapped());
        assert!(seed_residual(&solver) < 1e-8);

        // l1 is proportional to β2 along β1 = 0, κ = 1
        let bautin = only(&curve, PointType::Bautin);
        assert!(bautin.u[6].abs() < 1e-5);
        assert!((bautin.aux.kappa.expect("kappa") - 1.0).abs() < 1e-6);
        assert!(curve.special_points_of(PointType::BogdanovTakens).is_empty());

        let problem = solver
            .problem()
            .snapshot(bautin)
            .switch(&SwitchTarget::Companion { amplitude: 0.1 })
            .expect("fold of cycles curve");
        assert_eq!(problem.kind(), CurveKind::FoldLimitCycleCurve);
        assert_eq!(problem.dimension(), 7);
        assert!(problem.seed_direction().is_some());
    }

    #[test]
    fn cycle_fold_continues_in_two_parameters() {
        // β2 = 1/2: cycles r satisfy β1 = r⁴ − r²/2 and fold at r = 1/2
        let problem = LimitCycleProblem::new(
            Arc::new(BautinNormalForm),
            vec![-0.0504, 0.5],
            ParamAxis::new(0, "beta1").with_range(-0.2, 0.2),
            vec![0.6, 0.0],
            2.0 * PI,
            DEFAULT_SHOOTING_STEPS,
        )
        .expect("problem");
        let settings = ContinuationSettings {
            h_max: 0.03,
            max_samples: 12,
            ..ContinuationSettings::default()
        };
        let (solver, cycles) = solve(BifurcationProblem::LimitCycle(problem), settings);
        let fold = only(&cycles, PointType::FoldLimitCycle);
        assert!((fold.u[3] + 0.0625).abs() < 1e-5);
        assert!((fold.u[0].hypot(fold.u[1]) - 0.5).abs() < 1e-3);

        let problem = solver
            .problem()
            .snapshot(fold)
            .switch(&SwitchTarget::Curve {
                second: beta2_axis(0.3, 0.8),
            })
            .expect("fold of cycles curve");
        let settings = ContinuationSettings {
            bidirectional_first_sweep: false,
            max_samples: 10,
            h_max: 0.05,
            ..snapped()
        };
        let (solver, curve) = solve(problem, settings);
        assert!(seed_residual(&solver) < 1e-8);
        let points = curve.merged_points();
        assert!(points.len() > 3);
        // folds of cycles lie on β1 = −β2²/4
        for point in points {
            let (beta1, beta2) = (point.u[6], point.u[7]);
            assert!((beta1 + beta2 * beta2 / 4.0).abs() < 1e-4);
        }
    }

    #[test]
    fn unsupported_switches_are_rejected() {
        let (solver, solution) = bogdanov_takens_branch();
        let snapshot = solver
            .problem()
            .snapshot(only(&solution, PointType::SaddleNode));
        let err = snapshot
            .switch(&SwitchTarget::LimitCycle { amplitude: 0.1 })
            .err()
            .expect("saddle-node has no cycles");
        assert!(matches!(err, ContinuationError::UnsupportedSwitch(_)));
        let err = snapshot
            .switch(&SwitchTarget::Companion { amplitude: 0.1 })
            .err()
            .expect("no companion curve on a branch");
        assert!(matches!(err, ContinuationError::UnsupportedSwitch(_)));
    }
}
