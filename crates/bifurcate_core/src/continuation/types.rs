//! Core types for continuation analysis.
//!
//! This module contains the fundamental data structures used throughout
//! the continuation analysis system: settings, the bifurcation taxonomy,
//! solution histories and special points.

use crate::error::ContinuationError;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Thresholds used by the special point classifier to separate coincident
/// or degenerate events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Minimum |Im λ| of the critical pair for a bialternate crossing to be
    /// labeled Hopf (or Neimark–Sacker) rather than a neutral saddle.
    pub hopf_min_imag: f64,
    /// Minimum ω² at a localized Lyapunov-coefficient crossing for it to be
    /// labeled Bautin; closer to a Bogdanov–Takens point it is ambiguous.
    pub bautin_min_kappa: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            hopf_min_imag: 1e-6,
            bautin_min_kappa: 1e-6,
        }
    }
}

/// Settings controlling the predictor-corrector continuation algorithm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContinuationSettings {
    /// Target angle between successive tangents.
    pub nominal_angle_rad: f64,
    /// Cap on automatic branch switches at branch points.
    pub max_branches: usize,
    /// Cap on accepted points per sweep direction.
    pub max_samples: usize,
    /// Re-converge the seed point before stepping.
    pub start_from_nearest_root: bool,
    /// Sweep both directions from the initial point.
    pub bidirectional_first_sweep: bool,
    pub initial_step: f64,
    pub h_min: f64,
    pub h_max: f64,
    pub residual_tolerance: f64,
    pub max_corrector_iterations: usize,
    pub bisection_tolerance: f64,
    pub max_bisection_depth: usize,
    /// Consecutive rejected steps tolerated before a direction gives up.
    pub max_retries: usize,
    /// Newton iteration count at or below which convergence counts as fast.
    pub fast_corrector_iterations: usize,
    pub step_growth: f64,
    pub step_shrink: f64,
    /// Smallest damping factor tried in the corrector line search.
    pub min_damping: f64,
    #[serde(default)]
    pub classifier: ClassifierSettings,
}

impl Default for ContinuationSettings {
    fn default() -> Self {
        Self {
            nominal_angle_rad: 2.0 * std::f64::consts::PI * (10.0 / 360.0),
            max_branches: 10,
            max_samples: 500,
            start_from_nearest_root: false,
            bidirectional_first_sweep: true,
            initial_step: 0.02,
            h_min: 1e-6,
            h_max: 0.5,
            residual_tolerance: 1e-8,
            max_corrector_iterations: 15,
            bisection_tolerance: 1e-6,
            max_bisection_depth: 60,
            max_retries: 40,
            fast_corrector_iterations: 3,
            step_growth: 1.5,
            step_shrink: 0.5,
            min_damping: 1.0 / 16.0,
            classifier: ClassifierSettings::default(),
        }
    }
}

impl ContinuationSettings {
    pub fn validate(&self) -> Result<(), ContinuationError> {
        let fail = |msg: &str| Err(ContinuationError::InvalidSettings(msg.to_string()));
        if !(self.h_min > 0.0) {
            return fail("h_min must be positive");
        }
        if self.h_max < self.h_min {
            return fail("h_max must not be smaller than h_min");
        }
        if self.initial_step < self.h_min || self.initial_step > self.h_max {
            return fail("initial_step must lie in [h_min, h_max]");
        }
        if !(self.residual_tolerance > 0.0) {
            return fail("residual_tolerance must be positive");
        }
        if !(self.bisection_tolerance > 0.0) {
            return fail("bisection_tolerance must be positive");
        }
        if self.max_corrector_iterations == 0 {
            return fail("max_corrector_iterations must be greater than zero");
        }
        if self.max_samples == 0 {
            return fail("max_samples must be greater than zero");
        }
        if !(self.nominal_angle_rad > 0.0) {
            return fail("nominal_angle_rad must be positive");
        }
        if !(self.step_growth >= 1.0) {
            return fail("step_growth must be at least 1");
        }
        if !(self.step_shrink > 0.0 && self.step_shrink < 1.0) {
            return fail("step_shrink must lie in (0, 1)");
        }
        if !(self.min_damping > 0.0 && self.min_damping <= 1.0) {
            return fail("min_damping must lie in (0, 1]");
        }
        Ok(())
    }
}

/// Number of parameters varied by a continuation problem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Codimension {
    One,
    Two,
}

impl Codimension {
    /// Number of active parameters trailing the continuation variables.
    pub fn param_count(&self) -> usize {
        match self {
            Codimension::One => 1,
            Codimension::Two => 2,
        }
    }
}

/// Classification of special points detected during continuation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PointType {
    SaddleNode,
    Hopf,
    FoldLimitCycle,
    BranchPoint,
    NeutralSaddle,
    PeriodDoubling,
    NeimarkSacker,
    Bautin,
    BogdanovTakens,
    Cusp,
}

impl PointType {
    pub fn codimension(&self) -> Codimension {
        match self {
            PointType::Bautin | PointType::BogdanovTakens | PointType::Cusp => Codimension::Two,
            _ => Codimension::One,
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PointType::SaddleNode => "saddle-node",
            PointType::Hopf => "hopf",
            PointType::FoldLimitCycle => "fold-of-limit-cycle",
            PointType::BranchPoint => "branch-point",
            PointType::NeutralSaddle => "neutral-saddle",
            PointType::PeriodDoubling => "period-doubling",
            PointType::NeimarkSacker => "neimark-sacker",
            PointType::Bautin => "bautin",
            PointType::BogdanovTakens => "bogdanov-takens",
            PointType::Cusp => "cusp",
        };
        f.write_str(name)
    }
}

/// Scalar test functions a problem can evaluate along its curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TestFunction {
    /// Parameter component of the tangent (turning point of an equilibrium branch).
    Fold,
    /// Parameter component of the tangent on a limit-cycle branch.
    CycleFold,
    /// det([J; tᵀ]), changes sign at simple branch points.
    BranchPoint,
    /// ∏_{i<j} (λᵢ + λⱼ): Hopf or neutral saddle of an equilibrium.
    Bialternate,
    /// det(A + I): a multiplier crosses -1.
    PeriodDoubling,
    /// ∏_{i<j} (μᵢμⱼ - 1): a multiplier pair crosses the unit circle.
    NeimarkSacker,
    BogdanovTakens,
    Cusp,
    /// First Lyapunov coefficient on a Hopf curve.
    Bautin,
}

impl fmt::Display for TestFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestFunction::Fold => "fold",
            TestFunction::CycleFold => "cycle-fold",
            TestFunction::BranchPoint => "branch-point",
            TestFunction::Bialternate => "bialternate",
            TestFunction::PeriodDoubling => "period-doubling",
            TestFunction::NeimarkSacker => "neimark-sacker",
            TestFunction::BogdanovTakens => "bogdanov-takens",
            TestFunction::Cusp => "cusp",
            TestFunction::Bautin => "bautin",
        };
        f.write_str(name)
    }
}

/// Sweep direction along the curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }
}

/// A single accepted point of a solution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Point on the curve; active parameters are the last coordinates.
    pub u: Vec<f64>,
    /// Unit tangent oriented in the direction of travel.
    pub tangent: Vec<f64>,
    /// Step size that produced this point (0 for the seed).
    pub step_size: f64,
    pub test_values: Vec<f64>,
    pub corrector_iterations: usize,
}

impl HistoryPoint {
    /// Continuation variables without the active parameters.
    pub fn state(&self, codimension: Codimension) -> &[f64] {
        let split = self.u.len().saturating_sub(codimension.param_count());
        &self.u[..split]
    }

    /// Active parameter values.
    pub fn params(&self, codimension: Codimension) -> &[f64] {
        let split = self.u.len().saturating_sub(codimension.param_count());
        &self.u[split..]
    }
}

/// Outcome of classifying a localized event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PointClass {
    Classified(PointType),
    /// Several discriminating conditions fired together; kept unlabeled.
    Ambiguous(Vec<PointType>),
    /// The sign change could not be localized; the bracket end is reported.
    Unresolved,
}

/// Type-specific scalars computed at a localized special point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuxiliaryValues {
    #[serde(default)]
    pub eigenvalues: Vec<Complex<f64>>,
    /// Frequency of the critical eigenvalue pair.
    pub omega: Option<f64>,
    /// ω² carried by Hopf curves (negative on the neutral-saddle side).
    pub kappa: Option<f64>,
    pub lyapunov_coefficient: Option<f64>,
    /// Quadratic normal-form coefficient wᵀB(v, v) on saddle-node curves.
    pub cusp_coefficient: Option<f64>,
    /// Σᵢ∏_{j≠i}λⱼ on saddle-node curves; vanishes at a double zero eigenvalue.
    pub bogdanov_takens_test: Option<f64>,
}

/// A localized point on the curve where the qualitative structure changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialPoint {
    pub class: PointClass,
    pub codimension: Codimension,
    /// Test functions whose sign change produced this point.
    pub tests: Vec<TestFunction>,
    pub u: Vec<f64>,
    pub tangent: Vec<f64>,
    /// Index of the sweep in the owning [`Solution`].
    pub sweep: usize,
    /// Bracketing history indices within that sweep.
    pub interval: (usize, usize),
    pub aux: AuxiliaryValues,
}

impl SpecialPoint {
    pub fn point_type(&self) -> Option<PointType> {
        match &self.class {
            PointClass::Classified(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is(&self, kind: PointType) -> bool {
        self.point_type() == Some(kind)
    }
}

/// Why a sweep direction stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TerminationReason {
    LeftDomain,
    MaxSamples,
    StepAdaptationFailure,
}

/// Non-fatal conditions accumulated while sweeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Diagnostic {
    CorrectorDivergence {
        step_size: f64,
        iterations: usize,
        residual_norm: f64,
    },
    StepAdaptationFailure {
        h_min: f64,
        h_max: f64,
        retries: usize,
    },
    UnresolvedEvent {
        interval: (usize, usize),
        test: TestFunction,
    },
    AmbiguousClassification {
        interval: (usize, usize),
        candidates: Vec<PointType>,
    },
}

/// Where a sweep started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SweepOrigin {
    Initial,
    /// Secondary branch emanating from the special point with this index.
    BranchPoint(usize),
}

/// Solution history of one sweep direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepHistory {
    pub direction: Direction,
    pub origin: SweepOrigin,
    pub points: Vec<HistoryPoint>,
    pub termination: Option<TerminationReason>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SweepHistory {
    pub fn new(direction: Direction, origin: SweepOrigin) -> Self {
        Self {
            direction,
            origin,
            points: Vec::new(),
            termination: None,
            diagnostics: Vec::new(),
        }
    }
}

/// Result of a full continuation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub codimension: Codimension,
    pub sweeps: Vec<SweepHistory>,
    pub special_points: Vec<SpecialPoint>,
}

impl Solution {
    /// Classified special points of the given type, in detection order.
    pub fn special_points_of(&self, kind: PointType) -> Vec<&SpecialPoint> {
        self.special_points.iter().filter(|p| p.is(kind)).collect()
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.sweeps.iter().flat_map(|s| s.diagnostics.iter())
    }

    /// Fails with the first event that was detected but not labeled.
    pub fn ensure_classified(&self) -> Result<(), ContinuationError> {
        match self.diagnostics().find(|d| {
            matches!(
                d,
                Diagnostic::UnresolvedEvent { .. } | Diagnostic::AmbiguousClassification { .. }
            )
        }) {
            Some(diagnostic) => Err(diagnostic.into()),
            None => Ok(()),
        }
    }

    /// Primary branch as one ordered sequence: the backward sweep reversed,
    /// followed by the forward sweep without its duplicated seed.
    pub fn merged_points(&self) -> Vec<&HistoryPoint> {
        let primary = |dir: Direction| {
            self.sweeps
                .iter()
                .find(|s| s.origin == SweepOrigin::Initial && s.direction == dir)
        };
        let mut merged: Vec<&HistoryPoint> = Vec::new();
        let backward = primary(Direction::Backward);
        if let Some(backward) = backward {
            merged.extend(backward.points.iter().rev());
        }
        if let Some(forward) = primary(Direction::Forward) {
            let skip = usize::from(backward.is_some() && !merged.is_empty());
            merged.extend(forward.points.iter().skip(skip));
        }
        merged
    }
}
