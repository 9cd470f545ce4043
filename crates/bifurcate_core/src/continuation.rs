pub mod branch;
pub mod cache;
pub mod classify;
pub mod codim1_curves;
pub mod corrector;
pub mod driver;
pub mod events;
pub mod fixed_point;
pub mod homotopy;
pub mod limit_cycle;
pub mod normal_form;
pub mod predictor;
pub mod problem;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_systems;

pub use branch::{BifurcationProblem, CurveKind, SpecialPointSnapshot, SwitchTarget};
pub use codim1_curves::{
    FoldLimitCycleCurveProblem, HopfCurveProblem, ParamPlane, SaddleNodeCurveProblem,
};
pub use driver::{Solver, Sweep, SweepPhase};
pub use fixed_point::FixedPointProblem;
pub use homotopy::HomotopyProblem;
pub use limit_cycle::{LimitCycleProblem, DEFAULT_SHOOTING_STEPS};
pub use problem::{ContinuationProblem, DomainBox, ParamAxis};
pub use types::{
    AuxiliaryValues, ClassifierSettings, Codimension, ContinuationSettings, Diagnostic, Direction,
    HistoryPoint, PointClass, PointType, Solution, SpecialPoint, SweepHistory, SweepOrigin,
    TerminationReason, TestFunction,
};
