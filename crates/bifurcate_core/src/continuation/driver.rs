//! Continuation driver.
//!
//! A [`Solver`] owns an immutable problem and its settings, snaps and
//! orients the seed, and runs [`Sweep`]s: one per direction from the seed,
//! then two per branch point that is switched automatically. Each sweep is
//! a small state machine advanced by [`Sweep::step`], so callers can stop
//! between steps.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

use super::cache::ContinuationCache;
use super::classify::classify;
use super::corrector::{correct, CorrectorOutcome, CorrectorWorkspace};
use super::events::{
    group_events, landed_zeros, localize, sign_changes, Bracket, Localization, Probe,
};
use super::predictor::{oriented_tangent, predict, StepController, StepDecision};
use super::problem::ContinuationProblem;
use super::types::{
    AuxiliaryValues, ContinuationSettings, Diagnostic, Direction, HistoryPoint, PointClass,
    PointType, Solution, SpecialPoint, SweepHistory, SweepOrigin, TerminationReason,
    TestFunction,
};
use super::util::{compute_nullspace_tangent, orient_tangent, secondary_direction, tangent_angle};
use crate::error::ContinuationError;

/// Where a sweep is in its predict-correct cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    Predicting,
    Correcting,
    Accepted,
    Rejected,
    Terminated(TerminationReason),
}

/// Starting point of a sweep with its forward tangent.
#[derive(Debug, Clone)]
struct Seed {
    u: DVector<f64>,
    tangent: DVector<f64>,
    /// The seed is itself a special point; its test values are left
    /// undefined so the first step cannot report it again.
    singular: bool,
}

/// Committed state at the start of the step being processed.
struct StepStart {
    u: DVector<f64>,
    tangent: DVector<f64>,
    test_values: Vec<f64>,
}

pub struct Solver<P: ContinuationProblem> {
    problem: P,
    settings: ContinuationSettings,
    seed: Seed,
}

impl<P: ContinuationProblem> Solver<P> {
    /// Validates the settings and the seed, optionally re-converging it onto
    /// the curve, and computes the initial tangent.
    pub fn new(problem: P, settings: ContinuationSettings) -> Result<Self, ContinuationError> {
        settings.validate()?;
        let dim = problem.dimension();
        let mut u = problem.initial_point();
        if u.len() != dim + 1 {
            return Err(ContinuationError::DimensionMismatch {
                expected: dim + 1,
                actual: u.len(),
            });
        }
        domain_check(&problem, &u)?;

        let mut cache = problem.new_cache();
        let mut ws = CorrectorWorkspace::new(dim);
        if settings.start_from_nearest_root {
            let normal = match problem.seed_direction() {
                Some(direction) => direction,
                None => {
                    problem.residual_jacobian(&u, &mut cache, &mut ws.residual, &mut ws.jacobian)?;
                    compute_nullspace_tangent(&ws.jacobian)?
                }
            };
            match correct(&problem, &mut cache, &mut ws, &u, &normal, &settings)? {
                CorrectorOutcome::Converged {
                    iterations,
                    residual_norm,
                } => {
                    debug!(
                        "seed converged in {} iterations (|H| = {:.3e})",
                        iterations, residual_norm
                    );
                    u.copy_from(&ws.u);
                }
                CorrectorOutcome::Diverged {
                    iterations,
                    residual_norm,
                } => {
                    return Err(ContinuationError::CorrectorDivergence {
                        iterations,
                        residual_norm,
                    })
                }
                CorrectorOutcome::OutOfDomain { .. } => {
                    domain_check(&problem, &ws.u)?;
                    u.copy_from(&ws.u);
                }
            }
        }

        problem.residual_jacobian(&u, &mut cache, &mut ws.residual, &mut ws.jacobian)?;
        let mut tangent = compute_nullspace_tangent(&ws.jacobian)?;
        match problem.seed_direction() {
            Some(direction) if tangent.dot(&direction).abs() > 1e-12 => {
                orient_tangent(&mut tangent, &direction)
            }
            _ => orient_by_sign(&mut tangent),
        }

        Ok(Self {
            problem,
            settings,
            seed: Seed {
                u,
                tangent,
                singular: false,
            },
        })
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn settings(&self) -> &ContinuationSettings {
        &self.settings
    }

    /// Seed point after optional snapping.
    pub fn initial_point(&self) -> &DVector<f64> {
        &self.seed.u
    }

    /// Unit tangent at the seed in the forward direction.
    pub fn initial_tangent(&self) -> &DVector<f64> {
        &self.seed.tangent
    }

    /// A primary sweep from the seed, to be driven with [`Sweep::step`].
    pub fn sweep(&self, direction: Direction) -> Result<Sweep<'_, P>, ContinuationError> {
        Sweep::new(
            &self.problem,
            &self.settings,
            &self.seed,
            direction,
            SweepOrigin::Initial,
        )
    }

    /// Runs the primary sweeps and the automatic branch switches.
    pub fn solve(&self) -> Result<Solution, ContinuationError> {
        let mut solution = Solution {
            codimension: self.problem.codimension(),
            sweeps: Vec::new(),
            special_points: Vec::new(),
        };

        let directions: &[Direction] = if self.settings.bidirectional_first_sweep {
            &[Direction::Forward, Direction::Backward]
        } else {
            &[Direction::Forward]
        };
        for &direction in directions {
            run_sweep(self.sweep(direction)?, &mut solution)?;
        }

        if self.settings.bidirectional_first_sweep
            && solution.sweeps.iter().all(|s| {
                s.points.len() <= 1
                    && s.termination == Some(TerminationReason::StepAdaptationFailure)
            })
        {
            let retries = solution
                .diagnostics()
                .filter(|d| matches!(d, Diagnostic::CorrectorDivergence { .. }))
                .count();
            return Err(ContinuationError::StepAdaptationFailure {
                h_min: self.settings.h_min,
                h_max: self.settings.h_max,
                retries,
            });
        }

        self.switch_at_branch_points(&mut solution)?;
        Ok(solution)
    }

    fn switch_at_branch_points(&self, solution: &mut Solution) -> Result<(), ContinuationError> {
        let mut branches = 0;
        let mut next = 0;
        while next < solution.special_points.len() && branches < self.settings.max_branches {
            let index = next;
            next += 1;
            let point = &solution.special_points[index];
            if !point.is(PointType::BranchPoint) {
                continue;
            }
            let u = DVector::from_column_slice(&point.u);
            let tangent = DVector::from_column_slice(&point.tangent);
            let direction = match self.branch_direction(&u, &tangent) {
                Ok(direction) => direction,
                Err(err) => {
                    warn!("skipping branch switch at point {}: {}", index, err);
                    continue;
                }
            };
            branches += 1;
            info!(
                "switching branches at point {} ({} of at most {})",
                index, branches, self.settings.max_branches
            );
            let seed = Seed {
                u,
                tangent: direction,
                singular: true,
            };
            for direction in [Direction::Forward, Direction::Backward] {
                let sweep = Sweep::new(
                    &self.problem,
                    &self.settings,
                    &seed,
                    direction,
                    SweepOrigin::BranchPoint(index),
                )?;
                run_sweep(sweep, solution)?;
            }
        }
        Ok(())
    }

    fn branch_direction(
        &self,
        u: &DVector<f64>,
        tangent: &DVector<f64>,
    ) -> Result<DVector<f64>, ContinuationError> {
        let dim = self.problem.dimension();
        let mut cache = self.problem.new_cache();
        let mut residual = DVector::zeros(dim);
        let mut jacobian = DMatrix::zeros(dim, dim + 1);
        self.problem
            .residual_jacobian(u, &mut cache, &mut residual, &mut jacobian)?;
        Ok(secondary_direction(&jacobian, tangent)?)
    }
}

fn domain_check<P: ContinuationProblem>(
    problem: &P,
    u: &DVector<f64>,
) -> Result<(), ContinuationError> {
    match problem.domain().first_violation(u.as_slice()) {
        Some((index, value, lower, upper)) => Err(ContinuationError::Domain {
            index,
            value,
            lower,
            upper,
        }),
        None => Ok(()),
    }
}

/// Forward orientation without a reference: the trailing (parameter)
/// component non-negative, or else the first non-zero component positive.
fn orient_by_sign(tangent: &mut DVector<f64>) {
    const EPS: f64 = 1e-12;
    let last = tangent[tangent.len() - 1];
    let sign = if last.abs() > EPS {
        last
    } else {
        tangent.iter().copied().find(|v| v.abs() > EPS).unwrap_or(1.0)
    };
    if sign < 0.0 {
        *tangent *= -1.0;
    }
}

/// Drives `sweep` to termination and appends its history and special
/// points to `solution`.
fn run_sweep<P: ContinuationProblem>(
    mut sweep: Sweep<'_, P>,
    solution: &mut Solution,
) -> Result<(), ContinuationError> {
    while !matches!(sweep.step()?, SweepPhase::Terminated(_)) {}
    let index = solution.sweeps.len();
    let (history, mut points) = sweep.into_parts();
    for point in &mut points {
        point.sweep = index;
    }
    solution.sweeps.push(history);
    solution.special_points.extend(points);
    Ok(())
}

/// One direction of travel along the curve.
pub struct Sweep<'a, P: ContinuationProblem> {
    problem: &'a P,
    settings: &'a ContinuationSettings,
    controller: StepController,
    tests: Vec<TestFunction>,
    cache: ContinuationCache<P::Cache>,
    history: SweepHistory,
    special_points: Vec<SpecialPoint>,
    retries: usize,
    phase: SweepPhase,
}

impl<'a, P: ContinuationProblem> Sweep<'a, P> {
    fn new(
        problem: &'a P,
        settings: &'a ContinuationSettings,
        seed: &Seed,
        direction: Direction,
        origin: SweepOrigin,
    ) -> Result<Self, ContinuationError> {
        let mut cache =
            ContinuationCache::new(problem, seed.u.clone(), settings.initial_step, direction);
        cache.tangent = &seed.tangent * direction.sign();
        problem.residual_jacobian(
            &cache.u,
            &mut cache.problem,
            &mut cache.residual,
            &mut cache.jacobian,
        )?;
        // Tests that read the tangent depend on the direction of travel.
        if seed.singular {
            cache.test_values.fill(f64::NAN);
        } else {
            problem.evaluate_tests(
                &cache.u,
                &cache.tangent,
                &cache.jacobian,
                &mut cache.problem,
                &mut cache.test_values,
            )?;
        }

        let mut history = SweepHistory::new(direction, origin);
        history.points.push(HistoryPoint {
            u: seed.u.iter().copied().collect(),
            tangent: cache.tangent.iter().copied().collect(),
            step_size: 0.0,
            test_values: cache.test_values.clone(),
            corrector_iterations: 0,
        });

        Ok(Self {
            problem,
            settings,
            controller: StepController::new(settings),
            tests: problem.test_functions(),
            cache,
            history,
            special_points: Vec::new(),
            retries: 0,
            phase: SweepPhase::Idle,
        })
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    pub fn direction(&self) -> Direction {
        self.cache.direction
    }

    /// Step size the next predictor will use.
    pub fn step_size(&self) -> f64 {
        self.cache.step_size
    }

    /// Whether the most recent correction converged.
    pub fn corrector_converged(&self) -> bool {
        self.cache.corrector_success
    }

    /// Whether the sweep gave up for lack of an admissible step.
    pub fn adaptation_failed(&self) -> bool {
        !self.cache.adaptation_success
    }

    pub fn history(&self) -> &SweepHistory {
        &self.history
    }

    /// Special points found so far; their `sweep` index is assigned once the
    /// sweep is added to a [`Solution`].
    pub fn special_points(&self) -> &[SpecialPoint] {
        &self.special_points
    }

    pub fn into_parts(self) -> (SweepHistory, Vec<SpecialPoint>) {
        (self.history, self.special_points)
    }

    /// Performs one predict-correct cycle and returns the resulting phase:
    /// `Accepted`, `Rejected` (retry from the same point with a smaller
    /// step), or `Terminated`.
    pub fn step(&mut self) -> Result<SweepPhase, ContinuationError> {
        if let SweepPhase::Terminated(reason) = self.phase {
            return Ok(SweepPhase::Terminated(reason));
        }
        if self.history.points.len() > self.settings.max_samples {
            return Ok(self.terminate(TerminationReason::MaxSamples));
        }

        self.phase = SweepPhase::Predicting;
        let step_size = self.cache.step_size;
        let u_pred = predict(&self.cache.u, &self.cache.tangent, step_size);

        self.phase = SweepPhase::Correcting;
        let outcome = correct(
            self.problem,
            &mut self.cache.problem,
            &mut self.cache.trial,
            &u_pred,
            &self.cache.tangent,
            self.settings,
        )?;

        match outcome {
            CorrectorOutcome::Converged { iterations, .. } => {
                let tangent = match oriented_tangent(&self.cache.trial.jacobian, &self.cache.tangent) {
                    Ok(tangent) => tangent,
                    Err(err) => {
                        debug!("tangent failed after convergence: {}", err);
                        return Ok(self.after_failure(step_size, iterations, f64::NAN));
                    }
                };
                let angle = tangent_angle(&self.cache.tangent, &tangent);
                match self.controller.after_convergence(
                    step_size,
                    angle,
                    iterations,
                    self.cache.simple_bifurcation,
                ) {
                    StepDecision::Reject { next_step } => {
                        debug!(
                            "rejected step h = {:.3e}: tangent turned {:.3} rad",
                            step_size, angle
                        );
                        self.retries += 1;
                        if self.retries > self.settings.max_retries {
                            return Ok(self.adaptation_failure());
                        }
                        self.cache.step_size = next_step;
                        self.phase = SweepPhase::Rejected;
                        Ok(self.phase)
                    }
                    StepDecision::Accept { next_step } => {
                        self.accept(tangent, step_size, iterations)?;
                        self.cache.step_size = next_step;
                        Ok(self.phase)
                    }
                }
            }
            CorrectorOutcome::Diverged {
                iterations,
                residual_norm,
            } => Ok(self.after_failure(step_size, iterations, residual_norm)),
            CorrectorOutcome::OutOfDomain { .. } => {
                Ok(self.terminate(TerminationReason::LeftDomain))
            }
        }
    }

    fn after_failure(&mut self, step_size: f64, iterations: usize, residual_norm: f64) -> SweepPhase {
        self.cache.corrector_success = false;
        self.history.diagnostics.push(Diagnostic::CorrectorDivergence {
            step_size,
            iterations,
            residual_norm,
        });
        debug!(
            "corrector diverged at h = {:.3e} after {} iterations (|H| = {:.3e})",
            step_size, iterations, residual_norm
        );
        match self.controller.after_failure(step_size, self.retries) {
            Some(next_step) => {
                self.retries += 1;
                self.cache.step_size = next_step;
                self.phase = SweepPhase::Rejected;
                self.phase
            }
            None => self.adaptation_failure(),
        }
    }

    fn adaptation_failure(&mut self) -> SweepPhase {
        self.cache.adaptation_success = false;
        warn!(
            "{:?} sweep: no admissible step in [{:e}, {:e}] after {} retries",
            self.history.direction, self.settings.h_min, self.settings.h_max, self.retries
        );
        self.history.diagnostics.push(Diagnostic::StepAdaptationFailure {
            h_min: self.settings.h_min,
            h_max: self.settings.h_max,
            retries: self.retries,
        });
        self.terminate(TerminationReason::StepAdaptationFailure)
    }

    fn terminate(&mut self, reason: TerminationReason) -> SweepPhase {
        info!(
            "{:?} sweep terminated ({:?}) with {} points",
            self.history.direction,
            reason,
            self.history.points.len()
        );
        self.history.termination = Some(reason);
        self.phase = SweepPhase::Terminated(reason);
        self.phase
    }

    fn accept(
        &mut self,
        tangent: DVector<f64>,
        step_size: f64,
        iterations: usize,
    ) -> Result<(), ContinuationError> {
        let mut test_values = vec![0.0; self.tests.len()];
        self.problem.evaluate_tests(
            &self.cache.trial.u,
            &tangent,
            &self.cache.trial.jacobian,
            &mut self.cache.problem,
            &mut test_values,
        )?;

        let start = StepStart {
            u: self.cache.u.clone(),
            tangent: std::mem::replace(&mut self.cache.tangent, tangent),
            test_values: std::mem::replace(&mut self.cache.test_values, test_values),
        };
        self.cache.commit_trial();
        self.cache.corrector_success = true;
        self.retries = 0;

        self.history.points.push(HistoryPoint {
            u: self.cache.u.iter().copied().collect(),
            tangent: self.cache.tangent.iter().copied().collect(),
            step_size,
            test_values: self.cache.test_values.clone(),
            corrector_iterations: iterations,
        });
        debug!(
            "accepted point {} with h = {:.3e} after {} iterations",
            self.history.points.len() - 1,
            step_size,
            iterations
        );

        let changed = sign_changes(&start.test_values, &self.cache.test_values);
        let landed = landed_zeros(&start.test_values, &self.cache.test_values);
        self.cache.simple_bifurcation = !changed.is_empty() || !landed.is_empty();
        if self.cache.simple_bifurcation {
            self.handle_events(&start, step_size, &changed, &landed)?;
        }
        self.phase = SweepPhase::Accepted;
        Ok(())
    }

    fn handle_events(
        &mut self,
        start: &StepStart,
        step_size: f64,
        changed: &[usize],
        landed: &[usize],
    ) -> Result<(), ContinuationError> {
        let end = self.history.points.len() - 1;
        let interval = (end - 1, end);
        let bracket = Bracket {
            start: &start.u,
            tangent: &start.tangent,
            step_size,
            start_values: &start.test_values,
        };

        let mut localized = Vec::with_capacity(changed.len() + landed.len());
        // The accepted point itself is the special point.
        for &index in landed {
            let landing = Probe {
                s: step_size,
                u: self.cache.u.clone(),
                tangent: self.cache.tangent.clone(),
                jacobian: self.cache.jacobian.clone(),
                test_values: self.cache.test_values.clone(),
            };
            localized.push((self.tests[index], Localization::Located(landing)));
        }
        for &index in changed {
            let localization = localize(
                self.problem,
                &mut self.cache.problem,
                &mut self.cache.trial,
                &bracket,
                index,
                self.settings,
            )?;
            localized.push((self.tests[index], localization));
        }

        for group in group_events(localized, self.settings.bisection_tolerance) {
            let point = match group.localization {
                Localization::Located(probe) => {
                    let aux = self
                        .problem
                        .auxiliary(&probe.u, &probe.tangent, &probe.jacobian, &mut self.cache.problem)
                        .unwrap_or_else(|err| {
                            warn!("auxiliary values unavailable: {}", err);
                            AuxiliaryValues::default()
                        });
                    let class = classify(&group.tests, &aux, &self.settings.classifier);
                    match &class {
                        PointClass::Classified(kind) => info!(
                            "detected {} between points {} and {}",
                            kind, interval.0, interval.1
                        ),
                        PointClass::Ambiguous(candidates) => {
                            warn!(
                                "ambiguous event between points {} and {}: {:?}",
                                interval.0, interval.1, candidates
                            );
                            self.history
                                .diagnostics
                                .push(Diagnostic::AmbiguousClassification {
                                    interval,
                                    candidates: candidates.clone(),
                                });
                        }
                        PointClass::Unresolved => {}
                    }
                    SpecialPoint {
                        class,
                        codimension: self.problem.codimension(),
                        tests: group.tests,
                        u: probe.u.iter().copied().collect(),
                        tangent: probe.tangent.iter().copied().collect(),
                        sweep: 0,
                        interval,
                        aux,
                    }
                }
                Localization::Unresolved { s } => {
                    for &test in &group.tests {
                        warn!(
                            "could not localize {} between points {} and {} (s = {:.3e})",
                            test, interval.0, interval.1, s
                        );
                        self.history
                            .diagnostics
                            .push(Diagnostic::UnresolvedEvent { interval, test });
                    }
                    SpecialPoint {
                        class: PointClass::Unresolved,
                        codimension: self.problem.codimension(),
                        tests: group.tests,
                        u: self.cache.u.iter().copied().collect(),
                        tangent: self.cache.tangent.iter().copied().collect(),
                        sweep: 0,
                        interval,
                        aux: AuxiliaryValues::default(),
                    }
                }
            };
            self.special_points.push(point);
        }
        Ok(())
    }
}
