//! Event detection and localization.
//!
//! A test function fires when its values at two consecutive accepted points
//! are finite and of opposite sign, or when an accepted point lands exactly
//! on its zero. A crossing inside the step is localized by bisection
//! along the arc parameter s ∈ [0, h] of the step: each probe predicts
//! u + s·t and corrects in the hyperplane orthogonal to t.

use anyhow::Result;
use log::debug;
use nalgebra::{DMatrix, DVector};

use super::corrector::{correct, CorrectorWorkspace};
use super::predictor::{oriented_tangent, predict};
use super::problem::ContinuationProblem;
use super::types::{ContinuationSettings, TestFunction};

/// Indices of test functions that changed sign between two points.
pub fn sign_changes(previous: &[f64], current: &[f64]) -> Vec<usize> {
    previous
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (a, b))| a.is_finite() && b.is_finite() && **a * **b < 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// Indices of test functions that were non-zero at the previous point and
/// are exactly zero at the current one. The step ends on the special point,
/// so no sign change will follow it.
pub fn landed_zeros(previous: &[f64], current: &[f64]) -> Vec<usize> {
    previous
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (a, b))| a.is_finite() && **a != 0.0 && **b == 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// A converged point on the curve inside a bracketed step.
#[derive(Debug, Clone)]
pub struct Probe {
    /// Arc parameter measured from the start of the step.
    pub s: f64,
    pub u: DVector<f64>,
    pub tangent: DVector<f64>,
    pub jacobian: DMatrix<f64>,
    pub test_values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub enum Localization {
    Located(Probe),
    /// Depth exhausted or a probe failed; `s` is the bracket midpoint reached.
    Unresolved { s: f64 },
}

/// The accepted step that bracketed one or more sign changes.
pub struct Bracket<'a> {
    pub start: &'a DVector<f64>,
    pub tangent: &'a DVector<f64>,
    pub step_size: f64,
    pub start_values: &'a [f64],
}

fn probe_at<P: ContinuationProblem>(
    problem: &P,
    cache: &mut P::Cache,
    ws: &mut CorrectorWorkspace,
    bracket: &Bracket<'_>,
    s: f64,
    settings: &ContinuationSettings,
) -> Result<Option<Probe>> {
    let u_pred = predict(bracket.start, bracket.tangent, s);
    let outcome = correct(problem, cache, ws, &u_pred, bracket.tangent, settings)?;
    if !outcome.is_converged() {
        return Ok(None);
    }
    let tangent = match oriented_tangent(&ws.jacobian, bracket.tangent) {
        Ok(t) => t,
        Err(_) => return Ok(None),
    };
    let mut test_values = vec![0.0; bracket.start_values.len()];
    problem.evaluate_tests(&ws.u, &tangent, &ws.jacobian, cache, &mut test_values)?;
    Ok(Some(Probe {
        s,
        u: ws.u.clone(),
        tangent,
        jacobian: ws.jacobian.clone(),
        test_values,
    }))
}

/// Bisects the sign change of test `index` inside `bracket`.
pub fn localize<P: ContinuationProblem>(
    problem: &P,
    cache: &mut P::Cache,
    ws: &mut CorrectorWorkspace,
    bracket: &Bracket<'_>,
    index: usize,
    settings: &ContinuationSettings,
) -> Result<Localization> {
    let start_sign = bracket.start_values[index].signum();
    let (mut lo, mut hi) = (0.0, bracket.step_size);
    let mut depth = 0;

    while hi - lo > settings.bisection_tolerance {
        if depth >= settings.max_bisection_depth {
            return Ok(Localization::Unresolved { s: 0.5 * (lo + hi) });
        }
        depth += 1;
        let mid = 0.5 * (lo + hi);
        let probe = match probe_at(problem, cache, ws, bracket, mid, settings)? {
            Some(probe) => probe,
            None => return Ok(Localization::Unresolved { s: mid }),
        };
        let value = probe.test_values[index];
        if !value.is_finite() {
            return Ok(Localization::Unresolved { s: mid });
        }
        if value == 0.0 {
            return Ok(Localization::Located(probe));
        }
        if value.signum() == start_sign {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let s = 0.5 * (lo + hi);
    debug!("localized test {} at s = {:.6e} after {} bisections", index, s, depth);
    Ok(match probe_at(problem, cache, ws, bracket, s, settings)? {
        Some(probe) => Localization::Located(probe),
        None => Localization::Unresolved { s },
    })
}

/// Tests grouped into a single event.
#[derive(Debug, Clone)]
pub struct EventGroup {
    pub tests: Vec<TestFunction>,
    pub localization: Localization,
}

/// Merges localized tests whose arc parameters lie within `tolerance` of
/// each other. Unresolved tests each form their own event.
pub fn group_events(
    mut localized: Vec<(TestFunction, Localization)>,
    tolerance: f64,
) -> Vec<EventGroup> {
    let s_of = |l: &Localization| match l {
        Localization::Located(p) => p.s,
        Localization::Unresolved { s } => *s,
    };
    localized.sort_by(|a, b| s_of(&a.1).total_cmp(&s_of(&b.1)));

    let mut groups: Vec<EventGroup> = Vec::new();
    for (test, localization) in localized {
        if let (Localization::Located(p), Some(last)) = (&localization, groups.last_mut()) {
            if let Localization::Located(anchor) = &last.localization {
                if (p.s - anchor.s).abs() <= tolerance {
                    last.tests.push(test);
                    continue;
                }
            }
        }
        groups.push(EventGroup {
            tests: vec![test],
            localization,
        });
    }
    groups
}
