//! Special point classifier.
//!
//! Maps the test functions that changed sign within one localized event,
//! together with the auxiliary values at the localized point, to a label.
//! Deterministic: equal inputs always produce equal labels.

use super::types::{AuxiliaryValues, ClassifierSettings, PointClass, PointType, TestFunction};
use super::util::{critical_product_pair, critical_sum_pair};

/// Candidate labels contributed by a single test function.
fn candidates_for(
    test: TestFunction,
    aux: &AuxiliaryValues,
    settings: &ClassifierSettings,
) -> Vec<PointType> {
    let complex_pair = |pair: Option<(num_complex::Complex<f64>, num_complex::Complex<f64>)>| {
        pair.map(|(a, b)| a.im.abs().min(b.im.abs()) >= settings.hopf_min_imag)
    };
    match test {
        TestFunction::Fold => vec![PointType::SaddleNode],
        TestFunction::CycleFold => vec![PointType::FoldLimitCycle],
        TestFunction::BranchPoint => vec![PointType::BranchPoint],
        TestFunction::PeriodDoubling => vec![PointType::PeriodDoubling],
        TestFunction::BogdanovTakens => vec![PointType::BogdanovTakens],
        TestFunction::Cusp => vec![PointType::Cusp],
        TestFunction::Bialternate => match complex_pair(critical_sum_pair(&aux.eigenvalues)) {
            Some(true) => vec![PointType::Hopf],
            Some(false) => vec![PointType::NeutralSaddle],
            None => vec![PointType::Hopf, PointType::NeutralSaddle],
        },
        TestFunction::NeimarkSacker => match complex_pair(critical_product_pair(&aux.eigenvalues))
        {
            Some(true) => vec![PointType::NeimarkSacker],
            Some(false) => vec![PointType::NeutralSaddle],
            None => vec![PointType::NeimarkSacker, PointType::NeutralSaddle],
        },
        TestFunction::Bautin => match aux.kappa {
            Some(kappa) if kappa >= settings.bautin_min_kappa => vec![PointType::Bautin],
            _ => vec![PointType::Bautin, PointType::BogdanovTakens],
        },
    }
}

/// Labels an event formed by the sign changes of `tests`.
///
/// Any disagreement between the tests, or a test whose own discriminating
/// condition is inconclusive, yields [`PointClass::Ambiguous`].
pub fn classify(
    tests: &[TestFunction],
    aux: &AuxiliaryValues,
    settings: &ClassifierSettings,
) -> PointClass {
    let mut candidates: Vec<PointType> = Vec::new();
    let mut inconclusive = false;
    for &test in tests {
        let labels = candidates_for(test, aux, settings);
        inconclusive |= labels.len() > 1;
        for label in labels {
            if !candidates.contains(&label) {
                candidates.push(label);
            }
        }
    }
    match candidates.as_slice() {
        [single] if !inconclusive => PointClass::Classified(*single),
        _ => PointClass::Ambiguous(candidates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    fn aux_with(eigenvalues: Vec<Complex<f64>>) -> AuxiliaryValues {
        AuxiliaryValues {
            eigenvalues,
            ..AuxiliaryValues::default()
        }
    }

    #[test]
    fn fold_tests_map_to_their_branch_type() {
        let settings = ClassifierSettings::default();
        let aux = AuxiliaryValues::default();
        assert_eq!(
            classify(&[TestFunction::Fold], &aux, &settings),
            PointClass::Classified(PointType::SaddleNode)
        );
        assert_eq!(
            classify(&[TestFunction::CycleFold], &aux, &settings),
            PointClass::Classified(PointType::FoldLimitCycle)
        );
    }

    #[test]
    fn bialternate_separates_hopf_from_neutral_saddle() {
        let settings = ClassifierSettings::default();
        let hopf = aux_with(vec![
            Complex::new(0.0, 1.0),
            Complex::new(0.0, -1.0),
            Complex::new(-2.0, 0.0),
        ]);
        assert_eq!(
            classify(&[TestFunction::Bialternate], &hopf, &settings),
            PointClass::Classified(PointType::Hopf)
        );
        let saddle = aux_with(vec![Complex::new(1.0, 0.0), Complex::new(-1.0, 0.0)]);
        assert_eq!(
            classify(&[TestFunction::Bialternate], &saddle, &settings),
            PointClass::Classified(PointType::NeutralSaddle)
        );
        assert!(matches!(
            classify(&[TestFunction::Bialternate], &AuxiliaryValues::default(), &settings),
            PointClass::Ambiguous(_)
        ));
    }

    #[test]
    fn bautin_requires_positive_kappa_margin() {
        let settings = ClassifierSettings {
            bautin_min_kappa: 1e-3,
            ..ClassifierSettings::default()
        };
        let mut aux = AuxiliaryValues {
            kappa: Some(0.5),
            ..AuxiliaryValues::default()
        };
        assert_eq!(
            classify(&[TestFunction::Bautin], &aux, &settings),
            PointClass::Classified(PointType::Bautin)
        );
        aux.kappa = Some(1e-4);
        assert_eq!(
            classify(&[TestFunction::Bautin], &aux, &settings),
            PointClass::Ambiguous(vec![PointType::Bautin, PointType::BogdanovTakens])
        );
    }

    #[test]
    fn coincident_tests_are_ambiguous_and_classification_is_idempotent() {
        let settings = ClassifierSettings::default();
        let aux = AuxiliaryValues::default();
        let tests = [TestFunction::Fold, TestFunction::BranchPoint];
        let first = classify(&tests, &aux, &settings);
        assert_eq!(
            first,
            PointClass::Ambiguous(vec![PointType::SaddleNode, PointType::BranchPoint])
        );
        assert_eq!(classify(&tests, &aux, &settings), first);
    }
}
