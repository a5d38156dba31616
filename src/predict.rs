//! `PredictAggregator`: sums learning-rate-weighted tree outputs onto the
//! frozen init score, then maps the raw vector to labels / probabilities
//! through the ensemble's `Loss` (§4.6).
//!
//! Grounded on `original_source/.../model_alltrees.py::Predict`/
//! `PredictLabels`/`PredictProba`, restructured as free functions that
//! dispatch on `Loss` rather than three separately-named methods, since the
//! raw-score summation is identical across tasks and only the final mapping
//! differs.

use rayon::prelude::*;

use crate::boosting::Ensemble;
use crate::data::Matrix;
use crate::errors::PredictError;

fn check_shape(ensemble: &Ensemble, x: &Matrix) -> Result<(), PredictError> {
    if x.n_features() != ensemble.n_features {
        return Err(PredictError::ShapeError {
            expected: ensemble.n_features,
            actual: x.n_features(),
        });
    }
    Ok(())
}

/// Raw (pre-sigmoid/softmax) scores for every row, one vector of length `K`
/// per row. Rows are embarrassingly parallel (§5), so this is the one place
/// `rayon` pays off outside of training.
pub fn predict_raw(ensemble: &Ensemble, x: &Matrix) -> Result<Vec<Vec<f64>>, PredictError> {
    check_shape(ensemble, x)?;
    let raw = (0..x.n_rows())
        .into_par_iter()
        .map(|r| {
            let mut score = ensemble.init_score.clone();
            for round in &ensemble.rounds {
                for (k, tree) in round.iter().enumerate() {
                    score[k] += ensemble.learning_rate
                        * tree.predict_row(x.row(r), &ensemble.feature_kinds);
                }
            }
            score
        })
        .collect();
    Ok(raw)
}

/// Regression: the raw score itself. Classification: the hard label via
/// `Loss::raw_to_label` (sigmoid threshold / softmax argmax).
pub fn predict(ensemble: &Ensemble, x: &Matrix) -> Result<Vec<f64>, PredictError> {
    let raw = predict_raw(ensemble, x)?;
    Ok(raw.iter().map(|r| ensemble.loss.raw_to_label(r)).collect())
}

/// Class-probability matrix `[N, C]`. Errors with [`PredictError::TaskMismatch`]
/// on a regression ensemble, which has no probability interpretation.
pub fn predict_proba(ensemble: &Ensemble, x: &Matrix) -> Result<Vec<Vec<f64>>, PredictError> {
    if ensemble.loss.n_classes().is_none() && !matches!(ensemble.loss, crate::loss::Loss::BinomialDeviance) {
        return Err(PredictError::TaskMismatch { task: "regression" });
    }
    let raw = predict_raw(ensemble, x)?;
    raw.iter()
        .map(|r| {
            ensemble
                .loss
                .raw_to_proba(r)
                .ok_or(PredictError::TaskMismatch { task: "regression" })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureKinds;
    use crate::loss::Loss;

    fn constant_ensemble(loss: Loss, init_score: Vec<f64>, n_features: usize) -> Ensemble {
        Ensemble {
            loss,
            learning_rate: 0.1,
            init_score,
            n_features,
            feature_kinds: FeatureKinds::all_numeric(n_features),
            rounds: Vec::new(),
        }
    }

    #[test]
    fn regression_predict_returns_init_score_with_no_trees() {
        let ensemble = constant_ensemble(Loss::LeastSquares, vec![2.5], 3);
        let x = Matrix::from_rows(vec![1.0, 2.0, 3.0], 1, 3);
        let preds = predict(&ensemble, &x).unwrap();
        assert_eq!(preds, vec![2.5]);
    }

    #[test]
    fn predict_proba_on_regression_is_task_mismatch() {
        let ensemble = constant_ensemble(Loss::LeastSquares, vec![0.0], 2);
        let x = Matrix::from_rows(vec![1.0, 2.0], 1, 2);
        let err = predict_proba(&ensemble, &x).unwrap_err();
        assert!(matches!(err, PredictError::TaskMismatch { .. }));
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let ensemble = constant_ensemble(Loss::LeastSquares, vec![0.0], 3);
        let x = Matrix::from_rows(vec![1.0, 2.0], 1, 2);
        let err = predict(&ensemble, &x).unwrap_err();
        assert!(matches!(
            err,
            PredictError::ShapeError {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn binary_classification_proba_sums_to_one() {
        let ensemble = constant_ensemble(Loss::BinomialDeviance, vec![0.0], 1);
        let x = Matrix::from_rows(vec![1.0], 1, 1);
        let probs = predict_proba(&ensemble, &x).unwrap();
        let sum: f64 = probs[0].iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn multiclass_predict_picks_argmax() {
        // init_score favors class 2 strongly; with no trees, raw == init_score.
        let ensemble = constant_ensemble(
            Loss::MultinomialDeviance { n_classes: 3 },
            vec![-5.0, -5.0, 5.0],
            1,
        );
        let x = Matrix::from_rows(vec![0.0], 1, 1);
        let preds = predict(&ensemble, &x).unwrap();
        assert_eq!(preds, vec![2.0]);
    }
}
