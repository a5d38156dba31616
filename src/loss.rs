//! Loss functions. A closed set of three variants, dispatched with a tagged
//! `enum` rather than `Box<dyn Loss>` — the set cannot grow without a
//! matching change to gradient/leaf-value/sensitivity formulas anyway, so a
//! trait object would only hide that coupling.

/// Guard against division by (near) zero in the multinomial leaf formula,
/// taken from the denominator floor used in the source this was modeled on.
const MULTINOMIAL_DENOM_FLOOR: f64 = 1e-150;

/// The task's loss function and, for classification, its class count.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Loss {
    LeastSquares,
    BinomialDeviance,
    MultinomialDeviance { n_classes: usize },
}

impl Loss {
    /// Number of per-row gradient buffers this loss needs: 1 for regression
    /// and binary classification, `n_classes` for multinomial.
    pub fn n_gradient_buffers(&self) -> usize {
        match self {
            Loss::LeastSquares | Loss::BinomialDeviance => 1,
            Loss::MultinomialDeviance { n_classes } => *n_classes,
        }
    }

    pub fn n_classes(&self) -> Option<usize> {
        match self {
            Loss::MultinomialDeviance { n_classes } => Some(*n_classes),
            _ => None,
        }
    }

    /// The raw-score initialization before any tree is fit.
    pub fn init_raw_score(&self, y: &[f64]) -> Vec<f64> {
        match self {
            Loss::LeastSquares => {
                let mean = y.iter().sum::<f64>() / (y.len().max(1) as f64);
                vec![mean; self.n_gradient_buffers()]
            }
            Loss::BinomialDeviance => {
                let p = y.iter().sum::<f64>() / (y.len().max(1) as f64);
                let p = p.clamp(1e-6, 1.0 - 1e-6);
                vec![(p / (1.0 - p)).ln()]
            }
            Loss::MultinomialDeviance { n_classes } => vec![0.0; *n_classes],
        }
    }

    /// Gradient of one row for class `k` (ignored except for
    /// `MultinomialDeviance`), in the `ŷ − y` convention: positive when the
    /// current prediction overshoots the target. Trees are fit to this
    /// value directly, and leaf values are `-Σg / (n + λ)` style Newton
    /// steps, so the sign convention must stay consistent between
    /// `gradient` and `leaf_value`.
    ///
    /// `y` is the row's true label (0/1 for binary, class index as `f64`
    /// for multinomial), `raw` is the row's current per-class raw scores.
    pub fn gradient(&self, y: f64, raw: &[f64], k: usize) -> f64 {
        match self {
            Loss::LeastSquares => raw[0] - y,
            Loss::BinomialDeviance => sigmoid(raw[0]) - y,
            Loss::MultinomialDeviance { n_classes } => {
                let probs = softmax(raw);
                let indicator = if (y as usize) == k { 1.0 } else { 0.0 };
                debug_assert!(k < *n_classes);
                probs[k] - indicator
            }
        }
    }

    /// Closed-form (non-DP) leaf value from a leaf's row gradients, using a
    /// single Newton-Raphson step per loss. `lambda` is the leaf-value
    /// regularizer (`l2_lambda`). `probs_k` is the row's predicted
    /// probability for class `k` at the time the gradient was taken; it is
    /// only consulted for `MultinomialDeviance` and may be passed empty
    /// otherwise.
    ///
    /// - LeastSquares / BinomialDeviance: `-Σg / (n + λ)`.
    /// - MultinomialDeviance: `(-Σg · (C−1)/C) / (Σ p_k(1−p_k) + λ)`.
    pub fn leaf_value(&self, gradients: &[f64], probs_k: &[f64], lambda: f64) -> f64 {
        match self {
            Loss::LeastSquares | Loss::BinomialDeviance => {
                let n = gradients.len() as f64;
                let denom = n + lambda;
                if denom.abs() < MULTINOMIAL_DENOM_FLOOR {
                    0.0
                } else {
                    -gradients.iter().sum::<f64>() / denom
                }
            }
            Loss::MultinomialDeviance { n_classes } => {
                let c = *n_classes as f64;
                let sum_g: f64 = gradients.iter().sum();
                let denom: f64 =
                    probs_k.iter().map(|p| p * (1.0 - p)).sum::<f64>() + lambda;
                if denom.abs() < MULTINOMIAL_DENOM_FLOOR {
                    0.0
                } else {
                    (-sum_g * (c - 1.0) / c) / denom
                }
            }
        }
    }

    /// Maps an ensemble's summed raw score into a hard label.
    pub fn raw_to_label(&self, raw: &[f64]) -> f64 {
        match self {
            Loss::LeastSquares => raw[0],
            Loss::BinomialDeviance => {
                if sigmoid(raw[0]) >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Loss::MultinomialDeviance { .. } => {
                let probs = softmax(raw);
                argmax(&probs) as f64
            }
        }
    }

    /// Maps an ensemble's summed raw score into class probabilities. `None`
    /// for regression, which has no probability interpretation.
    pub fn raw_to_proba(&self, raw: &[f64]) -> Option<Vec<f64>> {
        match self {
            Loss::LeastSquares => None,
            Loss::BinomialDeviance => {
                let p = sigmoid(raw[0]);
                Some(vec![1.0 - p, p])
            }
            Loss::MultinomialDeviance { .. } => Some(softmax(raw)),
        }
    }
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax (subtracts the row max before exponentiating).
pub fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = raw.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0)
}
