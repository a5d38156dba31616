//! Differential-privacy noise mechanisms: exponential-mechanism split
//! selection and Laplace leaf noising.
//!
//! The exponential mechanism's redraw loop and log-sum-exp normalization are
//! carried over from the reference implementation this crate's split
//! selection was modeled on; the Laplace sampler is the standard
//! inverse-CDF construction since no Laplace distribution ships in this
//! workspace's `rand` family.

use rand::Rng;

/// A single candidate split's raw (un-noised) gain.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub index: usize,
    pub gain: f64,
}

/// Picks one candidate index via the exponential mechanism over `gains`,
/// each scaled by `epsilon / (2 * sensitivity)`.
///
/// If every candidate's gain is `<= 0`, returns `None` immediately — the
/// caller should make a leaf rather than force a meaningless split, matching
/// the "all gains non-positive" short circuit in the reference algorithm.
/// Otherwise performs up to 10 weighted draws; if none land (numerically
/// degenerate weights), returns `None` — the node becomes a leaf rather than
/// forcing a split through an un-noised arg-max fallback, matching the
/// reference algorithm's `return None` after its redraw budget is spent.
pub fn exponential_mechanism(
    candidates: &[Candidate],
    epsilon: f64,
    sensitivity: f64,
    rng: &mut impl Rng,
) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.iter().all(|c| c.gain <= 0.0) {
        return None;
    }

    let scale = if sensitivity > 0.0 {
        epsilon / (2.0 * sensitivity)
    } else {
        0.0
    };

    // log-sum-exp normalized weights, so large gains don't overflow `exp`.
    let scaled: Vec<f64> = candidates.iter().map(|c| scale * c.gain).collect();
    let max_scaled = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_denom = max_scaled
        + scaled
            .iter()
            .map(|s| (s - max_scaled).exp())
            .sum::<f64>()
            .ln();
    let probs: Vec<f64> = scaled.iter().map(|s| (s - log_denom).exp()).collect();

    for _ in 0..10 {
        let draw: f64 = rng.gen_range(0.0..1.0);
        let mut cumulative = 0.0;
        for (i, p) in probs.iter().enumerate() {
            cumulative += p;
            if draw <= cumulative {
                return Some(candidates[i].index);
            }
        }
    }

    // Degenerate case (floating point rounding left `cumulative < 1` on
    // every draw): give up rather than loop forever, and let the caller
    // treat this node as a leaf.
    log::warn!(
        "exponential mechanism found no candidate in 10 redraws over {} candidates; node becomes a leaf",
        candidates.len()
    );
    None
}

/// Draws a single Laplace(0, scale) sample via inverse-CDF from a
/// `Uniform(-0.5, 0.5)` draw `u`: `-scale * sign(u) * ln(1 - 2|u|)`.
pub fn laplace_noise(scale: f64, rng: &mut impl Rng) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    let u: f64 = rng.gen_range(-0.5..0.5);
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn all_nonpositive_gains_yields_no_split() {
        let candidates = vec![
            Candidate { index: 0, gain: -1.0 },
            Candidate { index: 1, gain: 0.0 },
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(exponential_mechanism(&candidates, 1.0, 1.0, &mut rng).is_none());
    }

    #[test]
    fn higher_gain_selected_more_often() {
        let candidates = vec![
            Candidate { index: 0, gain: 10.0 },
            Candidate { index: 1, gain: 0.1 },
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut wins = [0usize; 2];
        for _ in 0..500 {
            if let Some(i) = exponential_mechanism(&candidates, 1.0, 1.0, &mut rng) {
                wins[i] += 1;
            }
        }
        assert!(wins[0] > wins[1]);
    }

    #[test]
    fn laplace_noise_is_zero_mean_over_many_draws() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let n = 20_000;
        let sum: f64 = (0..n).map(|_| laplace_noise(2.0, &mut rng)).sum();
        let mean = sum / n as f64;
        assert!(mean.abs() < 0.1, "mean was {mean}");
    }

    #[test]
    fn zero_scale_is_noiseless() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(laplace_noise(0.0, &mut rng), 0.0);
    }
}
