//! Validated configuration for a DP-GBDT fit, following the teacher's
//! default-struct + separate-builder + `validate()` pattern
//! (`config::algo_config::PageRankConfig`/`PageRankConfigBuilder`).

use crate::errors::ConfigError;

/// Full knob set for [`crate::boosting::BoostingEngine::fit`].
#[derive(Debug, Clone)]
pub struct DpGbdtConfig {
    pub privacy_budget: f64,
    pub nb_trees: usize,
    pub nb_trees_per_ensemble: usize,
    pub max_depth: usize,
    pub max_leaves: Option<usize>,
    pub min_samples_split: usize,
    pub learning_rate: f64,
    pub gradient_filtering: bool,
    pub leaf_clipping: bool,
    pub balance_partition: bool,
    pub use_bfs: bool,
    pub use_3_trees: bool,
    pub use_decay: bool,
    pub cat_idx: Vec<usize>,
    pub num_idx: Vec<usize>,
    pub n_classes: Option<usize>,
    pub early_stop: usize,
    pub seed: Option<u64>,
    /// Rayon-facing concurrency knob. Grounded on the teacher's
    /// `ConcurrencyConfig` trait (`config::base_types`).
    pub concurrency: usize,
    /// l2_threshold (G) — gradient clipping bound.
    pub l2_threshold: f64,
    /// l2_lambda (λ) — leaf-value regularizer.
    pub l2_lambda: f64,
}

impl Default for DpGbdtConfig {
    fn default() -> Self {
        Self {
            privacy_budget: 1.0,
            nb_trees: 50,
            nb_trees_per_ensemble: 50,
            max_depth: 6,
            max_leaves: None,
            min_samples_split: 2,
            learning_rate: 0.1,
            gradient_filtering: false,
            leaf_clipping: false,
            balance_partition: true,
            use_bfs: false,
            use_3_trees: false,
            use_decay: false,
            cat_idx: Vec::new(),
            num_idx: Vec::new(),
            n_classes: None,
            early_stop: 5,
            seed: None,
            concurrency: num_cpus::get(),
            l2_threshold: 1.0,
            l2_lambda: 0.1,
        }
    }
}

impl DpGbdtConfig {
    pub fn builder() -> DpGbdtConfigBuilder {
        DpGbdtConfigBuilder::default()
    }

    pub fn is_dp(&self) -> bool {
        self.privacy_budget > 0.0
    }

    pub fn is_classification(&self) -> bool {
        self.n_classes.is_some()
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ConfigError> {
        if self.privacy_budget < 0.0 {
            return Err(ConfigError::new(
                "privacy_budget",
                "must be >= 0 (0 disables differential privacy)",
            ));
        }
        if self.nb_trees == 0 {
            return Err(ConfigError::new("nb_trees", "must be > 0"));
        }
        if self.nb_trees_per_ensemble == 0 {
            return Err(ConfigError::new("nb_trees_per_ensemble", "must be > 0"));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::new("max_depth", "must be > 0"));
        }
        if let Some(leaves) = self.max_leaves {
            if leaves == 0 {
                return Err(ConfigError::new("max_leaves", "must be > 0 when set"));
            }
        }
        if self.min_samples_split < 2 {
            return Err(ConfigError::new("min_samples_split", "must be >= 2"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ConfigError::new("learning_rate", "must be in (0, 1]"));
        }
        if let Some(c) = self.n_classes {
            if c < 2 {
                return Err(ConfigError::new(
                    "n_classes",
                    "must be >= 2 when set (unset means regression)",
                ));
            }
        }
        if self.concurrency == 0 {
            return Err(ConfigError::new("concurrency", "must be > 0"));
        }
        for &i in self.cat_idx.iter().chain(self.num_idx.iter()) {
            if i >= n_features {
                return Err(ConfigError::new(
                    "cat_idx/num_idx",
                    format!("feature index {i} is out of bounds for {n_features} features"),
                ));
            }
        }
        if self
            .cat_idx
            .iter()
            .any(|i| self.num_idx.contains(i))
        {
            return Err(ConfigError::new(
                "cat_idx/num_idx",
                "categorical and numeric index sets must be disjoint",
            ));
        }
        Ok(())
    }

    /// Clamps `privacy_budget` to the documented [0, 1000] range, logging a
    /// warning as the original does when the budget looks like a mistaken
    /// attempt to disable DP with a very large number instead of zero.
    pub(crate) fn normalized_privacy_budget(&self) -> f64 {
        if self.privacy_budget > 1000.0 {
            log::warn!(
                "privacy_budget {} exceeds the maximum of 1000; clamping. If the intent \
                 was to disable differential privacy, set privacy_budget = 0 instead.",
                self.privacy_budget
            );
            1000.0
        } else if self.privacy_budget > 100.0 {
            log::warn!(
                "privacy_budget {} is unusually high; if the intent is to disable \
                 differential privacy, set it to 0 rather than a large value.",
                self.privacy_budget
            );
            self.privacy_budget
        } else {
            self.privacy_budget
        }
    }
}

/// Builder for [`DpGbdtConfig`].
#[derive(Debug, Default)]
pub struct DpGbdtConfigBuilder {
    privacy_budget: Option<f64>,
    nb_trees: Option<usize>,
    nb_trees_per_ensemble: Option<usize>,
    max_depth: Option<usize>,
    max_leaves: Option<usize>,
    min_samples_split: Option<usize>,
    learning_rate: Option<f64>,
    gradient_filtering: Option<bool>,
    leaf_clipping: Option<bool>,
    balance_partition: Option<bool>,
    use_bfs: Option<bool>,
    use_3_trees: Option<bool>,
    use_decay: Option<bool>,
    cat_idx: Option<Vec<usize>>,
    num_idx: Option<Vec<usize>>,
    n_classes: Option<usize>,
    early_stop: Option<usize>,
    seed: Option<u64>,
    concurrency: Option<usize>,
    l2_threshold: Option<f64>,
    l2_lambda: Option<f64>,
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = Some(value);
            self
        }
    };
}

impl DpGbdtConfigBuilder {
    setter!(privacy_budget, f64);
    setter!(nb_trees, usize);
    setter!(nb_trees_per_ensemble, usize);
    setter!(max_depth, usize);
    setter!(min_samples_split, usize);
    setter!(learning_rate, f64);
    setter!(gradient_filtering, bool);
    setter!(leaf_clipping, bool);
    setter!(balance_partition, bool);
    setter!(use_bfs, bool);
    setter!(use_3_trees, bool);
    setter!(use_decay, bool);
    setter!(cat_idx, Vec<usize>);
    setter!(num_idx, Vec<usize>);
    setter!(n_classes, usize);
    setter!(early_stop, usize);
    setter!(seed, u64);
    setter!(concurrency, usize);
    setter!(l2_threshold, f64);
    setter!(l2_lambda, f64);

    pub fn max_leaves(mut self, leaves: usize) -> Self {
        self.max_leaves = Some(leaves);
        self
    }

    /// Builds without validating; use [`Self::build`] to validate against a
    /// known feature count.
    pub fn build_unchecked(self) -> DpGbdtConfig {
        let defaults = DpGbdtConfig::default();
        let mut cfg = DpGbdtConfig {
            privacy_budget: self.privacy_budget.unwrap_or(defaults.privacy_budget),
            nb_trees: self.nb_trees.unwrap_or(defaults.nb_trees),
            nb_trees_per_ensemble: self
                .nb_trees_per_ensemble
                .unwrap_or(defaults.nb_trees_per_ensemble),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            max_leaves: self.max_leaves.or(defaults.max_leaves),
            min_samples_split: self
                .min_samples_split
                .unwrap_or(defaults.min_samples_split),
            learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
            gradient_filtering: self
                .gradient_filtering
                .unwrap_or(defaults.gradient_filtering),
            leaf_clipping: self.leaf_clipping.unwrap_or(defaults.leaf_clipping),
            balance_partition: self
                .balance_partition
                .unwrap_or(defaults.balance_partition),
            use_bfs: self.use_bfs.unwrap_or(defaults.use_bfs),
            use_3_trees: self.use_3_trees.unwrap_or(defaults.use_3_trees),
            use_decay: self.use_decay.unwrap_or(defaults.use_decay),
            cat_idx: self.cat_idx.unwrap_or(defaults.cat_idx),
            num_idx: self.num_idx.unwrap_or(defaults.num_idx),
            n_classes: self.n_classes.or(defaults.n_classes),
            early_stop: self.early_stop.unwrap_or(defaults.early_stop),
            seed: self.seed.or(defaults.seed),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            l2_threshold: self.l2_threshold.unwrap_or(defaults.l2_threshold),
            l2_lambda: self.l2_lambda.unwrap_or(defaults.l2_lambda),
        };

        // Open Question 3: 3-node mode and best-leaf-first BFS are mutually
        // exclusive; 3-node mode wins, matching the source's override.
        if cfg.use_3_trees {
            cfg.use_bfs = false;
        }
        if cfg.max_leaves.is_some() && !cfg.use_3_trees {
            cfg.use_bfs = true;
        }

        cfg
    }

    pub fn build(self, n_features: usize) -> Result<DpGbdtConfig, ConfigError> {
        let cfg = self.build_unchecked();
        cfg.validate(n_features)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = DpGbdtConfig::default();
        assert!(cfg.validate(10).is_ok());
    }

    #[test]
    fn rejects_non_positive_nb_trees() {
        let err = DpGbdtConfig::builder()
            .nb_trees(0)
            .build(10)
            .unwrap_err();
        assert_eq!(err.field, "nb_trees");
    }

    #[test]
    fn rejects_learning_rate_out_of_range() {
        assert!(DpGbdtConfig::builder()
            .learning_rate(0.0)
            .build(10)
            .is_err());
        assert!(DpGbdtConfig::builder()
            .learning_rate(1.5)
            .build(10)
            .is_err());
    }

    #[test]
    fn three_node_mode_forces_bfs_off() {
        let cfg = DpGbdtConfig::builder()
            .use_3_trees(true)
            .max_leaves(8)
            .build_unchecked();
        assert!(cfg.use_3_trees);
        assert!(!cfg.use_bfs);
    }

    #[test]
    fn max_leaves_enables_bfs() {
        let cfg = DpGbdtConfig::builder().max_leaves(8).build_unchecked();
        assert!(cfg.use_bfs);
    }

    #[test]
    fn rejects_overlapping_feature_index_sets() {
        let err = DpGbdtConfig::builder()
            .cat_idx(vec![0, 1])
            .num_idx(vec![1, 2])
            .build(5)
            .unwrap_err();
        assert_eq!(err.field, "cat_idx/num_idx");
    }

    #[test]
    fn high_budget_is_clamped() {
        let cfg = DpGbdtConfig::builder().privacy_budget(5000.0).build_unchecked();
        assert_eq!(cfg.normalized_privacy_budget(), 1000.0);
    }
}
