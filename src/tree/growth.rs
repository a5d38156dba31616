//! Tree growth: DFS, best-leaf-first BFS, and the 3-node sibling-sharing
//! variant, sharing one split-selection and leaf-finalization core.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::Rng;

use crate::config::DpGbdtConfig;
use crate::data::{FeatureKinds, Matrix};
use crate::loss::Loss;
use crate::noise;
use crate::tree::node::{Node, Tree};
use crate::tree::splitter::{candidate_splits, partition_rows, SplitCandidate};

/// Per-node split-sensitivity constant, `3 * G^2` (§4.2).
fn delta_g(cfg: &DpGbdtConfig) -> f64 {
    3.0 * cfg.l2_threshold * cfg.l2_threshold
}

/// Per-leaf prediction sensitivity, `min(G/(1+λ), 2*G*(1-η)^t)` (§4.3).
fn delta_v(cfg: &DpGbdtConfig, tree_index: usize) -> f64 {
    let g = cfg.l2_threshold;
    let a = g / (1.0 + cfg.l2_lambda);
    let b = 2.0 * g * (1.0 - cfg.learning_rate).powi(tree_index as i32);
    a.min(b)
}

/// Per-internal-node privacy share at `depth` (§4.5): without decay, splits
/// the per-tree internal budget evenly across `max_depth` levels; with
/// decay, each depth gets half of the previous. 3-node mode halves every
/// non-root node's share again.
fn internal_eps(depth: usize, cfg: &DpGbdtConfig, eps_tree: f64) -> f64 {
    let base = eps_tree / 2.0;
    let mut eps = if cfg.use_decay {
        base / 2f64.powi(depth as i32)
    } else {
        base / cfg.max_depth as f64
    };
    if cfg.use_3_trees && depth > 0 {
        eps /= 2.0;
    }
    eps
}

/// Picks a candidate's index via the exponential mechanism (DP) or a plain
/// arg-max over positive gains (non-DP), matching invariant 3: with
/// `privacy_budget == 0` no draw from the mechanism is ever made.
fn choose_split(
    candidates: &[SplitCandidate],
    cfg: &DpGbdtConfig,
    eps_node: f64,
    rng: &mut impl Rng,
) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if cfg.is_dp() {
        let weighted: Vec<noise::Candidate> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| noise::Candidate {
                index: i,
                gain: c.gain,
            })
            .collect();
        noise::exponential_mechanism(&weighted, eps_node, delta_g(cfg), rng)
    } else {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.gain > 0.0)
            .max_by(|a, b| a.1.gain.partial_cmp(&b.1.gain).unwrap())
            .map(|(i, _)| i)
    }
}

/// Computes a finalized (clipped, noised) leaf value for a row set.
fn finalize_leaf(
    rows: &[usize],
    gradients: &[f64],
    probs_k: Option<&[f64]>,
    loss: &Loss,
    cfg: &DpGbdtConfig,
    tree_index: usize,
    eps_tree: f64,
    rng: &mut impl Rng,
) -> f64 {
    let grads: Vec<f64> = rows.iter().map(|&r| gradients[r]).collect();
    let probs: Vec<f64> = match probs_k {
        Some(p) => rows.iter().map(|&r| p[r]).collect(),
        None => Vec::new(),
    };
    let mut value = loss.leaf_value(&grads, &probs, cfg.l2_lambda);

    if cfg.leaf_clipping {
        let bound = cfg.l2_threshold * (1.0 - cfg.learning_rate).powi(tree_index as i32);
        if value.abs() > bound {
            value = bound * value.signum();
            log::debug!(
                "leaf clipped to bound {bound:.6} at tree {tree_index} (depth-independent geometric clip)"
            );
        }
    }

    if cfg.is_dp() {
        let scale = delta_v(cfg, tree_index) / (eps_tree / 2.0);
        let noise = noise::laplace_noise(scale, rng);
        log::debug!("leaf pre-noise={value:.6} post-noise={:.6}", value + noise);
        value += noise;
    }

    value
}

/// Bundled immutable inputs shared by every node built for one tree.
pub struct GrowthInputs<'a> {
    pub x: &'a Matrix,
    pub kinds: &'a FeatureKinds,
    pub gradients: &'a [f64],
    pub probs_k: Option<&'a [f64]>,
    pub loss: &'a Loss,
    pub cfg: &'a DpGbdtConfig,
    pub tree_index: usize,
    pub eps_tree: f64,
}

/// Builds one tree via depth-first growth.
pub fn grow_dfs(inputs: &GrowthInputs, rows: Vec<usize>, rng: &mut impl Rng) -> Tree {
    let mut tree = Tree::new();
    let root = grow_dfs_node(inputs, &mut tree, rows, Vec::new(), 0, rng);
    tree.set_root(root);
    tree
}

fn grow_dfs_node(
    inputs: &GrowthInputs,
    tree: &mut Tree,
    rows: Vec<usize>,
    sibling_rows: Vec<usize>,
    depth: usize,
    rng: &mut impl Rng,
) -> u32 {
    let stop_for_depth_or_size =
        depth >= inputs.cfg.max_depth || rows.len() < inputs.cfg.min_samples_split;

    if !stop_for_depth_or_size {
        let extra: &[usize] = if inputs.cfg.use_3_trees && depth > 0 {
            &sibling_rows
        } else {
            &[]
        };
        let candidates = candidate_splits(
            &rows,
            extra,
            inputs.x,
            inputs.kinds,
            inputs.gradients,
            inputs.cfg.l2_lambda,
        );
        let eps_node = internal_eps(depth, inputs.cfg, inputs.eps_tree);
        if let Some(chosen) = choose_split(&candidates, inputs.cfg, eps_node, rng) {
            let candidate = candidates[chosen];
            log::debug!(
                "node depth={depth} split feature={} value={:.6} gain={:.6}",
                candidate.feature_idx,
                candidate.value,
                candidate.gain
            );
            let (left_rows, right_rows) =
                partition_rows(&rows, inputs.x, inputs.kinds, candidate.feature_idx, candidate.value);
            let left_sibling = right_rows.clone();
            let right_sibling = left_rows.clone();
            let left = grow_dfs_node(inputs, tree, left_rows, left_sibling, depth + 1, rng);
            let right = grow_dfs_node(inputs, tree, right_rows, right_sibling, depth + 1, rng);
            return tree.push(Node::Internal {
                feature_idx: candidate.feature_idx,
                value: candidate.value,
                left,
                right,
            });
        }
        log::debug!("node depth={depth} has no legal split; becomes a leaf");
    }

    let value = finalize_leaf(
        &rows,
        inputs.gradients,
        inputs.probs_k,
        inputs.loss,
        inputs.cfg,
        inputs.tree_index,
        inputs.eps_tree,
        rng,
    );
    tree.push(Node::Leaf { value })
}

struct PendingNode {
    rows: Vec<usize>,
    sibling_rows: Vec<usize>,
    depth: usize,
    candidates: Vec<SplitCandidate>,
    best_gain: f64,
    leaf_value: Option<f64>,
    split: Option<(usize, f64)>,
    left: Option<usize>,
    right: Option<usize>,
}

struct HeapEntry {
    idx: usize,
    priority: f64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.partial_cmp(&other.priority).unwrap_or(Ordering::Equal)
    }
}

/// Builds one tree via best-leaf-first BFS growth, bounded by `max_leaves`.
/// Expands the highest-projected-gain frontier node first; any node whose
/// expansion would push the projected leaf count (finalized leaves +
/// pending frontier) past `max_leaves`, or past `max_depth`, is finalized
/// as a leaf instead.
pub fn grow_bfs(inputs: &GrowthInputs, rows: Vec<usize>, max_leaves: usize, rng: &mut impl Rng) -> Tree {
    let mut arena: Vec<PendingNode> = Vec::new();
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();

    let root_idx = push_pending(inputs, &mut arena, rows, Vec::new(), 0);
    heap.push(HeapEntry {
        idx: root_idx,
        priority: arena[root_idx].best_gain,
    });

    let mut leaves_done = 0usize;

    while let Some(HeapEntry { idx, .. }) = heap.pop() {
        let remaining_frontier = heap.len();
        let depth = arena[idx].depth;
        let at_depth_limit = depth >= inputs.cfg.max_depth;
        let would_exceed_budget = leaves_done + remaining_frontier + 2 > max_leaves;
        let no_candidates = arena[idx].best_gain <= 0.0 || arena[idx].candidates.is_empty();

        if at_depth_limit || would_exceed_budget || no_candidates {
            finalize_pending_leaf(inputs, &mut arena, idx, rng);
            leaves_done += 1;
            continue;
        }

        let eps_node = internal_eps(depth, inputs.cfg, inputs.eps_tree);
        let chosen = choose_split(&arena[idx].candidates, inputs.cfg, eps_node, rng);
        match chosen {
            None => {
                finalize_pending_leaf(inputs, &mut arena, idx, rng);
                leaves_done += 1;
            }
            Some(chosen_i) => {
                let candidate = arena[idx].candidates[chosen_i];
                let rows = std::mem::take(&mut arena[idx].rows);
                let (left_rows, right_rows) = partition_rows(
                    &rows,
                    inputs.x,
                    inputs.kinds,
                    candidate.feature_idx,
                    candidate.value,
                );
                arena[idx].split = Some((candidate.feature_idx, candidate.value));

                let left_sibling = right_rows.clone();
                let right_sibling = left_rows.clone();
                let left_idx = push_pending(inputs, &mut arena, left_rows, left_sibling, depth + 1);
                let right_idx = push_pending(inputs, &mut arena, right_rows, right_sibling, depth + 1);
                arena[idx].left = Some(left_idx);
                arena[idx].right = Some(right_idx);

                heap.push(HeapEntry {
                    idx: left_idx,
                    priority: arena[left_idx].best_gain,
                });
                heap.push(HeapEntry {
                    idx: right_idx,
                    priority: arena[right_idx].best_gain,
                });
            }
        }
    }

    let mut tree = Tree::new();
    let root = convert_pending(&arena, root_idx, &mut tree);
    tree.set_root(root);
    tree
}

fn push_pending(
    inputs: &GrowthInputs,
    arena: &mut Vec<PendingNode>,
    rows: Vec<usize>,
    sibling_rows: Vec<usize>,
    depth: usize,
) -> usize {
    let candidates = if rows.len() < inputs.cfg.min_samples_split {
        Vec::new()
    } else {
        let extra: &[usize] = if inputs.cfg.use_3_trees && depth > 0 {
            &sibling_rows
        } else {
            &[]
        };
        candidate_splits(
            &rows,
            extra,
            inputs.x,
            inputs.kinds,
            inputs.gradients,
            inputs.cfg.l2_lambda,
        )
    };
    let best_gain = candidates
        .iter()
        .map(|c| c.gain)
        .fold(f64::MIN, f64::max);

    arena.push(PendingNode {
        rows,
        sibling_rows,
        depth,
        candidates,
        best_gain,
        leaf_value: None,
        split: None,
        left: None,
        right: None,
    });
    arena.len() - 1
}

fn finalize_pending_leaf(inputs: &GrowthInputs, arena: &mut [PendingNode], idx: usize, rng: &mut impl Rng) {
    let value = finalize_leaf(
        &arena[idx].rows,
        inputs.gradients,
        inputs.probs_k,
        inputs.loss,
        inputs.cfg,
        inputs.tree_index,
        inputs.eps_tree,
        rng,
    );
    arena[idx].leaf_value = Some(value);
}

fn convert_pending(arena: &[PendingNode], idx: usize, tree: &mut Tree) -> u32 {
    if let Some(value) = arena[idx].leaf_value {
        return tree.push(Node::Leaf { value });
    }
    let (feature_idx, value) = arena[idx].split.expect("expanded node must carry a split");
    let left = convert_pending(arena, arena[idx].left.expect("left child"), tree);
    let right = convert_pending(arena, arena[idx].right.expect("right child"), tree);
    tree.push(Node::Internal {
        feature_idx,
        value,
        left,
        right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DpGbdtConfig;
    use crate::data::{FeatureKinds, Matrix};
    use crate::loss::Loss;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn toy() -> (Matrix, FeatureKinds, Vec<f64>) {
        let x = Matrix::from_rows(vec![0.0, 1.0, 2.0, 3.0], 4, 1);
        let kinds = FeatureKinds::all_numeric(1);
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];
        (x, kinds, gradients)
    }

    #[test]
    fn dfs_non_dp_produces_a_split_on_separable_data() {
        let (x, kinds, gradients) = toy();
        let cfg = DpGbdtConfig::builder().privacy_budget(0.0).max_depth(3).build_unchecked();
        let loss = Loss::LeastSquares;
        let inputs = GrowthInputs {
            x: &x,
            kinds: &kinds,
            gradients: &gradients,
            probs_k: None,
            loss: &loss,
            cfg: &cfg,
            tree_index: 0,
            eps_tree: 0.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree = grow_dfs(&inputs, vec![0, 1, 2, 3], &mut rng);
        assert!(tree.node_count() >= 3);
        assert!(tree.depth() >= 1);
    }

    #[test]
    fn dfs_respects_max_depth_of_zero() {
        let (x, kinds, gradients) = toy();
        let cfg = DpGbdtConfig::builder().privacy_budget(0.0).max_depth(1).build_unchecked();
        let mut cfg = cfg;
        cfg.max_depth = 0;
        let loss = Loss::LeastSquares;
        let inputs = GrowthInputs {
            x: &x,
            kinds: &kinds,
            gradients: &gradients,
            probs_k: None,
            loss: &loss,
            cfg: &cfg,
            tree_index: 0,
            eps_tree: 0.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree = grow_dfs(&inputs, vec![0, 1, 2, 3], &mut rng);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn bfs_respects_max_leaves() {
        let x = Matrix::from_rows(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
            8,
            1,
        );
        let kinds = FeatureKinds::all_numeric(1);
        let gradients = vec![-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];
        let cfg = DpGbdtConfig::builder()
            .privacy_budget(0.0)
            .max_depth(5)
            .max_leaves(2)
            .min_samples_split(2)
            .build_unchecked();
        let loss = Loss::LeastSquares;
        let inputs = GrowthInputs {
            x: &x,
            kinds: &kinds,
            gradients: &gradients,
            probs_k: None,
            loss: &loss,
            cfg: &cfg,
            tree_index: 0,
            eps_tree: 0.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tree = grow_bfs(&inputs, (0..8).collect(), 2, &mut rng);
        assert!(tree.leaf_count() <= 2);
    }
}
