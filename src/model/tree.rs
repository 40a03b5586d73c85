//! CART regression tree using variance reduction.

use anyhow::{Result, bail};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Internal split node: samples with `feature <= threshold` go left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitNode {
    pub feature: usize,
    pub threshold: f64,
    pub left: Box<TreeNode>,
    pub right: Box<TreeNode>,
}

/// Leaf node predicting the mean of the training samples that reached it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafNode {
    pub value: f64,
    pub n_samples: usize,
}

/// A node in a regression tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Split(SplitNode),
    Leaf(LeafNode),
}

impl TreeNode {
    /// Depth of the tree rooted at this node; leaves have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 0,
            TreeNode::Split(node) => 1 + node.left.depth().max(node.right.depth()),
        }
    }
}

/// Regression tree grown by greedy sum-of-squared-error minimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    /// Number of features considered per split; `None` means all.
    max_features: Option<usize>,
    seed: u64,
    root: Option<TreeNode>,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegressionTree {
    pub fn new() -> Self {
        RegressionTree {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
            root: None,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split.max(2);
        self
    }

    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf.max(1);
        self
    }

    #[must_use]
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            bail!("cannot fit a regression tree on an empty matrix");
        }
        if x.nrows() != y.len() {
            bail!(
                "feature matrix has {} rows but target has {} values",
                x.nrows(),
                y.len()
            );
        }
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.root = Some(self.grow(x, y, indices, 0, &mut rng));
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let Some(root) = &self.root else {
            bail!("regression tree is not fitted");
        };
        Ok(Array1::from_iter((0..x.nrows()).map(|row| {
            let mut node = root;
            loop {
                match node {
                    TreeNode::Leaf(leaf) => return leaf.value,
                    TreeNode::Split(split) => {
                        node = if x[[row, split.feature]] <= split.threshold {
                            &split.left
                        } else {
                            &split.right
                        };
                    }
                }
            }
        })))
    }

    fn grow(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
    ) -> TreeNode {
        let n = indices.len();
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;

        let depth_exhausted = self.max_depth.is_some_and(|d| depth >= d);
        if depth_exhausted || n < self.min_samples_split {
            return TreeNode::Leaf(LeafNode { value: mean, n_samples: n });
        }

        let features = self.candidate_features(x.ncols(), rng);
        let Some((feature, threshold)) = best_split(x, y, &indices, &features, self.min_samples_leaf)
        else {
            return TreeNode::Leaf(LeafNode { value: mean, n_samples: n });
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, feature]] <= threshold);

        TreeNode::Split(SplitNode {
            feature,
            threshold,
            left: Box::new(self.grow(x, y, left, depth + 1, rng)),
            right: Box::new(self.grow(x, y, right, depth + 1, rng)),
        })
    }

    fn candidate_features(&self, n_features: usize, rng: &mut StdRng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < n_features => {
                rand::seq::index::sample(rng, n_features, k).into_vec()
            }
            _ => (0..n_features).collect(),
        }
    }
}

/// The (feature, threshold) pair minimizing the post-split sum of squared
/// errors, or `None` when no split satisfies the leaf-size constraint.
fn best_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    features: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64)> {
    let n = indices.len();
    if n < 2 * min_samples_leaf {
        return None;
    }

    let mut best: Option<(usize, f64, f64)> = None;

    for &feature in features {
        let mut pairs: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (x[[i, feature]], y[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut sum_left = 0.0;
        let mut sum_sq_left = 0.0;
        let total: f64 = pairs.iter().map(|p| p.1).sum();
        let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();

        for split in 1..n {
            let (value, target) = pairs[split - 1];
            sum_left += target;
            sum_sq_left += target * target;

            if split < min_samples_leaf || n - split < min_samples_leaf {
                continue;
            }
            if value == pairs[split].0 {
                continue;
            }

            let left_n = split as f64;
            let right_n = (n - split) as f64;
            let sum_right = total - sum_left;
            let sum_sq_right = total_sq - sum_sq_left;
            let sse = (sum_sq_left - sum_left * sum_left / left_n)
                + (sum_sq_right - sum_right * sum_right / right_n);

            if best.is_none_or(|(_, _, best_sse)| sse < best_sse) {
                best = Some((feature, (value + pairs[split].0) / 2.0, sse));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}
