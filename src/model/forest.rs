//! Random forest regressor: bootstrap-sampled trees with per-split
//! feature subsampling, averaged at prediction time.

use anyhow::{Result, bail};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::RegressionTree;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_leaf: usize,
    seed: u64,
    trees: Vec<RegressionTree>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomForest {
    /// Defaults match the configuration the application trains with:
    /// 200 unbounded trees, leaves of at least 2 samples, sqrt features
    /// per split.
    pub fn new() -> Self {
        RandomForest {
            n_estimators: 200,
            max_depth: None,
            min_samples_leaf: 2,
            seed: 42,
            trees: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators.max(1);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf.max(1);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            bail!("cannot fit a random forest on an empty matrix");
        }
        if x.nrows() != y.len() {
            bail!(
                "feature matrix has {} rows but target has {} values",
                x.nrows(),
                y.len()
            );
        }

        let n = x.nrows();
        let max_features = (x.ncols() as f64).sqrt().round().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.trees = Vec::with_capacity(self.n_estimators);
        for i in 0..self.n_estimators {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let x_boot = x.select(Axis(0), &sample);
            let y_boot = Array1::from_iter(sample.iter().map(|&j| y[j]));

            let mut tree = RegressionTree::new()
                .with_min_samples_leaf(self.min_samples_leaf)
                .with_max_features(max_features)
                .with_seed(self.seed.wrapping_add(i as u64));
            if let Some(depth) = self.max_depth {
                tree = tree.with_max_depth(depth);
            }
            tree.fit(&x_boot, &y_boot)?;
            self.trees.push(tree);
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            bail!("random forest is not fitted");
        }
        let mut sum = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict(x)?;
        }
        Ok(sum / self.trees.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_forest_separates_two_clusters() {
        let x = array![
            [1.0, 0.0],
            [1.5, 0.2],
            [2.0, 0.1],
            [10.0, 5.0],
            [10.5, 5.2],
            [11.0, 5.1]
        ];
        let y = array![10.0, 10.0, 10.0, 100.0, 100.0, 100.0];
        let mut forest = RandomForest::new().with_n_estimators(25);
        forest.fit(&x, &y).unwrap();

        let pred = forest.predict(&array![[1.2, 0.1], [10.8, 5.0]]).unwrap();
        assert!(pred[0] < 55.0, "low cluster predicted {}", pred[0]);
        assert!(pred[1] > 55.0, "high cluster predicted {}", pred[1]);
    }

    #[test]
    fn test_forest_is_deterministic_for_a_seed() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut a = RandomForest::new().with_n_estimators(10).with_seed(7);
        let mut b = RandomForest::new().with_n_estimators(10).with_seed(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_unfitted_fails() {
        let forest = RandomForest::new();
        assert!(forest.predict(&array![[1.0]]).is_err());
    }
}
