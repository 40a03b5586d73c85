//! Gradient-boosted regression: shallow trees fitted sequentially to the
//! residuals of a mean-initialized prediction.

use anyhow::{Result, bail};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::tree::RegressionTree;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_estimators: usize,
    learning_rate: f64,
    max_depth: usize,
    init_prediction: f64,
    trees: Vec<RegressionTree>,
}

impl Default for GradientBoosting {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientBoosting {
    pub fn new() -> Self {
        GradientBoosting {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            init_prediction: 0.0,
            trees: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators.max(1);
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            bail!("cannot fit gradient boosting on an empty matrix");
        }
        if x.nrows() != y.len() {
            bail!(
                "feature matrix has {} rows but target has {} values",
                x.nrows(),
                y.len()
            );
        }

        self.init_prediction = y.sum() / y.len() as f64;
        let mut current = Array1::from_elem(y.len(), self.init_prediction);

        self.trees = Vec::with_capacity(self.n_estimators);
        for i in 0..self.n_estimators {
            let residuals = y - &current;
            let mut tree = RegressionTree::new()
                .with_max_depth(self.max_depth)
                .with_seed(42 + i as u64);
            tree.fit(x, &residuals)?;
            current = current + tree.predict(x)? * self.learning_rate;
            self.trees.push(tree);
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            bail!("gradient boosting model is not fitted");
        }
        let mut prediction = Array1::from_elem(x.nrows(), self.init_prediction);
        for tree in &self.trees {
            prediction = prediction + tree.predict(x)? * self.learning_rate;
        }
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metrics::rmse;
    use ndarray::array;

    #[test]
    fn test_boosting_beats_the_mean_baseline() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0];
        let mut model = GradientBoosting::new().with_n_estimators(50);
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        let mean = y.sum() / y.len() as f64;
        let baseline = Array1::from_elem(y.len(), mean);
        assert!(rmse(&y, &pred) < rmse(&y, &baseline) / 4.0);
    }

    #[test]
    fn test_single_tree_predicts_near_mean_shift() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![10.0, 10.0, 20.0, 20.0];
        let mut model = GradientBoosting::new()
            .with_n_estimators(1)
            .with_learning_rate(1.0)
            .with_max_depth(1);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!((pred[0] - 10.0).abs() < 1e-9);
        assert!((pred[3] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_predict_unfitted_fails() {
        let model = GradientBoosting::new();
        assert!(model.predict(&array![[1.0]]).is_err());
    }
}
