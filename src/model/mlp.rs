//! Small feed-forward regressor: two ReLU hidden layers trained with
//! full-batch momentum gradient descent and early stopping on a held-out
//! validation slice.

use anyhow::{Result, bail};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpRegressor {
    hidden1: usize,
    hidden2: usize,
    learning_rate: f64,
    momentum: f64,
    max_iter: usize,
    /// Fraction of training rows held out for early stopping.
    validation_fraction: f64,
    patience: usize,
    tol: f64,
    seed: u64,

    weights1: Array2<f64>,
    bias1: Array2<f64>,
    weights2: Array2<f64>,
    bias2: Array2<f64>,
    weights3: Array2<f64>,
    bias3: Array2<f64>,
    /// Target standardization applied internally during training.
    target_mean: f64,
    target_std: f64,
    fitted: bool,
}

impl Default for MlpRegressor {
    fn default() -> Self {
        Self::new()
    }
}

fn relu(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| v.max(0.0))
}

fn relu_derivative(activated: &Array2<f64>) -> Array2<f64> {
    activated.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

impl MlpRegressor {
    pub fn new() -> Self {
        MlpRegressor {
            hidden1: 64,
            hidden2: 32,
            learning_rate: 0.01,
            momentum: 0.9,
            max_iter: 500,
            validation_fraction: 0.1,
            patience: 10,
            tol: 1e-4,
            seed: 42,
            weights1: Array2::zeros((0, 0)),
            bias1: Array2::zeros((0, 0)),
            weights2: Array2::zeros((0, 0)),
            bias2: Array2::zeros((0, 0)),
            weights3: Array2::zeros((0, 0)),
            bias3: Array2::zeros((0, 0)),
            target_mean: 0.0,
            target_std: 1.0,
            fitted: false,
        }
    }

    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            bail!("cannot fit an MLP on an empty matrix");
        }
        if x.nrows() != y.len() {
            bail!(
                "feature matrix has {} rows but target has {} values",
                x.nrows(),
                y.len()
            );
        }

        self.target_mean = y.sum() / y.len() as f64;
        let y_values = y.to_vec();
        let spread = crate::features::util::sample_std(&y_values, self.target_mean);
        self.target_std = if spread > 0.0 { spread } else { 1.0 };
        let y_scaled = y.mapv(|v| (v - self.target_mean) / self.target_std);

        self.init_weights(x.ncols());

        // Hold out the validation slice after a seeded shuffle.
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);
        let val_n = ((x.nrows() as f64) * self.validation_fraction).floor() as usize;
        let (train_idx, val_idx) = order.split_at(x.nrows() - val_n);

        let x_train = x.select(Axis(0), train_idx);
        let y_train = to_column(&y_scaled.select(Axis(0), train_idx));
        let x_val = x.select(Axis(0), val_idx);
        let y_val = to_column(&y_scaled.select(Axis(0), val_idx));

        let mut v_w1 = Array2::zeros(self.weights1.dim());
        let mut v_b1 = Array2::zeros(self.bias1.dim());
        let mut v_w2 = Array2::zeros(self.weights2.dim());
        let mut v_b2 = Array2::zeros(self.bias2.dim());
        let mut v_w3 = Array2::zeros(self.weights3.dim());
        let mut v_b3 = Array2::zeros(self.bias3.dim());

        let mut best_loss = f64::INFINITY;
        let mut best_weights: Option<[Array2<f64>; 6]> = None;
        let mut stale_iters = 0;

        for _ in 0..self.max_iter {
            let (h1, h2, out) = self.forward(&x_train);

            let n = x_train.nrows() as f64;
            let delta_out = (&out - &y_train) * (2.0 / n);
            let grad_w3 = h2.t().dot(&delta_out);
            let grad_b3 = sum_rows(&delta_out);

            let delta_h2 = delta_out.dot(&self.weights3.t()) * relu_derivative(&h2);
            let grad_w2 = h1.t().dot(&delta_h2);
            let grad_b2 = sum_rows(&delta_h2);

            let delta_h1 = delta_h2.dot(&self.weights2.t()) * relu_derivative(&h1);
            let grad_w1 = x_train.t().dot(&delta_h1);
            let grad_b1 = sum_rows(&delta_h1);

            for (velocity, gradient, weight) in [
                (&mut v_w1, grad_w1, &mut self.weights1),
                (&mut v_b1, grad_b1, &mut self.bias1),
                (&mut v_w2, grad_w2, &mut self.weights2),
                (&mut v_b2, grad_b2, &mut self.bias2),
                (&mut v_w3, grad_w3, &mut self.weights3),
                (&mut v_b3, grad_b3, &mut self.bias3),
            ] {
                *velocity = &*velocity * self.momentum - &(gradient * self.learning_rate);
                *weight += &*velocity;
            }

            // Monitor validation loss when a slice exists, training loss
            // otherwise.
            let loss = if val_idx.is_empty() {
                let (_, _, out) = self.forward(&x_train);
                mse(&out, &y_train)
            } else {
                let (_, _, out) = self.forward(&x_val);
                mse(&out, &y_val)
            };

            if loss < best_loss - self.tol {
                best_loss = loss;
                stale_iters = 0;
                best_weights = Some([
                    self.weights1.clone(),
                    self.bias1.clone(),
                    self.weights2.clone(),
                    self.bias2.clone(),
                    self.weights3.clone(),
                    self.bias3.clone(),
                ]);
            } else {
                stale_iters += 1;
                if stale_iters >= self.patience {
                    break;
                }
            }
        }

        if let Some([w1, b1, w2, b2, w3, b3]) = best_weights {
            self.weights1 = w1;
            self.bias1 = b1;
            self.weights2 = w2;
            self.bias2 = b2;
            self.weights3 = w3;
            self.bias3 = b3;
        }

        self.fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            bail!("MLP regressor is not fitted");
        }
        let (_, _, out) = self.forward(x);
        Ok(out
            .index_axis(Axis(1), 0)
            .mapv(|v| v * self.target_std + self.target_mean))
    }

    fn init_weights(&mut self, inputs: usize) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let he = |fan_in: usize| (2.0 / fan_in as f64).sqrt();
        self.weights1 = Array2::random_using(
            (inputs, self.hidden1),
            Uniform::new(-he(inputs), he(inputs)),
            &mut rng,
        );
        self.bias1 = Array2::zeros((1, self.hidden1));
        self.weights2 = Array2::random_using(
            (self.hidden1, self.hidden2),
            Uniform::new(-he(self.hidden1), he(self.hidden1)),
            &mut rng,
        );
        self.bias2 = Array2::zeros((1, self.hidden2));
        self.weights3 = Array2::random_using(
            (self.hidden2, 1),
            Uniform::new(-he(self.hidden2), he(self.hidden2)),
            &mut rng,
        );
        self.bias3 = Array2::zeros((1, 1));
    }

    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        let h1 = relu(&(x.dot(&self.weights1) + &self.bias1));
        let h2 = relu(&(h1.dot(&self.weights2) + &self.bias2));
        let out = h2.dot(&self.weights3) + &self.bias3;
        (h1, h2, out)
    }
}

fn to_column(values: &Array1<f64>) -> Array2<f64> {
    values.clone().insert_axis(Axis(1))
}

fn sum_rows(matrix: &Array2<f64>) -> Array2<f64> {
    matrix.sum_axis(Axis(0)).insert_axis(Axis(0))
}

fn mse(predicted: &Array2<f64>, truth: &Array2<f64>) -> f64 {
    let diff = predicted - truth;
    diff.mapv(|v| v * v).sum() / truth.nrows().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metrics::rmse;
    use ndarray::Array1;

    fn linear_data() -> (Array2<f64>, Array1<f64>) {
        let xs: Vec<f64> = (0..40).map(|i| (i as f64 - 20.0) / 10.0).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x + 1.0).collect();
        (
            Array2::from_shape_vec((40, 1), xs).unwrap(),
            Array1::from_vec(ys),
        )
    }

    #[test]
    fn test_learns_a_linear_relation() {
        let (x, y) = linear_data();
        let mut mlp = MlpRegressor::new();
        mlp.fit(&x, &y).unwrap();

        let pred = mlp.predict(&x).unwrap();
        let mean = y.sum() / y.len() as f64;
        let baseline = Array1::from_elem(y.len(), mean);
        assert!(
            rmse(&y, &pred) < rmse(&y, &baseline) / 2.0,
            "rmse {} vs baseline {}",
            rmse(&y, &pred),
            rmse(&y, &baseline)
        );
    }

    #[test]
    fn test_deterministic_for_a_seed() {
        let (x, y) = linear_data();
        let mut a = MlpRegressor::new().with_seed(3).with_max_iter(50);
        let mut b = MlpRegressor::new().with_seed(3).with_max_iter(50);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_constant_target() {
        let (x, _) = linear_data();
        let y = Array1::from_elem(40, 5.0);
        let mut mlp = MlpRegressor::new().with_max_iter(50);
        mlp.fit(&x, &y).unwrap();
        let pred = mlp.predict(&x).unwrap();
        for value in pred {
            assert!((value - 5.0).abs() < 1.0);
        }
    }

    #[test]
    fn test_predict_unfitted_fails() {
        let mlp = MlpRegressor::new();
        assert!(mlp.predict(&Array2::zeros((1, 1))).is_err());
    }
}
