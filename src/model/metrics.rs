//! Regression metrics reported after training.

use ndarray::Array1;

/// Root mean squared error. Returns 0.0 for empty input.
pub fn rmse(truth: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mse = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / truth.len() as f64;
    mse.sqrt()
}

/// Mean absolute error. Returns 0.0 for empty input.
pub fn mae(truth: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / truth.len() as f64
}

/// Coefficient of determination. A constant truth vector scores 0.0
/// rather than dividing by zero.
pub fn r2(truth: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mean = truth.sum() / truth.len() as f64;
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(rmse(&y, &y), 0.0);
        assert_eq!(mae(&y, &y), 0.0);
        assert_eq!(r2(&y, &y), 1.0);
    }

    #[test]
    fn test_constant_offset() {
        let truth = array![1.0, 2.0, 3.0];
        let predicted = array![2.0, 3.0, 4.0];
        assert!((rmse(&truth, &predicted) - 1.0).abs() < 1e-12);
        assert!((mae(&truth, &predicted) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_r2_of_mean_prediction_is_zero() {
        let truth = array![1.0, 2.0, 3.0];
        let predicted = array![2.0, 2.0, 2.0];
        assert!((r2(&truth, &predicted)).abs() < 1e-12);
    }

    #[test]
    fn test_constant_truth_guard() {
        let truth = array![5.0, 5.0, 5.0];
        let predicted = array![4.0, 5.0, 6.0];
        assert_eq!(r2(&truth, &predicted), 0.0);
    }

    #[test]
    fn test_empty_input() {
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(rmse(&empty, &empty), 0.0);
        assert_eq!(mae(&empty, &empty), 0.0);
        assert_eq!(r2(&empty, &empty), 0.0);
    }
}
