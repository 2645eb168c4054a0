//! Training losses over the concatenated 4-vector output, plus the MSE/MAE
//! metrics reported alongside them.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Relative importance of each output head in the weighted loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadWeights {
    pub readiness: f32,
    pub missing_skills: f32,
    pub matched_skills: f32,
    pub weeks: f32,
}

impl Default for HeadWeights {
    fn default() -> Self {
        Self {
            readiness: 0.5,
            missing_skills: 0.15,
            matched_skills: 0.15,
            weeks: 0.2,
        }
    }
}

impl HeadWeights {
    pub fn as_array(&self) -> [f32; 4] {
        [
            self.readiness,
            self.missing_skills,
            self.matched_skills,
            self.weeks,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LossKind {
    /// Mean of squared errors over every output cell.
    MeanSquaredError,
    /// `Σ_k w_k · MSE_k` where `MSE_k` is the per-head mean over the batch.
    WeightedMultiTask(HeadWeights),
}

impl Default for LossKind {
    fn default() -> Self {
        LossKind::WeightedMultiTask(HeadWeights::default())
    }
}

impl LossKind {
    pub fn name(&self) -> &'static str {
        match self {
            LossKind::MeanSquaredError => "meanSquaredError",
            LossKind::WeightedMultiTask(_) => "weightedMultiTask",
        }
    }

    pub fn value(&self, predicted: ArrayView2<f32>, target: ArrayView2<f32>) -> f32 {
        self.value_and_gradient(predicted, target).0
    }

    /// Loss and its gradient w.r.t. `predicted`.
    pub fn value_and_gradient(
        &self,
        predicted: ArrayView2<f32>,
        target: ArrayView2<f32>,
    ) -> (f32, Array2<f32>) {
        let diff = &predicted - &target;
        match self {
            LossKind::MeanSquaredError => {
                let count = diff.len().max(1) as f32;
                let loss = diff.iter().map(|d| d * d).sum::<f32>() / count;
                (loss, diff.mapv(|d| 2.0 * d / count))
            }
            LossKind::WeightedMultiTask(weights) => {
                let weights = weights.as_array();
                let rows = diff.nrows().max(1) as f32;
                let mut grad = diff;
                let mut loss = 0.0;
                for (k, mut column) in grad.axis_iter_mut(Axis(1)).enumerate() {
                    let w = weights.get(k).copied().unwrap_or(0.0);
                    loss += w * column.iter().map(|d| d * d).sum::<f32>() / rows;
                    column.mapv_inplace(|d| w * 2.0 * d / rows);
                }
                (loss, grad)
            }
        }
    }
}

pub fn mean_squared_error(predicted: ArrayView2<f32>, target: ArrayView2<f32>) -> f32 {
    LossKind::MeanSquaredError.value(predicted, target)
}

pub fn mean_absolute_error(predicted: ArrayView2<f32>, target: ArrayView2<f32>) -> f32 {
    let count = predicted.len().max(1) as f32;
    (&predicted - &target).iter().map(|d| d.abs()).sum::<f32>() / count
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mse_and_mae() {
        let p = array![[0.0_f32, 1.0, 2.0, 3.0]];
        let t = array![[1.0_f32, 1.0, 0.0, 3.0]];
        assert!((mean_squared_error(p.view(), t.view()) - 1.25).abs() < 1e-6);
        assert!((mean_absolute_error(p.view(), t.view()) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_loss_scales_each_head() {
        let p = array![[1.0_f32, 1.0, 1.0, 1.0], [0.0, 0.0, 0.0, 0.0]];
        let t = Array2::zeros((2, 4));
        let loss = LossKind::default();
        // every head has MSE 0.5, weights sum to 1.0
        assert!((loss.value(p.view(), t.view()) - 0.5).abs() < 1e-6);

        let only_readiness = LossKind::WeightedMultiTask(HeadWeights {
            readiness: 1.0,
            missing_skills: 0.0,
            matched_skills: 0.0,
            weeks: 0.0,
        });
        let (value, grad) = only_readiness.value_and_gradient(p.view(), t.view());
        assert!((value - 0.5).abs() < 1e-6);
        assert_eq!(grad[[0, 0]], 1.0);
        assert_eq!(grad[[0, 1]], 0.0);
    }

    #[test]
    fn test_mse_gradient_matches_finite_difference() {
        let p = array![[0.2_f32, 0.4, 0.1, 0.9]];
        let t = array![[0.5_f32, 0.0, 0.3, 1.0]];
        let (base, grad) = LossKind::MeanSquaredError.value_and_gradient(p.view(), t.view());
        let mut bumped = p.clone();
        bumped[[0, 2]] += 1e-3;
        let numeric = (LossKind::MeanSquaredError.value(bumped.view(), t.view()) - base) / 1e-3;
        assert!((numeric - grad[[0, 2]]).abs() < 1e-2);
    }

    #[test]
    fn test_loss_kind_serializes_with_tag() {
        let json = serde_json::to_value(LossKind::default()).unwrap();
        assert_eq!(json["kind"], "weightedMultiTask");
        assert_eq!(json["readiness"], 0.5);
        let back: LossKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, LossKind::default());
    }
}
