//! Holdout evaluation, raw prediction and conversion back to human units.

use ndarray::{aview1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::preprocess::{
    ProcessedData, MATCHED_SKILL_CAP, MISSING_SKILL_CAP, OUTPUT_DIMS, WEEKS_CAP,
};
use crate::model::network::{ReadinessNetwork, HEAD_NAMES};
use crate::model::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMetrics {
    /// Compiled loss.
    pub test_loss: f32,
    pub test_mse: f32,
    pub test_mae: f32,
}

pub fn evaluate_model(model: &ReadinessNetwork, data: &ProcessedData) -> Result<TestMetrics, ModelError> {
    let eval = model.evaluate(data.inputs.view(), data.outputs.view())?;
    Ok(TestMetrics {
        test_loss: eval.loss,
        test_mse: eval.mse,
        test_mae: eval.mae,
    })
}

/// Raw (normalized) outputs, one row per input row.
pub fn predict(model: &ReadinessNetwork, inputs: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
    model.infer(inputs)
}

pub fn predict_single(model: &ReadinessNetwork, input: &[f32]) -> Result<RawPrediction, ModelError> {
    let row = aview1(input).insert_axis(Axis(0));
    let out = model.infer(row)?;
    Ok(RawPrediction::from_row(out.row(0)))
}

/// Network output in scaled label space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPrediction {
    pub readiness: f32,
    pub missing_skills: f32,
    pub matched_skills: f32,
    pub weeks: f32,
}

impl RawPrediction {
    pub fn from_row(row: ArrayView1<f32>) -> Self {
        let at = |k: usize| row.get(k).copied().unwrap_or(0.0);
        Self {
            readiness: at(0),
            missing_skills: at(1),
            matched_skills: at(2),
            weeks: at(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenormalizedPrediction {
    /// 0–100 scale, rounded.
    pub readiness_score: f32,
    pub missing_skill_count: f32,
    pub matched_skill_count: f32,
    pub estimated_weeks_to_learn: f32,
}

/// Undoes the label scaling applied by `preprocess_data`.
pub fn denormalize_predictions(raw: &RawPrediction) -> DenormalizedPrediction {
    DenormalizedPrediction {
        readiness_score: (raw.readiness * 100.0).round(),
        missing_skill_count: (raw.missing_skills * MISSING_SKILL_CAP).round(),
        matched_skill_count: (raw.matched_skills * MATCHED_SKILL_CAP).round(),
        estimated_weeks_to_learn: (raw.weeks * WEEKS_CAP).round(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOutput {
    pub readiness_score: u32,
    pub confidence: f32,
    pub missing_skill_count: u32,
    pub matched_skill_count: u32,
    pub estimated_weeks_to_learn: u32,
}

/// Clamps readiness to 0–100, confidence to 0–1 and counts to ≥ 0.
pub fn format_prediction(prediction: &DenormalizedPrediction, confidence: f32) -> PredictionOutput {
    let non_negative = |v: f32| v.max(0.0) as u32;
    PredictionOutput {
        readiness_score: prediction.readiness_score.clamp(0.0, 100.0) as u32,
        confidence: if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        },
        missing_skill_count: non_negative(prediction.missing_skill_count),
        matched_skill_count: non_negative(prediction.matched_skill_count),
        estimated_weeks_to_learn: non_negative(prediction.estimated_weeks_to_learn),
    }
}

/// Interpretation and confidence for a 0–100 readiness score.
pub fn readiness_band(score: u32) -> (&'static str, f32) {
    match score {
        80.. => ("Excellent match - you should apply!", 0.95),
        60..=79 => ("Good match - your application could be competitive.", 0.85),
        40..=59 => ("Moderate match - highlight transferable skills in your application.", 0.75),
        20..=39 => ("Weak match - consider gaining more skills before applying.", 0.65),
        _ => ("Poor match - this role may not be suitable at this time.", 0.6),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-head metrics
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadMetrics {
    pub head: &'static str,
    pub mse: f32,
    pub mae: f32,
    pub rmse: f32,
    /// Against the mean of the provided labels; 0 when the labels are constant.
    pub r2: f32,
}

/// MSE/MAE/RMSE/R² for each of the four outputs. Both matrices must be
/// `N × 4`; with `N = 0` every metric is 0.
pub fn calculate_metrics(
    y_true: ArrayView2<f32>,
    y_pred: ArrayView2<f32>,
) -> Result<Vec<HeadMetrics>, ModelError> {
    let expected = (y_true.nrows(), OUTPUT_DIMS);
    for found in [y_true.dim(), y_pred.dim()] {
        if found != expected {
            return Err(ModelError::LabelShape { expected, found });
        }
    }
    let metrics = HEAD_NAMES
        .iter()
        .enumerate()
        .map(|(k, &head)| {
            if y_true.nrows() == 0 {
                return HeadMetrics {
                    head,
                    mse: 0.0,
                    mae: 0.0,
                    rmse: 0.0,
                    r2: 0.0,
                };
            }
            let (t, p) = (y_true.column(k), y_pred.column(k));
            let n = t.len() as f64;
            let mean = t.iter().map(|v| *v as f64).sum::<f64>() / n;
            let (mut ss_res, mut ss_tot, mut abs) = (0.0_f64, 0.0_f64, 0.0_f64);
            for (actual, predicted) in t.iter().zip(p.iter()) {
                let diff = (*actual - *predicted) as f64;
                ss_res += diff * diff;
                abs += diff.abs();
                ss_tot += (*actual as f64 - mean).powi(2);
            }
            let mse = ss_res / n;
            HeadMetrics {
                head,
                mse: mse as f32,
                mae: (abs / n) as f32,
                rmse: mse.sqrt() as f32,
                r2: if ss_tot == 0.0 {
                    0.0
                } else {
                    (1.0 - ss_res / ss_tot) as f32
                },
            }
        })
        .collect();
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocess::{scale_labels, Labels};
    use crate::model::network::{build_model, CompileOptions};
    use ndarray::array;

    #[test]
    fn test_denormalize_inverts_label_scaling() {
        let labels = Labels {
            readiness_score: 0.734,
            missing_skill_count: 7.0,
            matched_skill_count: 13.0,
            estimated_weeks_to_learn: 29.0,
        };
        let scaled = scale_labels(&labels);
        let raw = RawPrediction::from_row(aview1(&scaled));
        let back = denormalize_predictions(&raw);
        assert!((back.readiness_score - 73.4).abs() <= 1.0);
        assert_eq!(back.missing_skill_count, 7.0);
        assert_eq!(back.matched_skill_count, 13.0);
        assert_eq!(back.estimated_weeks_to_learn, 29.0);
    }

    #[test]
    fn test_format_prediction_clamps() {
        let wild = DenormalizedPrediction {
            readiness_score: 130.0,
            missing_skill_count: -2.0,
            matched_skill_count: 4.0,
            estimated_weeks_to_learn: -1.0,
        };
        let out = format_prediction(&wild, 1.7);
        assert_eq!(out.readiness_score, 100);
        assert_eq!(out.confidence, 1.0);
        assert_eq!(out.missing_skill_count, 0);
        assert_eq!(out.matched_skill_count, 4);
        assert_eq!(out.estimated_weeks_to_learn, 0);
        assert_eq!(format_prediction(&wild, -0.5).confidence, 0.0);
    }

    #[test]
    fn test_readiness_bands() {
        assert_eq!(readiness_band(100).1, 0.95);
        assert_eq!(readiness_band(80).1, 0.95);
        assert_eq!(readiness_band(79).1, 0.85);
        assert_eq!(readiness_band(45).1, 0.75);
        assert_eq!(readiness_band(20).1, 0.65);
        assert_eq!(readiness_band(0).1, 0.6);
    }

    #[test]
    fn test_perfect_predictions_have_r2_one() {
        let y = array![[0.1_f32, 0.2, 0.3, 0.4], [0.5, 0.1, 0.9, 0.0], [0.9, 0.4, 0.2, 0.7]];
        let metrics = calculate_metrics(y.view(), y.view()).unwrap();
        assert_eq!(metrics.len(), 4);
        for m in &metrics {
            assert!((m.r2 - 1.0).abs() < 1e-6, "{m:?}");
            assert_eq!(m.mse, 0.0);
        }
        assert_eq!(metrics[0].head, "readiness");
    }

    #[test]
    fn test_predicting_the_mean_has_r2_zero() {
        let y = array![[0.0_f32, 1.0, 2.0, 3.0], [2.0, 3.0, 4.0, 5.0]];
        let mean = array![[1.0_f32, 2.0, 3.0, 4.0], [1.0, 2.0, 3.0, 4.0]];
        let metrics = calculate_metrics(y.view(), mean.view()).unwrap();
        for m in &metrics {
            assert!(m.r2.abs() < 1e-6);
            assert!((m.mae - 1.0).abs() < 1e-6);
            assert!((m.rmse - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_constant_labels_report_zero_r2() {
        let y = Array2::from_elem((3, 4), 0.5_f32);
        let p = Array2::from_elem((3, 4), 0.7_f32);
        assert!(calculate_metrics(y.view(), p.view())
            .unwrap()
            .iter()
            .all(|m| m.r2 == 0.0));
    }

    #[test]
    fn test_mismatched_shapes_are_an_error_not_zeros() {
        let y = Array2::from_elem((3, 4), 0.5_f32);
        let short = Array2::from_elem((2, 4), 0.5_f32);
        assert_eq!(
            calculate_metrics(y.view(), short.view()).unwrap_err(),
            ModelError::LabelShape {
                expected: (3, 4),
                found: (2, 4)
            }
        );
        let narrow = Array2::from_elem((3, 3), 0.5_f32);
        assert!(matches!(
            calculate_metrics(narrow.view(), narrow.view()),
            Err(ModelError::LabelShape { found: (3, 3), .. })
        ));
    }

    #[test]
    fn test_empty_labels_report_zero_metrics() {
        let empty = Array2::<f32>::zeros((0, 4));
        let metrics = calculate_metrics(empty.view(), empty.view()).unwrap();
        assert_eq!(metrics.len(), 4);
        assert!(metrics.iter().all(|m| m.mse == 0.0 && m.r2 == 0.0));
    }

    #[test]
    fn test_predict_single_matches_batch_predict() {
        let mut model = build_model(5, Some(9)).unwrap();
        model.compile(CompileOptions::default());
        let x = array![[0.1_f32, -0.2, 0.3, 0.0, 1.0], [1.0, 1.0, -1.0, 0.5, 0.2]];
        let batch = predict(&model, x.view()).unwrap();
        let single = predict_single(&model, &[1.0, 1.0, -1.0, 0.5, 0.2]).unwrap();
        assert!((single.readiness - batch[[1, 0]]).abs() < 1e-6);
        assert!((single.weeks - batch[[1, 3]]).abs() < 1e-6);
        assert!(matches!(
            predict_single(&model, &[1.0, 2.0]),
            Err(ModelError::DimensionMismatch { expected: 5, found: 2 })
        ));
    }

    #[test]
    fn test_evaluate_model_on_empty_data_is_an_error() {
        let mut model = build_model(3, Some(1)).unwrap();
        model.compile(CompileOptions::default());
        let empty = ProcessedData::new(Array2::zeros((0, 3)), Array2::zeros((0, 4)));
        assert_eq!(evaluate_model(&model, &empty).unwrap_err(), ModelError::EmptyBatch);
    }
}
