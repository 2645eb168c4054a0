//! Per-head diagnostics over a held-out split: error metrics, label versus
//! prediction spread, a sample of residuals and a coarse calibration table.

use ndarray::{Array2, ArrayView2};
use serde::Serialize;

use crate::data::preprocess::{DatasetMetadata, Labels, ProcessedData, TrainingExample};
use crate::model::network::HEAD_NAMES;
use crate::model::ModelError;
use crate::training::evaluator::{calculate_metrics, TestMetrics};

/// Number of leading predictions/actuals/residuals echoed per head.
const SAMPLE_SIZE: usize = 10;
const CALIBRATION_PERCENTILES: [usize; 5] = [0, 25, 50, 75, 100];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationPoint {
    pub percentile: String,
    pub actual: f32,
    pub predicted: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadDiagnostics {
    pub name: &'static str,
    pub predictions: Vec<f32>,
    pub actuals: Vec<f32>,
    /// `predicted - actual`.
    pub residuals: Vec<f32>,
    /// Population variance of the labels.
    pub variance: f32,
    pub predicted_variance: f32,
    pub mae: f32,
    pub rmse: f32,
    pub r2: f32,
    pub calibration: Vec<CalibrationPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub model_name: String,
    /// Rows in the dataset the model was trained on; `None` for checkpoints
    /// that predate row tracking.
    pub trained_on_rows: Option<usize>,
    pub current_rows: usize,
    /// True only when the current dataset has the row count the model was
    /// trained on, so the rebuilt holdout is the one it never saw.
    pub holdout_verified: bool,
    pub test_examples: usize,
    pub test_metrics: Option<TestMetrics>,
    pub heads: Vec<HeadDiagnostics>,
}

/// Builds one `HeadDiagnostics` per output column. `predicted` and `actual`
/// are N×4 in scaled label space.
pub fn diagnose_heads(
    predicted: ArrayView2<f32>,
    actual: ArrayView2<f32>,
) -> Result<Vec<HeadDiagnostics>, ModelError> {
    let metrics = calculate_metrics(actual, predicted)?;
    let heads = HEAD_NAMES
        .iter()
        .zip(metrics)
        .enumerate()
        .map(|(k, (&name, m))| {
            let preds = predicted.column(k).to_vec();
            let acts = actual.column(k).to_vec();
            let residuals: Vec<f32> = preds.iter().zip(&acts).map(|(p, a)| p - a).collect();
            HeadDiagnostics {
                name,
                variance: population_variance(&acts),
                predicted_variance: population_variance(&preds),
                mae: m.mae,
                rmse: m.rmse,
                r2: m.r2,
                calibration: calibration(&acts, &preds),
                predictions: preds.into_iter().take(SAMPLE_SIZE).collect(),
                actuals: acts.into_iter().take(SAMPLE_SIZE).collect(),
                residuals: residuals.into_iter().take(SAMPLE_SIZE).collect(),
            }
        })
        .collect();
    Ok(heads)
}

fn population_variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    (values.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n) as f32
}

/// Pairs sorted by actual value, sampled at `floor(n·p/100)` for each
/// percentile p; indices past the end are skipped.
fn calibration(actuals: &[f32], predictions: &[f32]) -> Vec<CalibrationPoint> {
    let mut pairs: Vec<(f32, f32)> = actuals.iter().copied().zip(predictions.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    CALIBRATION_PERCENTILES
        .iter()
        .filter_map(|&p| {
            let idx = pairs.len() * p / 100;
            pairs.get(idx).map(|&(actual, predicted)| CalibrationPoint {
                percentile: format!("{p}th"),
                actual,
                predicted,
            })
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Dataset summary
// ────────────────────────────────────────────────────────────────────────────

const SAMPLE_EXAMPLES: usize = 3;
const SAMPLE_INPUT_WIDTH: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleSummary {
    pub labels: Labels,
    pub resume_skill_count: u32,
    pub job_skill_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSummary {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStatsReport {
    pub source: String,
    #[serde(flatten)]
    pub metadata: DatasetMetadata,
    pub first_examples: Vec<ExampleSummary>,
    /// Leading columns of the first encoded row.
    pub first_input: Vec<f32>,
    pub first_output: Vec<f32>,
    /// Scaled label columns.
    pub outputs: Vec<OutputSummary>,
}

pub fn summarize_dataset(
    source: &str,
    raw: &[TrainingExample],
    processed: &ProcessedData,
) -> DataStatsReport {
    let first_row = |m: &Array2<f32>, width: usize| -> Vec<f32> {
        if m.nrows() == 0 {
            Vec::new()
        } else {
            m.row(0).iter().take(width).copied().collect()
        }
    };

    let outputs = HEAD_NAMES
        .iter()
        .enumerate()
        .filter(|(k, _)| *k < processed.outputs.ncols())
        .map(|(k, &name)| {
            let column = processed.outputs.column(k);
            let count = column.len();
            let (min, max, sum) = column.iter().fold(
                (f32::INFINITY, f32::NEG_INFINITY, 0.0_f64),
                |(lo, hi, sum), v| (lo.min(*v), hi.max(*v), sum + *v as f64),
            );
            OutputSummary {
                name,
                min,
                max,
                mean: if count == 0 { 0.0 } else { (sum / count as f64) as f32 },
                count,
            }
        })
        .collect();

    DataStatsReport {
        source: source.to_string(),
        metadata: processed.metadata,
        first_examples: raw
            .iter()
            .take(SAMPLE_EXAMPLES)
            .map(|ex| ExampleSummary {
                labels: ex.labels.clone(),
                resume_skill_count: ex.resume_features.skill_count,
                job_skill_count: ex.job_features.required_skill_count,
            })
            .collect(),
        first_input: first_row(&processed.inputs, SAMPLE_INPUT_WIDTH),
        first_output: first_row(&processed.outputs, usize::MAX),
        outputs,
    }
}
