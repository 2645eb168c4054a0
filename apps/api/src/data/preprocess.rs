//! Preprocessing: labeled examples → `ProcessedData` matrices, train/validation/
//! test splitting and mini-batching.
//!
//! Label scaling is part of the training-data contract. The caps below are
//! assumptions of the data generator; `denormalize_predictions` inverts them
//! with the same constants.

use ndarray::{s, Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::DataError;
use crate::features::extractor::{encode_all_features, JobFeatures, ResumeFeatures};

pub const OUTPUT_DIMS: usize = 4;
/// Missing-skill counts are divided by this cap.
pub const MISSING_SKILL_CAP: f32 = 20.0;
/// Matched-skill counts are divided by this cap.
pub const MATCHED_SKILL_CAP: f32 = 20.0;
/// Weeks-to-learn are divided by this cap.
pub const WEEKS_CAP: f32 = 52.0;

// ────────────────────────────────────────────────────────────────────────────
// Training-data schema
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Labels {
    /// Already in [0, 1].
    pub readiness_score: f32,
    pub missing_skill_count: f32,
    pub matched_skill_count: f32,
    pub estimated_weeks_to_learn: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingExample {
    pub resume_features: ResumeFeatures,
    pub job_features: JobFeatures,
    pub labels: Labels,
}

/// Scales one label record into the network's output space.
pub fn scale_labels(labels: &Labels) -> [f32; OUTPUT_DIMS] {
    [
        labels.readiness_score,
        labels.missing_skill_count / MISSING_SKILL_CAP,
        labels.matched_skill_count / MATCHED_SKILL_CAP,
        labels.estimated_weeks_to_learn / WEEKS_CAP,
    ]
}

// ────────────────────────────────────────────────────────────────────────────
// ProcessedData
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub total_examples: usize,
    pub input_dimensions: usize,
    pub output_dimensions: usize,
}

/// N×D inputs and N×4 scaled labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedData {
    pub inputs: Array2<f32>,
    pub outputs: Array2<f32>,
    pub metadata: DatasetMetadata,
}

impl ProcessedData {
    pub fn new(inputs: Array2<f32>, outputs: Array2<f32>) -> Self {
        let metadata = DatasetMetadata {
            total_examples: inputs.nrows(),
            input_dimensions: inputs.ncols(),
            output_dimensions: outputs.ncols(),
        };
        Self {
            inputs,
            outputs,
            metadata,
        }
    }

    pub fn empty() -> Self {
        Self::new(Array2::zeros((0, 0)), Array2::zeros((0, 0)))
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }

    /// Rows at `indices`, in that order. Column widths are preserved even when
    /// `indices` is empty.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self::new(
            self.inputs.select(Axis(0), indices),
            self.outputs.select(Axis(0), indices),
        )
    }
}

/// Encodes every example. Input width and output width come from the first
/// example; an empty slice yields `{N: 0, D: 0, outputs: 0}`.
pub fn preprocess_data(raw: &[TrainingExample]) -> Result<ProcessedData, DataError> {
    let Some(first) = raw.first() else {
        return Ok(ProcessedData::empty());
    };

    let dims = encode_all_features(&first.resume_features, &first.job_features).len();
    let mut inputs = Vec::with_capacity(raw.len() * dims);
    let mut outputs = Vec::with_capacity(raw.len() * OUTPUT_DIMS);

    for (row, example) in raw.iter().enumerate() {
        let encoded = encode_all_features(&example.resume_features, &example.job_features);
        if encoded.len() != dims {
            return Err(DataError::RaggedRow {
                row,
                expected: dims,
                found: encoded.len(),
            });
        }
        inputs.extend(encoded);
        outputs.extend(scale_labels(&example.labels));
    }

    let inputs = Array2::from_shape_vec((raw.len(), dims), inputs)
        .map_err(|e| DataError::Shape(e.to_string()))?;
    let outputs = Array2::from_shape_vec((raw.len(), OUTPUT_DIMS), outputs)
        .map_err(|e| DataError::Shape(e.to_string()))?;
    Ok(ProcessedData::new(inputs, outputs))
}

// ────────────────────────────────────────────────────────────────────────────
// Splitting
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    /// Informational only: the test split receives whatever rows remain.
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            validation: 0.15,
            test: 0.15,
        }
    }
}

impl SplitRatios {
    fn validate(&self) -> Result<(), DataError> {
        let all = [self.train, self.validation, self.test];
        if all.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(DataError::InvalidSplitRatios(format!(
                "ratios must be finite and non-negative, got {self:?}"
            )));
        }
        if self.train + self.validation > 1.0 + 1e-9 {
            return Err(DataError::InvalidSplitRatios(format!(
                "train + validation exceeds 1.0 ({} + {})",
                self.train, self.validation
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSplit {
    pub train: ProcessedData,
    pub validation: ProcessedData,
    pub test: ProcessedData,
}

/// Shuffles row indices once (Fisher–Yates) and slices them into
/// `floor(N·train)`, `floor(N·validation)` and the remainder for test.
pub fn split_data<R: Rng + ?Sized>(
    data: &ProcessedData,
    ratios: SplitRatios,
    rng: &mut R,
) -> Result<DataSplit, DataError> {
    ratios.validate()?;

    let total = data.len();
    let train_size = ((total as f64) * ratios.train).floor() as usize;
    let val_size = (((total as f64) * ratios.validation).floor() as usize).min(total - train_size);

    let mut indices: Vec<usize> = (0..total).collect();
    indices.shuffle(rng);

    let (train_idx, rest) = indices.split_at(train_size);
    let (val_idx, test_idx) = rest.split_at(val_size);

    Ok(DataSplit {
        train: data.subset(train_idx),
        validation: data.subset(val_idx),
        test: data.subset(test_idx),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Batching
// ────────────────────────────────────────────────────────────────────────────

/// A contiguous window over a dataset. Borrowed, so nothing outlives the step
/// that consumes it.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub features: ArrayView2<'a, f32>,
    pub labels: ArrayView2<'a, f32>,
}

impl Batch<'_> {
    pub fn size(&self) -> usize {
        self.features.nrows()
    }
}

/// Contiguous batches in row order; the last one may be smaller.
pub fn create_batches(data: &ProcessedData, batch_size: usize) -> Result<Vec<Batch<'_>>, DataError> {
    if batch_size == 0 {
        return Err(DataError::InvalidBatchSize);
    }
    let total = data.len();
    let batches = (0..total)
        .step_by(batch_size)
        .map(|start| {
            let end = (start + batch_size).min(total);
            Batch {
                features: data.inputs.slice(s![start..end, ..]),
                labels: data.outputs.slice(s![start..end, ..]),
            }
        })
        .collect();
    Ok(batches)
}

/// Returns a copy of `data` with rows in a fresh random order.
pub fn shuffle_rows<R: Rng + ?Sized>(data: &ProcessedData, rng: &mut R) -> ProcessedData {
    let mut indices: Vec<usize> = (0..data.len()).collect();
    indices.shuffle(rng);
    data.subset(&indices)
}
