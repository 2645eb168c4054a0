//! Per-column statistics and z-score normalization of input matrices.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::preprocess::{DatasetMetadata, ProcessedData};
use crate::data::DataError;

/// Per-column `{min, max, mean, population std}` over a reference set of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl NormalizationStats {
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Confirms all four vectors cover the same columns and returns that width.
    pub fn validate(&self) -> Result<usize, DataError> {
        let width = self.width();
        if [self.min.len(), self.max.len(), self.std.len()]
            .iter()
            .any(|len| *len != width)
        {
            return Err(DataError::RaggedStats {
                min: self.min.len(),
                max: self.max.len(),
                mean: self.mean.len(),
                std: self.std.len(),
            });
        }
        Ok(width)
    }

    /// Z-scores a single row. Zero-variance columns map to 0.
    pub fn normalize_row(&self, row: &[f32]) -> Result<Vec<f32>, DataError> {
        let width = self.validate()?;
        if row.len() != width {
            return Err(DataError::StatsWidthMismatch {
                stats: width,
                data: row.len(),
            });
        }
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, x)| z_score(*x, self.mean[j], self.std[j]))
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStats {
    #[serde(flatten)]
    pub metadata: DatasetMetadata,
    pub input_stats: NormalizationStats,
}

/// Column statistics over every row of `data`. Empty data yields zeros.
pub fn get_dataset_stats(data: &ProcessedData) -> DatasetStats {
    let inputs = &data.inputs;
    let (rows, cols) = inputs.dim();

    let input_stats = if rows == 0 {
        NormalizationStats {
            min: vec![0.0; cols],
            max: vec![0.0; cols],
            mean: vec![0.0; cols],
            std: vec![0.0; cols],
        }
    } else {
        let mut stats = NormalizationStats {
            min: Vec::with_capacity(cols),
            max: Vec::with_capacity(cols),
            mean: Vec::with_capacity(cols),
            std: Vec::with_capacity(cols),
        };
        for column in inputs.axis_iter(Axis(1)) {
            let n = column.len() as f64;
            let mean = column.iter().map(|v| *v as f64).sum::<f64>() / n;
            let variance = column.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
            stats.min.push(column.iter().copied().fold(f32::INFINITY, f32::min));
            stats.max.push(column.iter().copied().fold(f32::NEG_INFINITY, f32::max));
            stats.mean.push(mean as f32);
            stats.std.push(variance.max(0.0).sqrt() as f32);
        }
        stats
    };

    DatasetStats {
        metadata: data.metadata,
        input_stats,
    }
}

/// Z-scores every input column with `stats`, or with fresh stats computed from
/// `data` itself when none are supplied. Outputs are untouched.
pub fn normalize_data(
    data: &ProcessedData,
    stats: Option<&NormalizationStats>,
) -> Result<ProcessedData, DataError> {
    let computed;
    let stats = match stats {
        Some(s) => s,
        None => {
            computed = get_dataset_stats(data).input_stats;
            &computed
        }
    };
    stats.validate()?;
    check_width(stats, data)?;

    let mut inputs = data.inputs.clone();
    for (j, mut column) in inputs.axis_iter_mut(Axis(1)).enumerate() {
        let (mean, std) = (stats.mean[j], stats.std[j]);
        column.mapv_inplace(|x| z_score(x, mean, std));
    }
    Ok(ProcessedData {
        inputs,
        outputs: data.outputs.clone(),
        metadata: data.metadata,
    })
}

/// Inverse of `normalize_data`: `x·std + mean`. Zero-variance columns come
/// back as their mean, since the original values were discarded.
pub fn denormalize_inputs(
    inputs: &Array2<f32>,
    stats: &NormalizationStats,
) -> Result<Array2<f32>, DataError> {
    let width = stats.validate()?;
    if inputs.ncols() != width {
        return Err(DataError::StatsWidthMismatch {
            stats: width,
            data: inputs.ncols(),
        });
    }
    let mut restored = inputs.clone();
    for (j, mut column) in restored.axis_iter_mut(Axis(1)).enumerate() {
        let (mean, std) = (stats.mean[j], stats.std[j]);
        column.mapv_inplace(|x| x * std + mean);
    }
    Ok(restored)
}

fn check_width(stats: &NormalizationStats, data: &ProcessedData) -> Result<(), DataError> {
    // An empty 0×0 dataset is trivially compatible with any stats.
    if data.inputs.ncols() != stats.width() && !(data.is_empty() && data.inputs.ncols() == 0) {
        return Err(DataError::StatsWidthMismatch {
            stats: stats.width(),
            data: data.inputs.ncols(),
        });
    }
    Ok(())
}

fn z_score(x: f32, mean: f32, std: f32) -> f32 {
    if std == 0.0 {
        0.0
    } else {
        (x - mean) / std
    }
}
