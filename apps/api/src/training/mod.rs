// Epoch loop with early stopping, plus holdout evaluation and conversion of raw
// network outputs into human units.

pub mod evaluator;
pub mod trainer;

use thiserror::Error;

use crate::data::DataError;
use crate::model::ModelError;

/// Why a training run failed. Reported through `TrainingResult.error`.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("number of epochs must be at least 1")]
    NoEpochs,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Serde adapter for loss values that may be infinite or NaN. JSON has no
/// such numbers, so they are written as `null` and read back as +∞.
pub(crate) mod finite_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f32(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::INFINITY))
    }
}
