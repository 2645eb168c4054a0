// Model builder: layers, Adam, losses, the four-head readiness network and
// checkpoint persistence.

pub mod layers;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod store;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("input dimension must be at least 1")]
    InvalidInputDims,

    #[error("model expects {expected} input features, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("labels have shape {found:?}, expected {expected:?}")]
    LabelShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("parameter has shape {param:?} but its update has shape {found:?}")]
    ParamShape {
        param: (usize, usize),
        found: (usize, usize),
    },

    #[error("layer {layer} ({kind}) has shape {found:?}, expected {expected:?}")]
    LayerShape {
        layer: String,
        kind: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("model must be compiled before training or evaluation")]
    NotCompiled,

    #[error("cannot run on an empty batch")]
    EmptyBatch,

    #[error("loss became non-finite ({0})")]
    NonFiniteLoss(f32),
}
