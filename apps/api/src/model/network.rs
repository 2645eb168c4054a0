//! The readiness network: a shared feed-forward trunk feeding four single-unit
//! regression heads whose outputs are concatenated into one 4-vector.
//!
//! ```text
//! D → Dense(256, relu, L2) → BatchNorm → Dropout(0.4)
//!   → Dense(128, relu, L2) → BatchNorm → Dropout(0.3)
//!   → Dense(64, relu, L2)  → Dropout(0.2)
//!   → [readiness: sigmoid | missingSkills: relu | matchedSkills: relu | weeks: relu]
//! ```

use ndarray::{s, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::preprocess::OUTPUT_DIMS;
use crate::model::layers::{Activation, BatchNorm, Dense, Dropout, Layer, Mode, ParamCount};
use crate::model::loss::{mean_absolute_error, mean_squared_error, LossKind};
use crate::model::optimizer::{Adam, DEFAULT_LEARNING_RATE};
use crate::model::ModelError;

pub const L2_LAMBDA: f32 = 0.001;
/// Output heads in column order.
const HEADS: [(&str, Activation); OUTPUT_DIMS] = [
    ("readiness", Activation::Sigmoid),
    ("missingSkills", Activation::Relu),
    ("matchedSkills", Activation::Relu),
    ("weeks", Activation::Relu),
];
pub const HEAD_NAMES: [&str; OUTPUT_DIMS] = [HEADS[0].0, HEADS[1].0, HEADS[2].0, HEADS[3].0];
const TRUNK_OUTPUT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileOptions {
    pub learning_rate: f32,
    pub loss: LossKind,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            loss: LossKind::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Compiled {
    loss: LossKind,
    optimizer: Adam,
}

/// Loss and MAE of one training step, measured before the update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOutcome {
    pub loss: f32,
    pub mae: f32,
}

/// Inference-mode metrics over a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Compiled loss.
    pub loss: f32,
    /// Uniform MSE over all outputs.
    pub mse: f32,
    pub mae: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSize {
    pub total_params: usize,
    pub trainable_params: usize,
    pub non_trainable_params: usize,
    /// 4 bytes per parameter.
    pub memory_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessNetwork {
    input_dims: usize,
    trunk: Vec<Layer>,
    heads: Vec<Dense>,
    #[serde(skip)]
    compiled: Option<Compiled>,
    #[serde(skip, default = "StdRng::from_entropy")]
    rng: StdRng,
}

/// Builds an uncompiled network for `input_dims` features. A seed makes
/// initialization and dropout masks reproducible.
pub fn build_model(input_dims: usize, seed: Option<u64>) -> Result<ReadinessNetwork, ModelError> {
    if input_dims == 0 {
        return Err(ModelError::InvalidInputDims);
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let trunk = vec![
        Layer::Dense(Dense::new(input_dims, 256, Activation::Relu, L2_LAMBDA, &mut rng)),
        Layer::BatchNorm(BatchNorm::new(256)),
        Layer::Dropout(Dropout::new(0.4)),
        Layer::Dense(Dense::new(256, 128, Activation::Relu, L2_LAMBDA, &mut rng)),
        Layer::BatchNorm(BatchNorm::new(128)),
        Layer::Dropout(Dropout::new(0.3)),
        Layer::Dense(Dense::new(128, TRUNK_OUTPUT, Activation::Relu, L2_LAMBDA, &mut rng)),
        Layer::Dropout(Dropout::new(0.2)),
    ];
    let heads = HEADS
        .iter()
        .map(|(_, activation)| Dense::new(TRUNK_OUTPUT, 1, *activation, 0.0, &mut rng))
        .collect();

    let network = ReadinessNetwork {
        input_dims,
        trunk,
        heads,
        compiled: None,
        rng,
    };
    debug!(
        input_dims,
        params = network.model_size().total_params,
        "Built readiness network"
    );
    Ok(network)
}

impl ReadinessNetwork {
    pub fn input_dims(&self) -> usize {
        self.input_dims
    }

    /// Attaches a fresh Adam optimizer and the training loss.
    pub fn compile(&mut self, options: CompileOptions) {
        self.compiled = Some(Compiled {
            loss: options.loss,
            optimizer: Adam::new(options.learning_rate),
        });
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn loss_kind(&self) -> Option<LossKind> {
        self.compiled.map(|c| c.loss)
    }

    /// One forward/backward pass and one Adam step.
    pub fn train_on_batch(
        &mut self,
        features: ArrayView2<f32>,
        labels: ArrayView2<f32>,
    ) -> Result<BatchOutcome, ModelError> {
        let loss_kind = self.loss_kind().ok_or(ModelError::NotCompiled)?;
        self.check_shapes(features, Some(labels))?;
        if features.nrows() == 0 {
            return Err(ModelError::EmptyBatch);
        }

        let predicted = self.forward_train(&features.to_owned());
        let (loss, grad) = loss_kind.value_and_gradient(predicted.view(), labels);
        let mae = mean_absolute_error(predicted.view(), labels);
        if !loss.is_finite() {
            self.clear_caches();
            return Err(ModelError::NonFiniteLoss(loss));
        }

        self.backward(&grad);
        let applied = self.apply_gradients();
        self.clear_caches();
        applied?;
        Ok(BatchOutcome { loss, mae })
    }

    fn apply_gradients(&mut self) -> Result<(), ModelError> {
        let compiled = self.compiled.as_mut().ok_or(ModelError::NotCompiled)?;
        compiled.optimizer.begin_step();
        let adam = compiled.optimizer;
        for layer in &mut self.trunk {
            layer.apply_gradients(&adam)?;
        }
        for head in &mut self.heads {
            head.apply_gradients(&adam)?;
        }
        Ok(())
    }

    /// Walks the layer chain from `input_dims` and confirms every parameter
    /// matrix fits its neighbours. Deserialized networks must pass this before
    /// they are used.
    pub fn check_layer_shapes(&self) -> Result<(), ModelError> {
        if self.input_dims == 0 {
            return Err(ModelError::InvalidInputDims);
        }
        let mut width = self.input_dims;
        for (i, layer) in self.trunk.iter().enumerate() {
            width = layer.check_shape(&format!("trunk[{i}]"), width)?;
        }
        if width != TRUNK_OUTPUT {
            return Err(ModelError::LayerShape {
                layer: "trunk".into(),
                kind: "output",
                expected: (1, TRUNK_OUTPUT),
                found: (1, width),
            });
        }
        if self.heads.len() != OUTPUT_DIMS {
            return Err(ModelError::LayerShape {
                layer: "heads".into(),
                kind: "count",
                expected: (1, OUTPUT_DIMS),
                found: (1, self.heads.len()),
            });
        }
        for (head, (name, _)) in self.heads.iter().zip(HEADS) {
            let units = head.check_shape(name, TRUNK_OUTPUT)?;
            if units != 1 {
                return Err(ModelError::LayerShape {
                    layer: name.to_string(),
                    kind: "dense",
                    expected: (TRUNK_OUTPUT, 1),
                    found: (TRUNK_OUTPUT, units),
                });
            }
        }
        Ok(())
    }

    /// Compiled loss, uniform MSE and MAE in inference mode.
    pub fn evaluate(
        &self,
        features: ArrayView2<f32>,
        labels: ArrayView2<f32>,
    ) -> Result<Evaluation, ModelError> {
        let loss_kind = self.loss_kind().ok_or(ModelError::NotCompiled)?;
        self.check_shapes(features, Some(labels))?;
        if features.nrows() == 0 {
            return Err(ModelError::EmptyBatch);
        }
        let predicted = self.infer(features)?;
        Ok(Evaluation {
            loss: loss_kind.value(predicted.view(), labels),
            mse: mean_squared_error(predicted.view(), labels),
            mae: mean_absolute_error(predicted.view(), labels),
        })
    }

    /// Inference-mode forward pass: N×D → N×4. Takes `&self`; nothing is cached.
    pub fn infer(&self, features: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.check_shapes(features, None)?;
        let mut h = features.to_owned();
        for layer in &self.trunk {
            h = layer.infer(&h);
        }
        let mut out = Array2::zeros((h.nrows(), OUTPUT_DIMS));
        for (k, head) in self.heads.iter().enumerate() {
            out.column_mut(k).assign(&head.infer(&h).column(0));
        }
        Ok(out)
    }

    pub fn model_size(&self) -> ModelSize {
        let counts = self
            .trunk
            .iter()
            .map(Layer::param_count)
            .chain(self.heads.iter().map(Dense::param_count))
            .fold(ParamCount::default(), |acc, c| ParamCount {
                trainable: acc.trainable + c.trainable,
                non_trainable: acc.non_trainable + c.non_trainable,
            });
        let total = counts.trainable + counts.non_trainable;
        ModelSize {
            total_params: total,
            trainable_params: counts.trainable,
            non_trainable_params: counts.non_trainable,
            memory_bytes: total * std::mem::size_of::<f32>(),
        }
    }

    /// Sum of the L2 penalties of every regularized kernel.
    pub fn l2_penalty(&self) -> f32 {
        self.trunk
            .iter()
            .filter_map(|layer| match layer {
                Layer::Dense(dense) => Some(dense.l2_penalty()),
                _ => None,
            })
            .sum()
    }

    /// Drops every per-batch working buffer.
    pub fn clear_caches(&mut self) {
        for layer in &mut self.trunk {
            layer.clear_cache();
        }
        for head in &mut self.heads {
            head.clear_cache();
        }
    }

    pub fn layer_kinds(&self) -> Vec<&'static str> {
        self.trunk.iter().map(Layer::kind).collect()
    }

    fn forward_train(&mut self, features: &Array2<f32>) -> Array2<f32> {
        let mut h = features.clone();
        for layer in &mut self.trunk {
            h = layer.forward(&h, Mode::Train, &mut self.rng);
        }
        let mut out = Array2::zeros((h.nrows(), OUTPUT_DIMS));
        for (k, head) in self.heads.iter_mut().enumerate() {
            out.column_mut(k).assign(&head.forward(&h, Mode::Train).column(0));
        }
        out
    }

    fn backward(&mut self, grad: &Array2<f32>) {
        let mut d_trunk = Array2::<f32>::zeros((grad.nrows(), TRUNK_OUTPUT));
        for (k, head) in self.heads.iter_mut().enumerate() {
            let head_grad = grad.slice(s![.., k..k + 1]).to_owned();
            d_trunk += &head.backward(&head_grad);
        }
        for layer in self.trunk.iter_mut().rev() {
            d_trunk = layer.backward(&d_trunk);
        }
    }

    fn check_shapes(
        &self,
        features: ArrayView2<f32>,
        labels: Option<ArrayView2<f32>>,
    ) -> Result<(), ModelError> {
        if features.ncols() != self.input_dims {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dims,
                found: features.ncols(),
            });
        }
        if let Some(labels) = labels {
            let expected = (features.nrows(), OUTPUT_DIMS);
            if labels.dim() != expected {
                return Err(ModelError::LabelShape {
                    expected,
                    found: labels.dim(),
                });
            }
        }
        Ok(())
    }
}
