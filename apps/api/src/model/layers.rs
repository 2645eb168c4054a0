//! Layer primitives for the readiness network.
//!
//! Every layer has two forward paths:
//! - `forward(.., Mode::Train, ..)` caches what `backward` needs and, for
//!   dropout and batch norm, behaves stochastically / uses batch statistics.
//! - `infer(&self, ..)` never mutates, so a trained network can be shared
//!   behind an `Arc` and called concurrently.
//!
//! Parameters are stored as 2-D matrices (biases and batch-norm vectors as
//! `1 × n` rows) so a single `Adam::update` covers all of them.

use ndarray::{Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::model::optimizer::{Adam, Moments};
use crate::model::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Infer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(self, z: &mut Array2<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative written in terms of the activation's output.
    fn derivative(self, output: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Linear => Array2::ones(output.raw_dim()),
            Activation::Relu => output.mapv(|y| if y > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => output.mapv(|y| y * (1.0 - y)),
        }
    }
}

/// Per-layer parameter counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamCount {
    pub trainable: usize,
    pub non_trainable: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Dense
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DenseCache {
    input: Array2<f32>,
    output: Array2<f32>,
}

/// Fully connected layer with a fused activation and optional L2 on the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// `inputs × units`
    kernel: Array2<f32>,
    /// `1 × units`
    bias: Array2<f32>,
    activation: Activation,
    l2: f32,
    #[serde(skip)]
    cache: Option<DenseCache>,
    #[serde(skip)]
    grads: Option<[Array2<f32>; 2]>,
    #[serde(skip)]
    moments: Option<[Moments; 2]>,
}

impl Dense {
    /// Glorot-uniform kernel, zero bias.
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        units: usize,
        activation: Activation,
        l2: f32,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (inputs + units) as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        let kernel = Array2::from_shape_fn((inputs, units), |_| dist.sample(&mut *rng));
        Self {
            kernel,
            bias: Array2::zeros((1, units)),
            activation,
            l2,
            cache: None,
            grads: None,
            moments: None,
        }
    }

    pub fn inputs(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn units(&self) -> usize {
        self.kernel.ncols()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Checks that this layer accepts `width` inputs and that its bias matches
    /// the kernel. Returns the output width.
    pub fn check_shape(&self, layer: &str, width: usize) -> Result<usize, ModelError> {
        let units = self.units();
        let checks = [
            ((width, units), self.kernel.dim()),
            ((1, units), self.bias.dim()),
        ];
        for (expected, found) in checks {
            if expected != found {
                return Err(ModelError::LayerShape {
                    layer: layer.to_string(),
                    kind: "dense",
                    expected,
                    found,
                });
            }
        }
        Ok(units)
    }

    pub fn forward(&mut self, x: &Array2<f32>, mode: Mode) -> Array2<f32> {
        let out = self.infer(x);
        if mode == Mode::Train {
            self.cache = Some(DenseCache {
                input: x.clone(),
                output: out.clone(),
            });
        }
        out
    }

    pub fn infer(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut z = x.dot(&self.kernel) + &self.bias;
        self.activation.apply(&mut z);
        z
    }

    /// Stores parameter gradients and returns the gradient w.r.t. the input.
    /// Without a cached training forward pass there is nothing to
    /// differentiate, so the input gradient is zero.
    pub fn backward(&mut self, grad_out: &Array2<f32>) -> Array2<f32> {
        let Some(cache) = self.cache.take() else {
            return Array2::zeros((grad_out.nrows(), self.inputs()));
        };
        let delta = grad_out * &self.activation.derivative(&cache.output);
        let mut d_kernel = cache.input.t().dot(&delta);
        if self.l2 > 0.0 {
            d_kernel.scaled_add(2.0 * self.l2, &self.kernel);
        }
        let d_bias = delta.sum_axis(Axis(0)).insert_axis(Axis(0));
        let d_input = delta.dot(&self.kernel.t());
        self.grads = Some([d_kernel, d_bias]);
        d_input
    }

    pub fn apply_gradients(&mut self, adam: &Adam) -> Result<(), ModelError> {
        let Some([d_kernel, d_bias]) = self.grads.take() else {
            return Ok(());
        };
        let (kernel_dim, bias_dim) = (self.kernel.raw_dim(), self.bias.raw_dim());
        let moments = self
            .moments
            .get_or_insert_with(|| [Moments::zeros(kernel_dim), Moments::zeros(bias_dim)]);
        let [kernel_m, bias_m] = moments;
        adam.update(&mut self.kernel, &d_kernel, kernel_m)?;
        adam.update(&mut self.bias, &d_bias, bias_m)
    }

    /// `λ·Σw²` over the kernel.
    pub fn l2_penalty(&self) -> f32 {
        self.l2 * self.kernel.iter().map(|w| w * w).sum::<f32>()
    }

    pub fn param_count(&self) -> ParamCount {
        ParamCount {
            trainable: self.kernel.len() + self.bias.len(),
            non_trainable: 0,
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
        self.grads = None;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// BatchNorm
// ────────────────────────────────────────────────────────────────────────────

pub const BATCH_NORM_MOMENTUM: f32 = 0.99;
pub const BATCH_NORM_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone)]
struct BatchNormCache {
    x_hat: Array2<f32>,
    inv_std: Array2<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    gamma: Array2<f32>,
    beta: Array2<f32>,
    moving_mean: Array2<f32>,
    moving_variance: Array2<f32>,
    momentum: f32,
    epsilon: f32,
    #[serde(skip)]
    cache: Option<BatchNormCache>,
    #[serde(skip)]
    grads: Option<[Array2<f32>; 2]>,
    #[serde(skip)]
    moments: Option<[Moments; 2]>,
}

impl BatchNorm {
    pub fn new(width: usize) -> Self {
        Self {
            gamma: Array2::ones((1, width)),
            beta: Array2::zeros((1, width)),
            moving_mean: Array2::zeros((1, width)),
            moving_variance: Array2::ones((1, width)),
            momentum: BATCH_NORM_MOMENTUM,
            epsilon: BATCH_NORM_EPSILON,
            cache: None,
            grads: None,
            moments: None,
        }
    }

    /// Training mode: normalizes with batch statistics and folds them into the
    /// moving averages.
    pub fn forward(&mut self, x: &Array2<f32>, mode: Mode) -> Array2<f32> {
        if mode == Mode::Infer || x.nrows() == 0 {
            return self.infer(x);
        }
        let n = x.nrows() as f32;
        let mean = (x.sum_axis(Axis(0)) / n).insert_axis(Axis(0));
        let centered = x - &mean;
        let variance = ((&centered * &centered).sum_axis(Axis(0)) / n).insert_axis(Axis(0));
        let eps = self.epsilon;
        let inv_std = variance.mapv(|v| 1.0 / (v + eps).sqrt());
        let x_hat = &centered * &inv_std;
        let out = &x_hat * &self.gamma + &self.beta;

        let momentum = self.momentum;
        self.moving_mean
            .zip_mut_with(&mean, |m, b| *m = momentum * *m + (1.0 - momentum) * b);
        self.moving_variance
            .zip_mut_with(&variance, |m, b| *m = momentum * *m + (1.0 - momentum) * b);

        self.cache = Some(BatchNormCache { x_hat, inv_std });
        out
    }

    pub fn infer(&self, x: &Array2<f32>) -> Array2<f32> {
        let eps = self.epsilon;
        let inv_std = self.moving_variance.mapv(|v| 1.0 / (v + eps).sqrt());
        (x - &self.moving_mean) * &inv_std * &self.gamma + &self.beta
    }

    pub fn backward(&mut self, grad_out: &Array2<f32>) -> Array2<f32> {
        let Some(BatchNormCache { x_hat, inv_std }) = self.cache.take() else {
            return Array2::zeros(grad_out.raw_dim());
        };
        let n = grad_out.nrows() as f32;
        let d_gamma = (grad_out * &x_hat).sum_axis(Axis(0)).insert_axis(Axis(0));
        let d_beta = grad_out.sum_axis(Axis(0)).insert_axis(Axis(0));

        let d_x_hat = grad_out * &self.gamma;
        let sum_d = d_x_hat.sum_axis(Axis(0)).insert_axis(Axis(0));
        let sum_d_x = (&d_x_hat * &x_hat).sum_axis(Axis(0)).insert_axis(Axis(0));
        let d_input = (&d_x_hat * n - &sum_d - &x_hat * &sum_d_x) * &inv_std / n;

        self.grads = Some([d_gamma, d_beta]);
        d_input
    }

    pub fn apply_gradients(&mut self, adam: &Adam) -> Result<(), ModelError> {
        let Some([d_gamma, d_beta]) = self.grads.take() else {
            return Ok(());
        };
        let dim = self.gamma.raw_dim();
        let [gamma_m, beta_m] = self
            .moments
            .get_or_insert_with(|| [Moments::zeros(dim), Moments::zeros(dim)]);
        adam.update(&mut self.gamma, &d_gamma, gamma_m)?;
        adam.update(&mut self.beta, &d_beta, beta_m)
    }

    /// Every per-feature vector must be `1 × width`.
    pub fn check_shape(&self, layer: &str, width: usize) -> Result<usize, ModelError> {
        let expected = (1, width);
        for found in [
            self.gamma.dim(),
            self.beta.dim(),
            self.moving_mean.dim(),
            self.moving_variance.dim(),
        ] {
            if found != expected {
                return Err(ModelError::LayerShape {
                    layer: layer.to_string(),
                    kind: "batchNorm",
                    expected,
                    found,
                });
            }
        }
        Ok(width)
    }

    pub fn param_count(&self) -> ParamCount {
        ParamCount {
            trainable: self.gamma.len() + self.beta.len(),
            non_trainable: self.moving_mean.len() + self.moving_variance.len(),
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
        self.grads = None;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dropout
// ────────────────────────────────────────────────────────────────────────────

/// Inverted dropout: kept activations are scaled by `1 / (1 - rate)` during
/// training so inference is the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    rate: f32,
    #[serde(skip)]
    mask: Option<Array2<f32>>,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self {
            rate: rate.clamp(0.0, 0.95),
            mask: None,
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn forward<R: Rng + ?Sized>(&mut self, x: &Array2<f32>, mode: Mode, rng: &mut R) -> Array2<f32> {
        if mode == Mode::Infer || self.rate == 0.0 {
            return x.clone();
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mask = Array2::from_shape_fn(x.raw_dim(), |_| {
            if rng.gen::<f32>() < keep {
                scale
            } else {
                0.0
            }
        });
        let out = x * &mask;
        self.mask = Some(mask);
        out
    }

    pub fn backward(&mut self, grad_out: &Array2<f32>) -> Array2<f32> {
        match self.mask.take() {
            Some(mask) => grad_out * &mask,
            None => grad_out.clone(),
        }
    }

    pub fn clear_cache(&mut self) {
        self.mask = None;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layer: enum dispatch over the trunk's layer kinds
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Layer {
    Dense(Dense),
    BatchNorm(BatchNorm),
    Dropout(Dropout),
}

impl Layer {
    pub fn forward<R: Rng + ?Sized>(&mut self, x: &Array2<f32>, mode: Mode, rng: &mut R) -> Array2<f32> {
        match self {
            Layer::Dense(l) => l.forward(x, mode),
            Layer::BatchNorm(l) => l.forward(x, mode),
            Layer::Dropout(l) => l.forward(x, mode, rng),
        }
    }

    pub fn infer(&self, x: &Array2<f32>) -> Array2<f32> {
        match self {
            Layer::Dense(l) => l.infer(x),
            Layer::BatchNorm(l) => l.infer(x),
            Layer::Dropout(_) => x.clone(),
        }
    }

    pub fn backward(&mut self, grad_out: &Array2<f32>) -> Array2<f32> {
        match self {
            Layer::Dense(l) => l.backward(grad_out),
            Layer::BatchNorm(l) => l.backward(grad_out),
            Layer::Dropout(l) => l.backward(grad_out),
        }
    }

    pub fn apply_gradients(&mut self, adam: &Adam) -> Result<(), ModelError> {
        match self {
            Layer::Dense(l) => l.apply_gradients(adam),
            Layer::BatchNorm(l) => l.apply_gradients(adam),
            Layer::Dropout(_) => Ok(()),
        }
    }

    /// Output width for `width` inputs, or the first inconsistent parameter.
    pub fn check_shape(&self, layer: &str, width: usize) -> Result<usize, ModelError> {
        match self {
            Layer::Dense(l) => l.check_shape(layer, width),
            Layer::BatchNorm(l) => l.check_shape(layer, width),
            Layer::Dropout(_) => Ok(width),
        }
    }

    pub fn param_count(&self) -> ParamCount {
        match self {
            Layer::Dense(l) => l.param_count(),
            Layer::BatchNorm(l) => l.param_count(),
            Layer::Dropout(_) => ParamCount::default(),
        }
    }

    pub fn clear_cache(&mut self) {
        match self {
            Layer::Dense(l) => l.clear_cache(),
            Layer::BatchNorm(l) => l.clear_cache(),
            Layer::Dropout(l) => l.clear_cache(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Dense(_) => "dense",
            Layer::BatchNorm(_) => "batchNorm",
            Layer::Dropout(_) => "dropout",
        }
    }
}
