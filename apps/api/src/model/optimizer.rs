//! Adam with bias correction. Hyperparameters live here; first/second moment
//! buffers live next to the parameter they track (see `layers`).

use ndarray::{Array2, Ix2, Zip};
use serde::{Deserialize, Serialize};

use crate::model::ModelError;

pub const DEFAULT_LEARNING_RATE: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// Number of completed `begin_step` calls. Shared by every parameter.
    #[serde(skip)]
    step: u32,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE)
    }
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
        }
    }

    /// Advances the shared timestep. Call once per batch, before any `update`.
    pub fn begin_step(&mut self) {
        self.step = self.step.saturating_add(1);
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Applies one bias-corrected step. Gradient and moment buffers must
    /// match the parameter's shape exactly.
    pub fn update(
        &self,
        param: &mut Array2<f32>,
        grad: &Array2<f32>,
        moments: &mut Moments,
    ) -> Result<(), ModelError> {
        for found in [grad.dim(), moments.m.dim(), moments.v.dim()] {
            if found != param.dim() {
                return Err(ModelError::ParamShape {
                    param: param.dim(),
                    found,
                });
            }
        }
        let (b1, b2) = (self.beta1, self.beta2);
        moments.m.zip_mut_with(grad, |m, g| *m = b1 * *m + (1.0 - b1) * g);
        moments.v.zip_mut_with(grad, |v, g| *v = b2 * *v + (1.0 - b2) * g * g);

        let t = self.step.max(1) as i32;
        let bias1 = 1.0 - b1.powi(t);
        let bias2 = 1.0 - b2.powi(t);
        let (lr, eps) = (self.learning_rate, self.epsilon);

        Zip::from(param)
            .and(&moments.m)
            .and(&moments.v)
            .for_each(|p, m, v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
        Ok(())
    }
}

/// First and second moment estimates for one parameter matrix.
#[derive(Debug, Clone)]
pub struct Moments {
    m: Array2<f32>,
    v: Array2<f32>,
}

impl Moments {
    pub fn zeros(dim: Ix2) -> Self {
        Self {
            m: Array2::zeros(dim),
            v: Array2::zeros(dim),
        }
    }
}
