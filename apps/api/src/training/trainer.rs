//! Mini-batch training with per-epoch validation and early stopping.
//!
//! One run moves through
//! `Initialized → [TrainBatches → EvalTrain → EvalVal → CheckEarlyStop]* → Terminated`.
//! Failures never escape as errors: they end the run with `success = false`,
//! infinite loss fields and whatever history was recorded before the failure.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::data::preprocess::{create_batches, shuffle_rows, ProcessedData};
use crate::model::network::{Evaluation, ReadinessNetwork};
use crate::model::ModelError;
use crate::training::{finite_or_null, TrainingError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub early_stopping_patience: usize,
    /// Minimum validation-loss decrease that counts as an improvement.
    pub min_delta: f32,
    /// 0 = debug logs only, 1 = one info line per epoch, 2 = plus per-batch lines.
    pub verbosity: u8,
    /// Reshuffle training rows at the start of every epoch.
    pub shuffle: bool,
    /// Seeds the per-epoch shuffle.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            early_stopping_patience: 10,
            min_delta: 0.001,
            verbosity: 1,
            shuffle: true,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochRecord {
    /// 1-based.
    pub epoch: usize,
    #[serde(with = "finite_or_null")]
    pub loss: f32,
    #[serde(with = "finite_or_null")]
    pub mae: f32,
    #[serde(with = "finite_or_null")]
    pub val_loss: f32,
    #[serde(with = "finite_or_null")]
    pub val_mae: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingHistory(Vec<EpochRecord>);

impl TrainingHistory {
    pub fn push(&mut self, record: EpochRecord) {
        self.0.push(record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.0.last()
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingResult {
    pub run_id: Uuid,
    pub success: bool,
    pub epochs_run: usize,
    /// Infinite when no epoch completed; serialized as `null`.
    #[serde(with = "finite_or_null")]
    pub final_loss: f32,
    /// Validation loss of the last completed epoch.
    #[serde(with = "finite_or_null")]
    pub final_val_loss: f32,
    #[serde(with = "finite_or_null")]
    pub best_val_loss: f32,
    /// 1-based epoch of `best_val_loss`; 0 when no epoch completed.
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub history: TrainingHistory,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    TrainBatches,
    EvalTrain,
    EvalVal,
    CheckEarlyStop,
    Terminated,
}

/// Everything a run accumulates; survives a failure so the partial history
/// can still be reported.
struct RunState {
    run_id: Uuid,
    phase: Phase,
    history: TrainingHistory,
    best_val_loss: f32,
    best_epoch: usize,
    wait: usize,
    stopped_early: bool,
}

impl RunState {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: Phase::Initialized,
            history: TrainingHistory::default(),
            best_val_loss: f32::INFINITY,
            best_epoch: 0,
            wait: 0,
            stopped_early: false,
        }
    }

    fn enter(&mut self, next: Phase, epoch: usize) {
        trace!(run_id = %self.run_id, epoch, from = ?self.phase, to = ?next, "Training phase");
        self.phase = next;
    }

    /// Records `val_loss` and reports whether patience is exhausted.
    fn observe(&mut self, epoch: usize, val_loss: f32, config: &TrainingConfig) -> bool {
        if val_loss < self.best_val_loss - config.min_delta {
            self.best_val_loss = val_loss;
            self.best_epoch = epoch;
            self.wait = 0;
        } else {
            self.wait += 1;
        }
        self.wait >= config.early_stopping_patience
    }
}

/// Trains `model` in place. `validation` drives early stopping; without it
/// (or when it is empty) validation metrics mirror the training metrics.
pub fn train_model(
    model: &mut ReadinessNetwork,
    train: &ProcessedData,
    validation: Option<&ProcessedData>,
    config: &TrainingConfig,
) -> TrainingResult {
    let started = Instant::now();
    let mut state = RunState::new();
    let validation = validation.filter(|v| !v.is_empty());

    info!(
        run_id = %state.run_id,
        train_rows = train.len(),
        val_rows = validation.map_or(0, ProcessedData::len),
        epochs = config.epochs,
        batch_size = config.batch_size,
        "Starting training"
    );

    let outcome = run_epochs(model, train, validation, config, &mut state);
    model.clear_caches();
    state.enter(Phase::Terminated, state.history.len());
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            let last = state.history.last().copied();
            let result = TrainingResult {
                run_id: state.run_id,
                success: true,
                epochs_run: state.history.len(),
                final_loss: last.map_or(f32::INFINITY, |r| r.loss),
                final_val_loss: last.map_or(f32::INFINITY, |r| r.val_loss),
                best_val_loss: state.best_val_loss,
                best_epoch: state.best_epoch,
                stopped_early: state.stopped_early,
                history: state.history,
                duration_ms,
                error: None,
            };
            info!(
                run_id = %result.run_id,
                epochs = result.epochs_run,
                final_loss = result.final_loss,
                best_val_loss = result.best_val_loss,
                best_epoch = result.best_epoch,
                stopped_early = result.stopped_early,
                duration_ms,
                "Training finished"
            );
            result
        }
        Err(e) => {
            warn!(run_id = %state.run_id, "Training failed after {} epochs: {e}", state.history.len());
            TrainingResult {
                run_id: state.run_id,
                success: false,
                epochs_run: state.history.len(),
                final_loss: f32::INFINITY,
                final_val_loss: f32::INFINITY,
                best_val_loss: f32::INFINITY,
                best_epoch: state.best_epoch,
                stopped_early: false,
                history: state.history,
                duration_ms,
                error: Some(e.to_string()),
            }
        }
    }
}

fn run_epochs(
    model: &mut ReadinessNetwork,
    train: &ProcessedData,
    validation: Option<&ProcessedData>,
    config: &TrainingConfig,
    state: &mut RunState,
) -> Result<(), TrainingError> {
    if config.epochs == 0 {
        return Err(TrainingError::NoEpochs);
    }
    if train.is_empty() {
        return Err(TrainingError::EmptyTrainingSet);
    }
    if !model.is_compiled() {
        return Err(ModelError::NotCompiled.into());
    }
    if train.metadata.input_dimensions != model.input_dims() {
        return Err(ModelError::DimensionMismatch {
            expected: model.input_dims(),
            found: train.metadata.input_dimensions,
        }
        .into());
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    for epoch in 1..=config.epochs {
        state.enter(Phase::TrainBatches, epoch);
        let shuffled;
        let epoch_data = if config.shuffle {
            shuffled = shuffle_rows(train, &mut rng);
            &shuffled
        } else {
            train
        };
        for (i, batch) in create_batches(epoch_data, config.batch_size)?.iter().enumerate() {
            let step = model.train_on_batch(batch.features, batch.labels)?;
            if config.verbosity >= 2 {
                debug!(epoch, batch = i + 1, size = batch.size(), loss = step.loss, mae = step.mae, "Batch");
            }
        }

        state.enter(Phase::EvalTrain, epoch);
        let train_eval = evaluate_finite(model, train)?;

        state.enter(Phase::EvalVal, epoch);
        let val_eval = match validation {
            Some(v) => evaluate_finite(model, v)?,
            None => train_eval,
        };

        let record = EpochRecord {
            epoch,
            loss: train_eval.loss,
            mae: train_eval.mae,
            val_loss: val_eval.loss,
            val_mae: val_eval.mae,
        };
        state.history.push(record);
        if config.verbosity >= 1 {
            info!(
                "Epoch {epoch}/{}: loss={:.4} mae={:.4} val_loss={:.4} val_mae={:.4}",
                config.epochs, record.loss, record.mae, record.val_loss, record.val_mae
            );
        } else {
            debug!(epoch, loss = record.loss, val_loss = record.val_loss, "Epoch complete");
        }

        state.enter(Phase::CheckEarlyStop, epoch);
        if state.observe(epoch, val_eval.loss, config) {
            info!(
                "Early stopping at epoch {epoch}: no improvement for {} epochs (best {:.4} at epoch {})",
                state.wait, state.best_val_loss, state.best_epoch
            );
            state.stopped_early = true;
            break;
        }
    }
    Ok(())
}

fn evaluate_finite(model: &ReadinessNetwork, data: &ProcessedData) -> Result<Evaluation, TrainingError> {
    let eval = model.evaluate(data.inputs.view(), data.outputs.view())?;
    if !eval.loss.is_finite() {
        return Err(ModelError::NonFiniteLoss(eval.loss).into());
    }
    Ok(eval)
}
