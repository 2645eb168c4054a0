// Model service: owns the trained model for the life of the process.
// Cold callers share one training run, which executes in a detached task so a
// caller that disconnects never cancels it. Warm starts come from the
// configured `ModelStore`. CPU-bound work runs inside tokio::task::spawn_blocking.

pub mod diagnostics;
pub mod handlers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::data::loader::load_training_data;
use crate::data::preprocess::{preprocess_data, split_data, DataSplit, ProcessedData, SplitRatios, TrainingExample};
use crate::data::stats::{get_dataset_stats, normalize_data, NormalizationStats};
use crate::data::DataError;
use crate::errors::AppError;
use crate::features::extractor::{estimate_weeks_to_learn, match_skills, SkillMatch};
use crate::features::vocabulary::default_vocabulary;
use crate::features::{FeatureEncoder, JobPosting, ResumeProfile};
use crate::inference::diagnostics::{diagnose_heads, summarize_dataset, DataStatsReport, DiagnosticReport};
use crate::model::network::{build_model, CompileOptions, ModelSize, ReadinessNetwork};
use crate::model::store::{Checkpoint, ModelStore, CHECKPOINT_FORMAT_VERSION};
use crate::training::evaluator::{
    denormalize_predictions, evaluate_model, format_prediction, predict, predict_single,
    readiness_band, PredictionOutput, TestMetrics,
};
use crate::training::trainer::{train_model, TrainingConfig, TrainingResult};

/// Missing skills listed in a prediction's learning timeline.
const TIMELINE_LIMIT: usize = 5;

// ────────────────────────────────────────────────────────────────────────────
// TrainedModel
// ────────────────────────────────────────────────────────────────────────────

/// A compiled network together with everything needed to serve it.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub name: String,
    pub network: ReadinessNetwork,
    /// Computed on the train split only.
    pub stats: NormalizationStats,
    pub split_seed: u64,
    /// Rows in the dataset the split was drawn from.
    pub dataset_rows: Option<usize>,
    pub compile: CompileOptions,
    pub training: Option<TrainingResult>,
    pub test_metrics: Option<TestMetrics>,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            format_version: CHECKPOINT_FORMAT_VERSION,
            model_name: self.name.clone(),
            saved_at: Utc::now(),
            input_dims: self.network.input_dims(),
            loss_kind: self.compile.loss,
            split_seed: self.split_seed,
            dataset_rows: self.dataset_rows,
            stats: self.stats.clone(),
            network: self.network.clone(),
            training: self.training.clone(),
            test_metrics: self.test_metrics,
        }
    }

    /// Restores a checkpoint and recompiles it with its recorded loss so it
    /// can be evaluated again.
    pub fn from_checkpoint(checkpoint: Checkpoint, learning_rate: f32) -> Self {
        let compile = CompileOptions {
            learning_rate,
            loss: checkpoint.loss_kind,
        };
        let mut network = checkpoint.network;
        network.compile(compile);
        Self {
            name: checkpoint.model_name,
            network,
            stats: checkpoint.stats,
            split_seed: checkpoint.split_seed,
            dataset_rows: checkpoint.dataset_rows,
            compile,
            training: checkpoint.training,
            test_metrics: checkpoint.test_metrics,
            trained_at: checkpoint.saved_at,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn for_weeks(weeks: u32) -> Self {
        match weeks {
            0..=2 => Priority::Low,
            3..=4 => Priority::Medium,
            _ => Priority::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineItem {
    pub skill: String,
    pub weeks: u32,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    #[serde(flatten)]
    pub prediction: PredictionOutput,
    pub interpretation: &'static str,
    pub skills: SkillMatch,
    pub timeline: Vec<TimelineItem>,
    pub encoder: &'static str,
    pub model_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub model_name: String,
    pub trained_at: DateTime<Utc>,
    pub input_dims: usize,
    pub loss: &'static str,
    pub layers: Vec<&'static str>,
    pub size: ModelSize,
    pub training: Option<TrainingResult>,
    pub test_metrics: Option<TestMetrics>,
    pub training_runs: usize,
    pub store: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainSummary {
    pub model_name: String,
    pub training: Option<TrainingResult>,
    pub test_metrics: Option<TestMetrics>,
    pub size: ModelSize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    pub model_name: String,
    pub location: String,
}

// ────────────────────────────────────────────────────────────────────────────
// ModelService
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// File path or URL handed to `load_training_data`.
    pub data_source: String,
    pub model_name: String,
    pub training: TrainingConfig,
    pub split_ratios: SplitRatios,
    pub compile: CompileOptions,
    /// Seeds the split and weight init. Random when unset.
    pub seed: Option<u64>,
}

type ModelSlot = Arc<Mutex<Option<Arc<TrainedModel>>>>;

/// Everything a training run needs, owned so it can move into a spawned task.
#[derive(Clone)]
struct TrainingJob {
    config: ServiceConfig,
    store: Option<Arc<dyn ModelStore>>,
    runs: Arc<AtomicUsize>,
}

impl TrainingJob {
    async fn load_dataset(&self) -> Result<Vec<TrainingExample>, AppError> {
        let raw = load_training_data(&self.config.data_source).await;
        if raw.is_empty() {
            return Err(AppError::EmptyDataset(self.config.data_source.clone()));
        }
        Ok(raw)
    }

    async fn run(&self) -> Result<Arc<TrainedModel>, AppError> {
        let raw = self.load_dataset().await?;
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Training run #{run} on {} examples", raw.len());

        let config = self.config.clone();
        let model = tokio::task::spawn_blocking(move || fit(&raw, &config))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in training: {e}")))??;
        let model = Arc::new(model);

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&model.to_checkpoint()).await {
                warn!("Trained model could not be saved to {}: {e}", store.describe());
            }
        }
        Ok(model)
    }
}

pub struct ModelService {
    job: TrainingJob,
    cached: ModelSlot,
}

impl ModelService {
    pub fn new(config: ServiceConfig, store: Option<Arc<dyn ModelStore>>) -> Self {
        Self {
            job: TrainingJob {
                config,
                store,
                runs: Arc::new(AtomicUsize::new(0)),
            },
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Training runs started by this service since construction.
    pub fn training_runs(&self) -> usize {
        self.job.runs.load(Ordering::SeqCst)
    }

    /// Returns the cached model, training one first if needed. Concurrent
    /// callers wait on the slot lock for a single run.
    pub async fn get_or_train(&self) -> Result<Arc<TrainedModel>, AppError> {
        let cached = self.cached.lock().await.clone();
        if let Some(model) = cached {
            return Ok(model);
        }
        self.build_detached(false).await
    }

    /// Trains a new model and replaces the cached one. The previous model stays
    /// in place if the run fails.
    pub async fn retrain(&self) -> Result<Arc<TrainedModel>, AppError> {
        self.build_detached(true).await
    }

    /// Runs the build in its own task holding the slot lock until the cache is
    /// filled. Dropping the returned future abandons only the wait.
    async fn build_detached(&self, replace: bool) -> Result<Arc<TrainedModel>, AppError> {
        let slot = Arc::clone(&self.cached);
        let job = self.job.clone();
        tokio::spawn(async move {
            let mut slot = slot.lock().await;
            if let (false, Some(model)) = (replace, slot.as_ref()) {
                return Ok(Arc::clone(model));
            }
            let model = job.run().await?;
            *slot = Some(Arc::clone(&model));
            Ok(model)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("model build task failed: {e}")))?
    }

    /// Loads the named checkpoint from the store into the cache. `Ok(false)`
    /// when no store is configured or nothing has been saved yet.
    pub async fn warm_load(&self) -> Result<bool, AppError> {
        let Some(store) = &self.job.store else {
            return Ok(false);
        };
        let Some(checkpoint) = store.load(&self.job.config.model_name).await? else {
            info!(
                "No checkpoint '{}' in {}; the first request will train",
                self.job.config.model_name,
                store.describe()
            );
            return Ok(false);
        };

        let model = TrainedModel::from_checkpoint(checkpoint, self.job.config.compile.learning_rate);
        info!(
            "Warm-loaded model '{}' ({} input dims) from {}",
            model.name,
            model.network.input_dims(),
            store.describe()
        );
        *self.cached.lock().await = Some(Arc::new(model));
        Ok(true)
    }

    /// Persists the cached model.
    pub async fn save(&self) -> Result<SaveReceipt, AppError> {
        let store = self
            .job
            .store
            .as_ref()
            .ok_or_else(|| AppError::Validation("no model store is configured".to_string()))?;
        let model = self
            .cached
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::NotFound("no trained model in memory".to_string()))?;

        store.save(&model.to_checkpoint()).await?;
        Ok(SaveReceipt {
            model_name: model.name.clone(),
            location: store.describe(),
        })
    }

    pub async fn predict(
        &self,
        resume: &ResumeProfile,
        job: &JobPosting,
        encoder: &dyn FeatureEncoder,
    ) -> Result<PredictionSummary, AppError> {
        let model = self.get_or_train().await?;
        summarize_prediction(&model, resume, job, encoder)
    }

    pub async fn model_stats(&self) -> Result<ModelStats, AppError> {
        let model = self.get_or_train().await?;
        Ok(ModelStats {
            model_name: model.name.clone(),
            trained_at: model.trained_at,
            input_dims: model.network.input_dims(),
            loss: model.compile.loss.name(),
            layers: model.network.layer_kinds(),
            size: model.network.model_size(),
            training: model.training.clone(),
            test_metrics: model.test_metrics,
            training_runs: self.training_runs(),
            store: self.job.store.as_ref().map(|s| s.describe()),
        })
    }

    /// Re-creates the held-out test split from the model's split seed and
    /// reports per-head quality on it.
    pub async fn diagnostics(&self) -> Result<DiagnosticReport, AppError> {
        let model = self.get_or_train().await?;
        let raw = self.job.load_dataset().await?;
        let ratios = self.job.config.split_ratios;

        tokio::task::spawn_blocking(move || diagnose_model(&raw, &model, ratios))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in diagnostics: {e}")))?
    }

    pub async fn data_stats(&self) -> Result<DataStatsReport, AppError> {
        let raw = self.job.load_dataset().await?;
        let processed = preprocess_data(&raw)?;
        Ok(summarize_dataset(&self.job.config.data_source, &raw, &processed))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Synchronous pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Shuffles with `seed` and splits by `ratios`. Same seed and data, same split.
fn seeded_split(data: &ProcessedData, ratios: SplitRatios, seed: u64) -> Result<DataSplit, DataError> {
    let mut rng = StdRng::seed_from_u64(seed);
    split_data(data, ratios, &mut rng)
}

/// preprocess → split → train-split stats → normalize → build → compile →
/// train → evaluate on test.
pub fn fit(raw: &[TrainingExample], config: &ServiceConfig) -> Result<TrainedModel, AppError> {
    let processed = preprocess_data(raw)?;
    if processed.is_empty() {
        return Err(AppError::EmptyDataset(config.data_source.clone()));
    }

    let split_seed = config.seed.unwrap_or_else(rand::random);
    let split = seeded_split(&processed, config.split_ratios, split_seed)?;
    let stats = get_dataset_stats(&split.train).input_stats;
    let train = normalize_data(&split.train, Some(&stats))?;
    let validation = normalize_data(&split.validation, Some(&stats))?;
    let test = normalize_data(&split.test, Some(&stats))?;
    info!(
        "Split {} examples into {}/{}/{} (seed {split_seed})",
        processed.len(),
        train.len(),
        validation.len(),
        test.len()
    );

    let mut network = build_model(processed.metadata.input_dimensions, config.seed)?;
    network.compile(config.compile);

    let result = train_model(&mut network, &train, Some(&validation), &config.training);
    if !result.success {
        return Err(AppError::Training(
            result
                .error
                .unwrap_or_else(|| "training did not complete".to_string()),
        ));
    }

    let test_metrics = if test.is_empty() {
        warn!("Test split is empty; skipping holdout evaluation");
        None
    } else {
        let metrics = evaluate_model(&network, &test)?;
        info!(
            "Test loss {:.6}, MSE {:.6}, MAE {:.6}",
            metrics.test_loss, metrics.test_mse, metrics.test_mae
        );
        Some(metrics)
    };

    Ok(TrainedModel {
        name: config.model_name.clone(),
        network,
        stats,
        split_seed,
        dataset_rows: Some(processed.len()),
        compile: config.compile,
        training: Some(result),
        test_metrics,
        trained_at: Utc::now(),
    })
}

fn diagnose_model(
    raw: &[TrainingExample],
    model: &TrainedModel,
    ratios: SplitRatios,
) -> Result<DiagnosticReport, AppError> {
    let processed = preprocess_data(raw)?;
    let expected = model.network.input_dims();
    if processed.metadata.input_dimensions != expected {
        return Err(AppError::DimensionMismatch {
            expected,
            found: processed.metadata.input_dimensions,
        });
    }

    let current_rows = processed.len();
    let holdout_verified = model.dataset_rows == Some(current_rows);
    if !holdout_verified {
        warn!(
            "Dataset has {current_rows} rows but model '{}' was trained on {:?}; \
             the rebuilt test split may overlap its training rows",
            model.name, model.dataset_rows
        );
    }

    let split = seeded_split(&processed, ratios, model.split_seed)?;
    let test = normalize_data(&split.test, Some(&model.stats))?;

    let (heads, test_metrics) = if test.is_empty() {
        (diagnose_heads(test.outputs.view(), test.outputs.view())?, None)
    } else {
        let predicted = predict(&model.network, test.inputs.view())?;
        (
            diagnose_heads(predicted.view(), test.outputs.view())?,
            Some(evaluate_model(&model.network, &test)?),
        )
    };

    Ok(DiagnosticReport {
        model_name: model.name.clone(),
        trained_on_rows: model.dataset_rows,
        current_rows,
        holdout_verified,
        test_examples: test.len(),
        test_metrics,
        heads,
    })
}

/// encode → width check → normalize → infer → denormalize → format.
pub fn summarize_prediction(
    model: &TrainedModel,
    resume: &ResumeProfile,
    job: &JobPosting,
    encoder: &dyn FeatureEncoder,
) -> Result<PredictionSummary, AppError> {
    let expected = model.network.input_dims();
    let features = encoder.encode(resume, job);
    if encoder.input_dims() != expected || features.len() != expected {
        return Err(AppError::DimensionMismatch {
            expected,
            found: features.len(),
        });
    }

    let normalized = model.stats.normalize_row(&features)?;
    let raw = predict_single(&model.network, &normalized)?;
    let denormalized = denormalize_predictions(&raw);
    let score = denormalized.readiness_score.clamp(0.0, 100.0) as u32;
    let (interpretation, confidence) = readiness_band(score);

    let skills = match_skills(
        resume.skills.as_slice(),
        job.required_skills.as_slice(),
        default_vocabulary(),
    );
    let mut timeline: Vec<TimelineItem> = skills
        .missing
        .iter()
        .map(|skill| {
            let weeks = estimate_weeks_to_learn(skill);
            TimelineItem {
                skill: skill.clone(),
                weeks,
                priority: Priority::for_weeks(weeks),
            }
        })
        .collect();
    timeline.sort_by(|a, b| b.weeks.cmp(&a.weeks));
    timeline.truncate(TIMELINE_LIMIT);

    Ok(PredictionSummary {
        prediction: format_prediction(&denormalized, confidence),
        interpretation,
        skills,
        timeline,
        encoder: encoder.name(),
        model_name: model.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocess::tests::synthetic_examples;
    use crate::features::compact::{CompactRequestEncoder, COMPACT_DIMS};
    use crate::features::extractor::SCALAR_FEATURE_COUNT;
    use crate::features::VocabularyEncoder;
    use crate::model::store::FileModelStore;

    fn vocabulary_dims() -> usize {
        SCALAR_FEATURE_COUNT + 2 * default_vocabulary().len()
    }

    fn write_dataset(dir: &std::path::Path, examples: &[TrainingExample]) -> String {
        let path = dir.join("training_data.json");
        std::fs::write(&path, serde_json::to_vec(examples).unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn test_config(data_source: String) -> ServiceConfig {
        ServiceConfig {
            data_source,
            model_name: "readiness-test".to_string(),
            training: TrainingConfig {
                epochs: 3,
                batch_size: 8,
                verbosity: 0,
                seed: Some(11),
                ..TrainingConfig::default()
            },
            split_ratios: SplitRatios::default(),
            compile: CompileOptions::default(),
            seed: Some(11),
        }
    }

    fn service_with_data(dir: &std::path::Path, store: Option<Arc<dyn ModelStore>>) -> ModelService {
        let examples = synthetic_examples(40, default_vocabulary().len());
        let source = write_dataset(dir, &examples);
        ModelService::new(test_config(source), store)
    }

    fn sample_request() -> (ResumeProfile, JobPosting) {
        let resume = ResumeProfile {
            skills: vec!["Rust".into(), "Docker".into(), "PostgreSQL".into()],
            years_of_experience: 4.0,
            education: "Bachelor".into(),
            seniority: "mid".into(),
            job_titles: vec!["Backend Engineer".into()],
        };
        let job = JobPosting {
            title: "Platform Engineer".into(),
            required_skills: vec![
                "Rust".into(),
                "Kubernetes".into(),
                "Terraform".into(),
                "AWS".into(),
                "Git".into(),
                "React".into(),
                "Kafka".into(),
            ],
            required_experience_years: 5.0,
            seniority: "senior".into(),
            description: String::new(),
        };
        (resume, job)
    }

    #[tokio::test]
    async fn test_concurrent_cold_callers_share_one_training_run() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(service_with_data(dir.path(), None));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.get_or_train().await })
            })
            .collect();

        let mut models = Vec::new();
        for handle in handles {
            models.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(service.training_runs(), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(models[0].network.input_dims(), vocabulary_dims());
    }

    #[tokio::test]
    async fn test_abandoned_cold_caller_does_not_restart_training() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(service_with_data(dir.path(), None));

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.get_or_train().await })
        };
        for _ in 0..1000 {
            if service.training_runs() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        // the first caller goes away while its build is in flight
        first.abort();
        assert_eq!(service.training_runs(), 1);

        let model = service.get_or_train().await.unwrap();
        assert_eq!(service.training_runs(), 1);
        assert_eq!(model.network.input_dims(), vocabulary_dims());
        assert!(Arc::ptr_eq(&model, &service.get_or_train().await.unwrap()));
    }

    #[tokio::test]
    async fn test_zero_epochs_is_a_training_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_dataset(dir.path(), &synthetic_examples(20, 4));
        let mut config = test_config(source);
        config.training.epochs = 0;
        let service = ModelService::new(config, None);

        match service.get_or_train().await {
            Err(AppError::Training(message)) => assert!(message.contains("epochs"), "{message}"),
            other => panic!("expected a training error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_dataset_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_dataset(dir.path(), &[]);
        let service = ModelService::new(test_config(source), None);
        assert!(matches!(
            service.get_or_train().await,
            Err(AppError::EmptyDataset(_))
        ));
        assert_eq!(service.training_runs(), 0);
    }

    #[tokio::test]
    async fn test_compact_encoder_against_vocabulary_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_data(dir.path(), None);
        let (resume, job) = sample_request();

        let err = service
            .predict(&resume, &job, &CompactRequestEncoder)
            .await
            .unwrap_err();
        match err {
            AppError::DimensionMismatch { expected, found } => {
                assert_eq!(expected, vocabulary_dims());
                assert_eq!(found, COMPACT_DIMS);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vocabulary_prediction_summary() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_data(dir.path(), None);
        let (resume, job) = sample_request();

        let summary = service
            .predict(&resume, &job, &VocabularyEncoder::default())
            .await
            .unwrap();
        assert!(summary.prediction.readiness_score <= 100);
        assert!((0.6..=0.95).contains(&summary.prediction.confidence));
        assert_eq!(summary.encoder, "vocabulary");
        assert_eq!(summary.skills.matched, vec!["Rust".to_string()]);
        assert_eq!(summary.skills.missing.len(), 6);
        assert_eq!(summary.timeline.len(), 5);
        assert!(summary.timeline.windows(2).all(|w| w[0].weeks >= w[1].weeks));
        assert_eq!(summary.timeline[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_trained_model_is_saved_and_warm_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ModelStore> = Arc::new(FileModelStore::new(dir.path().join("models")));

        let first = service_with_data(dir.path(), Some(Arc::clone(&store)));
        let trained = first.get_or_train().await.unwrap();
        assert!(dir.path().join("models/readiness-test.json").exists());

        let second = service_with_data(dir.path(), Some(store));
        assert!(second.warm_load().await.unwrap());
        let loaded = second.get_or_train().await.unwrap();
        assert_eq!(second.training_runs(), 0);
        assert_eq!(loaded.split_seed, trained.split_seed);
        assert_eq!(loaded.stats, trained.stats);

        let (resume, job) = sample_request();
        let encoder = VocabularyEncoder::default();
        let a = summarize_prediction(&trained, &resume, &job, &encoder).unwrap();
        let b = summarize_prediction(&loaded, &resume, &job, &encoder).unwrap();
        assert_eq!(a.prediction, b.prediction);
    }

    #[tokio::test]
    async fn test_save_requires_store_and_model() {
        let dir = tempfile::tempdir().unwrap();
        let without_store = service_with_data(dir.path(), None);
        assert!(matches!(without_store.save().await, Err(AppError::Validation(_))));

        let store: Arc<dyn ModelStore> = Arc::new(FileModelStore::new(dir.path().join("models")));
        let cold = service_with_data(dir.path(), Some(store));
        assert!(matches!(cold.save().await, Err(AppError::NotFound(_))));
        assert!(!cold.warm_load().await.unwrap());
    }

    #[tokio::test]
    async fn test_retrain_replaces_cached_model() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_data(dir.path(), None);
        let first = service.get_or_train().await.unwrap();
        let second = service.retrain().await.unwrap();
        assert_eq!(service.training_runs(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &service.get_or_train().await.unwrap()));
    }

    #[tokio::test]
    async fn test_diagnostics_rebuild_the_test_split() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_data(dir.path(), None);
        let report = service.diagnostics().await.unwrap();
        // 40 rows at 0.7/0.15: 28 train, 6 validation, 6 test
        assert_eq!(report.test_examples, 6);
        assert!(report.holdout_verified);
        assert_eq!(report.trained_on_rows, Some(40));
        assert_eq!(report.heads.len(), 4);
        assert!(report.heads.iter().all(|h| h.predictions.len() == 6));

        let model = service.get_or_train().await.unwrap();
        let recorded = model.test_metrics.unwrap();
        let rebuilt = report.test_metrics.unwrap();
        assert!((recorded.test_loss - rebuilt.test_loss).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_diagnostics_flag_a_changed_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_data(dir.path(), None);
        service.get_or_train().await.unwrap();

        // the training file grows after the model was fitted
        write_dataset(dir.path(), &synthetic_examples(50, default_vocabulary().len()));
        let report = service.diagnostics().await.unwrap();
        assert!(!report.holdout_verified);
        assert_eq!(report.trained_on_rows, Some(40));
        assert_eq!(report.current_rows, 50);
        assert_eq!(service.training_runs(), 1);
    }

    #[tokio::test]
    async fn test_data_stats_report() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_data(dir.path(), None);
        let report = service.data_stats().await.unwrap();
        assert_eq!(report.metadata.total_examples, 40);
        assert_eq!(report.metadata.input_dimensions, vocabulary_dims());
        assert_eq!(service.training_runs(), 0);
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(Priority::for_weeks(2), Priority::Low);
        assert_eq!(Priority::for_weeks(4), Priority::Medium);
        assert_eq!(Priority::for_weeks(8), Priority::High);
    }
}
