//! Named checkpoint persistence.
//!
//! A `Checkpoint` is the JSON form of a trained model: network parameters,
//! the normalization stats it was trained with, and enough metadata to rebuild
//! the held-out split. Stores are pluggable behind `ModelStore`; the service
//! carries one as `Option<Arc<dyn ModelStore>>` and runs in-memory only when
//! none is configured.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::data::stats::NormalizationStats;
use crate::model::loss::LossKind;
use crate::model::network::ReadinessNetwork;
use crate::training::evaluator::TestMetrics;
use crate::training::trainer::TrainingResult;

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("invalid model name '{0}'")]
    InvalidName(String),

    #[error("checkpoint format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub format_version: u32,
    pub model_name: String,
    pub saved_at: DateTime<Utc>,
    pub input_dims: usize,
    pub loss_kind: LossKind,
    /// Seed of the train/validation/test permutation.
    pub split_seed: u64,
    /// Rows in the dataset the permutation was drawn over.
    #[serde(default)]
    pub dataset_rows: Option<usize>,
    pub stats: NormalizationStats,
    pub network: ReadinessNetwork,
    #[serde(default)]
    pub training: Option<TrainingResult>,
    #[serde(default)]
    pub test_metrics: Option<TestMetrics>,
}

impl Checkpoint {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a checkpoint and checks that the stats and every layer agree on
    /// shape, so a loaded model can never index out of bounds.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        let checkpoint: Checkpoint = serde_json::from_slice(bytes)?;
        if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: checkpoint.format_version,
                expected: CHECKPOINT_FORMAT_VERSION,
            });
        }
        let stats_width = checkpoint
            .stats
            .validate()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if checkpoint.network.input_dims() != checkpoint.input_dims
            || stats_width != checkpoint.input_dims
        {
            return Err(StoreError::Corrupt(format!(
                "declared {} input dims, network has {}, stats cover {}",
                checkpoint.input_dims,
                checkpoint.network.input_dims(),
                stats_width
            )));
        }
        checkpoint
            .network
            .check_layer_shapes()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(checkpoint)
    }
}

/// Persistence backend for checkpoints, keyed by model name.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// `Ok(None)` when no checkpoint exists under `name`.
    async fn load(&self, name: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FileModelStore
// ────────────────────────────────────────────────────────────────────────────

/// Stores `<dir>/<name>.json`. Writes go to a temp file first, then rename.
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl ModelStore for FileModelStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        validate_name(&checkpoint.model_name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let path = self.path_for(&checkpoint.model_name);
        let tmp = path.with_extension("json.tmp");
        let bytes = checkpoint.to_json_bytes()?;
        tokio::fs::write(&tmp, &bytes).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error(&path))?;

        info!(
            "Saved checkpoint '{}' to {} ({} bytes)",
            checkpoint.model_name,
            path.display(),
            bytes.len()
        );
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Checkpoint>, StoreError> {
        validate_name(name)?;
        let path = self.path_for(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        Ok(Some(Checkpoint::from_json_slice(&bytes)?))
    }

    fn describe(&self) -> String {
        format!("file://{}", self.dir.display())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// S3ModelStore
// ────────────────────────────────────────────────────────────────────────────

/// Stores `s3://<bucket>/<prefix><name>.json`. Works against MinIO too.
pub struct S3ModelStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3ModelStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: "models/".to_string(),
        }
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}{name}.json", self.prefix)
    }
}

#[async_trait]
impl ModelStore for S3ModelStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        validate_name(&checkpoint.model_name)?;
        let key = self.key_for(&checkpoint.model_name);
        let bytes = checkpoint.to_json_bytes()?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StoreError::S3(format!("upload failed: {e}")))?;

        info!("Uploaded checkpoint to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Checkpoint>, StoreError> {
        validate_name(name)?;
        let key = self.key_for(name);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StoreError::S3(format!("download failed: {service_error}")));
            }
        };

        let body: Bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::S3(format!("reading body failed: {e}")))?
            .into_bytes();
        Ok(Some(Checkpoint::from_json_slice(&body)?))
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}
