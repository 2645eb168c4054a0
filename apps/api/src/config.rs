use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Which request-time encoder turns prediction requests into model inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Vocabulary,
    Compact,
}

impl FromStr for EncoderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vocabulary" => Ok(EncoderKind::Vocabulary),
            "compact" => Ok(EncoderKind::Compact),
            other => bail!("FEATURE_ENCODER must be 'vocabulary' or 'compact', got '{other}'"),
        }
    }
}

/// S3 / MinIO settings for the checkpoint store.
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Everything has a default except the S3 credentials, which are required
/// once `MODEL_STORE_S3_BUCKET` is set.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub training_data_path: String,
    pub train_epochs: usize,
    pub train_batch_size: usize,
    pub early_stopping_patience: usize,
    pub random_seed: Option<u64>,
    pub feature_encoder: EncoderKind,
    pub model_name: String,
    pub model_store_dir: Option<String>,
    pub s3_store: Option<S3StoreConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let s3_store = match optional_env("MODEL_STORE_S3_BUCKET") {
            Some(bucket) => Some(S3StoreConfig {
                bucket,
                endpoint: require_env("S3_ENDPOINT")?,
                aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        Ok(Config {
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            training_data_path: std::env::var("TRAINING_DATA_PATH")
                .unwrap_or_else(|_| "data/training_data.json".to_string()),
            train_epochs: parse_positive_env("TRAIN_EPOCHS", 50)?,
            train_batch_size: parse_positive_env("TRAIN_BATCH_SIZE", 32)?,
            early_stopping_patience: parse_env("EARLY_STOPPING_PATIENCE", 10)?,
            random_seed: optional_env("RANDOM_SEED")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("RANDOM_SEED must be an unsigned integer")?,
            feature_encoder: optional_env("FEATURE_ENCODER")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(EncoderKind::Vocabulary),
            model_name: std::env::var("MODEL_NAME").unwrap_or_else(|_| "readiness-model".to_string()),
            model_store_dir: optional_env("MODEL_STORE_DIR"),
            s3_store,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

/// Like `parse_env`, but zero is rejected.
fn parse_positive_env(key: &str, default: usize) -> Result<usize> {
    let value = parse_env(key, default)?;
    if value == 0 {
        bail!("Environment variable '{key}' must be at least 1");
    }
    Ok(value)
}
