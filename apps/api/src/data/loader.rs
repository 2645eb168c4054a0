//! Training data loader. Reads a JSON array of `TrainingExample` from disk and
//! falls back to an HTTP GET when the file cannot be read or parsed.
//!
//! Failure is not an error here: the loader logs and hands back an empty list.
//! Callers must check `is_empty()` before building anything from the result.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::data::preprocess::TrainingExample;

#[derive(Debug, Error)]
enum LoadError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Loads labeled examples from `source` (a file path, absolute or relative to
/// the working directory, or a URL). Returns an empty vector on any failure.
pub async fn load_training_data(source: &str) -> Vec<TrainingExample> {
    match read_from_file(source).await {
        Ok(examples) => {
            info!("Loaded {} training examples from {source}", examples.len());
            return examples;
        }
        Err(e) => warn!("File load failed ({e}); trying HTTP fetch of {source}"),
    }

    match fetch_from_url(source).await {
        Ok(examples) => {
            info!("Fetched {} training examples from {source}", examples.len());
            examples
        }
        Err(e) => {
            error!("Error loading training data from {source}: {e}");
            Vec::new()
        }
    }
}

async fn read_from_file(source: &str) -> Result<Vec<TrainingExample>, LoadError> {
    let path = resolve_path(source);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(serde_json::from_str(&content)?)
}

async fn fetch_from_url(source: &str) -> Result<Vec<TrainingExample>, LoadError> {
    let examples = reqwest::get(source)
        .await?
        .error_for_status()?
        .json::<Vec<TrainingExample>>()
        .await?;
    Ok(examples)
}

fn resolve_path(source: &str) -> PathBuf {
    let path = Path::new(source);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
