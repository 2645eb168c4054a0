use std::sync::Arc;

use crate::config::Config;
use crate::features::FeatureEncoder;
use crate::inference::ModelService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Owns the cached model; trains on first use when nothing was warm-loaded.
    pub service: Arc<ModelService>,
    /// Request-time encoder. Default: VocabularyEncoder. Swap via FEATURE_ENCODER env.
    pub encoder: Arc<dyn FeatureEncoder>,
}
