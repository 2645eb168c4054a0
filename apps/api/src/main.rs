mod config;
mod data;
mod errors;
mod features;
mod inference;
mod model;
mod routes;
mod state;
mod training;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::{Config, EncoderKind, S3StoreConfig};
use crate::data::preprocess::SplitRatios;
use crate::features::compact::CompactRequestEncoder;
use crate::features::{FeatureEncoder, VocabularyEncoder};
use crate::inference::{ModelService, ServiceConfig};
use crate::model::network::CompileOptions;
use crate::model::store::{FileModelStore, ModelStore, S3ModelStore};
use crate::routes::build_router;
use crate::state::AppState;
use crate::training::trainer::TrainingConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Readiness API v{}", env!("CARGO_PKG_VERSION"));

    // Checkpoint store: S3 wins over a local directory; neither means in-memory only
    let store: Option<Arc<dyn ModelStore>> = match (&config.s3_store, &config.model_store_dir) {
        (Some(s3), _) => {
            let client = build_s3_client(s3).await;
            Some(Arc::new(S3ModelStore::new(client, s3.bucket.clone())))
        }
        (None, Some(dir)) => Some(Arc::new(FileModelStore::new(dir))),
        (None, None) => None,
    };
    match &store {
        Some(store) => info!("Model store: {}", store.describe()),
        None => info!("No model store configured; models live in memory only"),
    }

    // Request-time encoder (VocabularyEncoder by default; swap via FEATURE_ENCODER)
    let encoder: Arc<dyn FeatureEncoder> = match config.feature_encoder {
        EncoderKind::Vocabulary => Arc::new(VocabularyEncoder::default()),
        EncoderKind::Compact => Arc::new(CompactRequestEncoder),
    };
    info!(
        "Feature encoder: {} ({} dims)",
        encoder.name(),
        encoder.input_dims()
    );

    let service = Arc::new(ModelService::new(service_config(&config), store));
    match service.warm_load().await {
        Ok(true) => {}
        Ok(false) => info!("Model will be trained on first use"),
        Err(e) => warn!("Warm load failed, model will be trained on first use: {e}"),
    }

    // Build app state
    let state = AppState {
        config: config.clone(),
        service,
        encoder,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn service_config(config: &Config) -> ServiceConfig {
    ServiceConfig {
        data_source: config.training_data_path.clone(),
        model_name: config.model_name.clone(),
        training: TrainingConfig {
            epochs: config.train_epochs,
            batch_size: config.train_batch_size,
            early_stopping_patience: config.early_stopping_patience,
            seed: config.random_seed,
            ..TrainingConfig::default()
        },
        split_ratios: SplitRatios::default(),
        compile: CompileOptions::default(),
        seed: config.random_seed,
    }
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &S3StoreConfig) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "readiness-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
