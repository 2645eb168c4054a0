pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::inference::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/predict", post(handlers::handle_predict))
        // Model lifecycle
        .route("/api/v1/model/train", post(handlers::handle_train))
        .route("/api/v1/model/stats", get(handlers::handle_model_stats))
        .route("/api/v1/model/diagnostic", get(handlers::handle_diagnostic))
        .route("/api/v1/model/save", post(handlers::handle_save))
        // Debug
        .route("/api/v1/debug/data-stats", get(handlers::handle_data_stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, EncoderKind};
    use crate::data::preprocess::SplitRatios;
    use crate::features::compact::CompactRequestEncoder;
    use crate::features::FeatureEncoder;
    use crate::inference::{ModelService, ServiceConfig};
    use crate::model::network::CompileOptions;
    use crate::training::trainer::TrainingConfig;

    fn test_state(data_source: String, encoder: Arc<dyn FeatureEncoder>) -> AppState {
        let config = Config {
            port: 0,
            rust_log: "info".into(),
            training_data_path: data_source.clone(),
            train_epochs: 2,
            train_batch_size: 8,
            early_stopping_patience: 10,
            random_seed: Some(3),
            feature_encoder: EncoderKind::Compact,
            model_name: "router-test".into(),
            model_store_dir: None,
            s3_store: None,
        };
        let service = ModelService::new(
            ServiceConfig {
                data_source,
                model_name: config.model_name.clone(),
                training: TrainingConfig {
                    epochs: 2,
                    batch_size: 8,
                    verbosity: 0,
                    seed: Some(3),
                    ..TrainingConfig::default()
                },
                split_ratios: SplitRatios::default(),
                compile: CompileOptions::default(),
                seed: Some(3),
            },
            None,
        );
        AppState {
            config,
            service: Arc::new(service),
            encoder,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state("unused.json".into(), Arc::new(CompactRequestEncoder)));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_dataset_surfaces_as_error_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();
        let app = build_router(test_state(
            path.to_string_lossy().into_owned(),
            Arc::new(CompactRequestEncoder),
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/model/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "EMPTY_DATASET");
    }

    #[tokio::test]
    async fn test_malformed_predict_body_is_rejected() {
        let app = build_router(test_state("unused.json".into(), Arc::new(CompactRequestEncoder)));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"resume": {}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
