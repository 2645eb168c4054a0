use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::features::{JobPosting, ResumeProfile};
use crate::inference::diagnostics::{DataStatsReport, DiagnosticReport};
use crate::inference::{ModelStats, PredictionSummary, SaveReceipt, TrainSummary};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub resume: ResumeProfile,
    pub job: JobPosting,
}

impl PredictRequest {
    fn validate(&self) -> Result<(), AppError> {
        let years = [
            ("resume.years_of_experience", self.resume.years_of_experience),
            ("job.required_experience_years", self.job.required_experience_years),
        ];
        for (field, value) in years {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Validation(format!(
                    "{field} must be a non-negative number"
                )));
            }
        }
        if self.job.required_skills.is_empty() {
            return Err(AppError::Validation(
                "job.required_skills must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// POST /api/v1/predict
pub async fn handle_predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictionSummary>, AppError> {
    req.validate()?;
    let summary = state
        .service
        .predict(&req.resume, &req.job, state.encoder.as_ref())
        .await?;
    Ok(Json(summary))
}

/// POST /api/v1/model/train
/// Always trains from scratch and replaces the cached model.
pub async fn handle_train(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TrainSummary>), AppError> {
    let model = state.service.retrain().await?;
    Ok((
        StatusCode::CREATED,
        Json(TrainSummary {
            model_name: model.name.clone(),
            training: model.training.clone(),
            test_metrics: model.test_metrics,
            size: model.network.model_size(),
        }),
    ))
}

/// GET /api/v1/model/stats
pub async fn handle_model_stats(
    State(state): State<AppState>,
) -> Result<Json<ModelStats>, AppError> {
    Ok(Json(state.service.model_stats().await?))
}

/// GET /api/v1/model/diagnostic
pub async fn handle_diagnostic(
    State(state): State<AppState>,
) -> Result<Json<DiagnosticReport>, AppError> {
    Ok(Json(state.service.diagnostics().await?))
}

/// POST /api/v1/model/save
pub async fn handle_save(State(state): State<AppState>) -> Result<Json<SaveReceipt>, AppError> {
    Ok(Json(state.service.save().await?))
}

/// GET /api/v1/debug/data-stats
pub async fn handle_data_stats(
    State(state): State<AppState>,
) -> Result<Json<DataStatsReport>, AppError> {
    Ok(Json(state.service.data_stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(years: f32, required: Vec<&str>) -> PredictRequest {
        PredictRequest {
            resume: ResumeProfile {
                skills: vec!["Rust".into()],
                years_of_experience: years,
                ..ResumeProfile::default()
            },
            job: JobPosting {
                required_skills: required.into_iter().map(String::from).collect(),
                ..JobPosting::default()
            },
        }
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        assert!(request(3.0, vec!["Rust"]).validate().is_ok());
        assert!(matches!(
            request(-1.0, vec!["Rust"]).validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            request(f32::NAN, vec!["Rust"]).validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            request(2.0, vec![]).validate(),
            Err(AppError::Validation(_))
        ));
    }
}
