// Skill vocabulary, feature extraction and the encoders used at inference time.
// Every encoder sits behind `FeatureEncoder`; the model service checks
// `input_dims()` against the trained network before predicting.

pub mod compact;
pub mod extractor;
pub mod vocabulary;

use serde::{Deserialize, Serialize};

use crate::features::extractor::{
    encode_all_features, extract_job_features, extract_resume_features, SCALAR_FEATURE_COUNT,
};
use crate::features::vocabulary::{default_vocabulary, MatchPolicy, SkillVocabulary};

/// Structured resume data as supplied by the caller (parsing happens upstream).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeProfile {
    pub skills: Vec<String>,
    #[serde(default)]
    pub years_of_experience: f32,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub seniority: String,
    #[serde(default)]
    pub job_titles: Vec<String>,
}

/// Structured job posting as supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(default)]
    pub title: String,
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub required_experience_years: f32,
    #[serde(default)]
    pub seniority: String,
    #[serde(default)]
    pub description: String,
}

/// Turns a (resume, job) pair into one model input row.
///
/// Carried in `AppState` as `Arc<dyn FeatureEncoder>`.
pub trait FeatureEncoder: Send + Sync {
    /// Width of every vector returned by `encode`.
    fn input_dims(&self) -> usize;

    fn encode(&self, resume: &ResumeProfile, job: &JobPosting) -> Vec<f32>;

    /// Short label for logs and API responses.
    fn name(&self) -> &'static str;
}

// ────────────────────────────────────────────────────────────────────────────
// VocabularyEncoder: same layout as the training data
// ────────────────────────────────────────────────────────────────────────────

/// Encoder whose layout matches `preprocess_data`: D = 6 + 2V.
pub struct VocabularyEncoder {
    vocabulary: &'static SkillVocabulary,
    policy: MatchPolicy,
}

impl VocabularyEncoder {
    pub fn new(vocabulary: &'static SkillVocabulary, policy: MatchPolicy) -> Self {
        Self { vocabulary, policy }
    }
}

impl Default for VocabularyEncoder {
    fn default() -> Self {
        Self::new(default_vocabulary(), MatchPolicy::BoundaryAware)
    }
}

impl FeatureEncoder for VocabularyEncoder {
    fn input_dims(&self) -> usize {
        SCALAR_FEATURE_COUNT + 2 * self.vocabulary.len()
    }

    fn encode(&self, resume: &ResumeProfile, job: &JobPosting) -> Vec<f32> {
        let resume_features = extract_resume_features(
            resume.skills.as_slice(),
            resume.years_of_experience,
            &resume.education,
            resume.job_titles.clone(),
            self.vocabulary,
            self.policy,
        );
        let job_features = extract_job_features(
            job.required_skills.as_slice(),
            job.required_experience_years,
            &job.seniority,
            &job.title,
            self.vocabulary,
            self.policy,
        );
        encode_all_features(&resume_features, &job_features)
    }

    fn name(&self) -> &'static str {
        "vocabulary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_encoder_width_matches_declared_dims() {
        let encoder = VocabularyEncoder::default();
        let resume = ResumeProfile {
            skills: vec!["Rust".into(), "Docker".into()],
            years_of_experience: 4.0,
            education: "Master's".into(),
            ..Default::default()
        };
        let job = JobPosting {
            title: "Backend Engineer".into(),
            required_skills: vec!["Rust".into(), "Kafka".into()],
            required_experience_years: 3.0,
            seniority: "Mid".into(),
            ..Default::default()
        };
        let v = encoder.encode(&resume, &job);
        assert_eq!(v.len(), encoder.input_dims());
        assert_eq!(encoder.input_dims(), 6 + 2 * default_vocabulary().len());
    }
}
