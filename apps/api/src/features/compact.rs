//! Compact request-time encoder: a fixed 90-dimension layout over a hard-coded
//! 40-entry dictionary, matched with the naive substring policy.
//!
//! This layout is maintained independently of the training vocabulary. It is
//! selected with `FEATURE_ENCODER=compact` for parity with models trained on
//! the 90-feature format; against a vocabulary-trained network the width check
//! in the model service rejects it.

use crate::features::vocabulary::substring_match;
use crate::features::{FeatureEncoder, JobPosting, ResumeProfile};

pub const COMPACT_DIMS: usize = 90;

/// 40 slots. "kubernetes" appears twice, so slot 38 always mirrors slot 34.
const COMPACT_DICTIONARY: [&str; 40] = [
    "javascript", "typescript", "python", "java", "c++", "c#", "php", "ruby", "go", "rust",
    "react", "vue", "angular", "nodejs", "express", "django", "flask", "spring", "nextjs", "nestjs",
    "sql", "mongodb", "postgresql", "mysql", "redis", "cassandra", "elasticsearch", "firebase",
    "dynamodb", "mariadb", "aws", "azure", "gcp", "docker", "kubernetes", "git", "jenkins",
    "terraform", "kubernetes", "helm",
];

pub struct CompactRequestEncoder;

impl FeatureEncoder for CompactRequestEncoder {
    fn input_dims(&self) -> usize {
        COMPACT_DIMS
    }

    fn encode(&self, resume: &ResumeProfile, job: &JobPosting) -> Vec<f32> {
        let mut features = Vec::with_capacity(95);
        let skill_count = resume.skills.len() as f32;
        let seniority = compact_seniority(&resume.seniority);

        // Resume block (50)
        features.push(skill_count);
        features.push(resume.years_of_experience);
        features.push(compact_education(&resume.education));
        features.push(seniority);
        features.push(skill_count.min(10.0) / 10.0);
        features.extend(compact_skill_vector(&resume.skills));
        features.push(if resume.education.trim().is_empty() { 0.0 } else { 1.0 });
        features.push((resume.years_of_experience / 20.0).min(1.0));
        features.push(skill_count.min(10.0) / 10.0);
        features.push(seniority);
        features.push(experience_tier(resume.years_of_experience));

        // Job block (45, trimmed to 40)
        features.push(job.required_skills.len() as f32);
        features.push(job.required_experience_years.clamp(0.0, 20.0) / 20.0);
        features.push(education_for_job(&job.description));
        features.push(compact_seniority(&job.seniority));
        features.push(1.0);
        features.extend(compact_skill_vector(&job.required_skills));

        features.truncate(COMPACT_DIMS);
        features
    }

    fn name(&self) -> &'static str {
        "compact"
    }
}

fn compact_skill_vector(skills: &[String]) -> Vec<f32> {
    let lowered: Vec<String> = skills.iter().map(|s| s.trim().to_lowercase()).collect();
    COMPACT_DICTIONARY
        .iter()
        .map(|token| {
            if lowered.iter().any(|s| substring_match(s, token)) {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn compact_education(education: &str) -> f32 {
    match education.trim() {
        "Bootcamp" => 1.0,
        "Bachelor" => 2.0,
        "Master" | "PhD" => 3.0,
        _ => 0.0,
    }
}

fn compact_seniority(seniority: &str) -> f32 {
    match seniority.trim() {
        "Entry" => 0.2,
        "Mid" => 0.5,
        "Senior" => 0.8,
        "Principal" => 1.0,
        _ => 0.5,
    }
}

fn education_for_job(description: &str) -> f32 {
    let desc = description.to_lowercase();
    if desc.contains("phd") || desc.contains("master") {
        3.0
    } else if desc.contains("bachelor") || desc.contains("degree") {
        2.0
    } else if desc.contains("bootcamp") || desc.contains("certification") {
        1.0
    } else {
        2.0
    }
}

fn experience_tier(years: f32) -> f32 {
    if years < 2.0 {
        years / 8.0
    } else if years < 5.0 {
        0.25 + (years - 2.0) / 12.0
    } else if years < 10.0 {
        0.5 + (years - 5.0) / 25.0
    } else {
        (0.8 + (years - 10.0) / 50.0).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(skills: &[&str]) -> ResumeProfile {
        ResumeProfile {
            skills: skills.iter().map(|s| s.to_string()).collect(),
            years_of_experience: 6.0,
            education: "Bachelor".into(),
            seniority: "Senior".into(),
            job_titles: vec![],
        }
    }

    fn posting(skills: &[&str]) -> JobPosting {
        JobPosting {
            title: "Platform Engineer".into(),
            required_skills: skills.iter().map(|s| s.to_string()).collect(),
            required_experience_years: 5.0,
            seniority: "Senior".into(),
            description: "Bachelor's degree preferred".into(),
        }
    }

    #[test]
    fn test_compact_encoder_is_always_90_wide() {
        let v = CompactRequestEncoder.encode(&profile(&["Rust"]), &posting(&["Go", "AWS"]));
        assert_eq!(v.len(), COMPACT_DIMS);
        assert_eq!(CompactRequestEncoder.input_dims(), COMPACT_DIMS);
    }

    #[test]
    fn test_compact_substring_policy_flags_go_inside_google() {
        let v = compact_skill_vector(&["Google Analytics".to_string()]);
        // slot 8 is "go"
        assert_eq!(v[8], 1.0);
    }

    #[test]
    fn test_duplicate_kubernetes_slots_mirror_each_other() {
        let v = compact_skill_vector(&["kubernetes".to_string()]);
        assert_eq!(v[34], 1.0);
        assert_eq!(v[38], 1.0);
    }

    #[test]
    fn test_experience_tier_boundaries() {
        assert_eq!(experience_tier(0.0), 0.0);
        assert!((experience_tier(2.0) - 0.25).abs() < 1e-6);
        assert!((experience_tier(5.0) - 0.5).abs() < 1e-6);
        assert!((experience_tier(10.0) - 0.8).abs() < 1e-6);
        assert_eq!(experience_tier(40.0), 1.0);
    }
}
