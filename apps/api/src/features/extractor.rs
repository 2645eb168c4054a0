//! Feature extractor: turns a (resume, job) pair into the fixed-length input
//! vector the readiness network is trained on.
//!
//! Layout of an encoded vector (D = 6 + 2V):
//!
//! | index        | value                                  |
//! |--------------|----------------------------------------|
//! | 0            | resume years / 50                      |
//! | 1            | job required years / 50                |
//! | 2            | resume skill count / 50                |
//! | 3            | job required skill count / 50          |
//! | 4            | education code / 4                     |
//! | 5            | job seniority (0–1)                    |
//! | 6 .. 6+V     | resume skill vector                    |
//! | 6+V .. 6+2V  | job skill vector                       |

use serde::{Deserialize, Serialize};

use crate::features::vocabulary::{MatchPolicy, SkillVocabulary};

pub const SCALAR_FEATURE_COUNT: usize = 6;
pub const MAX_EXPERIENCE_YEARS: f32 = 50.0;
const EXPERIENCE_DENOMINATOR: f32 = 50.0;
const SKILL_COUNT_DENOMINATOR: f32 = 50.0;
const EDUCATION_DENOMINATOR: f32 = 4.0;

// ────────────────────────────────────────────────────────────────────────────
// Feature records (training-data schema)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFeatures {
    pub skill_count: u32,
    /// Capped at 50.
    pub years_of_experience: f32,
    /// 0 = high school, 1 = associate/bootcamp, 2 = bachelor, 3 = master/PhD.
    pub education_level: u8,
    pub skill_vector: Vec<f32>,
    #[serde(default)]
    pub job_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFeatures {
    pub required_skill_count: u32,
    pub required_experience_years: f32,
    /// 0.0 (entry) – 1.0 (principal).
    pub seniority: f32,
    pub skill_vector: Vec<f32>,
    #[serde(default)]
    pub job_title: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Education / seniority normalization
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EducationLevel {
    HighSchool,
    Associate,
    Bachelor,
    Master,
    PhD,
}

impl EducationLevel {
    pub fn code(self) -> u8 {
        match self {
            EducationLevel::HighSchool => 0,
            EducationLevel::Associate => 1,
            EducationLevel::Bachelor => 2,
            EducationLevel::Master | EducationLevel::PhD => 3,
        }
    }
}

/// Maps free-form degree text to a level. Unrecognized text is treated as a
/// bachelor's degree.
pub fn normalize_education_level(education: &str) -> EducationLevel {
    let lower = education.trim().to_lowercase();
    let has_word = |w: &str| lower.split(|c: char| !c.is_alphanumeric() && c != '.').any(|t| t == w);

    if lower.contains("phd") || lower.contains("ph.d") || lower.contains("doctorate") {
        EducationLevel::PhD
    } else if lower.contains("master") || lower.contains("m.s") || has_word("ms") || has_word("msc") {
        EducationLevel::Master
    } else if lower.contains("bachelor") || lower.contains("b.s") || has_word("bs") || has_word("bsc") || has_word("ba") {
        EducationLevel::Bachelor
    } else if lower.contains("associate") || lower.contains("bootcamp") || lower.contains("boot camp") {
        EducationLevel::Associate
    } else if lower.contains("high school") || has_word("hs") || lower.contains("diploma") {
        EducationLevel::HighSchool
    } else {
        EducationLevel::Bachelor
    }
}

/// Maps free-form seniority text to the 0–1 scale used by the training data.
/// Unrecognized text is treated as mid-level (0.5).
pub fn normalize_seniority_level(seniority: &str) -> f32 {
    let lower = seniority.trim().to_lowercase();
    if lower.contains("principal") || lower.contains("director") || lower.contains("architect") {
        1.0
    } else if lower.contains("staff") || lower.contains("lead") {
        0.9
    } else if lower.contains("senior") || lower.starts_with("sr") {
        0.8
    } else if lower.contains("mid") || lower.contains("intermediate") {
        0.5
    } else if lower.contains("junior") || lower.contains("entry") || lower.contains("graduate") || lower.contains("intern") {
        0.2
    } else {
        0.5
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Extraction
// ────────────────────────────────────────────────────────────────────────────

pub fn extract_resume_features<S: AsRef<str>>(
    skills: &[S],
    years_of_experience: f32,
    education: &str,
    job_titles: Vec<String>,
    vocabulary: &SkillVocabulary,
    policy: MatchPolicy,
) -> ResumeFeatures {
    ResumeFeatures {
        skill_count: skills.len() as u32,
        years_of_experience: clamp_years(years_of_experience),
        education_level: normalize_education_level(education).code(),
        skill_vector: vocabulary.create_skill_vector(skills, policy),
        job_titles,
    }
}

pub fn extract_job_features<S: AsRef<str>>(
    required_skills: &[S],
    required_experience_years: f32,
    seniority: &str,
    job_title: &str,
    vocabulary: &SkillVocabulary,
    policy: MatchPolicy,
) -> JobFeatures {
    JobFeatures {
        required_skill_count: required_skills.len() as u32,
        required_experience_years: clamp_years(required_experience_years),
        seniority: normalize_seniority_level(seniority),
        skill_vector: vocabulary.create_skill_vector(required_skills, policy),
        job_title: job_title.to_string(),
    }
}

fn clamp_years(years: f32) -> f32 {
    if years.is_finite() {
        years.clamp(0.0, MAX_EXPERIENCE_YEARS)
    } else {
        0.0
    }
}

/// Concatenates scalar features and both skill vectors into one input row.
pub fn encode_all_features(resume: &ResumeFeatures, job: &JobFeatures) -> Vec<f32> {
    let mut features =
        Vec::with_capacity(SCALAR_FEATURE_COUNT + resume.skill_vector.len() + job.skill_vector.len());
    features.push(resume.years_of_experience / EXPERIENCE_DENOMINATOR);
    features.push(job.required_experience_years / EXPERIENCE_DENOMINATOR);
    features.push(resume.skill_count as f32 / SKILL_COUNT_DENOMINATOR);
    features.push(job.required_skill_count as f32 / SKILL_COUNT_DENOMINATOR);
    features.push(resume.education_level as f32 / EDUCATION_DENOMINATOR);
    features.push(job.seniority);
    features.extend_from_slice(&resume.skill_vector);
    features.extend_from_slice(&job.skill_vector);
    features
}

// ────────────────────────────────────────────────────────────────────────────
// Skill matching helpers (prediction summary)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkillMatch {
    pub matched: Vec<String>,
    pub missing: Vec<String>,
}

/// Splits the job's required skills into those the resume covers and those it
/// lacks, comparing canonical names.
pub fn match_skills<S: AsRef<str>>(
    resume_skills: &[S],
    required_skills: &[S],
    vocabulary: &SkillVocabulary,
) -> SkillMatch {
    let have: Vec<String> = resume_skills
        .iter()
        .map(|s| vocabulary.normalize_skill_name(s.as_ref()).to_lowercase())
        .collect();

    let mut result = SkillMatch::default();
    for skill in required_skills {
        let canonical = vocabulary.normalize_skill_name(skill.as_ref());
        if have.contains(&canonical.to_lowercase()) {
            result.matched.push(canonical);
        } else {
            result.missing.push(canonical);
        }
    }
    result
}

/// Rough learning-time estimate for a single missing skill, in weeks.
pub fn estimate_weeks_to_learn(skill: &str) -> u32 {
    const QUICK: &[&str] = &["git", "postman", "figma", "jira"];
    const MEDIUM: &[&str] = &["react", "vue", "angular", "sql", "postgresql", "mongodb", "redis"];
    const COMPLEX: &[&str] = &["kubernetes", "terraform", "aws", "gcp", "docker"];
    const LANGUAGES: &[&str] = &["python", "java", "go", "rust", "typescript"];

    let lower = skill.to_lowercase();
    let any = |set: &[&str]| set.iter().any(|s| lower.contains(s));
    if any(QUICK) {
        2
    } else if any(MEDIUM) {
        4
    } else if any(COMPLEX) || any(LANGUAGES) {
        8
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::vocabulary::default_vocabulary;

    fn resume() -> ResumeFeatures {
        extract_resume_features(
            &["React", "TypeScript", "NodeJS", "AWS"],
            3.0,
            "Bachelor's",
            vec!["Junior Developer".to_string()],
            default_vocabulary(),
            MatchPolicy::BoundaryAware,
        )
    }

    fn job() -> JobFeatures {
        extract_job_features(
            &["React", "TypeScript", "Node.js", "AWS", "Docker", "GraphQL"],
            5.0,
            "Senior",
            "Senior Full-Stack Developer",
            default_vocabulary(),
            MatchPolicy::BoundaryAware,
        )
    }

    #[test]
    fn test_extract_resume_features_fields() {
        let r = resume();
        assert_eq!(r.skill_count, 4);
        assert_eq!(r.years_of_experience, 3.0);
        assert_eq!(r.education_level, 2);
        assert_eq!(r.skill_vector.iter().sum::<f32>(), 4.0);
    }

    #[test]
    fn test_years_are_capped_at_fifty() {
        let r = extract_resume_features(
            &["Rust"],
            72.0,
            "PhD",
            vec![],
            default_vocabulary(),
            MatchPolicy::BoundaryAware,
        );
        assert_eq!(r.years_of_experience, 50.0);
        assert_eq!(r.education_level, 3);
    }

    #[test]
    fn test_encode_all_features_layout() {
        let r = resume();
        let j = job();
        let v = default_vocabulary().len();
        let encoded = encode_all_features(&r, &j);
        assert_eq!(encoded.len(), SCALAR_FEATURE_COUNT + 2 * v);
        assert!((encoded[0] - 3.0 / 50.0).abs() < 1e-6);
        assert!((encoded[1] - 5.0 / 50.0).abs() < 1e-6);
        assert!((encoded[2] - 4.0 / 50.0).abs() < 1e-6);
        assert!((encoded[3] - 6.0 / 50.0).abs() < 1e-6);
        assert!((encoded[4] - 0.5).abs() < 1e-6);
        assert!((encoded[5] - 0.8).abs() < 1e-6);
        assert_eq!(&encoded[6..6 + v], r.skill_vector.as_slice());
        assert_eq!(&encoded[6 + v..], j.skill_vector.as_slice());
    }

    #[test]
    fn test_dotted_alias_also_lights_up_js() {
        // "Node.js" ends in a delimited "js", which is a JavaScript alias.
        let v = default_vocabulary().create_skill_vector(&["Node.js"], MatchPolicy::BoundaryAware);
        assert_eq!(v.iter().sum::<f32>(), 2.0);
    }

    #[test]
    fn test_normalize_education_level() {
        assert_eq!(normalize_education_level("B.S"), EducationLevel::Bachelor);
        assert_eq!(normalize_education_level("Masters"), EducationLevel::Master);
        assert_eq!(normalize_education_level("Doctorate in CS"), EducationLevel::PhD);
        assert_eq!(normalize_education_level("Coding Bootcamp"), EducationLevel::Associate);
        assert_eq!(normalize_education_level("High School Diploma"), EducationLevel::HighSchool);
        assert_eq!(normalize_education_level("something else"), EducationLevel::Bachelor);
    }

    #[test]
    fn test_normalize_seniority_level() {
        assert_eq!(normalize_seniority_level("Sr Developer"), 0.8);
        assert_eq!(normalize_seniority_level("Entry Level"), 0.2);
        assert_eq!(normalize_seniority_level("Principal Engineer"), 1.0);
        assert_eq!(normalize_seniority_level("Mid"), 0.5);
        assert_eq!(normalize_seniority_level("???"), 0.5);
    }

    #[test]
    fn test_match_skills_uses_canonical_names() {
        let m = match_skills(
            &["reactjs", "TS", "nodejs", "aws"],
            &["React", "TypeScript", "Node.js", "AWS", "Docker", "GraphQL"],
            default_vocabulary(),
        );
        assert_eq!(m.matched, vec!["React", "TypeScript", "Node.js", "AWS"]);
        assert_eq!(m.missing, vec!["Docker", "GraphQL"]);
    }

    #[test]
    fn test_estimate_weeks_to_learn_buckets() {
        assert_eq!(estimate_weeks_to_learn("Git"), 2);
        assert_eq!(estimate_weeks_to_learn("PostgreSQL"), 4);
        assert_eq!(estimate_weeks_to_learn("Kubernetes"), 8);
        assert_eq!(estimate_weeks_to_learn("Rust"), 8);
        assert_eq!(estimate_weeks_to_learn("Elixir"), 3);
    }

    #[test]
    fn test_training_schema_deserializes_camel_case() {
        let json = r#"{
            "skillCount": 2,
            "yearsOfExperience": 4,
            "educationLevel": 2,
            "skillVector": [1, 0, 1],
            "jobTitles": ["Engineer"]
        }"#;
        let r: ResumeFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(r.skill_count, 2);
        assert_eq!(r.skill_vector, vec![1.0, 0.0, 1.0]);
    }
}
