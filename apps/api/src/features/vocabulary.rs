//! Skill vocabulary: canonical skill names, their surface aliases, and the two
//! matching policies used to turn free-form skill lists into multi-hot vectors.
//!
//! The vocabulary is immutable for the life of the process. The built-in one is
//! created lazily on first use via [`default_vocabulary`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

// ────────────────────────────────────────────────────────────────────────────
// Built-in dictionary
// ────────────────────────────────────────────────────────────────────────────

/// Canonical skill name → aliases. Order defines vector positions.
const SKILL_DICTIONARY: &[(&str, &[&str])] = &[
    // Frontend
    ("JavaScript", &["JavaScript", "JS"]),
    ("TypeScript", &["TypeScript", "TS"]),
    ("React", &["React", "React.js", "ReactJS"]),
    ("Next.js", &["Next.js", "NextJS", "Next"]),
    ("Vue", &["Vue", "Vue.js", "VueJS"]),
    ("Angular", &["Angular"]),
    ("Svelte", &["Svelte"]),
    ("CSS", &["CSS", "CSS3"]),
    ("HTML", &["HTML", "HTML5"]),
    ("Tailwind", &["Tailwind", "TailwindCSS", "Tailwind CSS"]),
    ("Redux", &["Redux"]),
    ("Webpack", &["Webpack"]),
    // Backend
    ("Node.js", &["Node.js", "NodeJS", "Node"]),
    ("Express", &["Express", "Express.js"]),
    ("Python", &["Python"]),
    ("Django", &["Django"]),
    ("Flask", &["Flask"]),
    ("FastAPI", &["FastAPI"]),
    ("Java", &["Java"]),
    ("Spring", &["Spring", "Spring Boot", "SpringBoot"]),
    ("C#", &["C#", "CSharp"]),
    (".NET", &[".NET", ".NET Core"]),
    ("Go", &["Go", "Golang"]),
    ("Rust", &["Rust"]),
    ("PHP", &["PHP"]),
    ("Ruby", &["Ruby", "Rails", "Ruby on Rails"]),
    // Databases & APIs
    ("SQL", &["SQL"]),
    ("PostgreSQL", &["PostgreSQL", "Postgres"]),
    ("MySQL", &["MySQL"]),
    ("MongoDB", &["MongoDB", "Mongo"]),
    ("GraphQL", &["GraphQL"]),
    ("Redis", &["Redis"]),
    ("Kafka", &["Kafka", "Apache Kafka"]),
    ("RabbitMQ", &["RabbitMQ"]),
    // DevOps
    ("AWS", &["AWS", "Amazon Web Services"]),
    ("GCP", &["GCP", "Google Cloud"]),
    ("Azure", &["Azure", "Microsoft Azure"]),
    ("Docker", &["Docker"]),
    ("Kubernetes", &["Kubernetes", "K8s"]),
    ("Terraform", &["Terraform"]),
    (
        "CI/CD",
        &["CI/CD", "CI-CD", "Continuous Integration", "Continuous Delivery"],
    ),
    ("Jenkins", &["Jenkins"]),
    ("GitHub Actions", &["GitHub Actions", "Actions"]),
    // Data / ML
    ("Pandas", &["Pandas"]),
    ("NumPy", &["NumPy"]),
    ("Scikit-Learn", &["Scikit-Learn", "sklearn"]),
    ("TensorFlow", &["TensorFlow", "TF"]),
    ("PyTorch", &["PyTorch"]),
    ("Spark", &["Spark", "Apache Spark"]),
    ("Hadoop", &["Hadoop"]),
    ("Airflow", &["Airflow"]),
    ("R", &["R"]),
    ("SQL Server", &["SQL Server", "MSSQL"]),
];

static DEFAULT_VOCABULARY: LazyLock<SkillVocabulary> = LazyLock::new(|| {
    SkillVocabulary::new(SKILL_DICTIONARY).expect("built-in skill aliases compile to valid patterns")
});

/// Returns the process-wide built-in vocabulary.
pub fn default_vocabulary() -> &'static SkillVocabulary {
    &DEFAULT_VOCABULARY
}

// ────────────────────────────────────────────────────────────────────────────
// Matching policies
// ────────────────────────────────────────────────────────────────────────────

/// How a free-form skill string is tested against a vocabulary entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Alias must appear delimited by string edges or non-word characters.
    /// "Go" does not match inside "Google"; "R" needs a stricter delimiter set.
    #[default]
    BoundaryAware,
    /// Either string contains the other, case-insensitive. Kept for the compact
    /// request-time encoder; short tokens produce false positives
    /// ("go" ⊂ "google", "r" ⊂ "rust").
    Substring,
}

// ────────────────────────────────────────────────────────────────────────────
// Vocabulary
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SkillEntry {
    canonical: String,
    aliases: Vec<String>,
    patterns: Vec<Regex>,
}

/// Ordered set of canonical skills. Index `i` of every skill vector refers to
/// `names()[i]`.
#[derive(Debug)]
pub struct SkillVocabulary {
    entries: Vec<SkillEntry>,
}

impl SkillVocabulary {
    /// Builds a vocabulary from `(canonical, aliases)` pairs. The canonical name
    /// is always treated as one of its own aliases.
    pub fn new(dictionary: &[(&str, &[&str])]) -> Result<Self, regex::Error> {
        let mut entries = Vec::with_capacity(dictionary.len());
        for (canonical, aliases) in dictionary {
            let mut all: Vec<String> = vec![canonical.to_string()];
            for alias in aliases.iter() {
                if !all.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
                    all.push(alias.to_string());
                }
            }
            let patterns = all
                .iter()
                .map(|a| boundary_pattern(a))
                .collect::<Result<Vec<_>, _>>()?;
            entries.push(SkillEntry {
                canonical: canonical.to_string(),
                aliases: all,
                patterns,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical names in vector order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.canonical.as_str())
    }

    /// Case-insensitive exact alias lookup.
    pub fn canonical_for(&self, name: &str) -> Option<&str> {
        let needle = name.trim();
        self.entries
            .iter()
            .find(|e| e.aliases.iter().any(|a| a.eq_ignore_ascii_case(needle)))
            .map(|e| e.canonical.as_str())
    }

    /// Canonicalizes a surface skill name. Unknown names come back trimmed.
    pub fn normalize_skill_name(&self, name: &str) -> String {
        self.canonical_for(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.trim().to_string())
    }

    /// True when `skill` matches the entry at `index` under `policy`.
    pub fn matches(&self, index: usize, skill: &str, policy: MatchPolicy) -> bool {
        let Some(entry) = self.entries.get(index) else {
            return false;
        };
        match policy {
            MatchPolicy::BoundaryAware => entry.patterns.iter().any(|p| p.is_match(skill)),
            MatchPolicy::Substring => {
                let skill = skill.trim().to_lowercase();
                let token = entry.canonical.to_lowercase();
                substring_match(&skill, &token)
            }
        }
    }

    /// Multi-hot membership vector of length `len()`.
    pub fn create_skill_vector<S: AsRef<str>>(&self, skills: &[S], policy: MatchPolicy) -> Vec<f32> {
        (0..self.entries.len())
            .map(|i| {
                let hit = skills.iter().any(|s| self.matches(i, s.as_ref(), policy));
                if hit {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Canonicalizes against the built-in vocabulary.
pub fn normalize_skill_name(name: &str) -> String {
    default_vocabulary().normalize_skill_name(name)
}

/// Naive containment in either direction. Empty strings never match.
pub(crate) fn substring_match(skill: &str, token: &str) -> bool {
    if skill.is_empty() || token.is_empty() {
        return false;
    }
    skill.contains(token) || token.contains(skill)
}

fn boundary_pattern(alias: &str) -> Result<Regex, regex::Error> {
    if alias.eq_ignore_ascii_case("r") {
        return Regex::new(r"(?i)(?:^|[\s,;()\[\]])R(?:$|[\s,;+)\]./])");
    }
    let escaped = regex::escape(alias);
    Regex::new(&format!(r"(?i)(?:^|[^\w]){escaped}(?:$|[^\w])"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(vocab: &SkillVocabulary, name: &str) -> usize {
        vocab.names().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_vector_length_equals_vocabulary_size() {
        let vocab = default_vocabulary();
        for policy in [MatchPolicy::BoundaryAware, MatchPolicy::Substring] {
            let empty: Vec<String> = vec![];
            assert_eq!(vocab.create_skill_vector(&empty, policy).len(), vocab.len());
            assert_eq!(
                vocab.create_skill_vector(&["Rust", "Docker", "nonsense"], policy).len(),
                vocab.len()
            );
        }
    }

    #[test]
    fn test_boundary_aware_matches_aliases_case_insensitively() {
        let vocab = default_vocabulary();
        let v = vocab.create_skill_vector(&["reactjs", "k8s", "Golang"], MatchPolicy::BoundaryAware);
        assert_eq!(v[index_of(vocab, "React")], 1.0);
        assert_eq!(v[index_of(vocab, "Kubernetes")], 1.0);
        assert_eq!(v[index_of(vocab, "Go")], 1.0);
        assert_eq!(v.iter().filter(|x| **x == 1.0).count(), 3);
    }

    #[test]
    fn test_boundary_aware_handles_symbol_aliases() {
        let vocab = default_vocabulary();
        let v = vocab.create_skill_vector(&["C#", ".NET Core", "CI/CD"], MatchPolicy::BoundaryAware);
        assert_eq!(v[index_of(vocab, "C#")], 1.0);
        assert_eq!(v[index_of(vocab, ".NET")], 1.0);
        assert_eq!(v[index_of(vocab, "CI/CD")], 1.0);
    }

    #[test]
    fn test_java_does_not_match_javascript_under_boundary_policy() {
        let vocab = default_vocabulary();
        let v = vocab.create_skill_vector(&["JavaScript"], MatchPolicy::BoundaryAware);
        assert_eq!(v[index_of(vocab, "JavaScript")], 1.0);
        assert_eq!(v[index_of(vocab, "Java")], 0.0);
    }

    #[test]
    fn test_policies_diverge_on_go_versus_google() {
        let vocab = default_vocabulary();
        let go = index_of(vocab, "Go");
        assert!(!vocab.matches(go, "Google", MatchPolicy::BoundaryAware));
        assert!(vocab.matches(go, "Google", MatchPolicy::Substring));
    }

    #[test]
    fn test_short_r_token_boundary_rules() {
        let vocab = default_vocabulary();
        let r = index_of(vocab, "R");
        assert!(vocab.matches(r, "R", MatchPolicy::BoundaryAware));
        assert!(vocab.matches(r, "Python, R, SQL", MatchPolicy::BoundaryAware));
        assert!(!vocab.matches(r, "R&D", MatchPolicy::BoundaryAware));
        assert!(!vocab.matches(r, "Rust", MatchPolicy::BoundaryAware));
        // The naive policy happily finds "r" inside "rust".
        assert!(vocab.matches(r, "Rust", MatchPolicy::Substring));
    }

    #[test]
    fn test_substring_policy_matches_either_direction() {
        let vocab = default_vocabulary();
        let pg = index_of(vocab, "PostgreSQL");
        assert!(vocab.matches(pg, "postgresql 15", MatchPolicy::Substring));
        assert!(vocab.matches(pg, "postgres", MatchPolicy::Substring));
        assert!(!vocab.matches(pg, "", MatchPolicy::Substring));
    }

    #[test]
    fn test_normalize_skill_name_resolves_aliases() {
        assert_eq!(normalize_skill_name("  nodejs "), "Node.js");
        assert_eq!(normalize_skill_name("K8S"), "Kubernetes");
        assert_eq!(normalize_skill_name("Elixir"), "Elixir");
    }

    #[test]
    fn test_custom_vocabulary_dedupes_canonical_alias() {
        let vocab = SkillVocabulary::new(&[("Zig", &["zig", "ziglang"])]).unwrap();
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.canonical_for("ZIGLANG"), Some("Zig"));
    }
}
