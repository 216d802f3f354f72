//! Controlled skill/role vocabulary, snapshotted once per run.

use serde::{Deserialize, Serialize};

use crate::TagKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub name: String,
    pub kind: TagKind,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl VocabularyEntry {
    pub fn skill(name: &str, synonyms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: TagKind::Skill,
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn role(name: &str, synonyms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: TagKind::Role,
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Canonical name followed by every synonym.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub version: String,
    pub entries: Vec<VocabularyEntry>,
}

impl Vocabulary {
    pub fn new(version: impl Into<String>, entries: Vec<VocabularyEntry>) -> Self {
        Self {
            version: version.into(),
            entries,
        }
    }

    /// Resolve a free-form name (canonical or synonym) case-insensitively.
    pub fn canonicalize(&self, term: &str) -> Option<&VocabularyEntry> {
        let needle = term.trim();
        self.entries
            .iter()
            .find(|e| e.terms().any(|t| t.eq_ignore_ascii_case(needle)))
    }

    pub fn skills(&self) -> impl Iterator<Item = &VocabularyEntry> {
        self.entries.iter().filter(|e| e.kind == TagKind::Skill)
    }

    pub fn roles(&self) -> impl Iterator<Item = &VocabularyEntry> {
        self.entries.iter().filter(|e| e.kind == TagKind::Role)
    }

    /// Vocabulary used when no vocabulary file is configured.
    pub fn builtin() -> Self {
        use VocabularyEntry as E;
        let entries = vec![
            E::skill("Python", &[]),
            E::skill("Java", &[]),
            E::skill("JavaScript", &["js", "ecmascript"]),
            E::skill("TypeScript", &["ts"]),
            E::skill("C++", &["cpp"]),
            E::skill("C#", &["csharp", "c sharp"]),
            E::skill("Rust", &["rustlang"]),
            E::skill("Go", &["golang"]),
            E::skill("Ruby", &[]),
            E::skill("PHP", &[]),
            E::skill("Swift", &[]),
            E::skill("Kotlin", &[]),
            E::skill("HTML", &["html5"]),
            E::skill("CSS", &["css3"]),
            E::skill("SQL", &[]),
            E::skill("NoSQL", &[]),
            E::skill("MongoDB", &["mongo"]),
            E::skill("PostgreSQL", &["postgres"]),
            E::skill("MySQL", &[]),
            E::skill("AWS", &["amazon web services"]),
            E::skill("Azure", &["microsoft azure"]),
            E::skill("Google Cloud", &["gcp", "google cloud platform"]),
            E::skill("Docker", &[]),
            E::skill("Kubernetes", &["k8s"]),
            E::skill("Terraform", &[]),
            E::skill("Jenkins", &[]),
            E::skill("Git", &[]),
            E::skill("React", &["reactjs", "react.js"]),
            E::skill("Angular", &["angularjs"]),
            E::skill("Vue", &["vuejs", "vue.js"]),
            E::skill("Node.js", &["nodejs"]),
            E::skill("Django", &[]),
            E::skill("Flask", &[]),
            E::skill("Spring", &["spring boot"]),
            E::skill("Machine Learning", &["ml"]),
            E::skill("Deep Learning", &[]),
            E::skill("NLP", &["natural language processing"]),
            E::skill("Computer Vision", &[]),
            E::skill("TensorFlow", &[]),
            E::skill("PyTorch", &[]),
            E::skill("scikit-learn", &["sklearn"]),
            E::skill("Pandas", &[]),
            E::skill("NumPy", &[]),
            E::skill("Apache Spark", &["spark", "pyspark"]),
            E::skill("Kafka", &["apache kafka"]),
            E::skill("Airflow", &["apache airflow"]),
            E::skill("Agile", &[]),
            E::skill("Scrum", &[]),
            E::skill("Jira", &[]),
            E::skill("Figma", &[]),
            E::skill("Excel", &["microsoft excel"]),
            E::skill("Power BI", &["powerbi"]),
            E::skill("Tableau", &[]),
            E::role("Software Engineer", &["software developer", "programmer", "developer", "backend engineer", "frontend engineer"]),
            E::role("Data Engineer", &["etl developer", "big data engineer"]),
            E::role("Data Scientist", &["machine learning engineer", "ml engineer", "ai engineer"]),
            E::role("Data Analyst", &["business analyst", "bi analyst", "analytics analyst"]),
            E::role("DevOps Engineer", &["site reliability engineer", "sre", "platform engineer"]),
            E::role("Product Manager", &["product owner", "program manager"]),
            E::role("UX/UI Designer", &["ux designer", "ui designer", "product designer"]),
            E::role("Project Manager", &["project lead", "scrum master"]),
        ];
        Self::new("builtin-1", entries)
    }
}
