//! Vocabulary-driven skill and role tagging.

use std::collections::{BTreeMap, HashMap};

use skillcast_core::{
    CanonicalPosting, ExtractConfig, MatchMethod, SkillTag, TagKind, Vocabulary, VocabularyEntry,
};
use strsim::normalized_damerau_levenshtein;

/// A vocabulary entry a matcher found in some text.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub name: String,
    pub kind: TagKind,
    pub confidence: f64,
    pub method: MatchMethod,
}

impl From<MatchCandidate> for SkillTag {
    fn from(c: MatchCandidate) -> Self {
        SkillTag {
            name: c.name,
            kind: c.kind,
            confidence: c.confidence,
            method: c.method,
        }
    }
}

/// Text in, ranked vocabulary candidates out. Implementations can be swapped
/// without touching [`SkillExtractor`].
pub trait SkillMatcher: Send + Sync {
    fn match_text(&self, text: &str) -> Vec<MatchCandidate>;
}

/// Lowercased tokens; `+`, `#` and inner `.` stay so that "c++", "c#" and
/// "node.js" survive.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '.')))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
struct Term {
    tokens: Vec<String>,
    entry: usize,
}

fn compile_terms(entries: &[VocabularyEntry]) -> Vec<Term> {
    entries
        .iter()
        .enumerate()
        .flat_map(|(entry, e)| {
            e.terms()
                .map(tokenize)
                .filter(|tokens| !tokens.is_empty())
                .map(move |tokens| Term { tokens, entry })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Whole-token-sequence hits on canonical names and synonyms (confidence 1.0).
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    entries: Vec<VocabularyEntry>,
    by_first_token: HashMap<String, Vec<Term>>,
}

impl ExactMatcher {
    pub fn new(entries: Vec<VocabularyEntry>) -> Self {
        let mut by_first_token: HashMap<String, Vec<Term>> = HashMap::new();
        for term in compile_terms(&entries) {
            by_first_token
                .entry(term.tokens[0].clone())
                .or_default()
                .push(term);
        }
        Self {
            entries,
            by_first_token,
        }
    }

    fn matched_entries(&self, tokens: &[String]) -> Vec<usize> {
        let mut hits = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let Some(terms) = self.by_first_token.get(token) else {
                continue;
            };
            for term in terms {
                if tokens[i..].starts_with(&term.tokens) && !hits.contains(&term.entry) {
                    hits.push(term.entry);
                }
            }
        }
        hits
    }
}

impl SkillMatcher for ExactMatcher {
    fn match_text(&self, text: &str) -> Vec<MatchCandidate> {
        let tokens = tokenize(text);
        self.matched_entries(&tokens)
            .into_iter()
            .map(|idx| MatchCandidate {
                name: self.entries[idx].name.clone(),
                kind: self.entries[idx].kind,
                confidence: 1.0,
                method: MatchMethod::Exact,
            })
            .collect()
    }
}

/// Edit-distance similarity between vocabulary terms and same-length token
/// n-grams of the text. Catches misspellings like "Kubernets".
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    entries: Vec<VocabularyEntry>,
    terms: Vec<(String, usize, usize)>,
    min_confidence: f64,
}

impl FuzzyMatcher {
    pub fn new(entries: Vec<VocabularyEntry>, config: &ExtractConfig) -> Self {
        let terms = compile_terms(&entries)
            .into_iter()
            .map(|t| (t.tokens.join(" "), t.tokens.len(), t.entry))
            .filter(|(joined, _, _)| joined.chars().count() >= config.fuzzy_min_term_len)
            .collect();
        Self {
            entries,
            terms,
            min_confidence: config.min_fuzzy_confidence,
        }
    }
}

impl SkillMatcher for FuzzyMatcher {
    fn match_text(&self, text: &str) -> Vec<MatchCandidate> {
        let tokens = tokenize(text);
        let mut best: BTreeMap<usize, f64> = BTreeMap::new();
        for (term, width, entry) in &self.terms {
            let term_len = term.chars().count() as f64;
            for window in tokens.windows(*width) {
                let candidate = window.join(" ");
                let len = candidate.chars().count() as f64;
                if (len - term_len).abs() > term_len * 0.3 {
                    continue;
                }
                let score = normalized_damerau_levenshtein(term, &candidate);
                if score >= self.min_confidence {
                    let slot = best.entry(*entry).or_insert(0.0);
                    if score > *slot {
                        *slot = score;
                    }
                }
            }
        }
        let mut out = best
            .into_iter()
            .map(|(idx, score)| MatchCandidate {
                name: self.entries[idx].name.clone(),
                kind: self.entries[idx].kind,
                confidence: score,
                method: MatchMethod::Fuzzy,
            })
            .collect::<Vec<_>>();
        out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then_with(|| a.name.cmp(&b.name)));
        out
    }
}

/// Exact hits first; fuzzy matching only fills in entries the exact pass missed.
pub struct HybridMatcher {
    exact: ExactMatcher,
    fuzzy: FuzzyMatcher,
}

impl HybridMatcher {
    pub fn new(entries: Vec<VocabularyEntry>, config: &ExtractConfig) -> Self {
        Self {
            exact: ExactMatcher::new(entries.clone()),
            fuzzy: FuzzyMatcher::new(entries, config),
        }
    }
}

impl SkillMatcher for HybridMatcher {
    fn match_text(&self, text: &str) -> Vec<MatchCandidate> {
        let mut out = self.exact.match_text(text);
        for candidate in self.fuzzy.match_text(text) {
            if !out.iter().any(|c| c.name == candidate.name) {
                out.push(candidate);
            }
        }
        out
    }
}

/// Tags skills from title and body, roles from the title only.
pub struct SkillExtractor {
    skills: Box<dyn SkillMatcher>,
    roles: Box<dyn SkillMatcher>,
    vocabulary_version: String,
}

impl SkillExtractor {
    pub fn new(vocabulary: &Vocabulary, config: &ExtractConfig) -> Self {
        Self {
            skills: Box::new(HybridMatcher::new(vocabulary.skills().cloned().collect(), config)),
            roles: Box::new(HybridMatcher::new(vocabulary.roles().cloned().collect(), config)),
            vocabulary_version: vocabulary.version.clone(),
        }
    }

    pub fn with_matchers(
        skills: Box<dyn SkillMatcher>,
        roles: Box<dyn SkillMatcher>,
        vocabulary_version: impl Into<String>,
    ) -> Self {
        Self {
            skills,
            roles,
            vocabulary_version: vocabulary_version.into(),
        }
    }

    pub fn vocabulary_version(&self) -> &str {
        &self.vocabulary_version
    }

    /// Each tag appears at most once, keeping its best-confidence match.
    /// An empty result is valid.
    pub fn extract(&self, posting: &CanonicalPosting) -> Vec<SkillTag> {
        let text = format!("{}\n{}", posting.title, posting.body);
        let mut best: BTreeMap<String, MatchCandidate> = BTreeMap::new();
        for candidate in self
            .skills
            .match_text(&text)
            .into_iter()
            .chain(self.roles.match_text(&posting.title))
        {
            match best.get(&candidate.name) {
                Some(existing) if existing.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(candidate.name.clone(), candidate);
                }
            }
        }
        best.into_values().map(SkillTag::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use skillcast_core::{Granularity, RegionCode, Seniority, SourceRef, WorkArrangement};

    fn posting(title: &str, body: &str) -> CanonicalPosting {
        let posted_on = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        CanonicalPosting {
            source: SourceRef::new("t", "1"),
            title: title.into(),
            body: body.into(),
            region: RegionCode::new("US-CA"),
            posted_on,
            period: Granularity::IsoWeek.bucket(posted_on),
            seniority: Seniority::MidLevel,
            work_arrangement: WorkArrangement::OnSite,
            salary: None,
            fingerprint: String::new(),
        }
    }

    fn extractor() -> SkillExtractor {
        SkillExtractor::new(&Vocabulary::builtin(), &ExtractConfig::default())
    }

    fn names(tags: &[SkillTag]) -> Vec<&str> {
        tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn tokenizer_keeps_language_punctuation() {
        assert_eq!(tokenize("C++, C# and Node.js."), vec!["c++", "c#", "and", "node.js"]);
    }

    #[test]
    fn exact_matches_synonyms_once_per_posting() {
        let tags = extractor().extract(&posting(
            "Backend Engineer",
            "Python, python and more PYTHON. Deploy on k8s with Docker; Spark jobs via PySpark.",
        ));
        assert_eq!(names(&tags), vec!["Apache Spark", "Docker", "Kubernetes", "Python", "Software Engineer"]);
        assert!(tags.iter().all(|t| t.confidence == 1.0 && t.method == MatchMethod::Exact));
        let role = tags.iter().find(|t| t.name == "Software Engineer").unwrap();
        assert_eq!(role.kind, TagKind::Role);
    }

    #[test]
    fn substrings_inside_words_do_not_match() {
        let tags = extractor().extract(&posting("Analyst", "Javascripting and gitlab pipelines in a sparkling office"));
        assert!(!names(&tags).contains(&"Git"));
        assert!(!names(&tags).contains(&"Apache Spark"));
    }

    #[test]
    fn fuzzy_matches_carry_their_similarity() {
        let tags = extractor().extract(&posting("Platform Role", "Experience with Kubernets and Terraform"));
        let k8s = tags.iter().find(|t| t.name == "Kubernetes").unwrap();
        assert_eq!(k8s.method, MatchMethod::Fuzzy);
        assert!(k8s.confidence >= 0.85 && k8s.confidence < 1.0);
        let tf = tags.iter().find(|t| t.name == "Terraform").unwrap();
        assert_eq!(tf.method, MatchMethod::Exact);
    }

    #[test]
    fn low_similarity_is_discarded_and_empty_is_valid() {
        let tags = extractor().extract(&posting("Barista", "Pour coffee and reach customers"));
        assert!(tags.is_empty());
    }

    struct Fixed;

    impl SkillMatcher for Fixed {
        fn match_text(&self, _text: &str) -> Vec<MatchCandidate> {
            vec![MatchCandidate {
                name: "Rust".into(),
                kind: TagKind::Skill,
                confidence: 0.9,
                method: MatchMethod::Fuzzy,
            }]
        }
    }

    #[test]
    fn matchers_are_swappable() {
        let ex = SkillExtractor::with_matchers(Box::new(Fixed), Box::new(Fixed), "test-1");
        let tags = ex.extract(&posting("x", "y"));
        assert_eq!(names(&tags), vec!["Rust"]);
        assert_eq!(ex.vocabulary_version(), "test-1");
    }
}
