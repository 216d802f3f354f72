use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use skillcast_core::{Vocabulary, VocabularyEntry};
use tracing::info;

use crate::AdapterError;

/// Supplies the controlled vocabulary. Each call returns an immutable snapshot
/// whose version identifies exactly which entries a run used.
pub trait VocabularyProvider: Send + Sync {
    fn snapshot(&self) -> Result<Vocabulary, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct StaticVocabularyProvider {
    vocabulary: Vocabulary,
}

impl StaticVocabularyProvider {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn builtin() -> Self {
        Self::new(Vocabulary::builtin())
    }
}

impl VocabularyProvider for StaticVocabularyProvider {
    fn snapshot(&self) -> Result<Vocabulary, AdapterError> {
        Ok(self.vocabulary.clone())
    }
}

#[derive(Debug, Deserialize)]
struct VocabularyFile {
    version: String,
    #[serde(default)]
    skills: Vec<TermFile>,
    #[serde(default)]
    roles: Vec<TermFile>,
}

#[derive(Debug, Deserialize)]
struct TermFile {
    name: String,
    #[serde(default)]
    synonyms: Vec<String>,
}

/// Vocabulary read from YAML on every snapshot, so edits between runs are
/// picked up. The snapshot version is `<declared>+<sha256 prefix>` so two
/// files that forgot to bump `version` still get distinct versions.
#[derive(Debug, Clone)]
pub struct YamlVocabularyProvider {
    path: PathBuf,
}

impl YamlVocabularyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VocabularyProvider for YamlVocabularyProvider {
    fn snapshot(&self) -> Result<Vocabulary, AdapterError> {
        let path = &self.path;
        let text = fs::read_to_string(path).map_err(|e| AdapterError::Io {
            path: path.clone(),
            source: e,
        })?;
        let file: VocabularyFile = serde_yaml::from_str(&text).map_err(|e| AdapterError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let digest = hex::encode(Sha256::digest(text.as_bytes()));
        let version = format!("{}+{}", file.version, &digest[..12]);
        let entries = file
            .skills
            .into_iter()
            .map(|t| (t, true))
            .chain(file.roles.into_iter().map(|t| (t, false)))
            .map(|(t, is_skill)| {
                let synonyms = t.synonyms.iter().map(String::as_str).collect::<Vec<_>>();
                if is_skill {
                    VocabularyEntry::skill(&t.name, &synonyms)
                } else {
                    VocabularyEntry::role(&t.name, &synonyms)
                }
            })
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return Err(AdapterError::Message(format!(
                "vocabulary {} declares no skills or roles",
                path.display()
            )));
        }
        info!(%version, entries = entries.len(), "vocabulary snapshot loaded");
        Ok(Vocabulary::new(version, entries))
    }
}
