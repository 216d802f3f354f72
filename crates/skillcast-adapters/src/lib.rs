//! Collaborator contracts the pipeline core consumes, plus file-backed
//! implementations used by the CLI, the scheduler and the tests.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use skillcast_core::{parse_posted_date, PipelineConfig, RawPosting, SalaryRange};
use thiserror::Error;
use tracing::{debug, info};

pub mod region;
pub mod vocabulary;

pub use region::{RegionLookup, TableRegionLookup};
pub use vocabulary::{StaticVocabularyProvider, VocabularyProvider, YamlVocabularyProvider};

pub const CRATE_NAME: &str = "skillcast-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{0}")]
    Message(String),
}

impl AdapterError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        AdapterError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn parse(path: &Path, message: impl ToString) -> Self {
        AdapterError::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Inclusive date range a source is asked to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    fn as_of(&self) -> DateTime<Utc> {
        self.end.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc()
    }
}

/// A finite, restartable sequence of raw postings for a time window.
///
/// Pages are requested by offset; an empty page means the sequence is
/// exhausted, which is not an error. Asking again from offset 0 restarts it.
#[async_trait]
pub trait PostingSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch_page(
        &self,
        window: &TimeWindow,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawPosting>, AdapterError>;
}

/// Drain a source page by page.
pub async fn collect_window(
    source: &dyn PostingSource,
    window: &TimeWindow,
    page_size: usize,
) -> Result<Vec<RawPosting>, AdapterError> {
    let page_size = page_size.max(1);
    let mut out = Vec::new();
    loop {
        let page = source.fetch_page(window, out.len(), page_size).await?;
        if page.is_empty() {
            break;
        }
        out.extend(page);
    }
    debug!(source_id = source.source_id(), postings = out.len(), "source exhausted");
    Ok(out)
}

/// Postings held in memory; handy for callers that already materialized a batch.
#[derive(Debug, Clone)]
pub struct InMemoryPostingSource {
    source_id: String,
    postings: Vec<RawPosting>,
}

impl InMemoryPostingSource {
    pub fn new(source_id: impl Into<String>, postings: Vec<RawPosting>) -> Self {
        Self {
            source_id: source_id.into(),
            postings,
        }
    }
}

#[async_trait]
impl PostingSource for InMemoryPostingSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_page(
        &self,
        window: &TimeWindow,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        Ok(page_in_window(&self.postings, window, offset, limit))
    }
}

/// JSON export of a job board: either a top-level array of records or an
/// object with a `postings` array. Records may use any of the field-name
/// variants boards are known to publish.
#[derive(Debug, Clone)]
pub struct JsonFilePostingSource {
    source_id: String,
    path: PathBuf,
    postings: Vec<RawPosting>,
}

impl JsonFilePostingSource {
    pub fn open(source_id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let source_id = source_id.into();
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| AdapterError::io(path, e))?;
        let value: JsonValue = serde_json::from_str(&text).map_err(|e| AdapterError::parse(path, e))?;
        let records = match &value {
            JsonValue::Array(items) => items.as_slice(),
            JsonValue::Object(_) => value
                .get("postings")
                .and_then(JsonValue::as_array)
                .map(Vec::as_slice)
                .ok_or_else(|| AdapterError::parse(path, "expected an array or a `postings` array"))?,
            _ => return Err(AdapterError::parse(path, "expected an array or a `postings` array")),
        };
        let postings = records
            .iter()
            .map(|record| raw_posting_from_json(&source_id, record))
            .collect::<Vec<_>>();
        info!(%source_id, path = %path.display(), postings = postings.len(), "loaded posting export");
        Ok(Self {
            source_id,
            path: path.to_path_buf(),
            postings,
        })
    }

    /// One source per `*.json` file in `dir`, named after the file stem.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>, AdapterError> {
        let dir = dir.as_ref();
        let mut paths = fs::read_dir(dir)
            .map_err(|e| AdapterError::io(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        paths.sort();
        paths
            .iter()
            .map(|p| {
                let stem = p
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string());
                Self::open(stem, p)
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PostingSource for JsonFilePostingSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_page(
        &self,
        window: &TimeWindow,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        Ok(page_in_window(&self.postings, window, offset, limit))
    }
}

/// Postings whose date is outside the window are skipped; postings whose date
/// cannot be read are passed through so the normalizer can report them.
fn page_in_window(postings: &[RawPosting], window: &TimeWindow, offset: usize, limit: usize) -> Vec<RawPosting> {
    let as_of = window.as_of();
    postings
        .iter()
        .filter(|p| {
            match p.posted_at.as_deref().and_then(|t| parse_posted_date(t, as_of)) {
                Some(date) => window.contains(date),
                None => true,
            }
        })
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_f64().or_else(|| cur.as_str().and_then(|s| extract_numbers(s).first().copied()))
}

fn first_text(value: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let field = value.get(*key)?;
        let text = match field {
            JsonValue::String(s) => s.trim().to_string(),
            JsonValue::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

fn extract_numbers(text: &str) -> Vec<f64> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut seen_dot = false;
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
            continue;
        }
        if ch == ',' && !current.is_empty() {
            continue;
        }
        if ch == '.' && !seen_dot && !current.is_empty() {
            current.push(ch);
            seen_dot = true;
            continue;
        }
        if !current.is_empty() {
            if let Ok(v) = current.parse::<f64>() {
                out.push(v);
            }
            current.clear();
            seen_dot = false;
        }
    }
    if let Ok(v) = current.parse::<f64>() {
        out.push(v);
    }
    out
}

fn parse_salary_text(text: &str) -> Option<SalaryRange> {
    let lower = text.to_ascii_lowercase();
    let multiplier = if lower.contains('k') { 1000.0 } else { 1.0 };
    let nums = extract_numbers(text);
    let min = nums.first().map(|v| v * multiplier)?;
    let max = nums.get(1).map(|v| v * multiplier).or(Some(min));
    let currency = if lower.contains("usd") || text.contains('$') {
        Some("USD".to_string())
    } else if lower.contains("eur") || text.contains('€') {
        Some("EUR".to_string())
    } else if lower.contains("gbp") || text.contains('£') {
        Some("GBP".to_string())
    } else {
        None
    };
    Some(SalaryRange {
        min: Some(min),
        max,
        currency,
    })
}

fn salary_from_json(value: &JsonValue) -> Option<SalaryRange> {
    match value.get("salary") {
        Some(JsonValue::String(text)) => return parse_salary_text(text),
        Some(obj @ JsonValue::Object(_)) => {
            let range = SalaryRange {
                min: json_f64(obj, &["min"]),
                max: json_f64(obj, &["max"]),
                currency: json_str(obj, &["currency"]).map(ToString::to_string),
            };
            return (range.min.is_some() || range.max.is_some()).then_some(range);
        }
        _ => {}
    }
    let min = json_f64(value, &["salary_min"]);
    let max = json_f64(value, &["salary_max"]);
    if min.is_none() && max.is_none() {
        return None;
    }
    Some(SalaryRange {
        min,
        max,
        currency: json_str(value, &["currency"])
            .or_else(|| json_str(value, &["salary_currency"]))
            .map(ToString::to_string),
    })
}

fn posted_at_from_json(value: &JsonValue) -> Option<String> {
    for key in ["posted_at", "posting_date", "date_posted", "listed_at"] {
        match value.get(key) {
            Some(JsonValue::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(JsonValue::Number(n)) => {
                return n
                    .as_i64()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .map(|ts| ts.to_rfc3339());
            }
            _ => {}
        }
    }
    None
}

/// Stable id for records that carry none of the known id fields.
fn content_id(value: &JsonValue) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Map one heterogeneous board record onto a [`RawPosting`].
pub fn raw_posting_from_json(default_source_id: &str, value: &JsonValue) -> RawPosting {
    let source_id = first_text(value, &["source", "source_id"]).unwrap_or_else(|| default_source_id.to_string());
    let source_native_id = first_text(value, &["id", "job_id", "external_id"]).unwrap_or_else(|| content_id(value));
    RawPosting {
        source_id,
        source_native_id,
        title: first_text(value, &["title", "job_title", "position"]),
        body: first_text(value, &["description", "body", "job_description"]),
        location: first_text(value, &["location", "job_location", "city"]),
        posted_at: posted_at_from_json(value),
        salary: salary_from_json(value),
    }
}

/// Read `skillcast.yaml`; a missing file yields the defaults.
pub fn load_pipeline_config(path: impl AsRef<Path>) -> Result<PipelineConfig, AdapterError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no pipeline config file; using defaults");
        return Ok(PipelineConfig::default());
    }
    let text = fs::read_to_string(path).map_err(|e| AdapterError::io(path, e))?;
    serde_yaml::from_str(&text).map_err(|e| AdapterError::parse(path, e))
}
