//! Core domain model for skill-demand forecasting.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod config;
pub mod dates;
pub mod error;
pub mod period;
pub mod vocabulary;

pub use config::{
    AggregateConfig, DedupConfig, ExtractConfig, ForecastConfig, InsightConfig, NormalizeConfig,
    PipelineConfig, WorkerConfig,
};
pub use dates::parse_posted_date;
pub use error::PipelineError;
pub use period::{Granularity, Period};
pub use vocabulary::{Vocabulary, VocabularyEntry};

pub const CRATE_NAME: &str = "skillcast-core";

/// Provenance pointer back to the posting as the source published it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    pub source_native_id: String,
}

impl SourceRef {
    pub fn new(source_id: impl Into<String>, source_native_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_native_id: source_native_id.into(),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_id, self.source_native_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SalaryRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub currency: Option<String>,
}

/// Posting exactly as a source handed it over. Fields are optional because
/// sources disagree on what they publish; the normalizer decides what is
/// required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub source_id: String,
    pub source_native_id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub location: Option<String>,
    /// Timestamp text as published (RFC 3339, calendar formats or "3 days ago").
    pub posted_at: Option<String>,
    pub salary: Option<SalaryRange>,
}

impl RawPosting {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef::new(&self.source_id, &self.source_native_id)
    }
}

/// Region code such as `US-CA`, `DE` or `REMOTE`; `UNRESOLVED` when lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    pub const UNRESOLVED: &'static str = "UNRESOLVED";

    pub fn new(code: impl AsRef<str>) -> Self {
        let code = code.as_ref().trim().to_ascii_uppercase();
        if code.is_empty() {
            Self::unresolved()
        } else {
            Self(code)
        }
    }

    pub fn unresolved() -> Self {
        Self(Self::UNRESOLVED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_resolved(&self) -> bool {
        self.0 != Self::UNRESOLVED
    }

    /// 0 for unresolved, otherwise the number of `-` separated segments.
    pub fn specificity(&self) -> usize {
        if self.is_resolved() {
            self.0.split('-').count()
        } else {
            0
        }
    }

    pub fn country_root(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// Two postings may describe the same listing only in compatible regions.
    pub fn compatible_with(&self, other: &RegionCode) -> bool {
        !self.is_resolved() || !other.is_resolved() || self.country_root() == other.country_root()
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seniority {
    Executive,
    Senior,
    MidLevel,
    EntryLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkArrangement {
    Remote,
    Hybrid,
    OnSite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPosting {
    pub source: SourceRef,
    pub title: String,
    pub body: String,
    pub region: RegionCode,
    pub posted_on: NaiveDate,
    pub period: Period,
    pub seniority: Seniority,
    pub work_arrangement: WorkArrangement,
    pub salary: Option<SalaryRange>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Skill,
    Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMethod {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTag {
    pub name: String,
    pub kind: TagKind,
    /// 1.0 for exact vocabulary hits, the similarity score for fuzzy ones.
    pub confidence: f64,
    pub method: MatchMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedPosting {
    pub posting: CanonicalPosting,
    pub tags: Vec<SkillTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    pub fn from_representative(source: &SourceRef) -> Self {
        ClusterId(Uuid::new_v5(&Uuid::NAMESPACE_URL, source.to_string().as_bytes()))
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Postings judged to describe one listing. `representative` indexes `members`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingCluster {
    pub id: ClusterId,
    pub representative: usize,
    pub members: Vec<TaggedPosting>,
    pub region: RegionCode,
}

impl PostingCluster {
    pub fn representative(&self) -> &TaggedPosting {
        &self.members[self.representative]
    }

    pub fn period(&self) -> Period {
        self.representative().posting.period
    }

    /// Distinct tag names across all members.
    pub fn tag_names(&self) -> BTreeSet<&str> {
        self.members
            .iter()
            .flat_map(|m| m.tags.iter().map(|t| t.name.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub tag: String,
    pub region: RegionCode,
    pub granularity: Granularity,
}

impl SeriesKey {
    pub fn new(tag: impl Into<String>, region: RegionCode, granularity: Granularity) -> Self {
        Self {
            tag: tag.into(),
            region,
            granularity,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.tag, self.region, self.granularity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: Period,
    pub count: u64,
}

/// An increment aimed at a period the series has already finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LateArrival {
    pub period: Period,
    pub finalized_through: Period,
}

/// Dense, ordered demand counts for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSeries {
    pub key: SeriesKey,
    pub points: Vec<SeriesPoint>,
    pub finalized_through: Option<Period>,
}

impl DemandSeries {
    pub fn new(key: SeriesKey) -> Self {
        Self {
            key,
            points: Vec::new(),
            finalized_through: None,
        }
    }

    pub fn last_period(&self) -> Option<Period> {
        self.points.last().map(|p| p.period)
    }

    pub fn latest_count(&self) -> Option<u64> {
        self.points.last().map(|p| p.count)
    }

    pub fn counts(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.count as f64).collect()
    }

    pub fn accepts(&self, period: Period) -> bool {
        self.finalized_through.map_or(true, |f| period > f)
    }

    /// Add `count` to `period`, zero-filling any gap so the series stays dense.
    pub fn add(&mut self, period: Period, count: u64) -> Result<(), LateArrival> {
        let g = self.key.granularity;
        let period = g.bucket(period.start());
        if let Some(finalized_through) = self.finalized_through {
            if period <= finalized_through {
                return Err(LateArrival {
                    period,
                    finalized_through,
                });
            }
        }

        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            self.points.push(SeriesPoint { period, count });
            return Ok(());
        };
        let (first, last) = (first.period, last.period);

        if period > last {
            let mut next = g.next(last);
            while next < period {
                self.points.push(SeriesPoint {
                    period: next,
                    count: 0,
                });
                next = g.next(next);
            }
            self.points.push(SeriesPoint { period, count });
        } else if period < first {
            let mut prefix = vec![SeriesPoint { period, count }];
            let mut next = g.next(period);
            while next < first {
                prefix.push(SeriesPoint {
                    period: next,
                    count: 0,
                });
                next = g.next(next);
            }
            prefix.append(&mut self.points);
            self.points = prefix;
        } else {
            match self.points.binary_search_by_key(&period, |p| p.period) {
                Ok(idx) => self.points[idx].count += count,
                Err(idx) => self.points.insert(idx, SeriesPoint { period, count }),
            }
        }
        Ok(())
    }

    /// Finalize every period more than `lag` periods behind the latest one.
    pub fn finalize(&mut self, lag: usize) {
        if self.points.len() <= lag {
            return;
        }
        let candidate = self.points[self.points.len() - 1 - lag].period;
        self.finalized_through = Some(match self.finalized_through {
            Some(existing) => existing.max(candidate),
            None => candidate,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: Period,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForecastQuality {
    Normal,
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForecastModel {
    HoltLinear,
    HoltWintersAdditive,
}

/// Projection of one series; replaces any earlier forecast for the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub key: SeriesKey,
    pub generated_at: DateTime<Utc>,
    pub history_through: Period,
    pub latest_observed: u64,
    pub model: ForecastModel,
    pub quality: ForecastQuality,
    pub noise_ratio: f64,
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    pub fn horizon_end(&self) -> Option<&ForecastPoint> {
        self.points.last()
    }

    pub fn is_low_confidence(&self) -> bool {
        self.quality == ForecastQuality::LowConfidence
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GrowthScore {
    Ranked(f64),
    /// No historical demand to grow from.
    Unranked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub tag: String,
    pub growth: GrowthScore,
    pub projected: f64,
    pub latest_observed: u64,
    pub low_confidence: bool,
    pub forecasts: Vec<SeriesKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub skills: BTreeSet<String>,
    pub region: Option<RegionCode>,
    pub items: Vec<RecommendationItem>,
}

/// Lowercased alphanumeric words joined by single spaces.
pub fn fold_text(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable hash of normalized title, body, region and period bucket.
pub fn content_fingerprint(title: &str, body: &str, region: &RegionCode, period: Period) -> String {
    let mut hasher = Sha256::new();
    for part in [
        fold_text(title),
        fold_text(body),
        region.as_str().to_string(),
        period.to_string(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}
