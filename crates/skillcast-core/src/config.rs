//! Run configuration threaded explicitly through every stage.

use serde::{Deserialize, Serialize};

use crate::Granularity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub granularity: Granularity,
    pub normalize: NormalizeConfig,
    pub extract: ExtractConfig,
    pub dedup: DedupConfig,
    pub aggregate: AggregateConfig,
    pub forecast: ForecastConfig,
    pub insight: InsightConfig,
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Lines containing any of these (case-insensitive) are dropped from bodies.
    pub boilerplate_phrases: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            boilerplate_phrases: vec![
                "equal opportunity employer".into(),
                "apply now".into(),
                "click here to apply".into(),
                "share this job".into(),
                "see more jobs".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Fuzzy matches below this similarity are discarded.
    pub min_fuzzy_confidence: f64,
    /// Vocabulary terms shorter than this are only ever matched exactly.
    pub fuzzy_min_term_len: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_fuzzy_confidence: 0.85,
            fuzzy_min_term_len: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub similarity_threshold: f64,
    pub window_days: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            window_days: 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Periods further than this behind a series' latest period are finalized.
    pub finalization_lag: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self { finalization_lag: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub min_history: usize,
    pub horizon: usize,
    /// Normal quantile used for interval half-widths (1.96 ~ 95%).
    pub z_score: f64,
    /// Residual std-dev / mean above which a forecast is low confidence.
    pub cv_ceiling: f64,
    pub season_length: Option<usize>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history: 8,
            horizon: 4,
            z_score: 1.96,
            cv_ceiling: 0.5,
            season_length: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InsightConfig {
    /// Cap on ranked items. Unranked tags are always returned after them.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// `None` sizes the pool to the available cores.
    pub pool_size: Option<usize>,
    pub chunk_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            chunk_size: 64,
        }
    }
}

impl WorkerConfig {
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1)
    }
}
