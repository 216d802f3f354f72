//! Posting-to-series pipeline: normalize, tag, deduplicate, aggregate, then
//! forecast and recommend over the stored series.

pub mod aggregate;
pub mod config;
pub mod dedup;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod pool;
pub mod report;

pub use aggregate::{AggregationReport, Aggregator};
pub use config::SyncConfig;
pub use dedup::{DedupPlan, Deduplicator, UnionFind};
pub use extract::{ExactMatcher, FuzzyMatcher, HybridMatcher, MatchCandidate, SkillExtractor, SkillMatcher};
pub use normalize::Normalizer;
pub use pipeline::{
    file_sources, maybe_build_scheduler, trailing_window, BatchReport, ForecastRunReport, QualityMetrics,
    RejectedPosting, SyncPipeline,
};
pub use pool::WorkerPool;

pub const CRATE_NAME: &str = "skillcast-sync";

/// Build the file-backed pipeline from the environment and run one ingest
/// plus stale-forecast refresh over the trailing window.
pub async fn run_sync_once_from_env() -> anyhow::Result<(BatchReport, ForecastRunReport)> {
    let config = SyncConfig::from_env();
    let pipeline = SyncPipeline::from_sync_config(&config).await?;
    let sources = file_sources(&config.postings_dir)?;
    let window = trailing_window(chrono::Utc::now(), config.window_days);
    pipeline
        .refresh(&sources, &window, &skillcast_storage::BackoffPolicy::default())
        .await
}
