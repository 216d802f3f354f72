//! Batch orchestration: raw postings in, demand series and forecasts out.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use skillcast_adapters::{
    collect_window, load_pipeline_config, PostingSource, RegionLookup, StaticVocabularyProvider,
    TableRegionLookup, TimeWindow, VocabularyProvider, YamlVocabularyProvider,
};
use skillcast_core::{
    DemandSeries, Forecast, PipelineConfig, PipelineError, PostingCluster, RawPosting, Recommendation,
    RegionCode, SeriesKey, TaggedPosting, Vocabulary,
};
use skillcast_forecast::{Forecaster, InsightEngine};
use skillcast_storage::{
    BackoffPolicy, FileForecastStore, FileSeriesStore, ForecastStore, SeriesStore,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::config::SyncConfig;
use crate::dedup::Deduplicator;
use crate::extract::SkillExtractor;
use crate::normalize::Normalizer;
use crate::pool::WorkerPool;
use crate::report;

const SOURCE_PAGE_SIZE: usize = 200;

/// Per-record outcomes of a batch. Nothing counted here aborts the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityMetrics {
    pub received: usize,
    pub malformed: usize,
    pub untagged: usize,
    pub unresolved_regions: usize,
    pub clusters: usize,
    pub duplicates_merged: usize,
    pub contributions: usize,
    pub applied: usize,
    pub already_folded: usize,
    pub late_arrivals: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedPosting {
    pub source_id: String,
    pub source_native_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
    pub vocabulary_version: String,
    pub metrics: QualityMetrics,
    pub rejected: Vec<RejectedPosting>,
    pub touched_series: Vec<SeriesKey>,
    #[serde(skip)]
    pub clusters: Vec<PostingCluster>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastRunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub requested: usize,
    pub forecasted: Vec<SeriesKey>,
    pub low_confidence: usize,
    pub insufficient_history: Vec<SeriesKey>,
    pub missing_series: Vec<SeriesKey>,
}

/// Wires the stages together over injected collaborators. Configuration is
/// explicit and per instance; two pipelines never share mutable state.
pub struct SyncPipeline {
    config: PipelineConfig,
    vocabulary: Arc<dyn VocabularyProvider>,
    regions: Arc<dyn RegionLookup>,
    series: Arc<dyn SeriesStore>,
    forecasts: Arc<dyn ForecastStore>,
    pool: WorkerPool,
    reports_dir: Option<PathBuf>,
}

impl SyncPipeline {
    pub fn new(
        config: PipelineConfig,
        vocabulary: Arc<dyn VocabularyProvider>,
        regions: Arc<dyn RegionLookup>,
        series: Arc<dyn SeriesStore>,
        forecasts: Arc<dyn ForecastStore>,
    ) -> Self {
        let pool = WorkerPool::from(config.workers);
        Self {
            config,
            vocabulary,
            regions,
            series,
            forecasts,
            pool,
            reports_dir: None,
        }
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(dir.into());
        self
    }

    /// File-backed pipeline rooted at the directories in `sync`.
    pub async fn from_sync_config(sync: &SyncConfig) -> Result<Self> {
        let config = load_pipeline_config(&sync.config_path)
            .with_context(|| format!("loading {}", sync.config_path.display()))?;
        let vocabulary: Arc<dyn VocabularyProvider> = if sync.vocabulary_path.exists() {
            Arc::new(YamlVocabularyProvider::new(&sync.vocabulary_path))
        } else {
            warn!(path = %sync.vocabulary_path.display(), "vocabulary file missing; using builtin vocabulary");
            Arc::new(StaticVocabularyProvider::builtin())
        };
        let regions = if sync.regions_path.exists() {
            TableRegionLookup::from_yaml_file(&sync.regions_path)
                .with_context(|| format!("loading {}", sync.regions_path.display()))?
        } else {
            TableRegionLookup::new()
        };
        let series = FileSeriesStore::open(sync.series_path())
            .await
            .context("opening series store")?;
        let forecasts = FileForecastStore::open(sync.forecasts_path())
            .await
            .context("opening forecast store")?;
        Ok(Self::new(config, vocabulary, Arc::new(regions), Arc::new(series), Arc::new(forecasts))
            .with_reports_dir(sync.reports_dir()))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn reports_dir(&self) -> Option<&Path> {
        self.reports_dir.as_deref()
    }

    /// One vocabulary snapshot per run keeps every posting of a batch on the
    /// same version.
    pub fn snapshot_vocabulary(&self) -> Result<Vocabulary> {
        self.vocabulary.snapshot().context("snapshotting vocabulary")
    }

    /// Normalize, tag, deduplicate and aggregate one batch, committing all of
    /// its counts or none. Malformed postings are skipped and reported.
    pub async fn run_batch(
        &self,
        raws: &[RawPosting],
        vocabulary: &Vocabulary,
        as_of: DateTime<Utc>,
    ) -> Result<BatchReport, PipelineError> {
        if raws.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, postings = raws.len(), vocabulary = %vocabulary.version, "batch started");

        let normalizer = Normalizer::new(&self.config, Arc::clone(&self.regions), as_of);
        let extractor = SkillExtractor::new(vocabulary, &self.config.extract);
        let stage = Arc::new((normalizer, extractor));
        let results = self
            .pool
            .map(raws.to_vec(), move |raw| {
                let (normalizer, extractor) = &*stage;
                normalizer.normalize(&raw).map(|posting| {
                    let tags = extractor.extract(&posting);
                    TaggedPosting { posting, tags }
                })
            })
            .await?;

        let mut metrics = QualityMetrics {
            received: raws.len(),
            ..QualityMetrics::default()
        };
        let mut rejected = Vec::new();
        let mut tagged = Vec::new();
        for result in results {
            match result {
                Ok(posting) => {
                    if posting.tags.is_empty() {
                        metrics.untagged += 1;
                        debug!(%run_id, source = %posting.posting.source, "no vocabulary tags matched");
                    }
                    if !posting.posting.region.is_resolved() {
                        metrics.unresolved_regions += 1;
                    }
                    tagged.push(posting);
                }
                Err(PipelineError::MalformedInput {
                    source_id,
                    source_native_id,
                    reason,
                }) => {
                    warn!(%run_id, %source_id, %source_native_id, %reason, "skipping malformed posting");
                    metrics.malformed += 1;
                    rejected.push(RejectedPosting {
                        source_id,
                        source_native_id,
                        reason,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        let postings = tagged.len();
        let clusters = if tagged.is_empty() {
            Vec::new()
        } else {
            let plan = Deduplicator::new(self.config.dedup).plan(tagged);
            self.pool.cluster(plan).await?
        };
        metrics.clusters = clusters.len();
        metrics.duplicates_merged = postings - clusters.len();

        let aggregation = Aggregator::new(self.config.granularity, self.config.aggregate)
            .aggregate(&clusters, self.series.as_ref())
            .await?;
        metrics.contributions = aggregation.contributions;
        metrics.applied = aggregation.applied;
        metrics.already_folded = aggregation.already_folded;
        metrics.late_arrivals = aggregation.late_arrivals;

        let touched_series = clusters
            .iter()
            .flat_map(|c| {
                c.tag_names()
                    .into_iter()
                    .map(|tag| SeriesKey::new(tag, c.region.clone(), self.config.granularity))
                    .collect::<Vec<_>>()
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        info!(
            %run_id,
            received = metrics.received,
            malformed = metrics.malformed,
            untagged = metrics.untagged,
            clusters = metrics.clusters,
            applied = metrics.applied,
            "batch finished"
        );
        Ok(BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            as_of,
            vocabulary_version: vocabulary.version.clone(),
            metrics,
            rejected,
            touched_series,
            clusters,
        })
    }

    /// Series with no forecast yet, or whose history moved past the last one.
    pub async fn stale_keys(&self) -> Result<Vec<SeriesKey>, PipelineError> {
        let mut stale = Vec::new();
        for key in self.series.keys().await? {
            let Some(series) = self.series.history(&key).await? else {
                continue;
            };
            let fresh = match (self.forecasts.latest(&key).await?, series.last_period()) {
                (Some(forecast), Some(last)) => forecast.history_through >= last,
                (None, _) => false,
                (Some(_), None) => true,
            };
            if !fresh {
                stale.push(key);
            }
        }
        Ok(stale)
    }

    /// Forecast the given keys, or every stale series when `keys` is `None`.
    /// Series that are too short are reported rather than failing the run.
    pub async fn run_forecasts(
        &self,
        keys: Option<Vec<SeriesKey>>,
        generated_at: DateTime<Utc>,
    ) -> Result<ForecastRunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let keys = match keys {
            Some(keys) => keys,
            None => self.stale_keys().await?,
        };
        let mut histories = Vec::new();
        let mut missing_series = Vec::new();
        for key in &keys {
            match self.series.history(key).await? {
                Some(series) => histories.push(series),
                None => missing_series.push(key.clone()),
            }
        }

        let forecaster = Forecaster::new(self.config.forecast);
        let results = self
            .pool
            .map(histories, move |series: DemandSeries| forecaster.forecast(&series, generated_at))
            .await?;

        let mut report = ForecastRunReport {
            run_id,
            generated_at,
            requested: keys.len(),
            forecasted: Vec::new(),
            low_confidence: 0,
            insufficient_history: Vec::new(),
            missing_series,
        };
        for result in results {
            match result {
                Ok(forecast) => {
                    if forecast.is_low_confidence() {
                        report.low_confidence += 1;
                    }
                    report.forecasted.push(forecast.key.clone());
                    self.forecasts.replace(forecast).await?;
                }
                Err(PipelineError::InsufficientHistory { key, have, need }) => {
                    debug!(%run_id, %key, have, need, "not yet forecastable");
                    report.insufficient_history.push(key);
                }
                Err(other) => return Err(other),
            }
        }
        info!(
            %run_id,
            requested = report.requested,
            forecasted = report.forecasted.len(),
            low_confidence = report.low_confidence,
            insufficient = report.insufficient_history.len(),
            "forecast run finished"
        );
        Ok(report)
    }

    pub async fn series_history(&self, key: &SeriesKey) -> Result<Option<DemandSeries>, PipelineError> {
        Ok(self.series.history(key).await?)
    }

    pub async fn latest_forecast(&self, key: &SeriesKey) -> Result<Option<Forecast>, PipelineError> {
        Ok(self.forecasts.latest(key).await?)
    }

    pub async fn forecasts(&self) -> Result<Vec<Forecast>, PipelineError> {
        Ok(self.forecasts.all().await?)
    }

    /// Rank skills the caller does not have against the current forecasts.
    pub async fn recommend<S: AsRef<str>>(
        &self,
        skills: &[S],
        region: Option<&RegionCode>,
    ) -> Result<Recommendation, PipelineError> {
        let forecasts = self.forecasts.all().await?;
        let vocabulary = match self.vocabulary.snapshot() {
            Ok(v) => Some(v),
            Err(err) => {
                warn!(error = %err, "vocabulary unavailable; matching skills by canonical name only");
                None
            }
        };
        Ok(InsightEngine::new(self.config.insight).recommend(skills, region, &forecasts, vocabulary.as_ref()))
    }

    pub async fn write_batch_report(&self, batch: &BatchReport) -> Result<Option<PathBuf>> {
        let Some(root) = &self.reports_dir else {
            return Ok(None);
        };
        let mut series = Vec::new();
        for key in &batch.touched_series {
            if let Some(s) = self.series.history(key).await.context("reading series for report")? {
                series.push(s);
            }
        }
        report::write_batch_report(root, batch, &series).map(Some)
    }

    pub async fn write_forecast_report(&self, run: &ForecastRunReport) -> Result<Option<PathBuf>> {
        let Some(root) = &self.reports_dir else {
            return Ok(None);
        };
        let mut forecasts = Vec::new();
        for key in &run.forecasted {
            if let Some(f) = self.forecasts.latest(key).await.context("reading forecast for report")? {
                forecasts.push(f);
            }
        }
        report::write_forecast_report(root, run, &forecasts).map(Some)
    }

    /// Drain every source for `window`, then run the batch, retrying the whole
    /// batch with backoff on retryable failures.
    pub async fn ingest_window(
        &self,
        sources: &[Arc<dyn PostingSource>],
        window: &TimeWindow,
        backoff: &BackoffPolicy,
    ) -> Result<BatchReport> {
        let mut raws = Vec::new();
        for source in sources {
            let postings = collect_window(source.as_ref(), window, SOURCE_PAGE_SIZE)
                .await
                .with_context(|| format!("reading source {}", source.source_id()))?;
            raws.extend(postings);
        }
        let vocabulary = self.snapshot_vocabulary()?;
        let as_of = window
            .end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        let batch = backoff
            .retry("aggregate batch", || self.run_batch(&raws, &vocabulary, as_of))
            .await
            .context("running aggregation batch")?;
        if let Err(err) = self.write_batch_report(&batch).await {
            warn!(run_id = %batch.run_id, error = %err, "writing batch report failed");
        }
        Ok(batch)
    }

    /// Ingest the trailing window and re-forecast stale series.
    pub async fn refresh(
        &self,
        sources: &[Arc<dyn PostingSource>],
        window: &TimeWindow,
        backoff: &BackoffPolicy,
    ) -> Result<(BatchReport, ForecastRunReport)> {
        let batch = self.ingest_window(sources, window, backoff).await?;
        let forecasts = backoff
            .retry("forecast stale series", || self.run_forecasts(None, Utc::now()))
            .await
            .context("forecasting stale series")?;
        if let Err(err) = self.write_forecast_report(&forecasts).await {
            warn!(run_id = %forecasts.run_id, error = %err, "writing forecast report failed");
        }
        Ok((batch, forecasts))
    }
}

/// Postings sources for a scheduled run: every JSON file in the postings dir.
pub fn file_sources(dir: &Path) -> Result<Vec<Arc<dyn PostingSource>>> {
    let sources = skillcast_adapters::JsonFilePostingSource::open_dir(dir)
        .with_context(|| format!("opening posting sources in {}", dir.display()))?;
    Ok(sources
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn PostingSource>)
        .collect())
}

/// The trailing `days`-day window ending on `today`.
pub fn trailing_window(today: DateTime<Utc>, days: i64) -> TimeWindow {
    let end = today.date_naive();
    TimeWindow::new(end - Duration::days(days.max(1) - 1), end)
}

/// Cron-driven refresh; `None` when scheduling is disabled.
pub async fn maybe_build_scheduler(
    pipeline: Arc<SyncPipeline>,
    sync: &SyncConfig,
    backoff: BackoffPolicy,
) -> Result<Option<JobScheduler>> {
    if !sync.scheduler_enabled {
        return Ok(None);
    }
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let postings_dir = sync.postings_dir.clone();
    let window_days = sync.window_days;
    let job = Job::new_async(sync.sync_cron.as_str(), move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        let postings_dir = postings_dir.clone();
        Box::pin(async move {
            let window = trailing_window(Utc::now(), window_days);
            let outcome = match file_sources(&postings_dir) {
                Ok(sources) => pipeline.refresh(&sources, &window, &backoff).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok((batch, forecasts)) => info!(
                    run_id = %batch.run_id,
                    applied = batch.metrics.applied,
                    forecasted = forecasts.forecasted.len(),
                    "scheduled refresh finished"
                ),
                Err(err) => warn!(error = %err, "scheduled refresh failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {}", sync.sync_cron))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use skillcast_adapters::InMemoryPostingSource;
    use skillcast_core::{Granularity, GrowthScore};
    use skillcast_storage::{MemoryForecastStore, MemorySeriesStore};
    use tempfile::tempdir;

    fn pipeline() -> SyncPipeline {
        SyncPipeline::new(
            PipelineConfig::default(),
            Arc::new(StaticVocabularyProvider::builtin()),
            Arc::new(TableRegionLookup::new()),
            Arc::new(MemorySeriesStore::new()),
            Arc::new(MemoryForecastStore::new()),
        )
    }

    fn raw(source: &str, id: &str, title: &str, body: &str, location: &str, posted: &str) -> RawPosting {
        RawPosting {
            source_id: source.into(),
            source_native_id: id.into(),
            title: Some(title.into()),
            body: Some(body.into()),
            location: Some(location.into()),
            posted_at: Some(posted.into()),
            salary: None,
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 13, 12, 0, 0).unwrap()
    }

    fn key(tag: &str, region: &str) -> SeriesKey {
        SeriesKey::new(tag, RegionCode::new(region), Granularity::IsoWeek)
    }

    #[tokio::test]
    async fn cross_source_duplicates_count_once() {
        let p = pipeline();
        let body = "Build streaming pipelines in Python and Kafka.";
        let raws = vec![
            raw("board-a", "1", "Data Engineer", body, "Seattle, WA", "2026-03-10"),
            raw("board-b", "77", "Data Engineer", body, "Seattle, WA", "2026-03-11"),
            raw("board-a", "2", "", body, "Seattle, WA", "2026-03-11"),
        ];
        let vocab = p.snapshot_vocabulary().unwrap();
        let report = p.run_batch(&raws, &vocab, as_of()).await.unwrap();
        assert_eq!(report.metrics.received, 3);
        assert_eq!(report.metrics.malformed, 1);
        assert_eq!(report.rejected[0].source_native_id, "2");
        assert_eq!(report.metrics.clusters, 1);
        assert_eq!(report.metrics.duplicates_merged, 1);

        let python = p.series_history(&key("Python", "US-WA")).await.unwrap().unwrap();
        assert_eq!(python.latest_count(), Some(1));
        assert!(report.touched_series.contains(&key("Data Engineer", "US-WA")));
    }

    #[tokio::test]
    async fn retried_batches_do_not_double_count() {
        let p = pipeline();
        let raws = vec![raw("a", "1", "Rust Engineer", "Rust and Docker services.", "Berlin, Germany", "2026-03-09")];
        let vocab = p.snapshot_vocabulary().unwrap();
        p.run_batch(&raws, &vocab, as_of()).await.unwrap();
        let again = p.run_batch(&raws, &vocab, as_of()).await.unwrap();
        assert_eq!(again.metrics.applied, 0);
        assert_eq!(again.metrics.already_folded, again.metrics.contributions);
        let rust = p.series_history(&key("Rust", "DE")).await.unwrap().unwrap();
        assert_eq!(rust.latest_count(), Some(1));
    }

    #[tokio::test]
    async fn overlapping_window_with_a_new_duplicate_counts_once() {
        let p = pipeline();
        let body = "Build streaming pipelines in Python and Kafka.";
        let first = raw("board-a", "77", "Data Engineer", body, "Seattle, WA", "2026-03-10");
        let vocab = p.snapshot_vocabulary().unwrap();
        p.run_batch(std::slice::from_ref(&first), &vocab, as_of()).await.unwrap();

        // Next run re-reads the window; board-b:1 sorts ahead of board-a:77.
        let dup = raw("board-b", "1", "Data Engineer", body, "Seattle, WA", "2026-03-10");
        let report = p.run_batch(&[first, dup], &vocab, as_of()).await.unwrap();
        assert_eq!(report.metrics.clusters, 1);
        assert_eq!(report.metrics.applied, 0);
        assert_eq!(report.metrics.already_folded, report.metrics.contributions);
        let python = p.series_history(&key("Python", "US-WA")).await.unwrap().unwrap();
        assert_eq!(python.latest_count(), Some(1));
    }

    #[tokio::test]
    async fn empty_and_all_malformed_batches() {
        let p = pipeline();
        let vocab = p.snapshot_vocabulary().unwrap();
        let err = p.run_batch(&[], &vocab, as_of()).await.unwrap_err();
        assert_eq!(err, PipelineError::EmptyBatch);

        let junk = vec![raw("a", "1", "Engineer", "Body", "Austin, TX", "someday")];
        let report = p.run_batch(&junk, &vocab, as_of()).await.unwrap();
        assert_eq!(report.metrics.malformed, 1);
        assert_eq!(report.metrics.clusters, 0);
        assert!(report.touched_series.is_empty());
    }

    async fn seed_weeks(p: &SyncPipeline, weeks: u32) {
        let vocab = p.snapshot_vocabulary().unwrap();
        let start = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        for w in 0..weeks {
            let day = start + Duration::weeks(w as i64);
            let raws = (0..=w)
                .map(|n| {
                    raw(
                        "board",
                        &format!("{w}-{n}"),
                        &format!("Platform Engineer {n}"),
                        &format!("Team {n} in week {w} runs Kubernetes and Go."),
                        "Denver, CO",
                        &day.to_string(),
                    )
                })
                .collect::<Vec<_>>();
            p.run_batch(&raws, &vocab, day.and_hms_opt(23, 0, 0).unwrap().and_utc())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn stale_series_are_forecast_then_recommended() {
        let p = pipeline();
        seed_weeks(&p, 10).await;
        let k8s = key("Kubernetes", "US-CO");
        let history = p.series_history(&k8s).await.unwrap().unwrap();
        assert_eq!(history.points.len(), 10);

        let run = p.run_forecasts(None, as_of()).await.unwrap();
        assert!(run.forecasted.contains(&k8s));
        assert!(p.stale_keys().await.unwrap().is_empty());
        let forecast = p.latest_forecast(&k8s).await.unwrap().unwrap();
        assert_eq!(forecast.points.len(), p.config().forecast.horizon);

        let rec = p.recommend(&["golang"], None).await.unwrap();
        assert!(rec.items.iter().all(|i| i.tag != "Go"));
        let top = rec.items.iter().find(|i| i.tag == "Kubernetes").unwrap();
        assert!(matches!(top.growth, GrowthScore::Ranked(g) if g > 0.0));
    }

    #[tokio::test]
    async fn short_series_are_reported_not_failed() {
        let p = pipeline();
        seed_weeks(&p, 3).await;
        let run = p.run_forecasts(None, as_of()).await.unwrap();
        assert!(run.forecasted.is_empty());
        assert!(run.insufficient_history.contains(&key("Kubernetes", "US-CO")));

        let missing = p.run_forecasts(Some(vec![key("COBOL", "US-CO")]), as_of()).await.unwrap();
        assert_eq!(missing.missing_series, vec![key("COBOL", "US-CO")]);
    }

    #[tokio::test]
    async fn ingest_window_reads_sources_and_writes_reports() {
        let dir = tempdir().unwrap();
        let p = pipeline().with_reports_dir(dir.path());
        let source: Arc<dyn PostingSource> = Arc::new(InMemoryPostingSource::new(
            "board",
            vec![
                raw("board", "1", "SRE", "Terraform and AWS on call.", "Remote", "2026-03-10"),
                raw("board", "2", "SRE", "Terraform and AWS on call.", "Remote", "2025-01-01"),
            ],
        ));
        let window = TimeWindow::new(
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 13).unwrap(),
        );
        let batch = p.ingest_window(&[source], &window, &BackoffPolicy::default()).await.unwrap();
        assert_eq!(batch.metrics.received, 1);
        let run_dir = dir.path().join(batch.run_id.to_string());
        assert!(run_dir.join("run_summary.json").exists());
        assert!(run_dir.join("demand_series.parquet").exists());
        assert!(run_dir.join("manifest.json").exists());
    }

    #[test]
    fn trailing_window_is_inclusive() {
        let w = trailing_window(as_of(), 7);
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
        assert_eq!(w.end, NaiveDate::from_ymd_opt(2026, 3, 13).unwrap());
    }
}
