//! Series and forecast stores, plus the retry policy orchestrators use for whole batches.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use skillcast_core::{ClusterId, DemandSeries, Forecast, Period, PipelineError, SeriesKey, SourceRef};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "skillcast-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing store snapshot: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::StoreWriteFailure(err.to_string())
    }
}

/// One cluster's single count towards one series.
///
/// `members` lists every posting in the cluster. The fold ledger is keyed by
/// member, so a listing stays counted once even when a later batch regroups
/// it under a different representative.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Contribution {
    pub cluster_id: ClusterId,
    pub key: SeriesKey,
    pub period: Period,
    pub members: Vec<SourceRef>,
}

/// Everything an aggregation batch wants to land, committed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesBatch {
    pub batch_id: Uuid,
    pub contributions: Vec<Contribution>,
    pub finalization_lag: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub applied: usize,
    pub already_folded: usize,
    pub late: Vec<Contribution>,
    pub touched_series: usize,
}

#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Apply a batch atomically: either every contribution is recorded together
    /// with its fold-ledger entry, or nothing changes.
    async fn commit(&self, batch: &SeriesBatch) -> Result<CommitOutcome, StoreError>;
    async fn history(&self, key: &SeriesKey) -> Result<Option<DemandSeries>, StoreError>;
    async fn keys(&self) -> Result<Vec<SeriesKey>, StoreError>;
}

#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Supersede whatever forecast is stored for the same key.
    async fn replace(&self, forecast: Forecast) -> Result<(), StoreError>;
    async fn latest(&self, key: &SeriesKey) -> Result<Option<Forecast>, StoreError>;
    async fn all(&self) -> Result<Vec<Forecast>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SeriesSnapshot {
    series: Vec<DemandSeries>,
    folds: Vec<FoldRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct FoldRecord {
    member: SourceRef,
    key: SeriesKey,
}

#[derive(Debug, Clone, Default)]
struct SeriesState {
    series: BTreeMap<SeriesKey, DemandSeries>,
    folds: BTreeSet<FoldRecord>,
}

impl SeriesState {
    fn from_snapshot(snapshot: SeriesSnapshot) -> Self {
        Self {
            series: snapshot
                .series
                .into_iter()
                .map(|s| (s.key.clone(), s))
                .collect(),
            folds: snapshot.folds.into_iter().collect(),
        }
    }

    fn to_snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            series: self.series.values().cloned().collect(),
            folds: self.folds.iter().cloned().collect(),
        }
    }

    fn is_folded(&self, member: &SourceRef, key: &SeriesKey) -> bool {
        self.folds.contains(&FoldRecord {
            member: member.clone(),
            key: key.clone(),
        })
    }

    fn record_folds(&mut self, c: &Contribution) {
        for member in &c.members {
            self.folds.insert(FoldRecord {
                member: member.clone(),
                key: c.key.clone(),
            });
        }
    }

    /// Produce the post-commit state without touching `self`.
    fn apply(&self, batch: &SeriesBatch) -> (SeriesState, CommitOutcome) {
        let mut next = self.clone();
        let mut outcome = CommitOutcome::default();
        let mut touched = BTreeSet::new();

        for c in &batch.contributions {
            // Any member already counted for this key means the listing is;
            // newly seen members inherit that fold.
            if c.members.iter().any(|m| next.is_folded(m, &c.key)) {
                next.record_folds(c);
                outcome.already_folded += 1;
                continue;
            }
            let series = next
                .series
                .entry(c.key.clone())
                .or_insert_with(|| DemandSeries::new(c.key.clone()));
            match series.add(c.period, 1) {
                Ok(()) => {
                    next.record_folds(c);
                    touched.insert(c.key.clone());
                    outcome.applied += 1;
                }
                Err(late) => {
                    debug!(
                        key = %c.key,
                        period = %late.period,
                        finalized_through = %late.finalized_through,
                        "contribution targets a finalized period"
                    );
                    outcome.late.push(c.clone());
                }
            }
        }

        for key in &touched {
            if let Some(series) = next.series.get_mut(key) {
                series.finalize(batch.finalization_lag);
            }
        }
        // A late contribution may have created an empty series entry.
        next.series.retain(|_, s| !s.points.is_empty());
        outcome.touched_series = touched.len();
        (next, outcome)
    }
}

#[derive(Debug, Default)]
pub struct MemorySeriesStore {
    state: RwLock<SeriesState>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeriesStore for MemorySeriesStore {
    async fn commit(&self, batch: &SeriesBatch) -> Result<CommitOutcome, StoreError> {
        let mut state = self.state.write().await;
        let (next, outcome) = state.apply(batch);
        *state = next;
        Ok(outcome)
    }

    async fn history(&self, key: &SeriesKey) -> Result<Option<DemandSeries>, StoreError> {
        Ok(self.state.read().await.series.get(key).cloned())
    }

    async fn keys(&self) -> Result<Vec<SeriesKey>, StoreError> {
        Ok(self.state.read().await.series.keys().cloned().collect())
    }
}

/// JSON-snapshot series store. A commit only becomes visible after the new
/// snapshot has been atomically renamed into place.
#[derive(Debug)]
pub struct FileSeriesStore {
    path: PathBuf,
    state: RwLock<SeriesState>,
}

impl FileSeriesStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot: SeriesSnapshot = read_json_or_default(&path).await?;
        Ok(Self {
            path,
            state: RwLock::new(SeriesState::from_snapshot(snapshot)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SeriesStore for FileSeriesStore {
    async fn commit(&self, batch: &SeriesBatch) -> Result<CommitOutcome, StoreError> {
        let mut state = self.state.write().await;
        let (next, outcome) = state.apply(batch);
        write_json_atomic(&self.path, &next.to_snapshot()).await?;
        *state = next;
        Ok(outcome)
    }

    async fn history(&self, key: &SeriesKey) -> Result<Option<DemandSeries>, StoreError> {
        Ok(self.state.read().await.series.get(key).cloned())
    }

    async fn keys(&self) -> Result<Vec<SeriesKey>, StoreError> {
        Ok(self.state.read().await.series.keys().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryForecastStore {
    forecasts: RwLock<BTreeMap<SeriesKey, Forecast>>,
}

impl MemoryForecastStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForecastStore for MemoryForecastStore {
    async fn replace(&self, forecast: Forecast) -> Result<(), StoreError> {
        self.forecasts
            .write()
            .await
            .insert(forecast.key.clone(), forecast);
        Ok(())
    }

    async fn latest(&self, key: &SeriesKey) -> Result<Option<Forecast>, StoreError> {
        Ok(self.forecasts.read().await.get(key).cloned())
    }

    async fn all(&self) -> Result<Vec<Forecast>, StoreError> {
        Ok(self.forecasts.read().await.values().cloned().collect())
    }
}

#[derive(Debug)]
pub struct FileForecastStore {
    path: PathBuf,
    forecasts: RwLock<BTreeMap<SeriesKey, Forecast>>,
}

impl FileForecastStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let stored: Vec<Forecast> = read_json_or_default(&path).await?;
        Ok(Self {
            path,
            forecasts: RwLock::new(stored.into_iter().map(|f| (f.key.clone(), f)).collect()),
        })
    }
}

#[async_trait]
impl ForecastStore for FileForecastStore {
    async fn replace(&self, forecast: Forecast) -> Result<(), StoreError> {
        let mut forecasts = self.forecasts.write().await;
        let mut next = forecasts.clone();
        next.insert(forecast.key.clone(), forecast);
        write_json_atomic(&self.path, &next.values().collect::<Vec<_>>()).await?;
        *forecasts = next;
        Ok(())
    }

    async fn latest(&self, key: &SeriesKey) -> Result<Option<Forecast>, StoreError> {
        Ok(self.forecasts.read().await.get(key).cloned())
    }

    async fn all(&self) -> Result<Vec<Forecast>, StoreError> {
        Ok(self.forecasts.read().await.values().cloned().collect())
    }
}

async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !fs::try_exists(path)
        .await
        .map_err(|e| StoreError::io(format!("checking {}", path.display()), e))?
    {
        return Ok(T::default());
    }
    let bytes = fs::read(path)
        .await
        .map_err(|e| StoreError::io(format!("reading {}", path.display()), e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write JSON through a uniquely named temp file and rename it over `path`.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .map_err(|e| StoreError::io(format!("creating store directory {}", parent.display()), e))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .map_err(|e| StoreError::io(format!("opening temp file {}", temp_path.display()), e))?;
    let written = async {
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::io(format!("writing temp file {}", temp_path.display()), err));
    }

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::io(
            format!("renaming {} -> {}", temp_path.display(), path.display()),
            err,
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }

    /// Re-run a whole batch while it fails with a retryable error.
    pub async fn retry<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(%label, attempt, ?delay, error = %err, "batch failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
