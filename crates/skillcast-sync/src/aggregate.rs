//! Folding clusters into per-(tag, region) demand series.

use std::collections::BTreeSet;

use serde::Serialize;
use skillcast_core::{AggregateConfig, Granularity, PipelineError, PostingCluster, SeriesKey};
use skillcast_storage::{Contribution, SeriesBatch, SeriesStore};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    pub batch_id: Uuid,
    pub contributions: usize,
    pub applied: usize,
    pub already_folded: usize,
    pub late_arrivals: usize,
    pub touched_series: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    granularity: Granularity,
    finalization_lag: usize,
}

impl Aggregator {
    pub fn new(granularity: Granularity, config: AggregateConfig) -> Self {
        Self {
            granularity,
            finalization_lag: config.finalization_lag,
        }
    }

    /// One contribution per (cluster, tag), however many members carry the tag.
    pub fn build_batch(&self, clusters: &[PostingCluster]) -> SeriesBatch {
        let contributions = clusters
            .iter()
            .flat_map(|cluster| {
                let mut members = cluster
                    .members
                    .iter()
                    .map(|m| m.posting.source.clone())
                    .collect::<Vec<_>>();
                members.sort();
                cluster.tag_names().into_iter().map(move |tag| Contribution {
                    cluster_id: cluster.id,
                    key: SeriesKey::new(tag, cluster.region.clone(), self.granularity),
                    period: cluster.period(),
                    members: members.clone(),
                })
            })
            .collect::<BTreeSet<_>>();
        SeriesBatch {
            batch_id: Uuid::new_v4(),
            contributions: contributions.into_iter().collect(),
            finalization_lag: self.finalization_lag,
        }
    }

    /// Commit every count for `clusters` as a single unit. A store failure
    /// leaves the store untouched and is reported as retryable.
    pub async fn aggregate(
        &self,
        clusters: &[PostingCluster],
        store: &dyn SeriesStore,
    ) -> Result<AggregationReport, PipelineError> {
        let batch = self.build_batch(clusters);
        let outcome = store.commit(&batch).await?;
        for late in &outcome.late {
            warn!(
                batch_id = %batch.batch_id,
                cluster_id = %late.cluster_id,
                key = %late.key,
                period = %late.period,
                "late arrival for finalized period skipped"
            );
        }
        info!(
            batch_id = %batch.batch_id,
            contributions = batch.contributions.len(),
            applied = outcome.applied,
            already_folded = outcome.already_folded,
            "aggregation batch committed"
        );
        Ok(AggregationReport {
            batch_id: batch.batch_id,
            contributions: batch.contributions.len(),
            applied: outcome.applied,
            already_folded: outcome.already_folded,
            late_arrivals: outcome.late.len(),
            touched_series: outcome.touched_series,
        })
    }
}
