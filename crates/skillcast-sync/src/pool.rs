//! Bounded blocking worker pool for the CPU-heavy stages.

use std::ops::Range;
use std::sync::Arc;

use skillcast_core::{PipelineError, PostingCluster, WorkerConfig};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tracing::debug;

use crate::dedup::{DedupPlan, UnionFind};

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    chunk_size: usize,
}

impl From<WorkerConfig> for WorkerPool {
    fn from(config: WorkerConfig) -> Self {
        Self::new(config.effective_pool_size(), config.chunk_size)
    }
}

impl WorkerPool {
    pub fn new(workers: usize, chunk_size: usize) -> Self {
        Self {
            workers: workers.max(1),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to every item, `chunk_size` items per blocking task and at
    /// most `workers` tasks in flight. Output order matches input order.
    pub async fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>, PipelineError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::new();
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let chunk = items.by_ref().take(self.chunk_size).collect::<Vec<_>>();
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|err| PipelineError::WorkerInterrupted(err.to_string()))?;
            let f = Arc::clone(&f);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                chunk.into_iter().map(|item| f(item)).collect::<Vec<_>>()
            }));
        }
        debug!(tasks = handles.len(), workers = self.workers, "worker pool dispatched");

        let mut out = Vec::new();
        for handle in handles {
            out.extend(handle.await.map_err(interrupted)?);
        }
        Ok(out)
    }

    /// Parallel candidate scoring with a single merge writer. Workers only
    /// read the plan and send pairs; one task owns the union-find.
    pub async fn cluster(&self, plan: DedupPlan) -> Result<Vec<PostingCluster>, PipelineError> {
        let len = plan.len();
        let plan = Arc::new(plan);
        let (tx, mut rx) = mpsc::channel::<Vec<(usize, usize)>>(self.workers * 2);

        let writer = tokio::spawn(async move {
            let mut merges = UnionFind::new(len);
            let mut merged = 0usize;
            while let Some(pairs) = rx.recv().await {
                for (a, b) in pairs {
                    if merges.union(a, b) {
                        merged += 1;
                    }
                }
            }
            debug!(merged, "merge writer drained");
            merges
        });

        tx.send(plan.fingerprint_pairs())
            .await
            .map_err(|err| PipelineError::WorkerInterrupted(err.to_string()))?;

        let ranges = (0..len)
            .step_by(self.chunk_size)
            .map(|start| start..(start + self.chunk_size).min(len))
            .collect::<Vec<Range<usize>>>();
        let scorer = Arc::clone(&plan);
        let sender = tx.clone();
        let sent = self
            .map(ranges, move |anchors| sender.blocking_send(scorer.candidate_pairs(anchors)).is_ok())
            .await?;
        drop(tx);

        let merges = writer.await.map_err(interrupted)?;
        if sent.iter().any(|ok| !ok) {
            return Err(PipelineError::WorkerInterrupted("merge writer stopped early".into()));
        }
        let plan = Arc::try_unwrap(plan).unwrap_or_else(|shared| (*shared).clone());
        Ok(plan.assemble(merges))
    }
}

fn interrupted(err: JoinError) -> PipelineError {
    match err.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(err) => PipelineError::WorkerInterrupted(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillcast_core::DedupConfig;

    use crate::dedup::tests::tagged;
    use crate::dedup::Deduplicator;

    #[tokio::test]
    async fn map_preserves_input_order() {
        let pool = WorkerPool::new(3, 2);
        let out = pool.map((0..11).collect::<Vec<u32>>(), |n| n * 10).await.unwrap();
        assert_eq!(out, (0..11).map(|n| n * 10).collect::<Vec<_>>());
        assert!(pool.map(Vec::<u32>::new(), |n| n).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn parallel_clustering_matches_sequential() {
        let body = "Operate Postgres clusters, write Go services and tune SQL queries.";
        let mut postings = Vec::new();
        for day in 1..=9u32 {
            postings.push(tagged("a", &format!("{day}"), "Database Reliability Engineer", body, "US-TX", day));
            postings.push(tagged("b", &format!("x{day}"), "Line Cook", "Prep and cook meals.", "US-TX", day));
        }
        let dedup = Deduplicator::new(DedupConfig::default());
        let sequential = dedup.cluster(postings.clone());
        let parallel = WorkerPool::new(4, 3).cluster(dedup.plan(postings)).await.unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.len(), 2);
    }
}
