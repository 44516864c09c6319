//! In-memory store implementations.
//!
//! Backed by `DashMap` for independent readers/writers; the cluster store
//! swaps whole generations behind a single `RwLock` so a long batch run
//! never blocks real-time reads for more than the swap itself.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use loglens_core::types::{
    ClusterAssignment, ClusterLabel, ClusterMetadata, DetectionVerdict, LogRecord, RedactedLog,
    VerdictTier,
};
use loglens_core::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ClusterGeneration, ClusterStore, LogStore, StoredLog, VectorStore, VerdictStore};

/// In-memory log store
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    logs: DashMap<Uuid, StoredLog>,
    order: RwLock<Vec<Uuid>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn put(&self, record: &LogRecord, redacted: &RedactedLog) -> Result<()> {
        let fresh = !self.logs.contains_key(&record.id);
        self.logs.insert(
            record.id,
            StoredLog {
                record: record.clone(),
                redacted: redacted.clone(),
            },
        );
        if fresh {
            self.order.write().unwrap().push(record.id);
        }
        Ok(())
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<StoredLog>> {
        Ok(self.logs.get(&log_id).map(|entry| entry.clone()))
    }

    async fn recent(&self, limit: usize, exclude: Option<Uuid>) -> Result<Vec<StoredLog>> {
        let order = self.order.read().unwrap();
        Ok(order
            .iter()
            .rev()
            .filter(|id| Some(**id) != exclude)
            .take(limit)
            .filter_map(|id| self.logs.get(id).map(|entry| entry.clone()))
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
struct VerdictSlots {
    realtime: Option<DetectionVerdict>,
    batch: Option<DetectionVerdict>,
}

/// In-memory verdict store enforcing the one-verdict-per-tier invariant
#[derive(Debug, Default)]
pub struct InMemoryVerdictStore {
    verdicts: DashMap<Uuid, VerdictSlots>,
}

impl InMemoryVerdictStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerdictStore for InMemoryVerdictStore {
    async fn record(&self, verdict: DetectionVerdict, tier: VerdictTier) -> Result<()> {
        let mut slots = self.verdicts.entry(verdict.log_id).or_default();
        match tier {
            VerdictTier::Realtime => {
                // Append-only: the first realtime verdict is authoritative
                if slots.realtime.is_some() {
                    warn!(log_id = %verdict.log_id, "realtime verdict already recorded, keeping original");
                } else {
                    slots.realtime = Some(verdict);
                }
            }
            VerdictTier::Batch => {
                // A fresh batch generation supersedes the previous one
                if slots.batch.is_some() {
                    debug!(log_id = %verdict.log_id, "superseding batch verdict from earlier run");
                }
                slots.batch = Some(verdict);
            }
        }
        Ok(())
    }

    async fn realtime(&self, log_id: Uuid) -> Result<Option<DetectionVerdict>> {
        Ok(self
            .verdicts
            .get(&log_id)
            .and_then(|slots| slots.realtime.clone()))
    }

    async fn history(&self, log_id: Uuid) -> Result<Vec<DetectionVerdict>> {
        Ok(self
            .verdicts
            .get(&log_id)
            .map(|slots| {
                slots
                    .realtime
                    .iter()
                    .chain(slots.batch.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory embedding vector store
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    vectors: DashMap<Uuid, Vec<f32>>,
    order: RwLock<Vec<Uuid>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn put(&self, log_id: Uuid, vector: Vec<f32>) -> Result<()> {
        let fresh = !self.vectors.contains_key(&log_id);
        self.vectors.insert(log_id, vector);
        if fresh {
            self.order.write().unwrap().push(log_id);
        }
        Ok(())
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<Vec<f32>>> {
        Ok(self.vectors.get(&log_id).map(|entry| entry.clone()))
    }

    async fn all(&self) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let order = self.order.read().unwrap();
        Ok(order
            .iter()
            .filter_map(|id| self.vectors.get(id).map(|v| (*id, v.clone())))
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.vectors.len())
    }
}

#[derive(Debug, Default)]
struct GenerationIndex {
    generation: Option<ClusterGeneration>,
    by_log: HashMap<Uuid, ClusterAssignment>,
    by_cluster: HashMap<u32, Vec<Uuid>>,
    metadata: HashMap<u32, ClusterMetadata>,
}

/// In-memory cluster store with atomic generation swap
#[derive(Debug, Default)]
pub struct InMemoryClusterStore {
    index: RwLock<GenerationIndex>,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn commit_run(&self, generation: ClusterGeneration) -> Result<()> {
        // Build the whole index before taking the write lock so the swap
        // is the only moment readers wait on
        let mut by_log = HashMap::with_capacity(generation.assignments.len());
        let mut by_cluster: HashMap<u32, Vec<Uuid>> = HashMap::new();
        for assignment in &generation.assignments {
            by_log.insert(assignment.log_id, assignment.clone());
            if let ClusterLabel::Member(cluster_id) = assignment.label {
                by_cluster.entry(cluster_id).or_default().push(assignment.log_id);
            }
        }
        let metadata = generation
            .metadata
            .iter()
            .map(|m| (m.cluster_id, m.clone()))
            .collect();

        let mut index = self.index.write().unwrap();
        debug!(
            run_id = %generation.run_id,
            assignments = generation.assignments.len(),
            clusters = generation.metadata.len(),
            "committing cluster generation"
        );
        *index = GenerationIndex {
            generation: Some(generation),
            by_log,
            by_cluster,
            metadata,
        };
        Ok(())
    }

    async fn current_run(&self) -> Result<Option<Uuid>> {
        Ok(self
            .index
            .read()
            .unwrap()
            .generation
            .as_ref()
            .map(|g| g.run_id))
    }

    async fn assignment(&self, log_id: Uuid) -> Result<Option<ClusterAssignment>> {
        Ok(self.index.read().unwrap().by_log.get(&log_id).cloned())
    }

    async fn metadata(&self, cluster_id: u32) -> Result<Option<ClusterMetadata>> {
        Ok(self.index.read().unwrap().metadata.get(&cluster_id).cloned())
    }

    async fn members(&self, cluster_id: u32) -> Result<Vec<Uuid>> {
        Ok(self
            .index
            .read()
            .unwrap()
            .by_cluster
            .get(&cluster_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loglens_core::types::{FastVerdict, LogLevel};

    fn verdict(log_id: Uuid, score: f64) -> DetectionVerdict {
        DetectionVerdict::fast(
            log_id,
            FastVerdict {
                score,
                is_anomaly: score > 0.5,
            },
        )
    }

    #[tokio::test]
    async fn realtime_slot_is_write_once() {
        let store = InMemoryVerdictStore::new();
        let log_id = Uuid::new_v4();

        store
            .record(verdict(log_id, 0.9), VerdictTier::Realtime)
            .await
            .unwrap();
        store
            .record(verdict(log_id, 0.1), VerdictTier::Realtime)
            .await
            .unwrap();

        let kept = store.realtime(log_id).await.unwrap().unwrap();
        assert_eq!(kept.score, 0.9);
        assert_eq!(store.history(log_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_verdict_appends_to_history() {
        let store = InMemoryVerdictStore::new();
        let log_id = Uuid::new_v4();

        store
            .record(verdict(log_id, 0.8), VerdictTier::Realtime)
            .await
            .unwrap();
        store
            .record(verdict(log_id, 0.95), VerdictTier::Batch)
            .await
            .unwrap();

        let history = store.history(log_id).await.unwrap();
        assert_eq!(history.len(), 2);
        // Realtime provenance preserved, batch appended
        assert_eq!(history[0].score, 0.8);
        assert_eq!(history[1].score, 0.95);
    }

    #[tokio::test]
    async fn generation_commit_supersedes_previous() {
        let store = InMemoryClusterStore::new();
        let log_id = Uuid::new_v4();

        let first_run = Uuid::new_v4();
        store
            .commit_run(ClusterGeneration {
                run_id: first_run,
                assignments: vec![ClusterAssignment {
                    log_id,
                    label: ClusterLabel::Member(0),
                }],
                metadata: vec![ClusterMetadata {
                    run_id: first_run,
                    cluster_id: 0,
                    size: 1,
                    centroid: vec![0.0],
                    representatives: vec![log_id],
                }],
            })
            .await
            .unwrap();

        let second_run = Uuid::new_v4();
        store
            .commit_run(ClusterGeneration {
                run_id: second_run,
                assignments: vec![ClusterAssignment {
                    log_id,
                    label: ClusterLabel::Outlier,
                }],
                metadata: vec![],
            })
            .await
            .unwrap();

        assert_eq!(store.current_run().await.unwrap(), Some(second_run));
        let assignment = store.assignment(log_id).await.unwrap().unwrap();
        assert!(assignment.label.is_outlier());
        // Old generation's metadata is gone, not merged
        assert!(store.metadata(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_excludes_and_orders() {
        let store = InMemoryLogStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let record = LogRecord::new(format!("log {i}"), None, LogLevel::Info);
            ids.push(record.id);
            store
                .put(&record, &RedactedLog::unredacted(format!("log {i}")))
                .await
                .unwrap();
        }

        let recent = store.recent(3, Some(ids[4])).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].record.message, "log 3");
        assert_eq!(recent[2].record.message, "log 1");
    }

    #[tokio::test]
    async fn vector_store_preserves_insertion_order() {
        let store = InMemoryVectorStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.put(a, vec![1.0]).await.unwrap();
        store.put(b, vec![2.0]).await.unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all[0].0, a);
        assert_eq!(all[1].0, b);
        assert_eq!(store.len().await.unwrap(), 2);
    }
}
