//! # Loglens Storage
//!
//! Persistence contracts for the detection and clustering paths, plus
//! in-memory implementations.
//!
//! Guarantees the orchestrator relies on:
//! - Verdict history is append-only per log: at most one realtime-tier and
//!   one batch-tier verdict, the realtime slot never overwritten.
//! - Cluster generations commit atomically: readers see either the full
//!   previous generation or the full new one, never a mix.
//! - Readers and writers never cross-block between the real-time and
//!   batch paths.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod memory;

use async_trait::async_trait;
use loglens_core::types::{
    ClusterAssignment, ClusterMetadata, DetectionVerdict, LogRecord, RedactedLog, VerdictTier,
};
use loglens_core::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::{
    InMemoryClusterStore, InMemoryLogStore, InMemoryVectorStore, InMemoryVerdictStore,
};

/// A persisted log: the immutable raw record plus its redacted projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLog {
    pub record: LogRecord,
    pub redacted: RedactedLog,
}

/// Raw + redacted log persistence
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn put(&self, record: &LogRecord, redacted: &RedactedLog) -> Result<()>;

    async fn get(&self, log_id: Uuid) -> Result<Option<StoredLog>>;

    /// Most recent logs, newest first, optionally excluding one id
    /// (used to build validation context)
    async fn recent(&self, limit: usize, exclude: Option<Uuid>) -> Result<Vec<StoredLog>>;
}

/// Per-log anomaly verdict persistence
#[async_trait]
pub trait VerdictStore: Send + Sync {
    /// Record a verdict for its tier. The realtime slot is written once
    /// and kept; a new batch pass supersedes the previous batch verdict.
    async fn record(&self, verdict: DetectionVerdict, tier: VerdictTier) -> Result<()>;

    async fn realtime(&self, log_id: Uuid) -> Result<Option<DetectionVerdict>>;

    /// Full history for a log: `[realtime?, batch?]`
    async fn history(&self, log_id: Uuid) -> Result<Vec<DetectionVerdict>>;
}

/// Embedding vector persistence for the batch analysis window
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn put(&self, log_id: Uuid, vector: Vec<f32>) -> Result<()>;

    async fn get(&self, log_id: Uuid) -> Result<Option<Vec<f32>>>;

    /// The whole analysis window in insertion order (deterministic for
    /// seeded sampling)
    async fn all(&self) -> Result<Vec<(Uuid, Vec<f32>)>>;

    async fn len(&self) -> Result<usize>;
}

/// One batch run's complete output, committed as a unit
#[derive(Debug, Clone)]
pub struct ClusterGeneration {
    pub run_id: Uuid,
    pub assignments: Vec<ClusterAssignment>,
    pub metadata: Vec<ClusterMetadata>,
}

/// Cluster assignment/metadata persistence
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Atomically replace the previous generation. Partial results are
    /// never published; a failed run leaves the prior generation intact.
    async fn commit_run(&self, generation: ClusterGeneration) -> Result<()>;

    async fn current_run(&self) -> Result<Option<Uuid>>;

    async fn assignment(&self, log_id: Uuid) -> Result<Option<ClusterAssignment>>;

    /// Metadata for a cluster in the current generation
    async fn metadata(&self, cluster_id: u32) -> Result<Option<ClusterMetadata>>;

    /// Member log ids of a cluster in the current generation
    async fn members(&self, cluster_id: u32) -> Result<Vec<Uuid>>;
}
