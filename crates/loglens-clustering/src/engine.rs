//! Batch clustering engine.
//!
//! Gathers the embedding window, samples it reproducibly when it exceeds
//! the configured cap, runs the density clustering backend, derives the
//! partition and per-cluster metadata, validates outliers, and commits
//! the whole generation atomically. A backend failure or cancellation
//! publishes nothing; the previous generation's labels stay live.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use loglens_core::config::ClusteringConfig;
use loglens_core::traits::{ClusteringBackend, ClusteringParams};
use loglens_core::types::{
    ClusterAssignment, ClusterLabel, ClusterMetadata, RunSummary, VerdictTier,
};
use loglens_core::{Error, Result};
use loglens_storage::{ClusterGeneration, ClusterStore, VectorStore, VerdictStore};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::sweep::OutlierSweep;

/// Cooperative cancellation for long batch runs
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-run overrides of the configured clustering parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusteringRunParams {
    pub min_cluster_size: Option<usize>,
    pub min_samples: Option<usize>,
    pub sample_size: Option<usize>,
    pub cluster_selection_epsilon: Option<f64>,
    pub seed: Option<u64>,
    /// Skip the outlier validation sweep (clustering only)
    #[serde(default)]
    pub skip_validation: bool,
}

/// Periodic batch clustering orchestrator
pub struct BatchClusteringEngine {
    backend: Arc<dyn ClusteringBackend>,
    vectors: Arc<dyn VectorStore>,
    clusters: Arc<dyn ClusterStore>,
    verdicts: Arc<dyn VerdictStore>,
    sweep: OutlierSweep,
    config: ClusteringConfig,
}

impl std::fmt::Debug for BatchClusteringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchClusteringEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl BatchClusteringEngine {
    pub fn new(
        backend: Arc<dyn ClusteringBackend>,
        vectors: Arc<dyn VectorStore>,
        clusters: Arc<dyn ClusterStore>,
        verdicts: Arc<dyn VerdictStore>,
        sweep: OutlierSweep,
        config: ClusteringConfig,
    ) -> Self {
        Self {
            backend,
            vectors,
            clusters,
            verdicts,
            sweep,
            config,
        }
    }

    /// Execute one batch run: cluster, validate outliers, commit.
    ///
    /// Nothing is published until the run completes; cancellation or a
    /// backend failure leaves the prior generation intact and surfaces to
    /// the scheduler as a run-level error.
    pub async fn run(
        &self,
        params: &ClusteringRunParams,
        cancel: &CancelHandle,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();

        let min_cluster_size = params
            .min_cluster_size
            .unwrap_or(self.config.min_cluster_size);
        let min_samples = params.min_samples.unwrap_or(self.config.min_samples);
        let sample_size = params.sample_size.or(self.config.sample_size);
        let epsilon = params
            .cluster_selection_epsilon
            .unwrap_or(self.config.cluster_selection_epsilon);
        let seed = params.seed.unwrap_or(self.config.sampling_seed);

        info!(
            run_id = %run_id,
            min_cluster_size,
            min_samples,
            ?sample_size,
            "starting batch clustering run"
        );

        let window = self.vectors.all().await?;
        let analyzed = window.len();

        if analyzed < 2 {
            info!(run_id = %run_id, analyzed, "not enough embeddings to cluster");
            return Ok(RunSummary {
                run_id,
                n_clusters: 0,
                n_outliers: 0,
                analyzed,
                sampled: 0,
                validated: 0,
                confirmed: 0,
                validation_errors: 0,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        // Uniform, seed-reproducible sampling when the window exceeds the cap
        let window = match sample_size {
            Some(cap) if analyzed > cap => {
                debug!(run_id = %run_id, analyzed, cap, seed, "sampling window");
                let mut rng = StdRng::seed_from_u64(seed);
                let mut indices = sample(&mut rng, analyzed, cap).into_vec();
                indices.sort_unstable();
                indices.into_iter().map(|i| window[i].clone()).collect()
            }
            _ => window,
        };
        let sampled = window.len();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let vectors: Vec<Vec<f32>> = window.iter().map(|(_, v)| v.clone()).collect();
        let labels = self
            .backend
            .cluster(
                &vectors,
                &ClusteringParams {
                    min_cluster_size,
                    min_samples,
                    cluster_selection_epsilon: epsilon,
                },
            )
            .await?;

        if labels.len() != window.len() {
            return Err(Error::clustering(format!(
                "{} labels for {} vectors",
                labels.len(),
                window.len()
            )));
        }

        // Partition: every sampled log lands in exactly one cluster or
        // the outlier set
        let assignments: Vec<ClusterAssignment> = window
            .iter()
            .zip(labels.iter())
            .map(|((log_id, _), label)| ClusterAssignment {
                log_id: *log_id,
                label: ClusterLabel::from_raw(*label),
            })
            .collect();

        let metadata = self.compute_metadata(run_id, &window, &labels);
        let outliers: Vec<(Uuid, Vec<f32>)> = window
            .iter()
            .zip(labels.iter())
            .filter(|(_, label)| **label < 0)
            .map(|((id, v), _)| (*id, v.clone()))
            .collect();

        let n_clusters = metadata.len();
        let n_outliers = outliers.len();
        info!(
            run_id = %run_id,
            n_clusters,
            n_outliers,
            outlier_pct = n_outliers as f64 / sampled as f64 * 100.0,
            "clustering complete"
        );

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Validate outliers before anything is published so a cancelled
        // sweep discards its partial verdicts along with the generation
        let report = if params.skip_validation {
            debug!(run_id = %run_id, "outlier validation skipped by request");
            crate::sweep::SweepReport::default()
        } else {
            self.sweep
                .run(
                    &outliers,
                    &metadata,
                    cancel,
                    self.config.max_validated_outliers,
                )
                .await?
        };

        self.clusters
            .commit_run(ClusterGeneration {
                run_id,
                assignments,
                metadata,
            })
            .await?;

        for verdict in &report.verdicts {
            self.verdicts
                .record(verdict.clone(), VerdictTier::Batch)
                .await?;
        }

        let summary = RunSummary {
            run_id,
            n_clusters,
            n_outliers,
            analyzed,
            sampled,
            validated: report.validated,
            confirmed: report.confirmed,
            validation_errors: report.errors,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(run_id = %run_id, ?summary, "batch run committed");
        Ok(summary)
    }

    /// Size, centroid and bounded representative sample per non-outlier
    /// cluster
    fn compute_metadata(
        &self,
        run_id: Uuid,
        window: &[(Uuid, Vec<f32>)],
        labels: &[i32],
    ) -> Vec<ClusterMetadata> {
        let mut clusters: std::collections::BTreeMap<u32, Vec<usize>> =
            std::collections::BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            if *label >= 0 {
                clusters.entry(*label as u32).or_default().push(i);
            }
        }

        clusters
            .into_iter()
            .map(|(cluster_id, members)| {
                let dims = window[members[0]].1.len();
                let mut centroid = vec![0.0f32; dims];
                for &i in &members {
                    for (c, v) in centroid.iter_mut().zip(window[i].1.iter()) {
                        *c += v;
                    }
                }
                let count = members.len() as f32;
                for c in centroid.iter_mut() {
                    *c /= count;
                }

                let representatives = members
                    .iter()
                    .take(self.config.representative_cap)
                    .map(|&i| window[i].0)
                    .collect();

                ClusterMetadata {
                    run_id,
                    cluster_id,
                    size: members.len(),
                    centroid,
                    representatives,
                }
            })
            .collect()
    }
}
