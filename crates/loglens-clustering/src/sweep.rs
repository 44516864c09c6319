//! Outlier validation sweep.
//!
//! Applies the semantic validator to each outlier from a batch run,
//! contrasting it against the nearest non-outlier cluster ("why did this
//! NOT fit pattern X"). One outlier's failure never aborts the sweep for
//! the rest: failures are isolated and aggregated into the run's error
//! count. Verdicts are only accumulated here; the engine commits them
//! with the rest of the run so a cancelled sweep discards its partial
//! results.

use std::sync::Arc;

use loglens_core::types::{
    ClusterContext, ClusterMetadata, ContextLog, DetectionMethod, DetectionVerdict, FastVerdict,
    ValidationOutcome,
};
use loglens_core::{Error, Result};
use loglens_detection::SemanticValidator;
use loglens_storage::LogStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::CancelHandle;

/// Samples shown from the contrast cluster
const CONTEXT_SAMPLE_CAP: usize = 5;

/// Result of one sweep; verdicts are committed by the engine
#[derive(Debug, Default)]
pub struct SweepReport {
    pub validated: usize,
    pub confirmed: usize,
    pub errors: usize,
    pub verdicts: Vec<DetectionVerdict>,
}

/// Validates batch outliers with cluster contrast context
pub struct OutlierSweep {
    validator: Arc<SemanticValidator>,
    logs: Arc<dyn LogStore>,
}

impl std::fmt::Debug for OutlierSweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutlierSweep").finish()
    }
}

impl OutlierSweep {
    pub fn new(validator: Arc<SemanticValidator>, logs: Arc<dyn LogStore>) -> Self {
        Self { validator, logs }
    }

    /// Validate up to `max_outliers` outliers. Cancellation between
    /// outliers returns `Cancelled`; accumulated verdicts are dropped by
    /// the caller.
    pub async fn run(
        &self,
        outliers: &[(Uuid, Vec<f32>)],
        clusters: &[ClusterMetadata],
        cancel: &CancelHandle,
        max_outliers: usize,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let to_validate = &outliers[..outliers.len().min(max_outliers)];

        if outliers.len() > to_validate.len() {
            info!(
                total = outliers.len(),
                validated = to_validate.len(),
                "outlier sweep capped"
            );
        }

        for (log_id, vector) in to_validate {
            if cancel.is_cancelled() {
                info!(validated = report.validated, "sweep cancelled, discarding partial results");
                return Err(Error::Cancelled);
            }

            match self.validate_outlier(*log_id, vector, clusters).await {
                Ok(verdict) => {
                    report.validated += 1;
                    match verdict.method {
                        DetectionMethod::LlmConfirmed => report.confirmed += 1,
                        // Validation could not complete for this outlier;
                        // isolate and continue
                        DetectionMethod::ExplanationOnly => report.errors += 1,
                        _ => {}
                    }
                    report.verdicts.push(verdict);
                }
                Err(e) => {
                    warn!(log_id = %log_id, error = %e, "outlier validation failed, continuing");
                    report.errors += 1;
                }
            }
        }

        info!(
            validated = report.validated,
            confirmed = report.confirmed,
            errors = report.errors,
            "outlier sweep complete"
        );
        Ok(report)
    }

    async fn validate_outlier(
        &self,
        log_id: Uuid,
        vector: &[f32],
        clusters: &[ClusterMetadata],
    ) -> Result<DetectionVerdict> {
        let stored = self
            .logs
            .get(log_id)
            .await?
            .ok_or_else(|| Error::storage(format!("outlier log {log_id} not found")))?;

        let context = match nearest_cluster(vector, clusters) {
            Some(cluster) => Some(self.build_context(cluster).await),
            None => None,
        };
        let context_logs = context
            .as_ref()
            .map(|c| c.samples.clone())
            .unwrap_or_default();

        // An outlier enters validation as a fully presumed anomaly; the
        // LLM then has the final say
        let prior = FastVerdict {
            score: 1.0,
            is_anomaly: true,
        };

        let outcome = self
            .validator
            .validate(
                &stored.record,
                &stored.redacted,
                &prior,
                &context_logs,
                context.as_ref(),
            )
            .await;

        Ok(verdict_from_outcome(log_id, prior, outcome))
    }

    /// Contrast context from a cluster's representative members
    async fn build_context(&self, cluster: &ClusterMetadata) -> ClusterContext {
        let mut samples = Vec::new();
        for rep_id in cluster.representatives.iter().take(CONTEXT_SAMPLE_CAP) {
            match self.logs.get(*rep_id).await {
                Ok(Some(stored)) => samples.push(ContextLog {
                    level: stored.record.level,
                    service: stored.record.service,
                    message: stored.redacted.text,
                }),
                Ok(None) => {}
                Err(e) => debug!(log_id = %rep_id, error = %e, "representative log unavailable"),
            }
        }
        ClusterContext {
            cluster_id: cluster.cluster_id,
            cluster_size: cluster.size,
            samples,
        }
    }
}

/// Nearest non-outlier cluster by euclidean centroid distance
fn nearest_cluster<'a>(
    vector: &[f32],
    clusters: &'a [ClusterMetadata],
) -> Option<&'a ClusterMetadata> {
    clusters
        .iter()
        .filter(|c| c.centroid.len() == vector.len())
        .map(|c| (euclidean(vector, &c.centroid), c))
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, c)| c)
}

fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn verdict_from_outcome(
    log_id: Uuid,
    prior: FastVerdict,
    outcome: ValidationOutcome,
) -> DetectionVerdict {
    match outcome {
        ValidationOutcome::Confirmed {
            reasoning,
            severity,
            ..
        } => DetectionVerdict {
            log_id,
            method: DetectionMethod::LlmConfirmed,
            is_anomaly: true,
            score: prior.score,
            reasoning: Some(reasoning),
            severity,
            degraded: false,
            created_at: chrono::Utc::now(),
        },
        ValidationOutcome::Rejected { reasoning, .. } => DetectionVerdict {
            log_id,
            method: DetectionMethod::LlmRejected,
            is_anomaly: false,
            score: prior.score,
            reasoning: Some(reasoning),
            severity: None,
            degraded: false,
            created_at: chrono::Utc::now(),
        },
        ValidationOutcome::ExplanationOnly { reasoning } => DetectionVerdict {
            log_id,
            method: DetectionMethod::ExplanationOnly,
            // The outlier presumption stands when validation was unavailable
            is_anomaly: prior.is_anomaly,
            score: prior.score,
            reasoning,
            severity: None,
            degraded: false,
            created_at: chrono::Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(cluster_id: u32, centroid: Vec<f32>) -> ClusterMetadata {
        ClusterMetadata {
            run_id: Uuid::new_v4(),
            cluster_id,
            size: 10,
            centroid,
            representatives: vec![],
        }
    }

    #[test]
    fn nearest_cluster_by_centroid_distance() {
        let clusters = vec![
            metadata(0, vec![0.0, 0.0]),
            metadata(1, vec![10.0, 10.0]),
            metadata(2, vec![5.0, 5.0]),
        ];

        let nearest = nearest_cluster(&[9.0, 9.0], &clusters).unwrap();
        assert_eq!(nearest.cluster_id, 1);

        let nearest = nearest_cluster(&[0.5, 0.1], &clusters).unwrap();
        assert_eq!(nearest.cluster_id, 0);
    }

    #[test]
    fn dimension_mismatch_is_skipped() {
        let clusters = vec![metadata(0, vec![0.0, 0.0, 0.0]), metadata(1, vec![1.0, 1.0])];
        let nearest = nearest_cluster(&[0.0, 0.0], &clusters).unwrap();
        assert_eq!(nearest.cluster_id, 1);
    }

    #[test]
    fn no_clusters_means_no_context() {
        assert!(nearest_cluster(&[1.0], &[]).is_none());
    }

    #[test]
    fn explanation_only_keeps_outlier_presumption() {
        let prior = FastVerdict {
            score: 1.0,
            is_anomaly: true,
        };
        let verdict = verdict_from_outcome(
            Uuid::new_v4(),
            prior,
            ValidationOutcome::ExplanationOnly { reasoning: None },
        );
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.method, DetectionMethod::ExplanationOnly);
    }

    #[test]
    fn rejection_overrides_outlier_presumption() {
        let prior = FastVerdict {
            score: 1.0,
            is_anomaly: true,
        };
        let verdict = verdict_from_outcome(
            Uuid::new_v4(),
            prior,
            ValidationOutcome::Rejected {
                confidence: 0.9,
                reasoning: "expected maintenance log".into(),
            },
        );
        assert!(!verdict.is_anomaly);
    }
}
