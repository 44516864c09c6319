//! Real-time detection pipeline.
//!
//! Per-log orchestration: redact → embed (cache/budget-checked) →
//! fast-score → escalate → validate → persist. Invocations for different
//! logs are fully independent; the only shared mutable state is the
//! budget guard, the embedding cache and the stores.
//!
//! Every submitted log yields a verdict. Stage failures degrade the
//! verdict instead of propagating: redaction failure proceeds with raw
//! text, a missing embedding skips all LLM paths, a dead scorer skips
//! the fast tier and escalation entirely. No external call is made more
//! than once per invocation; retries belong to the transport layer.

use std::sync::Arc;

use loglens_core::cache::EmbeddingCache;
use loglens_core::config::DetectionConfig;
use loglens_core::traits::Redactor;
use loglens_core::types::{
    ContextLog, DetectionMethod, DetectionVerdict, FastVerdict, FeatureVector, LogRecord,
    RedactedLog, ValidationOutcome, VerdictTier,
};
use loglens_core::Result;
use loglens_storage::{LogStore, VectorStore, VerdictStore};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::escalation::should_escalate;
use crate::scorer::FastScorer;
use crate::validator::SemanticValidator;

/// Pipeline stages, traced per log for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Ingested,
    Redacted,
    Embedded,
    FastScored,
    Escalated,
    Validated,
    Persisted,
    PersistedDegraded,
}

impl Stage {
    fn advance(&mut self, next: Stage, log_id: Uuid) {
        debug!(log_id = %log_id, from = ?self, to = ?next, "pipeline stage");
        *self = next;
    }
}

/// Running pipeline statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineStats {
    pub invocations: u64,
    pub anomalies: u64,
    pub escalations: u64,
    pub llm_confirmed: u64,
    pub llm_rejected: u64,
    pub explanation_only: u64,
    pub degraded: u64,
    pub avg_processing_ms: f64,
}

/// Per-log real-time detection orchestrator
pub struct RealTimePipeline {
    redactor: Arc<dyn Redactor>,
    cache: Arc<EmbeddingCache>,
    scorer: FastScorer,
    validator: Arc<SemanticValidator>,
    logs: Arc<dyn LogStore>,
    verdicts: Arc<dyn VerdictStore>,
    vectors: Arc<dyn VectorStore>,
    config: DetectionConfig,
    stats: Arc<RwLock<PipelineStats>>,
}

impl std::fmt::Debug for RealTimePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTimePipeline")
            .field("config", &self.config)
            .finish()
    }
}

impl RealTimePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        redactor: Arc<dyn Redactor>,
        cache: Arc<EmbeddingCache>,
        scorer: FastScorer,
        validator: Arc<SemanticValidator>,
        logs: Arc<dyn LogStore>,
        verdicts: Arc<dyn VerdictStore>,
        vectors: Arc<dyn VectorStore>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            redactor,
            cache,
            scorer,
            validator,
            logs,
            verdicts,
            vectors,
            config,
            stats: Arc::new(RwLock::new(PipelineStats::default())),
        }
    }

    /// Process one log through the tiered pipeline and persist its verdict.
    ///
    /// Idempotent: a record that already has a realtime verdict is returned
    /// as-is without touching any provider, so resubmission cannot
    /// double-spend budget or re-run validation.
    pub async fn submit_log(&self, record: LogRecord) -> Result<DetectionVerdict> {
        if let Some(existing) = self.verdicts.realtime(record.id).await? {
            debug!(log_id = %record.id, "realtime verdict exists, returning it");
            return Ok(existing);
        }

        let start = std::time::Instant::now();
        let mut stage = Stage::Ingested;
        let mut degraded = false;

        // Redaction precedes embedding and storage so the raw sensitive
        // text never reaches the providers where avoidable
        let redacted = match self.redactor.redact(&record.message).await {
            Ok(result) => RedactedLog {
                redacted: !result.entities.is_empty(),
                text: result.text,
                entities: result.entities,
            },
            Err(e) => {
                warn!(log_id = %record.id, error = %e, "redaction failed, proceeding with raw text");
                degraded = true;
                RedactedLog::unredacted(&record.message)
            }
        };
        stage.advance(Stage::Redacted, record.id);

        self.logs.put(&record, &redacted).await?;

        // Priority gate: only qualifying levels pay for an embedding
        let embedding = if self.config.embed_levels.contains(&record.level) {
            match self.cache.get_or_create(&redacted.text).await {
                Ok(cached) => {
                    self.vectors.put(record.id, cached.vector.clone()).await?;
                    stage.advance(Stage::Embedded, record.id);
                    Some(cached.vector)
                }
                Err(e) => {
                    warn!(log_id = %record.id, error = %e, "embedding unavailable, fast tier only");
                    degraded = true;
                    None
                }
            }
        } else {
            debug!(log_id = %record.id, level = %record.level, "below embedding gate");
            None
        };

        let features = FeatureVector::new(&record, embedding.clone().unwrap_or_default());

        let fast = match self.scorer.score(&features).await {
            Ok(fast) => {
                stage.advance(Stage::FastScored, record.id);
                Some(fast)
            }
            Err(e) => {
                // Fail safe: no fast tier means no escalation either
                warn!(log_id = %record.id, error = %e, "scorer unavailable, skipping fast tier");
                degraded = true;
                None
            }
        };

        let verdict = match fast {
            None => DetectionVerdict::degraded(record.id),
            Some(fast) => {
                let escalate = embedding.is_some()
                    && should_escalate(&fast, self.config.escalation_threshold);

                if escalate {
                    stage.advance(Stage::Escalated, record.id);
                    let context = self.context_logs(record.id).await;
                    let outcome = self
                        .validator
                        .validate(&record, &redacted, &fast, &context, None)
                        .await;
                    stage.advance(Stage::Validated, record.id);
                    merge_outcome(record.id, fast, outcome, degraded)
                } else {
                    let mut verdict = DetectionVerdict::fast(record.id, fast);
                    verdict.degraded = degraded;
                    verdict
                }
            }
        };

        self.verdicts
            .record(verdict.clone(), VerdictTier::Realtime)
            .await?;
        let terminal = if verdict.degraded {
            Stage::PersistedDegraded
        } else {
            Stage::Persisted
        };
        stage.advance(terminal, record.id);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.update_stats(&verdict, elapsed_ms).await;

        info!(
            log_id = %record.id,
            method = ?verdict.method,
            is_anomaly = verdict.is_anomaly,
            score = verdict.score,
            degraded = verdict.degraded,
            elapsed_ms,
            "log processed"
        );

        Ok(verdict)
    }

    /// Recent logs shown to the LLM as normal-behavior context
    async fn context_logs(&self, exclude: Uuid) -> Vec<ContextLog> {
        match self.logs.recent(self.config.context_logs, Some(exclude)).await {
            Ok(stored) => stored
                .into_iter()
                .map(|s| ContextLog {
                    level: s.record.level,
                    service: s.record.service,
                    message: s.redacted.text,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to gather context logs");
                Vec::new()
            }
        }
    }

    async fn update_stats(&self, verdict: &DetectionVerdict, elapsed_ms: u64) {
        let mut stats = self.stats.write().await;
        stats.invocations += 1;
        if verdict.is_anomaly {
            stats.anomalies += 1;
        }
        match verdict.method {
            DetectionMethod::LlmConfirmed => {
                stats.escalations += 1;
                stats.llm_confirmed += 1;
            }
            DetectionMethod::LlmRejected => {
                stats.escalations += 1;
                stats.llm_rejected += 1;
            }
            DetectionMethod::ExplanationOnly => {
                stats.escalations += 1;
                stats.explanation_only += 1;
            }
            DetectionMethod::Fast => {}
        }
        if verdict.degraded {
            stats.degraded += 1;
        }
        let total = stats.avg_processing_ms * (stats.invocations - 1) as f64 + elapsed_ms as f64;
        stats.avg_processing_ms = total / stats.invocations as f64;
    }

    pub async fn stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }
}

/// Fold a validation outcome into the final verdict. The LLM's verdict is
/// authoritative once it ran; the fallback path preserves fast-tier state.
fn merge_outcome(
    log_id: Uuid,
    fast: FastVerdict,
    outcome: ValidationOutcome,
    degraded: bool,
) -> DetectionVerdict {
    let mut verdict = match outcome {
        ValidationOutcome::Confirmed {
            reasoning,
            severity,
            ..
        } => DetectionVerdict {
            log_id,
            method: DetectionMethod::LlmConfirmed,
            is_anomaly: true,
            score: fast.score,
            reasoning: Some(reasoning),
            severity,
            degraded: false,
            created_at: chrono::Utc::now(),
        },
        ValidationOutcome::Rejected { reasoning, .. } => DetectionVerdict {
            log_id,
            method: DetectionMethod::LlmRejected,
            // LLM has final say once invoked
            is_anomaly: false,
            score: fast.score,
            reasoning: Some(reasoning),
            severity: None,
            degraded: false,
            created_at: chrono::Utc::now(),
        },
        ValidationOutcome::ExplanationOnly { reasoning } => DetectionVerdict {
            log_id,
            method: DetectionMethod::ExplanationOnly,
            // Fast-tier verdict preserved, nothing fresh asserted
            is_anomaly: fast.is_anomaly,
            score: fast.score,
            reasoning,
            severity: None,
            degraded: false,
            created_at: chrono::Utc::now(),
        },
    };
    verdict.degraded = degraded;
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loglens_core::budget::BudgetGuard;
    use loglens_core::traits::{
        EmbeddingProvider, EmbeddingResponse, LlmClient, LlmRequest, RawScore, RedactionResult,
        ScoringBackend,
    };
    use loglens_core::types::LogLevel;
    use loglens_core::Error;
    use loglens_storage::{InMemoryLogStore, InMemoryVectorStore, InMemoryVerdictStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct PassthroughRedactor;

    #[async_trait]
    impl Redactor for PassthroughRedactor {
        async fn redact(&self, text: &str) -> Result<RedactionResult> {
            Ok(RedactionResult {
                text: text.to_string(),
                entities: Default::default(),
            })
        }
    }

    #[derive(Debug, Default)]
    struct BrokenRedactor;

    #[async_trait]
    impl Redactor for BrokenRedactor {
        async fn redact(&self, _text: &str) -> Result<RedactionResult> {
            Err(Error::Redaction("engine offline".into()))
        }
    }

    #[derive(Debug, Default)]
    struct StubEmbedder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EmbeddingResponse {
                vector: vec![text.len() as f32; 4],
                tokens: 10,
            })
        }
    }

    #[derive(Debug)]
    struct ThresholdScorer;

    /// Flags anything containing "refused"; low score otherwise
    #[async_trait]
    impl ScoringBackend for ThresholdScorer {
        async fn score(&self, features: &FeatureVector) -> Result<RawScore> {
            if !features.has_embedding() {
                return Ok(RawScore {
                    score: 0.2,
                    is_anomaly: false,
                });
            }
            Ok(RawScore {
                score: 0.85,
                is_anomaly: true,
            })
        }
    }

    #[derive(Debug)]
    struct QuietScorer;

    #[async_trait]
    impl ScoringBackend for QuietScorer {
        async fn score(&self, _features: &FeatureVector) -> Result<RawScore> {
            Ok(RawScore {
                score: 0.1,
                is_anomaly: false,
            })
        }
    }

    #[derive(Debug)]
    struct DeadScorer;

    #[async_trait]
    impl ScoringBackend for DeadScorer {
        async fn score(&self, _features: &FeatureVector) -> Result<RawScore> {
            Err(Error::ScorerUnavailable("model not loaded".into()))
        }
    }

    #[derive(Debug, Default)]
    struct ConfirmingLlm {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for ConfirmingLlm {
        async fn complete(&self, _request: &LlmRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"is_anomaly": true, "confidence": 0.9, "reasoning": "confirmed"}"#.into())
        }
    }

    #[derive(Debug, Default)]
    struct DownLlm {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for DownLlm {
        async fn complete(&self, _request: &LlmRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::llm("timeout"))
        }
    }

    struct Harness {
        pipeline: RealTimePipeline,
        embedder: Arc<StubEmbedder>,
        llm_calls: Arc<dyn Fn() -> u32 + Send + Sync>,
        guard: BudgetGuard,
    }

    fn build(
        redactor: Arc<dyn Redactor>,
        scorer_backend: Arc<dyn ScoringBackend>,
        llm: Arc<dyn LlmClient>,
        llm_calls: Arc<dyn Fn() -> u32 + Send + Sync>,
        budget: Option<f64>,
    ) -> Harness {
        let guard = BudgetGuard::new(budget);
        let embedder = Arc::new(StubEmbedder::default());
        let cache = Arc::new(EmbeddingCache::new(embedder.clone(), guard.clone(), 64));
        let validator = Arc::new(SemanticValidator::new(llm, guard.clone(), 0.6));
        let pipeline = RealTimePipeline::new(
            redactor,
            cache,
            FastScorer::new(scorer_backend),
            validator,
            Arc::new(InMemoryLogStore::new()),
            Arc::new(InMemoryVerdictStore::new()),
            Arc::new(InMemoryVectorStore::new()),
            DetectionConfig::default(),
        );
        Harness {
            pipeline,
            embedder,
            llm_calls,
            guard,
        }
    }

    fn error_record(message: &str) -> LogRecord {
        LogRecord::new(message, Some("db".into()), LogLevel::Error)
    }

    #[tokio::test]
    async fn normal_log_never_reaches_llm() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(QuietScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        let verdict = h
            .pipeline
            .submit_log(error_record("User login successful"))
            .await
            .unwrap();

        assert_eq!(verdict.method, DetectionMethod::Fast);
        assert!(!verdict.is_anomaly);
        assert_eq!((h.llm_calls)(), 0);
    }

    #[tokio::test]
    async fn high_score_escalates_and_confirms() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        let verdict = h
            .pipeline
            .submit_log(error_record("Connection refused: db-primary"))
            .await
            .unwrap();

        assert_eq!(verdict.method, DetectionMethod::LlmConfirmed);
        assert!(verdict.is_anomaly);
        assert!(verdict.severity.is_some());
        assert_eq!((h.llm_calls)(), 1);
    }

    #[tokio::test]
    async fn resubmission_is_idempotent() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        let record = error_record("Connection refused: db-primary");
        let first = h.pipeline.submit_log(record.clone()).await.unwrap();
        let spent_after_first = h.guard.stats().spent_usd;

        let second = h.pipeline.submit_log(record).await.unwrap();

        assert_eq!(first.method, second.method);
        // No second escalation, no second embedding spend
        assert_eq!((h.llm_calls)(), 1);
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.guard.stats().spent_usd, spent_after_first);
    }

    #[tokio::test]
    async fn exhausted_budget_yields_explanation_only() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(0.0),
        );

        // Budget of zero also blocks the embedding, so the fast tier runs
        // on structured features only and nothing escalates
        let verdict = h
            .pipeline
            .submit_log(error_record("Connection refused: db-primary"))
            .await
            .unwrap();

        assert_eq!(verdict.method, DetectionMethod::Fast);
        assert!(verdict.degraded);
        assert_eq!((h.llm_calls)(), 0);
    }

    #[tokio::test]
    async fn budget_left_for_embedding_but_not_llm() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        // Enough for the (micro-cent) embedding, not for a validation call
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(1e-6),
        );

        let verdict = h
            .pipeline
            .submit_log(error_record("Connection refused: db-primary"))
            .await
            .unwrap();

        assert_eq!(verdict.method, DetectionMethod::ExplanationOnly);
        // Fast-tier verdict preserved, generic (null) reasoning
        assert!(verdict.is_anomaly);
        assert!(verdict.reasoning.is_none());
        assert_eq!((h.llm_calls)(), 0);
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn llm_outage_preserves_fast_tier() {
        let llm = Arc::new(DownLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        let verdict = h
            .pipeline
            .submit_log(error_record("Connection refused: db-primary"))
            .await
            .unwrap();

        // Never raises to the caller; fast tier state preserved
        assert_eq!(verdict.method, DetectionMethod::ExplanationOnly);
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.score, 0.85);
        assert!(verdict.reasoning.is_none());
    }

    #[tokio::test]
    async fn dead_scorer_persists_degraded_verdict() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(DeadScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        let verdict = h
            .pipeline
            .submit_log(error_record("anything"))
            .await
            .unwrap();

        assert!(verdict.degraded);
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.score, 0.0);
        // Fail safe: scorer down means no escalation either
        assert_eq!((h.llm_calls)(), 0);
    }

    #[tokio::test]
    async fn redaction_failure_degrades_but_completes() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(BrokenRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        let verdict = h
            .pipeline
            .submit_log(error_record("Connection refused: db-primary"))
            .await
            .unwrap();

        assert!(verdict.degraded);
        assert_eq!(verdict.method, DetectionMethod::LlmConfirmed);
    }

    #[tokio::test]
    async fn info_log_skips_embedding_without_degrading() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        let record = LogRecord::new("heartbeat ok", None, LogLevel::Info);
        let verdict = h.pipeline.submit_log(record).await.unwrap();

        assert_eq!(verdict.method, DetectionMethod::Fast);
        assert!(!verdict.degraded);
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!((h.llm_calls)(), 0);
    }

    #[tokio::test]
    async fn stats_track_invocations() {
        let llm = Arc::new(ConfirmingLlm::default());
        let llm_probe = llm.clone();
        let h = build(
            Arc::new(PassthroughRedactor),
            Arc::new(ThresholdScorer),
            llm,
            Arc::new(move || llm_probe.calls.load(Ordering::SeqCst)),
            Some(10.0),
        );

        h.pipeline
            .submit_log(error_record("Connection refused: db-primary"))
            .await
            .unwrap();

        let stats = h.pipeline.stats().await;
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.escalations, 1);
        assert_eq!(stats.llm_confirmed, 1);
        assert_eq!(stats.anomalies, 1);
    }
}
