//! Semantic validator (tier 2).
//!
//! Confirms or refutes escalated candidate anomalies with the LLM and
//! produces an explanation. Every failure folds into the explanation-only
//! fallback: escalated logs always end with *some* outcome, never a hard
//! failure visible to the caller of `submit_log`.
//!
//! Raw provider replies are parsed into a tagged variant at this boundary;
//! nothing downstream inspects JSON.

use std::sync::Arc;

use loglens_core::budget::{BudgetDecision, BudgetGuard, CostModel};
use loglens_core::traits::{LlmClient, LlmRequest};
use loglens_core::types::{
    ClusterContext, ContextLog, FastVerdict, LlmAnalysis, LogRecord, RedactedLog,
    ValidationOutcome,
};
use loglens_core::{Error, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::reasoner::ClusterContextReasoner;

const DETECTION_SYSTEM: &str =
    "You are an expert log analyst. Always respond with valid JSON only, no additional text.";

const EXPLANATION_SYSTEM: &str = "You are an expert log analyst specializing in identifying \
     anomalies and unusual patterns in system logs.";

/// Classification reply from the detection prompt
#[derive(Debug, Deserialize)]
struct LlmDetection {
    is_anomaly: bool,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// Providers sometimes wrap JSON bodies in markdown fences
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// LLM-backed validation of candidate anomalies
pub struct SemanticValidator {
    llm: Arc<dyn LlmClient>,
    guard: BudgetGuard,
    cost: CostModel,
    reasoner: ClusterContextReasoner,
    /// Minimum confidence for a confirmed anomaly
    confidence_threshold: f64,
}

impl std::fmt::Debug for SemanticValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticValidator")
            .field("confidence_threshold", &self.confidence_threshold)
            .finish()
    }
}

impl SemanticValidator {
    pub fn new(llm: Arc<dyn LlmClient>, guard: BudgetGuard, confidence_threshold: f64) -> Self {
        Self {
            llm,
            guard,
            cost: CostModel::default(),
            reasoner: ClusterContextReasoner::new(),
            confidence_threshold,
        }
    }

    /// Validate one candidate anomaly.
    ///
    /// Once invoked the LLM has the final say: an explicit disagreement
    /// forces `is_anomaly` to false. Budget rejection short-circuits to
    /// `ExplanationOnly` without touching the provider; provider failure
    /// triggers at most one explanation-only attempt. Each external call
    /// happens at most once per invocation.
    pub async fn validate(
        &self,
        record: &LogRecord,
        redacted: &RedactedLog,
        fast: &FastVerdict,
        context_logs: &[ContextLog],
        cluster: Option<&ClusterContext>,
    ) -> ValidationOutcome {
        // With cluster context available, gather the structured root-cause
        // analysis first; its failure never blocks the detection call.
        let analysis = match cluster {
            Some(cluster) => match self.request_analysis(record, redacted, context_logs, cluster).await
            {
                Ok(analysis) => Some(analysis),
                Err(Error::BudgetExceeded { .. }) => {
                    debug!(log_id = %record.id, "budget rejected root-cause analysis");
                    None
                }
                Err(e) => {
                    warn!(log_id = %record.id, error = %e, "root-cause analysis failed");
                    None
                }
            },
            None => None,
        };

        match self.request_detection(record, redacted, fast, context_logs, cluster).await {
            Ok(detection) => self.outcome_from_detection(record, detection, analysis),
            Err(Error::BudgetExceeded { .. }) => {
                // Designed rejection: no provider call, no explanation call
                debug!(log_id = %record.id, "budget rejected validation, explanation-only");
                ValidationOutcome::ExplanationOnly {
                    reasoning: analysis
                        .map(|a| self.reasoner.compose(record, &a).reasoning),
                }
            }
            Err(e) => {
                warn!(log_id = %record.id, error = %e, "LLM validation failed, falling back");
                if let Some(analysis) = analysis {
                    // The analysis call already produced an explanation
                    return ValidationOutcome::ExplanationOnly {
                        reasoning: Some(self.reasoner.compose(record, &analysis).reasoning),
                    };
                }
                let reasoning = self
                    .request_explanation(record, redacted, context_logs)
                    .await
                    .map_err(|e| {
                        warn!(log_id = %record.id, error = %e, "explanation fallback failed");
                        e
                    })
                    .ok();
                ValidationOutcome::ExplanationOnly { reasoning }
            }
        }
    }

    fn outcome_from_detection(
        &self,
        record: &LogRecord,
        detection: LlmDetection,
        analysis: Option<LlmAnalysis>,
    ) -> ValidationOutcome {
        if !detection.is_anomaly {
            debug!(log_id = %record.id, confidence = detection.confidence, "LLM rejected anomaly");
            return ValidationOutcome::Rejected {
                confidence: detection.confidence,
                reasoning: detection.reasoning,
            };
        }

        if detection.confidence >= self.confidence_threshold {
            let (reasoning, severity) = match &analysis {
                Some(analysis) => {
                    let composed = self.reasoner.compose(record, analysis);
                    (composed.reasoning, Some(composed.severity))
                }
                None => (
                    detection.reasoning,
                    Some(ClusterContextReasoner::heuristic_severity(record)),
                ),
            };
            debug!(log_id = %record.id, confidence = detection.confidence, "LLM confirmed anomaly");
            return ValidationOutcome::Confirmed {
                confidence: detection.confidence,
                reasoning,
                severity,
                analysis,
            };
        }

        // Agreement below the confidence bar asserts nothing fresh; the
        // fast tier's verdict stands with the explanation attached
        debug!(
            log_id = %record.id,
            confidence = detection.confidence,
            threshold = self.confidence_threshold,
            "LLM agreement below confidence threshold"
        );
        ValidationOutcome::ExplanationOnly {
            reasoning: Some(detection.reasoning),
        }
    }

    /// Budget-gated provider call; commits the estimate on success
    async fn call(&self, request: LlmRequest) -> Result<String> {
        let estimate = self.cost.validation_cost(&request.prompt);
        let reservation = match self.guard.reserve(estimate) {
            BudgetDecision::Allowed(reservation) => reservation,
            BudgetDecision::Rejected { spent, limit } => {
                return Err(Error::BudgetExceeded { spent, limit });
            }
        };

        let reply = self.llm.complete(&request).await?;
        reservation.commit(estimate);
        Ok(reply)
    }

    async fn request_detection(
        &self,
        record: &LogRecord,
        redacted: &RedactedLog,
        fast: &FastVerdict,
        context_logs: &[ContextLog],
        cluster: Option<&ClusterContext>,
    ) -> Result<LlmDetection> {
        let prompt = detection_prompt(record, redacted, fast, context_logs, cluster);
        let raw = self
            .call(LlmRequest {
                system: DETECTION_SYSTEM.to_string(),
                prompt,
                max_tokens: 400,
                json_response: true,
            })
            .await?;

        serde_json::from_str(strip_fences(&raw))
            .map_err(|e| Error::unparseable(format!("detection reply: {e}")))
    }

    async fn request_analysis(
        &self,
        record: &LogRecord,
        redacted: &RedactedLog,
        context_logs: &[ContextLog],
        cluster: &ClusterContext,
    ) -> Result<LlmAnalysis> {
        let prompt = analysis_prompt(record, redacted, context_logs, cluster);
        let raw = self
            .call(LlmRequest {
                system: DETECTION_SYSTEM.to_string(),
                prompt,
                max_tokens: 800,
                json_response: true,
            })
            .await?;

        serde_json::from_str(strip_fences(&raw))
            .map_err(|e| Error::unparseable(format!("analysis reply: {e}")))
    }

    async fn request_explanation(
        &self,
        record: &LogRecord,
        redacted: &RedactedLog,
        context_logs: &[ContextLog],
    ) -> Result<String> {
        let prompt = explanation_prompt(record, redacted, context_logs);
        self.call(LlmRequest {
            system: EXPLANATION_SYSTEM.to_string(),
            prompt,
            max_tokens: 500,
            json_response: false,
        })
        .await
    }
}

fn context_section(context_logs: &[ContextLog]) -> String {
    if context_logs.is_empty() {
        return String::new();
    }
    let mut section = String::from("\n\nSimilar normal logs for context:\n");
    for (i, log) in context_logs.iter().take(5).enumerate() {
        section.push_str(&format!("{}. [{}] {}\n", i + 1, log.level, log.message));
    }
    section
}

fn cluster_section(cluster: Option<&ClusterContext>) -> String {
    let Some(cluster) = cluster else {
        return String::new();
    };
    let mut section = format!(
        "\n\nCluster Context:\n- Nearest cluster: {} ({} similar normal logs)\n\
         - This log did NOT fit that cluster's pattern.\n- Sample logs from the cluster:\n",
        cluster.cluster_id, cluster.cluster_size
    );
    for (i, log) in cluster.samples.iter().take(3).enumerate() {
        let mut message = log.message.clone();
        if message.len() > 100 {
            message.truncate(100);
            message.push_str("...");
        }
        section.push_str(&format!("  {}. [{}] {}\n", i + 1, log.level, message));
    }
    section
}

fn log_entry_section(record: &LogRecord, redacted: &RedactedLog) -> String {
    format!(
        "Log Entry:\n- Level: {}\n- Service: {}\n- Message: {}",
        record.level,
        record.service.as_deref().unwrap_or("N/A"),
        redacted.text
    )
}

fn detection_prompt(
    record: &LogRecord,
    redacted: &RedactedLog,
    fast: &FastVerdict,
    context_logs: &[ContextLog],
    cluster: Option<&ClusterContext>,
) -> String {
    format!(
        "You are a log analysis expert. Analyze the following log entry and determine if it is anomalous.\n\n\
         {}\n- Statistical anomaly score: {:.2}\n{}{}\n\
         Respond in JSON format with the following structure:\n\
         {{\n    \"is_anomaly\": true/false,\n    \"confidence\": 0.0-1.0,\n    \"reasoning\": \"Brief explanation (2-3 sentences) of why this log is or isn't anomalous\"\n}}\n\n\
         Consider:\n\
         1. Unusual patterns compared to normal logs\n\
         2. Error severity and frequency\n\
         3. Context and service behavior\n\
         4. Potential security or operational issues",
        log_entry_section(record, redacted),
        fast.score,
        context_section(context_logs),
        cluster_section(cluster),
    )
}

fn analysis_prompt(
    record: &LogRecord,
    redacted: &RedactedLog,
    context_logs: &[ContextLog],
    cluster: &ClusterContext,
) -> String {
    let schema = r#"{
    "explanation": "Detailed explanation (3-4 sentences) of why this log is anomalous",
    "root_causes": [
        {"hypothesis": "Root cause", "confidence": 0.0-1.0, "description": "Brief explanation"}
    ],
    "remediation_steps": [
        {"step": "Action", "priority": "HIGH/MEDIUM/LOW", "description": "What to do"}
    ],
    "severity": "LOW/MEDIUM/HIGH/CRITICAL",
    "severity_reason": "Why this severity level"
}"#;
    format!(
        "You are a senior log analysis expert specializing in root cause analysis. \
         Analyze the following log entry and provide structured analysis.\n\n\
         {}\n{}{}\n\
         Respond in JSON format with the following structure:\n{}\n\n\
         Focus on:\n\
         1. Specific technical root causes (not generic issues)\n\
         2. Actionable remediation steps\n\
         3. Accurate severity assessment based on operational impact",
        log_entry_section(record, redacted),
        context_section(context_logs),
        cluster_section(Some(cluster)),
        schema,
    )
}

fn explanation_prompt(
    record: &LogRecord,
    redacted: &RedactedLog,
    context_logs: &[ContextLog],
) -> String {
    format!(
        "You are a log analysis expert. Analyze the following log entry and provide a \
         comprehensive root cause analysis.\n\n{}{}\n\n\
         Provide a detailed analysis that includes:\n\
         1. What makes this log entry unusual compared to normal patterns (2-3 sentences)\n\
         2. The 2-3 most likely root causes with brief explanations\n\
         3. Potential impact on system/service operations\n\
         4. Specific actionable steps to investigate and resolve the issue\n\n\
         Be specific, technical, and actionable.",
        log_entry_section(record, redacted),
        context_section(context_logs),
    )
}
