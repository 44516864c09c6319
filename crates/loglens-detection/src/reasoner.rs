//! Cluster-context reasoner.
//!
//! Turns the LLM's structured analysis into ranked root cause hypotheses,
//! prioritized remediation steps and a severity, falling back to a
//! level/keyword rule when the LLM did not assign one. Also renders the
//! human-readable reasoning block attached to verdicts.

use loglens_core::types::{
    LlmAnalysis, LogLevel, LogRecord, Priority, RemediationStep, RootCauseHypothesis, Severity,
};
use tracing::debug;

/// Message fragments that push the heuristic severity to Critical
const CRITICAL_KEYWORDS: &[&str] = &["panic", "fatal", "outage", "data loss", "corrupt"];

/// Message fragments that push the heuristic severity to High
const HIGH_KEYWORDS: &[&str] = &["refused", "timeout", "unavailable", "denied", "exhausted"];

/// Fully composed analysis for one anomalous log
#[derive(Debug, Clone)]
pub struct ComposedAnalysis {
    pub reasoning: String,
    pub severity: Severity,
    pub root_causes: Vec<RootCauseHypothesis>,
    pub remediation_steps: Vec<RemediationStep>,
}

/// Composes validation output into verdict-ready analysis
#[derive(Debug, Clone, Default)]
pub struct ClusterContextReasoner;

impl ClusterContextReasoner {
    pub fn new() -> Self {
        Self
    }

    /// Rank hypotheses, prioritize remediation and settle severity from a
    /// structured LLM analysis
    pub fn compose(&self, record: &LogRecord, analysis: &LlmAnalysis) -> ComposedAnalysis {
        let mut root_causes = analysis.root_causes.clone();
        root_causes.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut remediation_steps = analysis.remediation_steps.clone();
        remediation_steps.sort_by(|a, b| b.priority.cmp(&a.priority));

        let severity = analysis
            .severity
            .as_deref()
            .and_then(Severity::parse)
            .unwrap_or_else(|| {
                let fallback = Self::heuristic_severity(record);
                debug!(severity = ?fallback, "LLM gave no severity, applying heuristic");
                fallback
            });

        let reasoning = Self::render(analysis, &root_causes, &remediation_steps, severity);

        ComposedAnalysis {
            reasoning,
            severity,
            root_causes,
            remediation_steps,
        }
    }

    /// Level/keyword rule used when the LLM does not assign a severity
    pub fn heuristic_severity(record: &LogRecord) -> Severity {
        let message = record.message.to_ascii_lowercase();

        if CRITICAL_KEYWORDS.iter().any(|kw| message.contains(kw)) {
            return Severity::Critical;
        }
        if record.level == LogLevel::Error || HIGH_KEYWORDS.iter().any(|kw| message.contains(kw)) {
            return Severity::High;
        }
        if record.level == LogLevel::Warn {
            return Severity::Medium;
        }
        Severity::Low
    }

    /// Human-readable reasoning block: explanation, then root causes,
    /// remediation and severity
    fn render(
        analysis: &LlmAnalysis,
        root_causes: &[RootCauseHypothesis],
        remediation_steps: &[RemediationStep],
        severity: Severity,
    ) -> String {
        let mut parts = vec![analysis.explanation.clone()];

        if !root_causes.is_empty() {
            parts.push("\nRoot Causes:".to_string());
            for cause in root_causes {
                parts.push(format!(
                    "- {} ({:.0}%): {}",
                    cause.hypothesis,
                    cause.confidence * 100.0,
                    cause.description
                ));
            }
        }

        if !remediation_steps.is_empty() {
            parts.push("\nRemediation Steps:".to_string());
            for step in remediation_steps {
                let priority = match step.priority {
                    Priority::High => "HIGH",
                    Priority::Medium => "MEDIUM",
                    Priority::Low => "LOW",
                };
                parts.push(format!("- [{}] {}: {}", priority, step.step, step.description));
            }
        }

        let severity_line = match &analysis.severity_reason {
            Some(reason) => format!("\nSeverity: {severity:?} - {reason}"),
            None => format!("\nSeverity: {severity:?}"),
        };
        parts.push(severity_line);

        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> LlmAnalysis {
        LlmAnalysis {
            explanation: "Connection pool exhausted under sustained load.".into(),
            root_causes: vec![
                RootCauseHypothesis {
                    hypothesis: "Connection leak".into(),
                    confidence: 0.4,
                    description: "Handles not returned to the pool".into(),
                },
                RootCauseHypothesis {
                    hypothesis: "Traffic spike".into(),
                    confidence: 0.8,
                    description: "Request volume doubled".into(),
                },
            ],
            remediation_steps: vec![
                RemediationStep {
                    step: "Review pool sizing".into(),
                    priority: Priority::Low,
                    description: "Raise max connections".into(),
                },
                RemediationStep {
                    step: "Restart affected service".into(),
                    priority: Priority::High,
                    description: "Clears leaked handles".into(),
                },
            ],
            severity: Some("HIGH".into()),
            severity_reason: Some("Degrades all downstream requests".into()),
        }
    }

    #[test]
    fn hypotheses_ranked_by_confidence() {
        let record = LogRecord::new("db error", None, LogLevel::Error);
        let composed = ClusterContextReasoner::new().compose(&record, &analysis());
        assert_eq!(composed.root_causes[0].hypothesis, "Traffic spike");
        assert_eq!(composed.root_causes[1].hypothesis, "Connection leak");
    }

    #[test]
    fn remediation_ordered_high_first() {
        let record = LogRecord::new("db error", None, LogLevel::Error);
        let composed = ClusterContextReasoner::new().compose(&record, &analysis());
        assert_eq!(composed.remediation_steps[0].priority, Priority::High);
    }

    #[test]
    fn llm_severity_wins_over_heuristic() {
        let record = LogRecord::new("minor notice", None, LogLevel::Info);
        let composed = ClusterContextReasoner::new().compose(&record, &analysis());
        assert_eq!(composed.severity, Severity::High);
    }

    #[test]
    fn heuristic_severity_from_level_and_keywords() {
        let panic = LogRecord::new("thread panicked at index", None, LogLevel::Info);
        assert_eq!(
            ClusterContextReasoner::heuristic_severity(&panic),
            Severity::Critical
        );

        let refused = LogRecord::new("Connection refused: db-primary", None, LogLevel::Info);
        assert_eq!(
            ClusterContextReasoner::heuristic_severity(&refused),
            Severity::High
        );

        let warn = LogRecord::new("slow response", None, LogLevel::Warn);
        assert_eq!(
            ClusterContextReasoner::heuristic_severity(&warn),
            Severity::Medium
        );

        let info = LogRecord::new("user login successful", None, LogLevel::Info);
        assert_eq!(
            ClusterContextReasoner::heuristic_severity(&info),
            Severity::Low
        );
    }

    #[test]
    fn rendered_reasoning_contains_sections() {
        let record = LogRecord::new("db error", None, LogLevel::Error);
        let composed = ClusterContextReasoner::new().compose(&record, &analysis());
        assert!(composed.reasoning.contains("Root Causes:"));
        assert!(composed.reasoning.contains("Remediation Steps:"));
        assert!(composed.reasoning.contains("Severity: High"));
    }
}
