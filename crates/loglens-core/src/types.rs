//! Domain types shared across the loglens crates.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log severity level, parsed case-insensitively (`WARNING` maps to `Warn`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    #[default]
    Unknown,
}

impl LogLevel {
    /// Parse a level string from arbitrary log sources
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Self::Trace,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" | "ERR" | "FATAL" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Weight applied when judging how suspicious a log at this level is.
    /// ERROR/WARN entries are always worth investigating; INFO and below
    /// need much stronger statistical evidence.
    pub fn anomaly_weight(&self) -> f64 {
        match self {
            Self::Error => 1.0,
            Self::Warn => 0.8,
            Self::Info => 0.3,
            Self::Debug => 0.2,
            Self::Trace => 0.1,
            Self::Unknown => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested log entry. Immutable once created; the raw message is
/// retained for audit while the redacted projection flows downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Stable identifier
    pub id: Uuid,
    /// Raw message text as received
    pub message: String,
    /// Emitting service, when known
    pub service: Option<String>,
    /// Parsed level
    pub level: LogLevel,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Create a record with a fresh id, stamped now
    pub fn new(message: impl Into<String>, service: Option<String>, level: LogLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            service,
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Redacted projection of a log message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedLog {
    /// Message with PII entities replaced
    pub text: String,
    /// Counts per detected entity type
    pub entities: BTreeMap<String, u32>,
    /// Whether any entity was actually redacted
    pub redacted: bool,
}

impl RedactedLog {
    /// Pass-through projection used when the redaction engine is down
    pub fn unredacted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entities: BTreeMap::new(),
            redacted: false,
        }
    }
}

/// Features handed to the fast scorer: an embedding (possibly empty when
/// the provider was unavailable or the level is below the embedding gate)
/// plus structured features derived from the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub embedding: Vec<f32>,
    pub level: LogLevel,
    pub service: Option<String>,
    /// UTC hour-of-day bucket (0-23)
    pub hour_bucket: u8,
}

impl FeatureVector {
    /// Build features for a record with the given embedding
    pub fn new(record: &LogRecord, embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            level: record.level,
            service: record.service.clone(),
            hour_bucket: record.timestamp.hour() as u8,
        }
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// Output of the fast (tier 1) statistical scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastVerdict {
    /// Normalized anomaly score in [0, 1]
    pub score: f64,
    pub is_anomaly: bool,
}

/// How a verdict was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionMethod {
    /// Statistical tier only
    Fast,
    /// LLM agreed the entry is anomalous with sufficient confidence
    LlmConfirmed,
    /// LLM disagreed; its verdict overrides the fast tier
    LlmRejected,
    /// Expensive validation was unavailable; explanation (if any) attached
    /// without asserting a fresh verdict
    ExplanationOnly,
}

/// Severity assigned by the LLM or the level/keyword heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Which detection pass produced a verdict. Each log holds at most one
/// verdict per tier; the realtime slot is never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictTier {
    Realtime,
    Batch,
}

/// Authoritative anomaly verdict for a log in one detection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionVerdict {
    pub log_id: Uuid,
    pub method: DetectionMethod,
    pub is_anomaly: bool,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// One or more pipeline stages failed and this is a best-effort result
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

impl DetectionVerdict {
    /// Fast-tier verdict with no LLM involvement
    pub fn fast(log_id: Uuid, fast: FastVerdict) -> Self {
        Self {
            log_id,
            method: DetectionMethod::Fast,
            is_anomaly: fast.is_anomaly,
            score: fast.score,
            reasoning: None,
            severity: None,
            degraded: false,
            created_at: Utc::now(),
        }
    }

    /// Minimal degraded verdict stored when scoring was impossible
    pub fn degraded(log_id: Uuid) -> Self {
        Self {
            log_id,
            method: DetectionMethod::Fast,
            is_anomaly: false,
            score: 0.0,
            reasoning: None,
            severity: None,
            degraded: true,
            created_at: Utc::now(),
        }
    }
}

/// Cluster membership label. The clustering backend's raw `-1` sentinel is
/// converted to `Outlier` at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterLabel {
    Member(u32),
    Outlier,
}

impl ClusterLabel {
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 {
            Self::Outlier
        } else {
            Self::Member(raw as u32)
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Member(id) => *id as i64,
            Self::Outlier => -1,
        }
    }

    pub fn is_outlier(&self) -> bool {
        matches!(self, Self::Outlier)
    }
}

impl Serialize for ClusterLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for ClusterLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(Self::from_raw(raw.clamp(i32::MIN as i64, i32::MAX as i64) as i32))
    }
}

/// One log's membership in the current clustering generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub log_id: Uuid,
    pub label: ClusterLabel,
}

/// Per-cluster statistics for one batch run, keyed by `(run_id, cluster_id)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub run_id: Uuid,
    pub cluster_id: u32,
    pub size: usize,
    pub centroid: Vec<f32>,
    /// Bounded sample of member log ids
    pub representatives: Vec<Uuid>,
}

/// Summary returned by a batch clustering run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub n_clusters: usize,
    pub n_outliers: usize,
    /// Vectors gathered for the analysis window
    pub analyzed: usize,
    /// Vectors actually clustered after sampling
    pub sampled: usize,
    /// Outliers the validation sweep processed
    pub validated: usize,
    /// Outliers the LLM confirmed as anomalous
    pub confirmed: usize,
    /// Per-outlier validation failures (the sweep continued past them)
    pub validation_errors: usize,
    pub duration_ms: u64,
}

/// Ranked root cause hypothesis from the structured LLM analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseHypothesis {
    pub hypothesis: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
}

/// Remediation action priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Prioritized remediation action from the structured LLM analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationStep {
    pub step: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: String,
}

/// Structured root-cause analysis parsed from the LLM reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub explanation: String,
    #[serde(default)]
    pub root_causes: Vec<RootCauseHypothesis>,
    #[serde(default)]
    pub remediation_steps: Vec<RemediationStep>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub severity_reason: Option<String>,
}

/// A normal log shown to the LLM for contrast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextLog {
    pub level: LogLevel,
    pub service: Option<String>,
    pub message: String,
}

/// Contrast context for validating a batch outlier: the nearest non-outlier
/// cluster and a sample of its members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterContext {
    pub cluster_id: u32,
    pub cluster_size: usize,
    pub samples: Vec<ContextLog>,
}

/// Result of the semantic (tier 2) validation of a candidate anomaly
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// LLM agreed with sufficient confidence
    Confirmed {
        confidence: f64,
        reasoning: String,
        severity: Option<Severity>,
        analysis: Option<LlmAnalysis>,
    },
    /// LLM disagreed; once invoked it has the final say
    Rejected { confidence: f64, reasoning: String },
    /// Validation unavailable (budget, provider failure, unparseable or
    /// low-confidence agreement); fast-tier state is preserved
    ExplanationOnly { reasoning: Option<String> },
}
