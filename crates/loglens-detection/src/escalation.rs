//! Escalation policy: when does a fast-tier verdict justify an LLM call.
//!
//! This is the single tunable that trades LLM cost against detection
//! recall, kept as a pure function so it is testable without any I/O.

use loglens_core::types::FastVerdict;

/// True iff the fast tier flagged the log AND its score clears the
/// configured threshold. Logs the fast tier considers normal are never
/// escalated regardless of score.
pub fn should_escalate(verdict: &FastVerdict, escalation_threshold: f64) -> bool {
    verdict.is_anomaly && verdict.score >= escalation_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(score: f64, is_anomaly: bool) -> FastVerdict {
        FastVerdict { score, is_anomaly }
    }

    #[test]
    fn escalates_only_above_threshold() {
        assert!(should_escalate(&verdict(0.85, true), 0.7));
        assert!(should_escalate(&verdict(0.7, true), 0.7));
        assert!(!should_escalate(&verdict(0.69, true), 0.7));
    }

    #[test]
    fn never_escalates_non_anomalies() {
        assert!(!should_escalate(&verdict(0.99, false), 0.7));
        assert!(!should_escalate(&verdict(0.1, false), 0.7));
    }

    #[test]
    fn threshold_is_configurable() {
        let v = verdict(0.5, true);
        assert!(should_escalate(&v, 0.5));
        assert!(!should_escalate(&v, 0.9));
        // Threshold of zero escalates every flagged log
        assert!(should_escalate(&verdict(0.0, true), 0.0));
    }
}
