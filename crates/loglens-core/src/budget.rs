//! Daily spending budget guard for metered provider calls.
//!
//! Every embedding or LLM call reserves its estimated cost before
//! executing and commits the actual cost afterwards. The ledger is the
//! single writer of budget state; reservations count against the ceiling
//! so concurrent escalations cannot overshoot it. A request that would
//! exceed the ceiling is rejected before execution, never rolled back
//! after.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// OpenAI text-embedding-3-small rate (USD per 1M tokens)
pub const DEFAULT_EMBEDDING_USD_PER_1M_TOKENS: f64 = 0.02;

/// Validation-model input rate (USD per 1M tokens)
pub const DEFAULT_LLM_INPUT_USD_PER_1M_TOKENS: f64 = 0.15;

/// Validation-model output rate (USD per 1M tokens)
pub const DEFAULT_LLM_OUTPUT_USD_PER_1M_TOKENS: f64 = 0.60;

/// Utilization fraction at which the guard starts warning
const UTILIZATION_WARN_FRACTION: f64 = 0.8;

/// Source of the current UTC day, injectable so tests can force a
/// day boundary
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn today_utc(&self) -> NaiveDate;
}

/// Wall-clock implementation
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today_utc(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Pricing heuristics for estimating call costs before execution
#[derive(Debug, Clone)]
pub struct CostModel {
    pub embedding_usd_per_1m_tokens: f64,
    pub llm_input_usd_per_1m_tokens: f64,
    pub llm_output_usd_per_1m_tokens: f64,
    /// Completion allowance assumed when estimating a validation call
    pub completion_tokens: u32,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            embedding_usd_per_1m_tokens: DEFAULT_EMBEDDING_USD_PER_1M_TOKENS,
            llm_input_usd_per_1m_tokens: DEFAULT_LLM_INPUT_USD_PER_1M_TOKENS,
            llm_output_usd_per_1m_tokens: DEFAULT_LLM_OUTPUT_USD_PER_1M_TOKENS,
            completion_tokens: 800,
        }
    }
}

impl CostModel {
    /// Rough token estimate: ~4 characters per token
    pub fn estimate_tokens(text: &str) -> u32 {
        ((text.len() / 4) as u32).max(1)
    }

    /// Estimated cost of embedding `text`
    pub fn embedding_cost(&self, text: &str) -> f64 {
        self.embedding_cost_for_tokens(Self::estimate_tokens(text))
    }

    /// Actual cost once the provider reports billed tokens
    pub fn embedding_cost_for_tokens(&self, tokens: u32) -> f64 {
        tokens as f64 / 1_000_000.0 * self.embedding_usd_per_1m_tokens
    }

    /// Estimated cost of one validation call over `prompt`
    pub fn validation_cost(&self, prompt: &str) -> f64 {
        let input = Self::estimate_tokens(prompt) as f64 / 1_000_000.0
            * self.llm_input_usd_per_1m_tokens;
        let output =
            self.completion_tokens as f64 / 1_000_000.0 * self.llm_output_usd_per_1m_tokens;
        input + output
    }
}

/// Mutable budget state; only the guard touches it
#[derive(Debug)]
struct Ledger {
    date: NaiveDate,
    spent: f64,
    reserved: f64,
}

impl Ledger {
    /// Lazy UTC-day rollover: reset before evaluating any request
    fn roll(&mut self, today: NaiveDate) {
        if self.date != today {
            info!(
                from = %self.date,
                to = %today,
                spent = self.spent,
                "budget day rollover, resetting daily spend"
            );
            self.date = today;
            self.spent = 0.0;
            self.reserved = 0.0;
        }
    }
}

/// Outcome of a reservation attempt
#[derive(Debug)]
pub enum BudgetDecision {
    /// Proceed; commit or drop the reservation when the call settles
    Allowed(Reservation),
    /// The call would exceed the daily ceiling; callers fall back
    Rejected { spent: f64, limit: f64 },
}

/// In-flight reservation against the daily ceiling. Committing converts
/// the reservation into spend; dropping an uncommitted reservation
/// releases it (the call never happened or failed).
#[derive(Debug)]
pub struct Reservation {
    ledger: Arc<Mutex<Ledger>>,
    clock: Arc<dyn Clock>,
    amount: f64,
    settled: bool,
}

impl Reservation {
    /// Record the actual cost of the completed call
    pub fn commit(mut self, actual_usd: f64) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.roll(self.clock.today_utc());
        ledger.reserved = (ledger.reserved - self.amount).max(0.0);
        ledger.spent += actual_usd;
        debug!(
            reserved = self.amount,
            actual = actual_usd,
            daily_total = ledger.spent,
            "budget commit"
        );
        self.settled = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.roll(self.clock.today_utc());
            ledger.reserved = (ledger.reserved - self.amount).max(0.0);
            debug!(released = self.amount, "budget reservation released");
        }
    }
}

/// Snapshot of the day's budget state
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStats {
    pub limit_usd: Option<f64>,
    pub spent_usd: f64,
    pub reserved_usd: f64,
    /// Headroom left today; `None` when unlimited
    pub remaining_usd: Option<f64>,
    pub utilization_pct: Option<f64>,
}

/// Tracks daily spend against a configurable ceiling and gates every
/// metered call that would exceed it
#[derive(Debug, Clone)]
pub struct BudgetGuard {
    ledger: Arc<Mutex<Ledger>>,
    limit: Option<f64>,
    clock: Arc<dyn Clock>,
}

impl BudgetGuard {
    /// Create a guard; `None` disables the ceiling but keeps tracking spend
    pub fn new(limit_usd: Option<f64>) -> Self {
        Self::with_clock(limit_usd, Arc::new(SystemClock))
    }

    /// Create a guard with an injected clock (tests force day rollover)
    pub fn with_clock(limit_usd: Option<f64>, clock: Arc<dyn Clock>) -> Self {
        if let Some(limit) = limit_usd {
            info!(limit_usd = limit, "daily budget ceiling enabled");
        } else {
            info!("daily budget unlimited, tracking spend only");
        }
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                date: clock.today_utc(),
                spent: 0.0,
                reserved: 0.0,
            })),
            limit: limit_usd,
            clock,
        }
    }

    /// Reserve `estimated_usd` against today's ceiling
    pub fn reserve(&self, estimated_usd: f64) -> BudgetDecision {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.roll(self.clock.today_utc());

        if let Some(limit) = self.limit {
            let projected = ledger.spent + ledger.reserved + estimated_usd;
            if projected > limit {
                warn!(
                    spent = ledger.spent,
                    reserved = ledger.reserved,
                    estimated = estimated_usd,
                    limit,
                    "budget reservation rejected"
                );
                return BudgetDecision::Rejected {
                    spent: ledger.spent,
                    limit,
                };
            }
            if limit > 0.0 && projected / limit >= UTILIZATION_WARN_FRACTION {
                warn!(
                    spent = ledger.spent,
                    limit,
                    utilization_pct = projected / limit * 100.0,
                    "approaching daily budget limit"
                );
            }
        }

        ledger.reserved += estimated_usd;
        BudgetDecision::Allowed(Reservation {
            ledger: Arc::clone(&self.ledger),
            clock: Arc::clone(&self.clock),
            amount: estimated_usd,
            settled: false,
        })
    }

    /// Current budget snapshot (rolls the day over first)
    pub fn stats(&self) -> BudgetStats {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.roll(self.clock.today_utc());

        let remaining = self
            .limit
            .map(|limit| (limit - ledger.spent - ledger.reserved).max(0.0));
        let utilization = self.limit.and_then(|limit| {
            if limit > 0.0 {
                Some(ledger.spent / limit * 100.0)
            } else {
                None
            }
        });

        BudgetStats {
            limit_usd: self.limit,
            spent_usd: ledger.spent,
            reserved_usd: ledger.reserved,
            remaining_usd: remaining,
            utilization_pct: utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct FakeClock {
        today: StdMutex<NaiveDate>,
    }

    impl FakeClock {
        fn new(date: &str) -> Arc<Self> {
            Arc::new(Self {
                today: StdMutex::new(date.parse().unwrap()),
            })
        }

        fn advance_to(&self, date: &str) {
            *self.today.lock().unwrap() = date.parse().unwrap();
        }
    }

    impl Clock for FakeClock {
        fn today_utc(&self) -> NaiveDate {
            *self.today.lock().unwrap()
        }
    }

    #[test]
    fn reserve_commit_within_limit() {
        let guard = BudgetGuard::new(Some(1.0));

        match guard.reserve(0.4) {
            BudgetDecision::Allowed(reservation) => reservation.commit(0.3),
            BudgetDecision::Rejected { .. } => panic!("should be allowed"),
        }

        let stats = guard.stats();
        assert!((stats.spent_usd - 0.3).abs() < 1e-9);
        assert_eq!(stats.reserved_usd, 0.0);
        assert!((stats.remaining_usd.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn reservation_over_limit_rejected() {
        let guard = BudgetGuard::new(Some(1.0));

        match guard.reserve(0.9) {
            BudgetDecision::Allowed(r) => r.commit(0.9),
            BudgetDecision::Rejected { .. } => panic!("first call fits"),
        }

        match guard.reserve(0.2) {
            BudgetDecision::Allowed(_) => panic!("second call must be rejected"),
            BudgetDecision::Rejected { spent, limit } => {
                assert!((spent - 0.9).abs() < 1e-9);
                assert_eq!(limit, 1.0);
            }
        }
    }

    #[test]
    fn dropped_reservation_releases() {
        let guard = BudgetGuard::new(Some(1.0));

        {
            let decision = guard.reserve(0.8);
            assert!(matches!(decision, BudgetDecision::Allowed(_)));
            // dropped uncommitted: the call failed
        }

        // Full headroom is back
        assert!(matches!(guard.reserve(0.9), BudgetDecision::Allowed(_)));
    }

    #[test]
    fn pending_reservations_gate_concurrent_calls() {
        let guard = BudgetGuard::new(Some(1.0));

        let first = guard.reserve(0.6);
        assert!(matches!(first, BudgetDecision::Allowed(_)));
        // Second caller sees the pending reservation, not just spend
        assert!(matches!(
            guard.reserve(0.6),
            BudgetDecision::Rejected { .. }
        ));
        drop(first);
    }

    #[test]
    fn concurrent_commits_never_exceed_limit() {
        let guard = Arc::new(BudgetGuard::new(Some(1.0)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || match guard.reserve(0.2) {
                    BudgetDecision::Allowed(r) => {
                        r.commit(0.2);
                        true
                    }
                    BudgetDecision::Rejected { .. } => false,
                })
            })
            .collect();

        let committed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|committed| *committed)
            .count();

        let stats = guard.stats();
        assert!(stats.spent_usd <= 1.0 + 1e-9);
        assert_eq!(committed, 5);
    }

    #[test]
    fn day_rollover_resets_spend() {
        let clock = FakeClock::new("2026-03-01");
        let guard = BudgetGuard::with_clock(Some(1.0), clock.clone());

        match guard.reserve(1.0) {
            BudgetDecision::Allowed(r) => r.commit(1.0),
            BudgetDecision::Rejected { .. } => panic!(),
        }
        assert!(matches!(
            guard.reserve(0.1),
            BudgetDecision::Rejected { .. }
        ));

        clock.advance_to("2026-03-02");

        // New UTC day: spend resets before the request is evaluated
        assert!(matches!(guard.reserve(0.5), BudgetDecision::Allowed(_)));
        let stats = guard.stats();
        assert_eq!(stats.spent_usd, 0.0);
    }

    #[test]
    fn unlimited_budget_tracks_spend() {
        let guard = BudgetGuard::new(None);

        match guard.reserve(100.0) {
            BudgetDecision::Allowed(r) => r.commit(100.0),
            BudgetDecision::Rejected { .. } => panic!("unlimited never rejects"),
        }

        let stats = guard.stats();
        assert_eq!(stats.spent_usd, 100.0);
        assert!(stats.limit_usd.is_none());
        assert!(stats.remaining_usd.is_none());
    }

    #[test]
    fn cost_model_estimates() {
        let model = CostModel::default();
        assert_eq!(CostModel::estimate_tokens(""), 1);
        assert_eq!(CostModel::estimate_tokens("abcdefgh"), 2);

        let cost = model.embedding_cost_for_tokens(1_000_000);
        assert!((cost - DEFAULT_EMBEDDING_USD_PER_1M_TOKENS).abs() < 1e-12);

        // Validation estimate includes the completion allowance
        assert!(model.validation_cost("short prompt") > 0.0);
    }
}
