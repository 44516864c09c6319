//! Content-addressed embedding cache.
//!
//! Memoizes embedding vectors by a sha256 hash of the whitespace-normalized
//! text so identical log messages never pay for a second provider call.
//! Entries never expire implicitly; a bounded LRU eviction caps memory.
//! A miss race (two callers embedding the same text concurrently) is
//! tolerated: both calls are independently budget-checked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::budget::{BudgetDecision, BudgetGuard, CostModel};
use crate::error::{Error, Result};
use crate::traits::EmbeddingProvider;

/// Collapse whitespace runs so formatting noise does not defeat the cache
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key: hex sha256 of the normalized text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    last_used: u64,
}

/// An embedding plus whether it came from the cache
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub vector: Vec<f32>,
    pub from_cache: bool,
}

/// Budget-aware memoizing wrapper around the embedding provider
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, Entry>>,
    tick: AtomicU64,
    capacity: usize,
    provider: Arc<dyn EmbeddingProvider>,
    guard: BudgetGuard,
    cost: CostModel,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl EmbeddingCache {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        guard: BudgetGuard,
        capacity: usize,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
            capacity: capacity.max(1),
            provider,
            guard,
            cost: CostModel::default(),
        }
    }

    /// Return the embedding for `text`, calling the provider only on a miss.
    /// Hits touch neither the budget nor the provider.
    pub async fn get_or_create(&self, text: &str) -> Result<CachedEmbedding> {
        let key = content_hash(text);

        if let Some(vector) = self.lookup(&key) {
            trace!(key = %&key[..8], "embedding cache hit");
            return Ok(CachedEmbedding {
                vector,
                from_cache: true,
            });
        }

        let reservation = match self.guard.reserve(self.cost.embedding_cost(text)) {
            BudgetDecision::Allowed(reservation) => reservation,
            BudgetDecision::Rejected { spent, limit } => {
                return Err(Error::EmbeddingUnavailable(format!(
                    "daily budget exhausted (${spent:.4} of ${limit:.2})"
                )));
            }
        };

        // Provider failure drops the reservation, releasing the estimate
        let response = self.provider.embed(text).await?;
        reservation.commit(self.cost.embedding_cost_for_tokens(response.tokens));

        self.insert(key, response.vector.clone());
        debug!(tokens = response.tokens, "embedding generated and cached");

        Ok(CachedEmbedding {
            vector: response.vector,
            from_cache: false,
        })
    }

    fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries.write().unwrap();
        entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.vector.clone()
        })
    }

    fn insert(&self, key: String, vector: Vec<f32>) {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries.write().unwrap();

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
                trace!("evicted least recently used embedding");
            }
        }

        entries.insert(
            key,
            Entry {
                vector,
                last_used: tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}
