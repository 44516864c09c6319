//! # Loglens Clustering
//!
//! The periodic batch path: density clustering over the embedding window,
//! outlier extraction, and LLM validation of outliers with cluster
//! contrast context.
//!
//! A run is atomic from the consumer's point of view: assignments,
//! metadata and batch-tier verdicts are committed together only after the
//! whole run (clustering + sweep) finishes. A failed or cancelled run
//! publishes nothing and leaves the previous generation intact.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod engine;
pub mod sweep;

pub use engine::{BatchClusteringEngine, CancelHandle, ClusteringRunParams};
pub use sweep::{OutlierSweep, SweepReport};
