//! Per-client rate limiting.
//!
//! Two pieces:
//!
//! 1. **TokenBucket** (`bucket.rs`): a capped pool of permits refilled
//!    continuously at `capacity / window` tokens per second. Refill is computed
//!    lazily at the start of every check, there is no background timer.
//!
//! 2. **LimiterRegistry** (`registry.rs`): sharded map from client key to
//!    bucket, created on first sight of a key, evicted once idle.
//!
//! # Example Usage
//!
//! ```ignore
//! use sidekick_lib::security::rate_limit::{Decision, LimiterRegistry};
//! use std::time::Duration;
//!
//! // 5 requests per 10 seconds per client
//! let registry = LimiterRegistry::new(5, Duration::from_secs(10), 100_000, Duration::from_secs(600));
//!
//! match registry.check("203.0.113.5") {
//!     Decision::Admitted { remaining, .. } => println!("{remaining} tokens left"),
//!     Decision::Rejected { retry_after, .. } => println!("retry in {retry_after:?}"),
//! }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [rate_limit]
//! capacity = 5
//! window_secs = 10
//! trusted_proxies = ["10.0.0.0/8"]
//! ```

mod bucket;
mod registry;

pub use bucket::{refill_rate_for, Decision, TokenBucket};
pub use registry::LimiterRegistry;
