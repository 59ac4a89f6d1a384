//! Sliding-window rate limiting.
//!
//! This module provides the building blocks:
//! - [`RateLimiter`]: the core trait, keyed by [`ClientId`].
//! - [`Decision`]: the result of a check (Admitted/Rejected).
//! - [`RateLimitLayer`]: tower middleware that validates the payload and asks a `RateLimiter`.
//!
//! # Architecture
//!
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how* limiting works,
//!   only that it should ask a `RateLimiter`.
//! - **Logic**: `window::evaluate` holds the pure pruning/threshold arithmetic and
//!   `SlidingWindowLimiter` runs it against stored history.
//! - **Storage**: `DocumentStore` (in `store` module) keeps one record per client, enabling
//!   in-memory or durable backends (see the `slidegate-fs` crate).
//!
//! # Concurrency
//!
//! [`SlidingWindowLimiter`] reads the record, decides, and overwrites it with no lock or
//! version check. Two concurrent calls for one client can both admit and the later write
//! drops the earlier timestamp, so bursts may briefly exceed the threshold.
//! [`CasWindowLimiter`] closes that gap on stores implementing [`store::ConditionalStore`].

use std::time::Duration;

use crate::error::LimitError;
use crate::validate::ClientId;

pub mod middleware;
pub mod sliding_window;
pub mod store;
pub mod window;

pub use middleware::{
    rate_limited_action, ActionResponse, AllowAction, RateLimitLayer, RateLimitService,
};
pub use sliding_window::{CasWindowLimiter, LimiterBuilder, SlidingWindowLimiter};

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The action was admitted and recorded.
    Admitted {
        /// Actions in the window including this one.
        count: u32,
        /// Actions still available in the window.
        /// Useful for `X-RateLimit-Remaining` headers.
        remaining: u32,
    },
    /// The action was refused; nothing was written.
    Rejected {
        /// Actions counted in the window.
        count: u32,
        /// How long until one more action would fit.
        /// Useful for `Retry-After` headers.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// Core interface for per-client rate limiting.
///
/// Decouples the middleware from the accounting scheme and the storage backend.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide on one action for `client` at the current time, recording it if admitted.
    async fn check(&self, client: &ClientId) -> Result<Decision, LimitError>;
}
