#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # slidegate
//!
//! Per-client sliding-window rate limiting over a shared document store.
//!
//! ## Features
//!
//! - **Sliding window** accounting: each client may perform `max_actions` actions in any
//!   trailing window (default: 50 per 60 seconds)
//! - **Pluggable storage** via [`DocumentStore`]; durable backends live in companion crates
//! - **Tower middleware** ([`RateLimitLayer`]) guarding any `Service<serde_json::Value>`
//! - **Callable wire mapping** ([`protocol`]) for `{"data": ...}` style transports
//! - **Optional strict mode** ([`CasWindowLimiter`]) using compare-and-set writes
//!
//! ## Quick Start
//!
//! ```rust
//! use slidegate::{rate_limited_action, InMemoryStore, SlidingWindowLimiter};
//! use tower::ServiceExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = SlidingWindowLimiter::new(InMemoryStore::new());
//!     let action = rate_limited_action(limiter);
//!
//!     let resp = action.oneshot(serde_json::json!({ "clientId": "c1" })).await.unwrap();
//!     assert!(resp.success);
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod rate_limit;
pub mod telemetry;
pub mod validate;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BuildError, Limits, LiveLimits, MAX_ACTIONS_PER_MINUTE, WINDOW_MS};
pub use error::{ActionError, ErrorKind, LimitError};
pub use rate_limit::store::{ClientRateRecord, ConditionalStore, DocumentStore, InMemoryStore};
pub use rate_limit::{
    rate_limited_action, ActionResponse, CasWindowLimiter, Decision, LimiterBuilder,
    RateLimitLayer, RateLimitService, RateLimiter, SlidingWindowLimiter,
};
pub use validate::{validate, ClientId, ValidationError};
