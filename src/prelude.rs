//! Convenient re-exports for common slidegate types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    config::{Limits, LimitsBuilder, LiveLimits},
    error::{ActionError, ErrorKind, LimitError},
    protocol::{CallableRouter, RATE_LIMITED_ACTION},
    rate_limit::{
        rate_limited_action,
        store::{ClientRateRecord, ConditionalStore, DocumentStore, InMemoryStore},
        ActionResponse, CasWindowLimiter, Decision, LimiterBuilder, RateLimitLayer, RateLimiter,
        SlidingWindowLimiter,
    },
    telemetry::{LimiterEvent, LogSink, MemorySink, NullSink},
    validate::{validate, ClientId},
};
