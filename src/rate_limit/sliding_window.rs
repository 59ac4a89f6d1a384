use crate::clock::{Clock, SystemClock};
use crate::config::{BuildError, Limits, LiveLimits};
use crate::error::LimitError;
use crate::rate_limit::store::{ClientRateRecord, ConditionalStore, DocumentStore};
use crate::rate_limit::window::{self, Evaluation};
use crate::rate_limit::{Decision, RateLimiter};
use crate::telemetry::{emit_best_effort, LimiterEvent, NullSink, TelemetrySink};
use crate::validate::ClientId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tower::Service;

// State shared by both write strategies.
struct Core<S, K> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    limits: LiveLimits,
    sink: K,
}

impl<S, K> Core<S, K>
where
    S: DocumentStore + 'static,
    K: TelemetrySink,
    <K as Service<LimiterEvent>>::Future: Send + 'static,
{
    async fn emit(&self, event: LimiterEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }

    async fn admitted(&self, client: &ClientId, in_window: usize, limits: &Limits) -> Decision {
        let count = saturating_u32(in_window);
        let remaining = limits.max_actions().saturating_sub(count);
        tracing::debug!(client = %client, count, remaining, "action admitted");
        self.emit(LimiterEvent::Admitted { client: client.to_string(), count, remaining }).await;
        Decision::Admitted { count, remaining }
    }

    async fn rejected(
        &self,
        client: &ClientId,
        in_window: usize,
        retry_after: Duration,
    ) -> Decision {
        let count = saturating_u32(in_window);
        tracing::info!(client = %client, count, ?retry_after, "rate limit exceeded");
        self.emit(LimiterEvent::Rejected { client: client.to_string(), count, retry_after }).await;
        Decision::Rejected { count, retry_after }
    }

    async fn store_failed(&self, client: &ClientId, err: S::Error) -> LimitError {
        tracing::warn!(client = %client, error = %err, "document store failure");
        self.emit(LimiterEvent::StoreFailed { client: client.to_string(), error: err.to_string() })
            .await;
        LimitError::store(err)
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Sliding-window limiter that overwrites the client's record after a plain read.
///
/// One read per call and, on admission only, one full-value write. No lock and no
/// version check: concurrent calls for the same client can both admit and the later
/// write drops the earlier timestamp. Use [`CasWindowLimiter`] when that looseness is
/// not acceptable.
pub struct SlidingWindowLimiter<S, K = NullSink> {
    core: Core<S, K>,
}

/// Sliding-window limiter that commits through versioned compare-and-set writes.
///
/// On conflict the record is re-read and the decision re-evaluated, up to
/// `max_attempts` times; after that the call fails with [`LimitError::Contention`].
pub struct CasWindowLimiter<S, K = NullSink> {
    core: Core<S, K>,
    max_attempts: u32,
}

macro_rules! accessors {
    ($ty:ident) => {
        impl<S, K> $ty<S, K> {
            /// The backing document store.
            pub fn store(&self) -> &S {
                &self.core.store
            }

            /// Current limits snapshot.
            pub fn limits(&self) -> Limits {
                self.core.limits.load()
            }

            /// Replace the limits; calls already in flight keep the old values.
            pub fn set_limits(&self, limits: Limits) {
                self.core.limits.store(limits);
            }

            /// Live handle for wiring the limits into an operator-facing config layer.
            pub fn limits_handle(&self) -> LiveLimits {
                self.core.limits.clone()
            }
        }

        impl<S, K> std::fmt::Debug for $ty<S, K> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("limits", &self.limits())
                    .field("clock", &self.core.clock)
                    .finish_non_exhaustive()
            }
        }
    };
}

accessors!(SlidingWindowLimiter);
accessors!(CasWindowLimiter);

impl<S> SlidingWindowLimiter<S, NullSink>
where
    S: DocumentStore + 'static,
{
    /// Limiter with the default 50-per-minute limits and the system clock.
    pub fn new(store: S) -> Self {
        LimiterBuilder::new(store).build()
    }

    pub fn builder(store: S) -> LimiterBuilder<S, NullSink> {
        LimiterBuilder::new(store)
    }
}

impl<S, K> SlidingWindowLimiter<S, K>
where
    S: DocumentStore + 'static,
    K: TelemetrySink,
    <K as Service<LimiterEvent>>::Future: Send + 'static,
{
    /// Decide on one action for `client` at `now` (epoch milliseconds).
    ///
    /// A rejection performs no write at all: stale entries stay in the stored record
    /// until a later admitted call prunes them.
    pub async fn check_and_record(
        &self,
        client: &ClientId,
        now: i64,
    ) -> Result<Decision, LimitError> {
        let core = &self.core;
        let limits = core.limits.load();

        let history = match core.store.get(client.as_str()).await {
            Ok(record) => record.map(|r| r.actions).unwrap_or_default(),
            Err(e) => return Err(core.store_failed(client, e).await),
        };

        match window::evaluate(&history, now, &limits) {
            Evaluation::Reject { in_window, retry_after } => {
                Ok(core.rejected(client, in_window, retry_after).await)
            }
            Evaluation::Admit { next } => {
                let in_window = next.len();
                let record = ClientRateRecord::new(next);
                if let Err(e) = core.store.set(client.as_str(), &record).await {
                    return Err(core.store_failed(client, e).await);
                }
                Ok(core.admitted(client, in_window, &limits).await)
            }
        }
    }
}

impl<S, K> CasWindowLimiter<S, K>
where
    S: ConditionalStore + 'static,
    K: TelemetrySink,
    <K as Service<LimiterEvent>>::Future: Send + 'static,
{
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide on one action for `client` at `now`, committing with a versioned write.
    pub async fn check_and_record(
        &self,
        client: &ClientId,
        now: i64,
    ) -> Result<Decision, LimitError> {
        let core = &self.core;
        let limits = core.limits.load();

        for attempt in 1..=self.max_attempts {
            let (history, version) = match core.store.get_versioned(client.as_str()).await {
                Ok(Some(current)) => (current.record.actions, Some(current.version)),
                Ok(None) => (Vec::new(), None),
                Err(e) => return Err(core.store_failed(client, e).await),
            };

            let next = match window::evaluate(&history, now, &limits) {
                Evaluation::Reject { in_window, retry_after } => {
                    return Ok(core.rejected(client, in_window, retry_after).await);
                }
                Evaluation::Admit { next } => next,
            };

            let in_window = next.len();
            let record = ClientRateRecord::new(next);
            match core.store.set_if_version(client.as_str(), &record, version).await {
                Ok(true) => return Ok(core.admitted(client, in_window, &limits).await),
                Ok(false) => {
                    tracing::debug!(client = %client, attempt, "concurrent write detected");
                    core.emit(LimiterEvent::Conflict { client: client.to_string(), attempt }).await;
                }
                Err(e) => return Err(core.store_failed(client, e).await),
            }
        }

        tracing::warn!(
            client = %client,
            attempts = self.max_attempts,
            "gave up on contended record"
        );
        Err(LimitError::Contention { attempts: self.max_attempts })
    }
}

#[async_trait]
impl<S, K> RateLimiter for SlidingWindowLimiter<S, K>
where
    S: DocumentStore + 'static,
    K: TelemetrySink,
    <K as Service<LimiterEvent>>::Future: Send + 'static,
{
    async fn check(&self, client: &ClientId) -> Result<Decision, LimitError> {
        let now = self.core.clock.now_millis();
        self.check_and_record(client, now).await
    }
}

#[async_trait]
impl<S, K> RateLimiter for CasWindowLimiter<S, K>
where
    S: ConditionalStore + 'static,
    K: TelemetrySink,
    <K as Service<LimiterEvent>>::Future: Send + 'static,
{
    async fn check(&self, client: &ClientId) -> Result<Decision, LimitError> {
        let now = self.core.clock.now_millis();
        self.check_and_record(client, now).await
    }
}

/// Builder wiring a store, clock, limits and telemetry sink into a limiter.
pub struct LimiterBuilder<S, K = NullSink> {
    store: S,
    clock: Arc<dyn Clock>,
    limits: Limits,
    sink: K,
}

impl<S> LimiterBuilder<S, NullSink> {
    pub fn new(store: S) -> Self {
        Self { store, clock: Arc::new(SystemClock), limits: Limits::default(), sink: NullSink }
    }
}

impl<S, K> LimiterBuilder<S, K> {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Attach a telemetry sink receiving one event per decision.
    pub fn with_sink<K2>(self, sink: K2) -> LimiterBuilder<S, K2> {
        LimiterBuilder { store: self.store, clock: self.clock, limits: self.limits, sink }
    }

    fn core(self) -> Core<S, K> {
        Core {
            store: Arc::new(self.store),
            clock: self.clock,
            limits: LiveLimits::new(self.limits),
            sink: self.sink,
        }
    }

    /// Build the overwrite limiter.
    pub fn build(self) -> SlidingWindowLimiter<S, K> {
        SlidingWindowLimiter { core: self.core() }
    }
}

impl<S, K> LimiterBuilder<S, K>
where
    S: ConditionalStore,
{
    /// Build the compare-and-set limiter.
    pub fn build_compare_and_set(
        self,
        max_attempts: u32,
    ) -> Result<CasWindowLimiter<S, K>, BuildError> {
        if max_attempts == 0 {
            return Err(BuildError::InvalidAttempts);
        }
        Ok(CasWindowLimiter { core: self.core(), max_attempts })
    }
}
