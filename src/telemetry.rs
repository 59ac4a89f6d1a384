//! Telemetry for limiter decisions.
//!
//! Every decision emits a [`LimiterEvent`] to a [`TelemetrySink`]. Sinks are plain
//! `tower::Service<LimiterEvent>` implementations, so they compose with standard tower
//! combinators.
//!
//! ```rust
//! use slidegate::telemetry::{LimiterEvent, MemorySink};
//! use tower::Service;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut sink = MemorySink::new();
//! let event = LimiterEvent::Admitted { client: "c1".into(), count: 1, remaining: 49 };
//! sink.call(event.clone()).await.unwrap();
//! assert_eq!(sink.events(), vec![event]);
//! # }
//! ```

use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// Events emitted by the limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterEvent {
    /// An action was admitted and its timestamp written.
    Admitted {
        client: String,
        /// Actions in the window including this one
        count: u32,
        remaining: u32,
    },
    /// An action was rejected; no write happened.
    Rejected { client: String, count: u32, retry_after: Duration },
    /// A read or write against the document store failed.
    StoreFailed { client: String, error: String },
    /// A conditional write lost to a concurrent writer.
    Conflict { client: String, attempt: u32 },
}

impl fmt::Display for LimiterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterEvent::Admitted { client, count, remaining } => {
                write!(
                    f,
                    "Limiter::Admitted(client={client}, count={count}, remaining={remaining})"
                )
            }
            LimiterEvent::Rejected { client, count, retry_after } => {
                write!(
                    f,
                    "Limiter::Rejected(client={client}, count={count}, retry_after={retry_after:?})"
                )
            }
            LimiterEvent::StoreFailed { client, error } => {
                write!(f, "Limiter::StoreFailed(client={client}, error={error})")
            }
            LimiterEvent::Conflict { client, attempt } => {
                write!(f, "Limiter::Conflict(client={client}, attempt={attempt})")
            }
        }
    }
}

/// A telemetry sink that consumes limiter events.
pub trait TelemetrySink:
    Service<LimiterEvent, Response = (), Error = Self::SinkError> + Clone + Send + Sync + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// If a sink is not ready or returns an error, the event is dropped; a broken sink
/// never changes a decision.
pub async fn emit_best_effort<S>(sink: S, event: LimiterEvent)
where
    S: Service<LimiterEvent, Response = ()> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    let mut ready_sink = match sink.ready_oneshot().await {
        Ok(ready_sink) => ready_sink,
        Err(_) => return,
    };
    let _ = ready_sink.call(event).await;
}

type SinkFuture<E> = Pin<Box<dyn std::future::Future<Output = Result<(), E>> + Send>>;

/// Sink that discards every event.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<LimiterEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: LimiterEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// Sink that logs events with `tracing` at INFO level.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<LimiterEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: LimiterEvent) -> Self::Future {
        tracing::info!(event = %event, "limiter_event");
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// Sink that keeps events in memory. Oldest events are evicted past `capacity`.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LimiterEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Bounded sink (default cap: 10,000).
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of all events received so far.
    pub fn events(&self) -> Vec<LimiterEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LimiterEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<LimiterEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: LimiterEvent) -> Self::Future {
        let mut events = self.lock();
        if events.len() >= self.capacity {
            events.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}
