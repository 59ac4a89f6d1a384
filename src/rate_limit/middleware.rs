use crate::error::ActionError;
use crate::rate_limit::{Decision, RateLimiter};
use crate::validate::validate;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Message returned with every admitted action.
pub const ALLOWED_MESSAGE: &str = "Action allowed.";

/// Success payload of `rateLimitedAction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn allowed() -> Self {
        Self { success: true, message: ALLOWED_MESSAGE.to_string() }
    }
}

/// A layer that validates the payload and enforces limits using a [`RateLimiter`].
#[derive(Debug)]
pub struct RateLimitLayer<L> {
    limiter: Arc<L>,
}

impl<L> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone() }
    }
}

impl<L> RateLimitLayer<L> {
    pub fn new(limiter: L) -> Self {
        Self { limiter: Arc::new(limiter) }
    }

    /// Share a limiter that other layers or callers also hold.
    pub fn from_shared(limiter: Arc<L>) -> Self {
        Self { limiter }
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L>
where
    L: RateLimiter + 'static,
{
    type Service = RateLimitService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, limiter: self.limiter.clone() }
    }
}

/// Middleware service: validate, check, then forward admitted requests to `inner`.
///
/// Rejected and invalid requests never reach `inner`.
#[derive(Debug)]
pub struct RateLimitService<S, L> {
    inner: S,
    limiter: Arc<L>,
}

impl<S: Clone, L> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), limiter: self.limiter.clone() }
    }
}

impl<S, L> Service<Value> for RateLimitService<S, L>
where
    S: Service<Value> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<ActionError>,
    L: RateLimiter + 'static,
{
    type Response = S::Response;
    type Error = ActionError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Value) -> Self::Future {
        let limiter = self.limiter.clone();
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let client = validate(&req).map_err(|e| {
                tracing::debug!(error = %e, "rejecting malformed request");
                ActionError::from(e)
            })?;

            match limiter.check(&client).await {
                Ok(Decision::Admitted { .. }) => inner.call(req).await.map_err(Into::into),
                Ok(Decision::Rejected { retry_after, .. }) => {
                    Err(ActionError::rate_limited(retry_after))
                }
                Err(e) => Err(ActionError::from(e)),
            }
        })
    }
}

/// Inner service that answers every forwarded request with [`ActionResponse::allowed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAction;

impl Service<Value> for AllowAction {
    type Response = ActionResponse;
    type Error = ActionError;
    type Future = futures::future::Ready<Result<ActionResponse, ActionError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Value) -> Self::Future {
        futures::future::ready(Ok(ActionResponse::allowed()))
    }
}

/// The complete `rateLimitedAction` operation backed by `limiter`.
pub fn rate_limited_action<L>(limiter: L) -> RateLimitService<AllowAction, L>
where
    L: RateLimiter + 'static,
{
    RateLimitLayer::new(limiter).layer(AllowAction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Limits;
    use crate::error::ErrorKind;
    use crate::rate_limit::store::InMemoryStore;
    use crate::rate_limit::SlidingWindowLimiter;
    use serde_json::json;
    use tower::ServiceExt;

    type Action = RateLimitService<AllowAction, SlidingWindowLimiter<InMemoryStore>>;

    fn service(store: InMemoryStore, max: u32) -> Action {
        let limiter = SlidingWindowLimiter::builder(store)
            .clock(ManualClock::new(0))
            .limits(Limits::builder().max_actions(max).build().unwrap())
            .build();
        rate_limited_action(limiter)
    }

    #[tokio::test]
    async fn admitted_request_gets_success_payload() {
        let svc = service(InMemoryStore::new(), 2);
        let resp = svc.oneshot(json!({ "clientId": "c1" })).await.unwrap();
        assert_eq!(resp, ActionResponse { success: true, message: "Action allowed.".into() });
    }

    #[tokio::test]
    async fn invalid_payload_never_touches_store() {
        let store = InMemoryStore::new();
        let svc = service(store.clone(), 2);
        let err = svc.oneshot(json!({ "clientId": 12 })).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message(), "Missing or invalid 'clientId'.");
        assert_eq!(store.stats().reads, 0);
        assert_eq!(store.stats().writes, 0);
    }

    #[tokio::test]
    async fn over_limit_is_resource_exhausted() {
        let mut svc = service(InMemoryStore::new(), 1);
        let req = json!({ "clientId": "c1" });
        svc.ready().await.unwrap().call(req.clone()).await.unwrap();
        let err = svc.ready().await.unwrap().call(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(err.message(), "Rate limit exceeded. Please try again later.");
    }

    #[derive(Clone)]
    struct Counting(Arc<std::sync::atomic::AtomicUsize>);

    impl Service<Value> for Counting {
        type Response = ();
        type Error = ActionError;
        type Future = futures::future::Ready<Result<(), ActionError>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Value) -> Self::Future {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn layer_only_forwards_admitted_requests() {
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let limiter = SlidingWindowLimiter::builder(InMemoryStore::new())
            .clock(ManualClock::new(0))
            .limits(Limits::builder().max_actions(3).build().unwrap())
            .build();
        let mut svc = RateLimitLayer::new(limiter).layer(Counting(hits.clone()));

        let mut rejected = 0;
        for _ in 0..5 {
            let res = svc.ready().await.unwrap().call(json!({ "clientId": "c1" })).await;
            if res.is_err() {
                rejected += 1;
            }
        }
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(rejected, 2);
    }

    #[test]
    fn response_serializes_to_callable_shape() {
        let body = serde_json::to_value(ActionResponse::allowed()).unwrap();
        assert_eq!(body, json!({ "success": true, "message": "Action allowed." }));
    }
}
