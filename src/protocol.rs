//! Callable-style JSON wire mapping.
//!
//! Transports (HTTP, queues, in-process channels) hand a raw frame to
//! [`handle_frame`] or a [`CallableRouter`] and send back the bytes they get.
//!
//! - request: `{"data": <payload>}`
//! - success: `{"result": <response>}`
//! - failure: `{"error": {"status": "RESOURCE_EXHAUSTED", "message": "..."}}`

use crate::error::{ActionError, ErrorKind};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};

/// Name under which the limiter operation is conventionally registered.
pub const RATE_LIMITED_ACTION: &str = "rateLimitedAction";

/// Incoming call frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Untyped payload handed to the operation.
    pub data: Value,
}

/// Wire status of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    InvalidArgument,
    ResourceExhausted,
    Internal,
    NotFound,
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidArgument => Status::InvalidArgument,
            ErrorKind::ResourceExhausted => Status::ResourceExhausted,
            ErrorKind::Internal => Status::Internal,
        }
    }
}

/// Error body of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallError {
    pub status: Status,
    pub message: String,
}

impl From<&ActionError> for CallError {
    fn from(err: &ActionError) -> Self {
        CallError { status: err.kind().into(), message: err.message().to_string() }
    }
}

/// Outgoing call frame. Exactly one of `result` or `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallResponse {
    Result(Value),
    Error(CallError),
}

impl CallResponse {
    fn error(status: Status, message: impl Into<String>) -> Self {
        CallResponse::Error(CallError { status, message: message.into() })
    }

    /// Encode as JSON bytes.
    pub fn encode(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode call response");
                br#"{"error":{"status":"INTERNAL","message":"response encoding failed"}}"#.to_vec()
            }
        }
    }
}

/// Parse a raw request frame.
pub fn decode_request(frame: &[u8]) -> Result<CallRequest, CallError> {
    serde_json::from_slice(frame).map_err(|e| CallError {
        status: Status::InvalidArgument,
        message: format!("malformed call frame: {e}"),
    })
}

fn into_response<T: Serialize>(result: Result<T, ActionError>) -> CallResponse {
    match result {
        Ok(resp) => match serde_json::to_value(resp) {
            Ok(value) => CallResponse::Result(value),
            Err(e) => CallResponse::error(Status::Internal, e.to_string()),
        },
        Err(err) => CallResponse::Error(CallError::from(&err)),
    }
}

/// Drive one call frame through `service` and encode the outcome.
pub async fn handle_frame<S>(service: S, frame: &[u8]) -> Vec<u8>
where
    S: Service<Value, Error = ActionError>,
    S::Response: Serialize,
{
    let request = match decode_request(frame) {
        Ok(request) => request,
        Err(err) => return CallResponse::Error(err).encode(),
    };
    into_response(service.oneshot(request.data).await).encode()
}

type BoxedOperation = BoxCloneService<Value, Value, ActionError>;

/// Routes call frames to operations by name.
#[derive(Default)]
pub struct CallableRouter {
    routes: HashMap<String, BoxedOperation>,
}

impl std::fmt::Debug for CallableRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableRouter").field("operations", &self.names()).finish()
    }
}

impl CallableRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `name`, replacing any previous registration.
    pub fn register<S>(&mut self, name: impl Into<String>, service: S) -> &mut Self
    where
        S: Service<Value, Error = ActionError> + Clone + Send + 'static,
        S::Response: Serialize + 'static,
        S::Future: Send + 'static,
    {
        let service = service.map_result(|res| {
            res.and_then(|resp| serde_json::to_value(resp).map_err(ActionError::internal))
        });
        self.routes.insert(name.into(), BoxCloneService::new(service));
        self
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch one frame to the operation called `name`.
    pub fn dispatch(&self, name: &str, frame: &[u8]) -> BoxFuture<'static, Vec<u8>> {
        let Some(service) = self.routes.get(name).cloned() else {
            tracing::debug!(operation = name, "unknown operation");
            let body = CallResponse::error(Status::NotFound, format!("unknown operation: {name}"));
            return Box::pin(futures::future::ready(body.encode()));
        };
        let request = decode_request(frame);
        Box::pin(async move {
            match request {
                Ok(request) => into_response(service.oneshot(request.data).await).encode(),
                Err(err) => CallResponse::Error(err).encode(),
            }
        })
    }
}
