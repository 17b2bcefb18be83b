use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{header::HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// X-Request-Id middleware
// ---------------------------------------------------------------------------

/// Header name for request ID propagation.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest client-supplied request ID that is reused as-is.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Layer that tags every request with an `X-Request-Id`.
///
/// A well-formed incoming ID is reused; anything else (absent, too long, or
/// containing characters outside `[A-Za-z0-9._-]`) is replaced by a fresh
/// UUIDv4. The ID is echoed on the response and attached to a `request`
/// tracing span wrapping the inner service, so every log line of an upload
/// carries it.
#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdMiddleware<S> {
    inner: S,
}

fn is_acceptable_request_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Reuse the caller's request ID when acceptable, otherwise mint one.
pub fn resolve_request_id(incoming: Option<&HeaderValue>) -> String {
    incoming
        .and_then(|v| v.to_str().ok())
        .filter(|v| is_acceptable_request_id(v))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestIdMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let request_id = resolve_request_id(req.headers().get(&X_REQUEST_ID));
        let header = HeaderValue::from_str(&request_id).ok();

        if let Some(val) = header.clone() {
            req.headers_mut().insert(X_REQUEST_ID.clone(), val);
        }

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        // Swap in the clone that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let mut response = inner.call(req).await?;
                if let Some(val) = header {
                    response.headers_mut().insert(X_REQUEST_ID.clone(), val);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}
