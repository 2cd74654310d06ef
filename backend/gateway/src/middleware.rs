//! Access-log middleware.
//!
//! Mirrors the source's `log_requests_and_responses` middleware: an entry
//! log line with method/url/body, an exit log line with status and elapsed
//! time, and `sandbox_id` threaded through a request-scoped context variable
//! (peeked out of the JSON body here, since the body is the only place most
//! of these endpoints carry it) so downstream log lines can tag it without
//! passing it explicitly through every call.

use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use rockhold_core::context::{self, RequestContext};
use tracing::info;
use uuid::Uuid;

const MAX_BODY_PEEK: usize = 10 * 1024 * 1024;

pub async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let trace_id = req
        .headers()
        .get("EagleEye-TraceId")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_BODY_PEEK).await.unwrap_or_default();
    let sandbox_id = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| v.get("sandbox_id").and_then(|s| s.as_str()).map(|s| s.to_string()));
    let req = Request::from_parts(parts, Body::from(bytes));

    let ctx = RequestContext { sandbox_id: sandbox_id.clone(), trace_id: Some(trace_id.clone()) };
    let start = Instant::now();

    info!(method = %method, uri = %uri, sandbox_id = ?sandbox_id, trace_id = %trace_id, "request received");

    let response = context::scope(ctx, next.run(req)).await;

    let process_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        process_time_ms,
        trace_id = %trace_id,
        "request completed"
    );

    response
}
