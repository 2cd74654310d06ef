//! Request-scoped context, replacing the source system's `ContextVar`.
//!
//! The source carries `sandbox_id` in a Python `contextvars.ContextVar` so
//! that log lines emitted deep inside request handling can report which
//! sandbox they're about. `tokio::task_local!` is the direct analogue: a
//! value scoped to the async task driving one request, not a process-global.

use tokio::task_local;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub sandbox_id: Option<String>,
    pub trace_id: Option<String>,
}

task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Runs `f` with the given context installed for the duration of the future.
pub async fn scope<F, T>(ctx: RequestContext, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    REQUEST_CONTEXT.scope(ctx, f).await
}

/// Reads the current request's `sandbox_id`, or `None` outside of a scope
/// (or when the request body carried no `sandbox_id` field).
pub fn current_sandbox_id() -> Option<String> {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.sandbox_id.clone())
        .unwrap_or(None)
}

pub fn current_trace_id() -> Option<String> {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .unwrap_or(None)
}
