//! One log line per request.

use tokio::time::Instant;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::Result;
use crate::handler::BoxFuture;
use crate::middleware::Middleware;

/// Logs method, path, final status and latency once the rest of the chain
/// returns. Chain errors are logged at `warn` and passed through.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn handle(&self, ctx: Context) -> BoxFuture<Result<()>> {
        Box::pin(async move {
            let started = Instant::now();
            let result = ctx.next().await;
            let status = ctx.writer().await.status_code();
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let req = ctx.request();

            match &result {
                Ok(()) => info!(
                    method = %req.method(),
                    path = req.path(),
                    status = status.as_u16(),
                    elapsed_ms,
                    timed_out = ctx.is_timed_out(),
                    "request",
                ),
                Err(e) => warn!(
                    method = %req.method(),
                    path = req.path(),
                    elapsed_ms,
                    error = %e,
                    "request failed",
                ),
            }
            result
        })
    }
}
