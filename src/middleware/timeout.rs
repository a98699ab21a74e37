//! Per-request deadline.

use std::time::Duration;

use http::StatusCode;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::BoxFuture;
use crate::middleware::Middleware;

/// Body of the response sent when the deadline wins. Serialized as JSON.
pub(crate) const TIMEOUT_BODY: &str = "time out";

/// Race the rest of the chain against a deadline.
///
/// The remainder of the chain runs on its own task, bound to a child scope
/// that expires after `duration`. Three outcomes:
///
/// - **worker finishes first**: its result is returned untouched; whatever
///   the handler wrote stands.
/// - **worker panics**: the panic is re-raised here so an outer
///   [`Recovery`](super::Recovery) can turn it into a `500`.
/// - **deadline passes**: under the write guard, if nothing was written yet,
///   `500 "time out"` is committed and the request is marked timed out. The
///   worker is not aborted: it runs to completion in the background and its
///   late writes are dropped by the guard.
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Middleware for Timeout {
    fn handle(&self, ctx: Context) -> BoxFuture<Result<()>> {
        let duration = self.duration;
        Box::pin(async move {
            let scope = ctx.scope().with_timeout(duration);
            let worker_ctx = ctx.with_scope(scope.clone());
            let mut worker = tokio::spawn(async move { worker_ctx.next().await });

            tokio::select! {
                biased;

                joined = &mut worker => match joined {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(e) => Err(Error::Worker(e.to_string())),
                },

                reason = scope.done() => {
                    let mut writer = ctx.writer().await;
                    if writer.is_finalized() {
                        debug!(%reason, "deadline reached after the response was written");
                    } else {
                        writer.status(StatusCode::INTERNAL_SERVER_ERROR).json(TIMEOUT_BODY);
                        ctx.mark_timed_out();
                        warn!(
                            method = %ctx.request().method(),
                            path = ctx.request().path(),
                            timeout_ms = duration.as_millis() as u64,
                            %reason,
                            "request timed out",
                        );
                    }
                    drop(writer);
                    // Cooperative only: the worker keeps running until it returns.
                    scope.cancel();
                    Ok(())
                }
            }
        })
    }
}
