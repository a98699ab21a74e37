//! Per-request execution context.
//!
//! One [`Context`] exists per inbound request. It is a cheap handle (one
//! `Arc` plus a cancellation scope) so it can be moved into middleware
//! futures and, for the timeout middleware, into a second task. Clones share
//! everything that matters:
//!
//! - the chain cursor, which only moves forward,
//! - the write guard and the timed-out flag, the only cross-task
//!   coordination points,
//! - the scratch map middlewares use to talk to each other.
//!
//! Only the scope differs between clones: the timeout middleware hands its
//! worker a clone bound to a tighter deadline.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use http::HeaderMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::chain::{Chain, Stage};
use crate::config::Config;
use crate::error::Result;
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::scope::{Scope, ScopeError};
use crate::services::Services;
use crate::writer::{ResponseState, WriteGuard};

const JSONP_CALLBACK_PARAM: &str = "callback";
const JSONP_DEFAULT_CALLBACK: &str = "callback_function";

/// Process-wide state every request can read.
#[derive(Debug, Default)]
pub(crate) struct AppState {
    pub(crate) config: Config,
    pub(crate) services: Services,
}

struct Shared {
    request: Request,
    app: Arc<AppState>,
    chain: OnceLock<Chain>,
    /// Position of the next stage to run. Starts before the first middleware.
    cursor: AtomicUsize,
    writer: tokio::sync::Mutex<ResponseState>,
    timed_out: AtomicBool,
    scratch: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

/// Handle to the request being served.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
    scope: Scope,
}

impl Context {
    pub(crate) fn new(request: Request, app: Arc<AppState>, staged: HeaderMap, scope: Scope) -> Self {
        Self {
            shared: Arc::new(Shared {
                request,
                app,
                chain: OnceLock::new(),
                cursor: AtomicUsize::new(0),
                writer: tokio::sync::Mutex::new(ResponseState::new(staged)),
                timed_out: AtomicBool::new(false),
                scratch: Mutex::new(HashMap::new()),
            }),
            scope,
        }
    }

    /// Bind the chain this request will run. Only the first call has effect.
    pub(crate) fn attach(&self, chain: Chain) {
        let _ = self.shared.chain.set(chain);
    }

    /// Same request, different cancellation scope.
    pub(crate) fn with_scope(&self, scope: Scope) -> Self {
        Self { shared: Arc::clone(&self.shared), scope }
    }

    // ── Chain protocol ────────────────────────────────────────────────────────

    /// Hand control to the rest of the chain.
    ///
    /// Each call advances the cursor by one and runs whatever sits there: the
    /// next middleware, or the route handler once the middlewares are used
    /// up. Calls past the handler do nothing and return `Ok`. The result is
    /// the first error raised further down the chain.
    pub async fn next(&self) -> Result<()> {
        let Some(chain) = self.shared.chain.get() else {
            return Ok(());
        };
        let position = self.shared.cursor.fetch_add(1, Ordering::AcqRel);
        match chain.stage(position) {
            Stage::Middleware(middleware) => middleware.handle(self.clone()).await,
            Stage::Handler(handler) => {
                if let Some(response) = handler.call(self.clone()).await {
                    self.respond(response).await;
                }
                Ok(())
            }
            Stage::Done => Ok(()),
        }
    }

    // ── Timeout flag ──────────────────────────────────────────────────────────

    /// Record that the timeout response went out. One-way.
    pub fn mark_timed_out(&self) {
        self.shared.timed_out.store(true, Ordering::Release);
    }

    pub fn is_timed_out(&self) -> bool {
        self.shared.timed_out.load(Ordering::Acquire)
    }

    // ── Writing ───────────────────────────────────────────────────────────────

    /// Acquire the write guard. Hold it for the whole of a write and check
    /// [`WriteGuard::is_finalized`] before deciding what to write.
    pub async fn writer(&self) -> WriteGuard<'_> {
        WriteGuard::new(self.shared.writer.lock().await, &self.shared.timed_out)
    }

    /// Commit `response` unless one was already committed. Returns whether
    /// this call was the one that wrote.
    pub async fn respond(&self, response: Response) -> bool {
        self.writer().await.send(response)
    }

    /// Commit `value` as a JSONP call. The callback name comes from the
    /// `callback` query parameter and is reduced to identifier characters.
    pub async fn jsonp<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        let callback = self
            .request()
            .query(JSONP_CALLBACK_PARAM)
            .unwrap_or_else(|| JSONP_DEFAULT_CALLBACK.to_owned());
        let callback: String = callback
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
            .collect();
        let response = match serde_json::to_string(value) {
            Ok(json) => Response::builder().bytes(ContentType::JavaScript, format!("{callback}({json})")),
            Err(_) => Response::status(http::StatusCode::INTERNAL_SERVER_ERROR),
        };
        self.respond(response).await
    }

    /// Seal the response and hand it to the connection.
    pub(crate) async fn finish(&self) -> http::Response<http_body_util::Full<bytes::Bytes>> {
        self.writer().await.take()
    }

    // ── Request, config and services ─────────────────────────────────────────

    pub fn request(&self) -> &Request {
        &self.shared.request
    }

    pub fn config(&self) -> &Config {
        &self.shared.app.config
    }

    /// Singleton service registered on the engine under `name`.
    pub fn service<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.shared.app.services.get(name)
    }

    /// Fresh instance from the factory registered under `name`.
    pub fn instance<T: Send + 'static>(&self, name: &str) -> Option<T> {
        self.shared.app.services.instance(name)
    }

    // ── Scratch values ────────────────────────────────────────────────────────

    /// Store a request-scoped value. Last write wins.
    pub fn set_value<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.scratch().insert(key.into(), Arc::new(value));
    }

    /// Look up a request-scoped value. `None` when absent or of another type.
    pub fn value<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let value = Arc::clone(self.scratch().get(key)?);
        value.downcast_ref::<T>().cloned()
    }

    fn scratch(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Any + Send + Sync>>> {
        self.shared.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scope.deadline()
    }

    /// Resolves when the request is cancelled or its deadline passes.
    pub async fn done(&self) -> ScopeError {
        self.scope.done().await
    }

    /// `None` while the request is still wanted.
    pub fn err(&self) -> Option<ScopeError> {
        self.scope.err()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request().method())
            .field("path", &self.request().path())
            .field("cursor", &self.shared.cursor.load(Ordering::Relaxed))
            .field("timed_out", &self.is_timed_out())
            .finish()
    }
}
