//! Route registration and request dispatch.
//!
//! [`Engine`] is the startup-time builder. [`Engine::build`] freezes it into a
//! [`Dispatcher`], which is read-only from then on and shared by every
//! connection without locking.
//!
//! # Dispatch, step by step
//!
//! ```text
//! request
//!   ├─ CORS headers staged (if enabled)
//!   ├─ /favicon.ico, unrouted OPTIONS ─────────────────► 200, empty
//!   ├─ mounted prefix? ──► mount handler ──────────────► its response
//!   ├─ route lookup miss ──────────────────────────────► 404 "404 not found"
//!   └─ hit: global ++ group ++ route middlewares ++ handler
//!         ├─ Err, nothing written ─────────────────────► 500 <error text>
//!         └─ Ok ───────────────────────────────────────► whatever was written
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    HeaderValue,
};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::{debug, error, warn};

use crate::chain::Chain;
use crate::config::Config;
use crate::context::{AppState, Context};
use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, Middleware, boxed};
use crate::request::Request;
use crate::router::{Group, Route, RouteTable};
use crate::scope::Scope;
use crate::services::Services;

const FAVICON_PATH: &str = "/favicon.ico";
const NOT_FOUND_BODY: &str = "404 not found";

struct Mount {
    prefix: String,
    handler: BoxedHandler,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Application builder.
///
/// Every registration returns `self` so calls chain. A duplicate route does
/// not panic here; the first one is kept and [`Engine::build`] reports the
/// conflict so startup can abort.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use waypost::middleware::{Recovery, Timeout, Trace};
/// use waypost::{Context, Engine, Route};
///
/// async fn hello(_ctx: Context) -> &'static str { "world" }
///
/// let dispatcher = Engine::new()
///     .middleware(Recovery::new())
///     .middleware(Trace)
///     .get("/hello", hello)
///     .route(Route::get("/slow", hello).middleware(Timeout::new(Duration::from_secs(1))))
///     .build()
///     .unwrap();
/// ```
pub struct Engine {
    config: Config,
    services: Services,
    routes: RouteTable,
    global: Vec<BoxedMiddleware>,
    groups: HashMap<String, Vec<BoxedMiddleware>>,
    mounts: Vec<Mount>,
    error: Option<Error>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            services: Services::new(),
            routes: RouteTable::new(),
            global: Vec::new(),
            groups: HashMap::new(),
            mounts: Vec::new(),
            error: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Append a global middleware. Globals run before group and route ones,
    /// in registration order.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.global.push(boxed(middleware));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self { self.route(Route::get(path, handler)) }
    pub fn post(self, path: &str, handler: impl Handler) -> Self { self.route(Route::post(path, handler)) }
    pub fn put(self, path: &str, handler: impl Handler) -> Self { self.route(Route::put(path, handler)) }
    pub fn delete(self, path: &str, handler: impl Handler) -> Self { self.route(Route::delete(path, handler)) }

    /// Register a route built with [`Route`], e.g. one with its own middlewares.
    pub fn route(mut self, route: Route) -> Self {
        self.register("", route);
        self
    }

    /// Register every route of `group` under its prefix. Middlewares of
    /// groups sharing a prefix accumulate.
    pub fn group(mut self, group: Group) -> Self {
        let (prefix, middlewares, routes) = group.into_parts();
        self.groups.entry(prefix.clone()).or_default().extend(middlewares);
        for route in routes {
            self.register(&prefix, route);
        }
        self
    }

    /// Hand every request whose path starts with `prefix` to `handler`,
    /// before route matching and without running any middleware. For static
    /// assets, documentation UIs and similar sub-routers.
    pub fn mount(mut self, prefix: &str, handler: impl Handler) -> Self {
        self.mounts.push(Mount { prefix: prefix.to_owned(), handler: handler.into_boxed_handler() });
        self
    }

    /// Send permissive CORS headers on every response.
    pub fn cross_origin(mut self) -> Self {
        self.config.http.cross_origin = true;
        self
    }

    /// Register a singleton service, resolved with [`Context::service`].
    pub fn service<T: Send + Sync + 'static>(mut self, name: &str, service: T) -> Self {
        self.services.singleton(name, service);
        self
    }

    /// Register a service factory, resolved with [`Context::instance`].
    pub fn factory<T, F>(mut self, name: &str, make: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.services.factory(name, make);
        self
    }

    fn register(&mut self, prefix: &str, route: Route) {
        if let Err(e) = self.routes.register(prefix, route) {
            error!("{e}");
            self.error.get_or_insert(e);
        }
    }

    /// Freeze the configuration. Fails with the first registration error.
    pub fn build(self) -> Result<Dispatcher> {
        if let Some(e) = self.error {
            return Err(e);
        }
        debug!(routes = self.routes.len(), globals = self.global.len(), "engine built");
        Ok(Dispatcher {
            routes: self.routes,
            global: self.global,
            groups: self.groups,
            mounts: self.mounts,
            app: Arc::new(AppState { config: self.config, services: self.services }),
        })
    }
}

impl Default for Engine {
    fn default() -> Self { Self::new() }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// The frozen application: turns one request into exactly one response.
pub struct Dispatcher {
    routes: RouteTable,
    global: Vec<BoxedMiddleware>,
    groups: HashMap<String, Vec<BoxedMiddleware>>,
    mounts: Vec<Mount>,
    app: Arc<AppState>,
}

impl Dispatcher {
    pub fn config(&self) -> &Config {
        &self.app.config
    }

    /// Route `request`, run its chain and return the response that was
    /// committed.
    ///
    /// Returns as soon as the chain returns. Work a timed-out handler is still
    /// doing in the background cannot change the result.
    pub async fn dispatch(&self, request: Request) -> http::Response<Full<Bytes>> {
        let path = request.path().to_owned();
        let method = Method::from_http(request.method());

        if path == FAVICON_PATH {
            return self.bare(StatusCode::OK);
        }
        if method == Some(Method::Options) && !self.routes.contains(Method::Options, &path) {
            return self.bare(StatusCode::OK);
        }

        // Cancelled when this future completes or hyper drops it (peer gone).
        let scope = Scope::new();
        let _cancel_on_drop = scope.token().clone().drop_guard();
        let ctx = Context::new(request, Arc::clone(&self.app), self.staged_headers(), scope);

        if let Some(mount) = self.mounts.iter().find(|m| path.starts_with(&m.prefix)) {
            debug!(prefix = %mount.prefix, path = %path, "delegating to mount");
            ctx.attach(Chain::terminal(Arc::clone(&mount.handler)));
            return drive(ctx).await;
        }

        let Some(route) = method.and_then(|m| self.routes.lookup(m, &path)) else {
            debug!(method = %ctx.request().method(), path = %path, "no route");
            ctx.writer().await.status(StatusCode::NOT_FOUND).text(NOT_FOUND_BODY);
            return ctx.finish().await;
        };

        let group = match route.group_prefix() {
            "" => None,
            prefix => self.groups.get(prefix).map(Vec::as_slice),
        };
        let chain = Chain::assemble(&self.global, group, route);
        debug!(route = route.path(), middlewares = chain.len(), "matched");
        ctx.attach(chain);
        drive(ctx).await
    }

    fn staged_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if self.app.config.http.cross_origin {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, GET, OPTIONS, PUT, DELETE"),
            );
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
        }
        headers
    }

    fn bare(&self, status: StatusCode) -> http::Response<Full<Bytes>> {
        let mut out = http::Response::new(Full::new(Bytes::new()));
        *out.status_mut() = status;
        *out.headers_mut() = self.staged_headers();
        out
    }
}

/// Start the chain and fall back to `500` when it fails before writing.
async fn drive(ctx: Context) -> http::Response<Full<Bytes>> {
    if let Err(e) = ctx.next().await {
        let mut writer = ctx.writer().await;
        if writer.is_finalized() {
            debug!(error = %e, "chain failed after the response was written");
        } else {
            warn!(method = %ctx.request().method(), path = ctx.request().path(), error = %e, "chain failed");
            writer.status(StatusCode::INTERNAL_SERVER_ERROR).text(e.to_string());
        }
    }
    ctx.finish().await
}
