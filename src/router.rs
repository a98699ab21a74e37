//! Exact-match route table.
//!
//! One map per HTTP method, keyed by the *normalized* path: lower-cased with
//! every `/` removed. Lookup applies the same normalization, so `/Hello/`,
//! `/hello` and `hello` all hit the same entry. There are no parameters and no
//! wildcards.
//!
//! Because separators are stripped, `/a/b` and `/ab` normalize to the same key
//! and collide at registration time. That is intentional: routing is flat.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, Middleware, boxed};

/// Lower-case and drop every path separator.
pub(crate) fn normalize(path: &str) -> String {
    path.to_lowercase().replace('/', "")
}

/// A registered `(method, path)` binding. Immutable once in the table.
pub struct RouteEntry {
    method: Method,
    path: String,
    handler: BoxedHandler,
    middlewares: Vec<BoxedMiddleware>,
    group_prefix: String,
}

impl RouteEntry {
    pub fn method(&self) -> Method { self.method }
    /// The path as it was registered (group prefix included).
    pub fn path(&self) -> &str { &self.path }
    /// Empty when the route is not part of a group.
    pub fn group_prefix(&self) -> &str { &self.group_prefix }
    pub(crate) fn handler(&self) -> &BoxedHandler { &self.handler }
    pub(crate) fn middlewares(&self) -> &[BoxedMiddleware] { &self.middlewares }
}

/// method → normalized path → route.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<Method, HashMap<String, RouteEntry>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `route` under `group_prefix`. A second registration of the same
    /// normalized key fails and leaves the first one in place.
    pub fn register(&mut self, group_prefix: &str, route: Route) -> Result<()> {
        let path = format!("{group_prefix}{}", route.path);
        let key = normalize(&path);
        let by_path = self.routes.entry(route.method).or_default();
        if by_path.contains_key(&key) {
            return Err(Error::DuplicateRoute { method: route.method.to_string(), path });
        }
        by_path.insert(
            key,
            RouteEntry {
                method: route.method,
                path,
                handler: route.handler,
                middlewares: route.middlewares,
                group_prefix: group_prefix.to_owned(),
            },
        );
        Ok(())
    }

    /// `path` is the request path as sent on the wire; it is percent-decoded
    /// before normalization, so an encoded `%2F` is stripped like `/`.
    pub fn lookup(&self, method: Method, path: &str) -> Option<&RouteEntry> {
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        self.routes.get(&method)?.get(&normalize(&decoded))
    }

    pub fn contains(&self, method: Method, path: &str) -> bool {
        self.lookup(method, path).is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// A route waiting to be registered, with its own middlewares.
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use waypost::{Context, Engine, Route, middleware::Timeout};
/// # async fn report(_: Context) -> &'static str { "" }
/// Engine::new().route(
///     Route::get("/report", report).middleware(Timeout::new(Duration::from_secs(2))),
/// );
/// ```
pub struct Route {
    method: Method,
    path: String,
    handler: BoxedHandler,
    middlewares: Vec<BoxedMiddleware>,
}

impl Route {
    pub fn new(method: Method, path: &str, handler: impl Handler) -> Self {
        Self {
            method,
            path: path.to_owned(),
            handler: handler.into_boxed_handler(),
            middlewares: Vec::new(),
        }
    }

    pub fn get(path: &str, handler: impl Handler) -> Self { Self::new(Method::Get, path, handler) }
    pub fn post(path: &str, handler: impl Handler) -> Self { Self::new(Method::Post, path, handler) }
    pub fn put(path: &str, handler: impl Handler) -> Self { Self::new(Method::Put, path, handler) }
    pub fn delete(path: &str, handler: impl Handler) -> Self { Self::new(Method::Delete, path, handler) }

    /// Append a route-specific middleware. Runs after global and group ones.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(boxed(middleware));
        self
    }
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// Routes sharing a path prefix and a set of group middlewares.
///
/// ```rust,no_run
/// # use waypost::{Context, Engine, Error, Group};
/// # async fn users(_: Context) -> &'static str { "" }
/// # async fn auth(ctx: Context) -> Result<(), Error> { ctx.next().await }
/// Engine::new().group(Group::new("/api").middleware(auth).get("/users", users));
/// ```
pub struct Group {
    prefix: String,
    middlewares: Vec<BoxedMiddleware>,
    routes: Vec<Route>,
}

impl Group {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_owned(), middlewares: Vec::new(), routes: Vec::new() }
    }

    /// Append a middleware for every route under this prefix.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(boxed(middleware));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self { self.route(Route::get(path, handler)) }
    pub fn post(self, path: &str, handler: impl Handler) -> Self { self.route(Route::post(path, handler)) }
    pub fn put(self, path: &str, handler: impl Handler) -> Self { self.route(Route::put(path, handler)) }
    pub fn delete(self, path: &str, handler: impl Handler) -> Self { self.route(Route::delete(path, handler)) }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub(crate) fn into_parts(self) -> (String, Vec<BoxedMiddleware>, Vec<Route>) {
        (self.prefix, self.middlewares, self.routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    async fn noop(_ctx: Context) {}

    #[test]
    fn lookup_is_case_and_separator_insensitive() {
        let mut table = RouteTable::new();
        table.register("", Route::get("/Hello/World", noop)).unwrap();

        assert!(table.contains(Method::Get, "/hello/world"));
        assert!(table.contains(Method::Get, "/HELLO/WORLD/"));
        assert!(table.contains(Method::Get, "helloworld"));
        assert!(!table.contains(Method::Post, "/hello/world"));
        assert!(!table.contains(Method::Get, "/hello"));
    }

    #[test]
    fn duplicate_keeps_first_registration() {
        let mut table = RouteTable::new();
        table.register("", Route::get("/a/b", noop)).unwrap();

        let err = table.register("", Route::get("/ab", noop)).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { ref path, .. } if path == "/ab"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(Method::Get, "/a/b").unwrap().path(), "/a/b");
    }

    #[test]
    fn same_path_different_methods_coexist() {
        let mut table = RouteTable::new();
        table.register("", Route::get("/items", noop)).unwrap();
        table.register("", Route::post("/items", noop)).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn group_prefix_is_part_of_key() {
        let mut table = RouteTable::new();
        table.register("/api", Route::get("/users", noop)).unwrap();

        let entry = table.lookup(Method::Get, "/API/Users").unwrap();
        assert_eq!(entry.group_prefix(), "/api");
        assert_eq!(entry.path(), "/api/users");
        assert!(table.lookup(Method::Get, "/users").is_none());
    }

    #[test]
    fn lookup_decodes_percent_escapes() {
        let mut table = RouteTable::new();
        table.register("", Route::get("/hello world", noop)).unwrap();
        table.register("", Route::get("/Café", noop)).unwrap();
        table.register("", Route::get("/a/b", noop)).unwrap();

        assert!(table.contains(Method::Get, "/hello%20world"));
        assert!(table.contains(Method::Get, "/CAF%C3%A9"));
        assert!(table.contains(Method::Get, "/a%2Fb"));
        assert!(!table.contains(Method::Get, "/hello%2520world"));
    }
}
