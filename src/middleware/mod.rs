//! Middleware layer.
//!
//! A middleware wraps everything registered after it. It receives the
//! request's [`Context`] and decides whether and when to hand control on by
//! awaiting [`Context::next`]:
//!
//! ```text
//!   Recovery ─┐                                 ┌─ Recovery
//!     Trace ──┤  before next()    after next()  ├── Trace
//!       Auth ─┤ ───────────────►  ◄──────────── ├─ Auth
//!             └──────────► handler ─────────────┘
//! ```
//!
//! Code before `next()` runs on the way in, code after it on the way out, in
//! reverse registration order. Returning without calling `next()` stops the
//! chain: nothing registered later runs, the handler included. Returning an
//! `Err` additionally asks the dispatcher to answer `500` with the error text
//! if nobody has written a response yet.
//!
//! Any `async fn(Context) -> Result<(), Error>` is a middleware:
//!
//! ```rust
//! use waypost::{Context, Error};
//!
//! async fn language(ctx: Context) -> Result<(), Error> {
//!     let lang = ctx.request().query("lang").unwrap_or_else(|| "en".to_owned());
//!     ctx.set_value("Language", lang);
//!     ctx.next().await
//! }
//! ```
//!
//! Built-ins: [`Recovery`] (register it first), [`Trace`] and [`Timeout`].

mod recovery;
mod timeout;
mod trace;

use std::future::Future;
use std::sync::Arc;

pub use recovery::Recovery;
pub use timeout::Timeout;
pub use trace::Trace;

use crate::context::Context;
use crate::error::Error;
use crate::handler::BoxFuture;

/// An interceptor around the rest of the chain.
///
/// Implemented automatically for closures and `async fn`s taking a
/// [`Context`]; implement it by hand for configurable middlewares.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: Context) -> BoxFuture<Result<(), Error>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn handle(&self, ctx: Context) -> BoxFuture<Result<(), Error>> {
        Box::pin((self)(ctx))
    }
}

/// A type-erased middleware, shared by every request whose chain contains it.
pub type BoxedMiddleware = Arc<dyn Middleware>;

pub(crate) fn boxed(middleware: impl Middleware) -> BoxedMiddleware {
    Arc::new(middleware)
}
