//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The route table holds handlers of *different* types in one map, so each is
//! hidden behind a trait object (`dyn ErasedHandler`).
//!
//! ```text
//! async fn hello(ctx: Context) -> impl Reply { … }   ← user writes this
//!        ↓ engine.get("/hello", hello)
//! hello.into_boxed_handler()                         ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                         ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx)  when the chain reaches its end  ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(ctx).await.into_reply() })  ← BoxFuture
//! ```
//!
//! The returned [`Reply`] is written through the request's write guard by
//! the chain, never directly, so a handler that finishes after a timeout
//! cannot overwrite the timeout response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::response::{Reply, Response};

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` so tokio can move it across worker threads, which the
/// timeout middleware relies on when it hands the chain to a separate task.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<Option<Response>>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(ctx: Context) -> impl Reply
/// ```
///
/// where the return value is either something [`IntoResponse`](crate::IntoResponse)
/// or `()` for handlers that wrote through `ctx` themselves.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Reply + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Reply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype wrapper that bridges a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: Reply + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Option<Response>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}
