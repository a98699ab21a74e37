//! # waypost
//!
//! A small HTTP framework built around an explicit middleware chain.
//!
//! ## The model
//!
//! Every request gets one [`Context`]. Middlewares and the handler all see the
//! same context; a middleware decides where the rest of the chain runs by
//! awaiting [`Context::next`], before or after its own work. Not calling it
//! short-circuits the request.
//!
//! - Exact-match routing: case-insensitive, slashes ignored, no parameters
//! - Global, group and per-route middlewares, in that order
//! - One write guard per request: the first committed response wins
//! - Built-in [`Recovery`](middleware::Recovery),
//!   [`Timeout`](middleware::Timeout) and [`Trace`](middleware::Trace)
//! - Graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use waypost::middleware::{Recovery, Timeout, Trace};
//! use waypost::{Context, Engine, Group, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> waypost::Result<()> {
//!     let app = Engine::new()
//!         .middleware(Recovery::new())
//!         .middleware(Trace)
//!         .get("/hello", hello)
//!         .group(
//!             Group::new("/api")
//!                 .middleware(Timeout::new(Duration::from_secs(2)))
//!                 .post("/echo", echo),
//!         );
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn hello(_ctx: Context) -> &'static str {
//!     "world"
//! }
//!
//! async fn echo(ctx: Context) -> Response {
//!     match ctx.request().json::<serde_json::Value>() {
//!         Ok(v) => Response::json(&v),
//!         Err(e) => Response::builder()
//!             .status(http::StatusCode::BAD_REQUEST)
//!             .text(e.to_string()),
//!     }
//! }
//! ```

mod chain;
mod config;
mod context;
mod engine;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod scope;
mod server;
mod services;
mod writer;

pub mod logging;
pub mod middleware;

pub use config::{Config, HttpConfig, LogFormat, LoggingConfig};
pub use context::Context;
pub use engine::{Dispatcher, Engine};
pub use error::{Error, Result};
pub use handler::{BoxFuture, Handler};
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Reply, Response, ResponseBuilder};
pub use router::{Group, Route, RouteEntry, RouteTable};
pub use scope::{Scope, ScopeError};
pub use server::Server;
pub use services::Services;
pub use writer::{Cookie, WriteGuard};
