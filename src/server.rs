//! HTTP server and graceful shutdown.
//!
//! The server owns nothing but the listener. Each accepted connection gets
//! its own task; each request on it is buffered, turned into a [`Request`]
//! and handed to the shared [`Dispatcher`].
//!
//! On **SIGTERM** or **Ctrl-C** the server:
//! 1. stops accepting connections,
//! 2. waits for in-flight connections, at most `http.shutdown_grace`,
//! 3. returns from [`Server::serve`].
//!
//! A handler panic that no [`Recovery`](crate::middleware::Recovery) catches
//! ends that one connection task; the process keeps serving.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::{Dispatcher, Engine};
use crate::error::Result;
use crate::request::Request;

/// The HTTP server.
pub struct Server {
    addr: String,
    shutdown_grace: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. The address is validated there.
    ///
    /// ```rust,no_run
    /// use waypost::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self { addr: addr.to_owned(), shutdown_grace: Config::default().http.shutdown_grace }
    }

    /// Address and shutdown grace from `[http]`.
    pub fn from_config(config: &Config) -> Self {
        Self { addr: config.http.bind_addr.clone(), shutdown_grace: config.http.shutdown_grace }
    }

    /// Builds `engine`, then accepts connections until a shutdown signal.
    ///
    /// Fails before listening if the engine has a configuration error (for
    /// example a duplicate route) or the address is invalid.
    pub async fn serve(self, engine: Engine) -> Result<()> {
        let dispatcher = Arc::new(engine.build()?);
        let addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!(%addr, "waypost listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first, so a SIGTERM stops accepting even when more
                // connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = Arc::clone(&dispatcher);
                            async move { handle(dispatcher, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            warn!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
            }
        }

        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        };
        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            warn!(remaining = tasks.len(), "shutdown grace elapsed, dropping connections");
            tasks.abort_all();
        }

        info!("waypost stopped");
        Ok(())
    }
}

/// Buffer the body, then dispatch. Errors never reach hyper: a body that
/// cannot be read is answered with `400`.
async fn handle(
    dispatcher: Arc<Dispatcher>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> std::result::Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            let mut bad = http::Response::new(Full::new(Bytes::new()));
            *bad.status_mut() = http::StatusCode::BAD_REQUEST;
            return Ok(bad);
        }
    };

    let request = Request::from_parts(parts, body, Some(remote_addr));
    Ok(dispatcher.dispatch(request).await)
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("connection task panicked: {e}");
        }
    }
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. A handler that cannot be installed
/// is logged and treated as never firing.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
