//! Unified error type.

use thiserror::Error;

/// Convenience alias used throughout waypost.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by waypost's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values written through the
/// [`Context`](crate::Context), not as `Error`s. This type surfaces startup
/// failures (binding, bad configuration, duplicate routes) and errors that a
/// middleware raises to abort the rest of its chain.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Two routes normalize to the same `(method, path)` key. Fatal at startup.
    #[error("route already registered: {method} {path}")]
    DuplicateRoute { method: String, path: String },

    #[error("config: {0}")]
    Config(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised by a middleware. The dispatcher writes the message as a 500 body.
    #[error("{0}")]
    Chain(String),

    /// The peer hung up while the chain was running; nothing more is written.
    #[error("connection broken: {0}")]
    ConnectionBroken(String),

    /// A supervised chain worker ended without producing a result.
    #[error("worker: {0}")]
    Worker(String),
}

impl Error {
    /// Build a chain error from any message. This is what middlewares return
    /// to stop the request:
    ///
    /// ```rust
    /// # use waypost::{Context, Error};
    /// async fn require_token(ctx: Context) -> Result<(), Error> {
    ///     if ctx.request().header("x-token").is_none() {
    ///         return Err(Error::msg("missing token"));
    ///     }
    ///     ctx.next().await
    /// }
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Chain(message.into())
    }

    /// `true` for errors that must abort startup rather than a single request.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::DuplicateRoute { .. } | Self::Config(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::Config(format!("invalid socket address: {e}"))
    }
}
