//! Panic recovery boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::BoxFuture;
use crate::middleware::Middleware;

/// Turn panics anywhere below into a `500` JSON response.
///
/// Register it first so it wraps every other middleware, including the
/// worker side of [`Timeout`](super::Timeout), whose panics are re-raised on
/// the calling task.
///
/// The body is `{"err": "<panic message>"}`. Custom fields given to
/// [`Recovery::with_fields`] are sent along with the `err` key.
///
/// A panic that reports a broken pipe or a reset connection writes no body:
/// the peer is most likely gone, so the response is sealed as a bare `500`
/// and the chain ends with [`Error::ConnectionBroken`].
///
/// In debug mode ([`Config::debug`](crate::Config)) this middleware steps
/// aside and panics propagate to the connection task.
#[derive(Clone, Debug, Default)]
pub struct Recovery {
    fields: Map<String, Value>,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl Middleware for Recovery {
    fn handle(&self, ctx: Context) -> BoxFuture<Result<()>> {
        let fields = self.fields.clone();
        Box::pin(async move {
            if ctx.config().debug {
                return ctx.next().await;
            }

            let payload = match AssertUnwindSafe(ctx.next()).catch_unwind().await {
                Ok(result) => return result,
                Err(payload) => payload,
            };

            let abort = Abort::from_payload(payload.as_ref());
            let mut writer = ctx.writer().await;

            if abort.connection_broken {
                warn!(path = ctx.request().path(), "connection broken: {}", abort.message);
                writer.status(StatusCode::INTERNAL_SERVER_ERROR).seal();
                return Err(Error::ConnectionBroken(abort.message));
            }

            error!(
                method = %ctx.request().method(),
                path = ctx.request().path(),
                "recovered from panic: {}",
                abort.message,
            );
            let mut body = fields;
            body.insert("err".to_owned(), Value::String(abort.message));
            writer.status(StatusCode::INTERNAL_SERVER_ERROR).json(&body);
            Ok(())
        })
    }
}

/// A classified panic payload.
struct Abort {
    message: String,
    connection_broken: bool,
}

impl Abort {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        if let Some(io) = payload.downcast_ref::<std::io::Error>() {
            let broken = matches!(
                io.kind(),
                std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
            );
            return Self { message: io.to_string(), connection_broken: broken };
        }
        if let Some(Error::ConnectionBroken(msg)) = payload.downcast_ref::<Error>() {
            return Self { message: msg.clone(), connection_broken: true };
        }

        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(e) = payload.downcast_ref::<Error>() {
            e.to_string()
        } else {
            "unknown panic".to_owned()
        };
        let lower = message.to_lowercase();
        let connection_broken =
            lower.contains("broken pipe") || lower.contains("connection reset by peer");
        Self { message, connection_broken }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(payload: Box<dyn Any + Send>) -> Abort {
        Abort::from_payload(payload.as_ref())
    }

    #[test]
    fn string_payloads() {
        let abort = classify(Box::new("boom"));
        assert_eq!(abort.message, "boom");
        assert!(!abort.connection_broken);

        let abort = classify(Box::new(String::from("index out of bounds")));
        assert_eq!(abort.message, "index out of bounds");
    }

    #[test]
    fn io_errors_are_classified_by_kind() {
        let abort = classify(Box::new(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        assert!(abort.connection_broken);

        let abort = classify(Box::new(std::io::Error::other("disk full")));
        assert!(!abort.connection_broken);
    }

    #[test]
    fn messages_mentioning_reset_are_broken() {
        let abort = classify(Box::new("write failed: Connection reset by peer"));
        assert!(abort.connection_broken);
    }

    #[test]
    fn opaque_payload() {
        let abort = classify(Box::new(42_u8));
        assert_eq!(abort.message, "unknown panic");
    }
}
