//! The write guard: the only path to the client.
//!
//! Every request owns one [`ResponseState`] behind an async mutex. Anything
//! that wants to put bytes on the wire (a handler, the timeout supervisor,
//! the recovery boundary, the dispatcher's own 404/500 fallbacks) locks it
//! through [`Context::writer`](crate::Context::writer) and checks
//! [`WriteGuard::is_finalized`] under the lock. The first committing write
//! wins; every later one is a logged no-op.
//!
//! ```text
//!   status/header ──► pending head ──┐
//!                                    ├─► commit (text/json/send…) ──► finalized
//!   timeout supervisor ──────────────┘            │
//!                                                 └─► later writes dropped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http::header::{HeaderValue, LOCATION, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use tokio::sync::MutexGuard;
use tracing::debug;

use crate::response::{ContentType, Response, append_header};

/// Pending and committed response for one request.
#[derive(Debug)]
pub(crate) struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    finalized: bool,
}

impl ResponseState {
    pub(crate) fn new(headers: HeaderMap) -> Self {
        Self { status: StatusCode::OK, headers, body: Bytes::new(), finalized: false }
    }

    /// Seal the state and turn it into the value hyper sends. Whatever was
    /// committed (or only pending) is what the client gets.
    pub(crate) fn take(&mut self) -> http::Response<Full<Bytes>> {
        self.finalized = true;
        let mut out = http::Response::new(Full::new(std::mem::take(&mut self.body)));
        *out.status_mut() = self.status;
        *out.headers_mut() = std::mem::take(&mut self.headers);
        out
    }
}

/// Scoped ownership of the response. Released on drop, including unwinds.
///
/// Head setters (`status`, `header`, `cookie`) accumulate until a body method
/// commits. After the commit, or after the request timed out, every method is
/// a no-op.
pub struct WriteGuard<'a> {
    state: MutexGuard<'a, ResponseState>,
    timed_out: &'a AtomicBool,
}

impl<'a> WriteGuard<'a> {
    pub(crate) fn new(state: MutexGuard<'a, ResponseState>, timed_out: &'a AtomicBool) -> Self {
        Self { state, timed_out }
    }

    /// `true` once a response has been committed or the request timed out.
    pub fn is_finalized(&self) -> bool {
        self.state.finalized || self.timed_out.load(Ordering::Acquire)
    }

    /// Status currently staged or committed.
    pub fn status_code(&self) -> StatusCode {
        self.state.status
    }

    pub fn status(&mut self, code: StatusCode) -> &mut Self {
        if self.writable("status") {
            self.state.status = code;
        }
        self
    }

    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        if self.writable("header") {
            append_header(&mut self.state.headers, name, value);
        }
        self
    }

    /// Stage a `Set-Cookie` header.
    pub fn cookie(&mut self, cookie: &Cookie) -> &mut Self {
        if self.writable("cookie") {
            if let Ok(value) = HeaderValue::try_from(cookie.to_string()) {
                self.state.headers.append(SET_COOKIE, value);
            }
        }
        self
    }

    /// Commit a `text/plain` body.
    pub fn text(&mut self, body: impl Into<String>) -> &mut Self {
        self.commit(Some(ContentType::Text), Bytes::from(body.into()))
    }

    /// Commit a JSON body. Serialization failures commit an empty `500`.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.commit(Some(ContentType::Json), Bytes::from(bytes)),
            Err(e) => {
                debug!("json serialization failed: {e}");
                self.status(StatusCode::INTERNAL_SERVER_ERROR);
                self.commit(None, Bytes::new())
            }
        }
    }

    /// Commit an already rendered HTML document.
    pub fn html(&mut self, body: impl Into<String>) -> &mut Self {
        self.commit(Some(ContentType::Html), Bytes::from(body.into()))
    }

    pub fn bytes(&mut self, content_type: ContentType, body: impl Into<Bytes>) -> &mut Self {
        self.commit(Some(content_type), body.into())
    }

    /// Commit a `301 Moved Permanently` to `location`.
    pub fn redirect(&mut self, location: &str) -> &mut Self {
        if !self.writable("redirect") {
            return self;
        }
        self.state.status = StatusCode::MOVED_PERMANENTLY;
        if let Ok(value) = HeaderValue::try_from(location) {
            self.state.headers.insert(LOCATION, value);
        }
        self.commit(None, Bytes::new())
    }

    /// Commit a whole [`Response`]. Its headers override staged ones of the
    /// same name. Returns `false` when the write was suppressed.
    pub fn send(&mut self, response: Response) -> bool {
        if !self.writable("send") {
            return false;
        }
        let Response { status, headers, body } = response;
        self.state.status = status;
        self.state.headers.extend(headers);
        self.state.body = body;
        self.state.finalized = true;
        true
    }

    fn commit(&mut self, content_type: Option<ContentType>, body: Bytes) -> &mut Self {
        if !self.writable("body") {
            return self;
        }
        if let Some(ct) = content_type {
            self.state
                .headers
                .insert(http::header::CONTENT_TYPE, HeaderValue::from_static(ct.as_str()));
        }
        self.state.body = body;
        self.state.finalized = true;
        self
    }

    fn writable(&self, what: &'static str) -> bool {
        let open = !self.is_finalized();
        if !open {
            debug!(write = what, "response already finalized, write suppressed");
        }
        open
    }

    /// Finalize without writing anything, for connections that are gone.
    pub(crate) fn seal(&mut self) {
        self.state.finalized = true;
    }

    pub(crate) fn take(&mut self) -> http::Response<Full<Bytes>> {
        self.state.take()
    }
}

// ── Cookie ────────────────────────────────────────────────────────────────────

/// A `Set-Cookie` value. The value is percent-encoded on output.
#[derive(Clone, Debug)]
pub struct Cookie {
    name: String,
    value: String,
    max_age: Option<i64>,
    path: String,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: "/".to_owned(),
            domain: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Empty paths fall back to `/`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.is_empty() { "/".to_owned() } else { path };
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }
}

impl std::fmt::Display for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = percent_encoding::utf8_percent_encode(
            &self.value,
            percent_encoding::NON_ALPHANUMERIC,
        );
        write!(f, "{}={}; Path={}", self.name, value, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        match self.max_age {
            Some(age) if age < 0 => f.write_str("; Max-Age=0")?,
            Some(age) => write!(f, "; Max-Age={age}")?,
            None => {}
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        f.write_str("; SameSite=Lax")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn first_commit_wins() {
        let state = Mutex::new(ResponseState::new(HeaderMap::new()));
        let flag = AtomicBool::new(false);

        let mut w = WriteGuard::new(state.lock().await, &flag);
        w.status(StatusCode::CREATED).header("x-a", "1").text("first");
        assert!(w.is_finalized());
        w.status(StatusCode::IM_A_TEAPOT).header("x-b", "2").text("second");
        assert!(!w.send(Response::text("third")));

        let out = w.take();
        assert_eq!(out.status(), StatusCode::CREATED);
        assert_eq!(out.headers()["x-a"], "1");
        assert!(out.headers().get("x-b").is_none());
    }

    #[tokio::test]
    async fn timed_out_flag_blocks_writes() {
        let state = Mutex::new(ResponseState::new(HeaderMap::new()));
        let flag = AtomicBool::new(true);

        let mut w = WriteGuard::new(state.lock().await, &flag);
        assert!(w.is_finalized());
        assert!(!w.send(Response::text("late")));
    }

    #[tokio::test]
    async fn send_merges_staged_headers() {
        let mut staged = HeaderMap::new();
        staged.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        let state = Mutex::new(ResponseState::new(staged));
        let flag = AtomicBool::new(false);

        let mut w = WriteGuard::new(state.lock().await, &flag);
        assert!(w.send(Response::text("hi")));
        let out = w.take();
        assert_eq!(out.headers()["access-control-allow-origin"], "*");
        assert_eq!(out.headers()["content-type"], "text/plain; charset=utf-8");
    }

    #[test]
    fn cookie_formatting() {
        let c = Cookie::new("sid", "a b").max_age(60).http_only(true).path("");
        assert_eq!(c.to_string(), "sid=a%20b; Path=/; Max-Age=60; HttpOnly; SameSite=Lax");
    }
}
