//! Incoming HTTP request type.
//!
//! The body is buffered in full before dispatch, so it can be read any number
//! of times by middlewares and the handler.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http::{HeaderMap, Uri};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// An incoming HTTP request with a fully buffered body.
#[derive(Debug)]
pub struct Request {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Assemble a request from hyper's head and an already collected body.
    pub fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr,
        }
    }

    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded `key=value` pairs of the query string, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.uri.query() else {
            return Vec::new();
        };
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(k), decode_component(v))
            })
            .collect()
    }

    /// First query-string value for `key`.
    pub fn query(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Value of the cookie named `name`, percent-decoded.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|kv| kv.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| percent_decode_str(v).decode_utf8_lossy().into_owned())
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Client address as reported by the reverse proxy.
    ///
    /// Trusts `X-Real-Ip`, then the first `X-Forwarded-For` hop, and only then
    /// the socket peer.
    pub fn client_ip(&self) -> Option<IpAddr> {
        if let Some(ip) = self.header("x-real-ip").and_then(|v| v.trim().parse().ok()) {
            return Some(ip);
        }
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok());
        forwarded.or_else(|| self.remote_addr.map(|a| a.ip()))
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
pub(crate) fn test_request(method: &str, uri: &str) -> Request {
    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .unwrap()
        .into_parts();
    Request::from_parts(parts, Bytes::new(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_headers(headers: &[(&str, &str)], remote: Option<SocketAddr>) -> Request {
        let mut builder = http::Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        Request::from_parts(parts, Bytes::new(), remote)
    }

    #[test]
    fn query_is_decoded() {
        let req = test_request("GET", "/search?q=hello+world&lang=zh%2DCN&flag");
        assert_eq!(req.query("q").as_deref(), Some("hello world"));
        assert_eq!(req.query("lang").as_deref(), Some("zh-CN"));
        assert_eq!(req.query("flag").as_deref(), Some(""));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn cookie_lookup() {
        let req = with_headers(&[("cookie", "a=1; session=abc%20def")], None);
        assert_eq!(req.cookie("session").as_deref(), Some("abc def"));
        assert_eq!(req.cookie("a").as_deref(), Some("1"));
        assert_eq!(req.cookie("b"), None);
    }

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let req = with_headers(&[("x-real-ip", "1.2.3.4"), ("x-forwarded-for", "5.6.7.8")], Some(peer));
        assert_eq!(req.client_ip(), Some("1.2.3.4".parse().unwrap()));

        let req = with_headers(&[("x-forwarded-for", "5.6.7.8, 10.0.0.1")], Some(peer));
        assert_eq!(req.client_ip(), Some("5.6.7.8".parse().unwrap()));

        let req = with_headers(&[], Some(peer));
        assert_eq!(req.client_ip(), Some(peer.ip()));
    }
}
