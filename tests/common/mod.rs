#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use waypost::{Dispatcher, Request};

pub fn request(method: &str, uri: &str) -> Request {
    request_with_body(method, uri, Bytes::new())
}

pub fn request_with_body(method: &str, uri: &str, body: impl Into<Bytes>) -> Request {
    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .unwrap()
        .into_parts();
    Request::from_parts(parts, body.into(), None)
}

pub async fn body_string(response: http::Response<Full<Bytes>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Dispatch and split the response into status and body text.
pub async fn call(dispatcher: &Dispatcher, method: &str, uri: &str) -> (http::StatusCode, String) {
    let response = dispatcher.dispatch(request(method, uri)).await;
    let status = response.status();
    (status, body_string(response).await)
}
