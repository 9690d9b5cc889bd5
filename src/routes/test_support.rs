//! Request builders for router tests.

use std::net::SocketAddr;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode};
use tower::ServiceExt;

const BOUNDARY: &str = "docchat-test-boundary";

/// Multipart form body: text fields first, then files as `files[]`.
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self { body: Vec::new() }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
        self
    }

    pub fn file(mut self, field: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn pdf(self, filename: &str) -> Self {
        let data = format!("%PDF-1.4 {filename}");
        self.file("files[]", filename, "application/pdf", data.as_bytes())
    }

    pub fn into_request(mut self, uri: &str, ip: &str) -> Request<Body> {
        self.body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        with_peer(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(self.body))
                .expect("request should build"),
            ip,
        )
    }
}

/// Attach a socket peer the way `into_make_service_with_connect_info` does.
pub fn with_peer(mut req: Request<Body>, ip: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{ip}:40000").parse().expect("valid ip");
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

pub fn get(uri: &str, ip: &str) -> Request<Body> {
    with_peer(Request::builder().uri(uri).body(Body::empty()).expect("request should build"), ip)
}

/// Non-multipart request with an explicit content type.
pub fn request(method: &str, uri: &str, ip: &str, content_type: &str, body: &str) -> Request<Body> {
    with_peer(
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_owned()))
            .expect("request should build"),
        ip,
    )
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp: Response<Body> = app.clone().oneshot(req).await.expect("router is infallible");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    let json = if bytes.is_empty() { serde_json::Value::Null } else { serde_json::from_slice(&bytes).expect("json body") };
    (status, json)
}
