use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::Router;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tower::util::ServiceExt;

/// In-process HTTP test client wrapping an `axum::Router` (typically the one
/// returned by a `Connector::app`).
///
/// Uses `tower::ServiceExt::oneshot` to dispatch requests without binding
/// to a TCP port. Since `oneshot` never runs through `into_make_service_with_connect_info`,
/// a fixed `ConnectInfo<SocketAddr>` extension is stamped onto every request
/// so handlers that extract it (the HTTP connector's dispatch handler) don't panic.
pub struct TestApp {
    router: Router,
    peer_addr: SocketAddr,
}

impl TestApp {
    /// Create a `TestApp` from an assembled `axum::Router`.
    pub fn new(router: Router) -> Self {
        Self { router, peer_addr: "127.0.0.1:1234".parse().unwrap() }
    }

    /// Send an arbitrary request.
    pub async fn send(&self, mut request: Request<Body>) -> TestResponse {
        request.extensions_mut().insert(ConnectInfo(self.peer_addr));
        let response = self.router.clone().oneshot(request).await.expect("failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();

        TestResponse { status, body }
    }

    /// Send a GET request to the given path.
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder().method(Method::GET).uri(path).body(Body::empty()).unwrap();
        self.send(req).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        let json = serde_json::to_vec(body).unwrap();
        let req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json))
            .unwrap();
        self.send(req).await
    }
}

/// Response wrapper with assertion helpers.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl TestResponse {
    /// Assert status is 200 OK. Returns `self` for chaining.
    pub fn assert_ok(self) -> Self {
        assert_eq!(self.status, StatusCode::OK, "Expected 200 OK, got {}", self.status);
        self
    }

    /// Assert the response has a specific status code.
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(self.status, expected, "Expected {expected}, got {}", self.status);
        self
    }

    /// Deserialize the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("Failed to parse JSON: {e}\nBody: {}", self.text()))
    }

    /// Return the response body as a UTF-8 string.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// `data` field of the `{data, error}` envelope.
    pub fn data(&self) -> serde_json::Value {
        self.json::<serde_json::Value>()["data"].clone()
    }

    /// `error` field of the `{data, error}` envelope, or `Value::Null`.
    pub fn error(&self) -> serde_json::Value {
        self.json::<serde_json::Value>()["error"].clone()
    }
}
