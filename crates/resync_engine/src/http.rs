//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use resync_protocol::{SyncPushRequest, SyncPushResponse, WireFormat, DEFAULT_SYNC_PATH};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// HTTP-based sync transport.
///
/// Posts the push request to `base_url + path`, encoded in the configured
/// wire format (JSON unless told otherwise).
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g., "https://sync.example.com").
    base_url: String,
    /// Endpoint path.
    path: String,
    /// Body encoding.
    format: WireFormat,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            path: DEFAULT_SYNC_PATH.to_string(),
            format: WireFormat::Json,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Sets the endpoint path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the wire format.
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns the full endpoint URL.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn push(&self, request: &SyncPushRequest) -> SyncResult<SyncPushResponse> {
        let body = request.encode(self.format)?;

        let response_body = self
            .client
            .post(&self.url(), self.format.content_type(), body)
            .await
            .map_err(|e| {
                *self.last_error.write() = Some(e.clone());
                SyncError::Transport(e)
            })?;

        *self.last_error.write() = None;
        Ok(SyncPushResponse::decode(&response_body, self.format)?)
    }
}

/// Trait for servers that can handle loopback requests.
#[async_trait]
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the response body.
    async fn handle_post(
        &self,
        path: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, String>;
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

/// Extracts the path component of an absolute or relative URL.
fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    if url.contains("://") {
        rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
    } else {
        rest
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server
            .handle_post(url_path(url), content_type, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resync_protocol::SyncMutationResult;

    struct TestClient {
        response: RwLock<Option<Vec<u8>>>,
        seen: RwLock<Vec<(String, String)>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: RwLock::new(None),
                seen: RwLock::new(Vec::new()),
            }
        }

        fn set_response(&self, resp: Vec<u8>) {
            *self.response.write() = Some(resp);
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn post(
            &self,
            url: &str,
            content_type: &str,
            _body: Vec<u8>,
        ) -> Result<Vec<u8>, String> {
            self.seen
                .write()
                .push((url.to_string(), content_type.to_string()));
            self.response
                .read()
                .clone()
                .ok_or_else(|| "No response set".into())
        }
    }

    struct EchoPath;

    #[async_trait]
    impl LoopbackServer for EchoPath {
        async fn handle_post(
            &self,
            path: &str,
            _content_type: &str,
            _body: &[u8],
        ) -> Result<Vec<u8>, String> {
            Ok(path.as_bytes().to_vec())
        }
    }

    fn request() -> SyncPushRequest {
        SyncPushRequest::new("c1", Vec::new(), None)
    }

    #[test]
    fn transport_url() {
        let transport = HttpTransport::new("https://sync.example.com/", TestClient::new());
        assert_eq!(transport.url(), "https://sync.example.com/api/sync/push");

        let transport = transport.with_path("/v2/push");
        assert_eq!(transport.url(), "https://sync.example.com/v2/push");
    }

    #[tokio::test]
    async fn transport_push_decodes_response() {
        let client = TestClient::new();
        let response =
            SyncPushResponse::new(vec![SyncMutationResult::applied("m1", 1)], vec![], "1");
        client.set_response(response.encode(WireFormat::Cbor).unwrap());

        let transport =
            HttpTransport::new("https://sync.example.com", client).with_format(WireFormat::Cbor);
        let decoded = transport.push(&request()).await.unwrap();

        assert_eq!(decoded, response);
        assert_eq!(
            transport.client.seen.read()[0].1,
            WireFormat::Cbor.content_type()
        );
        assert!(transport.last_error().is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_retryable() {
        let transport = HttpTransport::new("https://sync.example.com", TestClient::new());

        let err = transport.push(&request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.last_error().as_deref(), Some("No response set"));
    }

    #[tokio::test]
    async fn transport_garbage_body_is_codec_error() {
        let client = TestClient::new();
        client.set_response(b"<html>".to_vec());
        let transport = HttpTransport::new("https://sync.example.com", client);

        let err = transport.push(&request()).await.unwrap_err();
        assert!(matches!(err, SyncError::Codec(_)));
    }

    #[tokio::test]
    async fn loopback_strips_origin() {
        let client = LoopbackClient::new(EchoPath);
        let body = client
            .post("http://localhost:8080/api/sync/push", "application/json", vec![])
            .await
            .unwrap();
        assert_eq!(body, b"/api/sync/push");

        let body = client.post("/relative", "application/json", vec![]).await.unwrap();
        assert_eq!(body, b"/relative");
    }

    #[test]
    fn url_path_without_path_is_root() {
        assert_eq!(url_path("https://example.com"), "/");
    }
}
