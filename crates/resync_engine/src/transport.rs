//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use resync_protocol::{SyncMutationResult, SyncPushRequest, SyncPushResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A sync transport carries push requests to the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, WebSocket, in-process loopback, mocks). The
/// engine enforces no timeout; implementations that need bounded latency
/// must supply their own.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Pushes a batch of mutations and returns the server's verdict.
    async fn push(&self, request: &SyncPushRequest) -> SyncResult<SyncPushResponse>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn push(&self, request: &SyncPushRequest) -> SyncResult<SyncPushResponse> {
        (**self).push(request).await
    }
}

/// A mock transport for testing.
///
/// Responses are served from a queue first, then from the sticky response
/// set with [`set_push_response`](Self::set_push_response). In accepting
/// mode every mutation without a queued or sticky answer is applied with
/// version `base + 1`.
#[derive(Debug, Default)]
pub struct MockTransport {
    disconnected: AtomicBool,
    accept_all: AtomicBool,
    next_checkpoint: AtomicU64,
    queued: Mutex<VecDeque<SyncResult<SyncPushResponse>>>,
    push_response: Mutex<Option<SyncPushResponse>>,
    requests: Mutex<Vec<SyncPushRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that applies every mutation it receives.
    pub fn accepting() -> Self {
        let transport = Self::default();
        transport.accept_all.store(true, Ordering::SeqCst);
        transport
    }

    /// Sets the response returned when nothing is queued.
    pub fn set_push_response(&self, response: SyncPushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Queues a one-shot result (success or failure).
    pub fn queue_push_result(&self, result: SyncResult<SyncPushResponse>) {
        self.queued.lock().push_back(result);
    }

    /// Simulates a lost connection: every push fails with `NotConnected`.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<SyncPushRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of push calls received.
    pub fn push_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn accept(&self, request: &SyncPushRequest) -> SyncPushResponse {
        let results = request
            .mutations
            .iter()
            .map(|m| SyncMutationResult::applied(m.id.clone(), m.next_version()))
            .collect();
        let checkpoint = self.next_checkpoint.fetch_add(1, Ordering::SeqCst) + 1;
        SyncPushResponse::new(results, Vec::new(), checkpoint.to_string())
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push(&self, request: &SyncPushRequest) -> SyncResult<SyncPushResponse> {
        self.requests.lock().push(request.clone());

        if self.disconnected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        if let Some(result) = self.queued.lock().pop_front() {
            return result;
        }
        if let Some(response) = self.push_response.lock().clone() {
            return Ok(response);
        }
        if self.accept_all.load(Ordering::SeqCst) {
            return Ok(self.accept(request));
        }
        Err(SyncError::Protocol("No mock push response set".into()))
    }
}
