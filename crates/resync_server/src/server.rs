//! Main sync server.

use crate::change_log::ChangeLog;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::SyncHandler;
use crate::record_resolver::RecordResolver;
use crate::version_store::VersionStore;
use resync_protocol::{Checkpoint, SyncPushRequest, SyncPushResponse, WireFormat};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shortest period accepted by [`SyncServer::spawn_pruner`].
pub const MIN_PRUNE_PERIOD: Duration = Duration::from_secs(1);
use tracing::{debug, info, warn};

/// The sync server.
///
/// Bundles a [`SyncHandler`], its stores and the application's
/// [`RecordResolver`]. It speaks in decoded messages
/// ([`handle_push`](Self::handle_push)) or raw request bodies
/// ([`handle_post`](Self::handle_post)) so any HTTP framework can mount it.
///
/// # Example
///
/// ```
/// use resync_server::{MemoryRecordResolver, ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default(), MemoryRecordResolver::new());
/// assert_eq!(server.checkpoint(), "0");
///
/// // In a real application, you would expose an HTTP endpoint at
/// // server.path() that forwards request bodies to server.handle_post()
/// ```
pub struct SyncServer<R: RecordResolver> {
    handler: SyncHandler,
    resolver: Arc<R>,
}

impl<R: RecordResolver> SyncServer<R> {
    /// Creates a sync server with fresh stores.
    pub fn new(config: ServerConfig, resolver: R) -> Self {
        let changes = Arc::new(ChangeLog::new(config.endpoint.retention()));
        Self::with_stores(config, Arc::new(resolver), Arc::new(VersionStore::new()), changes)
    }

    /// Creates a sync server over existing, possibly shared, stores.
    pub fn with_stores(
        config: ServerConfig,
        resolver: Arc<R>,
        versions: Arc<VersionStore>,
        changes: Arc<ChangeLog>,
    ) -> Self {
        Self {
            handler: SyncHandler::new(config, versions, changes),
            resolver,
        }
    }

    /// Returns the push handler.
    pub fn handler(&self) -> &SyncHandler {
        &self.handler
    }

    /// Returns the record resolver.
    pub fn resolver(&self) -> &Arc<R> {
        &self.resolver
    }

    /// Returns the path the push endpoint is mounted at.
    pub fn path(&self) -> &str {
        &self.handler.config().endpoint.path
    }

    /// Returns the version store.
    pub fn versions(&self) -> &Arc<VersionStore> {
        self.handler.versions()
    }

    /// Returns the change log.
    pub fn change_log(&self) -> &Arc<ChangeLog> {
        self.handler.change_log()
    }

    /// Returns the current change log checkpoint.
    pub fn checkpoint(&self) -> Checkpoint {
        self.handler.change_log().current_checkpoint()
    }

    /// Handles a decoded push request.
    pub async fn handle_push(&self, request: SyncPushRequest) -> ServerResult<SyncPushResponse> {
        self.handler
            .handle_push(request, self.resolver.as_ref())
            .await
    }

    /// Handles a raw POST body.
    ///
    /// The content type selects the wire format; the response is encoded
    /// in the same format.
    pub async fn handle_post(
        &self,
        path: &str,
        content_type: &str,
        body: &[u8],
    ) -> ServerResult<Vec<u8>> {
        if path != self.path() {
            return Err(ServerError::NotFound(path.to_string()));
        }
        let format = WireFormat::from_content_type(content_type)?;
        let request = SyncPushRequest::decode(body, format)?;
        let response = self.handle_push(request).await?;
        Ok(response.encode(format)?)
    }

    /// Prunes the change log once.
    pub fn prune(&self) -> usize {
        self.handler.change_log().prune()
    }

    /// Spawns a task pruning the change log every `period`.
    ///
    /// Must be called inside a tokio runtime. Abort the returned handle to
    /// stop it. Periods below [`MIN_PRUNE_PERIOD`] are raised to it.
    pub fn spawn_pruner(&self, period: Duration) -> JoinHandle<()> {
        let period = if period < MIN_PRUNE_PERIOD {
            warn!(?period, min = ?MIN_PRUNE_PERIOD, "prune period too short, raising");
            MIN_PRUNE_PERIOD
        } else {
            period
        };
        let changes = Arc::clone(self.handler.change_log());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = changes.prune();
                if removed > 0 {
                    info!(removed, "change log pruned");
                } else {
                    debug!("change log prune: nothing to remove");
                }
            }
        })
    }
}
