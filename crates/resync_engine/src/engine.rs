//! The client sync engine.
//!
//! [`SyncEngine`] owns the mutation log, the checkpoint and the conflict
//! resolver, and drives push cycles over a [`SyncTransport`]. A cycle is
//! started either explicitly with [`SyncEngine::sync`] or by the debounce
//! timer armed on every recorded mutation.

use crate::config::{SyncConfig, SyncDirection};
use crate::error::{SyncError, SyncResult};
use crate::listener::{ListenerId, Listeners, SyncListener};
use crate::mutation_log::MutationLogger;
use crate::resolver::{resolver_for, ConflictResolver, ConflictStrategy, ManualResolveFn};
use crate::scheduler::DebounceTimer;
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use resync_protocol::{
    Checkpoint, MutationLogEntry, MutationOutcome, MutationSpec, SyncConflict, SyncMutationResult,
    SyncPushRequest, SyncPushResponse,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Push round-trips that returned a response.
    pub cycles_completed: u64,
    /// Mutations sent to the server (resends included).
    pub mutations_pushed: u64,
    /// Mutations removed from the log after being applied.
    pub mutations_acknowledged: u64,
    /// Conflicts reported by the server.
    pub conflicts: u64,
    /// Mutations the server rejected.
    pub rejected: u64,
    /// Push attempts that failed in the transport.
    pub failures: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Marks the engine as syncing for as long as it lives.
///
/// Dropping the guard (normal return, early return, or the sync future
/// being dropped mid-await) clears the flag.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct EngineInner<T> {
    client_id: String,
    config: SyncConfig,
    transport: T,
    log: RwLock<MutationLogger>,
    resolver: Box<dyn ConflictResolver>,
    checkpoint: RwLock<Option<Checkpoint>>,
    syncing: AtomicBool,
    closed: AtomicBool,
    listeners: Listeners,
    timer: DebounceTimer,
    stats: RwLock<SyncStats>,
}

/// Offline-first sync engine for one client.
///
/// Cloning is cheap; clones share the same log, checkpoint and listeners.
///
/// # Invariants
///
/// - At most one push is in flight per engine; overlapping calls to
///   [`sync`](Self::sync) return `None` without contacting the transport
/// - A mutation leaves the log only when the server reports it applied
/// - The checkpoint only changes on a successful push or through
///   [`set_checkpoint`](Self::set_checkpoint)
pub struct SyncEngine<T: SyncTransport + 'static> {
    inner: Arc<EngineInner<T>>,
}

impl<T: SyncTransport + 'static> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SyncTransport + 'static> SyncEngine<T> {
    /// Creates an engine with an empty mutation log.
    pub fn new(client_id: impl Into<String>, transport: T, config: SyncConfig) -> Self {
        Self::with_logger(MutationLogger::new(client_id), transport, config, None)
    }

    /// Creates an engine whose manual strategy consults `callback`.
    pub fn with_manual_resolver(
        client_id: impl Into<String>,
        transport: T,
        config: SyncConfig,
        callback: ManualResolveFn,
    ) -> Self {
        Self::with_logger(
            MutationLogger::new(client_id),
            transport,
            config,
            Some(callback),
        )
    }

    /// Creates an engine around an existing (possibly restored) log.
    pub fn with_logger(
        logger: MutationLogger,
        transport: T,
        config: SyncConfig,
        manual: Option<ManualResolveFn>,
    ) -> Self {
        let resolver = resolver_for(config.strategy, manual);
        Self {
            inner: Arc::new(EngineInner {
                client_id: logger.client_id().to_string(),
                config,
                transport,
                log: RwLock::new(logger),
                resolver,
                checkpoint: RwLock::new(None),
                syncing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                listeners: Listeners::default(),
                timer: DebounceTimer::default(),
                stats: RwLock::new(SyncStats::default()),
            }),
        }
    }

    /// Returns the client id.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Returns the configured conflict strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.inner.resolver.strategy()
    }

    /// Records a local mutation and arms the debounce timer.
    ///
    /// The timer is not armed for pull-only or disabled engines, or after
    /// [`shutdown`](Self::shutdown).
    pub fn record_mutation(&self, spec: MutationSpec) -> SyncResult<MutationLogEntry> {
        let entry = self.inner.log.write().append(spec)?;
        debug!(
            mutation_id = %entry.id,
            sequence = entry.sequence,
            object = %entry.object_name,
            record = %entry.record_id,
            operation = %entry.operation,
            "mutation recorded"
        );

        if self.inner.config.pushes() {
            self.schedule_sync();
        }
        Ok(entry)
    }

    /// (Re)arms the debounce timer. When it fires, a sync runs as its own
    /// task.
    ///
    /// Returns false if nothing was scheduled: the engine is disabled or
    /// shut down, or no tokio runtime is available.
    pub fn schedule_sync(&self) -> bool {
        if !self.inner.config.enabled || self.inner.closed.load(Ordering::SeqCst) {
            return false;
        }

        let weak: Weak<EngineInner<T>> = Arc::downgrade(&self.inner);
        let scheduled = self.inner.timer.schedule(self.inner.config.debounce(), move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            let engine = SyncEngine { inner };
            tokio::spawn(async move {
                engine.sync().await;
            });
        });

        if !scheduled {
            debug!("no async runtime available; sync not scheduled");
        }
        scheduled
    }

    /// Cancels the pending debounce timer. An in-flight sync is not
    /// affected.
    pub fn cancel_scheduled_sync(&self) -> bool {
        self.inner.timer.cancel()
    }

    /// Returns true if a debounce timer is armed.
    pub fn has_scheduled_sync(&self) -> bool {
        self.inner.timer.is_pending()
    }

    /// Cancels the pending timer and stops future scheduling.
    ///
    /// Explicit calls to [`sync`](Self::sync) keep working; an in-flight
    /// push completes normally.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.timer.cancel();
        info!(client_id = %self.inner.client_id, "sync engine shut down");
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Returns true while a push is in flight.
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Runs one push cycle.
    ///
    /// Returns `None` without contacting the transport when the engine is
    /// disabled, pull-only, push-only with nothing pending, or already
    /// syncing. Transport failures also yield `None`; they are reported to
    /// listeners and the log is left untouched.
    pub async fn sync(&self) -> Option<SyncPushResponse> {
        let inner = &self.inner;

        if !inner.config.enabled {
            debug!("sync disabled; skipping");
            return None;
        }
        match inner.config.direction {
            SyncDirection::PullOnly => {
                debug!("pull-only engine; nothing to push");
                return None;
            }
            SyncDirection::PushOnly if inner.log.read().is_empty() => {
                debug!("no pending mutations; skipping push");
                return None;
            }
            _ => {}
        }

        let Some(_guard) = SyncGuard::acquire(&inner.syncing) else {
            debug!("sync already in flight; skipping");
            return None;
        };

        inner.listeners.emit("on_sync_start", |l| l.on_sync_start());

        let batch = inner.log.read().pending_batch(inner.config.batch_size);
        let last_checkpoint = inner.checkpoint.read().clone();
        let batch_len = batch.len() as u64;
        debug!(
            client_id = %inner.client_id,
            mutations = batch_len,
            checkpoint = last_checkpoint.as_deref().unwrap_or("none"),
            "pushing mutations"
        );
        let request = SyncPushRequest::new(inner.client_id.clone(), batch, last_checkpoint);

        match inner.transport.push(&request).await {
            Ok(response) => {
                self.handle_response(&response, batch_len);
                Some(response)
            }
            Err(error) => {
                self.handle_failure(&error);
                None
            }
        }
    }

    fn handle_response(&self, response: &SyncPushResponse, pushed: u64) {
        let inner = &self.inner;

        let mut applied = Vec::new();
        let mut conflicts = Vec::new();
        let mut rejected = 0u64;
        for result in &response.results {
            match &result.outcome {
                MutationOutcome::Applied { .. } => applied.push(result.mutation_id.as_str()),
                MutationOutcome::Conflict { conflict, .. } => {
                    debug!(
                        mutation_id = %result.mutation_id,
                        fields = ?conflict.conflicting_fields,
                        "server reported conflict"
                    );
                    conflicts.push(conflict.clone());
                }
                MutationOutcome::Rejected { reason } => {
                    rejected += 1;
                    warn!(
                        mutation_id = %result.mutation_id,
                        reason = reason.as_deref().unwrap_or("unspecified"),
                        "server rejected mutation"
                    );
                }
            }
        }

        let acknowledged = inner.log.write().acknowledge(applied);
        *inner.checkpoint.write() = Some(response.checkpoint.clone());

        {
            let mut stats = inner.stats.write();
            stats.cycles_completed += 1;
            stats.mutations_pushed += pushed;
            stats.mutations_acknowledged += acknowledged as u64;
            stats.conflicts += conflicts.len() as u64;
            stats.rejected += rejected;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        info!(
            client_id = %inner.client_id,
            acknowledged,
            conflicts = conflicts.len(),
            rejected,
            server_changes = response.server_changes.len(),
            checkpoint = %response.checkpoint,
            "sync cycle completed"
        );

        if !conflicts.is_empty() {
            inner
                .listeners
                .emit("on_conflict", |l| l.on_conflict(&conflicts));
        }
        if !response.server_changes.is_empty() {
            inner.listeners.emit("on_server_changes", |l| {
                l.on_server_changes(&response.server_changes)
            });
        }
        inner
            .listeners
            .emit("on_sync_complete", |l| l.on_sync_complete(response));
    }

    fn handle_failure(&self, error: &SyncError) {
        let inner = &self.inner;
        warn!(
            client_id = %inner.client_id,
            error = %error,
            retryable = error.is_retryable(),
            "sync push failed; mutations kept for retry"
        );
        {
            let mut stats = inner.stats.write();
            stats.failures += 1;
            stats.last_error = Some(error.to_string());
        }
        inner
            .listeners
            .emit("on_sync_error", |l| l.on_sync_error(error));
    }

    /// Runs the configured resolver on a conflict.
    pub fn resolve_conflict(&self, conflict: &SyncConflict) -> SyncMutationResult {
        self.inner.resolver.resolve(conflict)
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn SyncListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Returns the last checkpoint received from the server.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.inner.checkpoint.read().clone()
    }

    /// Overrides the checkpoint, e.g. after restoring persisted state.
    pub fn set_checkpoint(&self, checkpoint: Option<Checkpoint>) {
        *self.inner.checkpoint.write() = checkpoint;
    }

    /// Returns all pending mutations in log order.
    pub fn pending(&self) -> Vec<MutationLogEntry> {
        self.inner.log.read().pending()
    }

    /// Returns pending mutations for one object type.
    pub fn pending_for_object(&self, object_name: &str) -> Vec<MutationLogEntry> {
        self.inner.log.read().pending_for_object(object_name)
    }

    /// Returns the number of pending mutations.
    pub fn pending_count(&self) -> usize {
        self.inner.log.read().len()
    }

    /// Drops every pending mutation. Sequence numbering continues.
    pub fn clear_pending(&self) {
        self.inner.log.write().clear();
    }

    /// Drops specific pending mutations, e.g. once the application has
    /// settled their conflicts. Returns the number removed.
    pub fn discard_pending<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed = self.inner.log.write().acknowledge(ids);
        debug!(removed, "discarded pending mutations");
        removed
    }

    /// Returns the last sequence number handed out by the log.
    pub fn last_sequence(&self) -> u64 {
        self.inner.log.read().last_sequence()
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use resync_protocol::record::RecordData;
    use resync_protocol::{Operation, SyncServerChange};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn data(value: Value) -> RecordData {
        value.as_object().cloned().unwrap()
    }

    fn create(id: &str) -> MutationSpec {
        MutationSpec::create("todo", id, data(json!({"title": id})))
    }

    fn engine_with(transport: MockTransport, config: SyncConfig) -> SyncEngine<Arc<MockTransport>> {
        SyncEngine::new("client-1", Arc::new(transport), config)
    }

    fn accepting_engine() -> SyncEngine<Arc<MockTransport>> {
        engine_with(MockTransport::accepting(), SyncConfig::default())
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl SyncListener for Recorder {
        fn on_sync_start(&self) {
            self.events.lock().push("start".into());
        }
        fn on_sync_complete(&self, response: &SyncPushResponse) {
            self.events
                .lock()
                .push(format!("complete:{}", response.checkpoint));
        }
        fn on_sync_error(&self, _error: &SyncError) {
            self.events.lock().push("error".into());
        }
        fn on_conflict(&self, conflicts: &[SyncConflict]) {
            self.events
                .lock()
                .push(format!("conflict:{}", conflicts.len()));
        }
        fn on_server_changes(&self, changes: &[SyncServerChange]) {
            self.events.lock().push(format!("changes:{}", changes.len()));
        }
    }

    struct Exploding;

    impl SyncListener for Exploding {
        fn on_sync_start(&self) {
            panic!("listener bug");
        }
        fn on_sync_complete(&self, _response: &SyncPushResponse) {
            panic!("listener bug");
        }
    }

    /// Blocks inside `push` until released.
    #[derive(Default)]
    struct GatedTransport {
        entered: Notify,
        release: Notify,
        inner: MockTransport,
    }

    #[async_trait]
    impl SyncTransport for GatedTransport {
        async fn push(&self, request: &SyncPushRequest) -> SyncResult<SyncPushResponse> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.push(request).await
        }
    }

    #[test]
    fn record_mutation_without_runtime() {
        let engine = accepting_engine();
        let first = engine.record_mutation(create("a")).unwrap();
        let second = engine.record_mutation(create("b")).unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(first.client_id, "client-1");
        assert_eq!(engine.pending_count(), 2);
        assert!(!engine.has_scheduled_sync());
    }

    #[test]
    fn record_mutation_rejects_missing_base() {
        let engine = accepting_engine();
        let mut spec = MutationSpec::update("todo", "a", RecordData::new(), 1);
        spec.base_version = None;

        let err = engine.record_mutation(spec).unwrap_err();
        assert!(matches!(err, SyncError::InvalidMutation(_)));
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn sync_acknowledges_applied_mutations() {
        let engine = accepting_engine();
        engine.record_mutation(create("a")).unwrap();
        engine.record_mutation(create("b")).unwrap();
        engine.cancel_scheduled_sync();

        let response = engine.sync().await.unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.checkpoint().as_deref(), Some("1"));

        let stats = engine.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.mutations_pushed, 2);
        assert_eq!(stats.mutations_acknowledged, 2);
        assert!(stats.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn checkpoint_is_sent_with_next_push() {
        let engine = accepting_engine();
        engine.sync().await.unwrap();
        engine.sync().await.unwrap();

        let requests = engine.transport().requests();
        assert_eq!(requests[0].last_checkpoint, None);
        assert_eq!(requests[1].last_checkpoint.as_deref(), Some("1"));
        assert_eq!(engine.checkpoint().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn disabled_engine_never_pushes() {
        let engine = engine_with(
            MockTransport::accepting(),
            SyncConfig::default().with_enabled(false),
        );
        engine.record_mutation(create("a")).unwrap();

        assert!(!engine.has_scheduled_sync());
        assert!(engine.sync().await.is_none());
        assert_eq!(engine.transport().push_count(), 0);
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn pull_only_engine_never_pushes() {
        let engine = engine_with(
            MockTransport::accepting(),
            SyncConfig::default().with_direction(SyncDirection::PullOnly),
        );
        engine.record_mutation(create("a")).unwrap();

        assert!(!engine.has_scheduled_sync());
        assert!(engine.sync().await.is_none());
        assert_eq!(engine.transport().push_count(), 0);
    }

    #[tokio::test]
    async fn push_only_skips_empty_log() {
        let engine = engine_with(
            MockTransport::accepting(),
            SyncConfig::default().with_direction(SyncDirection::PushOnly),
        );
        assert!(engine.sync().await.is_none());
        assert_eq!(engine.transport().push_count(), 0);
    }

    #[tokio::test]
    async fn bidirectional_pushes_empty_batch() {
        let engine = accepting_engine();
        let response = engine.sync().await.unwrap();

        assert!(response.results.is_empty());
        assert_eq!(engine.transport().push_count(), 1);
    }

    #[tokio::test]
    async fn batch_size_limits_push() {
        let engine = engine_with(
            MockTransport::accepting(),
            SyncConfig::default().with_batch_size(10),
        );
        for i in 0..15 {
            engine.record_mutation(create(&format!("r{i}"))).unwrap();
        }
        engine.cancel_scheduled_sync();

        engine.sync().await.unwrap();
        let requests = engine.transport().requests();
        assert_eq!(requests[0].mutations.len(), 10);
        assert_eq!(requests[0].mutations[0].record_id, "r0");
        assert_eq!(engine.pending_count(), 5);
        assert_eq!(engine.pending()[0].record_id, "r10");
    }

    #[tokio::test]
    async fn conflicts_and_rejections_stay_pending() {
        let transport = MockTransport::new();
        let engine = engine_with(transport, SyncConfig::default());
        let a = engine.record_mutation(create("a")).unwrap();
        let b = engine.record_mutation(create("b")).unwrap();
        let c = engine.record_mutation(create("c")).unwrap();
        engine.cancel_scheduled_sync();

        let conflict = SyncConflict::new(b.clone(), data(json!({"title": "server"})), vec![]);
        engine.transport().set_push_response(SyncPushResponse::new(
            vec![
                SyncMutationResult::applied(a.id.clone(), 1),
                SyncMutationResult::conflict(conflict),
                SyncMutationResult::rejected(c.id.clone(), "forbidden"),
            ],
            vec![SyncServerChange {
                object_name: "todo".into(),
                record_id: "a".into(),
                operation: Operation::Create,
                data: a.data.clone(),
                server_version: 1,
                timestamp: chrono::Utc::now(),
            }],
            "7",
        ));

        let recorder = Arc::new(Recorder::default());
        engine.add_listener(recorder.clone());

        engine.sync().await.unwrap();

        let pending: Vec<_> = engine.pending().into_iter().map(|e| e.id).collect();
        assert_eq!(pending, vec![b.id, c.id]);
        assert_eq!(engine.checkpoint().as_deref(), Some("7"));
        assert_eq!(
            recorder.events(),
            vec!["start", "conflict:1", "changes:1", "complete:7"]
        );

        let stats = engine.stats();
        assert_eq!(stats.conflicts, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn transport_failure_keeps_log() {
        let transport = MockTransport::new();
        transport.set_connected(false);
        let engine = engine_with(transport, SyncConfig::default());
        engine.record_mutation(create("a")).unwrap();
        engine.cancel_scheduled_sync();
        engine.set_checkpoint(Some("3".into()));

        let recorder = Arc::new(Recorder::default());
        engine.add_listener(recorder.clone());

        assert!(engine.sync().await.is_none());
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.checkpoint().as_deref(), Some("3"));
        assert_eq!(recorder.events(), vec!["start", "error"]);
        assert!(!engine.is_syncing());

        let stats = engine.stats();
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.is_some());
    }

    #[tokio::test]
    async fn overlapping_sync_is_refused() {
        let transport = Arc::new(GatedTransport {
            inner: MockTransport::accepting(),
            ..Default::default()
        });
        let engine = SyncEngine::new("client-1", transport.clone(), SyncConfig::default());

        let background = engine.clone();
        let first = tokio::spawn(async move { background.sync().await });

        transport.entered.notified().await;
        assert!(engine.is_syncing());
        assert!(engine.sync().await.is_none());

        transport.release.notify_one();
        assert!(first.await.unwrap().is_some());
        assert!(!engine.is_syncing());
        assert_eq!(transport.inner.push_count(), 1);
    }

    #[tokio::test]
    async fn mutations_recorded_mid_push_wait_for_next_cycle() {
        let transport = Arc::new(GatedTransport {
            inner: MockTransport::accepting(),
            ..Default::default()
        });
        let engine = SyncEngine::new("client-1", transport.clone(), SyncConfig::default());
        engine.record_mutation(create("a")).unwrap();
        engine.cancel_scheduled_sync();

        let background = engine.clone();
        let first = tokio::spawn(async move { background.sync().await });
        transport.entered.notified().await;

        let late = engine.record_mutation(create("b")).unwrap();
        engine.cancel_scheduled_sync();
        transport.release.notify_one();

        let response = first.await.unwrap().unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(transport.inner.requests()[0].mutations.len(), 1);
        let pending = engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late.id);

        let background = engine.clone();
        let second = tokio::spawn(async move { background.sync().await });
        transport.entered.notified().await;
        transport.release.notify_one();
        second.await.unwrap().unwrap();

        let requests = transport.inner.requests();
        assert_eq!(requests[1].mutations.len(), 1);
        assert_eq!(requests[1].mutations[0].id, late.id);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancelling_timer_leaves_push_running() {
        let transport = Arc::new(GatedTransport {
            inner: MockTransport::accepting(),
            ..Default::default()
        });
        let engine = SyncEngine::new("client-1", transport.clone(), SyncConfig::default());
        engine.record_mutation(create("a")).unwrap();

        let background = engine.clone();
        let push = tokio::spawn(async move { background.sync().await });
        transport.entered.notified().await;

        engine.record_mutation(create("b")).unwrap();
        assert!(engine.has_scheduled_sync());
        engine.cancel_scheduled_sync();
        assert!(!engine.has_scheduled_sync());
        assert!(engine.is_syncing());

        transport.release.notify_one();
        let response = push.await.unwrap().unwrap();
        assert!(response.results[0].is_applied());
        assert!(!engine.is_syncing());
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.stats().cycles_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sync_future_clears_flag() {
        let transport = Arc::new(GatedTransport::default());
        let engine = SyncEngine::new("client-1", transport, SyncConfig::default());

        let timed_out = tokio::time::timeout(Duration::from_millis(10), engine.sync()).await;
        assert!(timed_out.is_err());
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn panicking_listener_is_skipped() {
        let engine = accepting_engine();
        let recorder = Arc::new(Recorder::default());
        engine.add_listener(Arc::new(Exploding));
        engine.add_listener(recorder.clone());

        assert!(engine.sync().await.is_some());
        assert_eq!(recorder.events(), vec!["start", "complete:1"]);
    }

    #[tokio::test]
    async fn removed_listener_is_silent() {
        let engine = accepting_engine();
        let recorder = Arc::new(Recorder::default());
        let id = engine.add_listener(recorder.clone());
        assert_eq!(engine.listener_count(), 1);

        assert!(engine.remove_listener(id));
        engine.sync().await.unwrap();
        assert!(recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_collapses_mutations_into_one_push() {
        let engine = accepting_engine();
        for id in ["a", "b", "c"] {
            engine.record_mutation(create(id)).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(engine.has_scheduled_sync());
        assert_eq!(engine.transport().push_count(), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(engine.transport().push_count(), 1);
        assert_eq!(engine.transport().requests()[0].mutations.len(), 3);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_schedule_never_fires() {
        let engine = accepting_engine();
        engine.record_mutation(create("a")).unwrap();

        assert!(engine.cancel_scheduled_sync());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.transport().push_count(), 0);
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_scheduling() {
        let engine = accepting_engine();
        engine.record_mutation(create("a")).unwrap();
        engine.shutdown();

        assert!(engine.is_shut_down());
        assert!(!engine.has_scheduled_sync());
        engine.record_mutation(create("b")).unwrap();
        assert!(!engine.schedule_sync());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.transport().push_count(), 0);

        // explicit sync still works
        assert!(engine.sync().await.is_some());
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn resolve_conflict_uses_configured_strategy() {
        let callback: ManualResolveFn = Arc::new(|conflict: &SyncConflict| {
            let mut merged = conflict.server_record.clone();
            merged.insert("merged".into(), json!(true));
            Some(merged)
        });
        let engine = SyncEngine::with_manual_resolver(
            "client-1",
            Arc::new(MockTransport::new()),
            SyncConfig::default().with_strategy(ConflictStrategy::Manual),
            callback,
        );
        assert_eq!(engine.strategy(), ConflictStrategy::Manual);

        let entry = engine.record_mutation(create("a")).unwrap();
        let conflict = SyncConflict::new(entry, data(json!({"title": "server"})), vec![]);
        let result = engine.resolve_conflict(&conflict);

        match result.outcome {
            MutationOutcome::Applied { resolved_data, .. } => {
                assert_eq!(resolved_data.unwrap()["merged"], json!(true));
            }
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn clear_pending_keeps_sequence() {
        let engine = accepting_engine();
        engine.record_mutation(create("a")).unwrap();
        engine.clear_pending();

        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.last_sequence(), 1);
        assert_eq!(engine.record_mutation(create("b")).unwrap().sequence, 2);
    }

    #[test]
    fn discard_pending_removes_only_named() {
        let engine = accepting_engine();
        let a = engine.record_mutation(create("a")).unwrap();
        let b = engine.record_mutation(create("b")).unwrap();

        assert_eq!(engine.discard_pending([a.id.as_str(), "unknown"]), 1);
        let remaining: Vec<_> = engine.pending().into_iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec![b.id]);
    }

    #[test]
    fn restored_logger_resumes_numbering() {
        let logger = MutationLogger::from_state("client-9", 41, Vec::new());
        let engine = SyncEngine::with_logger(
            logger,
            Arc::new(MockTransport::new()),
            SyncConfig::default(),
            None,
        );
        assert_eq!(engine.client_id(), "client-9");
        assert_eq!(engine.record_mutation(create("a")).unwrap().sequence, 42);
    }
}
