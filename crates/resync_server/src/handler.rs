//! Push request handling.

use crate::change_log::ChangeLog;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::record_resolver::RecordResolver;
use crate::version_store::VersionStore;
use chrono::Utc;
use resync_protocol::record;
use resync_protocol::{
    MutationLogEntry, Operation, SyncConflict, SyncMutationResult, SyncPushRequest,
    SyncPushResponse, SyncServerChange,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies pushed mutations under optimistic concurrency.
///
/// The handler detects conflicts and reports them; it never resolves them.
/// Concurrent calls are safe: mutations of the same record are serialised
/// by the version store's per-record lock.
pub struct SyncHandler {
    config: ServerConfig,
    versions: Arc<VersionStore>,
    changes: Arc<ChangeLog>,
}

impl SyncHandler {
    /// Creates a handler over shared stores.
    pub fn new(config: ServerConfig, versions: Arc<VersionStore>, changes: Arc<ChangeLog>) -> Self {
        Self {
            config,
            versions,
            changes,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the version store.
    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }

    /// Returns the change log.
    pub fn change_log(&self) -> &Arc<ChangeLog> {
        &self.changes
    }

    /// Handles a push request.
    ///
    /// Fails as a whole only when the endpoint is disabled or the request
    /// carries more mutations than allowed. Otherwise every mutation gets a
    /// result, in request order.
    pub async fn handle_push<R>(
        &self,
        request: SyncPushRequest,
        resolver: &R,
    ) -> ServerResult<SyncPushResponse>
    where
        R: RecordResolver + ?Sized,
    {
        let endpoint = &self.config.endpoint;
        if !endpoint.enabled {
            return Err(ServerError::Disabled);
        }
        if request.mutations.len() > endpoint.max_mutations_per_request {
            return Err(ServerError::InvalidRequest(format!(
                "too many mutations: {} > {}",
                request.mutations.len(),
                endpoint.max_mutations_per_request
            )));
        }

        debug!(
            client_id = %request.client_id,
            mutations = request.mutations.len(),
            checkpoint = request.last_checkpoint.as_deref().unwrap_or("none"),
            "handling push"
        );

        let mut results = Vec::with_capacity(request.mutations.len());
        for mutation in request.mutations {
            results.push(self.process(mutation, resolver).await);
        }

        let server_changes = self
            .changes
            .changes_since(request.last_checkpoint.as_deref());
        let checkpoint = self.changes.current_checkpoint();

        Ok(SyncPushResponse::new(results, server_changes, checkpoint))
    }

    async fn process<R>(&self, mutation: MutationLogEntry, resolver: &R) -> SyncMutationResult
    where
        R: RecordResolver + ?Sized,
    {
        let object_name = mutation.object_name.clone();
        let record_id = mutation.record_id.clone();
        let lock = self.versions.record_lock(&object_name, &record_id);
        let result = {
            let _held = lock.lock().await;
            self.process_locked(mutation, resolver).await
        };
        self.versions.release_lock(&object_name, &record_id, lock);
        result
    }

    async fn process_locked<R>(
        &self,
        mutation: MutationLogEntry,
        resolver: &R,
    ) -> SyncMutationResult
    where
        R: RecordResolver + ?Sized,
    {
        // redelivery of a mutation that is still in the change log
        if let Some(version) = self.changes.applied_version(&mutation.id) {
            debug!(
                mutation_id = %mutation.id,
                version,
                "mutation already applied"
            );
            return SyncMutationResult::applied(mutation.id, version);
        }

        let current = self
            .versions
            .get_version(&mutation.object_name, &mutation.record_id);
        if is_conflict(&mutation, current) {
            return self.report_conflict(mutation, resolver).await;
        }

        let new_version = self
            .versions
            .increment(&mutation.object_name, &mutation.record_id);

        if let Err(e) = resolver.apply_mutation(&mutation, new_version).await {
            warn!(
                mutation_id = %mutation.id,
                object = %mutation.object_name,
                record = %mutation.record_id,
                error = %e,
                "failed to apply mutation"
            );
            return SyncMutationResult::rejected(mutation.id, e.to_string());
        }

        if mutation.operation == Operation::Delete {
            self.versions
                .remove(&mutation.object_name, &mutation.record_id);
        }

        let entry = self.changes.record_applied(
            mutation.id.clone(),
            SyncServerChange {
                object_name: mutation.object_name,
                record_id: mutation.record_id,
                operation: mutation.operation,
                data: mutation.data,
                server_version: new_version,
                timestamp: Utc::now(),
            },
        );
        debug!(
            mutation_id = %mutation.id,
            version = new_version,
            checkpoint = entry.checkpoint,
            "mutation applied"
        );

        SyncMutationResult::applied(mutation.id, new_version)
    }

    async fn report_conflict<R>(
        &self,
        mutation: MutationLogEntry,
        resolver: &R,
    ) -> SyncMutationResult
    where
        R: RecordResolver + ?Sized,
    {
        let server_record = match resolver
            .get_record(&mutation.object_name, &mutation.record_id)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    mutation_id = %mutation.id,
                    error = %e,
                    "failed to load record for conflict report"
                );
                return SyncMutationResult::rejected(mutation.id, e.to_string());
            }
        };

        let fields = record::conflicting_fields(
            self.config.conflict_fields_for(&mutation.object_name),
            mutation.data.as_ref(),
            &server_record,
        );
        info!(
            mutation_id = %mutation.id,
            object = %mutation.object_name,
            record = %mutation.record_id,
            base_version = ?mutation.base_version,
            conflicting_fields = ?fields,
            "version conflict"
        );

        SyncMutationResult::conflict(SyncConflict::new(mutation, server_record, fields))
    }
}

/// Returns true if `mutation` may not be applied over `current`.
///
/// Updates and deletes must name the current version (a missing base or a
/// missing record both count as 0). A create only conflicts when it names
/// a base version and the record already exists.
fn is_conflict(mutation: &MutationLogEntry, current: Option<u64>) -> bool {
    match mutation.operation {
        Operation::Update | Operation::Delete => {
            mutation.base_version_or_zero() != current.unwrap_or(0)
        }
        Operation::Create => mutation.base_version.is_some() && current.is_some(),
    }
}
