//! Simulate command implementation.
//!
//! Runs several clients against one in-process server. Every client edits
//! the same records from the same starting version, so all but the first
//! writer hit conflicts, which are then settled with the chosen strategy.

use async_trait::async_trait;
use resync_engine::{
    ConflictStrategy, SyncConfig, SyncEngine, SyncError, SyncResult, SyncTransport,
};
use resync_protocol::record::{RecordData, UPDATED_AT_FIELD};
use resync_protocol::{
    MutationOutcome, MutationSpec, Operation, SyncPushRequest, SyncPushResponse,
};
use resync_server::{MemoryRecordResolver, ServerConfig, SyncServer};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const OBJECT: &str = "todo";
const MAX_ROUNDS: usize = 64;

type LocalServer = SyncServer<MemoryRecordResolver>;

/// Parameters of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of clients.
    pub clients: usize,
    /// Number of shared records.
    pub records: usize,
    /// Edits each client makes.
    pub edits: usize,
    /// Conflict strategy used by every client.
    pub strategy: ConflictStrategy,
    /// Client push batch size.
    pub batch_size: usize,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            clients: 3,
            records: 5,
            edits: 5,
            strategy: ConflictStrategy::LastWriteWins,
            batch_size: 50,
        }
    }
}

/// What happened during a simulation.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// Strategy used.
    pub strategy: String,
    /// Push round-trips made.
    pub pushes: u64,
    /// Mutations recorded by all clients, rebases included.
    pub mutations_recorded: u64,
    /// Mutations the server applied.
    pub applied: u64,
    /// Conflicts the server reported.
    pub conflicts: u64,
    /// Conflicts settled by the client resolver and rebased.
    pub resolved: u64,
    /// Conflicts the resolver left open; their edits were dropped.
    pub unresolved: u64,
    /// Mutations the server rejected.
    pub rejected: u64,
    /// Final server checkpoint.
    pub checkpoint: String,
    /// Records stored on the server.
    pub records: usize,
}

/// A transport calling straight into an in-process server.
struct LocalTransport {
    server: Arc<LocalServer>,
}

#[async_trait]
impl SyncTransport for LocalTransport {
    async fn push(&self, request: &SyncPushRequest) -> SyncResult<SyncPushResponse> {
        self.server
            .handle_push(request.clone())
            .await
            .map_err(|e| SyncError::ServerError(e.to_string()))
    }
}

/// A simulated client and the record versions it has seen.
struct Client {
    engine: SyncEngine<LocalTransport>,
    known: HashMap<String, u64>,
}

impl Client {
    fn new(id: String, server: &Arc<LocalServer>, options: &SimulateOptions) -> Self {
        let config = SyncConfig::new()
            .with_strategy(options.strategy)
            .with_batch_size(options.batch_size);
        let transport = LocalTransport {
            server: Arc::clone(server),
        };
        Self {
            engine: SyncEngine::new(id, transport, config),
            known: HashMap::new(),
        }
    }

    fn base_of(&self, record_id: &str) -> u64 {
        self.known.get(record_id).copied().unwrap_or(0)
    }

    fn observe(&mut self, response: &SyncPushResponse) {
        for change in &response.server_changes {
            match change.operation {
                Operation::Delete => {
                    self.known.remove(&change.record_id);
                }
                _ => {
                    self.known
                        .insert(change.record_id.clone(), change.server_version);
                }
            }
        }
    }

    fn record(&self, spec: MutationSpec, report: &mut SimulationReport) -> SyncResult<()> {
        self.engine.record_mutation(spec)?;
        self.engine.cancel_scheduled_sync();
        report.mutations_recorded += 1;
        Ok(())
    }

    /// Pushes until nothing is left or no progress is made.
    async fn drain(&mut self, report: &mut SimulationReport) -> SyncResult<()> {
        for _ in 0..MAX_ROUNDS {
            let Some(response) = self.engine.sync().await else {
                break;
            };
            report.pushes += 1;
            self.observe(&response);

            let mut settled = Vec::new();
            let mut rebases = Vec::new();
            for result in &response.results {
                match &result.outcome {
                    MutationOutcome::Applied { .. } => report.applied += 1,
                    MutationOutcome::Rejected { .. } => report.rejected += 1,
                    MutationOutcome::Conflict { conflict, .. } => {
                        report.conflicts += 1;
                        settled.push(result.mutation_id.clone());
                        match self.engine.resolve_conflict(conflict).outcome {
                            MutationOutcome::Applied { resolved_data, .. } => {
                                report.resolved += 1;
                                let mut data = resolved_data
                                    .or_else(|| conflict.client_mutation.data.clone())
                                    .unwrap_or_default();
                                // keep the original edit time for later LWW comparisons
                                data.entry(UPDATED_AT_FIELD).or_insert_with(|| {
                                    json!(conflict.client_mutation.timestamp.to_rfc3339())
                                });
                                rebases.push((conflict.record_id.clone(), data));
                            }
                            _ => report.unresolved += 1,
                        }
                    }
                }
            }

            self.engine.discard_pending(&settled);
            for (record_id, data) in rebases {
                let base = self.base_of(&record_id);
                debug!(record = %record_id, base, "rebasing resolved conflict");
                self.record(MutationSpec::update(OBJECT, record_id, data, base), report)?;
            }

            if self.engine.pending_count() == 0 || response.results.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

/// Runs a simulation and returns its report.
pub async fn simulate(options: &SimulateOptions) -> SyncResult<SimulationReport> {
    let server = Arc::new(SyncServer::new(
        ServerConfig::new().with_conflict_fields(OBJECT, ["title", "done"]),
        MemoryRecordResolver::new(),
    ));
    let mut report = SimulationReport {
        strategy: options.strategy.to_string(),
        ..Default::default()
    };

    let mut clients: Vec<Client> = (0..options.clients.max(1))
        .map(|i| Client::new(format!("client-{i}"), &server, options))
        .collect();

    // the first client seeds the records, everyone else catches up
    for r in 0..options.records {
        let data = record_data(json!({"title": format!("task {r}"), "done": false}));
        clients[0].record(MutationSpec::create(OBJECT, format!("r{r}"), data), &mut report)?;
    }
    for client in clients.iter_mut() {
        client.drain(&mut report).await?;
    }
    info!(records = options.records, checkpoint = %server.checkpoint(), "seeded");

    // every client edits from the version it saw after seeding
    for (c, client) in clients.iter().enumerate() {
        for e in 0..options.edits {
            let record_id = format!("r{}", e % options.records.max(1));
            let base = client.base_of(&record_id);
            let data = record_data(json!({
                "title": format!("client {c} edit {e}"),
                "done": e % 2 == 1,
            }));
            client.record(MutationSpec::update(OBJECT, record_id, data, base), &mut report)?;
        }
    }
    for client in clients.iter_mut() {
        client.drain(&mut report).await?;
    }

    report.checkpoint = server.checkpoint();
    report.records = server.resolver().len();
    info!(
        applied = report.applied,
        conflicts = report.conflicts,
        resolved = report.resolved,
        "simulation finished"
    );
    Ok(report)
}

fn record_data(value: serde_json::Value) -> RecordData {
    match value {
        serde_json::Value::Object(map) => map,
        _ => RecordData::new(),
    }
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate(options))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }
    Ok(())
}

fn print_text_output(report: &SimulationReport) {
    println!("Sync Simulation ({})", report.strategy);
    println!("{}", "=".repeat(40));
    println!("Pushes:             {}", report.pushes);
    println!("Mutations recorded: {}", report.mutations_recorded);
    println!("Applied:            {}", report.applied);
    println!("Conflicts:          {}", report.conflicts);
    println!("  resolved:         {}", report.resolved);
    println!("  unresolved:       {}", report.unresolved);
    println!("Rejected:           {}", report.rejected);
    println!("Final checkpoint:   {}", report.checkpoint);
    println!("Server records:     {}", report.records);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(strategy: ConflictStrategy) -> SimulateOptions {
        SimulateOptions {
            clients: 3,
            records: 2,
            edits: 2,
            strategy,
            batch_size: 50,
        }
    }

    #[tokio::test]
    async fn last_write_wins_settles_every_conflict() {
        let report = simulate(&options(ConflictStrategy::LastWriteWins))
            .await
            .unwrap();

        // client 0 applies both edits; clients 1 and 2 conflict on both
        assert_eq!(report.conflicts, 4);
        assert_eq!(report.resolved, 4);
        assert_eq!(report.unresolved, 0);
        assert_eq!(report.applied, 2 + 2 + 4);
        assert_eq!(report.checkpoint, "8");
        assert_eq!(report.records, 2);
    }

    #[tokio::test]
    async fn manual_without_callback_leaves_conflicts_open() {
        let report = simulate(&options(ConflictStrategy::Manual)).await.unwrap();

        assert_eq!(report.conflicts, 4);
        assert_eq!(report.resolved, 0);
        assert_eq!(report.unresolved, 4);
        assert_eq!(report.applied, 4);
        assert_eq!(report.checkpoint, "4");
    }

    #[tokio::test]
    async fn crdt_merges_conflicts() {
        let report = simulate(&options(ConflictStrategy::Crdt)).await.unwrap();
        assert_eq!(report.resolved, report.conflicts);
        assert_eq!(report.unresolved, 0);
    }
}
