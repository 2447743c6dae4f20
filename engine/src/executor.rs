use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::execution_stats::{ExecutionStats, NodeError};
use crate::network::{DependencyNetwork, NetworkNodeId};
use crate::plan::{ChangeReason, Plan, PlanEntry};
use crate::progress::ProgressCoordinator;

/// A plan running on the blocking pool.
#[derive(Debug)]
pub struct RunHandle {
    handle: JoinHandle<ExecutionStats>,
}

impl RunHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<ExecutionStats> {
        self.handle
            .await
            .map_err(|err| Error::TaskFailed(err.to_string()))
    }
}

/// Finishes the run if execution unwinds before reaching the normal end, so
/// the coordinator never stays claimed.
struct FinishGuard<'a> {
    coordinator: &'a ProgressCoordinator,
    armed: bool,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            error!("Evaluation run aborted");
            self.coordinator.finish_run(0, 0);
        }
    }
}

pub struct Executor;

impl Executor {
    /// Marks what the plan forces to re-run and counts the nodes expected to
    /// execute. Called on the requesting thread before the run starts.
    pub fn prepare(plan: &Plan, network: &DependencyNetwork, ctx: &ExecutionContext) {
        let coordinator = ctx.coordinator();

        for entry in plan.entries() {
            let Some(entity) = ctx.entities().by_id(&entry.entity_id) else {
                continue;
            };
            let mut graph = entity.graph();

            if plan.reason() == ChangeReason::FileOpened {
                graph.mark_all();
            }

            if plan.is_time_step()
                && let Some(network_node) = network.node(entry.network_node)
            {
                for trigger in network_node
                    .triggers
                    .iter()
                    .filter(|trigger| trigger.source == NetworkNodeId::TIME)
                {
                    if let Err(err) = graph.mark_needs_execution(&trigger.node_id) {
                        warn!(entity = entity.name(), %err, "Time trigger node is missing");
                    }
                }
            }

            coordinator.count_expected_nodes(graph.pending_node_count());
        }
    }

    /// Runs `plan` to completion on the current thread.
    ///
    /// Entities run in plan order. Node failures are collected in the stats
    /// and never stop the run; an interruption stops it before the next node.
    pub fn run(plan: &Plan, network: &DependencyNetwork, ctx: &ExecutionContext) -> ExecutionStats {
        let coordinator = ctx.coordinator();
        let run_id = coordinator.begin_run(plan.message());
        let mut guard = FinishGuard {
            coordinator,
            armed: true,
        };

        let start = Instant::now();
        let mut stats = ExecutionStats::new(run_id, plan.reason(), plan.is_time_step());

        let entries = plan.entries();
        for (pos, entry) in entries.iter().enumerate() {
            if coordinator.interrupted() {
                stats
                    .skipped_entities
                    .extend(entries[pos..].iter().map(|entry| entry.entity_id));
                break;
            }

            let Some(entity) = ctx.entities().by_id(&entry.entity_id) else {
                warn!(entity = %entry.entity_id, "Planned entity no longer exists");
                continue;
            };

            let result = entity.graph().evaluate(ctx, run_id);
            match result {
                Ok(run) => {
                    if !run.executed.is_empty() {
                        Self::mark_dependents(entry.network_node, &entries[pos + 1..], network, ctx);
                    }
                    let interrupted = run.interrupted;
                    stats.absorb(entity.id(), run);

                    if interrupted {
                        stats
                            .skipped_entities
                            .extend(entries[pos + 1..].iter().map(|entry| entry.entity_id));
                        break;
                    }
                }
                Err(err) => {
                    warn!(entity = entity.name(), %err, "Entity evaluation failed");
                    stats.node_errors.push(NodeError {
                        entity_id: entity.id(),
                        node_id: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        stats.elapsed_secs = start.elapsed().as_secs_f64();
        guard.armed = false;
        stats.state = coordinator.finish_run(stats.executed_nodes.len(), stats.node_errors.len());

        info!(
            run_id,
            reason = %plan.reason(),
            state = %stats.state,
            executed = stats.executed_nodes.len(),
            cached = stats.cached_nodes.len(),
            errors = stats.node_errors.len(),
            elapsed_secs = stats.elapsed_secs,
            "Evaluation finished"
        );

        stats
    }

    /// Marks the nodes reading `source` in every dependent entity, whether or
    /// not the dependent is part of this run. The mark lives in the dependent's
    /// graph, so a dependent skipped now still re-runs under a later plan.
    fn mark_dependents(
        source: NetworkNodeId,
        remaining: &[PlanEntry],
        network: &DependencyNetwork,
        ctx: &ExecutionContext,
    ) {
        let Some(source_node) = network.node(source) else {
            return;
        };

        for sortie in source_node.sorties.iter() {
            let Some(dependent) = network.node(*sortie) else {
                continue;
            };
            let Some(entity) = dependent
                .entity_id()
                .and_then(|entity_id| ctx.entities().by_id(&entity_id))
            else {
                continue;
            };
            let planned = remaining.iter().any(|entry| entry.network_node == *sortie);

            let mut graph = entity.graph();
            for trigger in dependent
                .triggers
                .iter()
                .filter(|trigger| trigger.source == source)
            {
                let was_pending = graph
                    .node(&trigger.node_id)
                    .is_some_and(|node| node.needs_execution());
                match graph.mark_needs_execution(&trigger.node_id) {
                    Ok(()) if planned && !was_pending => ctx.coordinator().count_expected_node(),
                    Ok(()) => {}
                    Err(err) => {
                        warn!(entity = entity.name(), %err, "Trigger node is missing");
                    }
                }
            }
        }
    }

    /// Runs `plan` on the runtime's blocking pool. The task owns its copies
    /// of the plan, network and context.
    pub fn spawn(
        runtime: &Handle,
        plan: Plan,
        network: Arc<DependencyNetwork>,
        ctx: ExecutionContext,
    ) -> RunHandle {
        let handle = runtime.spawn_blocking(move || Executor::run(&plan, &network, &ctx));
        RunHandle { handle }
    }
}
