use std::time::Instant;

use tracing::{debug, warn};

use super::{Graph, NodeId};
use crate::context::ExecutionContext;
use crate::data::DynamicValue;
use crate::error::Result;
use crate::operator::{Outcome, OperatorContext, TimeStep};

#[derive(Debug, Clone)]
pub struct ExecutedNode {
    pub node_id: NodeId,
    pub self_secs: f64,
    pub cumulative_secs: f64,
}

/// What one evaluation pass over a graph did.
#[derive(Debug, Clone, Default)]
pub struct GraphRun {
    pub executed: Vec<ExecutedNode>,
    pub cached: Vec<NodeId>,
    pub errors: Vec<(NodeId, String)>,
    pub interrupted: bool,
}

impl Graph {
    /// Brings the output nodes up to date. Stale nodes among them and their
    /// upstream execute producers-first; fresh ones are served from cache.
    ///
    /// `run_id` identifies the pass so upstream failures and timings are only
    /// attributed within it.
    pub fn evaluate(&mut self, ctx: &ExecutionContext, run_id: u64) -> Result<GraphRun> {
        if self.needs_reordering {
            self.topological_sort()?;
        }

        let required = self.required_ids();
        let execute_order: Vec<usize> = self
            .ordered_nodes()?
            .iter()
            .filter(|id| required.contains(*id))
            .filter_map(|id| self.nodes.index_of_key(id))
            .collect();

        let mut run = GraphRun::default();
        for node_idx in execute_order {
            if ctx.interrupted() {
                run.interrupted = true;
                break;
            }

            self.evaluate_node(node_idx, ctx, run_id, &mut run);

            if run.interrupted {
                break;
            }
        }

        Ok(run)
    }

    fn evaluate_node(
        &mut self,
        node_idx: usize,
        ctx: &ExecutionContext,
        run_id: u64,
        run: &mut GraphRun,
    ) {
        let node = &self.nodes[node_idx];
        if !node.wants_execute() {
            run.cached.push(node.id);
            return;
        }

        if let Some(upstream_name) = self.errored_dependency(node_idx, run_id) {
            let node = &mut self.nodes[node_idx];
            let message = format!("Skipped due to upstream error in '{}'", upstream_name);
            node.failed_run = Some(run_id);
            node.warnings = vec![message.clone()];
            run.errors.push((node.id, message));
            ctx.coordinator().node_finished();
            return;
        }

        let inputs = self.collect_inputs(node_idx);
        let upstream_cumulative = self.upstream_cumulative_time(node_idx, run_id);

        let Graph {
            nodes,
            entry,
            side_data,
            ..
        } = self;
        let node = &mut nodes[node_idx];

        let time_step = TimeStep::between(node.last_frame, ctx.frame());
        let mut outputs = vec![DynamicValue::None; node.outputs.len()];
        // Committed state changes only together with the outputs.
        let mut state = node.state.clone();
        node.warnings.clear();
        ctx.coordinator().begin_node();

        let start = Instant::now();
        let outcome = {
            let mut op_ctx = OperatorContext {
                exec: ctx,
                node_id: node.id,
                inputs: &inputs,
                outputs: &mut outputs,
                parameters: &node.parameters,
                state: &mut state,
                warnings: &mut node.warnings,
                time_step,
                entry,
                side_data,
            };
            node.operator.execute(&mut op_ctx)
        };
        let self_time = start.elapsed().as_secs_f64();

        if ctx.interrupted() {
            debug!(node = %node.name, "Interrupted, discarding outputs");
            node.warnings.push("Interrupted".to_string());
            run.interrupted = true;
            return;
        }

        match outcome {
            Outcome::Success => {
                node.output_values = Some(outputs);
                node.state = state;
                node.needs_execution = false;
                node.execution_count += 1;
                node.self_time = self_time;
                node.cumulative_time = self_time + upstream_cumulative;
                node.last_frame = Some(ctx.frame());
                node.last_run = Some(run_id);
                node.failed_run = None;

                run.executed.push(ExecutedNode {
                    node_id: node.id,
                    self_secs: node.self_time,
                    cumulative_secs: node.cumulative_time,
                });

                let downstream: Vec<NodeId> = node
                    .outputs
                    .iter()
                    .flat_map(|output| output.links.iter().map(|link| link.node_id))
                    .collect();
                for id in downstream {
                    if let Some(target) = nodes.by_key_mut(&id) {
                        target.needs_execution = true;
                    }
                }
            }
            Outcome::Failure(message) => {
                warn!(node = %node.name, %message, "Operator failed");
                node.warnings.push(message.clone());
                node.failed_run = Some(run_id);
                run.errors.push((node.id, message));
            }
        }

        ctx.coordinator().node_finished();
    }

    /// Name of a direct upstream node that failed in this pass or has never
    /// produced a result.
    fn errored_dependency(&self, node_idx: usize, run_id: u64) -> Option<String> {
        self.nodes[node_idx]
            .inputs
            .iter()
            .flat_map(|input| input.links.iter())
            .filter_map(|link| self.nodes.by_key(&link.node_id))
            .find(|upstream| {
                upstream.failed_run == Some(run_id) || upstream.output_values.is_none()
            })
            .map(|upstream| upstream.name.clone())
    }

    fn collect_inputs(&self, node_idx: usize) -> Vec<Vec<DynamicValue>> {
        self.nodes[node_idx]
            .inputs
            .iter()
            .map(|input| {
                input
                    .links
                    .iter()
                    .map(|link| {
                        self.nodes
                            .by_key(&link.node_id)
                            .and_then(|upstream| upstream.output_value(link.socket_idx))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    fn upstream_cumulative_time(&self, node_idx: usize, run_id: u64) -> f64 {
        let mut seen: Vec<NodeId> = Vec::new();
        let mut total = 0.0;

        for link in self.nodes[node_idx]
            .inputs
            .iter()
            .flat_map(|input| input.links.iter())
        {
            if seen.contains(&link.node_id) {
                continue;
            }
            seen.push(link.node_id);

            if let Some(upstream) = self.nodes.by_key(&link.node_id)
                && upstream.last_run == Some(run_id)
            {
                total += upstream.cumulative_time;
            }
        }

        total
    }
}
