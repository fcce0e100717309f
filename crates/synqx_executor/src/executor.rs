//! The layered DAG executor: nodes within a layer run concurrently on a
//! bounded `JoinSet`, and a full barrier separates layers so no successor
//! starts before every predecessor in the prior layer has reached EOS.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use synqx_dag::graph::PipelinePlan;
use synqx_ids::NodeId;
use synqx_protocol::types::{JobStatus, Node, OperatorType, StepRun, StepState, Watermark, WatermarkValue};
use synqx_runtime::operator::{ChunkEvent, ChunkStream};
use synqx_runtime::Chunk;

use crate::bridge::{chunk_to_rows, rows_to_chunk};
use crate::context::RunContext;
use crate::error::{ExecutorError, ExecutorResult};
use crate::guardrail::GuardrailTracker;
use crate::outcome::PipelineRunOutcome;
use crate::retry::with_retries;

pub struct Executor;

/// Per-node result of running its attempt(s), folded into the run-wide
/// outcome once the whole layer finishes.
struct NodeOutcome {
    step_run: StepRun,
    output: Vec<Chunk>,
    watermark: Option<Watermark>,
}

impl Executor {
    pub async fn run(plan: &PipelinePlan, ctx: RunContext) -> ExecutorResult<PipelineRunOutcome> {
        let started_at = Instant::now();
        let dag = plan.to_dag()?;
        let layers = dag.execution_layers()?;

        let node_outputs: Arc<Mutex<HashMap<NodeId, Vec<Chunk>>>> = Arc::new(Mutex::new(HashMap::new()));
        let mut step_runs = Vec::new();
        let mut candidate_watermarks = Vec::new();
        let mut totals = (0u64, 0u64, 0u64, 0u64); // in, out, failed, bytes
        let mut failed_step_ref = None;
        let mut run_status = JobStatus::Success;

        'layers: for layer in &layers {
            if ctx.cancellation.is_cancelled() {
                run_status = JobStatus::Cancelled;
                break;
            }

            let semaphore = Arc::new(Semaphore::new(ctx.resolved_worker_count().max(1)));
            let mut joinset: JoinSet<ExecutorResult<NodeOutcome>> = JoinSet::new();

            for node_id in layer {
                let Some(node) = plan.node(node_id) else { continue };
                let node = node.clone();
                let parents: Vec<NodeId> = dag.predecessors(node_id).to_vec();
                let ctx = ctx.clone();
                let node_outputs = node_outputs.clone();
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");

                joinset.spawn(async move {
                    let _permit = permit;
                    run_node(&node, &parents, &ctx, &node_outputs).await
                });
            }

            while let Some(joined) = joinset.join_next().await {
                let node_outcome = match joined {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(err)) => {
                        run_status = JobStatus::Failed;
                        failed_step_ref = failed_node_id(&err);
                        tracing::error!(error = %err, "node failed");
                        break 'layers;
                    }
                    Err(join_err) => {
                        run_status = JobStatus::Failed;
                        tracing::error!(error = %join_err, "node task panicked");
                        break 'layers;
                    }
                };

                totals.0 += node_outcome.step_run.records_in;
                totals.1 += node_outcome.step_run.records_out;
                totals.2 += node_outcome.step_run.records_error;
                totals.3 += node_outcome.step_run.bytes_processed;
                if let Some(watermark) = node_outcome.watermark {
                    candidate_watermarks.push(watermark);
                }
                node_outputs.lock().expect("node_outputs lock poisoned").insert(node_outcome.step_run.node_id.clone(), node_outcome.output);
                step_runs.push(node_outcome.step_run);
            }
        }

        Ok(PipelineRunOutcome {
            status: run_status,
            step_runs,
            candidate_watermarks,
            failed_step_ref,
            records_in: totals.0,
            records_out: totals.1,
            records_failed: totals.2,
            bytes_processed: totals.3,
            duration_ms: started_at.elapsed().as_millis() as u64,
        })
    }
}

/// Resolves a connector handle through the run's [`EnginePool`](synqx_connectors::EnginePool)
/// rather than asking the registry fresh every call, so repeated
/// reads/writes against the same connection config within one run share
/// one handle instance.
fn resolve_handle(
    ctx: &RunContext,
    kind: &str,
    config: &serde_json::Value,
    node_id: &NodeId,
) -> ExecutorResult<Arc<synqx_connectors::ConnectorHandle>> {
    let handle = ctx
        .connector_registry
        .get(kind)
        .map_err(|e| ExecutorError::Connector { node_id: node_id.clone(), source: e })?;
    Ok(ctx.engine_pool.get_or_insert_with(kind, config, &serde_json::Value::Null, || Arc::new(handle)))
}

fn failed_node_id(err: &ExecutorError) -> Option<NodeId> {
    match err {
        ExecutorError::GuardrailBreach { node_id, .. }
        | ExecutorError::RetriesExhausted { node_id, .. }
        | ExecutorError::NodeTimeout { node_id, .. }
        | ExecutorError::Operator { node_id, .. }
        | ExecutorError::Connector { node_id, .. }
        | ExecutorError::UnknownOperatorClass { node_id, .. }
        | ExecutorError::MissingConnection { node_id } => Some(node_id.clone()),
        _ => None,
    }
}

async fn run_node(
    node: &Node,
    parents: &[NodeId],
    ctx: &RunContext,
    node_outputs: &Arc<Mutex<HashMap<NodeId, Vec<Chunk>>>>,
) -> ExecutorResult<NodeOutcome> {
    if node.config.get("_collapsed_into").is_some() {
        return Ok(NodeOutcome {
            step_run: success_step_run(node.node_id.clone()),
            output: Vec::new(),
            watermark: None,
        });
    }

    let timeout = node.timeout_seconds.map(std::time::Duration::from_secs);
    let attempt = {
        let node = node.clone();
        let parents = parents.to_vec();
        let ctx = ctx.clone();
        let node_outputs = node_outputs.clone();
        move || {
            let node = node.clone();
            let parents = parents.clone();
            let ctx = ctx.clone();
            let node_outputs = node_outputs.clone();
            async move { execute_once(&node, &parents, &ctx, &node_outputs).await }
        }
    };

    let result = match timeout {
        Some(duration) => tokio::time::timeout(duration, with_retries(&node.retry_policy, node.node_id.as_str(), attempt))
            .await
            .map_err(|_| ExecutorError::NodeTimeout { node_id: node.node_id.clone(), timeout_seconds: node.timeout_seconds.unwrap() })?,
        None => with_retries(&node.retry_policy, node.node_id.as_str(), attempt).await,
    };

    result.map_err(|err| {
        if node.retry_policy.max_retries > 0 {
            ExecutorError::RetriesExhausted {
                node_id: node.node_id.clone(),
                attempts: node.retry_policy.max_retries + 1,
                source: Box::new(err),
            }
        } else {
            err
        }
    })
}

async fn execute_once(
    node: &Node,
    parents: &[NodeId],
    ctx: &RunContext,
    node_outputs: &Arc<Mutex<HashMap<NodeId, Vec<Chunk>>>>,
) -> ExecutorResult<NodeOutcome> {
    let mut guardrail_trackers: Vec<GuardrailTracker> =
        node.guardrails.iter().cloned().map(GuardrailTracker::new).collect();

    let rows_in = input_row_count(node, parents, node_outputs);
    let output_stream: ChunkStream = match node.operator_type {
        OperatorType::Extract => extract_stream(node, ctx).await?,
        OperatorType::Transform | OperatorType::System => transform_stream(node, parents, ctx, node_outputs)?,
        OperatorType::Load => load_stream(node, parents, ctx, node_outputs).await?,
    };

    let mut output = Vec::new();
    let mut watermark_tracker: Option<WatermarkValue> = None;
    let watermark_column = node.config.get("watermark_column").and_then(|v| v.as_str()).map(str::to_string);

    let mut stream = output_stream;
    let mut rows_out = 0u64;
    let mut bytes_processed = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ExecutorError::Operator { node_id: node.node_id.clone(), source: e })?;
        rows_out += chunk.num_rows() as u64;
        bytes_processed += chunk.byte_size() as u64;

        for tracker in guardrail_trackers.iter_mut() {
            tracker.observe(&node.node_id, chunk.num_rows() as u64, chunk.byte_size() as u64)?;
        }

        if let Some(column) = &watermark_column {
            update_watermark(&mut watermark_tracker, &chunk, column);
        }

        (ctx.on_chunk)(ChunkEvent::output(node.node_id.to_string(), chunk.num_rows(), chunk.byte_size()));
        output.push(chunk);
    }

    let watermark = watermark_tracker.and_then(|value| {
        node.source_asset_ref.clone().map(|asset_id| Watermark {
            pipeline_version_id: ctx.pipeline_version_id.clone(),
            node_id: node.node_id.clone(),
            asset_id,
            value,
            updated_at: Utc::now(),
        })
    });

    let mut step_run = success_step_run(node.node_id.clone());
    // Extract nodes have no upstream chunk to count against; what they read
    // from the source *is* the input, so in == out there.
    step_run.records_in = if node.operator_type == OperatorType::Extract { rows_out } else { rows_in };
    step_run.records_out = rows_out;
    step_run.records_filtered = step_run.records_in.saturating_sub(step_run.records_out);
    step_run.bytes_processed = bytes_processed;

    Ok(NodeOutcome { step_run, output, watermark })
}

fn input_row_count(node: &Node, parents: &[NodeId], node_outputs: &Arc<Mutex<HashMap<NodeId, Vec<Chunk>>>>) -> u64 {
    if parents.is_empty() {
        return 0;
    }
    let outputs = node_outputs.lock().expect("node_outputs lock poisoned");
    parents
        .iter()
        .flat_map(|p| outputs.get(p).into_iter().flatten())
        .map(|c| c.num_rows() as u64)
        .sum()
}

fn success_step_run(node_id: NodeId) -> StepRun {
    StepRun {
        id: synqx_ids::StepRunId::new(),
        pipeline_run_id: synqx_ids::PipelineRunId::new(),
        node_id,
        state: StepState::Success,
        records_in: 0,
        records_out: 0,
        records_filtered: 0,
        records_error: 0,
        bytes_processed: 0,
        cpu_samples: Vec::new(),
        mem_samples: Vec::new(),
        sample_data: None,
        error_message: None,
        error_type: None,
        lineage_map: None,
    }
}

fn update_watermark(tracker: &mut Option<WatermarkValue>, chunk: &Chunk, column: &str) {
    for row in chunk_to_rows(chunk) {
        let Some(value) = row.get(column) else { continue };
        let candidate = match value {
            serde_json::Value::Number(n) if n.is_i64() => Some(WatermarkValue::Integer(n.as_i64().unwrap())),
            serde_json::Value::String(s) => Some(WatermarkValue::Text(s.clone())),
            _ => None,
        };
        if let Some(candidate) = candidate {
            if candidate.is_advance_over(tracker.as_ref()) {
                *tracker = Some(candidate);
            }
        }
    }
}

async fn extract_stream(node: &Node, ctx: &RunContext) -> ExecutorResult<ChunkStream> {
    let connection_id = node.connection_ref.clone().ok_or_else(|| ExecutorError::MissingConnection { node_id: node.node_id.clone() })?;
    let connection = ctx.connections.get(&connection_id).ok_or_else(|| ExecutorError::MissingConnection { node_id: node.node_id.clone() })?;
    let handle = resolve_handle(ctx, &connection.connector_kind, &connection.config, &node.node_id)?;
    let reader = handle.as_batch_reader().map_err(|e| ExecutorError::Connector { node_id: node.node_id.clone(), source: e })?;

    let asset_name = node
        .source_asset_ref
        .as_ref()
        .and_then(|id| ctx.assets.get(id))
        .map(|a| a.fqn.clone())
        .unwrap_or_default();
    let batch_size = node.config.get("batch_size").and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(ctx.default_batch_size);
    let incremental_filter = node.config.get("incremental_filter").cloned();

    let mut all_rows = Vec::new();
    loop {
        let page = reader
            .read_batch(&connection.config, &asset_name, batch_size, incremental_filter.as_ref())
            .await
            .map_err(|e| ExecutorError::Connector { node_id: node.node_id.clone(), source: e })?;
        let page_len = page.len();
        all_rows.extend(page);
        if page_len < batch_size {
            break;
        }
    }

    let chunk = rows_to_chunk(&all_rows).map_err(|e| ExecutorError::Operator { node_id: node.node_id.clone(), source: e })?;
    Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
}

fn transform_stream(
    node: &Node,
    parents: &[NodeId],
    ctx: &RunContext,
    node_outputs: &Arc<Mutex<HashMap<NodeId, Vec<Chunk>>>>,
) -> ExecutorResult<ChunkStream> {
    let operator = ctx
        .operator_registry
        .get(&node.operator_class)
        .ok_or_else(|| ExecutorError::UnknownOperatorClass { node_id: node.node_id.clone(), operator_class: node.operator_class.clone() })?;

    let outputs = node_outputs.lock().expect("node_outputs lock poisoned");

    if parents.len() <= 1 {
        let chunks = parents.first().and_then(|p| outputs.get(p)).cloned().unwrap_or_default();
        let input_stream: ChunkStream = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
        operator.transform(input_stream, &node.config).map_err(|e| ExecutorError::Operator { node_id: node.node_id.clone(), source: e })
    } else {
        let mut inputs = HashMap::new();
        for parent in parents {
            let chunks = outputs.get(parent).cloned().unwrap_or_default();
            inputs.insert(parent.to_string(), Box::pin(stream::iter(chunks.into_iter().map(Ok))) as ChunkStream);
        }
        operator.transform_multi(inputs, &node.config).map_err(|e| ExecutorError::Operator { node_id: node.node_id.clone(), source: e })
    }
}

async fn load_stream(
    node: &Node,
    parents: &[NodeId],
    ctx: &RunContext,
    node_outputs: &Arc<Mutex<HashMap<NodeId, Vec<Chunk>>>>,
) -> ExecutorResult<ChunkStream> {
    let connection_id = node.connection_ref.clone().ok_or_else(|| ExecutorError::MissingConnection { node_id: node.node_id.clone() })?;
    let connection = ctx.connections.get(&connection_id).ok_or_else(|| ExecutorError::MissingConnection { node_id: node.node_id.clone() })?;
    let handle = resolve_handle(ctx, &connection.connector_kind, &connection.config, &node.node_id)?;

    let chunks = {
        let outputs = node_outputs.lock().expect("node_outputs lock poisoned");
        parents.first().and_then(|p| outputs.get(p)).cloned().unwrap_or_default()
    };

    let target_table = node.destination_asset_ref.as_ref().and_then(|id| ctx.assets.get(id)).map(|a| a.fqn.clone()).unwrap_or_default();
    let write_mode = node.write_strategy;
    let use_staging = connection.staging_connection_ref.is_some()
        && handle.as_staged_writer().map(|w| w.supports_staging()).unwrap_or(false);

    for chunk in &chunks {
        let rows = chunk_to_rows(chunk);
        if use_staging {
            let writer = handle.as_staged_writer().map_err(|e| ExecutorError::Connector { node_id: node.node_id.clone(), source: e })?;
            writer
                .write_staged(&connection.config, &target_table, write_mode, rows)
                .await
                .map_err(|e| ExecutorError::Connector { node_id: node.node_id.clone(), source: e })?;
        } else {
            let writer = handle.as_batch_writer().map_err(|e| ExecutorError::Connector { node_id: node.node_id.clone(), source: e })?;
            writer
                .write_batch(&connection.config, &target_table, write_mode, rows)
                .await
                .map_err(|e| ExecutorError::Connector { node_id: node.node_id.clone(), source: e })?;
        }
    }

    Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
}
