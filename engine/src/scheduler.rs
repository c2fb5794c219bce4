//! Top-level orchestrator (spec.md §4.5): seeds execution, dispatches
//! successors, synchronizes merges, enforces resource limits, and assembles
//! the final result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::context::{
    ExecutionState, MergeSlot, NodeHistory, RunOptions, RunOptionsOverrides,
};
use crate::error::ExecError;
use crate::event::{Event, EventBus, EventHandler, SubscriptionId};
use crate::graph::{execute_node, NodeOutcome, NodeStructure, Plan};
use crate::middleware::{run_chain, Middleware};
use crate::thread_pool::{Task, ThreadPool};

/// Outcome of one `Runnable::run` call (spec.md §4.5 "Result assembly").
#[derive(Clone, Debug)]
pub struct RunResult {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub histories: Vec<NodeHistory>,
    pub is_ok: bool,
    pub error: Option<ExecError>,
    pub output: Option<Value>,
}

/// A compiled, runnable graph. Cheaply `Clone`-able — all state needed across
/// clones (plan, event bus, middleware list, exit flag) is `Arc`-shared.
/// Each `run()` call gets its own [`ExecutionState`] and [`ThreadPool`]
/// (spec.md §9 open question, resolved: only the bus and middleware list are
/// shared across concurrent runs).
#[derive(Clone)]
pub struct Runnable {
    plan: Arc<Plan>,
    bus: EventBus,
    middlewares: Arc<Mutex<Vec<Arc<dyn Middleware>>>>,
    exit_reason: Arc<Mutex<Option<String>>>,
    default_options: RunOptions,
    running_count: Arc<AtomicUsize>,
}

/// Immutable context threaded through one run's recursive dispatch.
struct RunContext {
    plan: Arc<Plan>,
    bus: EventBus,
    state: Arc<ExecutionState>,
    thread_pool: ThreadPool,
    exit_reason: Arc<Mutex<Option<String>>>,
    middlewares: Arc<Mutex<Vec<Arc<dyn Middleware>>>>,
    execution_id: String,
}

impl Runnable {
    pub(crate) fn new(plan: Plan) -> Self {
        Self {
            plan: Arc::new(plan),
            bus: EventBus::new(),
            middlewares: Arc::new(Mutex::new(Vec::new())),
            exit_reason: Arc::new(Mutex::new(None)),
            default_options: RunOptions::default(),
            running_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Installs a middleware, run in registration order ahead of every node
    /// (spec.md §4.3).
    pub fn use_mw(&self, middleware: Arc<dyn Middleware>) {
        self.middlewares.lock().unwrap().push(middleware);
    }

    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.bus.unsubscribe(id)
    }

    /// Requests cooperative termination. Observed at the next scheduled
    /// node's middleware pass, in this run or any still in flight
    /// (spec.md §4.5 "Cancellation").
    pub fn exit(&self, reason: impl Into<String>) {
        *self.exit_reason.lock().unwrap() = Some(reason.into());
    }

    pub fn get_structure(&self) -> Vec<NodeStructure> {
        self.plan.get_structure()
    }

    /// `true` while at least one `run()` call on this runnable has not yet
    /// returned.
    pub fn is_running(&self) -> bool {
        self.running_count.load(Ordering::SeqCst) > 0
    }

    /// Runs the graph once from its configured start node.
    pub async fn run(&self, input: Value, overrides: RunOptionsOverrides) -> RunResult {
        let execution_id = Uuid::new_v4().to_string();
        *self.exit_reason.lock().unwrap() = None;
        let options = self.default_options.merged(overrides);
        let state = Arc::new(ExecutionState::new(execution_id.clone(), options.clone()));
        seed_merge_state(&self.plan, &state);

        let thread_pool = ThreadPool::new();
        self.running_count.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        crate::graph::logging::log_run_start(&execution_id);
        self.bus
            .publish(Event::WorkflowStart {
                execution_id: execution_id.clone(),
                started_at,
                input: input.clone(),
            })
            .await;

        let ctx = Arc::new(RunContext {
            plan: self.plan.clone(),
            bus: self.bus.clone(),
            state: state.clone(),
            thread_pool: thread_pool.clone(),
            exit_reason: self.exit_reason.clone(),
            middlewares: self.middlewares.clone(),
            execution_id: execution_id.clone(),
        });

        let seed_thread_id = Uuid::new_v4().to_string();
        schedule_node(ctx, seed_thread_id, self.plan.start.clone(), input);

        let outcome = tokio::time::timeout(
            Duration::from_millis(options.timeout_ms),
            thread_pool.wait_for_completion(),
        )
        .await;

        self.running_count.fetch_sub(1, Ordering::SeqCst);
        let ended_at = Utc::now();
        // `ExecutionState::append_history` always records internally, even
        // when `disable_history` is set (see its doc comment) — that vec is
        // also what `resolved_output` derives `result.output` from, so the
        // two can never observe a different real-time order across
        // concurrently-completing thread_ids (spec.md §5). `disable_history`
        // only governs what gets copied into the returned `RunResult` here.
        let histories = if options.disable_history {
            Vec::new()
        } else {
            state.history.lock().unwrap().clone()
        };

        let (is_ok, error, output) = match outcome {
            Err(_) => (false, Some(ExecError::ExecutionTimeout), None),
            Ok(Err(e)) => (false, Some(e), None),
            Ok(Ok(())) => (true, None, state.resolved_output(self.plan.end.as_deref())),
        };

        match &error {
            Some(e) => crate::graph::logging::log_run_error(&execution_id, e),
            None => crate::graph::logging::log_run_end(&execution_id, is_ok),
        }

        self.bus
            .publish(Event::WorkflowEnd {
                execution_id: execution_id.clone(),
                started_at,
                ended_at,
                histories: histories.clone(),
                is_ok,
                error: error.clone(),
                output: output.clone(),
            })
            .await;

        RunResult {
            execution_id,
            started_at,
            ended_at,
            histories,
            is_ok,
            error,
            output,
        }
    }
}

fn seed_merge_state(plan: &Plan, state: &ExecutionState) {
    let mut merge_state = state.merge_state.lock().unwrap();
    for structure in plan.get_structure() {
        if structure.is_merge {
            let slots = structure
                .branch
                .iter()
                .map(|source| MergeSlot {
                    source: source.clone(),
                    output: None,
                    pending: true,
                })
                .collect();
            merge_state.insert(structure.name, slots);
        }
    }
}

/// Thread_id allocation for `k` successors: the first reuses the dispatching
/// chain's id (preserving linear-chain ordering); the rest are fresh
/// (spec.md §4.5 "Thread_id allocation").
fn allocate_thread_ids(current: &str, k: usize) -> Vec<String> {
    (0..k)
        .map(|i| {
            if i == 0 {
                current.to_string()
            } else {
                Uuid::new_v4().to_string()
            }
        })
        .collect()
}

fn schedule_node(ctx: Arc<RunContext>, thread_id: String, name: String, input: Value) {
    let task_ctx = ctx.clone();
    let task_thread_id = thread_id.clone();
    let task: Task = Box::pin(async move { run_scheduled(task_ctx, task_thread_id, name, input).await });
    ctx.thread_pool.schedule(thread_id, task);
}

async fn run_scheduled(
    ctx: Arc<RunContext>,
    thread_id: String,
    name: String,
    input: Value,
) -> Result<(), ExecError> {
    crate::graph::logging::log_node_start(&name, &thread_id);

    if let Some(reason) = ctx.exit_reason.lock().unwrap().clone() {
        return Err(ExecError::Exit(reason));
    }

    let middlewares = ctx.middlewares.lock().unwrap().clone();
    let (name, input) = run_chain(&middlewares, name, input).await?;

    if !ctx.plan.contains(&name) {
        return Err(ExecError::NodeExecutionFailed {
            node: name,
            message: "Node not found".to_string(),
            context: Default::default(),
        });
    }

    let remaining = ctx.state.decrement_visits();
    if remaining < 0 {
        return Err(ExecError::MaxNodeVisitsExceeded {
            node: name,
            max: ctx.state.options.max_node_visits,
        });
    }

    let outcome = execute_node(
        &ctx.plan,
        &ctx.bus,
        &ctx.state,
        &ctx.execution_id,
        &thread_id,
        &name,
        input,
    )
    .await?;

    crate::graph::logging::log_node_complete(&name, true);
    dispatch_successors(&ctx, &thread_id, &name, outcome);
    Ok(())
}

fn dispatch_successors(ctx: &Arc<RunContext>, current_thread_id: &str, current_name: &str, outcome: NodeOutcome) {
    let NodeOutcome { successors, output } = outcome;
    if successors.is_empty() {
        return;
    }
    let thread_ids = allocate_thread_ids(current_thread_id, successors.len());

    for (successor, tid) in successors.into_iter().zip(thread_ids.into_iter()) {
        let is_merge = ctx
            .plan
            .node(&successor)
            .map(|d| d.is_merge())
            .unwrap_or(false);

        if is_merge {
            // Slot update, completeness check, and compose-and-dispatch happen
            // inside one lock acquisition so concurrent deliveries into the
            // same merge node can't both observe "all slots filled"
            // (spec.md §5 "Shared resources and mutation").
            let dispatch_input = {
                let mut merge_state = ctx.state.merge_state.lock().unwrap();
                let slots = merge_state.entry(successor.clone()).or_default();
                if let Some(slot) = slots.iter_mut().find(|s| s.source == current_name) {
                    slot.output = Some(output.clone());
                    slot.pending = false;
                }
                if !slots.is_empty() && slots.iter().all(|s| !s.pending) {
                    let mut merged = Map::new();
                    for slot in slots.iter() {
                        merged.insert(slot.source.clone(), slot.output.clone().unwrap_or(Value::Null));
                    }
                    Some(Value::Object(merged))
                } else {
                    None
                }
            };
            if let Some(merge_input) = dispatch_input {
                schedule_node(ctx.clone(), tid, successor, merge_input);
            }
        } else {
            schedule_node(ctx.clone(), tid, successor, output.clone());
        }
    }
}
