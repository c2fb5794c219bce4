//! Per-run context: options, history, merge-synchronization state, and the
//! handle passed into a running node body (spec.md §3 "Execution context").

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ExecError;
use crate::event::EventBus;

/// Run-level options, with the defaults named in spec.md §3/§6.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Wall-clock budget for the whole `run()`, in milliseconds.
    pub timeout_ms: u64,
    /// Total scheduled-node-execution attempts allowed in this run.
    pub max_node_visits: u64,
    /// When true, the `RunResult` returned by `Runnable::run` omits node
    /// history records (internal tracking still happens — output resolution
    /// depends on it — and events still fire).
    pub disable_history: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 600_000,
            max_node_visits: 100,
            disable_history: false,
        }
    }
}

impl RunOptions {
    /// Applies `overrides` on top of `self`, per-field: `Some` wins, `None` keeps
    /// the current value. Mirrors `langgraph-cli`'s flag-over-default composition.
    pub fn merged(&self, overrides: RunOptionsOverrides) -> RunOptions {
        RunOptions {
            timeout_ms: overrides.timeout_ms.unwrap_or(self.timeout_ms),
            max_node_visits: overrides.max_node_visits.unwrap_or(self.max_node_visits),
            disable_history: overrides.disable_history.unwrap_or(self.disable_history),
        }
    }
}

/// Sparse override set for [`RunOptions`], e.g. built from CLI flags.
#[derive(Clone, Debug, Default)]
pub struct RunOptionsOverrides {
    pub timeout_ms: Option<u64>,
    pub max_node_visits: Option<u64>,
    pub disable_history: Option<bool>,
}

/// One node's input/output/outcome, recorded in execution order
/// (spec.md §3 "Node history record").
#[derive(Clone, Debug)]
pub struct NodeHistory {
    pub node_execution_id: String,
    pub thread_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub is_ok: bool,
    pub error: Option<ExecError>,
}

/// One branch slot of a merge node's synchronization state
/// (spec.md §3 "merge_state").
#[derive(Clone, Debug)]
pub struct MergeSlot {
    pub source: String,
    pub output: Option<Value>,
    pub pending: bool,
}

/// Read-only snapshot of a node's declared metadata, handed to the running body.
pub type MetadataSnapshot = Arc<Map<String, Value>>;

/// Context handed to a node body (spec.md §4.4 step 3): lets the body stream
/// intermediate chunks and read its own metadata.
#[derive(Clone)]
pub struct NodeContext {
    pub(crate) execution_id: String,
    pub(crate) thread_id: String,
    pub(crate) node_execution_id: String,
    pub(crate) name: String,
    pub(crate) metadata: MetadataSnapshot,
    pub(crate) bus: EventBus,
}

impl NodeContext {
    /// Emits a `NODE_STREAM` event carrying `chunk`. Fire-and-forget: the bus
    /// never fails publish, so this never blocks on a slow subscriber.
    pub async fn stream(&self, chunk: Value) {
        crate::event::publish_node_stream(
            &self.bus,
            &self.execution_id,
            &self.thread_id,
            &self.node_execution_id,
            &self.name,
            chunk,
        )
        .await;
    }

    /// The node's declared metadata (read-only).
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn node_name(&self) -> &str {
        &self.name
    }
}

/// All state that lives for exactly one `run()` call (spec.md §3 "Execution
/// context", minus the thread pool which is owned by the scheduler directly).
///
/// Concurrent `run()` calls each get their own `ExecutionState` — only the
/// event bus and middleware chain are shared across runs (spec.md §9 open
/// question, resolved in DESIGN.md).
pub struct ExecutionState {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub options: RunOptions,
    visits_remaining: AtomicI64,
    pub history: Mutex<Vec<NodeHistory>>,
    pub merge_state: Mutex<std::collections::HashMap<String, Vec<MergeSlot>>>,
}

impl ExecutionState {
    pub fn new(execution_id: String, options: RunOptions) -> Self {
        Self {
            execution_id,
            started_at: Utc::now(),
            visits_remaining: AtomicI64::new(options.max_node_visits as i64),
            options,
            history: Mutex::new(Vec::new()),
            merge_state: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Decrements `visits_remaining` and returns the value *after* decrement,
    /// atomically (spec.md §5: "decrement-and-check must be atomic").
    pub fn decrement_visits(&self) -> i64 {
        self.visits_remaining.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn visits_remaining(&self) -> i64 {
        self.visits_remaining.load(Ordering::SeqCst)
    }

    /// Records one node execution's history entry. Always appended here,
    /// regardless of `disable_history` — `resolved_output` derives
    /// `result.output` from this same ordered vec (spec.md §8 testable
    /// property 4), so a second independently-locked "last output" cell
    /// updated outside this lock could observe a different real-time order
    /// than the history append itself under true cross-thread_id
    /// parallelism (spec.md §5). `disable_history` instead governs what
    /// `Runnable::run` copies into the `RunResult` it returns.
    pub fn append_history(&self, record: NodeHistory) {
        self.history.lock().unwrap().push(record);
    }

    /// Derives `result.output` from the ordered history itself: the most
    /// recent entry named `end` if `end` is configured and reachable,
    /// otherwise the terminal entry (spec.md §4.5 "Result assembly").
    pub fn resolved_output(&self, end: Option<&str>) -> Option<Value> {
        let history = self.history.lock().unwrap();
        if let Some(end_name) = end {
            if let Some(record) = history.iter().rev().find(|h| h.name == end_name) {
                return record.output.clone();
            }
        }
        history.last().and_then(|h| h.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_options_defaults_match_spec() {
        let o = RunOptions::default();
        assert_eq!(o.timeout_ms, 600_000);
        assert_eq!(o.max_node_visits, 100);
        assert!(!o.disable_history);
    }

    #[test]
    fn run_options_merge_overrides_only_set_fields() {
        let base = RunOptions::default();
        let merged = base.merged(RunOptionsOverrides {
            timeout_ms: Some(50),
            max_node_visits: None,
            disable_history: None,
        });
        assert_eq!(merged.timeout_ms, 50);
        assert_eq!(merged.max_node_visits, 100);
    }

    #[test]
    fn decrement_visits_is_exact_and_can_go_negative() {
        let state = ExecutionState::new(
            "e1".into(),
            RunOptions {
                max_node_visits: 1,
                ..Default::default()
            },
        );
        assert_eq!(state.decrement_visits(), 0);
        assert_eq!(state.decrement_visits(), -1);
    }

    #[test]
    fn append_history_always_records_regardless_of_disable_history() {
        // `disable_history` governs what `Runnable::run` copies into the
        // returned `RunResult`, not this internal vec — `resolved_output`
        // depends on it even when history is "disabled" (see
        // `ExecutionState::append_history`'s doc comment).
        let state = ExecutionState::new(
            "e1".into(),
            RunOptions {
                disable_history: true,
                ..Default::default()
            },
        );
        state.append_history(NodeHistory {
            node_execution_id: "x".into(),
            thread_id: "t".into(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            name: "a".into(),
            input: Value::Null,
            output: Some(Value::from(7)),
            is_ok: true,
            error: None,
        });
        assert_eq!(state.history.lock().unwrap().len(), 1);
        assert_eq!(state.resolved_output(None), Some(Value::from(7)));
    }

    #[test]
    fn resolved_output_prefers_most_recent_end_match() {
        let state = ExecutionState::new("e1".into(), RunOptions::default());
        for (name, value) in [("a", 1), ("end", 2), ("b", 3)] {
            state.append_history(NodeHistory {
                node_execution_id: name.into(),
                thread_id: "t".into(),
                started_at: Utc::now(),
                ended_at: Utc::now(),
                name: name.into(),
                input: Value::Null,
                output: Some(Value::from(value)),
                is_ok: true,
                error: None,
            });
        }
        assert_eq!(state.resolved_output(Some("end")), Some(Value::from(2)));
        assert_eq!(state.resolved_output(None), Some(Value::from(3)));
    }
}
