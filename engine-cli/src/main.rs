//! Workflow engine demo binary: compiles a small diamond-shaped graph,
//! wires a logging middleware and an stdout event subscriber, runs it with
//! CLI-overridden run options, and prints the result.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{Map, Value};
use workflow_engine::{Event, EventHandler, NodeBody, Registry};

use workflow_engine_cli::{CliRunOptions, LoggingMiddleware};

#[derive(Parser, Debug)]
#[command(name = "workflow-engine")]
#[command(about = "Run a small diamond-shaped example graph through the workflow engine")]
struct Args {
    /// Integer input fed to the start node
    #[arg(short, long, default_value_t = 5)]
    input: i64,

    /// Wall-clock budget for the run, in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Total scheduled-node-execution attempts allowed
    #[arg(long, value_name = "N")]
    max_node_visits: Option<u64>,

    /// Skip recording node history (events still fire)
    #[arg(long)]
    disable_history: bool,
}

struct StdoutSubscriber;

#[async_trait]
impl EventHandler for StdoutSubscriber {
    async fn handle(&self, event: Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        println!("[event] {}", describe(&event));
        Ok(())
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::WorkflowStart { execution_id, .. } => {
            format!("WORKFLOW_START execution_id={execution_id}")
        }
        Event::WorkflowEnd {
            execution_id,
            is_ok,
            output,
            ..
        } => format!("WORKFLOW_END execution_id={execution_id} is_ok={is_ok} output={output:?}"),
        Event::NodeStart {
            name, thread_id, ..
        } => format!("NODE_START name={name} thread_id={thread_id}"),
        Event::NodeEnd { name, is_ok, .. } => format!("NODE_END name={name} is_ok={is_ok}"),
        Event::NodeStream { name, chunk, .. } => format!("NODE_STREAM name={name} chunk={chunk}"),
    }
}

fn doubling() -> NodeBody {
    Arc::new(|input: Value, _ctx| {
        Box::pin(async move { Ok(Value::from(input.as_i64().unwrap_or(0) * 2)) })
    })
}

fn adding(amount: i64) -> NodeBody {
    Arc::new(move |input: Value, _ctx| {
        Box::pin(async move { Ok(Value::from(input.as_i64().unwrap_or(0) + amount)) })
    })
}

fn merge_sum() -> NodeBody {
    Arc::new(|input: Value, _ctx| {
        Box::pin(async move {
            let a = input.get("double").and_then(Value::as_i64).unwrap_or(0);
            let b = input.get("add_five").and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::from(a + b))
        })
    })
}

/// Installs a stdout `tracing` subscriber so `engine/src/graph/logging.rs`'s
/// `tracing::debug!/info!/error!` calls actually reach a sink, instead of
/// being no-ops with nothing registered. Filter defaults to `info`,
/// overridable via `RUST_LOG` — same env-filter pattern as the teacher's own
/// `langgraph-server::init_tracing`, minus its dual stdout/file layering
/// (not needed for a single-process demo binary).
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut registry = Registry::new();
    registry.add_node("start", adding(0), Map::new())?;
    registry.add_node("double", doubling(), Map::new())?;
    registry.add_node("add_five", adding(5), Map::new())?;
    registry.add_merge_node(
        "combine",
        vec!["double".into(), "add_five".into()],
        merge_sum(),
        Map::new(),
    )?;
    registry.edge("start", vec!["double".into(), "add_five".into()])?;

    let runnable = registry.compile("start", None)?;
    runnable.use_mw(Arc::new(LoggingMiddleware));
    runnable.subscribe(Arc::new(StdoutSubscriber));

    let overrides = CliRunOptions {
        timeout_ms: args.timeout_ms,
        max_node_visits: args.max_node_visits,
        disable_history: args.disable_history,
    }
    .into_overrides();

    let result = runnable.run(Value::from(args.input), overrides).await;

    println!("---");
    println!("is_ok={}", result.is_ok);
    if let Some(output) = &result.output {
        println!("output={output}");
    }
    if let Some(error) = &result.error {
        eprintln!("error: {} ({})", error, error.code());
        std::process::exit(1);
    }

    Ok(())
}
