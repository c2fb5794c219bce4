//! Internal diagnostic logging for the scheduler.
//!
//! Operator-facing (tracing spans/events), distinct from the consumer-facing
//! [`crate::event::EventBus`]. Falls back to `eprintln!` when the `tracing`
//! feature is disabled — same pattern the teacher crate used for its own
//! node lifecycle logging.

/// Logs a node scheduling attempt.
pub fn log_node_start(node_id: &str, thread_id: &str) {
    #[cfg(feature = "tracing")]
    tracing::debug!(node_id, thread_id, "scheduling node");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[DEBUG] scheduling node={node_id} thread={thread_id}");
}

/// Logs a node execution completion.
pub fn log_node_complete(node_id: &str, is_ok: bool) {
    #[cfg(feature = "tracing")]
    tracing::debug!(node_id, is_ok, "node execution complete");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[DEBUG] node execution complete: {node_id} ok={is_ok}");
}

/// Logs the start of a `run()`.
pub fn log_run_start(execution_id: &str) {
    #[cfg(feature = "tracing")]
    tracing::info!(execution_id, "run start");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[INFO] run start: {execution_id}");
}

/// Logs the end of a `run()`.
pub fn log_run_end(execution_id: &str, is_ok: bool) {
    #[cfg(feature = "tracing")]
    tracing::info!(execution_id, is_ok, "run end");

    #[cfg(not(feature = "tracing"))]
    eprintln!("[INFO] run end: {execution_id} ok={is_ok}");
}

/// Logs a run-level error.
pub fn log_run_error(execution_id: &str, error: &crate::error::ExecError) {
    #[cfg(feature = "tracing")]
    tracing::error!(execution_id, code = error.code(), "run error");

    #[cfg(not(feature = "tracing"))]
    eprintln!(
        "[ERROR] run error: {execution_id} code={} {error}",
        error.code()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_helpers_do_not_panic() {
        log_node_start("n", "t1");
        log_node_complete("n", true);
        log_run_start("exec-1");
        log_run_end("exec-1", true);
        log_run_error("exec-1", &crate::error::ExecError::ExecutionTimeout);
    }
}
