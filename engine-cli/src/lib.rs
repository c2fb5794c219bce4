//! # workflow-engine-cli
//!
//! Demo harness for the `workflow-engine` library: a small example graph, a
//! human-readable logging middleware, and CLI-flag-over-default run option
//! composition.
//!
//! ## Main modules
//!
//! - **Config**: [`CliRunOptions`] — build run option overrides from parsed
//!   CLI flags.
//! - **Logging**: [`LoggingMiddleware`] — prints node enter/exit to stderr.
//!
//! The binary (`workflow-engine`) wires these together with an stdout event
//! subscriber around a small diamond-shaped graph; see `src/main.rs`.

mod config;
mod logging_middleware;

pub use config::CliRunOptions;
pub use logging_middleware::LoggingMiddleware;
