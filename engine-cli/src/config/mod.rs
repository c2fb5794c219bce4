//! Configuration types for the demo binary.
//!
//! Re-exports [`CliRunOptions`].

mod run_options;

pub use run_options::CliRunOptions;
