//! CLI-side overrides for a run, applied over [`workflow_engine::RunOptions`]'s
//! defaults.
//!
//! Mirrors the flag-over-default composition the teacher CLI used for its own
//! `RunOptions`: every field is optional here, and [`CliRunOptions::into_overrides`]
//! turns a parsed set of flags into the engine's sparse
//! [`workflow_engine::RunOptionsOverrides`].

use workflow_engine::RunOptionsOverrides;

/// Optional overrides for a run, built from CLI flags.
#[derive(Clone, Debug, Default)]
pub struct CliRunOptions {
    /// Override the run's wall-clock budget, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Override the total scheduled-node-execution attempts allowed.
    pub max_node_visits: Option<u64>,
    /// Disable node history recording (events still fire).
    pub disable_history: bool,
}

impl CliRunOptions {
    pub fn into_overrides(self) -> RunOptionsOverrides {
        RunOptionsOverrides {
            timeout_ms: self.timeout_ms,
            max_node_visits: self.max_node_visits,
            disable_history: if self.disable_history { Some(true) } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_leave_engine_defaults_untouched() {
        let overrides = CliRunOptions::default().into_overrides();
        assert!(overrides.timeout_ms.is_none());
        assert!(overrides.max_node_visits.is_none());
        assert!(overrides.disable_history.is_none());
    }

    #[test]
    fn set_fields_become_overrides() {
        let overrides = CliRunOptions {
            timeout_ms: Some(1_000),
            max_node_visits: Some(10),
            disable_history: true,
        }
        .into_overrides();
        assert_eq!(overrides.timeout_ms, Some(1_000));
        assert_eq!(overrides.max_node_visits, Some(10));
        assert_eq!(overrides.disable_history, Some(true));
    }
}
