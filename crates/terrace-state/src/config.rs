//! Engine configuration.
//!
//! Provides [`StateConfig`] with defaults from
//! [`terrace_core::constants`]. Configuration is programmatic; the engine
//! is an embedded library and carries no file loading.

use terrace_core::constants::{DEFAULT_MAX_HISTORY_WALK, REFERENCE_BLOCK_VALID_PERIOD};

/// How much per-path pointer history the change log keeps within the
/// active block-building window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRetention {
    /// Keep the window's pointer history so a candidate block can be
    /// rolled back. History is still cleared at every window boundary;
    /// rollback is one block deep by design.
    RollbackWindow,
    /// Drop history on every write. Rollback becomes unavailable, space
    /// stays bounded to one pointer per path.
    DiscardImmediately,
}

/// Configuration for a state engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateConfig {
    /// Number of recent heights the canonical height cache retains.
    pub retention_window: u64,
    /// Hard bound on the resolver's backward walk through state sets.
    pub max_history_walk: u64,
    /// Change-history retention policy.
    pub history: HistoryRetention,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            retention_window: REFERENCE_BLOCK_VALID_PERIOD,
            max_history_walk: DEFAULT_MAX_HISTORY_WALK,
            history: HistoryRetention::RollbackWindow,
        }
    }
}

impl StateConfig {
    /// Override the canonical-cache retention window.
    pub fn with_retention_window(mut self, window: u64) -> Self {
        self.retention_window = window;
        self
    }

    /// Override the resolver's walk bound.
    pub fn with_max_history_walk(mut self, walk: u64) -> Self {
        self.max_history_walk = walk;
        self
    }

    /// Override the change-history retention policy.
    pub fn with_history(mut self, history: HistoryRetention) -> Self {
        self.history = history;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = StateConfig::default();
        assert_eq!(cfg.retention_window, REFERENCE_BLOCK_VALID_PERIOD);
        assert_eq!(cfg.max_history_walk, DEFAULT_MAX_HISTORY_WALK);
        assert_eq!(cfg.history, HistoryRetention::RollbackWindow);
    }

    #[test]
    fn builder_overrides() {
        let cfg = StateConfig::default()
            .with_retention_window(8)
            .with_max_history_walk(16)
            .with_history(HistoryRetention::DiscardImmediately);
        assert_eq!(cfg.retention_window, 8);
        assert_eq!(cfg.max_history_walk, 16);
        assert_eq!(cfg.history, HistoryRetention::DiscardImmediately);
    }

    #[test]
    fn config_is_copy_and_debug() {
        let cfg = StateConfig::default();
        let copy = cfg;
        assert!(format!("{copy:?}").contains("StateConfig"));
        assert_eq!(cfg, copy);
    }
}
