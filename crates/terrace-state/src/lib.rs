//! # terrace-state
//! The Terrace world-state engine: per-path change log with rollback,
//! sealed per-block state sets, fork-aware historical resolution, and the
//! canonical height cache.

pub mod canonical_cache;
pub mod chain;
pub mod change_log;
mod codec;
pub mod config;
pub mod engine;
pub mod memory;
pub mod resolver;
pub mod world_state;
