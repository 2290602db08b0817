//! Error types for the Terrace state engine.
use thiserror::Error;

/// Block-linkage and chain-registry violations. Always rejected, never
/// auto-corrected: silently accepting would corrupt the height index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain not found: {0}")] ChainNotFound(String),
    #[error("wrong chain: expected {expected}, got {got}")] WrongChain { expected: String, got: String },
    #[error("invalid block index: expected {expected}, got {got}")] InvalidBlockIndex { expected: u64, got: u64 },
    #[error("disconnected block: expected previous hash {expected}, got {got}")] Disconnected { expected: String, got: String },
}

/// Versioned-state query failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("history unavailable for height {requested}: older than retained deltas")] HistoryUnavailable { requested: u64 },
    #[error("pointer not found in store: {0}")] PointerNotFound(String),
}

#[derive(Error, Debug)]
pub enum TerraceError {
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] State(#[from] StateError),
    #[error("storage: {0}")] Storage(String),
    #[error("serialization: {0}")] Serialization(String),
}
