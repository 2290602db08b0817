//! RocksDB-backed persistence for the terrace state engine.

pub mod store;

pub use store::RocksContentStore;
