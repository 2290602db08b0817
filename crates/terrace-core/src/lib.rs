//! # terrace-core
//! Foundation types and traits for the Terrace world-state engine.

pub mod constants;
pub mod error;
pub mod pointer;
pub mod traits;
pub mod types;
