//! VALUEBETS: sports odds value-bet evaluation engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod provider;
pub mod strategy;
pub mod engine;
pub mod storage;
pub mod sink;
pub mod dashboard;
