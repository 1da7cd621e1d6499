//! MAVERICK: Autonomous AI Paper-Trading Fund
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod market;
pub mod screener;
pub mod llm;
pub mod store;
pub mod engine;
pub mod api;
