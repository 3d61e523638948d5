//! Shared domain types for flowgate.
//!
//! This crate contains the data shapes exchanged between the workflow
//! compiler, the execution engine, and their callers: normalized definitions,
//! compile results, step results, run envelopes, events, and configuration.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod event;
pub mod workflow;
