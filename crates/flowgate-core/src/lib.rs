//! Workflow compiler and execution engine for flowgate.
//!
//! This crate defines the pure logic (compile, walk, approve/resume) and the
//! "ports" the infrastructure layer implements (`BashExecutor`). It depends
//! only on `flowgate-types` -- never on `flowgate-infra` or any process/IO crate.

pub mod event;
pub mod workflow;
