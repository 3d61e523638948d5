//! Workflow engine core: compilation, replay-based execution, and approvals.
//!
//! - `canonical` -- deep key sorting, canonical serialization, content hashing
//! - `compiler` -- validation, id assignment, normalization, step-order report
//! - `definition` -- loading raw definitions from JSON/YAML files
//! - `ordering` -- branch ordering policy (authored vs. id-sorted)
//! - `condition` -- `conditional` step condition evaluation
//! - `context` -- per-call execution context (ledger, variables, budget)
//! - `approval` -- resume tokens and resume state
//! - `bash` -- bash step argument normalization and the executor port
//! - `step_runner` -- leaf step dispatch and caller hooks
//! - `executor` -- the recursive step walk producing a run envelope

pub mod approval;
pub mod bash;
pub mod canonical;
pub mod compiler;
pub mod condition;
pub mod context;
pub mod definition;
pub mod executor;
pub mod ordering;
pub mod step_runner;
