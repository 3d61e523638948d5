//! Infrastructure layer for flowgate.
//!
//! Contains implementations of the ports defined in `flowgate-core`: the
//! process-backed bash executor, plus the TOML configuration loader.

pub mod bash;
pub mod config;
