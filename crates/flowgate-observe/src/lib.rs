//! Observability setup for flowgate: tracing subscriber installation and
//! optional OpenTelemetry span export.

pub mod span_export;
pub mod tracing_setup;
