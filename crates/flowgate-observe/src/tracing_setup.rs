//! Tracing subscriber initialization with optional OpenTelemetry export.
//!
//! # Usage
//!
//! ```no_run
//! use flowgate_observe::tracing_setup::{LogFormat, init_tracing};
//!
//! // Human-readable logs at `info`, overridable through RUST_LOG
//! init_tracing("info", LogFormat::Pretty, false).unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::span_export::JsonSpanExporter;

/// Service name reported on exported spans.
pub const SERVICE_NAME: &str = "flowgate";

/// Keeps the OTel tracer provider alive for shutdown on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Build the filter: `RUST_LOG` wins, otherwise `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global tracing subscriber.
///
/// Logs always go to stderr so stdout stays clean for command output. When
/// `enable_otel` is true, spans are additionally bridged to OpenTelemetry:
/// with [`LogFormat::Pretty`] through the stdout exporter, with
/// [`LogFormat::Json`] as JSON lines on stderr so stdout stays parseable.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init_tracing(
    default_directive: &str,
    format: LogFormat,
    enable_otel: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = env_filter(default_directive);

    let fmt_layer = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .boxed(),
    };

    let otel_layer = if enable_otel {
        let builder = SdkTracerProvider::builder();
        let provider = match format {
            LogFormat::Pretty => builder
                .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                .build(),
            LogFormat::Json => builder
                .with_simple_exporter(JsonSpanExporter::stderr())
                .build(),
        };
        let tracer = provider.tracer(SERVICE_NAME);
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Flush pending spans and shut the tracer provider down.
///
/// A no-op when OpenTelemetry was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

/// Map `-v` repetitions and `--quiet` to a default filter directive.
pub fn verbosity_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(verbosity_directive(0, false), "warn");
        assert_eq!(verbosity_directive(1, false), "info");
        assert_eq!(verbosity_directive(2, false), "debug");
        assert_eq!(verbosity_directive(9, false), "trace");
        assert_eq!(verbosity_directive(3, true), "error");
    }

    #[test]
    fn shutdown_without_otel_is_noop() {
        shutdown_tracing();
    }
}
