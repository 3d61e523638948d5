//! JSON-lines span exporter.
//!
//! Writes one JSON object per finished span to a writer (stderr by default),
//! so span export can stay on while stdout carries machine-readable output.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use serde_json::{Map, Value, json};

pub struct JsonSpanExporter {
    writer: Mutex<Box<dyn Write + Send>>,
    is_shutdown: AtomicBool,
}

impl JsonSpanExporter {
    /// Exporter writing to stderr.
    pub fn stderr() -> Self {
        Self::with_writer(std::io::stderr())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            is_shutdown: AtomicBool::new(false),
        }
    }

    fn write_batch(&self, batch: &[SpanData]) -> OTelSdkResult {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| OTelSdkError::InternalFailure("span writer poisoned".to_string()))?;
        for span in batch {
            writeln!(writer, "{}", span_json(span))
                .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))
    }
}

impl fmt::Debug for JsonSpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonSpanExporter")
    }
}

impl SpanExporter for JsonSpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(OTelSdkError::AlreadyShutdown);
        }
        self.write_batch(&batch)
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.is_shutdown.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn span_json(span: &SpanData) -> Value {
    let attributes: Map<String, Value> = span
        .attributes
        .iter()
        .map(|kv| (kv.key.as_str().to_string(), Value::String(kv.value.to_string())))
        .collect();
    json!({
        "name": span.name.as_ref(),
        "traceId": span.span_context.trace_id().to_string(),
        "spanId": span.span_context.span_id().to_string(),
        "parentSpanId": span.parent_span_id.to_string(),
        "startTimeUnixNano": unix_nanos(span.start_time),
        "endTimeUnixNano": unix_nanos(span.end_time),
        "attributes": attributes,
    })
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::KeyValue;
    use opentelemetry::trace::{Span, Tracer, TracerProvider as _};
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn finished_spans_become_json_lines() {
        let buf = SharedBuf::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(JsonSpanExporter::with_writer(buf.clone()))
            .build();
        let tracer = provider.tracer("flowgate-test");

        let mut span = tracer.start("compile");
        span.set_attribute(KeyValue::new("file", "deploy.yaml"));
        span.end();
        provider.shutdown().unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["name"], "compile");
        assert_eq!(parsed["attributes"]["file"], "deploy.yaml");
        assert_eq!(parsed["traceId"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn export_after_shutdown_fails() {
        let mut exporter = JsonSpanExporter::with_writer(SharedBuf::default());
        exporter.shutdown().unwrap();
        let result = exporter.export(Vec::new()).await;
        assert!(matches!(result, Err(OTelSdkError::AlreadyShutdown)));
    }
}
