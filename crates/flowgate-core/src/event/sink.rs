//! Synchronous event sink.
//!
//! The engine calls `emit` inline, in emission order, on the task that drives
//! the run. There is no error path: a panicking sink aborts the run.

use flowgate_types::event::WorkflowEvent;

/// Receives workflow events as they are emitted.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &WorkflowEvent);
}

impl<F> EventSink for F
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    fn emit(&self, event: &WorkflowEvent) {
        self(event)
    }
}
