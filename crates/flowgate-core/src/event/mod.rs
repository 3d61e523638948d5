//! Event delivery: the synchronous sink the engine emits into, and a
//! broadcast bus for async fan-out.

pub mod bus;
pub mod sink;
