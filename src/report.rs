//! Progress and outcome reporting for authentication flows.
//!
//! Flows and the router never talk to a terminal directly; they emit
//! [`FlowEvent`]s through an injected [`Reporter`]. The command surface that
//! drives them decides how events are rendered.

use std::sync::Arc;

/// An observable event emitted during an authentication flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    /// A new stage of the flow has begun (e.g. "Exchanging authorization code").
    Step { message: String },
    /// The flow (or a storage operation) completed successfully.
    Success { message: String },
    /// Something non-fatal worth surfacing to the user.
    Warning { message: String },
    /// The flow failed; the attempt is over.
    Failure { message: String },
}

/// Sink for flow events.
///
/// Implemented by the presentation layer (terminal UI, logs, tests).
pub trait Reporter: Send + Sync {
    fn report(&self, event: FlowEvent);
}

/// Reporter that forwards events to the `tracing` facade.
///
/// The default when no interactive presentation layer is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: FlowEvent) {
        match event {
            FlowEvent::Step { message } => tracing::info!(%message, "flow step"),
            FlowEvent::Success { message } => tracing::info!(%message, "flow success"),
            FlowEvent::Warning { message } => tracing::warn!(%message, "flow warning"),
            FlowEvent::Failure { message } => tracing::error!(%message, "flow failure"),
        }
    }
}

/// Convenience constructor for the default reporter.
pub fn tracing_reporter() -> Arc<dyn Reporter> {
    Arc::new(TracingReporter)
}
