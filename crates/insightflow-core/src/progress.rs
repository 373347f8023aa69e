//! Progress events
//!
//! The coordinator emits one event per stage boundary. Delivery is
//! best-effort over a bounded channel: an absent or slow consumer never
//! stalls the run.

use insightflow_model::{RunId, Stage};
use tokio::sync::mpsc;

/// One stage-boundary notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Run the event belongs to
    pub run_id: RunId,
    /// Stage just entered
    pub stage: Stage,
    /// Progress at this boundary
    pub percent_complete: u8,
    /// Human-readable note
    pub message: String,
}

/// Best-effort emitter over an optional channel
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressEmitter {
    /// Emitter that drops everything (no consumer)
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Emitter feeding `sender`
    #[inline]
    #[must_use]
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Emit one event; silently dropped when unconsumed or the buffer is full
    pub fn emit(&self, run_id: RunId, stage: Stage, message: impl Into<String>) {
        let Some(sender) = &self.sender else {
            return;
        };
        let event = ProgressEvent {
            run_id,
            stage,
            percent_complete: stage.percent_complete(),
            message: message.into(),
        };
        if let Err(e) = sender.try_send(event) {
            tracing::debug!(stage = %stage, error = %e, "progress event dropped");
        }
    }
}
