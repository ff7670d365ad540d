// =============================================================================
// Telemetry — bounded, fire-and-forget decision/outcome event sink
// =============================================================================
//
// Generalises `app_state.rs`'s `recent_decisions`/`recent_errors` bounded
// rings into a standalone sink trait so tests can substitute an in-memory
// implementation instead of the real bounded channel.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub key: String,
    pub detail: String,
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Bounded `tokio::sync::mpsc`-backed sink. Overflow drops the oldest event
/// by virtue of `try_send` failing on a full bounded channel — a dropped
/// telemetry event is acceptable; a dropped trade outcome is not (outcome
/// intake never goes through this sink for its state mutation, only for the
/// calibration side-channel).
pub struct ChannelTelemetrySink {
    sender: mpsc::Sender<TelemetryEvent>,
}

impl ChannelTelemetrySink {
    /// Spawns the sink along with a drain task that currently just logs;
    /// a real deployment would forward `receiver` to an external collector.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                tracing::debug!(kind = %event.kind, key = %event.key, detail = %event.detail, "telemetry event");
            }
        });
        Self { sender }
    }
}

impl TelemetrySink for ChannelTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        if self.sender.try_send(event).is_err() {
            warn!("telemetry queue full, dropping event");
        }
    }
}

/// In-memory sink used by tests.
#[derive(Default)]
pub struct InMemoryTelemetrySink {
    events: parking_lot::Mutex<Vec<TelemetryEvent>>,
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

impl InMemoryTelemetrySink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_collects_events() {
        let sink = InMemoryTelemetrySink::default();
        sink.emit(TelemetryEvent {
            timestamp: Utc::now(),
            kind: "decision".to_string(),
            key: "MGC:long".to_string(),
            detail: "ok".to_string(),
        });
        assert_eq!(sink.events().len(), 1);
    }
}
