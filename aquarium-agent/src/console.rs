//! Console subscriber: one log line per engine event, payload as JSON.

use aquarium_core::{EventSubscriber, MonitorEvent};
use tracing::{info, warn};

pub struct ConsoleSubscriber;

impl ConsoleSubscriber {
    pub fn render(event: &MonitorEvent) -> serde_json::Result<String> {
        serde_json::to_string(event)
    }
}

impl EventSubscriber for ConsoleSubscriber {
    fn on_event(&self, event: &MonitorEvent) {
        match Self::render(event) {
            Ok(payload) => info!(event = event.kind(), %payload, "Monitor event"),
            Err(e) => warn!(event = event.kind(), error = %e, "Failed to serialize event"),
        }
    }
}
