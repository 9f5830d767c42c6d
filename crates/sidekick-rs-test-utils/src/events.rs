use parking_lot::Mutex;
use sidekick_rs_protocol::{EventMsg, EventPayload, EventSink};

/// Event sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EventMsg>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventMsg> {
        self.events.lock().clone()
    }

    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events
            .lock()
            .iter()
            .map(|event| event.payload.clone())
            .collect()
    }

    /// Concatenated text of all message deltas.
    pub fn streamed_text(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match &event.payload {
                EventPayload::AgentMessageDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EventMsg) {
        self.events.lock().push(event);
    }
}
