use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use proto::{CommandContent, CommandError};
use serde::{Deserialize, Serialize};

use crate::{
    events::{BusEvent, EventBus, EventSubscription},
    inventory::InventoryStore,
    notify::Notifier,
    pages::report_failure,
    rpc::ControllerPort,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub time: u64,
    #[serde(rename = "type", default)]
    pub severity: String,
    pub message: String,
}

/// Read-only view over the controller's message journal.
pub struct JournalPage<P> {
    port: Arc<P>,
    inventory: InventoryStore,
    notifier: Arc<dyn Notifier>,
}

impl<P: ControllerPort> JournalPage<P> {
    pub fn new(port: Arc<P>, inventory: InventoryStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            port,
            inventory,
            notifier,
        }
    }

    pub async fn fetch(
        &self,
        filter: Option<&str>,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<Vec<JournalEntry>, CommandError> {
        let mut content =
            CommandContent::new(self.inventory.controller_target(), "getmessages");
        if let Some(filter) = filter {
            content = content.with("filter", filter);
        }
        if let Some(start) = start {
            content = content.with("start", start);
        }
        if let Some(end) = end {
            content = content.with("end", end);
        }
        match self.port.send_command(content).await {
            Ok(reply) => {
                let messages = reply
                    .data
                    .get("messages")
                    .cloned()
                    .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
                serde_json::from_value(messages).map_err(|err| {
                    CommandError::transport(format!("invalid journal payload: {err}"))
                })
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "fetch journal", &error);
                Err(error)
            }
        }
    }
}

/// Live event drain: subscribes to the bus and appends one rendered line per
/// event to a bounded log. Stopping the drain is the page's teardown
/// obligation; the subscription handle makes it a single call.
pub struct DrainPage {
    bus: EventBus,
    capacity: usize,
    lines: Arc<Mutex<VecDeque<String>>>,
    subscription: Mutex<Option<EventSubscription>>,
}

impl DrainPage {
    pub fn new(bus: EventBus, capacity: usize) -> Self {
        Self {
            bus,
            capacity,
            lines: Arc::new(Mutex::new(VecDeque::new())),
            subscription: Mutex::new(None),
        }
    }

    pub fn start_drain(&self) {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return;
        }
        let lines = Arc::clone(&self.lines);
        let capacity = self.capacity;
        *slot = Some(self.bus.subscribe(move |event| {
            let mut lines = lines.lock().unwrap_or_else(|p| p.into_inner());
            lines.push_back(render_event(event));
            while lines.len() > capacity {
                lines.pop_front();
            }
        }));
    }

    pub fn stop_drain(&self) {
        self.subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
    }

    pub fn is_draining(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Teardown hook: unhooks the handler and empties the log.
    pub fn reset(&self) {
        self.stop_drain();
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

fn render_event(event: &BusEvent) -> String {
    match event {
        BusEvent::Started => "-- event stream started --".to_string(),
        BusEvent::Stopped => "-- event stream stopped --".to_string(),
        BusEvent::Event(event) => {
            let body = serde_json::to_string(&event.body).unwrap_or_else(|_| "{}".to_string());
            format!(
                "{} uuid={} {}",
                event.subject,
                event.uuid.as_deref().unwrap_or("-"),
                body
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::ControllerEvent;
    use serde_json::json;

    fn event(subject: &str, uuid: &str) -> BusEvent {
        BusEvent::Event(ControllerEvent {
            subject: subject.to_string(),
            uuid: Some(uuid.to_string()),
            body: serde_json::Map::new(),
        })
    }

    #[test]
    fn drain_appends_while_running_and_stops_cleanly() {
        let bus = EventBus::new();
        let drain = DrainPage::new(bus.clone(), 100);

        bus.dispatch(&event("event.device.statechanged", "dev-1"));
        assert!(drain.lines().is_empty(), "nothing before start_drain");

        drain.start_drain();
        assert!(drain.is_draining());
        bus.dispatch(&event("event.device.statechanged", "dev-1"));
        bus.dispatch(&BusEvent::Stopped);
        assert_eq!(drain.lines().len(), 2);
        assert!(drain.lines()[0].starts_with("event.device.statechanged uuid=dev-1"));
        assert_eq!(drain.lines()[1], "-- event stream stopped --");

        drain.stop_drain();
        bus.dispatch(&event("event.device.statechanged", "dev-2"));
        assert_eq!(drain.lines().len(), 2, "no appends after stop_drain");
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn drain_log_is_bounded() {
        let bus = EventBus::new();
        let drain = DrainPage::new(bus.clone(), 3);
        drain.start_drain();
        for index in 0..10 {
            bus.dispatch(&event("event.environment.sensor", &format!("dev-{index}")));
        }
        let lines = drain.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("dev-9"));
    }

    #[test]
    fn reset_unhooks_and_clears() {
        let bus = EventBus::new();
        let drain = DrainPage::new(bus.clone(), 100);
        drain.start_drain();
        bus.dispatch(&event("event.device.announce", "dev-1"));
        assert_eq!(drain.lines().len(), 1);

        drain.reset();
        assert!(!drain.is_draining());
        assert!(drain.lines().is_empty());
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn starting_twice_registers_one_handler() {
        let bus = EventBus::new();
        let drain = DrainPage::new(bus.clone(), 100);
        drain.start_drain();
        drain.start_drain();
        assert_eq!(bus.handler_count(), 1);
    }

    #[test]
    fn journal_entries_decode_from_reply_shape() {
        let entries: Vec<JournalEntry> = serde_json::from_value(json!([
            {"time": 1750000000, "type": "info", "message": "controller started"},
            {"time": 1750000060, "message": "no severity on old rows"},
        ]))
        .expect("journal rows should decode");
        assert_eq!(entries[0].severity, "info");
        assert_eq!(entries[1].severity, "");
    }
}
