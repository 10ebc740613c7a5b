use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use proto::ControllerEvent;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::rpc::{EventFetch, RpcClient};

const PUMP_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What a subscriber sees: real controller events, plus lifecycle markers so
/// views can show when the stream starts and stops.
#[derive(Clone, Debug)]
pub enum BusEvent {
    Started,
    Stopped,
    Event(ControllerEvent),
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct HandlerEntry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    handlers: Mutex<Vec<HandlerEntry>>,
    sequence: AtomicU64,
    dispatched_total: AtomicU64,
}

/// Fan-out point for controller events. Handlers run in registration order;
/// delivery is at-most-once and best-effort — nothing is buffered for
/// handlers registered late.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. The returned handle owns the registration: cancel
    /// it (or drop it) and the handler is never invoked again.
    pub fn subscribe<F>(&self, handler: F) -> EventSubscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push(HandlerEntry {
            id,
            handler: Arc::new(handler),
        });
        EventSubscription {
            bus: self.clone(),
            id,
        }
    }

    pub fn dispatch(&self, event: &BusEvent) {
        // Snapshot outside the call so a handler may subscribe or cancel
        // without deadlocking the bus.
        let snapshot = {
            let handlers = self
                .inner
                .handlers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            handlers
                .iter()
                .map(|entry| Arc::clone(&entry.handler))
                .collect::<Vec<_>>()
        };
        for handler in snapshot {
            handler(event);
        }
        self.inner.dispatched_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn dispatched_total(&self) -> u64 {
        self.inner.dispatched_total.load(Ordering::Relaxed)
    }

    fn cancel(&self, id: u64) {
        let mut handlers = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.retain(|entry| entry.id != id);
    }
}

/// Scoped registration on an [`EventBus`]; dropping it unregisters the
/// handler. Page teardown hooks rely on this.
pub struct EventSubscription {
    bus: EventBus,
    id: u64,
}

impl EventSubscription {
    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.cancel(self.id);
    }
}

/// Long-polls the controller for pushed events and feeds them into the bus.
/// Subscribes on start, re-subscribes when the controller forgets the id,
/// unsubscribes on shutdown. Delivery is fire-and-forget: events dropped by
/// the transport are simply never seen.
pub struct EventPump {
    active: Arc<AtomicBool>,
    stop: Arc<Notify>,
    handle: tokio::task::JoinHandle<()>,
}

impl EventPump {
    pub fn spawn(client: RpcClient, bus: EventBus) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(Notify::new());
        let task_active = Arc::clone(&active);
        let task_stop = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            run_event_pump(client, bus, task_active, task_stop).await;
        });
        Self {
            active,
            stop,
            handle,
        }
    }

    /// Cooperative shutdown: stops the poll loop, waits for the final
    /// unsubscribe, and lets the `Stopped` marker reach the bus.
    pub async fn shutdown(self) {
        self.active.store(false, Ordering::Relaxed);
        self.stop.notify_one();
        let _ = self.handle.await;
    }
}

async fn run_event_pump(
    client: RpcClient,
    bus: EventBus,
    active: Arc<AtomicBool>,
    stop: Arc<Notify>,
) {
    bus.dispatch(&BusEvent::Started);
    let mut subscription: Option<String> = None;

    while active.load(Ordering::Relaxed) {
        let current = if let Some(id) = subscription.clone() {
            id
        } else {
            let subscribed = tokio::select! {
                _ = stop.notified() => break,
                result = client.subscribe() => result,
            };
            match subscribed {
                Ok(id) => {
                    debug!(subscription = %id, "event subscription established");
                    subscription = Some(id.clone());
                    id
                }
                Err(err) => {
                    warn!("event subscription failed: {err}");
                    tokio::select! {
                        _ = stop.notified() => break,
                        _ = tokio::time::sleep(PUMP_RETRY_DELAY) => continue,
                    }
                }
            }
        };

        let fetched = tokio::select! {
            _ = stop.notified() => break,
            result = client.get_event(&current) => result,
        };
        match fetched {
            Ok(EventFetch::Event(event)) => bus.dispatch(&BusEvent::Event(event)),
            Ok(EventFetch::Idle) => {}
            Ok(EventFetch::Expired) => {
                warn!("event subscription expired; re-subscribing");
                subscription = None;
            }
            Err(err) => {
                warn!("event poll failed: {err}");
                tokio::select! {
                    _ = stop.notified() => break,
                    _ = tokio::time::sleep(PUMP_RETRY_DELAY) => {}
                }
            }
        }
    }

    if let Some(id) = subscription {
        if let Err(err) = client.unsubscribe(&id).await {
            warn!("unsubscribe failed during shutdown: {err}");
        }
    }
    bus.dispatch(&BusEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_event() -> BusEvent {
        BusEvent::Event(ControllerEvent {
            subject: "event.device.statechanged".to_string(),
            uuid: Some("dev-1".to_string()),
            body: serde_json::Map::new(),
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| seen.lock().unwrap().push("first"))
        };
        let second = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| seen.lock().unwrap().push("second"))
        };

        bus.dispatch(&marker_event());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        drop(first);
        drop(second);
    }

    #[test]
    fn cancelled_handler_is_never_invoked_again() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let subscription = {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::Relaxed);
            })
        };
        bus.dispatch(&marker_event());
        assert_eq!(count.load(Ordering::Relaxed), 1);

        subscription.cancel();
        bus.dispatch(&marker_event());
        bus.dispatch(&marker_event());
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn dropping_the_subscription_unregisters_the_handler() {
        let bus = EventBus::new();
        {
            let _subscription = bus.subscribe(|_| {});
            assert_eq!(bus.handler_count(), 1);
        }
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn a_handler_may_cancel_a_sibling_during_dispatch() {
        let bus = EventBus::new();
        let victim_calls = Arc::new(AtomicU64::new(0));

        let victim = {
            let victim_calls = Arc::clone(&victim_calls);
            bus.subscribe(move |_| {
                victim_calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        let victim = Arc::new(Mutex::new(Some(victim)));
        let _killer = {
            let victim = Arc::clone(&victim);
            bus.subscribe(move |_| {
                victim.lock().unwrap().take();
            })
        };

        // First dispatch still reaches the victim (it registered first);
        // afterwards it is gone.
        bus.dispatch(&marker_event());
        bus.dispatch(&marker_event());
        assert_eq!(victim_calls.load(Ordering::Relaxed), 1);
    }
}
