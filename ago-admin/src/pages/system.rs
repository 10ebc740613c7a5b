use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use proto::{CommandContent, CommandError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::{
    inventory::InventoryStore, notify::Notifier, pages::report_failure, rpc::ControllerPort,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub running: bool,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: u64,
}

pub struct SystemPage<P> {
    port: Arc<P>,
    inventory: InventoryStore,
    notifier: Arc<dyn Notifier>,
    memory_threshold_mb: Mutex<u64>,
    processes: Mutex<Vec<ProcessStatus>>,
}

impl<P: ControllerPort> SystemPage<P> {
    pub fn new(port: Arc<P>, inventory: InventoryStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            port,
            inventory,
            notifier,
            memory_threshold_mb: Mutex::new(0),
            processes: Mutex::new(Vec::new()),
        }
    }

    pub fn memory_threshold_mb(&self) -> u64 {
        *self
            .memory_threshold_mb
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    pub fn processes(&self) -> Vec<ProcessStatus> {
        self.processes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Optimistic threshold edit with the usual revert on rejection.
    pub async fn set_memory_threshold(&self, megabytes: u64) -> Result<(), CommandError> {
        let previous = {
            let mut threshold = self
                .memory_threshold_mb
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *threshold, megabytes)
        };
        let content =
            CommandContent::new(self.inventory.controller_target(), "setconfigparameter")
                .with("section", "system")
                .with("option", "memorythreshold")
                .with("value", megabytes);
        match self.port.send_command(content).await {
            Ok(_) => {
                self.notifier.success("memory threshold updated");
                Ok(())
            }
            Err(error) => {
                let restore = error
                    .old
                    .as_ref()
                    .and_then(JsonValue::as_u64)
                    .unwrap_or(previous);
                *self
                    .memory_threshold_mb
                    .lock()
                    .unwrap_or_else(|p| p.into_inner()) = restore;
                report_failure(self.notifier.as_ref(), "set memory threshold", &error);
                Err(error)
            }
        }
    }

    /// One polling round. The active flag is checked again after the reply
    /// arrives: a response that lands after teardown is discarded instead of
    /// mutating a view nobody owns anymore.
    pub async fn poll_processes_once(&self, active: &AtomicBool) -> Result<(), CommandError> {
        let content = CommandContent::new(self.inventory.controller_target(), "getprocesslist");
        let reply = self.port.send_command(content).await?;
        if !active.load(Ordering::Relaxed) {
            debug!("discarding process list that arrived after teardown");
            return Ok(());
        }
        let processes = reply
            .data
            .get("processes")
            .cloned()
            .map(serde_json::from_value::<Vec<ProcessStatus>>)
            .transpose()
            .map_err(|err| CommandError::transport(format!("invalid process list: {err}")))?
            .unwrap_or_default();
        *self.processes.lock().unwrap_or_else(|p| p.into_inner()) = processes;
        Ok(())
    }
}

impl<P: ControllerPort + 'static> SystemPage<P> {
    /// Start the fixed-interval process poll. The handle owns cancellation;
    /// pages stop it from their teardown hook.
    pub fn start_polling(page: Arc<Self>, interval: Duration) -> PollerHandle {
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while flag.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !flag.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(err) = page.poll_processes_once(&flag).await {
                    warn!("process poll failed: {err}");
                }
            }
        });
        PollerHandle { active, handle }
    }
}

/// Cancellation handle for the polling task; dropping it stops the timer so
/// no orphaned loop keeps mutating a disposed page.
pub struct PollerHandle {
    active: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
        self.handle.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::CommandData;
    use serde_json::json;

    use crate::{notify::testing::RecordingNotifier, pages::testing::StubPort};

    fn page_with(port: Arc<StubPort>) -> SystemPage<StubPort> {
        SystemPage::new(
            port,
            InventoryStore::new(),
            Arc::new(RecordingNotifier::default()),
        )
    }

    #[tokio::test]
    async fn rejected_threshold_edit_reverts() {
        let port = StubPort::new();
        let page = page_with(Arc::clone(&port));
        page.set_memory_threshold(512)
            .await
            .expect("first edit succeeds");
        assert_eq!(page.memory_threshold_mb(), 512);

        port.push_reply(Err(CommandError::rejected("threshold out of range")));
        page.set_memory_threshold(9999)
            .await
            .expect_err("second edit fails");
        assert_eq!(page.memory_threshold_mb(), 512);
    }

    #[tokio::test]
    async fn process_poll_applies_the_reply_while_active() {
        let port = StubPort::new();
        port.push_reply(Ok(CommandData {
            data: json!({"processes": [
                {"name": "agoresolver", "running": true, "cpu": 1.5, "memory": 2048},
            ]}),
            message: None,
        }));
        let page = page_with(Arc::clone(&port));
        let active = AtomicBool::new(true);
        page.poll_processes_once(&active)
            .await
            .expect("poll should succeed");
        assert_eq!(page.processes().len(), 1);
        assert_eq!(page.processes()[0].name, "agoresolver");
    }

    #[tokio::test]
    async fn late_replies_after_teardown_are_discarded() {
        let port = StubPort::new();
        port.push_reply(Ok(CommandData {
            data: json!({"processes": [
                {"name": "agoresolver", "running": true},
            ]}),
            message: None,
        }));
        let page = page_with(Arc::clone(&port));
        // The flag flips before the reply is applied, as happens when a page
        // is torn down while a request is in flight.
        let active = AtomicBool::new(false);
        page.poll_processes_once(&active)
            .await
            .expect("discarding is not an error");
        assert!(page.processes().is_empty());
    }
}
