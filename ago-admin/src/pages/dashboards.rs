use std::sync::Arc;

use proto::{CommandContent, CommandError};
use serde_json::Value as JsonValue;

use crate::{
    inventory::{Dashboard, InventoryStore},
    notify::Notifier,
    pages::report_failure,
    rpc::ControllerPort,
};

pub struct DashboardsPage<P> {
    port: Arc<P>,
    inventory: InventoryStore,
    notifier: Arc<dyn Notifier>,
    favorites_max: usize,
}

impl<P: ControllerPort> DashboardsPage<P> {
    pub fn new(
        port: Arc<P>,
        inventory: InventoryStore,
        notifier: Arc<dyn Notifier>,
        favorites_max: usize,
    ) -> Self {
        Self {
            port,
            inventory,
            notifier,
            favorites_max,
        }
    }

    pub fn dashboards(&self) -> Vec<Dashboard> {
        self.inventory.snapshot().dashboards
    }

    pub async fn create_dashboard(&self, name: &str) -> Result<Option<Dashboard>, CommandError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Ok(None);
        }
        let content = CommandContent::new(self.inventory.controller_target(), "setdashboard")
            .with("name", name.clone());
        match self.port.send_command(content).await {
            Ok(reply) => {
                let Some(uuid) = reply.data.get("uuid").and_then(JsonValue::as_str) else {
                    let error = CommandError::rejected("reply carried no dashboard uuid");
                    report_failure(self.notifier.as_ref(), "create dashboard", &error);
                    return Err(error);
                };
                let dashboard = Dashboard {
                    uuid: uuid.to_string(),
                    name,
                };
                self.inventory.add_dashboard(dashboard.clone());
                self.notifier
                    .success(&format!("dashboard '{}' created", dashboard.name));
                Ok(Some(dashboard))
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "create dashboard", &error);
                Err(error)
            }
        }
    }

    pub async fn delete_dashboard(&self, uuid: &str) -> Result<(), CommandError> {
        let content = CommandContent::new(self.inventory.controller_target(), "deletedashboard")
            .with("dashboard", uuid);
        match self.port.send_command(content).await {
            Ok(_) => {
                self.inventory.remove_dashboard(uuid);
                self.notifier.success("dashboard deleted");
                Ok(())
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "delete dashboard", &error);
                Err(error)
            }
        }
    }

    /// Flip a device's favorite flag. The flag changes on screen first and is
    /// then persisted through the settings side-channel; a rejected write
    /// puts the old flag back. At the configured maximum, enabling one more
    /// is refused with a warning and nothing changes.
    pub async fn toggle_favorite(&self, uuid: &str) -> Result<bool, CommandError> {
        let snapshot = self.inventory.snapshot();
        let Some(device) = snapshot.device(uuid) else {
            return Err(CommandError::validation(format!("unknown device '{uuid}'")));
        };
        let enabling = !device.favorite;
        if enabling && snapshot.favorite_count() >= self.favorites_max {
            self.notifier.warning(&format!(
                "favorites limit of {} reached",
                self.favorites_max
            ));
            return Ok(false);
        }

        self.inventory
            .update_device(uuid, |device| device.favorite = enabling);
        let value = if enabling { "1" } else { "0" };
        match self.port.save_setting(uuid, "favorites", value).await {
            Ok(()) => Ok(true),
            Err(error) => {
                self.inventory
                    .update_device(uuid, |device| device.favorite = !enabling);
                report_failure(self.notifier.as_ref(), "save favorite", &error);
                Err(error)
            }
        }
    }
}
