use std::{collections::BTreeMap, sync::Arc};

use proto::{CommandContent, CommandError};
use serde_json::Value as JsonValue;

use crate::{
    inventory::InventoryStore, notify::Notifier, pages::report_failure, rpc::ControllerPort,
};

pub struct VariablesPage<P> {
    port: Arc<P>,
    inventory: InventoryStore,
    notifier: Arc<dyn Notifier>,
}

impl<P: ControllerPort> VariablesPage<P> {
    pub fn new(port: Arc<P>, inventory: InventoryStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            port,
            inventory,
            notifier,
        }
    }

    pub fn variables(&self) -> BTreeMap<String, String> {
        self.inventory.snapshot().variables
    }

    /// Returns false when the empty name short-circuited the send.
    pub async fn create_variable(&self, name: &str, value: &str) -> Result<bool, CommandError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Ok(false);
        }
        let content = CommandContent::new(self.inventory.controller_target(), "setvariable")
            .with("variable", name.clone())
            .with("value", value);
        match self.port.send_command(content).await {
            Ok(_) => {
                self.inventory.set_variable(&name, value);
                self.notifier.success(&format!("variable '{name}' created"));
                Ok(true)
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "create variable", &error);
                Err(error)
            }
        }
    }

    /// Edit an existing variable optimistically; a rejection restores the
    /// value that was on screen before the edit (the controller's `old`
    /// value when it supplies one).
    pub async fn set_variable(&self, name: &str, value: &str) -> Result<(), CommandError> {
        let Some(previous) = self.inventory.set_variable(name, value) else {
            self.inventory.remove_variable(name);
            return Err(CommandError::validation(format!(
                "unknown variable '{name}'"
            )));
        };
        let content = CommandContent::new(self.inventory.controller_target(), "setvariable")
            .with("variable", name)
            .with("value", value);
        match self.port.send_command(content).await {
            Ok(_) => Ok(()),
            Err(error) => {
                let restore = error
                    .old
                    .as_ref()
                    .and_then(JsonValue::as_str)
                    .unwrap_or(previous.as_str());
                self.inventory.set_variable(name, restore);
                report_failure(self.notifier.as_ref(), "set variable", &error);
                Err(error)
            }
        }
    }

    pub async fn delete_variable(&self, name: &str) -> Result<(), CommandError> {
        let content = CommandContent::new(self.inventory.controller_target(), "delvariable")
            .with("variable", name);
        match self.port.send_command(content).await {
            Ok(_) => {
                self.inventory.remove_variable(name);
                self.notifier.success(&format!("variable '{name}' deleted"));
                Ok(())
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "delete variable", &error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::{inventory::Inventory, notify::testing::RecordingNotifier, pages::testing::StubPort};

    fn page_with(port: Arc<StubPort>) -> (VariablesPage<StubPort>, InventoryStore) {
        let inventory = InventoryStore::new();
        inventory.replace(Inventory::from_payload(&json!({
            "variables": {"mode": "home"},
        })));
        let page = VariablesPage::new(
            port,
            inventory.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        (page, inventory)
    }

    #[tokio::test]
    async fn edits_are_applied_before_the_command_settles_and_survive_success() {
        let port = StubPort::new();
        let (page, inventory) = page_with(Arc::clone(&port));
        page.set_variable("mode", "away")
            .await
            .expect("edit should succeed");
        assert_eq!(inventory.snapshot().variables["mode"], "away");
    }

    #[tokio::test]
    async fn rejected_edit_restores_the_previous_value() {
        let port = StubPort::new();
        port.push_reply(Err(CommandError::rejected("variable is read only")));
        let (page, inventory) = page_with(Arc::clone(&port));

        page.set_variable("mode", "away")
            .await
            .expect_err("edit should fail");
        assert_eq!(inventory.snapshot().variables["mode"], "home");
    }

    #[tokio::test]
    async fn rejected_edit_prefers_the_server_supplied_old_value() {
        let port = StubPort::new();
        port.push_reply(Err(CommandError {
            kind: proto::ErrorKind::Rejected,
            message: "stale write".to_string(),
            identifier: None,
            old: Some(json!("night")),
        }));
        let (page, inventory) = page_with(Arc::clone(&port));

        page.set_variable("mode", "away")
            .await
            .expect_err("edit should fail");
        assert_eq!(inventory.snapshot().variables["mode"], "night");
    }

    #[tokio::test]
    async fn editing_an_unknown_variable_sends_nothing() {
        let port = StubPort::new();
        let (page, inventory) = page_with(Arc::clone(&port));
        let error = page
            .set_variable("missing", "1")
            .await
            .expect_err("unknown variable");
        assert_eq!(error.kind, proto::ErrorKind::Validation);
        assert!(port.sent_commands().is_empty());
        assert!(!inventory.snapshot().variables.contains_key("missing"));
    }
}
