use std::sync::{Arc, Mutex};

use proto::{CommandContent, CommandError};
use serde_json::Value as JsonValue;

use crate::{
    inventory::{InventoryStore, Room},
    notify::Notifier,
    pages::report_failure,
    rpc::ControllerPort,
};

pub struct RoomsPage<P> {
    port: Arc<P>,
    inventory: InventoryStore,
    notifier: Arc<dyn Notifier>,
    draft_name: Mutex<String>,
}

impl<P: ControllerPort> RoomsPage<P> {
    pub fn new(port: Arc<P>, inventory: InventoryStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            port,
            inventory,
            notifier,
            draft_name: Mutex::new(String::new()),
        }
    }

    pub fn set_draft_name(&self, name: &str) {
        *self.draft_name.lock().unwrap_or_else(|p| p.into_inner()) = name.to_string();
    }

    pub fn draft_name(&self) -> String {
        self.draft_name
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.inventory.snapshot().rooms
    }

    /// Create a room named after the draft field. An empty draft skips the
    /// send entirely; on success the reply's uuid is appended to the rooms
    /// collection and the draft is cleared.
    pub async fn create_room(&self) -> Result<Option<Room>, CommandError> {
        let name = self.draft_name().trim().to_string();
        if name.is_empty() {
            return Ok(None);
        }
        let content = CommandContent::new(self.inventory.controller_target(), "setroomname")
            .with("name", name.clone());
        match self.port.send_command(content).await {
            Ok(reply) => {
                let Some(uuid) = reply.data.get("uuid").and_then(JsonValue::as_str) else {
                    let error = CommandError::rejected("reply carried no room uuid");
                    report_failure(self.notifier.as_ref(), "create room", &error);
                    return Err(error);
                };
                let room = Room {
                    uuid: uuid.to_string(),
                    name,
                    location: None,
                };
                self.inventory.add_room(room.clone());
                self.set_draft_name("");
                self.notifier
                    .success(&format!("room '{}' created", room.name));
                Ok(Some(room))
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "create room", &error);
                Err(error)
            }
        }
    }

    /// Rename optimistically: the collection shows the new name while the
    /// command is in flight and reverts if the controller rejects it.
    pub async fn rename_room(&self, uuid: &str, new_name: &str) -> Result<(), CommandError> {
        let name = new_name.trim().to_string();
        if name.is_empty() {
            return Ok(());
        }
        let Some(previous) = self.inventory.rename_room(uuid, &name) else {
            return Err(CommandError::validation(format!("unknown room '{uuid}'")));
        };
        let content = CommandContent::new(self.inventory.controller_target(), "setroomname")
            .with("room", uuid)
            .with("name", name);
        match self.port.send_command(content).await {
            Ok(_) => Ok(()),
            Err(error) => {
                let restore = error
                    .old
                    .as_ref()
                    .and_then(JsonValue::as_str)
                    .unwrap_or(previous.as_str());
                self.inventory.rename_room(uuid, restore);
                report_failure(self.notifier.as_ref(), "rename room", &error);
                Err(error)
            }
        }
    }

    pub async fn delete_room(&self, uuid: &str) -> Result<(), CommandError> {
        let content = CommandContent::new(self.inventory.controller_target(), "deleteroom")
            .with("room", uuid);
        match self.port.send_command(content).await {
            Ok(_) => {
                self.inventory.remove_room(uuid);
                self.notifier.success("room deleted");
                Ok(())
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "delete room", &error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::CommandData;
    use serde_json::json;

    use crate::{inventory::Inventory, notify::testing::RecordingNotifier, pages::testing::StubPort};

    fn page_with(port: Arc<StubPort>) -> (RoomsPage<StubPort>, InventoryStore) {
        let inventory = InventoryStore::new();
        inventory.replace(Inventory::from_payload(&json!({
            "devices": {
                "ctrl-1": {"devicetype": "agocontroller", "name": "controller"},
            },
            "rooms": {
                "room-1": {"name": "Kitchen"},
            },
        })));
        let page = RoomsPage::new(
            port,
            inventory.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        (page, inventory)
    }

    #[tokio::test]
    async fn empty_draft_skips_the_send() {
        let port = StubPort::new();
        let (page, _) = page_with(Arc::clone(&port));
        page.set_draft_name("   ");
        let created = page.create_room().await.expect("skip is not an error");
        assert!(created.is_none());
        assert!(port.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn create_room_appends_reply_uuid_and_clears_draft() {
        let port = StubPort::new();
        port.push_reply(Ok(CommandData {
            data: json!({"uuid": "room-42"}),
            message: None,
        }));
        let (page, inventory) = page_with(Arc::clone(&port));
        page.set_draft_name("Pantry");

        let created = page
            .create_room()
            .await
            .expect("create should succeed")
            .expect("a room should be created");
        assert_eq!(created.uuid, "room-42");
        assert_eq!(created.name, "Pantry");
        assert!(page.draft_name().is_empty());
        assert!(
            inventory
                .snapshot()
                .rooms
                .iter()
                .any(|room| room.uuid == "room-42" && room.name == "Pantry")
        );

        let sent = port.sent_commands();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].uuid, "ctrl-1");
        assert_eq!(sent[0].command, "setroomname");
        assert_eq!(sent[0].params["name"], "Pantry");
    }

    #[tokio::test]
    async fn failed_rename_rolls_back_to_the_server_supplied_old_name() {
        let port = StubPort::new();
        port.push_reply(Err(CommandError {
            kind: proto::ErrorKind::Rejected,
            message: "room is locked".to_string(),
            identifier: None,
            old: Some(json!("Kitchen")),
        }));
        let (page, inventory) = page_with(Arc::clone(&port));

        let error = page
            .rename_room("room-1", "Scullery")
            .await
            .expect_err("rename should fail");
        assert_eq!(error.message, "room is locked");
        assert_eq!(inventory.snapshot().rooms[0].name, "Kitchen");
    }

    #[tokio::test]
    async fn failed_rename_without_old_value_restores_the_captured_name() {
        let port = StubPort::new();
        port.push_reply(Err(CommandError::rejected("nope")));
        let (page, inventory) = page_with(Arc::clone(&port));

        page.rename_room("room-1", "Scullery")
            .await
            .expect_err("rename should fail");
        assert_eq!(inventory.snapshot().rooms[0].name, "Kitchen");
    }
}
