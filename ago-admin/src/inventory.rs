use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use proto::{CommandContent, CommandError, ControllerEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::rpc::ControllerPort;

pub const CONTROLLER_DEVICETYPE: &str = "agocontroller";

/// Alias accepted by the controller for commands addressed to itself before
/// the first inventory fetch has resolved its real uuid.
pub const CONTROLLER_ALIAS: &str = "agocontroller";

pub const EVENT_DEVICE_ANNOUNCE: &str = "event.device.announce";
pub const EVENT_DEVICE_REMOVE: &str = "event.device.remove";
pub const EVENT_DEVICE_STATECHANGED: &str = "event.device.statechanged";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    pub uuid: String,
    pub devicetype: String,
    pub name: String,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default = "default_true")]
    pub listable: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub state: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Room {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dashboard {
    pub uuid: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One coherent view of everything the controller owns. Pages only ever see
/// clones of this; the store is the single writable copy.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Inventory {
    pub devices: Vec<Device>,
    pub rooms: Vec<Room>,
    pub dashboards: Vec<Dashboard>,
    pub variables: BTreeMap<String, String>,
    pub applications: Vec<Application>,
}

impl Inventory {
    /// Decode the `inventory` command payload. The controller sends devices
    /// and rooms keyed by uuid; nothing here validates beyond shape, unknown
    /// fields pass through untouched.
    pub fn from_payload(payload: &Value) -> Self {
        let mut inventory = Inventory::default();

        if let Some(devices) = payload.get("devices").and_then(Value::as_object) {
            for (uuid, record) in devices {
                inventory.devices.push(Device {
                    uuid: uuid.clone(),
                    devicetype: string_field(record, "devicetype"),
                    name: string_field(record, "name"),
                    room: optional_string_field(record, "room"),
                    listable: record
                        .get("listable")
                        .and_then(Value::as_bool)
                        .unwrap_or(true),
                    favorite: record
                        .get("favorite")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    state: record.get("state").cloned(),
                });
            }
        }
        if let Some(rooms) = payload.get("rooms").and_then(Value::as_object) {
            for (uuid, record) in rooms {
                inventory.rooms.push(Room {
                    uuid: uuid.clone(),
                    name: string_field(record, "name"),
                    location: optional_string_field(record, "location"),
                });
            }
        }
        if let Some(dashboards) = payload.get("floorplans").and_then(Value::as_object) {
            for (uuid, record) in dashboards {
                inventory.dashboards.push(Dashboard {
                    uuid: uuid.clone(),
                    name: string_field(record, "name"),
                });
            }
        }
        if let Some(variables) = payload.get("variables").and_then(Value::as_object) {
            for (name, value) in variables {
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                inventory.variables.insert(name.clone(), rendered);
            }
        }
        if let Some(applications) = payload.get("applications").and_then(Value::as_array) {
            for record in applications {
                let name = string_field(record, "name");
                if name.is_empty() {
                    continue;
                }
                inventory.applications.push(Application {
                    name,
                    description: string_field(record, "description"),
                });
            }
        }

        // Keyed maps have no stable order; sort so snapshots are predictable.
        inventory.devices.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        inventory.rooms.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        inventory.dashboards.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        inventory
    }

    pub fn controller_uuid(&self) -> Option<&str> {
        self.devices
            .iter()
            .find(|device| device.devicetype == CONTROLLER_DEVICETYPE)
            .map(|device| device.uuid.as_str())
    }

    pub fn device(&self, uuid: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.uuid == uuid)
    }

    pub fn favorite_count(&self) -> usize {
        self.devices.iter().filter(|device| device.favorite).count()
    }
}

/// Owner of the inventory. Reads hand out snapshots; writes happen either
/// through a full refresh or through targeted event/optimistic updates.
#[derive(Clone, Default)]
pub struct InventoryStore {
    inner: Arc<RwLock<Inventory>>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Inventory {
        self.read().clone()
    }

    pub fn replace(&self, inventory: Inventory) {
        *self.write() = inventory;
    }

    pub fn controller_uuid(&self) -> Option<String> {
        self.read().controller_uuid().map(ToOwned::to_owned)
    }

    /// Address for commands aimed at the controller itself.
    pub fn controller_target(&self) -> String {
        self.controller_uuid()
            .unwrap_or_else(|| CONTROLLER_ALIAS.to_string())
    }

    pub async fn refresh<P: ControllerPort>(&self, port: &P) -> Result<(), CommandError> {
        let content = CommandContent::new(self.controller_target(), "inventory");
        let reply = port.send_command(content).await?;
        self.replace(Inventory::from_payload(&reply.data));
        Ok(())
    }

    /// Fold one push event into the collections. Unknown subjects are
    /// ignored; the drain still sees them through the bus.
    pub fn apply_event(&self, event: &ControllerEvent) {
        match event.subject.as_str() {
            EVENT_DEVICE_ANNOUNCE => {
                let Some(uuid) = event.uuid.clone() else {
                    return;
                };
                let mut inventory = self.write();
                if inventory.device(&uuid).is_some() {
                    return;
                }
                debug!(uuid = %uuid, "device announced");
                inventory.devices.push(Device {
                    uuid,
                    devicetype: event
                        .field("devicetype")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: event
                        .field("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    room: None,
                    listable: true,
                    favorite: false,
                    state: None,
                });
                inventory.devices.sort_by(|a, b| a.uuid.cmp(&b.uuid));
            }
            EVENT_DEVICE_REMOVE => {
                let Some(uuid) = event.uuid.as_deref() else {
                    return;
                };
                self.write().devices.retain(|device| device.uuid != uuid);
            }
            EVENT_DEVICE_STATECHANGED => {
                let Some(uuid) = event.uuid.as_deref() else {
                    return;
                };
                let mut inventory = self.write();
                if let Some(device) = inventory
                    .devices
                    .iter_mut()
                    .find(|device| device.uuid == uuid)
                {
                    device.state = event.field("level").cloned();
                }
            }
            _ => {}
        }
    }

    pub(crate) fn update_device<F>(&self, uuid: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Device),
    {
        let mut inventory = self.write();
        match inventory
            .devices
            .iter_mut()
            .find(|device| device.uuid == uuid)
        {
            Some(device) => {
                mutate(device);
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_room(&self, room: Room) {
        self.write().rooms.push(room);
    }

    pub(crate) fn rename_room(&self, uuid: &str, name: &str) -> Option<String> {
        let mut inventory = self.write();
        let room = inventory.rooms.iter_mut().find(|room| room.uuid == uuid)?;
        let previous = std::mem::replace(&mut room.name, name.to_string());
        Some(previous)
    }

    pub(crate) fn remove_room(&self, uuid: &str) {
        let mut inventory = self.write();
        inventory.rooms.retain(|room| room.uuid != uuid);
        for device in &mut inventory.devices {
            if device.room.as_deref() == Some(uuid) {
                device.room = None;
            }
        }
    }

    pub(crate) fn add_dashboard(&self, dashboard: Dashboard) {
        self.write().dashboards.push(dashboard);
    }

    pub(crate) fn remove_dashboard(&self, uuid: &str) {
        self.write()
            .dashboards
            .retain(|dashboard| dashboard.uuid != uuid);
    }

    pub(crate) fn set_variable(&self, name: &str, value: &str) -> Option<String> {
        self.write()
            .variables
            .insert(name.to_string(), value.to_string())
    }

    pub(crate) fn remove_variable(&self, name: &str) {
        self.write().variables.remove(name);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inventory> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inventory> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn default_true() -> bool {
    true
}

fn string_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_string_field(record: &Value, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "devices": {
                "ctrl-1": {"devicetype": "agocontroller", "name": "controller", "listable": false},
                "dev-1": {"devicetype": "switch", "name": "lamp", "room": "room-1", "favorite": true},
            },
            "rooms": {
                "room-1": {"name": "Kitchen", "location": "ground floor"},
            },
            "floorplans": {
                "dash-1": {"name": "Overview"},
            },
            "variables": {"mode": "away", "threshold": 21},
            "applications": [
                {"name": "rule editor", "description": "visual rules"},
            ],
        })
    }

    #[test]
    fn payload_decodes_into_sorted_collections() {
        let inventory = Inventory::from_payload(&sample_payload());
        assert_eq!(inventory.devices.len(), 2);
        assert_eq!(inventory.controller_uuid(), Some("ctrl-1"));
        assert_eq!(inventory.rooms[0].name, "Kitchen");
        assert_eq!(inventory.dashboards[0].uuid, "dash-1");
        assert_eq!(inventory.variables["mode"], "away");
        assert_eq!(inventory.variables["threshold"], "21");
        assert_eq!(inventory.applications[0].name, "rule editor");
        assert!(inventory.devices[1].favorite);
        assert!(!inventory.devices[0].listable);
    }

    #[test]
    fn announce_and_remove_events_update_devices() {
        let store = InventoryStore::new();
        store.replace(Inventory::from_payload(&sample_payload()));

        let announce: ControllerEvent = serde_json::from_value(json!({
            "event": EVENT_DEVICE_ANNOUNCE,
            "uuid": "dev-2",
            "devicetype": "dimmer",
            "name": "hall light",
        }))
        .expect("event should decode");
        store.apply_event(&announce);
        assert!(store.snapshot().device("dev-2").is_some());

        // A duplicate announce must not create a second entry.
        store.apply_event(&announce);
        assert_eq!(
            store
                .snapshot()
                .devices
                .iter()
                .filter(|device| device.uuid == "dev-2")
                .count(),
            1
        );

        let remove: ControllerEvent = serde_json::from_value(json!({
            "event": EVENT_DEVICE_REMOVE,
            "uuid": "dev-2",
        }))
        .expect("event should decode");
        store.apply_event(&remove);
        assert!(store.snapshot().device("dev-2").is_none());
    }

    #[test]
    fn statechanged_updates_the_device_state() {
        let store = InventoryStore::new();
        store.replace(Inventory::from_payload(&sample_payload()));

        let event: ControllerEvent = serde_json::from_value(json!({
            "event": EVENT_DEVICE_STATECHANGED,
            "uuid": "dev-1",
            "level": 75,
        }))
        .expect("event should decode");
        store.apply_event(&event);
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.device("dev-1").and_then(|device| device.state.clone()),
            Some(json!(75))
        );
    }

    #[test]
    fn room_removal_detaches_devices() {
        let store = InventoryStore::new();
        store.replace(Inventory::from_payload(&sample_payload()));
        store.remove_room("room-1");
        let snapshot = store.snapshot();
        assert!(snapshot.rooms.is_empty());
        assert_eq!(snapshot.device("dev-1").and_then(|d| d.room.clone()), None);
    }
}
