pub mod events;
pub mod inventory;
pub mod notify;
pub mod pages;
pub mod rpc;
pub mod server;

pub use events::{BusEvent, EventBus, EventPump, EventSubscription};
pub use inventory::{
    Application, CONTROLLER_DEVICETYPE, Dashboard, Device, Inventory, InventoryStore, Room,
};
pub use notify::{Notifier, Severity, TracingNotifier};
pub use rpc::{ControllerPort, EventFetch, RpcClient};
pub use server::{AdminConfig, AdminState, build_admin_app};
