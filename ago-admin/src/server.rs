use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, atomic::Ordering},
    time::{Duration, Instant},
};

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
};
use proto::{CommandError, ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::{
    events::{BusEvent, EventBus, EventPump, EventSubscription},
    inventory::{Application, Dashboard, Inventory, InventoryStore, Room},
    notify::{Notifier, TracingNotifier},
    pages::{
        CloudPage, DashboardsPage, DrainPage, JournalEntry, JournalPage, PollerHandle,
        ProcessStatus, RoomsPage, SystemPage, VariablesPage,
    },
    rpc::RpcClient,
};

mod handlers;

use handlers::*;

pub const DEFAULT_FAVORITES_MAX: usize = 10;
pub const DEFAULT_DRAIN_CAPACITY: usize = 500;
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_PROCESS_POLL_MS: u64 = 5_000;

#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub rpc_url: Url,
    pub settings_url: Url,
    pub reply_timeout_ms: u64,
    pub favorites_max: usize,
    pub drain_capacity: usize,
    pub process_poll_interval_ms: u64,
}

impl AdminConfig {
    pub fn for_controller(rpc_url: Url, settings_url: Url) -> Self {
        Self {
            rpc_url,
            settings_url,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            favorites_max: DEFAULT_FAVORITES_MAX,
            drain_capacity: DEFAULT_DRAIN_CAPACITY,
            process_poll_interval_ms: DEFAULT_PROCESS_POLL_MS,
        }
    }
}

#[derive(Clone)]
pub struct AdminState {
    inner: Arc<AdminInner>,
}

struct AdminInner {
    client: Arc<RpcClient>,
    bus: EventBus,
    inventory: InventoryStore,
    rooms: RoomsPage<RpcClient>,
    dashboards: DashboardsPage<RpcClient>,
    variables: VariablesPage<RpcClient>,
    system: Arc<SystemPage<RpcClient>>,
    journal: JournalPage<RpcClient>,
    drain: DrainPage,
    cloud: CloudPage<RpcClient>,
    poller: Mutex<Option<PollerHandle>>,
    config: AdminConfig,
    started_at: Instant,
    // Keeps the inventory fed from push events for the state's lifetime.
    _inventory_feed: EventSubscription,
}

impl AdminState {
    pub fn new(config: AdminConfig) -> Self {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(config: AdminConfig, notifier: Arc<dyn Notifier>) -> Self {
        let client = Arc::new(RpcClient::new(
            config.rpc_url.clone(),
            config.settings_url.clone(),
            Duration::from_millis(config.reply_timeout_ms),
        ));
        let bus = EventBus::new();
        let inventory = InventoryStore::new();
        let inventory_feed = {
            let inventory = inventory.clone();
            bus.subscribe(move |event| {
                if let BusEvent::Event(event) = event {
                    inventory.apply_event(event);
                }
            })
        };

        let inner = AdminInner {
            rooms: RoomsPage::new(
                Arc::clone(&client),
                inventory.clone(),
                Arc::clone(&notifier),
            ),
            dashboards: DashboardsPage::new(
                Arc::clone(&client),
                inventory.clone(),
                Arc::clone(&notifier),
                config.favorites_max,
            ),
            variables: VariablesPage::new(
                Arc::clone(&client),
                inventory.clone(),
                Arc::clone(&notifier),
            ),
            system: Arc::new(SystemPage::new(
                Arc::clone(&client),
                inventory.clone(),
                Arc::clone(&notifier),
            )),
            journal: JournalPage::new(
                Arc::clone(&client),
                inventory.clone(),
                Arc::clone(&notifier),
            ),
            drain: DrainPage::new(bus.clone(), config.drain_capacity),
            cloud: CloudPage::new(Arc::clone(&client), inventory.clone(), notifier),
            poller: Mutex::new(None),
            client,
            bus,
            inventory,
            config,
            started_at: Instant::now(),
            _inventory_feed: inventory_feed,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn inventory(&self) -> &InventoryStore {
        &self.inner.inventory
    }

    pub fn rooms(&self) -> &RoomsPage<RpcClient> {
        &self.inner.rooms
    }

    pub fn dashboards(&self) -> &DashboardsPage<RpcClient> {
        &self.inner.dashboards
    }

    pub fn variables(&self) -> &VariablesPage<RpcClient> {
        &self.inner.variables
    }

    pub fn system(&self) -> &Arc<SystemPage<RpcClient>> {
        &self.inner.system
    }

    pub fn journal(&self) -> &JournalPage<RpcClient> {
        &self.inner.journal
    }

    pub fn drain(&self) -> &DrainPage {
        &self.inner.drain
    }

    pub fn cloud(&self) -> &CloudPage<RpcClient> {
        &self.inner.cloud
    }

    pub async fn refresh_inventory(&self) -> Result<(), CommandError> {
        self.inner.inventory.refresh(self.inner.client.as_ref()).await
    }

    pub fn spawn_event_pump(&self) -> EventPump {
        EventPump::spawn((*self.inner.client).clone(), self.inner.bus.clone())
    }

    /// Start the system process poll timer; returns false if it already runs.
    pub fn start_process_polling(&self) -> bool {
        let mut slot = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(SystemPage::start_polling(
            Arc::clone(&self.inner.system),
            Duration::from_millis(self.inner.config.process_poll_interval_ms),
        ));
        true
    }

    /// Teardown for the system page: cancels the timer so no orphaned loop
    /// keeps polling a disposed view.
    pub fn stop_process_polling(&self) -> bool {
        self.inner
            .poller
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .is_some()
    }

    pub fn is_process_polling(&self) -> bool {
        self.inner
            .poller
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }
}

pub fn build_admin_app(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/inventory", get(inventory_handler))
        .route("/v1/inventory/refresh", post(refresh_inventory_handler))
        .route("/v1/applications", get(applications_handler))
        .route(
            "/v1/rooms",
            get(list_rooms_handler).post(create_room_handler),
        )
        .route(
            "/v1/rooms/{uuid}",
            patch(rename_room_handler).delete(delete_room_handler),
        )
        .route(
            "/v1/dashboards",
            get(list_dashboards_handler).post(create_dashboard_handler),
        )
        .route("/v1/dashboards/{uuid}", delete(delete_dashboard_handler))
        .route("/v1/favorites/{uuid}", put(toggle_favorite_handler))
        .route(
            "/v1/variables",
            get(list_variables_handler).post(create_variable_handler),
        )
        .route(
            "/v1/variables/{name}",
            put(update_variable_handler).delete(delete_variable_handler),
        )
        .route("/v1/system", get(system_status_handler))
        .route("/v1/system/memory-threshold", put(memory_threshold_handler))
        .route("/v1/system/poll/start", post(start_system_poll_handler))
        .route("/v1/system/poll/stop", post(stop_system_poll_handler))
        .route("/v1/journal", get(journal_handler))
        .route("/v1/drain", get(drain_handler))
        .route("/v1/drain/start", post(start_drain_handler))
        .route("/v1/drain/stop", post(stop_drain_handler))
        .route("/v1/cloud/activate", post(cloud_activate_handler))
        .route("/v1/blocks", get(blocks_handler))
        .route("/v1/blocks/render", post(render_blocks_handler))
        .layer(middleware::from_fn(access_log_middleware))
        .with_state(state)
}

#[derive(Clone, Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Clone, Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// One mapping from the canonical command outcome to HTTP: client-side
/// short-circuits are bad requests, controller rejections are unprocessable,
/// transport failures are gateway errors.
fn command_error_response(error: &CommandError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match error.kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Transport => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

#[derive(Clone, Debug, Serialize)]
struct ApplicationsResponse {
    applications: Vec<Application>,
}

#[derive(Clone, Debug, Serialize)]
struct RoomsResponse {
    rooms: Vec<Room>,
}

#[derive(Clone, Debug, Deserialize)]
struct CreateRoomRequest {
    name: String,
}

#[derive(Clone, Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

#[derive(Clone, Debug, Serialize)]
struct DashboardsResponse {
    dashboards: Vec<Dashboard>,
}

#[derive(Clone, Debug, Deserialize)]
struct CreateDashboardRequest {
    name: String,
}

#[derive(Clone, Debug, Serialize)]
struct FavoriteResponse {
    uuid: String,
    favorite: bool,
    changed: bool,
    favorite_count: usize,
}

#[derive(Clone, Debug, Serialize)]
struct VariablesResponse {
    variables: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
struct CreateVariableRequest {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Clone, Debug, Deserialize)]
struct UpdateVariableRequest {
    value: String,
}

#[derive(Clone, Debug, Serialize)]
struct SystemResponse {
    memory_threshold_mb: u64,
    processes: Vec<ProcessStatus>,
}

#[derive(Clone, Debug, Deserialize)]
struct MemoryThresholdRequest {
    megabytes: u64,
}

#[derive(Clone, Debug, Deserialize)]
struct JournalQuery {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    end: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
struct JournalResponse {
    messages: Vec<JournalEntry>,
}

#[derive(Clone, Debug, Serialize)]
struct DrainResponse {
    active: bool,
    lines: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct PollResponse {
    active: bool,
}

#[derive(Clone, Debug, Deserialize)]
struct CloudActivateRequest {
    email: String,
    password: String,
}

#[derive(Clone, Debug, Serialize)]
struct CloudActivateResponse {
    submitted: bool,
}

#[derive(Clone, Debug, Serialize)]
struct BlocksResponse {
    blocks: Vec<rulegen::BlockDefinition>,
}

#[derive(Clone, Debug, Serialize)]
struct RenderResponse {
    name: String,
    lua: String,
}
