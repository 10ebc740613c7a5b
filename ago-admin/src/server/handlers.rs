use super::*;

pub(super) async fn access_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis();
    info!(
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        elapsed_ms = elapsed_ms,
        "http access"
    );
    response
}

pub(super) async fn healthz_handler() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

pub(super) async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let rpc = state.inner.client.metrics();
    let metrics = format!(
        concat!(
            "ago_admin_uptime_seconds {}\n",
            "ago_admin_commands_sent_total {}\n",
            "ago_admin_commands_ok_total {}\n",
            "ago_admin_commands_error_total {}\n",
            "ago_admin_settings_writes_total {}\n",
            "ago_admin_events_dispatched_total {}\n",
            "ago_admin_event_handlers {}\n",
            "ago_admin_drain_active {}\n"
        ),
        state.inner.started_at.elapsed().as_secs(),
        rpc.commands_sent_total.load(Ordering::Relaxed),
        rpc.commands_ok_total.load(Ordering::Relaxed),
        rpc.commands_error_total.load(Ordering::Relaxed),
        rpc.settings_writes_total.load(Ordering::Relaxed),
        state.inner.bus.dispatched_total(),
        state.inner.bus.handler_count(),
        u8::from(state.inner.drain.is_draining()),
    );
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics,
    )
}

pub(super) async fn inventory_handler(State(state): State<AdminState>) -> Json<Inventory> {
    Json(state.inventory().snapshot())
}

pub(super) async fn refresh_inventory_handler(
    State(state): State<AdminState>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.refresh_inventory().await {
        Ok(()) => Ok(Json(StatusResponse { status: "ok" })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn applications_handler(
    State(state): State<AdminState>,
) -> Json<ApplicationsResponse> {
    Json(ApplicationsResponse {
        applications: state.inventory().snapshot().applications,
    })
}

pub(super) async fn list_rooms_handler(State(state): State<AdminState>) -> Json<RoomsResponse> {
    Json(RoomsResponse {
        rooms: state.rooms().rooms(),
    })
}

pub(super) async fn create_room_handler(
    State(state): State<AdminState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), (StatusCode, Json<ErrorResponse>)> {
    state.rooms().set_draft_name(&request.name);
    match state.rooms().create_room().await {
        Ok(Some(room)) => Ok((StatusCode::CREATED, Json(room))),
        Ok(None) => Err(bad_request("room name must not be empty")),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn rename_room_handler(
    State(state): State<AdminState>,
    Path(uuid): Path<String>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.rooms().rename_room(&uuid, &request.name).await {
        Ok(()) => Ok(Json(StatusResponse { status: "ok" })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn delete_room_handler(
    State(state): State<AdminState>,
    Path(uuid): Path<String>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.rooms().delete_room(&uuid).await {
        Ok(()) => Ok(Json(StatusResponse { status: "ok" })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn list_dashboards_handler(
    State(state): State<AdminState>,
) -> Json<DashboardsResponse> {
    Json(DashboardsResponse {
        dashboards: state.dashboards().dashboards(),
    })
}

pub(super) async fn create_dashboard_handler(
    State(state): State<AdminState>,
    Json(request): Json<CreateDashboardRequest>,
) -> Result<(StatusCode, Json<Dashboard>), (StatusCode, Json<ErrorResponse>)> {
    match state.dashboards().create_dashboard(&request.name).await {
        Ok(Some(dashboard)) => Ok((StatusCode::CREATED, Json(dashboard))),
        Ok(None) => Err(bad_request("dashboard name must not be empty")),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn delete_dashboard_handler(
    State(state): State<AdminState>,
    Path(uuid): Path<String>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.dashboards().delete_dashboard(&uuid).await {
        Ok(()) => Ok(Json(StatusResponse { status: "ok" })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn toggle_favorite_handler(
    State(state): State<AdminState>,
    Path(uuid): Path<String>,
) -> Result<Json<FavoriteResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.dashboards().toggle_favorite(&uuid).await {
        Ok(changed) => {
            let snapshot = state.inventory().snapshot();
            Ok(Json(FavoriteResponse {
                favorite: snapshot
                    .device(&uuid)
                    .map(|device| device.favorite)
                    .unwrap_or(false),
                changed,
                favorite_count: snapshot.favorite_count(),
                uuid,
            }))
        }
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn list_variables_handler(
    State(state): State<AdminState>,
) -> Json<VariablesResponse> {
    Json(VariablesResponse {
        variables: state.variables().variables(),
    })
}

pub(super) async fn create_variable_handler(
    State(state): State<AdminState>,
    Json(request): Json<CreateVariableRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), (StatusCode, Json<ErrorResponse>)> {
    match state
        .variables()
        .create_variable(&request.name, &request.value)
        .await
    {
        Ok(true) => Ok((StatusCode::CREATED, Json(StatusResponse { status: "ok" }))),
        Ok(false) => Err(bad_request("variable name must not be empty")),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn update_variable_handler(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateVariableRequest>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.variables().set_variable(&name, &request.value).await {
        Ok(()) => Ok(Json(StatusResponse { status: "ok" })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn delete_variable_handler(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.variables().delete_variable(&name).await {
        Ok(()) => Ok(Json(StatusResponse { status: "ok" })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn system_status_handler(State(state): State<AdminState>) -> Json<SystemResponse> {
    Json(SystemResponse {
        memory_threshold_mb: state.system().memory_threshold_mb(),
        processes: state.system().processes(),
    })
}

pub(super) async fn memory_threshold_handler(
    State(state): State<AdminState>,
    Json(request): Json<MemoryThresholdRequest>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.system().set_memory_threshold(request.megabytes).await {
        Ok(()) => Ok(Json(StatusResponse { status: "ok" })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn journal_handler(
    State(state): State<AdminState>,
    Query(query): Query<JournalQuery>,
) -> Result<Json<JournalResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state
        .journal()
        .fetch(query.filter.as_deref(), query.start, query.end)
        .await
    {
        Ok(messages) => Ok(Json(JournalResponse { messages })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn drain_handler(State(state): State<AdminState>) -> Json<DrainResponse> {
    Json(DrainResponse {
        active: state.drain().is_draining(),
        lines: state.drain().lines(),
    })
}

pub(super) async fn start_drain_handler(State(state): State<AdminState>) -> Json<DrainResponse> {
    state.drain().start_drain();
    Json(DrainResponse {
        active: true,
        lines: state.drain().lines(),
    })
}

pub(super) async fn stop_drain_handler(State(state): State<AdminState>) -> Json<DrainResponse> {
    state.drain().stop_drain();
    Json(DrainResponse {
        active: false,
        lines: state.drain().lines(),
    })
}

pub(super) async fn start_system_poll_handler(State(state): State<AdminState>) -> Json<PollResponse> {
    state.start_process_polling();
    Json(PollResponse { active: true })
}

pub(super) async fn stop_system_poll_handler(State(state): State<AdminState>) -> Json<PollResponse> {
    state.stop_process_polling();
    Json(PollResponse { active: false })
}

pub(super) async fn cloud_activate_handler(
    State(state): State<AdminState>,
    Json(request): Json<CloudActivateRequest>,
) -> Result<Json<CloudActivateResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state
        .cloud()
        .activate(&request.email, &request.password)
        .await
    {
        Ok(submitted) => Ok(Json(CloudActivateResponse { submitted })),
        Err(error) => Err(command_error_response(&error)),
    }
}

pub(super) async fn blocks_handler() -> Json<BlocksResponse> {
    Json(BlocksResponse {
        blocks: rulegen::block_catalog(),
    })
}

pub(super) async fn render_blocks_handler(
    Json(graph): Json<rulegen::RuleGraph>,
) -> Result<Json<RenderResponse>, (StatusCode, Json<ErrorResponse>)> {
    match rulegen::compile_rule(&graph) {
        Ok(lua) => Ok(Json(RenderResponse {
            name: graph.name,
            lua,
        })),
        Err(error) => Err(bad_request(&error.to_string())),
    }
}
