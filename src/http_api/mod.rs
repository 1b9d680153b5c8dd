use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    AssignmentMode, BusyInterval, Operation, ProductionSchedule, ScheduleError, ScheduleSummary,
    ScheduledOperation, WindowConfig,
};

#[derive(Clone)]
pub struct AppState {
    schedule: Arc<RwLock<ProductionSchedule>>,
}

impl AppState {
    pub fn new(schedule: ProductionSchedule) -> Self {
        Self {
            schedule: Arc::new(RwLock::new(schedule)),
        }
    }

    pub fn with_shared(schedule: Arc<RwLock<ProductionSchedule>>) -> Self {
        Self { schedule }
    }

    fn schedule(&self) -> Arc<RwLock<ProductionSchedule>> {
        self.schedule.clone()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    MissingReference(String),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }

    fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }
}

impl From<ScheduleError> for ApiError {
    fn from(value: ScheduleError) -> Self {
        if value.is_missing_reference() {
            ApiError::MissingReference(value.to_string())
        } else if matches!(value, ScheduleError::DuplicateOperation { .. }) {
            ApiError::Conflict(value.to_string())
        } else {
            ApiError::Invalid(value.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, "conflict", message),
            ApiError::Invalid(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::MissingReference(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "missing_reference",
                message,
            ),
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModePayload {
    mode: AssignmentMode,
}

#[derive(Debug, Deserialize)]
struct MachinePayload {
    machine_id: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    summary: ScheduleSummary,
    operations: Vec<ScheduledOperation>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/window", get(get_window).put(update_window))
        .route("/mode", get(get_mode).put(update_mode))
        .route("/machines", get(list_machines).post(register_machine))
        .route(
            "/busy_intervals",
            get(list_busy_intervals).post(add_busy_interval),
        )
        .route(
            "/plans/:plan_id/operations",
            get(list_operations).post(create_operation),
        )
        .route(
            "/plans/:plan_id/operations/:operation_id",
            delete(delete_operation),
        )
        .route(
            "/plans/:plan_id/schedule",
            get(get_schedule)
                .post(generate_schedule)
                .delete(clear_schedule),
        )
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, schedule: ProductionSchedule) -> std::io::Result<()> {
    let state = AppState::new(schedule);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_window(State(state): State<AppState>) -> Json<WindowConfig> {
    let schedule = state.schedule();
    let config = schedule.read().window_config().clone();
    Json(config)
}

async fn update_window(
    State(state): State<AppState>,
    Json(config): Json<WindowConfig>,
) -> Result<Json<WindowConfig>, ApiError> {
    let schedule = state.schedule();
    let mut guard = schedule.write();
    guard.set_window_config(config)?;
    Ok(Json(guard.window_config().clone()))
}

async fn get_mode(State(state): State<AppState>) -> Json<ModePayload> {
    let schedule = state.schedule();
    let mode = schedule.read().mode();
    Json(ModePayload { mode })
}

async fn update_mode(
    State(state): State<AppState>,
    Json(payload): Json<ModePayload>,
) -> Json<ModePayload> {
    let schedule = state.schedule();
    schedule.write().set_mode(payload.mode);
    Json(payload)
}

async fn list_machines(State(state): State<AppState>) -> Json<Vec<String>> {
    let schedule = state.schedule();
    let machines = schedule
        .read()
        .registry()
        .iter()
        .map(ToOwned::to_owned)
        .collect();
    Json(machines)
}

async fn register_machine(
    State(state): State<AppState>,
    Json(payload): Json<MachinePayload>,
) -> Result<StatusCode, ApiError> {
    let machine_id = payload.machine_id.trim();
    if machine_id.is_empty() {
        return Err(ApiError::invalid("machine id must not be blank"));
    }
    let schedule = state.schedule();
    if !schedule.write().register_machine(machine_id) {
        return Err(ApiError::conflict(format!(
            "machine '{machine_id}' already registered"
        )));
    }
    Ok(StatusCode::CREATED)
}

async fn list_busy_intervals(State(state): State<AppState>) -> Json<Vec<BusyInterval>> {
    let schedule = state.schedule();
    let intervals = schedule.read().busy_intervals().to_vec();
    Json(intervals)
}

async fn add_busy_interval(
    State(state): State<AppState>,
    Json(interval): Json<BusyInterval>,
) -> Result<(StatusCode, Json<BusyInterval>), ApiError> {
    let interval = interval.trimmed();
    let schedule = state.schedule();
    schedule.write().add_busy_interval(interval.clone())?;
    Ok((StatusCode::CREATED, Json(interval)))
}

async fn list_operations(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Json<Vec<Operation>> {
    let schedule = state.schedule();
    let operations = schedule.read().operations(&plan_id);
    Json(operations)
}

async fn create_operation(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
    Json(operation): Json<Operation>,
) -> Result<(StatusCode, Json<Operation>), ApiError> {
    if operation.plan_id != plan_id {
        return Err(ApiError::invalid(
            "plan id in payload does not match path parameter",
        ));
    }
    let schedule = state.schedule();
    let mut guard = schedule.write();
    if guard.find_operation(&plan_id, &operation.id).is_some() {
        return Err(ApiError::from(ScheduleError::DuplicateOperation {
            plan_id,
            operation_id: operation.id,
        }));
    }
    guard.upsert_operation(operation.clone())?;
    Ok((StatusCode::CREATED, Json(operation)))
}

async fn delete_operation(
    State(state): State<AppState>,
    Path((plan_id, operation_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let schedule = state.schedule();
    if !schedule.write().delete_operation(&plan_id, &operation_id) {
        return Err(ApiError::not_found(format!(
            "operation '{operation_id}' not found in plan '{plan_id}'"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Json<Vec<ScheduledOperation>> {
    let schedule = state.schedule();
    let committed = schedule.read().committed(&plan_id).to_vec();
    Json(committed)
}

async fn generate_schedule(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let schedule = state.schedule();
    let mut guard = schedule.write();
    let summary = guard.generate(&plan_id)?;
    Ok(Json(GenerateResponse {
        summary,
        operations: guard.committed(&plan_id).to_vec(),
    }))
}

async fn clear_schedule(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let schedule = state.schedule();
    if !schedule.write().clear_schedule(&plan_id) {
        return Err(ApiError::not_found(format!(
            "no schedule committed for plan '{plan_id}'"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
