use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use domain::followups::{
    BulkReminderInput, FollowUpEngine, FollowUpStatus, HttpFollowUpStore,
    ScheduleFollowUpInput, UpdateFollowUpInput, WhatsAppDispatcher,
};
use domain::Error;

#[derive(Clone)]
struct AppState {
    engine: Arc<FollowUpEngine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let store_base_url = env_or("STORE_BASE_URL", "http://localhost:8081");
    let clinic_name = env_or("CLINIC_NAME", "Clinic");
    let gateway_url = env_or("WHATSAPP_GATEWAY_URL", "http://localhost:8082");
    let from_number = env_or("WHATSAPP_FROM_NUMBER", "whatsapp:+14155238886");
    let whatsapp_enabled = env_or("WHATSAPP_ENABLED", "true") == "true";
    let http_timeout = Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", "10").parse()?);
    let dispatch_timeout = Duration::from_secs(env_or("DISPATCH_TIMEOUT_SECS", "10").parse()?);

    let store = Arc::new(HttpFollowUpStore::new(store_base_url, http_timeout)?);
    let dispatcher = Arc::new(WhatsAppDispatcher::new(
        gateway_url,
        from_number,
        whatsapp_enabled,
        http_timeout,
    )?);
    let engine = Arc::new(FollowUpEngine::new(
        store,
        dispatcher,
        clinic_name,
        dispatch_timeout,
    ));

    let app = router(AppState { engine });

    let bind_addr = env_or("BIND_ADDR", "0.0.0.0:8080");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("follow-up service listening on {bind_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/follow-ups",
            post(schedule_follow_up).get(list_upcoming),
        )
        .route("/api/follow-ups/today", get(todays_follow_ups))
        .route("/api/follow-ups/due-for-reminder", get(due_for_reminder))
        .route("/api/follow-ups/reminders/bulk", post(send_bulk_reminders))
        .route("/api/follow-ups/patient/:patient_id", get(list_by_patient))
        .route(
            "/api/follow-ups/:id",
            get(get_follow_up)
                .put(update_follow_up)
                .delete(delete_follow_up),
        )
        .route("/api/follow-ups/:id/status", put(update_status))
        .route("/api/follow-ups/:id/reminder", post(send_reminder))
        .with_state(state)
}

/// Typed domain error mapped onto an HTTP status and a JSON body.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, field) = match &self.0 {
            Error::InvalidInput { field, .. } => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", Some(field.clone()))
            }
            Error::SchedulingConflict { .. } => (
                StatusCode::BAD_REQUEST,
                "SCHEDULING_CONFLICT",
                Some("followUpDate".to_string()),
            ),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            Error::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", None)
            }
            Error::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE", None),
            Error::DispatchInProgress { .. } => {
                (StatusCode::CONFLICT, "DISPATCH_IN_PROGRESS", None)
            }
            Error::DispatchFailed { .. } => (StatusCode::BAD_GATEWAY, "DISPATCH_FAILED", None),
            Error::SchedulingFailed { .. } => {
                (StatusCode::BAD_GATEWAY, "SCHEDULING_FAILED", None)
            }
            Error::Store { .. } => (StatusCode::BAD_GATEWAY, "STORE_ERROR", None),
        };

        let body = serde_json::json!({
            "code": code,
            "message": self.0.to_string(),
            "field": field,
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    fn size(&self) -> u32 {
        self.size.unwrap_or(10)
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    status: String,
}

#[derive(Deserialize)]
struct ReminderQuery {
    #[serde(default)]
    resend: Option<bool>,
}

async fn schedule_follow_up(
    State(state): State<AppState>,
    Json(input): Json<ScheduleFollowUpInput>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.engine.schedule(input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_follow_up(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.engine.get(&id).await?;
    Ok(Json(record))
}

async fn update_follow_up(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(input): Json<UpdateFollowUpInput>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.engine.update(&id, input).await?;
    Ok(Json(record))
}

async fn update_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let target = FollowUpStatus::from_str(&query.status)?;
    let record = state.engine.transition_status(&id, target).await?;
    Ok(Json(record))
}

async fn send_reminder(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<ReminderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .engine
        .send_reminder(&id, query.resend.unwrap_or(false))
        .await?;
    Ok(Json(record))
}

async fn send_bulk_reminders(
    State(state): State<AppState>,
    Json(input): Json<BulkReminderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let outcomes = state.engine.send_bulk_reminders(&input.ids).await;
    Ok(Json(outcomes))
}

async fn todays_follow_ups(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.engine.today().await?;
    Ok(Json(records))
}

async fn due_for_reminder(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.engine.due_for_reminder().await?;
    Ok(Json(records))
}

async fn list_upcoming(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.engine.upcoming(query.page(), query.size()).await?;
    Ok(Json(page))
}

async fn list_by_patient(
    Path(patient_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .engine
        .by_patient(&patient_id, query.page(), query.size())
        .await?;
    Ok(Json(page))
}

async fn delete_follow_up(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
