//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::app::AppState;
use crate::game::{
    CommandRejected, GameMode, JoinOutcome, MachineStatus, Submitted, TurnScheduler,
};
use crate::http::middleware::{require_operator, require_token, Operator};
use crate::modes::{policy_for, JoinRequest};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/machines", get(list_machines_handler))
        .route("/machines/:id", get(machine_status_handler))
        .route("/ws", get(ws_handler));

    // Chat bridge routes
    let bridge_routes = Router::new()
        .route("/machines/:id/join", post(join_handler))
        .route("/machines/:id/leave", post(leave_handler))
        .route("/machines/:id/chat", post(chat_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    let operator_routes = Router::new()
        .route("/machines/:id/mode", post(mode_handler))
        .route("/machines/:id/restore", post(restore_handler))
        .route("/machines/:id/reset", post(reset_handler))
        .route("/machines/:id/eligible", post(eligible_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_operator));

    Router::new()
        .merge(public_routes)
        .merge(bridge_routes)
        .merge(operator_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn scheduler(state: &AppState, id: &str) -> Result<Arc<TurnScheduler>, AppError> {
    state
        .registry
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("Unknown machine: {}", id)))
}

// ============================================================================
// Health and status
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    machines: usize,
    connected_machines: usize,
    queued_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let statuses: Vec<MachineStatus> = state.registry.list().iter().map(|s| s.status()).collect();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        machines: statuses.len(),
        connected_machines: statuses.iter().filter(|s| s.connected).count(),
        queued_players: statuses.iter().map(|s| s.players.len()).sum(),
    })
}

async fn list_machines_handler(State(state): State<AppState>) -> Json<Vec<MachineStatus>> {
    Json(state.registry.list().iter().map(|s| s.status()).collect())
}

async fn machine_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MachineStatus>, AppError> {
    Ok(Json(scheduler(&state, &id)?.status()))
}

// ============================================================================
// Chat bridge endpoints
// ============================================================================

#[derive(Deserialize)]
struct JoinBody {
    sender: String,
    #[serde(default)]
    team: Option<String>,
}

async fn join_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinOutcome>, AppError> {
    let mut request = JoinRequest::new(body.sender);
    if let Some(team) = body.team {
        request = request.with_team(team);
    }
    Ok(Json(scheduler(&state, &id)?.join(request)?))
}

#[derive(Deserialize)]
struct LeaveBody {
    sender: String,
}

async fn leave_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LeaveBody>,
) -> Result<StatusCode, AppError> {
    scheduler(&state, &id)?.leave(&body.sender)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ChatBody {
    sender: String,
    text: String,
}

async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Submitted>, AppError> {
    if !state.chat_limiter.check(&body.sender) {
        return Err(AppError::RateLimited);
    }
    Ok(Json(
        scheduler(&state, &id)?.submit_message(&body.sender, &body.text)?,
    ))
}

// ============================================================================
// Operator endpoints
// ============================================================================

#[derive(Deserialize)]
struct ModeBody {
    mode: String,
}

async fn mode_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
    Json(body): Json<ModeBody>,
) -> Result<Json<MachineStatus>, AppError> {
    let mode: GameMode = body
        .mode
        .parse()
        .map_err(|e: crate::game::UnknownMode| AppError::BadRequest(e.to_string()))?;
    let scheduler = scheduler(&state, &id)?;

    info!(operator = %operator.name, machine = %id, %mode, "Operator switched mode");
    scheduler.set_mode(policy_for(mode));
    Ok(Json(scheduler.status()))
}

async fn restore_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
) -> Result<Json<MachineStatus>, AppError> {
    let scheduler = scheduler(&state, &id)?;

    info!(operator = %operator.name, machine = %id, "Operator restored machine");
    scheduler.restore();
    Ok(Json(scheduler.status()))
}

async fn reset_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let scheduler = scheduler(&state, &id)?;

    info!(operator = %operator.name, machine = %id, "Operator sent hardware reset");
    scheduler
        .machine()
        .reset()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct EligibleBody {
    player: String,
}

async fn eligible_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
    Json(body): Json<EligibleBody>,
) -> Result<StatusCode, AppError> {
    let scheduler = scheduler(&state, &id)?;
    if !scheduler.policy().grant_eligibility(&body.player) {
        return Err(AppError::BadRequest(format!(
            "Mode {} has no eligibility to grant",
            scheduler.mode()
        )));
    }

    info!(operator = %operator.name, machine = %id, player = %body.player, "Eligibility granted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Rejected(#[from] CommandRejected),

    #[error("Too many messages")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Rejected(reason) => rejection_status(reason),
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

fn rejection_status(reason: &CommandRejected) -> StatusCode {
    match reason {
        CommandRejected::NotYourTurn
        | CommandRejected::InputLocked
        | CommandRejected::QueueFull => StatusCode::CONFLICT,
        CommandRejected::Invalid(_) => StatusCode::BAD_REQUEST,
        CommandRejected::JoinDenied(_) => StatusCode::FORBIDDEN,
        CommandRejected::NotQueued(_) => StatusCode::NOT_FOUND,
        CommandRejected::MachineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_client_errors() {
        assert_eq!(rejection_status(&CommandRejected::NotYourTurn), StatusCode::CONFLICT);
        assert_eq!(
            rejection_status(&CommandRejected::JoinDenied("team required".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            rejection_status(&CommandRejected::MachineUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
