//! Action API for the approval workflow.
//!
//! - `POST /api/v1/entities/{kind}`               — create an approvable entity
//! - `GET  /api/v1/entities/{kind}/{id}`          — read current chain state
//! - `POST /api/v1/entities/{kind}/{id}/approve`  — record an approval
//! - `POST /api/v1/entities/{kind}/{id}/reject`   — record a rejection
//! - `POST /api/v1/memos/{id}/pay`                — mark an approved memo paid
//!
//! Every action resolves the acting user from the staff directory; the
//! request never carries a role. Refusals come back as structured errors
//! with the policy reason in the body.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use greenlight_core::domain::entity::{EntityId, EntityKind};
use greenlight_core::errors::{ActionError, WorkflowError};
use greenlight_core::policy::{PolicyAction, PolicyEngine};
use greenlight_core::workflow::{CreateEntity, StoreError, WorkflowService};
use greenlight_core::TracingAuditSink;
use greenlight_db::{DbPool, SqlApprovalStore, SqlIdentityDirectory};

use crate::bootstrap::Application;

type Service = WorkflowService<SqlIdentityDirectory, SqlApprovalStore>;

#[derive(Clone)]
pub struct ApiState {
    service: Arc<Service>,
    api_token: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub title: String,
    pub amount: Option<Decimal>,
    pub created_by: String,
    #[serde(default = "default_requires_approval")]
    pub requires_approval: bool,
}

fn default_requires_approval() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub actor_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

pub enum ApiError {
    Unauthorized,
    UnknownKind(String),
    Action(ActionError),
}

impl From<ActionError> for ApiError {
    fn from(error: ActionError) -> Self {
        Self::Action(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, retryable) = match self {
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "missing or invalid bearer token".to_string(), false)
            }
            Self::UnknownKind(raw) => {
                (StatusCode::BAD_REQUEST, format!("unknown entity kind `{raw}`"), false)
            }
            Self::Action(action_error) => {
                let retryable = action_error.is_retryable();
                (action_status(&action_error), action_error.to_string(), retryable)
            }
        };

        (status, Json(ErrorResponse { error, retryable })).into_response()
    }
}

fn action_status(error: &ActionError) -> StatusCode {
    match error {
        ActionError::EntityNotFound { .. } | ActionError::ActorNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        ActionError::Policy(
            WorkflowError::RoleNotRecognized { .. } | WorkflowError::NotApplicable { .. },
        ) => StatusCode::FORBIDDEN,
        ActionError::Policy(_) => StatusCode::BAD_REQUEST,
        ActionError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
        ActionError::Store(_) | ActionError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(app: &Application) -> Router {
    let api_token = app
        .config
        .auth
        .api_token
        .as_ref()
        .map(|token| Arc::from(token.expose_secret()));
    router_with_state(app.db_pool.clone(), api_token)
}

pub fn router_with_state(db_pool: DbPool, api_token: Option<Arc<str>>) -> Router {
    let service = WorkflowService::new(
        SqlIdentityDirectory::new(db_pool.clone()),
        SqlApprovalStore::new(db_pool),
        PolicyEngine::standard(),
        Arc::new(TracingAuditSink),
    );

    Router::new()
        .route("/api/v1/entities/{kind}", post(create_entity))
        .route("/api/v1/entities/{kind}/{id}", get(get_entity))
        .route("/api/v1/entities/{kind}/{id}/approve", post(approve_entity))
        .route("/api/v1/entities/{kind}/{id}/reject", post(reject_entity))
        .route("/api/v1/memos/{id}/pay", post(pay_memo))
        .with_state(ApiState { service: Arc::new(service), api_token })
}

fn authorize(state: &ApiState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.api_token else {
        return Ok(());
    };

    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected.as_ref() => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn parse_kind(raw: &str) -> Result<EntityKind, ApiError> {
    EntityKind::parse(raw).ok_or_else(|| ApiError::UnknownKind(raw.to_string()))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn create_entity(
    Path(kind): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateRequest>,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;
    let kind = parse_kind(&kind)?;

    let created = state
        .service
        .create(CreateEntity {
            kind,
            title: request.title,
            amount: request.amount,
            created_by: request.created_by,
            requires_approval: request.requires_approval,
        })
        .await?;

    info!(
        event_name = "api.entity.created",
        correlation_id = %correlation_id(&headers),
        entity_id = %created.id,
        kind = %created.kind,
        "entity created"
    );

    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn get_entity(
    Path((kind, id)): Path<(String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;
    let kind = parse_kind(&kind)?;

    let entity = state.service.state(kind, &EntityId(id)).await?;
    Ok(Json(entity).into_response())
}

async fn approve_entity(
    Path((kind, id)): Path<(String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Response, ApiError> {
    decide(state, headers, kind, id, request, PolicyAction::Approve).await
}

async fn reject_entity(
    Path((kind, id)): Path<(String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Response, ApiError> {
    decide(state, headers, kind, id, request, PolicyAction::Reject).await
}

async fn decide(
    state: ApiState,
    headers: HeaderMap,
    kind: String,
    id: String,
    request: ActionRequest,
    action: PolicyAction,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;
    let kind = parse_kind(&kind)?;
    let correlation = correlation_id(&headers);

    let outcome = state
        .service
        .decide(kind, &EntityId(id), &request.actor_id, action, &correlation)
        .await?;

    Ok(Json(outcome).into_response())
}

async fn pay_memo(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;
    let correlation = correlation_id(&headers);

    let outcome = state.service.pay(&EntityId(id), &request.actor_id, &correlation).await?;
    Ok(Json(outcome).into_response())
}
