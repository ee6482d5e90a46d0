//! REST surface for the workflow engine. Handlers are thin: fetch the
//! snapshot and history, run the pure engine, commit through the store,
//! broadcast the change. All policy lives in `workflow`.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::store::{ClosePolicy, InMemoryTicketStore, StatusClosePolicy, TicketRecord, TicketStore};
use crate::workflow::{
    allowed_actions, canonicalize, execute, project, Actor, CanonicalHistory, NewTicket,
    ResolveContext, Role, Stepper, Ticket, TicketStatus, TransitionRequest, WorkflowAction,
    WorkflowError,
};

/// Emitted on the broadcast channel after every committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketChanged {
    pub ticket_id: Uuid,
    pub status: TicketStatus,
}

pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub close_policy: Arc<dyn ClosePolicy>,
    pub changes: broadcast::Sender<TicketChanged>,
}

impl AppState {
    pub fn new(store: Arc<dyn TicketStore>, close_policy: Arc<dyn ClosePolicy>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            store,
            close_policy,
            changes,
        }
    }

    /// In-memory store with the default close policy.
    pub fn with_defaults() -> Self {
        Self::new(
            InMemoryTicketStore::shared(),
            Arc::new(StatusClosePolicy::default()),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub creator: Actor,
    #[serde(flatten)]
    pub ticket: NewTicket,
}

#[derive(Debug, Deserialize)]
pub struct ActionsQuery {
    pub user_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub unit_section: Option<String>,
    #[serde(default)]
    pub pending_forward_unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionPayload {
    pub actor: Actor,
    pub expected_version: u64,
    pub request: TransitionRequest,
    #[serde(default)]
    pub attachment_path: Option<String>,
    #[serde(default)]
    pub pending_forward_unit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub ticket: Ticket,
    pub version: u64,
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<TicketRecord>, WorkflowError> {
    let record = state.store.create(req.ticket, &req.creator).await?;
    info!(
        ticket = %record.ticket.ticket_id,
        category = %record.ticket.category,
        "ticket created"
    );
    Ok(Json(record))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Ticket>>, WorkflowError> {
    Ok(Json(state.store.list().await?))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketRecord>, WorkflowError> {
    Ok(Json(state.store.get(id).await?))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CanonicalHistory>, WorkflowError> {
    let events = state.store.history(id).await?;
    Ok(Json(canonicalize(&events)))
}

pub async fn get_stepper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Stepper>, WorkflowError> {
    let record = state.store.get(id).await?;
    let history = canonicalize(&state.store.history(id).await?);
    Ok(Json(project(&record.ticket, &history)))
}

pub async fn get_actions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActionsQuery>,
) -> Result<Json<BTreeSet<WorkflowAction>>, WorkflowError> {
    let record = state.store.get(id).await?;
    let history = canonicalize(&state.store.history(id).await?);
    let actor = Actor {
        id: query.user_id,
        role: query.role,
        name: None,
        unit_section: query.unit_section,
    };
    let ctx = ResolveContext {
        oracle_can_close: state
            .close_policy
            .can_close_at_current_step(&record.ticket)
            .await,
        pending_forward_unit: query.pending_forward_unit,
    };
    Ok(Json(allowed_actions(
        &record.ticket,
        &actor,
        &history,
        &ctx,
    )))
}

pub async fn apply_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionPayload>,
) -> Result<Json<TransitionResponse>, WorkflowError> {
    let record = state.store.get(id).await?;
    let history = canonicalize(&state.store.history(id).await?);
    let ctx = ResolveContext {
        oracle_can_close: state
            .close_policy
            .can_close_at_current_step(&record.ticket)
            .await,
        pending_forward_unit: payload.pending_forward_unit,
    };

    let action = payload.request.action();
    let outcome = execute(
        &record.ticket,
        &payload.actor,
        &history,
        payload.request,
        payload.attachment_path,
        &ctx,
    )?;

    let committed = state
        .store
        .apply_transition(id, payload.expected_version, outcome)
        .await?;

    info!(
        ticket = %committed.ticket.ticket_id,
        action = %action,
        actor = %payload.actor.role,
        status = %committed.ticket.status,
        "transition applied"
    );
    // Refresh hint for dashboards; delivery is best-effort.
    let _ = state.changes.send(TicketChanged {
        ticket_id: committed.ticket.id,
        status: committed.ticket.status,
    });

    Ok(Json(TransitionResponse {
        ticket: committed.ticket,
        version: committed.version,
    }))
}

pub fn configure_workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/history", get(get_history))
        .route("/api/tickets/:id/stepper", get(get_stepper))
        .route("/api/tickets/:id/actions", get(get_actions))
        .route("/api/tickets/:id/transition", post(apply_transition))
}
