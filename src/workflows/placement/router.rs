use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ApplicationId, ApplicationStatus, CandidateId, ClientId, Clock, FeeTemplateId,
    GuarantorChangeId, TenantId,
};
use super::guarantor::{CandidateSituation, GuarantorChangeService, InitiateGuarantorChangeRequest};
use super::history::HistoryRecorder;
use super::policy::{CancellationType, PolicyStore};
use super::repository::PlacementStore;
use super::service::{
    CancellationRequest, PlacementError, PlacementLifecycleService, TransitionRequest,
};

/// Shared state for the placement routes.
pub struct PlacementRouterState<S, P> {
    pub lifecycle: PlacementLifecycleService<S, P>,
    pub guarantor: GuarantorChangeService<S, P>,
    pub history: HistoryRecorder<S>,
}

impl<S, P> PlacementRouterState<S, P>
where
    S: PlacementStore,
    P: PolicyStore,
{
    pub fn new(store: Arc<S>, policies: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        Self {
            lifecycle: PlacementLifecycleService::new(
                store.clone(),
                policies.clone(),
                clock.clone(),
            ),
            guarantor: GuarantorChangeService::new(store.clone(), policies, clock),
            history: HistoryRecorder::new(store),
        }
    }
}

/// Router builder exposing the lifecycle, cancellation, history, and
/// guarantor-change endpoints.
pub fn placement_router<S, P>(state: Arc<PlacementRouterState<S, P>>) -> Router
where
    S: PlacementStore + 'static,
    P: PolicyStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/placement/applications/:application_id/transition",
            post(transition_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/cancellation-options",
            get(options_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/cancel",
            post(cancel_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/history",
            get(application_history_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/applications/:application_id/history/summary",
            get(history_summary_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/candidates/:candidate_id/history",
            get(candidate_history_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/clients/:client_id/history",
            get(client_history_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/history/stats",
            get(history_stats_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/guarantor-changes",
            post(initiate_guarantor_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/guarantor-changes/:change_id/finalize",
            post(finalize_guarantor_handler::<S, P>),
        )
        .route(
            "/api/v1/placement/guarantor-changes/:change_id/refund",
            post(process_refund_handler::<S, P>),
        )
        .with_state(state)
}

pub(crate) fn error_response(error: PlacementError) -> Response {
    let status = match &error {
        PlacementError::NotFound => StatusCode::NOT_FOUND,
        PlacementError::InvalidTransition { .. }
        | PlacementError::MissingPrecondition(_)
        | PlacementError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PlacementError::Conflict | PlacementError::AlreadyProcessed => StatusCode::CONFLICT,
        PlacementError::Policy(_) | PlacementError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = match &error {
        PlacementError::InvalidTransition { valid_next, .. } => json!({
            "error": error.to_string(),
            "valid_next_states": valid_next,
        }),
        _ => json!({ "error": error.to_string() }),
    };
    (status, Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    tenant_id: String,
    to_status: ApplicationStatus,
    exact_arrival_date: Option<NaiveDate>,
    notes: Option<String>,
    performed_by: String,
}

async fn transition_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(application_id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let request = TransitionRequest {
        tenant_id: TenantId(body.tenant_id),
        application_id: ApplicationId(application_id),
        to_status: body.to_status,
        exact_arrival_date: body.exact_arrival_date,
        notes: body.notes,
        performed_by: body.performed_by,
    };
    match state.lifecycle.transition(request) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct TenantQuery {
    tenant_id: String,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    per_page: Option<usize>,
}

async fn options_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(application_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let tenant = TenantId(query.tenant_id);
    match state
        .lifecycle
        .cancellation_options(&tenant, &ApplicationId(application_id))
    {
        Ok(options) => (StatusCode::OK, Json(options)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct CancelBody {
    tenant_id: String,
    /// Parsed via `FromStr` so the retired `post_arrival` alias is rejected
    /// with a descriptive error.
    cancellation_type: String,
    reason: Option<String>,
    notes: Option<String>,
    custom_refund_amount: Option<Decimal>,
    penalty_fee_override: Option<Decimal>,
    months_since_arrival: Option<u32>,
    candidate_in_lebanon: Option<bool>,
    #[serde(default)]
    candidate_departed: bool,
    new_client_id: Option<String>,
    #[serde(default)]
    deport_candidate: bool,
    performed_by: String,
}

async fn cancel_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(application_id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let cancellation_type = match CancellationType::from_str(&body.cancellation_type) {
        Ok(value) => value,
        Err(error) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response()
        }
    };
    let request = CancellationRequest {
        tenant_id: TenantId(body.tenant_id),
        application_id: ApplicationId(application_id),
        cancellation_type,
        reason: body.reason,
        notes: body.notes,
        custom_refund_amount: body.custom_refund_amount,
        penalty_fee_override: body.penalty_fee_override,
        months_since_arrival: body.months_since_arrival,
        candidate_in_lebanon: body.candidate_in_lebanon,
        candidate_departed: body.candidate_departed,
        new_client_id: body.new_client_id.map(ClientId),
        deport_candidate: body.deport_candidate,
        performed_by: body.performed_by,
    };
    match state.lifecycle.cancel(request) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn application_history_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(application_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let tenant = TenantId(query.tenant_id);
    match state.history.application_history(
        &tenant,
        &ApplicationId(application_id),
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(20),
    ) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error_response(error.into()),
    }
}

async fn history_summary_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(application_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let tenant = TenantId(query.tenant_id);
    match state
        .history
        .summary(&tenant, &ApplicationId(application_id))
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error.into()),
    }
}

async fn candidate_history_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(candidate_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let tenant = TenantId(query.tenant_id);
    match state.history.candidate_history(
        &tenant,
        &CandidateId(candidate_id),
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(20),
    ) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error_response(error.into()),
    }
}

async fn client_history_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(client_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let tenant = TenantId(query.tenant_id);
    match state.history.client_history(
        &tenant,
        &ClientId(client_id),
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(20),
    ) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error_response(error.into()),
    }
}

async fn history_stats_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Query(query): Query<TenantQuery>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let tenant = TenantId(query.tenant_id);
    match state.history.tenant_stats(&tenant) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => error_response(error.into()),
    }
}

#[derive(Debug, Deserialize)]
struct InitiateGuarantorBody {
    tenant_id: String,
    application_id: String,
    to_client_id: Option<String>,
    candidate_situation: CandidateSituation,
    reason: Option<String>,
    notes: Option<String>,
    performed_by: String,
}

async fn initiate_guarantor_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Json(body): Json<InitiateGuarantorBody>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    let request = InitiateGuarantorChangeRequest {
        tenant_id: TenantId(body.tenant_id),
        application_id: ApplicationId(body.application_id),
        to_client_id: body.to_client_id.map(ClientId),
        candidate_situation: body.candidate_situation,
        reason: body.reason,
        notes: body.notes,
        performed_by: body.performed_by,
    };
    match state.guarantor.initiate(request) {
        Ok(change) => (StatusCode::CREATED, Json(change)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct FinalizeGuarantorBody {
    tenant_id: String,
    to_client_id: String,
    fee_template_id: Option<String>,
    performed_by: String,
}

async fn finalize_guarantor_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(change_id): Path<String>,
    Json(body): Json<FinalizeGuarantorBody>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    match state.guarantor.finalize(
        &TenantId(body.tenant_id),
        &GuarantorChangeId(change_id),
        ClientId(body.to_client_id),
        body.fee_template_id.map(FeeTemplateId),
        &body.performed_by,
    ) {
        Ok((change, replacement)) => (
            StatusCode::OK,
            Json(json!({ "change": change, "replacement": replacement })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct ProcessRefundBody {
    tenant_id: String,
    performed_by: String,
}

async fn process_refund_handler<S, P>(
    State(state): State<Arc<PlacementRouterState<S, P>>>,
    Path(change_id): Path<String>,
    Json(body): Json<ProcessRefundBody>,
) -> Response
where
    S: PlacementStore,
    P: PolicyStore,
{
    match state.guarantor.process_refund(
        &TenantId(body.tenant_id),
        &GuarantorChangeId(change_id),
        &body.performed_by,
    ) {
        Ok(change) => (StatusCode::OK, Json(change)).into_response(),
        Err(error) => error_response(error),
    }
}
