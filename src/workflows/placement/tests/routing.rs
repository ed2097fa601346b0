use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::placement::domain::ApplicationStatus;
use crate::workflows::placement::memory::MemoryPlacementStore;
use crate::workflows::placement::policy::InMemoryPolicyStore;
use crate::workflows::placement::router::{error_response, placement_router, PlacementRouterState};
use crate::workflows::placement::service::PlacementError;

use super::common::{policy_store, seeded_store, within_probation_clock};

fn router_for(status: ApplicationStatus) -> Router {
    let store = seeded_store(status);
    let state: Arc<PlacementRouterState<MemoryPlacementStore, InMemoryPolicyStore>> = Arc::new(
        PlacementRouterState::new(store, policy_store(), within_probation_clock()),
    );
    placement_router(state)
}

fn post_json(uri: &str, payload: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(payload).unwrap()))
        .unwrap()
}

async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[tokio::test]
async fn transition_route_advances_the_application() {
    let router = router_for(ApplicationStatus::PendingAuthorization);
    let response = router
        .oneshot(post_json(
            "/api/v1/placement/applications/app-1/transition",
            &json!({
                "tenant_id": "office-1",
                "to_status": "authorization_received",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "authorization_received");
}

#[tokio::test]
async fn invalid_transition_returns_the_legal_next_states() {
    let router = router_for(ApplicationStatus::PendingAuthorization);
    let response = router
        .oneshot(post_json(
            "/api/v1/placement/applications/app-1/transition",
            &json!({
                "tenant_id": "office-1",
                "to_status": "active_employment",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    let valid_next = payload["valid_next_states"]
        .as_array()
        .expect("valid_next_states array");
    assert!(valid_next.contains(&json!("authorization_received")));
}

#[tokio::test]
async fn unknown_applications_return_not_found() {
    let router = router_for(ApplicationStatus::PendingAuthorization);
    let response = router
        .oneshot(post_json(
            "/api/v1/placement/applications/ghost/transition",
            &json!({
                "tenant_id": "office-1",
                "to_status": "authorization_received",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_route_returns_the_refund_breakdown() {
    let router = router_for(ApplicationStatus::VisaProcessing);
    let response = router
        .oneshot(post_json(
            "/api/v1/placement/applications/app-1/cancel",
            &json!({
                "tenant_id": "office-1",
                "cancellation_type": "pre_arrival_client",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["application"]["status"], "cancelled_pre_arrival");
    assert_eq!(
        payload["refund"]["final_refund"],
        json!(dec!(1400))
    );
}

#[tokio::test]
async fn retired_cancellation_alias_is_rejected_with_guidance() {
    let router = router_for(ApplicationStatus::ActiveEmployment);
    let response = router
        .oneshot(post_json(
            "/api/v1/placement/applications/app-1/cancel",
            &json!({
                "tenant_id": "office-1",
                "cancellation_type": "post_arrival",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    let message = payload["error"].as_str().unwrap();
    assert!(message.contains("post_arrival_within_3_months"));
}

#[tokio::test]
async fn unknown_cancellation_types_are_rejected() {
    let router = router_for(ApplicationStatus::ActiveEmployment);
    let response = router
        .oneshot(post_json(
            "/api/v1/placement/applications/app-1/cancel",
            &json!({
                "tenant_id": "office-1",
                "cancellation_type": "whatever",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn concurrent_modification_maps_to_http_conflict() {
    let response = error_response(PlacementError::Conflict);
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn options_route_lists_available_types() {
    let router = router_for(ApplicationStatus::VisaProcessing);
    let response = router
        .oneshot(
            Request::get(
                "/api/v1/placement/applications/app-1/cancellation-options?tenant_id=office-1",
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["can_cancel"], json!(true));
    assert_eq!(
        payload["available_types"],
        json!(["pre_arrival_client", "pre_arrival_candidate"])
    );
}

#[tokio::test]
async fn history_route_pages_audit_rows() {
    let router = router_for(ApplicationStatus::PendingAuthorization);
    let transition = router
        .clone()
        .oneshot(post_json(
            "/api/v1/placement/applications/app-1/transition",
            &json!({
                "tenant_id": "office-1",
                "to_status": "authorization_received",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(transition.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::get(
                "/api/v1/placement/applications/app-1/history?tenant_id=office-1&page=1&per_page=5",
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], json!(1));
    assert_eq!(payload["entries"][0]["action"], "status_change");
}

#[tokio::test]
async fn guarantor_routes_cover_the_full_flow() {
    let router = router_for(ApplicationStatus::ActiveEmployment);
    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/placement/guarantor-changes",
            &json!({
                "tenant_id": "office-1",
                "application_id": "app-1",
                "candidate_situation": "in_country_under_3_months",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let change = read_json_body(response).await;
    let change_id = change["id"].as_str().unwrap().to_string();

    let refund = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/placement/guarantor-changes/{change_id}/refund"),
            &json!({ "tenant_id": "office-1", "performed_by": "accountant" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(refund.status(), StatusCode::OK);

    let again = router
        .oneshot(post_json(
            &format!("/api/v1/placement/guarantor-changes/{change_id}/refund"),
            &json!({ "tenant_id": "office-1", "performed_by": "accountant" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stats_route_reports_tenant_totals() {
    let router = router_for(ApplicationStatus::ActiveEmployment);
    let cancel = router
        .clone()
        .oneshot(post_json(
            "/api/v1/placement/applications/app-1/cancel",
            &json!({
                "tenant_id": "office-1",
                "cancellation_type": "candidate_cancellation",
                "performed_by": "admin",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(cancel.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::get("/api/v1/placement/history/stats?tenant_id=office-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total_entries"], json!(2));
    assert_eq!(payload["by_action"]["cancellation"], json!(1));
}
