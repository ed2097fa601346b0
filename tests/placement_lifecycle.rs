//! End-to-end scenarios for the placement lifecycle: the happy path from
//! authorization to active employment, a post-arrival cancellation with
//! reassignment driven through the HTTP router, and a guarantor change,
//! all exercised through the public facade only.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    use placement_ops::workflows::placement::domain::standard_document_checklist;
    use placement_ops::workflows::placement::{
        Application, ApplicationId, ApplicationStatus, ApplicationType, Candidate, CandidateId,
        CandidateStatus, ClientId, Clock, FeeComponent, FeeTemplate, FeeTemplateId,
        InMemoryPolicyStore, MemoryPlacementStore, Payment, PlacementRouterState, TenantId,
    };
    use placement_ops::workflows::placement::policy::CancellationSetting;
    use placement_ops::workflows::placement::CancellationType;

    pub struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    pub fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap(),
        ))
    }

    pub fn tenant() -> TenantId {
        TenantId("office-1".to_string())
    }

    fn template() -> FeeTemplate {
        FeeTemplate {
            id: FeeTemplateId("tpl-standard".to_string()),
            tenant_id: tenant(),
            name: "Standard placement".to_string(),
            nationality: Some("PH".to_string()),
            service_type: None,
            components: vec![
                FeeComponent {
                    name: "OfficeService".to_string(),
                    amount: dec!(1200),
                    is_refundable: true,
                    refundable_after_arrival: true,
                },
                FeeComponent {
                    name: "Ticket".to_string(),
                    amount: dec!(700),
                    is_refundable: true,
                    refundable_after_arrival: false,
                },
                FeeComponent {
                    name: "Insurance".to_string(),
                    amount: dec!(600),
                    is_refundable: false,
                    refundable_after_arrival: false,
                },
            ],
        }
    }

    fn in_country_template() -> FeeTemplate {
        FeeTemplate {
            id: FeeTemplateId("tpl-in-country".to_string()),
            tenant_id: tenant(),
            name: "In-country placement".to_string(),
            nationality: None,
            service_type: Some("guarantor_change".to_string()),
            components: vec![FeeComponent {
                name: "OfficeService".to_string(),
                amount: dec!(800),
                is_refundable: true,
                refundable_after_arrival: true,
            }],
        }
    }

    pub fn policies() -> Arc<InMemoryPolicyStore> {
        let policies = InMemoryPolicyStore::default();
        for cancellation_type in CancellationType::ALL {
            let (penalty, monthly) = match cancellation_type {
                CancellationType::PreArrivalClient => (dec!(250), dec!(0)),
                CancellationType::PreArrivalCandidate => (dec!(0), dec!(0)),
                CancellationType::PostArrivalWithin3Months => (dec!(400), dec!(150)),
                CancellationType::PostArrivalAfter3Months => (dec!(600), dec!(150)),
                CancellationType::CandidateCancellation => (dec!(200), dec!(150)),
            };
            policies
                .upsert_setting(CancellationSetting {
                    tenant_id: tenant(),
                    cancellation_type,
                    penalty_fee: penalty,
                    refund_percentage: dec!(100),
                    non_refundable_components: Default::default(),
                    monthly_service_fee: monthly,
                    max_refund_amount: None,
                    active: true,
                })
                .expect("valid setting");
        }
        policies.upsert_template(template());
        let in_country = in_country_template();
        policies.set_in_country_template(tenant(), in_country.id.clone());
        policies.upsert_template(in_country);
        Arc::new(policies)
    }

    pub fn store() -> Arc<MemoryPlacementStore> {
        let store = MemoryPlacementStore::default();
        store
            .seed_application(
                Application {
                    id: ApplicationId("app-100".to_string()),
                    tenant_id: tenant(),
                    status: ApplicationStatus::PendingAuthorization,
                    application_type: ApplicationType::NewCandidate,
                    client_id: ClientId("client-1".to_string()),
                    from_client_id: None,
                    candidate_id: CandidateId("cand-100".to_string()),
                    broker_id: Some("broker-7".to_string()),
                    fee_template_id: Some(FeeTemplateId("tpl-standard".to_string())),
                    final_fee: dec!(2500),
                    exact_arrival_date: None,
                    lawyer_service: false,
                    lawyer_fee: None,
                    created_at: Utc.with_ymd_and_hms(2024, 12, 1, 9, 0, 0).unwrap(),
                },
                standard_document_checklist(),
            )
            .expect("seed application");
        store.seed_candidate(Candidate {
            id: CandidateId("cand-100".to_string()),
            tenant_id: tenant(),
            full_name: "Rose N.".to_string(),
            nationality: Some("PH".to_string()),
            status: CandidateStatus::Reserved,
        });
        store.seed_payment(Payment {
            id: "pay-seed".to_string(),
            application_id: ApplicationId("app-100".to_string()),
            client_id: ClientId("client-1".to_string()),
            amount: dec!(2500),
            currency: "USD".to_string(),
            payment_type: "FEE".to_string(),
            refundable: true,
            recorded_at: Utc.with_ymd_and_hms(2024, 12, 2, 9, 0, 0).unwrap(),
        });
        Arc::new(store)
    }

    pub fn router_state(
        store: Arc<MemoryPlacementStore>,
    ) -> Arc<PlacementRouterState<MemoryPlacementStore, InMemoryPolicyStore>> {
        Arc::new(PlacementRouterState::new(store, policies(), clock()))
    }

    pub fn arrival() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 12).expect("valid date")
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use placement_ops::workflows::placement::{
    placement_router, ApplicationId, ApplicationStatus, CandidateId, CandidateStatus,
    CancellationRequest, CancellationType, LifecycleAction, PlacementLifecycleService,
    PlacementStore, TransitionRequest,
};

use common::{arrival, clock, policies, router_state, store, tenant};

fn transition(to_status: ApplicationStatus) -> TransitionRequest {
    TransitionRequest {
        tenant_id: tenant(),
        application_id: ApplicationId("app-100".to_string()),
        to_status,
        exact_arrival_date: (to_status == ApplicationStatus::WorkerArrived).then(arrival),
        notes: None,
        performed_by: "admin".to_string(),
    }
}

#[test]
fn full_lifecycle_from_authorization_to_contract_end() {
    let store = store();
    let service = PlacementLifecycleService::new(store.clone(), policies(), clock());

    for to_status in [
        ApplicationStatus::AuthorizationReceived,
        ApplicationStatus::VisaProcessing,
        ApplicationStatus::VisaReceived,
        ApplicationStatus::WorkerArrived,
        ApplicationStatus::LabourPermitProcessing,
        ApplicationStatus::ResidencyPermitProcessing,
        ApplicationStatus::ActiveEmployment,
        ApplicationStatus::RenewalPending,
        ApplicationStatus::ActiveEmployment,
        ApplicationStatus::ContractEnded,
    ] {
        service.transition(transition(to_status)).expect("legal move");
    }

    let application = store
        .application(&tenant(), &ApplicationId("app-100".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(application.status, ApplicationStatus::ContractEnded);
    assert_eq!(application.exact_arrival_date, Some(arrival()));

    let candidate = store
        .candidate(&tenant(), &CandidateId("cand-100".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(candidate.status, CandidateStatus::AvailableInLebanon);

    let history = store.history(&tenant()).unwrap();
    assert_eq!(history.len(), 10);
    assert!(history
        .iter()
        .all(|entry| entry.action == LifecycleAction::StatusChange));
}

#[test]
fn post_arrival_cancellation_reassigns_and_refunds() {
    let store = store();
    let service = PlacementLifecycleService::new(store.clone(), policies(), clock());
    for to_status in [
        ApplicationStatus::AuthorizationReceived,
        ApplicationStatus::VisaProcessing,
        ApplicationStatus::VisaReceived,
        ApplicationStatus::WorkerArrived,
        ApplicationStatus::LabourPermitProcessing,
        ApplicationStatus::ResidencyPermitProcessing,
        ApplicationStatus::ActiveEmployment,
    ] {
        service.transition(transition(to_status)).expect("legal move");
    }

    let outcome = service
        .cancel(CancellationRequest {
            tenant_id: tenant(),
            application_id: ApplicationId("app-100".to_string()),
            cancellation_type: CancellationType::PostArrivalWithin3Months,
            reason: Some("household dispute".to_string()),
            notes: None,
            custom_refund_amount: None,
            penalty_fee_override: None,
            months_since_arrival: None,
            candidate_in_lebanon: None,
            candidate_departed: false,
            new_client_id: Some(placement_ops::workflows::placement::ClientId(
                "client-2".to_string(),
            )),
            deport_candidate: false,
            performed_by: "admin".to_string(),
        })
        .expect("cancellation succeeds");

    // Arrival 2025-01-12, clock 2025-02-05: 24 days, one elapsed month.
    // Refundable is OfficeService 1200 (the ticket stops being refundable
    // after arrival); 1200 - 400 penalty - 150 monthly.
    assert_eq!(outcome.refund.months_since_arrival, 1);
    assert_eq!(outcome.refund.final_refund, dec!(650));

    let replacement = outcome.reassignment.expect("replacement application");
    assert_eq!(replacement.status, ApplicationStatus::PendingAuthorization);
    // Priced from the in-country template.
    assert_eq!(replacement.final_fee, dec!(800));

    let candidate = store
        .candidate(&tenant(), &CandidateId("cand-100".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(candidate.status, CandidateStatus::InProcess);

    let payments = store
        .payments(&tenant(), &ApplicationId("app-100".to_string()))
        .unwrap();
    assert!(payments.iter().any(|payment| payment.amount == dec!(-650)));
}

#[tokio::test]
async fn cancellation_over_http_round_trips_the_breakdown() {
    let store = store();
    let service = PlacementLifecycleService::new(store.clone(), policies(), clock());
    service
        .transition(transition(ApplicationStatus::AuthorizationReceived))
        .expect("legal move");

    let router = placement_router(router_state(store.clone()));
    let response = router
        .oneshot(
            Request::post("/api/v1/placement/applications/app-100/cancel")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "tenant_id": "office-1",
                        "cancellation_type": "pre_arrival_client",
                        "reason": "client withdrew",
                        "performed_by": "admin",
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["application"]["status"], "cancelled_pre_arrival");
    // OfficeService 1200 + Ticket 700 refundable, minus the 250 penalty.
    assert_eq!(payload["refund"]["final_refund"], json!(dec!(1650)));

    let candidate = store
        .candidate(&tenant(), &CandidateId("cand-100".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(candidate.status, CandidateStatus::AvailableAbroad);
}
