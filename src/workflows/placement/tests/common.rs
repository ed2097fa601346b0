use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::workflows::placement::domain::{
    payment_type, standard_document_checklist, Application, ApplicationId, ApplicationStatus,
    ApplicationType, Candidate, CandidateId, CandidateStatus, ClientId, Clock, FeeComponent,
    FeeTemplate, FeeTemplateId, Payment, TenantId,
};
use crate::workflows::placement::guarantor::GuarantorChangeService;
use crate::workflows::placement::memory::MemoryPlacementStore;
use crate::workflows::placement::policy::{
    CancellationSetting, CancellationType, InMemoryPolicyStore,
};
use crate::workflows::placement::service::PlacementLifecycleService;
use crate::workflows::placement::state;

/// Clock pinned to a fixed instant.
pub(super) struct FixedClock(pub(super) DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(super) fn tenant() -> TenantId {
    TenantId("office-1".to_string())
}

pub(super) fn arrival_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).expect("valid date")
}

/// 2025-02-05: 26 days after arrival, one elapsed month, inside probation.
pub(super) fn within_probation_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2025, 2, 5, 12, 0, 0).unwrap(),
    ))
}

/// 2025-05-20: 130 days after arrival, five elapsed months, past probation.
pub(super) fn after_probation_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap(),
    ))
}

pub(super) fn fee_template() -> FeeTemplate {
    FeeTemplate {
        id: FeeTemplateId("tpl-standard".to_string()),
        tenant_id: tenant(),
        name: "Standard placement".to_string(),
        nationality: None,
        service_type: None,
        components: vec![
            component("OfficeService", dec!(800), true, true),
            component("Insurance", dec!(300), false, false),
            component("Ticket", dec!(600), true, false),
            component("GovFees", dec!(400), false, false),
            component("Medical", dec!(200), false, false),
            component("Processing", dec!(200), true, true),
        ],
    }
}

pub(super) fn in_country_template() -> FeeTemplate {
    FeeTemplate {
        id: FeeTemplateId("tpl-in-country".to_string()),
        tenant_id: tenant(),
        name: "In-country placement".to_string(),
        nationality: None,
        service_type: Some("guarantor_change".to_string()),
        components: vec![
            component("OfficeService", dec!(500), true, true),
            component("Processing", dec!(150), true, true),
        ],
    }
}

pub(super) fn component(
    name: &str,
    amount: Decimal,
    is_refundable: bool,
    refundable_after_arrival: bool,
) -> FeeComponent {
    FeeComponent {
        name: name.to_string(),
        amount,
        is_refundable,
        refundable_after_arrival,
    }
}

pub(super) fn setting(
    cancellation_type: CancellationType,
    penalty_fee: Decimal,
    refund_percentage: Decimal,
    monthly_service_fee: Decimal,
) -> CancellationSetting {
    CancellationSetting {
        tenant_id: tenant(),
        cancellation_type,
        penalty_fee,
        refund_percentage,
        non_refundable_components: BTreeSet::new(),
        monthly_service_fee,
        max_refund_amount: None,
        active: true,
    }
}

pub(super) fn application(id: &str, status: ApplicationStatus) -> Application {
    let arrived = !matches!(
        status,
        ApplicationStatus::PendingAuthorization
            | ApplicationStatus::AuthorizationReceived
            | ApplicationStatus::VisaProcessing
            | ApplicationStatus::VisaReceived
    );
    Application {
        id: ApplicationId(id.to_string()),
        tenant_id: tenant(),
        status,
        application_type: ApplicationType::NewCandidate,
        client_id: ClientId("client-1".to_string()),
        from_client_id: None,
        candidate_id: CandidateId("cand-1".to_string()),
        broker_id: None,
        fee_template_id: Some(FeeTemplateId("tpl-standard".to_string())),
        final_fee: dec!(2500),
        exact_arrival_date: arrived.then(arrival_date),
        lawyer_service: false,
        lawyer_fee: None,
        created_at: Utc.with_ymd_and_hms(2024, 12, 1, 9, 0, 0).unwrap(),
    }
}

pub(super) fn candidate(status: CandidateStatus) -> Candidate {
    Candidate {
        id: CandidateId("cand-1".to_string()),
        tenant_id: tenant(),
        full_name: "Amal H.".to_string(),
        nationality: Some("PH".to_string()),
        status,
    }
}

pub(super) fn fee_payment(application_id: &str, amount: Decimal) -> Payment {
    payment(application_id, amount, payment_type::FEE)
}

pub(super) fn payment(application_id: &str, amount: Decimal, kind: &str) -> Payment {
    Payment {
        id: format!("seed-{kind}-{amount}"),
        application_id: ApplicationId(application_id.to_string()),
        client_id: ClientId("client-1".to_string()),
        amount,
        currency: "USD".to_string(),
        payment_type: kind.to_string(),
        refundable: kind != payment_type::INSURANCE,
        recorded_at: Utc.with_ymd_and_hms(2024, 12, 2, 9, 0, 0).unwrap(),
    }
}

/// Policy store with active settings for every cancellation type and both
/// fee templates registered.
pub(super) fn policy_store() -> Arc<InMemoryPolicyStore> {
    let policies = InMemoryPolicyStore::default();
    policies
        .upsert_setting(setting(
            CancellationType::PreArrivalClient,
            dec!(200),
            dec!(100),
            Decimal::ZERO,
        ))
        .expect("valid setting");
    policies
        .upsert_setting(setting(
            CancellationType::PreArrivalCandidate,
            Decimal::ZERO,
            dec!(100),
            Decimal::ZERO,
        ))
        .expect("valid setting");
    policies
        .upsert_setting(setting(
            CancellationType::PostArrivalWithin3Months,
            dec!(300),
            dec!(100),
            dec!(100),
        ))
        .expect("valid setting");
    policies
        .upsert_setting(setting(
            CancellationType::PostArrivalAfter3Months,
            dec!(500),
            dec!(50),
            dec!(100),
        ))
        .expect("valid setting");
    policies
        .upsert_setting(setting(
            CancellationType::CandidateCancellation,
            dec!(100),
            dec!(100),
            dec!(100),
        ))
        .expect("valid setting");
    let template = fee_template();
    policies.upsert_template(template);
    let in_country = in_country_template();
    policies.set_in_country_template(tenant(), in_country.id.clone());
    policies.upsert_template(in_country);
    Arc::new(policies)
}

/// Store seeded with one application in `status`, its candidate, and a
/// single 2500 fee payment.
pub(super) fn seeded_store(status: ApplicationStatus) -> Arc<MemoryPlacementStore> {
    let store = MemoryPlacementStore::default();
    store
        .seed_application(application("app-1", status), standard_document_checklist())
        .expect("seed application");
    store.seed_candidate(candidate(match status {
        ApplicationStatus::ActiveEmployment => CandidateStatus::Placed,
        s if state::is_pre_arrival(s) => CandidateStatus::Reserved,
        _ => CandidateStatus::InProcess,
    }));
    store.seed_payment(fee_payment("app-1", dec!(2500)));
    Arc::new(store)
}

pub(super) fn lifecycle_service(
    store: Arc<MemoryPlacementStore>,
    clock: Arc<FixedClock>,
) -> PlacementLifecycleService<MemoryPlacementStore, InMemoryPolicyStore> {
    PlacementLifecycleService::new(store, policy_store(), clock)
}

pub(super) fn guarantor_service(
    store: Arc<MemoryPlacementStore>,
    clock: Arc<FixedClock>,
) -> GuarantorChangeService<MemoryPlacementStore, InMemoryPolicyStore> {
    GuarantorChangeService::new(store, policy_store(), clock)
}
