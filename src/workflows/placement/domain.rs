use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for recruitment offices (tenants).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Identifier wrapper for placement applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for candidates (workers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Identifier wrapper for client households / employers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

/// Identifier wrapper for fee templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeeTemplateId(pub String);

/// Identifier wrapper for guarantor-change records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuarantorChangeId(pub String);

/// Lifecycle state of a placement application.
///
/// The happy path runs authorization through active employment; the three
/// cancelled variants and `ContractEnded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    PendingAuthorization,
    AuthorizationReceived,
    VisaProcessing,
    VisaReceived,
    WorkerArrived,
    LabourPermitProcessing,
    ResidencyPermitProcessing,
    ActiveEmployment,
    RenewalPending,
    ContractEnded,
    CancelledPreArrival,
    CancelledPostArrival,
    CancelledByCandidate,
}

impl ApplicationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PendingAuthorization => "pending_authorization",
            Self::AuthorizationReceived => "authorization_received",
            Self::VisaProcessing => "visa_processing",
            Self::VisaReceived => "visa_received",
            Self::WorkerArrived => "worker_arrived",
            Self::LabourPermitProcessing => "labour_permit_processing",
            Self::ResidencyPermitProcessing => "residency_permit_processing",
            Self::ActiveEmployment => "active_employment",
            Self::RenewalPending => "renewal_pending",
            Self::ContractEnded => "contract_ended",
            Self::CancelledPreArrival => "cancelled_pre_arrival",
            Self::CancelledPostArrival => "cancelled_post_arrival",
            Self::CancelledByCandidate => "cancelled_by_candidate",
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How the application came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// Fresh placement of a candidate recruited abroad.
    NewCandidate,
    /// Reassignment of an already-placed candidate to a new employer.
    GuarantorChange,
}

/// Candidate availability, always derived from application transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    AvailableAbroad,
    AvailableInLebanon,
    Reserved,
    InProcess,
    Placed,
}

impl CandidateStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AvailableAbroad => "available_abroad",
            Self::AvailableInLebanon => "available_in_lebanon",
            Self::Reserved => "reserved",
            Self::InProcess => "in_process",
            Self::Placed => "placed",
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One placement attempt for one candidate with one sponsoring client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub tenant_id: TenantId,
    pub status: ApplicationStatus,
    pub application_type: ApplicationType,
    pub client_id: ClientId,
    /// Prior sponsor, populated only on guarantor-change applications.
    pub from_client_id: Option<ClientId>,
    pub candidate_id: CandidateId,
    pub broker_id: Option<String>,
    pub fee_template_id: Option<FeeTemplateId>,
    pub final_fee: Decimal,
    pub exact_arrival_date: Option<NaiveDate>,
    pub lawyer_service: bool,
    pub lawyer_fee: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// The worker being placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub tenant_id: TenantId,
    pub full_name: String,
    pub nationality: Option<String>,
    pub status: CandidateStatus,
}

/// Well-known payment type tags. The field itself stays free-form.
pub mod payment_type {
    pub const FEE: &str = "FEE";
    pub const INSURANCE: &str = "INSURANCE";
    pub const VISA: &str = "VISA";
    pub const REFUND: &str = "REFUND";
}

/// Monetary receipt against an application. Append-only; a refund is a new
/// negative-amount row, never a mutation of a prior payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub application_id: ApplicationId,
    pub client_id: ClientId,
    pub amount: Decimal,
    pub currency: String,
    pub payment_type: String,
    pub refundable: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Office-incurred expense, tracked independently of client payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub id: String,
    pub application_id: ApplicationId,
    pub candidate_id: Option<CandidateId>,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

/// Named, independently refundable line item inside a fee template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeComponent {
    pub name: String,
    pub amount: Decimal,
    pub is_refundable: bool,
    /// Whether this component stays refundable once the worker has arrived.
    pub refundable_after_arrival: bool,
}

/// Pricing template optionally scoped by nationality or service type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeTemplate {
    pub id: FeeTemplateId,
    pub tenant_id: TenantId,
    pub name: String,
    pub nationality: Option<String>,
    pub service_type: Option<String>,
    pub components: Vec<FeeComponent>,
}

impl FeeTemplate {
    pub fn total(&self) -> Decimal {
        self.components.iter().map(|c| c.amount).sum()
    }
}

/// One paperwork item on an application's checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChecklistItem {
    pub name: String,
    pub completed: bool,
}

/// Standard paperwork expected of every application.
pub fn standard_document_checklist() -> Vec<DocumentChecklistItem> {
    [
        "passport_copy",
        "medical_certificate",
        "work_authorization",
        "entry_visa",
        "labour_permit",
        "residency_permit",
    ]
    .into_iter()
    .map(|name| DocumentChecklistItem {
        name: name.to_string(),
        completed: false,
    })
    .collect()
}

/// Paperwork that survives an employer reassignment: documents tied to the
/// candidate, not the sponsoring client.
pub fn reusable_document_names() -> &'static [&'static str] {
    &["passport_copy", "medical_certificate"]
}

/// Employer reassignment event with its refund bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuarantorChange {
    pub id: GuarantorChangeId,
    pub tenant_id: TenantId,
    pub original_application_id: ApplicationId,
    pub new_application_id: Option<ApplicationId>,
    pub from_client_id: ClientId,
    pub to_client_id: Option<ClientId>,
    pub candidate_id: CandidateId,
    pub refund_amount: Decimal,
    pub refund_currency: String,
    pub refund_processed: bool,
    pub refund_processed_at: Option<DateTime<Utc>>,
    pub candidate_status_before: CandidateStatus,
    pub candidate_status_after: CandidateStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Injectable time source so probation-window math is deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time for the running service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
