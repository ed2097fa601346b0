//! Storage abstraction so the orchestrators can be exercised in isolation.
//!
//! `PlacementStore` covers non-transactional reads and opens transactions;
//! `PlacementTx` is the explicit unit of work every orchestrator method runs
//! its writes through. Dropping a transaction without `commit` discards it.

use std::sync::atomic::{AtomicU64, Ordering};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Candidate, CandidateId, CandidateStatus,
    ClientId, Cost, DocumentChecklistItem, GuarantorChange, GuarantorChangeId, Payment, TenantId,
};
use super::history::LifecycleEntry;

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Another writer changed the row since it was read.
    #[error("concurrent modification detected; re-read the application and retry")]
    Conflict,
    #[error("record not found")]
    NotFound,
    /// The one-active-application-per-candidate constraint was violated.
    #[error("candidate {} already has an active application", .0 .0)]
    ActiveApplicationExists(CandidateId),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Sequential identifiers for rows created by the orchestrators.
pub(crate) fn next_id(prefix: &str) -> String {
    let id = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

/// Read-side store handle. Advisory reads served from here are non-binding;
/// anything that writes goes through [`PlacementTx`].
pub trait PlacementStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn PlacementTx + '_>, RepositoryError>;

    fn application(
        &self,
        tenant: &TenantId,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;

    fn candidate(
        &self,
        tenant: &TenantId,
        id: &CandidateId,
    ) -> Result<Option<Candidate>, RepositoryError>;

    fn payments(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Payment>, RepositoryError>;

    fn costs(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Cost>, RepositoryError>;

    fn document_checklist(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<DocumentChecklistItem>, RepositoryError>;

    fn applications_for_candidate(
        &self,
        tenant: &TenantId,
        candidate: &CandidateId,
    ) -> Result<Vec<Application>, RepositoryError>;

    /// Applications where the client is the current or the prior sponsor.
    fn applications_for_client(
        &self,
        tenant: &TenantId,
        client: &ClientId,
    ) -> Result<Vec<Application>, RepositoryError>;

    fn guarantor_change(
        &self,
        tenant: &TenantId,
        id: &GuarantorChangeId,
    ) -> Result<Option<GuarantorChange>, RepositoryError>;

    /// All audit rows for the tenant; the history recorder filters and pages.
    fn history(&self, tenant: &TenantId) -> Result<Vec<LifecycleEntry>, RepositoryError>;
}

/// One atomic unit of work. Writes land together on `commit` or not at all.
pub trait PlacementTx {
    /// Reads the application with the row held for the rest of the
    /// transaction (serializes concurrent writers against the same row).
    fn application_for_update(
        &mut self,
        tenant: &TenantId,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;

    fn candidate(
        &mut self,
        tenant: &TenantId,
        id: &CandidateId,
    ) -> Result<Option<Candidate>, RepositoryError>;

    fn payments(
        &mut self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Payment>, RepositoryError>;

    fn costs(
        &mut self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Cost>, RepositoryError>;

    fn guarantor_change_for_update(
        &mut self,
        tenant: &TenantId,
        id: &GuarantorChangeId,
    ) -> Result<Option<GuarantorChange>, RepositoryError>;

    /// Optimistic status write: fails with [`RepositoryError::Conflict`] when
    /// the stored status no longer matches `expected`.
    fn update_application_status(
        &mut self,
        tenant: &TenantId,
        id: &ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
    ) -> Result<Application, RepositoryError>;

    fn set_exact_arrival_date(
        &mut self,
        tenant: &TenantId,
        id: &ApplicationId,
        arrival: chrono::NaiveDate,
    ) -> Result<(), RepositoryError>;

    fn update_candidate_status(
        &mut self,
        tenant: &TenantId,
        id: &CandidateId,
        status: CandidateStatus,
    ) -> Result<(), RepositoryError>;

    /// Inserts a new application with its document checklist. Enforces the
    /// one-active-application-per-candidate constraint.
    fn insert_application(
        &mut self,
        application: Application,
        checklist: Vec<DocumentChecklistItem>,
    ) -> Result<(), RepositoryError>;

    fn insert_payment(&mut self, payment: Payment) -> Result<(), RepositoryError>;

    fn insert_cost(&mut self, cost: Cost) -> Result<(), RepositoryError>;

    fn insert_history(&mut self, entry: LifecycleEntry) -> Result<(), RepositoryError>;

    fn insert_guarantor_change(&mut self, change: GuarantorChange)
        -> Result<(), RepositoryError>;

    fn update_guarantor_change(&mut self, change: GuarantorChange)
        -> Result<(), RepositoryError>;

    fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}
