//! In-memory placement store with real transaction semantics.
//!
//! A transaction clones the state under the store mutex, applies writes to
//! the working copy, and swaps it back on commit. Holding the mutex for the
//! life of the transaction serializes concurrent writers the way row locks
//! would; the optimistic expected-status check still guards callers that
//! read before opening the transaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Candidate, CandidateId, CandidateStatus,
    ClientId, Cost, DocumentChecklistItem, GuarantorChange, GuarantorChangeId, Payment, TenantId,
};
use super::history::LifecycleEntry;
use super::repository::{PlacementStore, PlacementTx, RepositoryError};
use super::state;

#[derive(Default, Clone)]
struct StoreState {
    applications: HashMap<ApplicationId, Application>,
    candidates: HashMap<CandidateId, Candidate>,
    payments: Vec<Payment>,
    costs: Vec<Cost>,
    checklists: HashMap<ApplicationId, Vec<DocumentChecklistItem>>,
    guarantor_changes: HashMap<GuarantorChangeId, GuarantorChange>,
    history: Vec<LifecycleEntry>,
}

impl StoreState {
    fn application(&self, tenant: &TenantId, id: &ApplicationId) -> Option<Application> {
        self.applications
            .get(id)
            .filter(|app| &app.tenant_id == tenant)
            .cloned()
    }

    fn insert_application(
        &mut self,
        application: Application,
        checklist: Vec<DocumentChecklistItem>,
    ) -> Result<(), RepositoryError> {
        if self.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        let candidate_busy = self.applications.values().any(|existing| {
            existing.tenant_id == application.tenant_id
                && existing.candidate_id == application.candidate_id
                && state::is_active(existing.status)
        });
        if candidate_busy {
            return Err(RepositoryError::ActiveApplicationExists(
                application.candidate_id.clone(),
            ));
        }
        self.checklists.insert(application.id.clone(), checklist);
        self.applications.insert(application.id.clone(), application);
        Ok(())
    }
}

/// In-memory [`PlacementStore`] used by the service binary and tests.
#[derive(Default, Clone)]
pub struct MemoryPlacementStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryPlacementStore {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store mutex poisoned")
    }

    /// Seeds an application (with its checklist) outside any workflow.
    pub fn seed_application(
        &self,
        application: Application,
        checklist: Vec<DocumentChecklistItem>,
    ) -> Result<(), RepositoryError> {
        self.lock().insert_application(application, checklist)
    }

    pub fn seed_candidate(&self, candidate: Candidate) {
        self.lock()
            .candidates
            .insert(candidate.id.clone(), candidate);
    }

    pub fn seed_payment(&self, payment: Payment) {
        self.lock().payments.push(payment);
    }

    pub fn seed_cost(&self, cost: Cost) {
        self.lock().costs.push(cost);
    }
}

impl PlacementStore for MemoryPlacementStore {
    fn begin(&self) -> Result<Box<dyn PlacementTx + '_>, RepositoryError> {
        let guard = self.lock();
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    fn application(
        &self,
        tenant: &TenantId,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock().application(tenant, id))
    }

    fn candidate(
        &self,
        tenant: &TenantId,
        id: &CandidateId,
    ) -> Result<Option<Candidate>, RepositoryError> {
        Ok(self
            .lock()
            .candidates
            .get(id)
            .filter(|candidate| &candidate.tenant_id == tenant)
            .cloned())
    }

    fn payments(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let state = self.lock();
        if state.application(tenant, application).is_none() {
            return Ok(Vec::new());
        }
        Ok(state
            .payments
            .iter()
            .filter(|payment| &payment.application_id == application)
            .cloned()
            .collect())
    }

    fn costs(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Cost>, RepositoryError> {
        let state = self.lock();
        if state.application(tenant, application).is_none() {
            return Ok(Vec::new());
        }
        Ok(state
            .costs
            .iter()
            .filter(|cost| &cost.application_id == application)
            .cloned()
            .collect())
    }

    fn document_checklist(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<DocumentChecklistItem>, RepositoryError> {
        let state = self.lock();
        if state.application(tenant, application).is_none() {
            return Ok(Vec::new());
        }
        Ok(state
            .checklists
            .get(application)
            .cloned()
            .unwrap_or_default())
    }

    fn applications_for_candidate(
        &self,
        tenant: &TenantId,
        candidate: &CandidateId,
    ) -> Result<Vec<Application>, RepositoryError> {
        Ok(self
            .lock()
            .applications
            .values()
            .filter(|app| &app.tenant_id == tenant && &app.candidate_id == candidate)
            .cloned()
            .collect())
    }

    fn applications_for_client(
        &self,
        tenant: &TenantId,
        client: &ClientId,
    ) -> Result<Vec<Application>, RepositoryError> {
        Ok(self
            .lock()
            .applications
            .values()
            .filter(|app| {
                &app.tenant_id == tenant
                    && (&app.client_id == client || app.from_client_id.as_ref() == Some(client))
            })
            .cloned()
            .collect())
    }

    fn guarantor_change(
        &self,
        tenant: &TenantId,
        id: &GuarantorChangeId,
    ) -> Result<Option<GuarantorChange>, RepositoryError> {
        Ok(self
            .lock()
            .guarantor_changes
            .get(id)
            .filter(|change| &change.tenant_id == tenant)
            .cloned())
    }

    fn history(&self, tenant: &TenantId) -> Result<Vec<LifecycleEntry>, RepositoryError> {
        Ok(self
            .lock()
            .history
            .iter()
            .filter(|entry| &entry.tenant_id == tenant)
            .cloned()
            .collect())
    }
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, StoreState>,
    working: StoreState,
}

impl PlacementTx for MemoryTx<'_> {
    fn application_for_update(
        &mut self,
        tenant: &TenantId,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self.working.application(tenant, id))
    }

    fn candidate(
        &mut self,
        tenant: &TenantId,
        id: &CandidateId,
    ) -> Result<Option<Candidate>, RepositoryError> {
        Ok(self
            .working
            .candidates
            .get(id)
            .filter(|candidate| &candidate.tenant_id == tenant)
            .cloned())
    }

    fn payments(
        &mut self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        if self.working.application(tenant, application).is_none() {
            return Ok(Vec::new());
        }
        Ok(self
            .working
            .payments
            .iter()
            .filter(|payment| &payment.application_id == application)
            .cloned()
            .collect())
    }

    fn costs(
        &mut self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<Vec<Cost>, RepositoryError> {
        if self.working.application(tenant, application).is_none() {
            return Ok(Vec::new());
        }
        Ok(self
            .working
            .costs
            .iter()
            .filter(|cost| &cost.application_id == application)
            .cloned()
            .collect())
    }

    fn guarantor_change_for_update(
        &mut self,
        tenant: &TenantId,
        id: &GuarantorChangeId,
    ) -> Result<Option<GuarantorChange>, RepositoryError> {
        Ok(self
            .working
            .guarantor_changes
            .get(id)
            .filter(|change| &change.tenant_id == tenant)
            .cloned())
    }

    fn update_application_status(
        &mut self,
        tenant: &TenantId,
        id: &ApplicationId,
        expected: ApplicationStatus,
        next: ApplicationStatus,
    ) -> Result<Application, RepositoryError> {
        let application = self
            .working
            .applications
            .get_mut(id)
            .filter(|app| &app.tenant_id == tenant)
            .ok_or(RepositoryError::NotFound)?;
        if application.status != expected {
            return Err(RepositoryError::Conflict);
        }
        application.status = next;
        Ok(application.clone())
    }

    fn set_exact_arrival_date(
        &mut self,
        tenant: &TenantId,
        id: &ApplicationId,
        arrival: NaiveDate,
    ) -> Result<(), RepositoryError> {
        let application = self
            .working
            .applications
            .get_mut(id)
            .filter(|app| &app.tenant_id == tenant)
            .ok_or(RepositoryError::NotFound)?;
        application.exact_arrival_date = Some(arrival);
        Ok(())
    }

    fn update_candidate_status(
        &mut self,
        tenant: &TenantId,
        id: &CandidateId,
        status: CandidateStatus,
    ) -> Result<(), RepositoryError> {
        let candidate = self
            .working
            .candidates
            .get_mut(id)
            .filter(|candidate| &candidate.tenant_id == tenant)
            .ok_or(RepositoryError::NotFound)?;
        candidate.status = status;
        Ok(())
    }

    fn insert_application(
        &mut self,
        application: Application,
        checklist: Vec<DocumentChecklistItem>,
    ) -> Result<(), RepositoryError> {
        self.working.insert_application(application, checklist)
    }

    fn insert_payment(&mut self, payment: Payment) -> Result<(), RepositoryError> {
        self.working.payments.push(payment);
        Ok(())
    }

    fn insert_cost(&mut self, cost: Cost) -> Result<(), RepositoryError> {
        self.working.costs.push(cost);
        Ok(())
    }

    fn insert_history(&mut self, entry: LifecycleEntry) -> Result<(), RepositoryError> {
        self.working.history.push(entry);
        Ok(())
    }

    fn insert_guarantor_change(
        &mut self,
        change: GuarantorChange,
    ) -> Result<(), RepositoryError> {
        if self.working.guarantor_changes.contains_key(&change.id) {
            return Err(RepositoryError::Conflict);
        }
        self.working.guarantor_changes.insert(change.id.clone(), change);
        Ok(())
    }

    fn update_guarantor_change(
        &mut self,
        change: GuarantorChange,
    ) -> Result<(), RepositoryError> {
        if !self.working.guarantor_changes.contains_key(&change.id) {
            return Err(RepositoryError::NotFound);
        }
        self.working.guarantor_changes.insert(change.id.clone(), change);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), RepositoryError> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}
