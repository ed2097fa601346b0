//! Append-only lifecycle audit trail: writer plus the read models used by
//! reporting screens.
//!
//! The orchestrators write their own audit rows inside their transactions.
//! [`HistoryRecorder::record`] is the out-of-band writer for surrounding
//! flows (payments, costs, document updates); it must never abort the
//! business operation it merely describes, so a missing application is
//! logged and the write skipped.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{
    ApplicationId, ApplicationStatus, CandidateId, CandidateStatus, ClientId, TenantId,
};
use super::repository::{next_id, PlacementStore, RepositoryError};

/// Fixed action vocabulary for audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    StatusChange,
    Cancellation,
    PaymentAdded,
    CostAdded,
    GuarantorChange,
    DocumentStatusChange,
}

impl LifecycleAction {
    pub fn key(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::Cancellation => "cancellation",
            Self::PaymentAdded => "payment_added",
            Self::CostAdded => "cost_added",
            Self::GuarantorChange => "guarantor_change",
            Self::DocumentStatusChange => "document_status_change",
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One immutable audit row. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEntry {
    pub id: String,
    pub tenant_id: TenantId,
    pub application_id: ApplicationId,
    pub action: LifecycleAction,
    pub from_status: Option<ApplicationStatus>,
    pub to_status: Option<ApplicationStatus>,
    pub from_client_id: Option<ClientId>,
    pub to_client_id: Option<ClientId>,
    pub candidate_status_before: Option<CandidateStatus>,
    pub candidate_status_after: Option<CandidateStatus>,
    /// Free-form financial payload (refund numbers, penalty, amounts).
    pub financial_impact: Option<serde_json::Value>,
    /// Caller-supplied reason for a cancellation or guarantor change.
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub performed_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl LifecycleEntry {
    pub fn new(
        tenant_id: TenantId,
        application_id: ApplicationId,
        action: LifecycleAction,
        performed_by: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: next_id("evt"),
            tenant_id,
            application_id,
            action,
            from_status: None,
            to_status: None,
            from_client_id: None,
            to_client_id: None,
            candidate_status_before: None,
            candidate_status_after: None,
            financial_impact: None,
            reason: None,
            notes: None,
            performed_by: performed_by.into(),
            recorded_at,
        }
    }
}

/// Filter for [`HistoryRecorder::query`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    pub action: Option<LifecycleAction>,
    pub performed_by: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub application_id: Option<ApplicationId>,
    pub candidate_id: Option<CandidateId>,
    pub client_id: Option<ClientId>,
}

/// One page of audit rows, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<LifecycleEntry>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

/// Per-application lifecycle digest.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleSummary {
    pub application_id: ApplicationId,
    pub counts_by_action: BTreeMap<String, usize>,
    /// The ten most recent entries.
    pub recent: Vec<LifecycleEntry>,
}

/// Tenant-wide audit statistics for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TenantHistoryStats {
    pub total_entries: usize,
    pub by_action: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
    /// Keyed by `YYYY-MM`.
    pub by_month: BTreeMap<String, usize>,
}

/// Audit writer/reader over the placement store.
pub struct HistoryRecorder<S> {
    store: std::sync::Arc<S>,
}

impl<S> HistoryRecorder<S>
where
    S: PlacementStore,
{
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store }
    }

    /// Records one out-of-band audit row. A missing application is logged
    /// and skipped; the parent operation must not fail over audit logging.
    pub fn record(&self, entry: LifecycleEntry) -> Result<(), RepositoryError> {
        let exists = self
            .store
            .application(&entry.tenant_id, &entry.application_id)?
            .is_some();
        if !exists {
            warn!(
                application = %entry.application_id.0,
                action = %entry.action,
                "skipping audit entry for unknown application"
            );
            return Ok(());
        }
        let mut tx = self.store.begin()?;
        tx.insert_history(entry)?;
        tx.commit()
    }

    /// Paginated history for one application, newest first.
    pub fn application_history(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
        page: usize,
        per_page: usize,
    ) -> Result<HistoryPage, RepositoryError> {
        let filter = HistoryFilter {
            application_id: Some(application.clone()),
            ..HistoryFilter::default()
        };
        self.query(tenant, &filter, page, per_page)
    }

    /// History across every application the candidate has held.
    pub fn candidate_history(
        &self,
        tenant: &TenantId,
        candidate: &CandidateId,
        page: usize,
        per_page: usize,
    ) -> Result<HistoryPage, RepositoryError> {
        let filter = HistoryFilter {
            candidate_id: Some(candidate.clone()),
            ..HistoryFilter::default()
        };
        self.query(tenant, &filter, page, per_page)
    }

    /// History across applications where the client is the current or prior
    /// sponsor.
    pub fn client_history(
        &self,
        tenant: &TenantId,
        client: &ClientId,
        page: usize,
        per_page: usize,
    ) -> Result<HistoryPage, RepositoryError> {
        let filter = HistoryFilter {
            client_id: Some(client.clone()),
            ..HistoryFilter::default()
        };
        self.query(tenant, &filter, page, per_page)
    }

    /// Filtered, paginated audit query.
    pub fn query(
        &self,
        tenant: &TenantId,
        filter: &HistoryFilter,
        page: usize,
        per_page: usize,
    ) -> Result<HistoryPage, RepositoryError> {
        let candidate_apps = match &filter.candidate_id {
            Some(candidate) => Some(self.application_ids_for_candidate(tenant, candidate)?),
            None => None,
        };
        let client_apps = match &filter.client_id {
            Some(client) => Some(self.application_ids_for_client(tenant, client)?),
            None => None,
        };

        let mut entries: Vec<LifecycleEntry> = self
            .store
            .history(tenant)?
            .into_iter()
            .filter(|entry| matches_filter(entry, filter, &candidate_apps, &client_apps))
            .collect();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));

        let total = entries.len();
        let per_page = per_page.max(1);
        let page = page.max(1);
        let entries = entries
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(HistoryPage {
            entries,
            total,
            page,
            per_page,
        })
    }

    /// Counts by action plus the ten most recent entries.
    pub fn summary(
        &self,
        tenant: &TenantId,
        application: &ApplicationId,
    ) -> Result<LifecycleSummary, RepositoryError> {
        let mut entries: Vec<LifecycleEntry> = self
            .store
            .history(tenant)?
            .into_iter()
            .filter(|entry| &entry.application_id == application)
            .collect();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));

        let mut counts_by_action = BTreeMap::new();
        for entry in &entries {
            *counts_by_action
                .entry(entry.action.key().to_string())
                .or_insert(0) += 1;
        }

        entries.truncate(10);
        Ok(LifecycleSummary {
            application_id: application.clone(),
            counts_by_action,
            recent: entries,
        })
    }

    /// Tenant-wide totals by action, actor, and month.
    pub fn tenant_stats(&self, tenant: &TenantId) -> Result<TenantHistoryStats, RepositoryError> {
        let entries = self.store.history(tenant)?;
        let mut by_action = BTreeMap::new();
        let mut by_actor = BTreeMap::new();
        let mut by_month = BTreeMap::new();
        for entry in &entries {
            *by_action
                .entry(entry.action.key().to_string())
                .or_insert(0) += 1;
            *by_actor.entry(entry.performed_by.clone()).or_insert(0) += 1;
            *by_month
                .entry(entry.recorded_at.format("%Y-%m").to_string())
                .or_insert(0) += 1;
        }
        Ok(TenantHistoryStats {
            total_entries: entries.len(),
            by_action,
            by_actor,
            by_month,
        })
    }

    fn application_ids_for_candidate(
        &self,
        tenant: &TenantId,
        candidate: &CandidateId,
    ) -> Result<Vec<ApplicationId>, RepositoryError> {
        Ok(self
            .store
            .applications_for_candidate(tenant, candidate)?
            .into_iter()
            .map(|app| app.id)
            .collect())
    }

    fn application_ids_for_client(
        &self,
        tenant: &TenantId,
        client: &ClientId,
    ) -> Result<Vec<ApplicationId>, RepositoryError> {
        Ok(self
            .store
            .applications_for_client(tenant, client)?
            .into_iter()
            .map(|app| app.id)
            .collect())
    }
}

fn matches_filter(
    entry: &LifecycleEntry,
    filter: &HistoryFilter,
    candidate_apps: &Option<Vec<ApplicationId>>,
    client_apps: &Option<Vec<ApplicationId>>,
) -> bool {
    if let Some(action) = filter.action {
        if entry.action != action {
            return false;
        }
    }
    if let Some(actor) = &filter.performed_by {
        if &entry.performed_by != actor {
            return false;
        }
    }
    if let Some(from) = filter.from_date {
        if entry.recorded_at.date_naive() < from {
            return false;
        }
    }
    if let Some(to) = filter.to_date {
        if entry.recorded_at.date_naive() > to {
            return false;
        }
    }
    if let Some(application) = &filter.application_id {
        if &entry.application_id != application {
            return false;
        }
    }
    if let Some(apps) = candidate_apps {
        if !apps.contains(&entry.application_id) {
            return false;
        }
    }
    if let Some(apps) = client_apps {
        if !apps.contains(&entry.application_id) {
            return false;
        }
    }
    true
}
