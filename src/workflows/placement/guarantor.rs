//! Employer reassignment as a first-class workflow.
//!
//! Used when reassignment is the primary intent rather than a side effect of
//! a cancellation: the original placement ends (`contract_ended`), a refund
//! is computed from per-payment-type heuristics, and the replacement
//! application is materialized later once a receiving client and fee
//! template are confirmed.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::domain::{
    payment_type, standard_document_checklist, reusable_document_names, Application,
    ApplicationId, ApplicationStatus, ApplicationType, CandidateStatus, ClientId, Clock,
    FeeTemplateId, GuarantorChange, GuarantorChangeId, Payment, TenantId,
};
use super::history::{LifecycleAction, LifecycleEntry};
use super::policy::{PolicyError, PolicyStore};
use super::repository::{next_id, PlacementStore};
use super::service::{has_completed_paperwork, PlacementError};
use super::state;

/// Where the candidate currently is, which drives the heuristic refund
/// percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSituation {
    #[serde(rename = "abroad")]
    Abroad,
    #[serde(rename = "in_country_under_3_months")]
    InCountryUnder3Months,
    #[serde(rename = "in_country_over_3_months")]
    InCountryOver3Months,
    /// Candidate has left the country; nothing is refunded.
    #[serde(rename = "departed")]
    Departed,
}

/// Request to start an employer reassignment.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateGuarantorChangeRequest {
    pub tenant_id: TenantId,
    pub application_id: ApplicationId,
    /// Receiving client, when already known.
    pub to_client_id: Option<ClientId>,
    pub candidate_situation: CandidateSituation,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub performed_by: String,
}

/// Transactional workflow for guarantor changes.
pub struct GuarantorChangeService<S, P> {
    store: Arc<S>,
    policies: Arc<P>,
    clock: Arc<dyn Clock>,
}

impl<S, P> GuarantorChangeService<S, P>
where
    S: PlacementStore,
    P: PolicyStore,
{
    pub fn new(store: Arc<S>, policies: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policies,
            clock,
        }
    }

    /// Ends the original placement, books the heuristic refund, and records
    /// the guarantor-change row inside one transaction.
    pub fn initiate(
        &self,
        request: InitiateGuarantorChangeRequest,
    ) -> Result<GuarantorChange, PlacementError> {
        let now = self.clock.now();
        let mut tx = self.store.begin()?;
        let application = tx
            .application_for_update(&request.tenant_id, &request.application_id)?
            .ok_or(PlacementError::NotFound)?;

        let check = state::check_transition(application.status, ApplicationStatus::ContractEnded);
        if !check.allowed {
            return Err(PlacementError::InvalidTransition {
                from: application.status,
                to: ApplicationStatus::ContractEnded,
                reason: check
                    .reason
                    .unwrap_or_else(|| "transition not allowed".to_string()),
                valid_next: state::valid_next_states(application.status).to_vec(),
            });
        }

        let candidate = tx
            .candidate(&request.tenant_id, &application.candidate_id)?
            .ok_or(PlacementError::NotFound)?;

        let payments = tx.payments(&request.tenant_id, &request.application_id)?;
        let refund_amount =
            self.heuristic_refund(&request.tenant_id, &payments, request.candidate_situation);
        let currency = payments
            .first()
            .map(|payment| payment.currency.clone())
            .unwrap_or_else(|| "USD".to_string());

        tx.update_application_status(
            &request.tenant_id,
            &request.application_id,
            application.status,
            ApplicationStatus::ContractEnded,
        )?;

        let candidate_after = match request.candidate_situation {
            CandidateSituation::Abroad | CandidateSituation::Departed => {
                CandidateStatus::AvailableAbroad
            }
            _ if request.to_client_id.is_some() => CandidateStatus::InProcess,
            _ => CandidateStatus::AvailableInLebanon,
        };
        tx.update_candidate_status(
            &request.tenant_id,
            &application.candidate_id,
            candidate_after,
        )?;

        if refund_amount > Decimal::ZERO {
            tx.insert_payment(Payment {
                id: next_id("pay"),
                application_id: request.application_id.clone(),
                client_id: application.client_id.clone(),
                amount: -refund_amount,
                currency: currency.clone(),
                payment_type: payment_type::REFUND.to_string(),
                refundable: false,
                recorded_at: now,
            })?;
        }

        let change = GuarantorChange {
            id: GuarantorChangeId(next_id("gc")),
            tenant_id: request.tenant_id.clone(),
            original_application_id: request.application_id.clone(),
            new_application_id: None,
            from_client_id: application.client_id.clone(),
            to_client_id: request.to_client_id.clone(),
            candidate_id: application.candidate_id.clone(),
            refund_amount,
            refund_currency: currency,
            refund_processed: false,
            refund_processed_at: None,
            candidate_status_before: candidate.status,
            candidate_status_after: candidate_after,
            reason: request.reason.clone(),
            notes: request.notes.clone(),
            created_at: now,
        };
        tx.insert_guarantor_change(change.clone())?;

        let mut entry = LifecycleEntry::new(
            request.tenant_id.clone(),
            request.application_id.clone(),
            LifecycleAction::GuarantorChange,
            request.performed_by.clone(),
            now,
        );
        entry.from_status = Some(application.status);
        entry.to_status = Some(ApplicationStatus::ContractEnded);
        entry.from_client_id = Some(application.client_id.clone());
        entry.to_client_id = request.to_client_id.clone();
        entry.candidate_status_before = Some(candidate.status);
        entry.candidate_status_after = Some(candidate_after);
        entry.financial_impact = Some(json!({ "refund_amount": refund_amount }));
        entry.reason = request.reason;
        entry.notes = request.notes;
        tx.insert_history(entry)?;

        tx.commit()?;
        info!(
            application = %request.application_id.0,
            change = %change.id.0,
            refund = %refund_amount,
            "guarantor change initiated"
        );
        Ok(change)
    }

    /// Materializes the replacement application once the receiving client
    /// and fee template are confirmed, and links it on the change row.
    /// Re-finalizing fails with `AlreadyProcessed`.
    pub fn finalize(
        &self,
        tenant: &TenantId,
        change_id: &GuarantorChangeId,
        to_client: ClientId,
        fee_template_id: Option<FeeTemplateId>,
        performed_by: &str,
    ) -> Result<(GuarantorChange, Application), PlacementError> {
        let now = self.clock.now();
        let mut tx = self.store.begin()?;
        let mut change = tx
            .guarantor_change_for_update(tenant, change_id)?
            .ok_or(PlacementError::NotFound)?;
        if change.new_application_id.is_some() {
            return Err(PlacementError::AlreadyProcessed);
        }

        let original = tx
            .application_for_update(tenant, &change.original_application_id)?
            .ok_or(PlacementError::NotFound)?;

        let template = match fee_template_id {
            Some(id) => Some(self.policies.fee_template(tenant, &id)?),
            None => match self.policies.in_country_fee_template(tenant) {
                Ok(template) => Some(template),
                Err(PolicyError::InCountryTemplateMissing) => None,
                Err(other) => return Err(other.into()),
            },
        };

        let mut checklist = standard_document_checklist();
        if has_completed_paperwork(original.status) {
            for item in checklist.iter_mut() {
                if reusable_document_names().contains(&item.name.as_str()) {
                    item.completed = true;
                }
            }
        }

        let replacement = Application {
            id: ApplicationId(next_id("app")),
            tenant_id: tenant.clone(),
            status: ApplicationStatus::PendingAuthorization,
            application_type: ApplicationType::GuarantorChange,
            client_id: to_client.clone(),
            from_client_id: Some(change.from_client_id.clone()),
            candidate_id: change.candidate_id.clone(),
            broker_id: original.broker_id.clone(),
            fee_template_id: template.as_ref().map(|t| t.id.clone()),
            final_fee: template
                .as_ref()
                .map(|t| t.total())
                .unwrap_or(Decimal::ZERO),
            exact_arrival_date: original.exact_arrival_date,
            lawyer_service: original.lawyer_service,
            lawyer_fee: original.lawyer_fee,
            created_at: now,
        };
        tx.insert_application(replacement.clone(), checklist)?;

        change.new_application_id = Some(replacement.id.clone());
        change.to_client_id = Some(to_client.clone());
        change.candidate_status_after = CandidateStatus::InProcess;
        tx.update_guarantor_change(change.clone())?;
        tx.update_candidate_status(tenant, &change.candidate_id, CandidateStatus::InProcess)?;

        let mut entry = LifecycleEntry::new(
            tenant.clone(),
            change.original_application_id.clone(),
            LifecycleAction::GuarantorChange,
            performed_by,
            now,
        );
        entry.from_client_id = Some(change.from_client_id.clone());
        entry.to_client_id = Some(to_client);
        entry.notes = Some(format!(
            "replacement application {} created",
            replacement.id.0
        ));
        tx.insert_history(entry)?;

        tx.commit()?;
        info!(
            change = %change.id.0,
            replacement = %replacement.id.0,
            "guarantor change finalized"
        );
        Ok((change, replacement))
    }

    /// One-way idempotent refund confirmation. A second invocation fails
    /// with `AlreadyProcessed`; it never double-pays.
    pub fn process_refund(
        &self,
        tenant: &TenantId,
        change_id: &GuarantorChangeId,
        performed_by: &str,
    ) -> Result<GuarantorChange, PlacementError> {
        let now = self.clock.now();
        let mut tx = self.store.begin()?;
        let mut change = tx
            .guarantor_change_for_update(tenant, change_id)?
            .ok_or(PlacementError::NotFound)?;
        if change.refund_processed {
            return Err(PlacementError::AlreadyProcessed);
        }

        change.refund_processed = true;
        change.refund_processed_at = Some(now);
        tx.update_guarantor_change(change.clone())?;

        let mut entry = LifecycleEntry::new(
            tenant.clone(),
            change.original_application_id.clone(),
            LifecycleAction::GuarantorChange,
            performed_by,
            now,
        );
        entry.financial_impact = Some(json!({
            "refund_amount": change.refund_amount,
            "refund_processed": true,
        }));
        entry.notes = Some("guarantor-change refund processed".to_string());
        tx.insert_history(entry)?;

        tx.commit()?;
        info!(change = %change.id.0, "guarantor-change refund processed");
        Ok(change)
    }

    /// Simple per-payment-type refund heuristic: insurance and visa payments
    /// are categorically non-refundable; the rest scales with where the
    /// candidate is.
    fn heuristic_refund(
        &self,
        tenant: &TenantId,
        payments: &[Payment],
        situation: CandidateSituation,
    ) -> Decimal {
        let policy = self.policies.guarantor_refund_policy(tenant);
        let percentage = match situation {
            CandidateSituation::Abroad => policy.abroad_percentage,
            CandidateSituation::InCountryUnder3Months => {
                policy.in_country_under_3_months_percentage
            }
            CandidateSituation::InCountryOver3Months => policy.in_country_over_3_months_percentage,
            CandidateSituation::Departed => Decimal::ZERO,
        };

        let refundable_paid: Decimal = payments
            .iter()
            .filter(|payment| {
                payment.amount > Decimal::ZERO
                    && payment.payment_type != payment_type::INSURANCE
                    && payment.payment_type != payment_type::VISA
            })
            .map(|payment| payment.amount)
            .sum();

        (refundable_paid * percentage / dec!(100)).max(Decimal::ZERO)
    }
}
