//! Transactional use-case layer for status transitions and cancellations.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::domain::{
    reusable_document_names, standard_document_checklist, Application, ApplicationId,
    ApplicationStatus, ApplicationType, CandidateStatus, ClientId, Clock, Cost, Payment, TenantId,
    payment_type,
};
use super::policy::{CancellationType, PolicyError, PolicyStore};
use super::refund::{compute_refund, months_since_arrival, RefundBreakdown, RefundInputs};
use super::repository::{next_id, PlacementStore, PlacementTx, RepositoryError};
use super::history::{LifecycleAction, LifecycleEntry};
use super::state;

/// Error raised by the lifecycle and guarantor-change services.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("application not found")]
    NotFound,
    #[error("invalid transition {from} -> {to}: {reason}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
        reason: String,
        valid_next: Vec<ApplicationStatus>,
    },
    #[error("missing precondition: {0}")]
    MissingPrecondition(String),
    /// Policy resolution failed; the calculation hard-fails rather than
    /// defaulting to zeroes.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("the application changed concurrently; re-read and retry")]
    Conflict,
    #[error("already processed")]
    AlreadyProcessed,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for PlacementError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => Self::Conflict,
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::ActiveApplicationExists(candidate) => Self::Validation(format!(
                "candidate {} already has an active application",
                candidate.0
            )),
            other => Self::Storage(other),
        }
    }
}

/// Request to move an application along the happy path.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionRequest {
    pub tenant_id: TenantId,
    pub application_id: ApplicationId,
    pub to_status: ApplicationStatus,
    /// Required when transitioning to `worker_arrived`.
    pub exact_arrival_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub performed_by: String,
}

/// Request to cancel an application.
#[derive(Debug, Clone, Deserialize)]
pub struct CancellationRequest {
    pub tenant_id: TenantId,
    pub application_id: ApplicationId,
    pub cancellation_type: CancellationType,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Super-admin override for the refund amount.
    pub custom_refund_amount: Option<Decimal>,
    pub penalty_fee_override: Option<Decimal>,
    /// Overrides the computed elapsed months after arrival.
    pub months_since_arrival: Option<u32>,
    /// Candidate is physically in the country despite a pre-arrival status.
    pub candidate_in_lebanon: Option<bool>,
    /// Candidate has left the country; forfeits the refund.
    #[serde(default)]
    pub candidate_departed: bool,
    /// Reassign the candidate to this client instead of releasing them.
    pub new_client_id: Option<ClientId>,
    #[serde(default)]
    pub deport_candidate: bool,
    pub performed_by: String,
}

/// Monetary summary of a completed cancellation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialImpact {
    pub refund_amount: Decimal,
    pub penalty_fee: Decimal,
    pub non_refundable_fees: Decimal,
    /// Sum of every cost row booked against the application.
    pub total_costs_absorbed: Decimal,
}

/// Result of a successful cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub application: Application,
    pub refund: RefundBreakdown,
    /// Replacement application created when reassignment was requested.
    pub reassignment: Option<Application>,
    pub message: String,
    pub financial_impact: FinancialImpact,
}

/// Advisory view of which cancellations are currently legal. Never
/// authoritative for the actual cancellation call.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOptions {
    pub can_cancel: bool,
    pub available_types: Vec<CancellationType>,
    pub warnings: Vec<String>,
    pub refund_estimate: Option<RefundBreakdown>,
}

/// Orchestrates status transitions and cancellations over the store,
/// policy data, and an injected clock.
pub struct PlacementLifecycleService<S, P> {
    store: Arc<S>,
    policies: Arc<P>,
    clock: Arc<dyn Clock>,
}

impl<S, P> PlacementLifecycleService<S, P>
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

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// Applies one state-machine transition and its candidate side effect,
    /// atomically, with one `status_change` audit row.
    pub fn transition(&self, request: TransitionRequest) -> Result<Application, PlacementError> {
        let mut tx = self.store.begin()?;
        let application = tx
            .application_for_update(&request.tenant_id, &request.application_id)?
            .ok_or(PlacementError::NotFound)?;

        let check = state::check_transition(application.status, request.to_status);
        if !check.allowed {
            return Err(invalid_transition(
                application.status,
                request.to_status,
                check.reason,
            ));
        }

        if state::requires_exact_arrival_date(request.to_status) {
            let arrival = request
                .exact_arrival_date
                .or(application.exact_arrival_date)
                .ok_or_else(|| {
                    PlacementError::MissingPrecondition(
                        "an exact arrival date is required to mark the worker as arrived"
                            .to_string(),
                    )
                })?;
            tx.set_exact_arrival_date(&request.tenant_id, &request.application_id, arrival)?;
        }

        let updated = tx.update_application_status(
            &request.tenant_id,
            &request.application_id,
            application.status,
            request.to_status,
        )?;

        let candidate_before = tx
            .candidate(&request.tenant_id, &application.candidate_id)?
            .map(|candidate| candidate.status);
        let candidate_after =
            state::candidate_status_change(application.status, request.to_status);
        if let Some(status) = candidate_after {
            tx.update_candidate_status(&request.tenant_id, &application.candidate_id, status)?;
        }

        let mut entry = LifecycleEntry::new(
            request.tenant_id.clone(),
            request.application_id.clone(),
            LifecycleAction::StatusChange,
            request.performed_by.clone(),
            self.clock.now(),
        );
        entry.from_status = Some(application.status);
        entry.to_status = Some(request.to_status);
        entry.candidate_status_before = candidate_before;
        entry.candidate_status_after = candidate_after;
        entry.notes = request.notes;
        tx.insert_history(entry)?;

        tx.commit()?;
        info!(
            application = %request.application_id.0,
            from = %application.status,
            to = %request.to_status,
            "application transitioned"
        );
        Ok(updated)
    }

    /// Advisory, non-transactional view of the legal cancellation options.
    pub fn cancellation_options(
        &self,
        tenant: &TenantId,
        application_id: &ApplicationId,
    ) -> Result<CancellationOptions, PlacementError> {
        let application = self
            .store
            .application(tenant, application_id)?
            .ok_or(PlacementError::NotFound)?;

        if !state::is_cancellable(application.status) {
            return Ok(CancellationOptions {
                can_cancel: false,
                available_types: Vec::new(),
                warnings: vec![format!(
                    "application in state {} cannot be cancelled",
                    application.status
                )],
                refund_estimate: None,
            });
        }

        let mut warnings = Vec::new();
        let available_types = if state::is_pre_arrival(application.status) {
            vec![
                CancellationType::PreArrivalClient,
                CancellationType::PreArrivalCandidate,
            ]
        } else {
            let today = self.clock.today();
            let post_arrival_type = match application.exact_arrival_date {
                Some(arrival) if state::within_probation(arrival, today) => {
                    CancellationType::PostArrivalWithin3Months
                }
                Some(_) => {
                    warnings.push(
                        "outside the probation window; a limited refund may apply".to_string(),
                    );
                    CancellationType::PostArrivalAfter3Months
                }
                None => {
                    warnings.push(
                        "no arrival date on record; probation window cannot be determined"
                            .to_string(),
                    );
                    CancellationType::PostArrivalWithin3Months
                }
            };
            vec![post_arrival_type, CancellationType::CandidateCancellation]
        };

        if matches!(
            application.status,
            ApplicationStatus::ActiveEmployment | ApplicationStatus::RenewalPending
        ) {
            warnings.push("this will end an active employment contract".to_string());
        }

        let refund_estimate = available_types
            .first()
            .and_then(|likely| self.estimate_refund(&application, *likely).ok());

        Ok(CancellationOptions {
            can_cancel: true,
            available_types,
            warnings,
            refund_estimate,
        })
    }

    /// Cancels the application: refund math, status + candidate updates,
    /// optional reassignment or deportation, ledger and audit writes, all
    /// inside one transaction.
    pub fn cancel(
        &self,
        request: CancellationRequest,
    ) -> Result<CancellationOutcome, PlacementError> {
        let now = self.clock.now();
        let mut tx = self.store.begin()?;
        let application = tx
            .application_for_update(&request.tenant_id, &request.application_id)?
            .ok_or(PlacementError::NotFound)?;

        let target = request.cancellation_type.target_status();
        let check = state::check_transition(application.status, target);
        if !check.allowed {
            return Err(invalid_transition(application.status, target, check.reason));
        }

        let candidate = tx
            .candidate(&request.tenant_id, &application.candidate_id)?
            .ok_or(PlacementError::NotFound)?;

        let payments = tx.payments(&request.tenant_id, &request.application_id)?;
        let total_paid: Decimal = payments.iter().map(|payment| payment.amount).sum();

        let components = match &application.fee_template_id {
            Some(template_id) => {
                self.policies
                    .fee_template(&request.tenant_id, template_id)?
                    .components
            }
            None => Vec::new(),
        };

        let setting = self
            .policies
            .cancellation_setting(&request.tenant_id, request.cancellation_type)?;

        let months = if request.cancellation_type.is_post_arrival() {
            request.months_since_arrival.unwrap_or_else(|| {
                application
                    .exact_arrival_date
                    .map(|arrival| months_since_arrival(arrival, self.clock.today()))
                    .unwrap_or(0)
            })
        } else {
            0
        };

        let refund = compute_refund(&RefundInputs {
            cancellation_type: request.cancellation_type,
            setting,
            components,
            total_paid,
            months_since_arrival: months,
            custom_refund_amount: request.custom_refund_amount,
            penalty_fee_override: request.penalty_fee_override,
            candidate_departed: request.candidate_departed,
        });

        let updated = tx.update_application_status(
            &request.tenant_id,
            &request.application_id,
            application.status,
            target,
        )?;

        let mut notes = request.notes.clone();
        let candidate_after = self.resolve_candidate_status(&request, &application, target);
        tx.update_candidate_status(
            &request.tenant_id,
            &application.candidate_id,
            candidate_after,
        )?;

        if request.deport_candidate {
            let amount = self.policies.deportation_cost(&request.tenant_id);
            tx.insert_cost(Cost {
                id: next_id("cost"),
                application_id: request.application_id.clone(),
                candidate_id: Some(application.candidate_id.clone()),
                amount,
                currency: refund_currency(&payments),
                description: "deportation of cancelled candidate".to_string(),
                recorded_at: now,
            })?;
            let deport_note = format!("deportation requested; cost {amount} booked");
            notes = Some(match notes {
                Some(existing) => format!("{existing}; {deport_note}"),
                None => deport_note,
            });
        }

        if refund.final_refund > Decimal::ZERO {
            tx.insert_payment(Payment {
                id: next_id("pay"),
                application_id: request.application_id.clone(),
                client_id: application.client_id.clone(),
                amount: -refund.final_refund,
                currency: refund_currency(&payments),
                payment_type: payment_type::REFUND.to_string(),
                refundable: false,
                recorded_at: now,
            })?;
        }

        let reassignment = if request.cancellation_type.is_post_arrival() {
            match &request.new_client_id {
                Some(new_client) => Some(self.create_reassignment(
                    &mut tx,
                    &request,
                    &application,
                    new_client.clone(),
                )?),
                None => None,
            }
        } else {
            None
        };

        let financial_payload = json!({
            "refund_amount": refund.final_refund,
            "calculated_refund": refund.calculated_refund,
            "penalty_fee": refund.penalty_fee,
            "non_refundable_fees": refund.non_refundable_total,
            "monthly_service_deduction": refund.monthly_service_deduction,
            "total_paid": refund.total_paid,
        });

        let mut status_entry = LifecycleEntry::new(
            request.tenant_id.clone(),
            request.application_id.clone(),
            LifecycleAction::StatusChange,
            request.performed_by.clone(),
            now,
        );
        status_entry.from_status = Some(application.status);
        status_entry.to_status = Some(target);
        status_entry.candidate_status_before = Some(candidate.status);
        status_entry.candidate_status_after = Some(candidate_after);
        tx.insert_history(status_entry)?;

        let mut cancel_entry = LifecycleEntry::new(
            request.tenant_id.clone(),
            request.application_id.clone(),
            LifecycleAction::Cancellation,
            request.performed_by.clone(),
            now,
        );
        cancel_entry.from_status = Some(application.status);
        cancel_entry.to_status = Some(target);
        cancel_entry.candidate_status_before = Some(candidate.status);
        cancel_entry.candidate_status_after = Some(candidate_after);
        cancel_entry.to_client_id = request.new_client_id.clone();
        cancel_entry.financial_impact = Some(financial_payload);
        cancel_entry.reason = request.reason.clone();
        cancel_entry.notes = notes;
        tx.insert_history(cancel_entry)?;

        let total_costs_absorbed: Decimal = tx
            .costs(&request.tenant_id, &request.application_id)?
            .iter()
            .map(|cost| cost.amount)
            .sum();

        tx.commit()?;
        info!(
            application = %request.application_id.0,
            cancellation_type = %request.cancellation_type,
            refund = %refund.final_refund,
            "application cancelled"
        );

        let message = format!(
            "Application {} cancelled ({}); refund {} {}",
            request.application_id.0,
            request.cancellation_type,
            refund.final_refund,
            refund_currency(&payments)
        );
        let financial_impact = FinancialImpact {
            refund_amount: refund.final_refund,
            penalty_fee: refund.penalty_fee,
            non_refundable_fees: refund.non_refundable_total,
            total_costs_absorbed,
        };

        Ok(CancellationOutcome {
            application: updated,
            refund,
            reassignment,
            message,
            financial_impact,
        })
    }

    /// Candidate status after cancellation, with the reassignment and
    /// deportation branch overrides.
    fn resolve_candidate_status(
        &self,
        request: &CancellationRequest,
        application: &Application,
        target: ApplicationStatus,
    ) -> CandidateStatus {
        if request.cancellation_type.is_post_arrival() {
            if request.deport_candidate {
                return CandidateStatus::AvailableInLebanon;
            }
            if request.new_client_id.is_some() {
                return CandidateStatus::InProcess;
            }
        }
        if !request.cancellation_type.is_post_arrival()
            && request.candidate_in_lebanon == Some(true)
        {
            return CandidateStatus::AvailableInLebanon;
        }
        state::candidate_status_change(application.status, target)
            .unwrap_or(CandidateStatus::AvailableAbroad)
    }

    /// Creates the replacement application for a reassignment requested as
    /// part of a cancellation.
    fn create_reassignment(
        &self,
        tx: &mut Box<dyn PlacementTx + '_>,
        request: &CancellationRequest,
        original: &Application,
        new_client: ClientId,
    ) -> Result<Application, PlacementError> {
        let template = match self.policies.in_country_fee_template(&request.tenant_id) {
            Ok(template) => Some(template),
            Err(PolicyError::InCountryTemplateMissing) => {
                warn!(
                    tenant = %request.tenant_id.0,
                    "no in-country fee template configured; reassignment created without one"
                );
                None
            }
            Err(other) => return Err(other.into()),
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
            tenant_id: request.tenant_id.clone(),
            status: ApplicationStatus::PendingAuthorization,
            application_type: ApplicationType::GuarantorChange,
            client_id: new_client,
            from_client_id: Some(original.client_id.clone()),
            candidate_id: original.candidate_id.clone(),
            broker_id: original.broker_id.clone(),
            fee_template_id: template.as_ref().map(|t| t.id.clone()),
            final_fee: template.as_ref().map(|t| t.total()).unwrap_or(Decimal::ZERO),
            exact_arrival_date: original.exact_arrival_date,
            lawyer_service: original.lawyer_service,
            lawyer_fee: original.lawyer_fee,
            created_at: self.clock.now(),
        };
        tx.insert_application(replacement.clone(), checklist)?;
        Ok(replacement)
    }

    fn estimate_refund(
        &self,
        application: &Application,
        cancellation_type: CancellationType,
    ) -> Result<RefundBreakdown, PlacementError> {
        let payments = self
            .store
            .payments(&application.tenant_id, &application.id)?;
        let total_paid: Decimal = payments.iter().map(|payment| payment.amount).sum();
        let components = match &application.fee_template_id {
            Some(template_id) => {
                self.policies
                    .fee_template(&application.tenant_id, template_id)?
                    .components
            }
            None => Vec::new(),
        };
        let setting = self
            .policies
            .cancellation_setting(&application.tenant_id, cancellation_type)?;
        let months = if cancellation_type.is_post_arrival() {
            application
                .exact_arrival_date
                .map(|arrival| months_since_arrival(arrival, self.clock.today()))
                .unwrap_or(0)
        } else {
            0
        };
        Ok(compute_refund(&RefundInputs {
            cancellation_type,
            setting,
            components,
            total_paid,
            months_since_arrival: months,
            custom_refund_amount: None,
            penalty_fee_override: None,
            candidate_departed: false,
        }))
    }
}

/// Paperwork only counts as complete once the placement reached active
/// employment or beyond.
pub fn has_completed_paperwork(status: ApplicationStatus) -> bool {
    matches!(
        status,
        ApplicationStatus::ActiveEmployment
            | ApplicationStatus::ContractEnded
            | ApplicationStatus::RenewalPending
    )
}

fn invalid_transition(
    from: ApplicationStatus,
    to: ApplicationStatus,
    reason: Option<String>,
) -> PlacementError {
    PlacementError::InvalidTransition {
        from,
        to,
        reason: reason.unwrap_or_else(|| "transition not allowed".to_string()),
        valid_next: state::valid_next_states(from).to_vec(),
    }
}

fn refund_currency(payments: &[Payment]) -> String {
    payments
        .first()
        .map(|payment| payment.currency.clone())
        .unwrap_or_else(|| "USD".to_string())
}
